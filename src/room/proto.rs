use serde::{Deserialize, Serialize};

/// Languages the relay's execution backend accepts.
///
/// The wire encoding is the lowercase key (`"javascript"`, `"cpp"`, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Javascript,
    Typescript,
    Python,
    Java,
    Cpp,
    C,
}

impl Language {
    /// All supported languages, in menu order.
    pub const ALL: [Language; 6] = [
        Language::Javascript,
        Language::Typescript,
        Language::Python,
        Language::Java,
        Language::Cpp,
        Language::C,
    ];

    /// Wire key for this language.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
        }
    }

    /// Human-readable name.
    pub fn label(&self) -> &'static str {
        match self {
            Language::Javascript => "JavaScript",
            Language::Typescript => "TypeScript",
            Language::Python => "Python",
            Language::Java => "Java",
            Language::Cpp => "C++",
            Language::C => "C",
        }
    }

    /// Toolchain the relay runs this language with.
    pub fn compiler(&self) -> &'static str {
        match self {
            Language::Javascript => "Node.js",
            Language::Typescript => "ts-node",
            Language::Python => "Python 3",
            Language::Java => "JDK",
            Language::Cpp => "g++",
            Language::C => "gcc",
        }
    }

    /// Starter snippet installed when switching to this language.
    pub fn template(&self) -> &'static str {
        match self {
            Language::Javascript => "// JavaScript\nconsole.log(\"Hello, World!\");",
            Language::Typescript => {
                "// TypeScript\nconst greet = (name: string) => console.log(\"Hello, \" + name);\ngreet(\"World\");"
            }
            Language::Python => "# Python\nprint(\"Hello, World!\")",
            Language::Java => {
                "// Java\npublic class Main {\n  public static void main(String[] args) {\n    System.out.println(\"Hello, World!\");\n  }\n}"
            }
            Language::Cpp => {
                "// C++\n#include <iostream>\nint main(){ std::cout << \"Hello, World!\\n\"; return 0; }"
            }
            Language::C => {
                "// C\n#include <stdio.h>\nint main(){ printf(\"Hello, World!\\n\"); return 0; }"
            }
        }
    }
}

/// Messages sent from this client to the room relay.
///
/// `join` identifies the participant with `username`; the edit and run
/// messages carry the originating identity as `user` so peers can suppress
/// echoes of their own actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        username: String,
    },
    CodeUpdate {
        code: String,
        language: Language,
        user: String,
    },
    LanguageChange {
        language: Language,
        code: String,
        user: String,
    },
    Compile {
        code: String,
        language: Language,
        user: String,
    },
    ClearOutput {
        user: String,
    },
}

/// Messages broadcast by the room relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room snapshot sent only to the joining participant.
    Init {
        code: String,
        language: Language,
        users: Vec<String>,
    },
    UserJoined {
        username: String,
        users: Vec<String>,
    },
    UserLeft {
        username: String,
        users: Vec<String>,
    },
    CodeUpdate {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<Language>,
    },
    LanguageChange {
        language: Language,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
    CompileResult {
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<Language>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
    OutputCleared {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },
}

impl ClientMessage {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
