//! Higher-level room session with local view state.
//!
//! `RoomSession` consumes raw relay messages and emits typed events while
//! maintaining the local mirror of the room: code, language, participants,
//! and execution output. Updates that originated from the local identity are
//! suppressed so in-flight local edits are never overwritten by their own
//! echo.

use std::collections::BTreeSet;

use crate::room::client::{RoomClient, RoomClientError, RoomConnection, RoomSender};
use crate::room::proto::{Language, ServerMessage};

/// Output shown locally while a run request is in flight.
const RUNNING_BANNER: &str = "Compiling and executing...\n";

/// Local mirror of a room, mutated by inbound relay messages and local
/// actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoomState {
    /// Shared document contents.
    pub code: String,
    /// Active language.
    pub language: Language,
    /// Identities currently in the room.
    pub participants: BTreeSet<String>,
    /// Last execution output.
    pub output: String,
    /// Whether a run request is awaiting its result.
    pub running: bool,
}

impl Default for RoomState {
    fn default() -> Self {
        Self {
            code: Language::default().template().to_string(),
            language: Language::default(),
            participants: BTreeSet::new(),
            output: String::new(),
            running: false,
        }
    }
}

impl RoomState {
    /// Applies one inbound relay message and reports what happened.
    ///
    /// Updates whose originating identity equals `local_identity` leave the
    /// state untouched and come back as [`RoomEvent::Message`]; a missing
    /// originator counts as remote.
    pub fn apply(&mut self, message: ServerMessage, local_identity: &str) -> RoomEvent {
        match &message {
            ServerMessage::Init {
                code,
                language,
                users,
            } => {
                self.code = code.clone();
                self.language = *language;
                self.participants = users.iter().cloned().collect();
                RoomEvent::Synced { message }
            }
            ServerMessage::UserJoined { username, users } => {
                let username = username.clone();
                self.participants = users.iter().cloned().collect();
                RoomEvent::PeerJoined { username, message }
            }
            ServerMessage::UserLeft { username, users } => {
                let username = username.clone();
                self.participants = users.iter().cloned().collect();
                RoomEvent::PeerLeft { username, message }
            }
            ServerMessage::CodeUpdate { code, user, .. } => {
                if !is_remote(user.as_deref(), local_identity) {
                    return RoomEvent::Message(message);
                }
                self.code = code.clone();
                let user = user.clone();
                RoomEvent::CodeChanged { user, message }
            }
            ServerMessage::LanguageChange {
                language,
                code,
                user,
            } => {
                if !is_remote(user.as_deref(), local_identity) {
                    return RoomEvent::Message(message);
                }
                let language = *language;
                self.language = language;
                self.code = code.clone();
                self.output.clear();
                let user = user.clone();
                RoomEvent::LanguageChanged {
                    language,
                    user,
                    message,
                }
            }
            ServerMessage::CompileResult { output, .. } => {
                self.output = output.clone();
                self.running = false;
                RoomEvent::OutputReady { message }
            }
            ServerMessage::OutputCleared { .. } => {
                self.output.clear();
                RoomEvent::OutputCleared { message }
            }
        }
    }
}

fn is_remote(originator: Option<&str>, local_identity: &str) -> bool {
    originator.map_or(true, |user| user != local_identity)
}

/// Session-level event emitted by [`RoomSession::recv`].
#[derive(Clone, Debug)]
pub enum RoomEvent {
    /// Room snapshot applied after joining.
    Synced {
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// A participant entered the room.
    PeerJoined {
        /// Identity that joined.
        username: String,
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// A participant left the room.
    PeerLeft {
        /// Identity that left.
        username: String,
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// A remote edit replaced the local code.
    CodeChanged {
        /// Originating identity, when the relay reported one.
        user: Option<String>,
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// A remote language switch installed a new template.
    LanguageChanged {
        /// The new language.
        language: Language,
        /// Originating identity, when the relay reported one.
        user: Option<String>,
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// An execution finished and its output was applied.
    OutputReady {
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// The shared output was cleared.
    OutputCleared {
        /// Original underlying relay message.
        message: ServerMessage,
    },
    /// Raw message that did not change local state (e.g. suppressed
    /// self-echo).
    Message(ServerMessage),
}

/// Stateful wrapper around a room connection.
///
/// Owns the connection exclusively; dropping or leaving the session tears
/// the connection down.
#[derive(Debug)]
pub struct RoomSession {
    connection: RoomConnection,
    identity: String,
    room_id: String,
    state: RoomState,
}

impl RoomSession {
    /// Connects to a room and initializes the default local state.
    ///
    /// The relay's `init` snapshot arrives as the first [`RoomEvent::Synced`]
    /// from [`recv`](Self::recv).
    pub async fn connect(
        client: &RoomClient,
        room_id: &str,
        identity: &str,
    ) -> Result<Self, RoomClientError> {
        let connection = client.connect(room_id, identity).await?;
        Ok(Self::from_connection(connection, room_id, identity))
    }

    /// Creates a session from an existing low-level connection.
    pub fn from_connection(connection: RoomConnection, room_id: &str, identity: &str) -> Self {
        Self {
            connection,
            identity: identity.to_string(),
            room_id: room_id.to_string(),
            state: RoomState::default(),
        }
    }

    /// Local identity used for echo suppression and outbound actions.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Identifier of the joined room.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current local mirror of the room.
    pub fn state(&self) -> &RoomState {
        &self.state
    }

    /// Returns a cloneable sender for outbound room actions.
    pub fn sender(&self) -> RoomSender {
        self.connection.sender()
    }

    /// Receives the next relay message, applies it, and reports the result.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        let message = self.connection.recv().await?;
        Some(self.state.apply(message, &self.identity))
    }

    /// Applies a local edit and broadcasts it.
    ///
    /// Called per keystroke-equivalent; there is no debouncing. While
    /// disconnected the broadcast is dropped and the rejoin resyncs.
    pub fn edit_code(&mut self, code: impl Into<String>) {
        self.state.code = code.into();
        self.sender()
            .code_update(&self.state.code, self.state.language, &self.identity);
    }

    /// Switches language, resets local code to the language's template, and
    /// broadcasts the switch.
    pub fn change_language(&mut self, language: Language) {
        self.state.language = language;
        self.state.code = language.template().to_string();
        self.sender()
            .language_change(language, language.template(), &self.identity);
    }

    /// Requests execution of the current code.
    ///
    /// Fails with [`RoomClientError::NotConnected`] while the connection is
    /// not open, leaving local state untouched. On success the running flag
    /// is set and the local output shows the running banner until a
    /// `compile_result` arrives.
    pub fn run(&mut self) -> Result<(), RoomClientError> {
        self.sender()
            .compile(&self.state.code, self.state.language, &self.identity)?;
        self.state.running = true;
        self.state.output = RUNNING_BANNER.to_string();
        Ok(())
    }

    /// Clears the local output and broadcasts the clear.
    pub fn clear_output(&mut self) {
        self.state.output.clear();
        self.sender().clear_output(&self.identity);
    }

    /// Leaves the room, closing the connection and cancelling any pending
    /// reconnect.
    pub fn leave(self) {
        self.connection.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::{is_remote, RoomEvent, RoomState};
    use crate::room::proto::{Language, ServerMessage};

    const LOCAL: &str = "a@x.com";

    fn synced_state() -> RoomState {
        let mut state = RoomState::default();
        state.apply(
            ServerMessage::Init {
                code: "x".to_string(),
                language: Language::Python,
                users: vec![LOCAL.to_string()],
            },
            LOCAL,
        );
        state
    }

    #[test]
    fn default_state_is_the_javascript_template() {
        let state = RoomState::default();
        assert_eq!(state.language, Language::Javascript);
        assert_eq!(state.code, Language::Javascript.template());
        assert!(state.participants.is_empty());
        assert!(state.output.is_empty());
        assert!(!state.running);
    }

    #[test]
    fn init_replaces_state_wholesale() {
        let state = synced_state();
        assert_eq!(state.code, "x");
        assert_eq!(state.language, Language::Python);
        assert!(state.participants.contains(LOCAL));
    }

    #[test]
    fn remote_code_update_is_applied() {
        let mut state = synced_state();
        let event = state.apply(
            ServerMessage::CodeUpdate {
                code: "y".to_string(),
                user: Some("b@x.com".to_string()),
                language: None,
            },
            LOCAL,
        );
        assert_eq!(state.code, "y");
        assert!(matches!(event, RoomEvent::CodeChanged { .. }));
    }

    #[test]
    fn self_echoed_code_update_is_suppressed() {
        let mut state = synced_state();
        state.apply(
            ServerMessage::CodeUpdate {
                code: "y".to_string(),
                user: Some("b@x.com".to_string()),
                language: None,
            },
            LOCAL,
        );
        let event = state.apply(
            ServerMessage::CodeUpdate {
                code: "z".to_string(),
                user: Some(LOCAL.to_string()),
                language: None,
            },
            LOCAL,
        );
        // Echo suppression holds: the self-originated update changes nothing.
        assert_eq!(state.code, "y");
        assert!(matches!(event, RoomEvent::Message(_)));
    }

    #[test]
    fn code_update_without_originator_counts_as_remote() {
        let mut state = synced_state();
        state.apply(
            ServerMessage::CodeUpdate {
                code: "anon".to_string(),
                user: None,
                language: None,
            },
            LOCAL,
        );
        assert_eq!(state.code, "anon");
        assert!(is_remote(None, LOCAL));
    }

    #[test]
    fn remote_language_change_swaps_template_and_clears_output() {
        let mut state = synced_state();
        state.output = "old output".to_string();

        let change = ServerMessage::LanguageChange {
            language: Language::Cpp,
            code: Language::Cpp.template().to_string(),
            user: Some("b@x.com".to_string()),
        };
        state.apply(change.clone(), LOCAL);
        assert_eq!(state.language, Language::Cpp);
        assert_eq!(state.code, Language::Cpp.template());
        assert!(state.output.is_empty());

        // Idempotent when the identical payload arrives twice.
        let before = state.clone();
        state.apply(change, LOCAL);
        assert_eq!(state, before);
    }

    #[test]
    fn self_language_change_is_suppressed() {
        let mut state = synced_state();
        state.output = "kept".to_string();
        let event = state.apply(
            ServerMessage::LanguageChange {
                language: Language::Java,
                code: Language::Java.template().to_string(),
                user: Some(LOCAL.to_string()),
            },
            LOCAL,
        );
        assert_eq!(state.language, Language::Python);
        assert_eq!(state.output, "kept");
        assert!(matches!(event, RoomEvent::Message(_)));
    }

    #[test]
    fn compile_result_sets_output_and_clears_running() {
        let mut state = synced_state();
        state.running = true;
        let event = state.apply(
            ServerMessage::CompileResult {
                output: "42\n".to_string(),
                language: None,
                user: Some("b@x.com".to_string()),
            },
            LOCAL,
        );
        assert_eq!(state.output, "42\n");
        assert!(!state.running);
        assert!(matches!(event, RoomEvent::OutputReady { .. }));
    }

    #[test]
    fn output_cleared_empties_output() {
        let mut state = synced_state();
        state.output = "stale".to_string();
        state.apply(ServerMessage::OutputCleared { user: None }, LOCAL);
        assert!(state.output.is_empty());
    }

    #[test]
    fn participant_lists_are_replaced_wholesale() {
        let mut state = synced_state();
        let event = state.apply(
            ServerMessage::UserJoined {
                username: "b@x.com".to_string(),
                users: vec![LOCAL.to_string(), "b@x.com".to_string()],
            },
            LOCAL,
        );
        assert_eq!(state.participants.len(), 2);
        assert!(matches!(event, RoomEvent::PeerJoined { ref username, .. } if username == "b@x.com"));

        state.apply(
            ServerMessage::UserLeft {
                username: "b@x.com".to_string(),
                users: vec![LOCAL.to_string()],
            },
            LOCAL,
        );
        assert_eq!(state.participants.len(), 1);
    }

    #[test]
    fn join_sync_edit_echo_scenario() {
        // Join as a@x.com, receive the snapshot, then a peer edit, then a
        // self-echoed edit.
        let mut state = RoomState::default();
        state.apply(
            ServerMessage::Init {
                code: "x".to_string(),
                language: Language::Python,
                users: vec![LOCAL.to_string()],
            },
            LOCAL,
        );
        assert_eq!(state.code, "x");
        assert_eq!(state.language, Language::Python);

        state.apply(
            ServerMessage::CodeUpdate {
                code: "y".to_string(),
                user: Some("b@x.com".to_string()),
                language: None,
            },
            LOCAL,
        );
        assert_eq!(state.code, "y");

        state.apply(
            ServerMessage::CodeUpdate {
                code: "z".to_string(),
                user: Some(LOCAL.to_string()),
                language: None,
            },
            LOCAL,
        );
        assert_eq!(state.code, "y");
    }
}
