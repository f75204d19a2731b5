use std::error::Error;

use codesync_sdk::room::client::{generate_room_id, RoomClient};
use codesync_sdk::room::session::{RoomEvent, RoomSession};
use codesync_sdk::store::SessionStore;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = SessionStore::in_dir(std::path::Path::new(".codesync"));
    let identity = store
        .credentials()
        .map(|credentials| credentials.user.email)
        .unwrap_or_else(|| "REPLACE_WITH_EMAIL".to_string());
    let room_id = store.last_room().unwrap_or_else(generate_room_id);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = RoomClient::from_env();
        let mut session = RoomSession::connect(&client, &room_id, &identity).await?;
        store.set_last_room(&room_id)?;
        println!("joined room {room_id} as {identity}");

        while let Some(event) = session.recv().await {
            match event {
                RoomEvent::Synced { .. } => {
                    let state = session.state();
                    println!(
                        "synced: {} ({}), {} participant(s)",
                        state.language.label(),
                        state.language.compiler(),
                        state.participants.len(),
                    );
                }
                RoomEvent::PeerJoined { username, .. } => println!("{username} joined"),
                RoomEvent::PeerLeft { username, .. } => println!("{username} left"),
                RoomEvent::CodeChanged { user, .. } => {
                    println!(
                        "edit from {}: {} bytes",
                        user.as_deref().unwrap_or("unknown"),
                        session.state().code.len(),
                    );
                }
                RoomEvent::LanguageChanged { language, .. } => {
                    println!("language switched to {}", language.label());
                }
                RoomEvent::OutputReady { .. } => {
                    println!("output:\n{}", session.state().output);
                }
                RoomEvent::OutputCleared { .. } => println!("output cleared"),
                RoomEvent::Message(_) => {}
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
