use std::error::Error;

use codesync_sdk::auth_api::AuthClient;
use codesync_sdk::store::SessionStore;
use secrecy::SecretString;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let email = "REPLACE_WITH_EMAIL".to_string();
    let password = SecretString::new("REPLACE_WITH_PASSWORD".to_string());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = AuthClient::from_env()?;

        // Uncomment for a first-time account:
        // client.register(&email, &password).await?;

        let credentials = client.login(&email, &password).await?;
        println!("signed in as {}", credentials.user.email);

        let store = SessionStore::in_dir(std::path::Path::new(".codesync"));
        store.store_credentials(&credentials)?;
        println!("session persisted to {}", store.path().display());

        Ok::<(), Box<dyn Error>>(())
    })
}
