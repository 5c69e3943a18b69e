use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use salamatk::api::Server;
use salamatk::config::Config;
use salamatk::error::RelayError;
use salamatk::store::SessionStore;

async fn run(config: Config) -> Result<(), RelayError> {
    let instruction = config.instruction()?;
    let provider = config.build_provider()?;
    let addr = config.socket_addr()?;
    log::info!(
        "model {} at {}, sessions idle out after {}s",
        provider.model,
        provider.base_url,
        config.session_ttl
    );

    let store = SessionStore::new(Arc::new(provider), instruction, config.session_ttl());
    Server::new(store, config.title.clone())
        .run(&addr.to_string())
        .await
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();
    salamatk::init_logging();

    let config = Config::parse();
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
