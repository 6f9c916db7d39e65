mod analyzer;
mod config;
mod error;
mod extract;
mod math;
mod prompts;
mod session;
mod study;
mod terminal;
mod view;

use std::sync::Arc;

use maxwell_common::openai::{ChatClient, ChatModel};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use analyzer::Analyzer;
use config::Config;
use study::StudyBuddy;
use terminal::Terminal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = Config::from_env()?;
    info!(
        api_url = %config.api_url,
        model = %config.model,
        timeout_secs = config.timeout.map(|t| t.as_secs()),
        "configuration loaded"
    );

    let client = ChatClient::new(config.chat_client_config())?;
    let model: Arc<dyn ChatModel> = Arc::new(client);

    let terminal = Terminal::new(
        Analyzer::new(model.clone(), config.model.clone()),
        StudyBuddy::new(model, config.model.clone()),
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    );
    let terminal = if config.render_math {
        terminal
    } else {
        terminal.without_math()
    };

    terminal.run().await?;
    info!("maxwell shut down");
    Ok(())
}
