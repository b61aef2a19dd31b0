use std::sync::Arc;

use clap::Parser;

use kb_anthropic::AnthropicClient;
use kb_core::{
    channels::filter_channel_file,
    classifier::KnowledgeProcessor,
    config::Config,
    pipeline::ExtractionService,
    ports::CompletionClient,
    store::KnowledgeStore,
};
use kb_http::AppState;
use kb_slack::SlackClient;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), kb_core::Error> {
    kb_core::logging::init("kb")?;
    let cli = Cli::parse();

    match cli.command() {
        Command::Serve => serve().await,
        Command::FilterChannels {
            input,
            output,
            min_members,
        } => {
            let report = filter_channel_file(input, output, *min_members)?;
            println!("Original channels: {}", report.original);
            println!(
                "Channels with {}+ members: {}",
                min_members, report.filtered
            );
            println!("Wrote {}", output.display());
            Ok(())
        }
    }
}

async fn serve() -> Result<(), kb_core::Error> {
    let cfg = Config::load()?;
    let addr = cfg.server.bind_addr()?;

    let source = Arc::new(SlackClient::new(cfg.slack.clone())?);

    let remote: Option<Arc<dyn CompletionClient>> = match AnthropicClient::from_config(&cfg.classifier)? {
        Some(client) => {
            tracing::info!(model = client.model(), "remote classification enabled");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("no Claude API key configured; using keyword classification only");
            None
        }
    };

    let store = Arc::new(KnowledgeStore::new(&cfg.store));
    tracing::info!(path = %store.path().display(), "knowledge store");

    let service = ExtractionService::new(
        source,
        KnowledgeProcessor::new(remote),
        store,
        cfg.extraction,
    );

    kb_http::serve(addr, AppState::new(Arc::new(service)))
        .await
        .map_err(|e| kb_core::Error::External(format!("http server failed: {e}")))
}
