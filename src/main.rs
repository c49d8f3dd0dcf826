use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use adcrawl::app::AppContext;
use adcrawl::cli::{commands, Cli, Commands, ConsoleNotifier};
use adcrawl::config::{parse_interval, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ref interval) = cli.stale_after {
        let stale_after = parse_interval(interval).map_err(|e| anyhow::anyhow!(e))?;
        config.queue.stale_after_secs = stale_after.as_secs();
    }
    if cli.headed {
        config.scraper.headless = false;
    }

    let notifier = Arc::new(ConsoleNotifier::new(
        cli.output.clone(),
        config.scraper.library_url.clone(),
    ));
    let ctx = AppContext::new(config, notifier.clone());

    match cli.command {
        Commands::Crawl { terms } => {
            commands::crawl(&ctx, &notifier, &terms).await?;
        }
        Commands::Shell { key } => {
            commands::shell(&ctx, &notifier, &key).await?;
        }
    }

    Ok(())
}
