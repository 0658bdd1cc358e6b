use std::path::Path;

use clap::Parser;
use tracing::info;

use tessera_logging::TesseraSubscriberBuilder;
use tessera_server::{Cli, Command, LifecycleService, Request, ServerConfig};

fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    Ok(match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Command::Run { config, .. } | Command::Counts { config } => load_config(config.as_deref())?,
    };
    // Keep the guard alive so buffered file output is flushed on exit
    let _guard = TesseraSubscriberBuilder::new()
        .with_config(config.logging.clone())
        .try_init()?;
    let service = LifecycleService::from_config(&config)?;

    match cli.command {
        Command::Run { batch, .. } => {
            let text = std::fs::read_to_string(&batch)?;
            let request = Request::from_json(&text)?;
            info!(batch = %batch.display(), items = request.items.len(), "Processing batch");

            let response = service.process(request);
            let failed = response.items.iter().filter(|i| !i.is_success()).count();
            info!(failed, "Batch processed");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Counts { .. } => {
            for (object_type, count) in service.object_counts()? {
                println!("{object_type}: {count}");
            }
        }
    }

    Ok(())
}
