//! Ragstack CLI entry point.

use clap::Parser;

use ragstack::cli::{commands, handle_error, Cli, Commands};
use ragstack::infrastructure::config::ConfigLoader;
use ragstack::infrastructure::logging::Logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => handle_error(&err, cli.json),
    };

    let _logger = match Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(&err, cli.json),
    };

    let result = match cli.command {
        Commands::Deploy => commands::deploy::execute(&config, cli.json).await,
        Commands::Destroy { force } => commands::destroy::execute(&config, force, cli.json).await,
        Commands::Outputs => commands::outputs::execute(cli.json),
        Commands::Ingest(command) => commands::ingest::execute(&config, command, cli.json).await,
        Commands::Query {
            question,
            conversation,
            max_results,
        } => commands::query::execute(&config, question, conversation, max_results, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(&err, cli.json);
    }
}
