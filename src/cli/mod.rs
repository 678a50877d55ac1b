//! CLI layer: argument parsing, command dispatch, and terminal output.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands, IngestCommands};

/// Print a top-level error and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{err:#}") }));
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    std::process::exit(1);
}
