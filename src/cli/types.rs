//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ragstack")]
#[command(about = "Provision and query an agentic RAG stack on AWS", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from a specific file instead of .ragstack/
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the stack: bucket, vector collection, knowledge base, roles,
    /// functions, conversations table, and event wiring
    Deploy,

    /// Destroy the stack, deleting stored documents and conversations
    Destroy {
        /// Confirm the teardown; nothing is destroyed without it
        #[arg(long)]
        force: bool,
    },

    /// Show the outputs recorded by the last deploy
    Outputs,

    /// Knowledge-base ingestion commands
    #[command(subcommand)]
    Ingest(IngestCommands),

    /// Ask a question against the knowledge base
    Query {
        /// The question to answer
        question: String,

        /// Conversation to continue (a new one starts when omitted)
        #[arg(short = 'C', long)]
        conversation: Option<String>,

        /// Retrieved chunks to feed the model (1-10)
        #[arg(long)]
        max_results: Option<i32>,
    },
}

#[derive(Subcommand)]
pub enum IngestCommands {
    /// Start an ingestion job for the documents data source
    Run {
        /// Uploaded object keys that triggered this run (comma-separated);
        /// keys outside the document filters are ignored
        #[arg(short, long, value_delimiter = ',')]
        keys: Vec<String>,

        /// Wait until the job reaches a terminal status
        #[arg(long)]
        wait: bool,
    },

    /// Show the status of an ingestion job
    Status {
        /// Ingestion job id
        job_id: String,
    },
}
