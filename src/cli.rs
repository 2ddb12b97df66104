// src/cli.rs

use crate::config::{ClassifierKind, EmbedderKind, IndexBackend, LlmProvider};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Analytics and Q&A for GitHub repositories", long_about = None)]
pub struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Directory holding CSV snapshots
    #[arg(long, env = "REPO_PULSE_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch commits, pull requests and issues and write CSV snapshots
    Collect(CollectArgs),
    /// Print metrics computed from a snapshot
    Metrics(MetricsArgs),
    /// Render the dashboard charts to PNG files
    Charts(ChartsArgs),
    /// Answer a question about a repository, as text or as a chart
    Ask(AskArgs),
    /// Show one contributor's activity
    Developer(DeveloperArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CollectArgs {
    /// GitHub repository URL, e.g. https://github.com/owner/repo
    pub url: String,

    /// Maximum pages (100 records each) per resource type
    #[arg(long, default_value_t = 10)]
    pub max_pages: usize,

    /// Skip per-commit and per-PR requests for line stats
    #[arg(long)]
    pub no_details: bool,

    /// Fetch again even when a snapshot exists
    #[arg(long)]
    pub refresh: bool,
}

#[derive(ClapArgs, Debug)]
pub struct MetricsArgs {
    /// GitHub repository URL
    pub url: String,

    /// Also write the metric table to metrics.csv in the snapshot directory
    #[arg(long)]
    pub export: bool,
}

#[derive(ClapArgs, Debug)]
pub struct RenderArgs {
    /// Width of the output images in pixels
    #[arg(long, default_value_t = 960)]
    pub width: u32,

    /// Height of the output images in pixels
    #[arg(long, default_value_t = 600)]
    pub height: u32,
}

#[derive(ClapArgs, Debug)]
pub struct ChartsArgs {
    /// GitHub repository URL
    pub url: String,

    /// Directory to save the PNG charts (defaults to <snapshot>/charts)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Authors shown in the commits-by-author chart
    #[arg(long, default_value_t = 10)]
    pub top_authors: usize,

    #[command(flatten)]
    pub render: RenderArgs,
}

#[derive(ClapArgs, Debug)]
pub struct AskArgs {
    /// GitHub repository URL
    pub url: String,

    /// The question; reads questions from stdin when omitted
    pub question: Vec<String>,

    #[arg(long, value_enum, default_value_t = LlmProvider::Groq)]
    pub llm: LlmProvider,

    /// Model name override for the chosen provider
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, value_enum, default_value_t = ClassifierKind::Llm)]
    pub classifier: ClassifierKind,

    #[arg(long, value_enum, default_value_t = IndexBackend::Memory)]
    pub index: IndexBackend,

    #[arg(long, value_enum, default_value_t = EmbedderKind::Hashing)]
    pub embedder: EmbedderKind,

    /// Authors included in the model context
    #[arg(long, default_value_t = 5)]
    pub top_authors: usize,

    /// Entities included in the model context
    #[arg(long, default_value_t = 10)]
    pub top_entities: usize,

    /// Where chart answers are written (defaults to <snapshot>/answers)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub render: RenderArgs,
}

#[derive(ClapArgs, Debug)]
pub struct DeveloperArgs {
    /// GitHub repository URL
    pub url: String,

    /// Author name as recorded on commits
    pub author: String,
}
