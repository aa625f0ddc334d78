use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use duet_core::ExperimentStatus;

#[derive(Parser)]
#[command(
    name = "duet",
    version,
    about = "Blind A/B evaluation for prompt enhancement: rewrite, respond, judge, rate"
)]
pub struct Cli {
    /// SQLite database path.
    #[arg(long, global = true, default_value = "duet.db")]
    pub db: PathBuf,

    /// LLM provider backing rewrite, response, and judge calls. The
    /// fake provider is offline and pairs with the heuristic judge.
    #[arg(long, global = true, value_enum, default_value_t = ProviderArg::Gemini)]
    pub provider: ProviderArg,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an experiment for a prompt without running anything
    Submit(SubmitArgs),
    /// Drive the next pending stage of an experiment
    Advance(AdvanceArgs),
    /// Submit a prompt and drive its pipeline to completion
    Run(RunArgs),
    /// Show an experiment as a given role sees it
    View(ViewArgs),
    /// Record a blind human rating for a response
    Rate(RateArgs),
    /// List experiments
    List(ListArgs),
    /// Export experiment trees as JSONL for offline analysis
    Export(ExportArgs),
}

#[derive(clap::Args, Debug)]
pub struct SubmitArgs {
    #[arg(long)]
    pub prompt: String,
}

#[derive(clap::Args, Debug)]
pub struct AdvanceArgs {
    #[arg(long)]
    pub id: String,

    /// Keep advancing until nothing is pending.
    #[arg(long, default_value = "false")]
    pub all: bool,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub prompt: String,
}

#[derive(clap::Args, Debug)]
pub struct ViewArgs {
    #[arg(long)]
    pub id: String,

    /// Viewer role; anything other than "admin" gets the rater view.
    #[arg(long, default_value = "rater")]
    pub role: String,

    /// Rater identity, used to surface that rater's own ratings.
    #[arg(long, default_value = "anonymous")]
    pub rater: String,
}

#[derive(clap::Args, Debug)]
pub struct RateArgs {
    #[arg(long)]
    pub response: String,

    #[arg(long)]
    pub rater: String,

    #[arg(long)]
    pub score: i64,

    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    #[arg(long, default_value = "20")]
    pub limit: u32,

    #[arg(long, default_value = "0")]
    pub offset: u32,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Output file; stdout when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Gemini,
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Pending,
    InProgress,
    Completed,
    PartiallyFailed,
}

impl From<StatusArg> for ExperimentStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Pending => ExperimentStatus::Pending,
            StatusArg::InProgress => ExperimentStatus::InProgress,
            StatusArg::Completed => ExperimentStatus::Completed,
            StatusArg::PartiallyFailed => ExperimentStatus::PartiallyFailed,
        }
    }
}
