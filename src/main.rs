use anyhow::Result;
use clap::{Parser, Subcommand};
use speckit_flow::cmd;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speckit-flow")]
#[command(version, about = "Parallel task orchestrator for spec-driven development")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the orchestrator configuration for this repository
    Init {
        /// Number of parallel sessions (1-10)
        #[arg(long)]
        sessions: Option<usize>,
        /// Agent adapter to configure
        #[arg(long)]
        agent: Option<String>,
    },
    /// Build the execution plan and write dag.yaml
    Dag {
        /// Number of parallel sessions (overrides config)
        #[arg(long)]
        sessions: Option<usize>,
        /// Print the phase tree
        #[arg(long)]
        visualize: bool,
    },
    /// Run the orchestration (resumes a saved run)
    Run {
        /// Number of parallel sessions (overrides config)
        #[arg(long)]
        sessions: Option<usize>,
        /// Resume the saved run without the informational notice
        #[arg(long)]
        resume: bool,
        /// Show the live session dashboard
        #[arg(long, overrides_with = "no_dashboard")]
        dashboard: bool,
        /// Disable the live session dashboard
        #[arg(long)]
        no_dashboard: bool,
    },
    /// Show the current orchestration state
    Status,
    /// Mark a task complete by id
    Complete {
        /// Task id, e.g. T042
        task_id: String,
    },
    /// Merge session branches into the integration branch
    Merge {
        /// Keep session worktrees after merging
        #[arg(long)]
        keep_worktrees: bool,
        /// Shell command to validate the merged result
        #[arg(long)]
        test: Option<String>,
    },
    /// Destroy workspaces and state (branches are preserved)
    Abort {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init { sessions, agent } => cmd::init::run(sessions, agent),
        Commands::Dag {
            sessions,
            visualize,
        } => cmd::dag::run(sessions, visualize),
        Commands::Run {
            sessions,
            resume,
            dashboard: _,
            no_dashboard,
        } => cmd::run::run(sessions, resume, !no_dashboard).await,
        Commands::Status => cmd::status::run(),
        Commands::Complete { task_id } => cmd::complete::run(&task_id),
        Commands::Merge {
            keep_worktrees,
            test,
        } => cmd::merge::run(keep_worktrees, test).await,
        Commands::Abort { force } => cmd::abort::run(force).await,
    }
}
