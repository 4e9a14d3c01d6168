mod cmd;
mod host;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{action::ActionSubcommand, config::ConfigSubcommand, missed::MissedSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mkanban",
    about = "Scheduled reminders and event-driven automations for mkanban boards",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .mkanban/ or .git/)
    #[arg(long, global = true, env = "MKANBAN_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the .mkanban/ data directory with a default config
    Init,

    /// Manage actions
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Inspect and replay scheduled fires that happened while nothing was running
    Missed {
        #[command(subcommand)]
        subcommand: MissedSubcommand,
    },

    /// Show or validate .mkanban/config.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Publish one event and run whatever actions it triggers
    Emit {
        /// Event type, e.g. task_moved or board_enter
        event: String,
        #[arg(long)]
        board: Option<String>,
        #[arg(long)]
        task: Option<String>,
        #[arg(long)]
        column: Option<String>,
        /// Display name carried in the payload (defaults to the id)
        #[arg(long)]
        title: Option<String>,
        /// Branch name for git events
        #[arg(long)]
        branch: Option<String>,
    },

    /// Run the poller, event listener and orphan cleaner until Ctrl-C
    Daemon,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Daemon => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Action { subcommand } => cmd::action::run(&root, subcommand, cli.json),
        Commands::Missed { subcommand } => cmd::missed::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Emit {
            event,
            board,
            task,
            column,
            title,
            branch,
        } => cmd::emit::run(
            &root,
            cmd::emit::EmitArgs {
                event,
                board,
                task,
                column,
                title,
                branch,
            },
            cli.json,
        ),
        Commands::Daemon => cmd::daemon::run(&root),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
