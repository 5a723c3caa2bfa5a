use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

mod attendance;
mod commands;
mod config;
mod db;
mod error;
mod links;
mod models;
mod poll;
mod ranking;
mod report;
mod roles;
mod server;
mod sessions;
mod stats;

use attendance::SortKey;
use roles::Role;

#[derive(Parser)]
#[command(name = "training-dashboard")]
#[command(about = "Attendance, leaderboard and activeness admin for training batches", long_about = None)]
struct Cli {
    /// Only log errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Log progress and backend calls
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo batch with sessions and boards
    Seed,
    /// Manage batches
    Batch {
        #[command(subcommand)]
        action: BatchCommand,
    },
    /// Manage a batch's student roster
    Student {
        #[command(subcommand)]
        action: StudentCommand,
    },
    /// Manage daily attendance sessions
    Session {
        #[command(subcommand)]
        action: SessionCommand,
    },
    /// Inspect attendance by month and day
    Attendance {
        #[command(subcommand)]
        action: AttendanceCommand,
    },
    /// Per-student and per-batch attendance statistics
    Stats {
        #[command(subcommand)]
        action: StatsCommand,
    },
    /// Expiring public links to batch statistics
    Link {
        #[command(subcommand)]
        action: LinkCommand,
    },
    /// Interview leaderboards
    Leaderboard {
        #[command(subcommand)]
        action: LeaderboardCommand,
    },
    /// Module activeness boards
    Activeness {
        #[command(subcommand)]
        action: ActivenessCommand,
    },
    /// Grant and revoke dashboard roles
    Role {
        #[command(subcommand)]
        action: RoleCommand,
    },
    /// Serve the public views and the attendance marking form
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum BatchCommand {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List {
        /// Include deactivated batches
        #[arg(long)]
        all: bool,
    },
    Update {
        batch: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Activate {
        batch: String,
    },
    Deactivate {
        batch: String,
    },
    /// Delete a batch with its students, sessions and links
    Delete {
        batch: String,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    Add {
        batch: String,
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    List {
        batch: String,
    },
    Remove {
        batch: String,
        name: String,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    Create {
        batch: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        name: Option<String>,
    },
    List {
        #[arg(long)]
        batch: Option<String>,
        /// YYYY-MM, defaults to the current month
        #[arg(long, value_parser = attendance::parse_month)]
        month: Option<(i32, u32)>,
    },
    Update {
        code: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Flip a session between active and inactive
    Toggle {
        code: String,
    },
    Delete {
        code: String,
    },
    /// Print the shareable marking URL
    Url {
        code: String,
    },
}

#[derive(Args, Clone)]
struct DayView {
    date: NaiveDate,
    #[arg(long)]
    batch: Option<String>,
    /// Case-insensitive substring of the student name
    #[arg(long)]
    search: Option<String>,
    #[arg(long, value_enum, default_value_t = SortKey::Name)]
    sort: SortKey,
    #[arg(long)]
    desc: bool,
}

#[derive(Subcommand)]
enum AttendanceCommand {
    Calendar {
        #[arg(long, value_parser = attendance::parse_month)]
        month: Option<(i32, u32)>,
        #[arg(long)]
        batch: Option<String>,
    },
    Show {
        #[command(flatten)]
        view: DayView,
        /// Write the displayed rows to a CSV file; without a path, to attendance-<code>-<date>.csv
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        csv: Option<PathBuf>,
    },
    /// Re-run `show` on the dashboard refresh interval until interrupted
    Watch {
        #[command(flatten)]
        view: DayView,
    },
}

#[derive(Subcommand)]
enum StatsCommand {
    Batch {
        batch: String,
        /// Print overview and students as JSON
        #[arg(long)]
        json: bool,
    },
    Report {
        batch: String,
        #[arg(long, default_value = "attendance-report.md")]
        out: PathBuf,
    },
    /// Follow a public statistics link on the public refresh interval
    Watch {
        public_id: String,
    },
}

#[derive(Subcommand)]
enum LinkCommand {
    Create { batch: String },
    List { batch: String },
    Revoke { public_id: String },
    /// Check a public id the way a visitor would
    Check { public_id: String },
}

#[derive(Subcommand)]
enum LeaderboardCommand {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    Show {
        id: Uuid,
    },
    AddRound {
        id: Uuid,
        student: String,
        score: i32,
        #[arg(long)]
        interviewer: String,
        #[arg(long, default_value_t = 1)]
        round: i32,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    DeleteRound {
        round_id: Uuid,
    },
    Publish {
        id: Uuid,
        /// Unpublish instead
        #[arg(long)]
        off: bool,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum ActivenessCommand {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    Show {
        id: Uuid,
    },
    AddScore {
        id: Uuid,
        student: String,
        module: String,
        /// 0 to 10
        score: i32,
    },
    DeleteScore {
        score_id: Uuid,
    },
    Publish {
        id: Uuid,
        #[arg(long)]
        off: bool,
    },
    Delete {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum RoleCommand {
    Grant {
        email: String,
        #[arg(value_enum)]
        role: Role,
    },
    Revoke {
        email: String,
    },
    List,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("training-dashboard error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let config = config::AppConfig::load_with_dotenv()?;
    let pool = db::connect(&config).await?;

    // The roles table does not exist before the first migration.
    let operator = match cli.command {
        Commands::InitDb => roles::Operator {
            email: config.operator_email.clone(),
            role: Role::Admin,
        },
        _ => db::roles::resolve_operator(&pool, config.operator_email.as_deref()).await?,
    };
    let ctx = commands::AppContext {
        pool,
        config,
        operator,
    };
    commands::dispatch(cli.command, &ctx).await
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("DASHBOARD_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
