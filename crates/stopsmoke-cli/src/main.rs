use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "stopsmoke", version, about = "Taper off cigarettes with an enforced cooldown")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a cigarette now (refused while the cooldown runs)
    Log,
    /// Today's allowance, count and cooldown
    Status,
    /// Smoked versus allowed over recent weeks
    Progress {
        /// Window length in weeks
        #[arg(long, default_value_t = 4)]
        weeks: u32,
        /// Also print a per-day breakdown of the window
        #[arg(long)]
        daily: bool,
    },
    /// List logged cigarettes
    History {
        /// How many days back to list
        #[arg(long, default_value_t = 28)]
        days: u32,
    },
    /// Clear all history and the running cooldown
    Reset {
        /// Confirm the irreversible clear
        #[arg(long)]
        yes: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Stay running and report when the cooldown ends
    Watch,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Log => commands::log::run(),
        Commands::Status => commands::status::run(),
        Commands::Progress { weeks, daily } => commands::progress::run(weeks, daily),
        Commands::History { days } => commands::history::run(days),
        Commands::Reset { yes } => commands::reset::run(yes),
        Commands::Config { action } => commands::config::run(action),
        Commands::Watch => commands::watch::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
