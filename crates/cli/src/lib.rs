pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "unibox",
    about = "Unibox operator CLI",
    long_about = "Operate unibox ingestion: migrations, readiness checks, per-tenant channel syncs, and sync health probes.",
    after_help = "Examples:\n  unibox migrate\n  unibox doctor --json\n  unibox sync --tenant acme --channel review --marketplace testmart --base-url https://gw.example.com"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, marketplace token readiness, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one ingestion sync for a tenant and channel")]
    Sync(commands::sync::SyncArgs),
    #[command(about = "Probe sync health for a tenant and channel and report alerts")]
    Health(commands::health::HealthArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Sync(args) => commands::sync::run(args),
        Command::Health(args) => commands::health::run(args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
