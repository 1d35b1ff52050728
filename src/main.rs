use std::path::PathBuf;

use clap::Parser;
use table_purger::{
    config::PurgerConfig,
    observability::{init_tracing, metrics},
    runner::{self, RunExit},
};

#[derive(Parser, Debug)]
#[command(version, about = "Purge stale rows from Azure Table Storage", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file
    #[arg(short, long, global = true, default_value = "table-purger.toml")]
    config: PathBuf,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Purge every configured table (default)
    Run,
    /// Report eligible and staged rows without deleting anything
    Check,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match PurgerConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.observability) {
        eprintln!("{e}");
        std::process::exit(1);
    }
    if let Err(e) = metrics::init_metrics(&config.observability.metrics) {
        tracing::error!(error = %e, "Failed to initialize metrics");
        std::process::exit(1);
    }

    let code = match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Check => check(&config).await,
    };
    std::process::exit(code);
}

async fn run(config: &PurgerConfig) -> i32 {
    match runner::run_until_interrupted(config, tokio::signal::ctrl_c()).await {
        RunExit::Finished(Ok(report)) if report.is_success() => 0,
        RunExit::Finished(Ok(report)) => {
            for outcome in &report.outcomes {
                if let Err(e) = &outcome.result {
                    eprintln!("{}: {e}", outcome.target);
                }
            }
            1
        }
        RunExit::Finished(Err(e)) => {
            tracing::error!(error = %e, "Purge run could not start");
            1
        }
        RunExit::Interrupted => {
            tracing::warn!("Interrupted; staged rows are resumed on the next run");
            130
        }
    }
}

async fn check(config: &PurgerConfig) -> i32 {
    let checks = match runner::check(config).await {
        Ok(checks) => checks,
        Err(e) => {
            tracing::error!(error = %e, "Check could not start");
            return 1;
        }
    };

    let mut code = 0;
    for check in checks {
        let eligible = match check.eligible {
            Ok(true) => "yes".to_string(),
            Ok(false) => "no".to_string(),
            Err(e) => {
                code = 1;
                format!("error: {e}")
            }
        };
        let staged = match check.staged {
            Ok(Some(count)) => count.to_string(),
            Ok(None) => "-".to_string(),
            Err(e) => {
                code = 1;
                format!("error: {e}")
            }
        };
        println!("{}\teligible: {eligible}\tstaged: {staged}", check.target);
    }
    code
}
