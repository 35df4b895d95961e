use clap::Parser;
use enrollment::cli::{Args, Command};
use enrollment::config::Config;
use enrollment::coordinator::{Coordinator, RunOptions, print_summary};
use enrollment::logging::setup_logging;
use std::process::ExitCode;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Config comes first so logging is set up before any startup event is emitted
    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    config.test_mode |= args.test_mode;
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        test_mode = config.test_mode,
        proxy = config.scraper_api_key.is_some(),
        "starting enrollment scraper"
    );
    debug!(config = ?config, "configuration loaded");

    let options = RunOptions {
        test_mode: config.test_mode,
        skip_existing: args.skip_existing,
        allow_direct: args.allow_direct,
        no_delay: args.no_delay,
    };
    let coordinator = match Coordinator::new(config, options) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!(error = %e, "Invalid site configuration");
            return ExitCode::FAILURE;
        }
    };

    if args.list {
        coordinator.print_sites();
        return ExitCode::SUCCESS;
    }

    match args.command {
        Some(Command::Update { site, term }) => match coordinator.update(&site, &term).await {
            Ok(total) => {
                println!("Updated {site} ({term}): {total} rows in dataset");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(site = site.as_str(), term = term.as_str(), error = format!("{e:#}"), "Update failed");
                ExitCode::FAILURE
            }
        },
        None => match coordinator.run(&args.universities).await {
            Ok(summary) => {
                print_summary(&summary);
                if summary.has_failures() {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            Err(e) => {
                error!(error = format!("{e:#}"), "Scrape run failed");
                ExitCode::FAILURE
            }
        },
    }
}
