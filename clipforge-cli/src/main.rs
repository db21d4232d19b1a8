mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process;
use std::time::Duration;

use clap::Parser;
use clipforge::JobSpec;
#[cfg(feature = "colored-output")]
use colored::*;
use tracing::{Level, debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, Commands},
    commands::{CommandExecutor, ScrubRequest},
    config::AppConfig,
    error::Result,
    output::OutputManager,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let json_errors = args.output.is_some_and(|format| format.is_json());

    if let Err(e) = run(args).await {
        if json_errors {
            let error_json = serde_json::json!({
                "status": "error",
                "message": e.to_string(),
            });
            println!("{error_json}");
        } else {
            error!("Application error: {}", e);
            #[cfg(feature = "colored-output")]
            {
                eprintln!("{} {}", "Error:".red().bold(), e);
            }
            #[cfg(not(feature = "colored-output"))]
            {
                eprintln!("Error: {}", e);
            }
        }
        process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let config = AppConfig::load(args.config.as_deref())?;
    debug!(?config, "Configuration loaded");

    let format = args.output.unwrap_or(config.output);
    let client_config = config.client_config(args.base_url.as_deref(), args.timeout)?;
    let executor = CommandExecutor::new(client_config, OutputManager::new(!format.is_json(), format))?;

    match args.command {
        Commands::Generate {
            prompt,
            negative,
            composed,
            no_hls,
            detach,
            interval,
        } => {
            let mut spec = JobSpec::new(prompt).segmented(!no_hls);
            if let Some(negative) = negative {
                spec = spec.with_negative_prompt(negative);
            }
            if let Some(composed) = composed {
                spec = spec.with_composed_prompt(composed);
            }
            executor
                .generate(spec, detach, interval.map(Duration::from_millis))
                .await?;
        }

        Commands::Watch { job_id, interval } => {
            executor
                .watch(&job_id, interval.map(Duration::from_millis))
                .await?;
        }

        Commands::Status { job_id } => executor.status(&job_id).await?,

        Commands::History {
            page,
            per_page,
            posters,
        } => executor.history(page, per_page, posters).await?,

        Commands::Improve { prompt } => executor.improve(&prompt).await?,

        Commands::Compose {
            base,
            variant,
            mode,
        } => executor.compose(&base, &variant, mode.into()).await?,

        Commands::Thumbs { source } => executor.thumbs(&source).await?,

        Commands::Scrub {
            source,
            x,
            y,
            width,
            height,
            duration,
        } => {
            let request = ScrubRequest {
                x,
                y,
                width,
                height,
                duration,
            };
            executor.scrub(&source, request).await?;
        }

        Commands::Sources { job_id, capability } => {
            executor.sources(&job_id, capability.into()).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .init();
}
