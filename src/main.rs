#![allow(async_fn_in_trait)]

mod auth;
mod catalogue;
mod cli;
mod config;
mod downloader;
mod error;
mod pipeline;
mod regions;
mod retry;
mod types;

use anyhow::Context;
use auth::{Authenticator, Credentials, Session};
use clap::Parser;
use cli::Cli;
use colored::*;
use config::RunConfig;
use log::{error, info};
use pipeline::Orchestrator;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_file)?;
    info!("Starting Sentinel-2 downloader");

    let config = RunConfig::from_cli(&cli)?;

    let credentials = match prompt_credentials(cli.username.as_deref()) {
        Ok(credentials) => credentials,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            eprintln!("\n{}", "Operation cancelled by user".yellow());
            info!("Credential prompt aborted: {}", e);
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read credentials: {}", e);
            return Err(e).context("Failed to read credentials");
        }
    };

    let client = reqwest::Client::new();
    let authenticator =
        Authenticator::new(client.clone(), &config.endpoints.identity_url, credentials);
    let mut session = match Session::open(authenticator).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to connect: {}", e);
            eprintln!("\n{} {}", "Error:".red(), e);
            return Err(e).context(
                "Could not connect to Copernicus Data Space. Please check your credentials.",
            );
        }
    };

    println!("\n{}", "Starting Sentinel-2 download process...".bold());
    println!(
        "Date range: {} to {}",
        config.query.start.format("%Y-%m-%d"),
        config.query.end.format("%Y-%m-%d")
    );
    println!("Regions: {}", config.regions.join(", "));
    println!("Output directory: {}", config.output_dir.display());

    let orchestrator = Orchestrator::new(
        client,
        &config.endpoints,
        config.retry,
        config.download_delay,
    );
    let summary = orchestrator
        .download_sentinel_images(&mut session, &config.regions, &config.query, &config.output_dir)
        .await
        .map_err(|e| {
            error!("Program error: {}", e);
            e
        })?;

    info!(
        "Run finished: {} found, {} downloaded, {} failed",
        summary.total_products,
        summary.downloaded,
        summary.failed()
    );
    Ok(())
}

/// Sends `timestamp - LEVEL - message` lines to `path`, appending. `RUST_LOG` overrides the
/// default `info` level.
fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                buf.timestamp_millis(),
                record.level(),
                record.args()
            )
        })
        .init();
    Ok(())
}

fn prompt_credentials(username: Option<&str>) -> io::Result<Credentials> {
    println!("\nPlease enter your Copernicus Data Space credentials:");

    let username = match username {
        Some(username) => username.to_string(),
        None => {
            print!("Username: ");
            io::stdout().flush()?;
            read_username(&mut io::stdin().lock())?
        }
    };

    let password = rpassword::prompt_password("Password: ")?;
    Ok(Credentials::new(&username, &password))
}

/// A closed input is an error, not an empty username.
fn read_username<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "no username"));
    }
    Ok(line.trim().to_string())
}
