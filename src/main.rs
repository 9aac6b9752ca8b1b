use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod auth;
mod cli;
mod collab;
mod config;
mod http;
mod notify;
mod page;
mod ping;
mod publish;
mod report;
mod status;
mod store;
mod workflow;

use cli::{Command, PingArgs, RootArgs};
use config::{Settings, StatusConfig};
use http::UreqClient;

fn main() -> ExitCode {
    let args = match RootArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            // Help and version go to stdout; everything else is a usage error.
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_tracing();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

fn run(args: RootArgs) -> Result<ExitCode> {
    let settings = match &args.config {
        Some(path) => config::load_settings(path)?,
        None => Settings::default(),
    };
    let config = StatusConfig::from_env(settings)?;
    let http = UreqClient::new();
    tracing::info!(da_admin_host = %config.hosts.da_admin, "using document store");

    match args.command {
        Some(Command::Ping(ping_args)) => cmd_ping(&config, &http, &ping_args),
        None => {
            let report = args
                .report
                .ok_or_else(|| anyhow!("expected a test report path"))?;
            let outcome = workflow::run_status_update(&config, &http, &report)?;
            for entry in &outcome.services {
                println!("{}: {}", entry.service, entry.status);
            }
            println!("{}", outcome.last_updated);
            if let Some(url) = &outcome.live_url {
                println!("published at {url}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_ping(config: &StatusConfig, http: &UreqClient, args: &PingArgs) -> Result<ExitCode> {
    let report = ping::run_ping_suite(config, http, &collab::WsConnector);
    let xml = report.to_junit_xml()?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, xml.as_bytes())
                .with_context(|| format!("write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => print!("{xml}"),
    }
    if report.failures() > 0 {
        tracing::warn!(failures = report.failures(), "ping suite has failures");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
