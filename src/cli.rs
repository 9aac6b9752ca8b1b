//! CLI argument parsing.
//!
//! The default invocation takes the test report path and runs the status
//! update; `ping` produces such a report.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "da-status",
    version,
    about = "Update the service status page from a JUnit test report",
    after_help = "Environment:\n  DA_ADMIN_HOST   document store base URL\n  HLX_ADMIN_HOST  publish API base URL\n  SLACK_TOKEN     chat credential (alerts disabled when unset)\n  SLACK_CHANNEL   chat channel for alerts\n  SKIP_PUBLISH    when set, upload without preview/publish\n  CLIENT_ID, CLIENT_SECRET  identity-service credentials\n\nExamples:\n  da-status ping --out results.xml\n  da-status results.xml",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// JUnit-style XML report produced by the test run
    #[arg(value_name = "REPORT", required = true)]
    pub report: Option<PathBuf>,

    /// JSON settings overriding services, accepted upload statuses and paths
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Ping(PingArgs),
}

/// Ping command inputs.
#[derive(Parser, Debug)]
#[command(about = "Check every service and write a JUnit report")]
pub struct PingArgs {
    /// Write the report here instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_path_is_positional() {
        let args = RootArgs::try_parse_from(["da-status", "results.xml"]).expect("parse");
        assert_eq!(args.report, Some(PathBuf::from("results.xml")));
        assert!(args.command.is_none());
    }

    #[test]
    fn report_is_required_without_subcommand() {
        let err = RootArgs::try_parse_from(["da-status"]).expect_err("missing report");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn ping_needs_no_report() {
        let args = RootArgs::try_parse_from(["da-status", "ping", "--out", "r.xml"]).expect("parse");
        let Some(Command::Ping(ping)) = args.command else {
            panic!("expected ping");
        };
        assert_eq!(ping.out, Some(PathBuf::from("r.xml")));
    }
}
