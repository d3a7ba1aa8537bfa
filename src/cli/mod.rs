//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Run, check, fix, repeat: heal a project with a coding agent
#[derive(Debug, Parser, Clone)]
#[command(name = "healer")]
#[command(version)]
#[command(about = "Runs a pipeline and lets a coding agent fix it until its markers pass", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline until its markers pass
    Run(RunCommand),

    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "healer",
            "run",
            "-f",
            "pipeline.yaml",
            "--max-iterations",
            "3",
            "--variable",
            "profile=release",
            "--no-history",
        ])
        .unwrap();

        match cli.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.file, "pipeline.yaml");
                assert_eq!(cmd.max_iterations, Some(3));
                assert_eq!(cmd.variable, vec![("profile".to_string(), "release".to_string())]);
                assert!(cmd.no_history);
            }
            other => panic!("Expected run command, got {:?}", other),
        }
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::try_parse_from(["healer", "validate", "-f", "p.yaml", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_bad_variable_is_rejected() {
        assert!(Cli::try_parse_from(["healer", "run", "-f", "p.yaml", "--variable", "novalue"]).is_err());
    }
}
