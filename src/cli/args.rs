//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the file-transfer tool
#[derive(Debug, Parser)]
#[command(name = "rust-file-transfer")]
#[command(about = "A resumable file-transfer CLI with a local file server", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve local files over the wire protocol
    Serve {
        /// Files to register, served under their file names
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Port to bind; 0 asks the OS for a free port
        #[arg(short, long, default_value_t = 0)]
        port: u16,

        /// Credential clients must present in the Authorization header
        #[arg(short, long)]
        credential: String,

        /// Empty the content registry when the server shuts down
        #[arg(long)]
        clear_on_shutdown: bool,
    },

    /// Download a URL to a local file
    Fetch {
        /// Source URL (http, https, or fetchlocal)
        url: String,

        /// Destination file path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Authorization header value sent to the source
        #[arg(short, long)]
        authorization: Option<String>,

        /// Number of concurrent transfer workers
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve() {
        let args = CliArgs::parse_from([
            "rust-file-transfer",
            "serve",
            "a.bin",
            "b.bin",
            "--credential",
            "password",
            "--port",
            "9000",
        ]);
        match args.command {
            Command::Serve { files, port, credential, clear_on_shutdown } => {
                assert_eq!(files.len(), 2);
                assert_eq!(port, 9000);
                assert_eq!(credential, "password");
                assert!(!clear_on_shutdown);
            }
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_parse_fetch_defaults() {
        let args = CliArgs::parse_from(["rust-file-transfer", "fetch", "http://example.com/a.bin"]);
        match args.command {
            Command::Fetch { url, output, authorization, workers } => {
                assert_eq!(url, "http://example.com/a.bin");
                assert!(output.is_none());
                assert!(authorization.is_none());
                assert_eq!(workers, 4);
            }
            _ => panic!("expected fetch command"),
        }
    }

    #[test]
    fn test_log_level() {
        let mut args = CliArgs::parse_from(["rust-file-transfer", "fetch", "http://example.com/a"]);
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
