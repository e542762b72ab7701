use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge files, cron jobs, services and registry keys to a declared state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the resources in a declaration file
    Apply(ApplyArgs),

    /// Check a declaration file without touching the system
    Validate {
        /// Declaration file (TOML)
        file: PathBuf,
    },

    /// Show the config location and effective settings
    Config,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Declaration file (TOML)
    pub file: PathBuf,

    /// Report what would change without changing anything
    #[arg(short = 'n', long, alias = "dry-run")]
    pub why_run: bool,

    /// Only converge matching resources ("type" or "type.name")
    #[arg(short, long)]
    pub target: Option<String>,

    /// Keep going after a resource fails
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "converge",
            "-vv",
            "apply",
            "site.toml",
            "--why-run",
            "--target",
            "file./etc/motd",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.file, PathBuf::from("site.toml"));
        assert!(args.why_run);
        assert!(args.json);
        assert!(!args.continue_on_failure);
        assert_eq!(args.target.as_deref(), Some("file./etc/motd"));
    }

    #[test]
    fn test_dry_run_alias() {
        let cli = Cli::try_parse_from(["converge", "apply", "site.toml", "--dry-run"]).unwrap();
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert!(args.why_run);
    }
}
