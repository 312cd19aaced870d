//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// skillsync - reproducible installs of AI agent artifacts
///
/// Installs the skills, agents, commands, hooks and MCP servers pinned in a
/// lock file, in dependency order, for the current repository and client.
#[derive(Parser, Debug)]
#[command(name = "skillsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SKILLSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lock file path or URL (default: ./skills.lock, then the server)
    #[arg(short, long, global = true)]
    pub lock: Option<String>,

    /// Only artifacts supporting this client
    #[arg(long, global = true)]
    pub client: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install everything the lock resolves to for this context
    Install(InstallArgs),

    /// Print the install order without fetching anything
    Resolve(ResolveArgs),

    /// Verify a requirements file against the lock
    Check(CheckArgs),

    /// Manage the artifact cache
    Cache(CacheArgs),
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Install global artifacts only, ignoring the current repository
    #[arg(long)]
    pub global: bool,

    /// Concurrent fetches (default: from config)
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Resolve global artifacts only
    #[arg(long)]
    pub global: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Requirements file
    #[arg(default_value = "requirements.txt")]
    pub requirements: PathBuf,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cache directory
    Path,

    /// Show cache size
    Info,

    /// Delete cached artifacts, clones and lock files
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_install() {
        let cli = Cli::parse_from(["skillsync", "install", "-j", "4", "--global"]);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.jobs, Some(4));
                assert!(args.global);
                assert!(!args.json);
            }
            _ => panic!("expected Install command"),
        }
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "skillsync",
            "resolve",
            "--lock",
            "https://skills.example.com/api/skills/lock",
            "--client",
            "claude",
        ]);
        assert_eq!(
            cli.lock.as_deref(),
            Some("https://skills.example.com/api/skills/lock")
        );
        assert_eq!(cli.client.as_deref(), Some("claude"));
        assert!(matches!(cli.command, Commands::Resolve(_)));
    }

    #[test]
    fn cli_parses_check_default() {
        let cli = Cli::parse_from(["skillsync", "check"]);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.requirements, PathBuf::from("requirements.txt"))
            }
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn cli_parses_cache_clear() {
        let cli = Cli::parse_from(["skillsync", "cache", "clear"]);
        match cli.command {
            Commands::Cache(args) => assert!(matches!(args.action, CacheAction::Clear)),
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["skillsync", "cache", "path"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["skillsync", "-v", "cache", "path"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["skillsync", "-vv", "cache", "path"]);
        assert_eq!(cli.verbose, 2);
    }
}
