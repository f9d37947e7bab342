use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::conflict::ResolutionStrategy;

#[derive(Parser)]
#[command(
    name = "respec",
    about = "Incremental documentation generator that keeps hand edits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(help = "Project root (default: auto-detect from cwd)")]
    pub path: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase log verbosity (-v, -vv)")]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Regenerate documentation for changed sources")]
    Run(RunArgs),
    #[command(about = "Cache statistics and integrity")]
    Status {
        #[arg(help = "Project root (default: auto-detect from cwd)")]
        path: Option<PathBuf>,
    },
    #[command(about = "List new, changed, unchanged and deleted sources")]
    Scan {
        #[arg(help = "Project root (default: auto-detect from cwd)")]
        path: Option<PathBuf>,
    },
    #[command(about = "Estimate how much work a run would do")]
    Estimate {
        #[arg(help = "Project root (default: auto-detect from cwd)")]
        path: Option<PathBuf>,
    },
    #[command(about = "Drop cache entries for deleted or stale files")]
    Cleanup {
        #[arg(long, help = "Maximum entry age in days (default: from config)")]
        max_age_days: Option<f64>,
        #[arg(help = "Project root (default: auto-detect from cwd)")]
        path: Option<PathBuf>,
    },
    #[command(about = "Check cache integrity; exits non-zero on problems")]
    Verify {
        #[arg(help = "Project root (default: auto-detect from cwd)")]
        path: Option<PathBuf>,
    },
    #[command(about = "Write the cache as a JSON document")]
    Export {
        #[arg(help = "Destination file")]
        output: PathBuf,
        #[arg(help = "Project root (default: auto-detect from cwd)")]
        path: Option<PathBuf>,
    },
    #[command(about = "Show what merging two documents would produce")]
    Preview {
        #[arg(help = "Existing document")]
        base: PathBuf,
        #[arg(help = "Newly generated document")]
        new: PathBuf,
        #[arg(long, short, default_value = "intelligent", help = "replace, append, prepend or intelligent")]
        strategy: String,
    },
}

#[derive(Args, Default)]
pub struct RunArgs {
    #[arg(long, short, help = "Regenerate even unchanged sources")]
    pub force: bool,
    #[arg(long, short, help = "Conflict strategy for every file (e.g. merge_intelligent, keep_ours)")]
    pub strategy: Option<ResolutionStrategy>,
    #[arg(long, short, help = "Process at most this many files")]
    pub limit: Option<usize>,
    #[arg(long, help = "Commit generated files when done")]
    pub commit: bool,
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var, help = "Template variable, repeatable")]
    pub vars: Vec<(String, String)>,
    #[arg(help = "Project root (default: auto-detect from cwd)")]
    pub path: Option<PathBuf>,
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_parsing() {
        assert_eq!(
            parse_var("author=Ada = L").unwrap(),
            ("author".to_string(), "Ada = L".to_string())
        );
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }
}
