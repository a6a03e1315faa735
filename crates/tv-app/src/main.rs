//! Replays a scripted sequence of range signals through the coordination
//! core and prints what the range widget would show.

mod replay;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tv_core::CoordinationSettings;

use crate::replay::{Replay, Script};

#[derive(Parser, Debug)]
#[command(name = "trace-ranges")]
#[command(about = "Replay range signals through the trace viewer's range coordination")]
struct Args {
    /// JSON replay script
    script: PathBuf,

    /// Coordination settings file (JSON)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Print the store contents after the replay
    #[arg(long)]
    save: bool,

    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => CoordinationSettings::from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => CoordinationSettings::default(),
    };

    // Initialize tracing
    let level = if args.verbose {
        Level::DEBUG
    } else {
        settings.log_level.parse().unwrap_or(Level::INFO)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Failed to read {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&text).context("Malformed replay script")?;
    info!(steps = script.steps.len(), "Replaying range script");

    let replay = Replay::new();
    for line in replay.run(script)? {
        println!("{}", line);
    }
    if args.save {
        println!("{}", replay.saved_state()?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_flags() {
        let args = Args::try_parse_from([
            "trace-ranges",
            "demos/session.json",
            "--settings",
            "settings.json",
            "--save",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.script, PathBuf::from("demos/session.json"));
        assert_eq!(args.settings, Some(PathBuf::from("settings.json")));
        assert!(args.save);
        assert!(args.verbose);
    }

    #[test]
    fn test_args_require_script() {
        assert!(Args::try_parse_from(["trace-ranges", "--save"]).is_err());
        assert!(Args::try_parse_from(["trace-ranges", "a.json", "--loud"]).is_err());
    }
}
