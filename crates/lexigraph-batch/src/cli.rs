//! Command-line arguments.

use clap::Parser;
use lexigraph_jobs::{Priority, StylePreset};
use std::path::PathBuf;

/// Runs a list of prompts through the batch generation queue.
#[derive(Parser, Debug)]
#[command(name = "lexigraph-batch", version, about)]
pub struct Cli {
    /// Prompt file, one prompt per line. Reads stdin when omitted or `-`.
    pub input: Option<PathBuf>,

    /// Directory holding `default.toml` and environment overrides.
    #[arg(long, env = "LEXIGRAPH_CONFIG_DIR", default_value = "config")]
    pub config_dir: String,

    /// Overrides `batch.max_concurrent`.
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Priority for lines without a priority tag.
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Style preset applied to every prompt.
    #[arg(long)]
    pub style: Option<StylePreset>,

    /// Simulated delay per inference step, in milliseconds.
    #[arg(long, default_value_t = 25)]
    pub step_delay_ms: u64,

    /// Make every n-th generation fail halfway through.
    #[arg(long)]
    pub fail_every: Option<u64>,

    /// Print every job alongside the final statistics.
    #[arg(long)]
    pub jobs: bool,
}

impl Cli {
    /// Input path, or `None` for stdin.
    pub fn input_path(&self) -> Option<&PathBuf> {
        self.input.as_ref().filter(|path| path.as_os_str() != "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["lexigraph-batch"]);
        assert!(cli.input_path().is_none());
        assert_eq!(cli.config_dir, "config");
        assert_eq!(cli.priority, Priority::Normal);
        assert_eq!(cli.step_delay_ms, 25);
        assert!(cli.concurrency.is_none());
    }

    #[test]
    fn test_dash_means_stdin() {
        let cli = Cli::parse_from(["lexigraph-batch", "-"]);
        assert!(cli.input_path().is_none());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from([
            "lexigraph-batch",
            "prompts.txt",
            "-j",
            "3",
            "--priority",
            "high",
            "--style",
            "anime",
            "--fail-every",
            "4",
        ]);
        assert_eq!(cli.input_path(), Some(&PathBuf::from("prompts.txt")));
        assert_eq!(cli.concurrency, Some(3));
        assert_eq!(cli.priority, Priority::High);
        assert_eq!(cli.style, Some(StylePreset::Anime));
        assert_eq!(cli.fail_every, Some(4));
    }
}
