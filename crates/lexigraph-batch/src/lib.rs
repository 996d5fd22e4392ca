//! # Lexigraph Batch Runner
//!
//! Reads prompts, queues them on a [`lexigraph_jobs::Scheduler`] backed by the
//! simulated generation executor, and reports the final queue statistics.

pub mod cli;
pub mod prompts;
pub mod runner;

pub use cli::Cli;
pub use prompts::{parse_line, read_prompts, PromptLine};
pub use runner::{build_requests, run_batch, BatchOptions, BatchReport, JobSummary, SkippedPrompt};
