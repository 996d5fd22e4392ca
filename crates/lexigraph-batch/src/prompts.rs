//! Prompt list parsing.
//!
//! One prompt per line. Blank lines and lines starting with `#` are skipped.
//! A line may start with a priority tag such as `high: a lighthouse at dusk`;
//! a prefix that is not a priority name stays part of the prompt.

use lexigraph_jobs::Priority;
use std::io::BufRead;

/// A prompt read from the input, with its priority and source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptLine {
    pub line: usize,
    pub prompt: String,
    pub priority: Priority,
}

/// Parses a single input line. Returns `None` for blanks and comments.
pub fn parse_line(line: usize, raw: &str, default_priority: Priority) -> Option<PromptLine> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('#') {
        return None;
    }

    let (priority, prompt) = match text.split_once(':') {
        Some((tag, rest)) if !rest.trim().is_empty() => match tag.parse::<Priority>() {
            Ok(priority) => (priority, rest.trim()),
            Err(_) => (default_priority, text),
        },
        _ => (default_priority, text),
    };

    Some(PromptLine {
        line,
        prompt: prompt.to_string(),
        priority,
    })
}

/// Reads every prompt from `reader`, numbering lines from 1.
pub fn read_prompts<R: BufRead>(reader: R, default_priority: Priority) -> std::io::Result<Vec<PromptLine>> {
    let mut prompts = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if let Some(prompt) = parse_line(index + 1, &line?, default_priority) {
            prompts.push(prompt);
        }
    }
    Ok(prompts)
}
