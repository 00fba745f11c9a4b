//! Operator confirmation before money is spent on a submission.
//!
//! The lifecycle takes any [`ConfirmGate`]: the terminal prompt in normal
//! runs, [`AutoConfirm`] for `--yes`, or a closure in tests.

use std::fmt;
use std::io;
use std::path::PathBuf;

use console::{Style, Term};

use crate::error::PipelineError;
use crate::tasks::TaskKind;

/// What is about to be submitted, shown before the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkPreview {
    pub kind: TaskKind,
    pub model: String,
    pub request_file: PathBuf,
    pub start: usize,
    pub end: usize,
    pub items: usize,
    pub chars: usize,
    pub price_per_mtok: f64,
}

impl ChunkPreview {
    /// Rough token count at four characters per token.
    pub fn estimated_tokens(&self) -> usize {
        self.chars / 4
    }

    /// Predicted input cost in dollars.
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_tokens() as f64 * self.price_per_mtok / 1_000_000.0
    }
}

impl fmt::Display for ChunkPreview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batch {}..={} ({} items, {} chars, ~{} tokens, ~${:.4}) on {} from {}",
            self.kind,
            self.start,
            self.end,
            self.items,
            self.chars,
            self.estimated_tokens(),
            self.estimated_cost(),
            self.model,
            self.request_file.display()
        )
    }
}

pub trait ConfirmGate {
    /// `true` to submit, `false` to abandon this chunk.
    async fn confirm(&self, preview: &ChunkPreview) -> Result<bool, PipelineError>;
}

/// Approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmGate for AutoConfirm {
    async fn confirm(&self, _preview: &ChunkPreview) -> Result<bool, PipelineError> {
        Ok(true)
    }
}

/// Asks on the terminal; only `y`/`yes` approves.
pub struct TerminalConfirm {
    term: Term,
    read_answer: fn(&Term) -> io::Result<String>,
}

impl TerminalConfirm {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            read_answer: read_line,
        }
    }
}

fn read_line(term: &Term) -> io::Result<String> {
    term.read_line()
}

impl Default for TerminalConfirm {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmGate for TerminalConfirm {
    async fn confirm(&self, preview: &ChunkPreview) -> Result<bool, PipelineError> {
        let term = self.term.clone();
        let read_answer = self.read_answer;
        let preview = preview.clone();
        // Reading stdin blocks; it runs off the runtime so Ctrl-C is still seen.
        let answer = tokio::task::spawn_blocking(move || {
            let bold = Style::new().bold();
            term.write_line(&format!("{} {preview}", bold.apply_to("Ready:")))?;
            term.write_str("Submit this batch? [y/N] ")?;
            read_answer(&term)
        })
        .await
        .map_err(io::Error::other)??;
        Ok(approves(&answer))
    }
}

impl<F> ConfirmGate for F
where
    F: Fn(&ChunkPreview) -> bool,
{
    async fn confirm(&self, preview: &ChunkPreview) -> Result<bool, PipelineError> {
        Ok(self(preview))
    }
}

fn approves(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> ChunkPreview {
        ChunkPreview {
            kind: TaskKind::Lean,
            model: "gpt-4o".into(),
            request_file: PathBuf::from("requests_in/batch_lean_in.jsonl"),
            start: 0,
            end: 9,
            items: 10,
            chars: 40_000,
            price_per_mtok: 2.5,
        }
    }

    #[test]
    fn estimates_tokens_and_cost() {
        let p = preview();
        assert_eq!(p.estimated_tokens(), 10_000);
        assert!((p.estimated_cost() - 0.025).abs() < 1e-12);
    }

    #[test]
    fn display_names_range_and_file() {
        let text = preview().to_string();
        assert!(text.starts_with("lean batch 0..=9 (10 items"), "{text}");
        assert!(text.contains("batch_lean_in.jsonl"));
    }

    #[tokio::test]
    async fn auto_confirm_approves() {
        assert!(AutoConfirm.confirm(&preview()).await.unwrap());
    }

    #[tokio::test]
    async fn closure_gate_sees_preview() {
        let gate = |p: &ChunkPreview| p.items < 5;
        assert!(!gate.confirm(&preview()).await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn terminal_prompt_leaves_runtime_free() {
        fn slow_yes(_: &Term) -> io::Result<String> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            Ok("y\n".into())
        }
        let gate = TerminalConfirm {
            term: Term::stderr(),
            read_answer: slow_yes,
        };
        let p = preview();

        let raced = tokio::select! {
            biased;
            answer = gate.confirm(&p) => Some(answer.unwrap()),
            _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => None,
        };
        assert_eq!(raced, None);
        assert!(gate.confirm(&p).await.unwrap());
    }

    #[test]
    fn only_yes_approves() {
        assert!(approves("y"));
        assert!(approves(" YES\n"));
        assert!(!approves(""));
        assert!(!approves("no"));
        assert!(!approves("yep"));
    }
}
