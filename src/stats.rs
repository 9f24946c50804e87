use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Done { output: PathBuf, attempts: u32 },
    Failed { reason: String },
}

/// Outcome of every scheduled substream, keyed by descriptor index.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: BTreeMap<usize, SessionOutcome>,
}

impl RecordingReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, index: usize, outcome: SessionOutcome) {
        self.outcomes.insert(index, outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn sessions_done(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, SessionOutcome::Done { .. }))
            .count()
    }

    /// Every scheduled session reached `Done`.
    pub fn is_success(&self) -> bool {
        self.sessions_done() == self.outcomes.len()
    }

    pub fn print(&self) {
        for (index, outcome) in &self.outcomes {
            match outcome {
                SessionOutcome::Done { output, attempts } => println!(
                    "#{} done: {} ({} attempt(s))",
                    index + 1,
                    output.display(),
                    attempts
                ),
                SessionOutcome::Failed { reason } => println!("#{} failed: {}", index + 1, reason),
            }
        }

        let elapsed = self
            .finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at);
        println!(
            "Recorded {} of {} substream(s) in {}s",
            self.sessions_done(),
            self.outcomes.len(),
            elapsed.num_seconds()
        );
    }
}

impl Default for RecordingReport {
    fn default() -> Self {
        Self::new()
    }
}
