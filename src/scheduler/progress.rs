use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::outcome::ItemOutcome;

/// Receives each item's outcome as soon as it is known.
///
/// Called once per item, possibly from several tasks at the same time.
pub trait ProgressReporter: Send + Sync {
    fn on_item_complete(&self, outcome: &ItemOutcome);
}

/// Discards all events.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn on_item_complete(&self, _outcome: &ItemOutcome) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Items finished so far, including this one.
    pub completed: usize,
    pub total: usize,
    pub outcome: ItemOutcome,
    pub at: DateTime<Utc>,
}

/// Forwards events over an unbounded channel so a slow consumer never stalls the batch.
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    total: usize,
    completed: AtomicUsize,
}

impl ChannelReporter {
    pub fn new(total: usize) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                total,
                completed: AtomicUsize::new(0),
            },
            rx,
        )
    }
}

impl ProgressReporter for ChannelReporter {
    fn on_item_complete(&self, outcome: &ItemOutcome) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ProgressEvent {
            completed,
            total: self.total,
            outcome: outcome.clone(),
            at: Utc::now(),
        };

        if self.tx.send(event).is_err() {
            tracing::debug!(item = %outcome.key(), "Progress receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::pipeline::state::ItemKey;

    fn outcome(index: usize) -> ItemOutcome {
        ItemOutcome::failure(
            ItemKey {
                index,
                name: format!("company {index}"),
            },
            &AppError::Cancelled,
            None,
        )
    }

    #[test]
    fn test_channel_reporter_counts_completions() {
        let (reporter, mut rx) = ChannelReporter::new(2);
        reporter.on_item_complete(&outcome(1));
        reporter.on_item_complete(&outcome(0));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!((first.completed, first.total), (1, 2));
        assert_eq!(first.outcome.key().index, 1);
        assert_eq!(second.completed, 2);
    }

    #[test]
    fn test_channel_reporter_tolerates_closed_receiver() {
        let (reporter, rx) = ChannelReporter::new(1);
        drop(rx);
        reporter.on_item_complete(&outcome(0));
    }
}
