//! Notifications published by the coordinator for the UI layer.

use serde::Serialize;

/// Outcome of one pass over the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    /// Items an upload was tried for.
    pub attempted: usize,
    /// Items uploaded, written back, and removed from the queue.
    pub synced: usize,
    /// Items that failed this pass, including ones now needing attention.
    pub failed: usize,
    /// Failures that parked the item as `needs_attention`.
    pub needs_attention: usize,
    /// Items left untried because the drain ran past its deadline.
    pub deferred: usize,
    /// Queue length after the pass.
    pub remaining: usize,
}

impl DrainSummary {
    /// Failures that the next drain will pick up again.
    pub fn retryable_failures(&self) -> usize {
        self.failed - self.needs_attention
    }

    /// User-facing notice, if anything failed.
    ///
    /// Parked items are counted apart from the ones the next drain retries.
    pub fn notice(&self) -> Option<String> {
        let retried = match self.retryable_failures() {
            0 => None,
            1 => Some("1 image failed to upload and will be retried".to_string()),
            n => Some(format!("{n} images failed to upload and will be retried")),
        };
        let parked = match self.needs_attention {
            0 => None,
            1 => Some("1 needs attention".to_string()),
            n => Some(format!("{n} need attention")),
        };

        match (retried, parked) {
            (None, None) => None,
            (Some(retried), None) => Some(retried),
            (Some(retried), Some(parked)) => Some(format!("{retried}, {parked}")),
            (None, Some(_)) => Some(match self.needs_attention {
                1 => "1 image needs attention and will not be retried automatically".to_string(),
                n => format!("{n} images need attention and will not be retried automatically"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Enqueued {
        id: String,
        replaced: Option<String>,
    },
    ItemSynced {
        id: String,
        document_id: String,
        url: String,
    },
    ItemFailed {
        id: String,
        retry_count: u32,
        error: String,
        needs_attention: bool,
    },
    DrainFinished(DrainSummary),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_wording() {
        let mut summary = DrainSummary::default();
        assert_eq!(summary.notice(), None);

        summary.failed = 1;
        assert_eq!(
            summary.notice().as_deref(),
            Some("1 image failed to upload and will be retried")
        );

        summary.failed = 3;
        summary.needs_attention = 1;
        assert_eq!(
            summary.notice().as_deref(),
            Some("2 images failed to upload and will be retried, 1 needs attention")
        );
        assert_eq!(summary.retryable_failures(), 2);

        summary.needs_attention = 2;
        assert_eq!(
            summary.notice().as_deref(),
            Some("1 image failed to upload and will be retried, 2 need attention")
        );

        summary.failed = 2;
        assert_eq!(
            summary.notice().as_deref(),
            Some("2 images need attention and will not be retried automatically")
        );

        summary.failed = 1;
        summary.needs_attention = 1;
        assert_eq!(
            summary.notice().as_deref(),
            Some("1 image needs attention and will not be retried automatically")
        );
    }
}
