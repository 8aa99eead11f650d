use crate::types::TabularRow;
use chrono::{DateTime, Local};
use tracing::{info, warn};

/// Latest spreadsheet rows, replaced wholesale by each accepted refresh.
///
/// Every refresh gets a sequence number when it is issued. Only the completion
/// carrying the most recently issued number is applied, so a slow response can
/// never overwrite data from a newer one.
#[derive(Debug, Default)]
pub struct TabularStore {
    rows: Vec<TabularRow>,
    last_sync: Option<DateTime<Local>>,
    issued: u64,
}

impl TabularStore {
    pub fn rows(&self) -> &[TabularRow] {
        &self.rows
    }

    pub fn last_sync(&self) -> Option<DateTime<Local>> {
        self.last_sync
    }

    pub fn last_sync_label(&self) -> Option<String> {
        self.last_sync
            .map(|t| format!("Last sync: {}", t.format("%H:%M:%S")))
    }

    pub fn begin_refresh(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued
    }

    /// Applies a completed fetch. Returns false when the completion is stale.
    pub fn complete_refresh(&mut self, sequence: u64, rows: Vec<TabularRow>, now: DateTime<Local>) -> bool {
        if sequence != self.issued {
            warn!("Discarding refresh #{} (latest issued is #{})", sequence, self.issued);
            return false;
        }
        info!("Refresh #{} applied with {} rows", sequence, rows.len());
        self.rows = rows;
        self.last_sync = Some(now);
        true
    }
}
