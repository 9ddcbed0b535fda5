//! Shared viewing window
//!
//! Charts hand every candidate range they would like to show to
//! [`TimeWindow::display_time_range`]. A window set by the user (pan or
//! zoom) wins while it still overlaps live data and is dropped once it
//! stops being relevant.

use crate::models::TimeRange;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

/// The one optional user-selected window, shared by every chart
#[derive(Debug, Default)]
pub struct TimeWindow {
    range: RwLock<Option<TimeRange>>,
}

impl TimeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored window
    pub fn set_time_window(&self, range: TimeRange) {
        *self.range.write() = Some(range);
    }

    pub fn get_time_window(&self) -> Option<TimeRange> {
        *self.range.read()
    }

    pub fn clear(&self) {
        *self.range.write() = None;
    }

    /// Range a chart should display given the range its data covers
    pub fn display_time_range(&self, candidate: TimeRange) -> TimeRange {
        self.display_time_range_at(candidate, Utc::now())
    }

    /// Same as [`display_time_range`](Self::display_time_range) with an explicit clock
    pub fn display_time_range_at(&self, candidate: TimeRange, now: DateTime<Utc>) -> TimeRange {
        let mut range = self.range.write();
        let Some(stored) = *range else {
            return candidate;
        };

        if stored.start > now {
            debug!(start = %stored.start, "Clearing time window that starts in the future");
            *range = None;
            return candidate;
        }
        if !stored.overlaps(&candidate) {
            debug!(
                start = %stored.start,
                end = %stored.end,
                "Clearing time window disjoint from live data"
            );
            *range = None;
            return candidate;
        }
        stored
    }
}
