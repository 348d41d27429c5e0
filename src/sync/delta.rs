//! Per-record delta decisions against the watermark

use super::{AlertRecord, Watermark};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use tracing::debug;

/// Decision for a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Newer than the watermark
    Accept,
    /// Same day as the watermark and not newer; keep scanning
    Skip,
    /// Older day than the watermark; nothing after it can be new
    Stop,
}

/// Result of screening one page
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub accepted: Vec<AlertRecord>,
    pub skipped: usize,
    pub stop_paging: bool,
}

/// Screens newest-first pages against a fixed watermark and tracks the
/// highest accepted position across all pages of a run.
#[derive(Debug, Clone)]
pub struct DeltaFilter {
    watermark: Option<Watermark>,
    candidate: Option<Watermark>,
    verify_order: bool,
    last_date: Option<NaiveDate>,
}

impl DeltaFilter {
    pub fn new(watermark: Option<Watermark>) -> Self {
        Self {
            watermark,
            candidate: None,
            verify_order: false,
            last_date: None,
        }
    }

    /// Fail on records whose alert date rises within the stream
    pub fn with_order_check(mut self, enabled: bool) -> Self {
        self.verify_order = enabled;
        self
    }

    /// Highest `(alert_date, record_timestamp)` accepted so far
    pub fn candidate(&self) -> Option<&Watermark> {
        self.candidate.as_ref()
    }

    pub fn into_candidate(self) -> Option<Watermark> {
        self.candidate
    }

    /// Classify a record without touching filter state
    pub fn classify(&self, record: &AlertRecord) -> Verdict {
        let Some(wm) = &self.watermark else {
            return Verdict::Accept;
        };

        if record.alert_date < wm.alert_date {
            Verdict::Stop
        } else if record.alert_date == wm.alert_date
            && record.record_timestamp.as_str() <= wm.record_timestamp.as_str()
        {
            Verdict::Skip
        } else {
            Verdict::Accept
        }
    }

    /// Screen one page in delivery order.
    ///
    /// On the first `Stop` the rest of the page is discarded and
    /// `stop_paging` is set.
    pub fn screen(&mut self, page: Vec<AlertRecord>) -> Result<PageOutcome> {
        let mut outcome = PageOutcome::default();

        for record in page {
            if self.verify_order {
                self.check_order(&record)?;
            }

            match self.classify(&record) {
                Verdict::Stop => {
                    debug!(
                        record_id = %record.record_id,
                        alert_date = %record.alert_date,
                        "reached records older than watermark"
                    );
                    outcome.stop_paging = true;
                    break;
                }
                Verdict::Skip => {
                    outcome.skipped += 1;
                }
                Verdict::Accept => {
                    let position = Watermark::of(&record);
                    if self.candidate.as_ref().map_or(true, |c| position > *c) {
                        self.candidate = Some(position);
                    }
                    outcome.accepted.push(record);
                }
            }
        }

        Ok(outcome)
    }

    fn check_order(&mut self, record: &AlertRecord) -> Result<()> {
        if let Some(previous) = self.last_date {
            if record.alert_date > previous {
                return Err(Error::OrderViolation(format!(
                    "record {} dated {} follows a record dated {}",
                    record.record_id, record.alert_date, previous
                )));
            }
        }
        self.last_date = Some(record.alert_date);
        Ok(())
    }
}
