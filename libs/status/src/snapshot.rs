//! Structured view of one persistence status report.

use crate::error::{ParseError, ValueKind};
use crate::keys;

/// Growth (in percent over the base size) a log must exceed before a queued
/// rewrite is fired.
pub const DEFAULT_GROWTH_THRESHOLD_PERCENT: i64 = 75;

/// Persistence state of one store instance at the moment it was polled.
///
/// Built fresh from every status report and never modified afterwards.
/// Fields not present in the report keep their zero value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistenceSnapshot {
    /// A full snapshot save is currently running.
    pub bgsave_in_progress: bool,

    /// Seconds spent on the running snapshot save, -1 when none runs.
    pub bgsave_elapsed_seconds: i64,

    /// Incremental-log (AOF) persistence is active.
    pub rewrite_enabled: bool,

    /// A log rewrite is currently running.
    pub rewrite_in_progress: bool,

    /// A rewrite is queued to start once the running snapshot save ends.
    pub rewrite_scheduled: bool,

    /// Seconds spent on the running rewrite, -1 when none runs.
    pub rewrite_elapsed_seconds: i64,

    /// Current log size in bytes.
    pub current_log_size: i64,

    /// Log size in bytes at the last rewrite or startup.
    pub base_log_size: i64,
}

impl PersistenceSnapshot {
    /// Parse a newline-delimited `key:value` status report.
    ///
    /// Blank lines, section headers and other lines without a colon are
    /// skipped. The first malformed value of a recognized key aborts the
    /// parse; no partially filled snapshot is ever returned.
    pub fn parse(report: &str) -> Result<Self, ParseError> {
        let mut snapshot = Self::default();
        for line in report.trim().lines() {
            snapshot.apply_line(line)?;
        }
        Ok(snapshot)
    }

    fn apply_line(&mut self, line: &str) -> Result<(), ParseError> {
        let mut parts = line.trim().split(':');
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            return Ok(());
        };

        match key {
            keys::RDB_BGSAVE_IN_PROGRESS => self.bgsave_in_progress = parse_bool(key, value)?,
            keys::RDB_CURRENT_BGSAVE_TIME_SEC => {
                self.bgsave_elapsed_seconds = parse_int(key, value)?
            }
            keys::AOF_ENABLED => self.rewrite_enabled = parse_bool(key, value)?,
            keys::AOF_REWRITE_IN_PROGRESS => self.rewrite_in_progress = parse_bool(key, value)?,
            keys::AOF_REWRITE_SCHEDULED => self.rewrite_scheduled = parse_bool(key, value)?,
            keys::AOF_CURRENT_REWRITE_TIME_SEC => {
                self.rewrite_elapsed_seconds = parse_int(key, value)?
            }
            keys::AOF_CURRENT_SIZE => self.current_log_size = parse_int(key, value)?,
            keys::AOF_BASE_SIZE => self.base_log_size = parse_int(key, value)?,
            _ => {}
        }

        Ok(())
    }

    /// Neither a snapshot save nor a rewrite is running.
    pub fn is_idle(&self) -> bool {
        !self.bgsave_in_progress && !self.rewrite_in_progress
    }

    /// Growth of the log over its base size, or `None` when there is no base.
    pub fn growth_rate_percent(&self) -> Option<i64> {
        growth_rate_percent(self.current_log_size, self.base_log_size)
    }

    /// Whether a queued rewrite should be fired now.
    ///
    /// Always true without a base size; otherwise the growth rate must be
    /// strictly greater than `threshold_percent`.
    pub fn should_fire_rewrite(&self, threshold_percent: i64) -> bool {
        match self.growth_rate_percent() {
            None => true,
            Some(rate) => rate > threshold_percent,
        }
    }
}

/// Percentage growth of `current` over `base`, truncated toward zero.
///
/// `(176, 100)` is 76 and `(175, 100)` is 75; a log that shrank yields a
/// negative rate. Returns `None` when `base` is zero.
pub fn growth_rate_percent(current: i64, base: i64) -> Option<i64> {
    if base == 0 {
        return None;
    }
    let rate = (i128::from(current) - i128::from(base)) * 100 / i128::from(base);
    Some(rate.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ParseError> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(invalid(key, value, ValueKind::Bool)),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, ParseError> {
    value
        .parse::<i64>()
        .map_err(|_| invalid(key, value, ValueKind::Int))
}

fn invalid(key: &str, value: &str, kind: ValueKind) -> ParseError {
    ParseError {
        key: key.to_string(),
        raw_value: value.to_string(),
        kind,
    }
}
