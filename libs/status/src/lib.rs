//! # aofc-status
//!
//! Parsing of a store instance's self-reported persistence status and the
//! policy math used to decide whether a queued AOF rewrite may be fired.
//!
//! A status report is newline-delimited `key:value` text, as returned by
//! `INFO persistence`:
//!
//! ```text
//! # Persistence
//! rdb_bgsave_in_progress:0
//! aof_enabled:1
//! aof_rewrite_scheduled:1
//! aof_current_size:176
//! aof_base_size:100
//! ```
//!
//! ## Invariants
//!
//! - Parsing has no I/O and is deterministic: the same text always yields an
//!   equal [`PersistenceSnapshot`].
//! - Unknown keys are ignored so newer store versions keep parsing.
//! - A malformed value for a known key rejects the whole report.

mod error;
pub mod keys;
mod snapshot;

pub use error::{ParseError, ValueKind};
pub use snapshot::{growth_rate_percent, PersistenceSnapshot, DEFAULT_GROWTH_THRESHOLD_PERCENT};
