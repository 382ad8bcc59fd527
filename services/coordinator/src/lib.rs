//! AOF rewrite coordinator.
//!
//! Several store instances sharing a host also share its disk bandwidth.
//! When their append-only-file rewrites overlap, persistence I/O contends
//! and every instance suffers. The coordinator polls each instance's
//! persistence status and admits at most one of them to rewrite at a time.
//!
//! ## Architecture
//!
//! ```text
//! FleetScheduler              (one pass per tick, fixed instance order)
//! └── ReadinessGate(instance) (polls until the instance is idle again)
//!     └── PersistenceSnapshot (parsed from INFO persistence)
//! ```
//!
//! - **Fleet scheduler**: skips instances without AOF, opens one gate at a time
//! - **Readiness gate**: fires queued rewrites past the growth threshold,
//!   fail-open on any query or parse error
//! - **Store instance**: the `StoreInstance` seam, implemented over RESP by
//!   `RedisInstance`
//!
//! Shutdown is cooperative: every loop watches a `watch::Receiver<bool>` and
//! returns within about one poll interval of it flipping to `true`.

pub mod config;
pub mod error;
pub mod gate;
pub mod instance;
pub mod redis;
pub mod scheduler;

pub use config::{Config, StoreMode};
pub use error::{ClientError, CoordinatorError};
pub use gate::{ClearReason, GateExit, GatePolicy, GateReport, PollDecision, ReadinessGate};
pub use instance::StoreInstance;
pub use redis::{ClientOptions, RedisInstance};
pub use scheduler::{FleetScheduler, PassStats};
