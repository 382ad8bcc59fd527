//! The seam between the coordinator and a store instance.
//!
//! The coordinator only ever needs two capabilities from an instance: read
//! its persistence status report and ask it to start a log rewrite. Anything
//! implementing [`StoreInstance`] can be coordinated; [`crate::redis`]
//! provides the implementation for Redis-compatible servers.

use std::time::Duration;

use aofc_status::PersistenceSnapshot;
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::trace;

use crate::error::{ClientError, CoordinatorError};

/// A store instance under coordination.
#[async_trait]
pub trait StoreInstance: Send + Sync {
    /// Stable name used in logs (usually the address).
    fn name(&self) -> &str;

    /// Fetch the raw `key:value` persistence status report.
    async fn query_status(&self) -> Result<String, ClientError>;

    /// Ask the instance to start a log rewrite in the background.
    async fn trigger_rewrite(&self) -> Result<(), ClientError>;
}

/// Query and parse an instance's status, bounded by `deadline`.
pub async fn probe(
    instance: &dyn StoreInstance,
    deadline: Duration,
) -> Result<PersistenceSnapshot, CoordinatorError> {
    let report = match timeout(deadline, instance.query_status()).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(deadline)),
    }
    .map_err(|source| CoordinatorError::Query {
        instance: instance.name().to_string(),
        source,
    })?;

    trace!(instance = %instance.name(), report = %report, "Persistence status report");

    PersistenceSnapshot::parse(&report).map_err(|source| CoordinatorError::Parse {
        instance: instance.name().to_string(),
        source,
    })
}

/// Ask an instance to rewrite its log, bounded by `deadline`.
pub async fn trigger(
    instance: &dyn StoreInstance,
    deadline: Duration,
) -> Result<(), CoordinatorError> {
    match timeout(deadline, instance.trigger_rewrite()).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(deadline)),
    }
    .map_err(|source| CoordinatorError::Trigger {
        instance: instance.name().to_string(),
        source,
    })
}
