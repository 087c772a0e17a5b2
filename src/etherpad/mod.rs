//! Etherpad document service.
//!
//! The purge engine only depends on the [`PadService`] trait; the
//! [`EtherpadClient`] implements it over the Etherpad HTTP API and adds the
//! single-pad maintenance calls (move, copy) used by the CLI.

mod client;
mod error;
#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use client::{API_VERSION, EtherpadClient};
pub use error::{EtherpadError, EtherpadResult};

/// Operations the purge engine needs from the document service.
///
/// Every call is a single request/response and may fail; implementations own
/// their transport, authentication and envelope decoding.
#[async_trait]
pub trait PadService: Send + Sync {
    /// Returns the identifiers of all pads.
    async fn list_all_pads(&self) -> EtherpadResult<Vec<String>>;

    /// Returns the number of revisions of a pad.
    async fn get_revisions_count(&self, pad_id: &str) -> EtherpadResult<u64>;

    /// Returns the time of the last modification of a pad.
    async fn get_last_edited(&self, pad_id: &str) -> EtherpadResult<DateTime<Utc>>;

    /// Removes a pad entirely.
    async fn delete_pad(&self, pad_id: &str) -> EtherpadResult<()>;
}
