//! Per-pad deletion verdicts.

use chrono::{DateTime, Utc};

use super::policy::RetentionPolicy;
use crate::etherpad::{EtherpadResult, PadService};

/// Why a pad qualifies for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeReason {
    /// The pad was never edited.
    NoHistory,
    /// The last edit is older than the retention window of its class.
    Expired,
}

impl PurgeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoHistory => "no_history",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for PurgeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one pad, derived at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeDecision {
    Keep,
    Delete(PurgeReason),
}

impl PurgeDecision {
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Delete(_))
    }
}

/// Metadata fetched from the document service for one pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadMetadata {
    pub revisions: u64,
    pub last_edited: DateTime<Utc>,
}

/// Decide whether a pad is deletable.
///
/// `window` is the negated retention window from
/// [`RetentionPolicy::effective_window`]. A pad without revisions is always
/// deletable; otherwise it must have been last edited strictly before
/// `now + window`.
pub fn decide(
    metadata: &PadMetadata,
    window: chrono::Duration,
    now: DateTime<Utc>,
) -> PurgeDecision {
    if metadata.revisions == 0 {
        return PurgeDecision::Delete(PurgeReason::NoHistory);
    }
    // Saturate: a window reaching before the representable range never expires.
    match now.checked_add_signed(window) {
        Some(cutoff) if metadata.last_edited < cutoff => {
            PurgeDecision::Delete(PurgeReason::Expired)
        }
        _ => PurgeDecision::Keep,
    }
}

/// Fetch a pad's metadata (two round trips).
pub async fn fetch_metadata(service: &dyn PadService, pad_id: &str) -> EtherpadResult<PadMetadata> {
    let revisions = service.get_revisions_count(pad_id).await?;
    let last_edited = service.get_last_edited(pad_id).await?;
    Ok(PadMetadata {
        revisions,
        last_edited,
    })
}

/// Fetch a pad's metadata and decide whether it is deletable.
///
/// Errors are returned to the caller, which must treat the pad as not
/// deletable for this run.
pub async fn evaluate_pad(
    service: &dyn PadService,
    policy: &RetentionPolicy,
    pad_id: &str,
    now: DateTime<Utc>,
) -> EtherpadResult<(PadMetadata, PurgeDecision)> {
    let metadata = fetch_metadata(service, pad_id).await?;
    let decision = decide(&metadata, policy.effective_window(pad_id), now);
    Ok((metadata, decision))
}
