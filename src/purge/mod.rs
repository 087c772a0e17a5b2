//! Retention-based purging of pads.
//!
//! A run goes through four steps:
//! 1. Parse the retention policy (`default:720h,temp:24h,keep:8760h`)
//! 2. List all pads and group them into class buckets by name suffix
//! 3. Run one worker group per bucket, evaluating each pad's revision count
//!    and last edit against its class window
//! 4. Delete eligible pads, or only log them in dry-run mode
//!
//! Per-pad failures are kept in the returned report and never abort a run, so
//! re-running a purge is always safe: pads that survived are re-evaluated.

mod classifier;
mod eligibility;
mod orchestrator;
mod policy;

pub use classifier::{ClassBucket, group_by_suffixes, group_pads};
pub use eligibility::{
    PadMetadata, PurgeDecision, PurgeReason, decide, evaluate_pad, fetch_metadata,
};
pub use orchestrator::{
    BucketReport, PadOutcome, PadStatus, PurgePhase, PurgeReport, PurgeRun, Purger,
};
pub use policy::{DEFAULT_CLASS, PolicyError, RetentionPolicy};
