//! Concurrent purge execution.
//!
//! Every class bucket gets its own worker group: a feeder pushes the bucket's
//! pads into a bounded queue in order and closes it, while `concurrency`
//! workers pull from the queue, evaluate each pad and delete it when
//! eligible. Groups run side by side, so concurrency is bounded per bucket
//! (3 buckets at concurrency 4 allow 12 pads in flight).
//!
//! Per-pad failures are recorded in the [`PurgeReport`] and never stop a
//! worker, a group or the run. [`Purger::run`] returns once every group has
//! drained its queue.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{
    classifier::{ClassBucket, group_pads},
    eligibility::{PurgeDecision, PurgeReason, evaluate_pad},
    policy::RetentionPolicy,
};
use crate::{
    etherpad::{EtherpadResult, PadService},
    observability::metrics,
};

/// Immutable settings of one purge run.
#[derive(Debug, Clone)]
pub struct PurgeRun {
    pub policy: Arc<RetentionPolicy>,
    /// Log deletions without performing them.
    pub dry_run: bool,
    /// Workers per class bucket. Zero is treated as one.
    pub concurrency: usize,
}

impl PurgeRun {
    pub fn new(policy: RetentionPolicy, concurrency: usize, dry_run: bool) -> Self {
        Self {
            policy: Arc::new(policy),
            dry_run,
            concurrency,
        }
    }

    fn workers_per_bucket(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Lifecycle of a purge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePhase {
    Idle,
    Running,
    /// Every feeder has closed its queue; workers finish what is queued.
    Draining,
    Done,
}

/// What happened to a single pad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadStatus {
    /// Not eligible for deletion.
    Kept,
    Deleted(PurgeReason),
    /// Eligible, but the run is a dry run.
    WouldDelete(PurgeReason),
    /// Metadata could not be fetched; the pad is kept.
    EvaluationFailed(String),
    DeleteFailed(String),
    /// Processing the pad panicked; its state on the server is unknown.
    Panicked(String),
    /// Not processed because the run was cancelled.
    Skipped,
}

impl PadStatus {
    /// Label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kept => "kept",
            Self::Deleted(_) => "deleted",
            Self::WouldDelete(_) => "would_delete",
            Self::EvaluationFailed(_) => "evaluation_failed",
            Self::DeleteFailed(_) => "delete_failed",
            Self::Panicked(_) => "panicked",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::EvaluationFailed(_) | Self::DeleteFailed(_) | Self::Panicked(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadOutcome {
    pub pad: String,
    pub class: String,
    pub status: PadStatus,
}

/// Outcomes of one worker group.
#[derive(Debug, Clone)]
pub struct BucketReport {
    pub class: String,
    /// One entry per pad, in completion order.
    pub outcomes: Vec<PadOutcome>,
    pub elapsed: Duration,
}

/// Outcomes of a whole run, buckets sorted by class.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub buckets: Vec<BucketReport>,
    pub elapsed: Duration,
}

impl PurgeReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &PadOutcome> {
        self.buckets.iter().flat_map(|b| b.outcomes.iter())
    }

    fn count(&self, pred: impl Fn(&PadStatus) -> bool) -> usize {
        self.outcomes().filter(|o| pred(&o.status)).count()
    }

    pub fn processed(&self) -> usize {
        self.outcomes().count()
    }

    pub fn deleted(&self) -> usize {
        self.count(|s| matches!(s, PadStatus::Deleted(_)))
    }

    pub fn would_delete(&self) -> usize {
        self.count(|s| matches!(s, PadStatus::WouldDelete(_)))
    }

    pub fn kept(&self) -> usize {
        self.count(|s| matches!(s, PadStatus::Kept))
    }

    pub fn failed(&self) -> usize {
        self.count(PadStatus::is_failure)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PadStatus::Skipped))
    }

    /// Identifiers of pads that were actually deleted, sorted.
    pub fn deleted_pads(&self) -> Vec<&str> {
        let mut pads: Vec<&str> = self
            .outcomes()
            .filter(|o| matches!(o.status, PadStatus::Deleted(_)))
            .map(|o| o.pad.as_str())
            .collect();
        pads.sort_unstable();
        pads
    }

    pub fn bucket(&self, class: &str) -> Option<&BucketReport> {
        self.buckets.iter().find(|b| b.class == class)
    }
}

/// State shared by every worker of a run.
struct RunContext {
    service: Arc<dyn PadService>,
    policy: Arc<RetentionPolicy>,
    dry_run: bool,
    now: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Drives purge runs against a [`PadService`].
pub struct Purger {
    service: Arc<dyn PadService>,
    run: PurgeRun,
    cancel: CancellationToken,
    phase: Arc<watch::Sender<PurgePhase>>,
    span: tracing::Span,
}

impl Purger {
    pub fn new(service: Arc<dyn PadService>, run: PurgeRun) -> Self {
        let span = tracing::info_span!(
            "purge",
            dry_run = run.dry_run,
            concurrency = run.workers_per_bucket()
        );
        let (phase, _) = watch::channel(PurgePhase::Idle);
        Self {
            service,
            run,
            cancel: CancellationToken::new(),
            phase: Arc::new(phase),
            span,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Emit all run events inside the given span instead of the default one.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch phase transitions of the run.
    pub fn subscribe(&self) -> watch::Receiver<PurgePhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> PurgePhase {
        *self.phase.borrow()
    }

    /// List all pads, classify them and purge.
    ///
    /// Failing to list pads aborts before any work starts.
    pub async fn purge_all(&self) -> EtherpadResult<PurgeReport> {
        let pads = self
            .service
            .list_all_pads()
            .instrument(self.span.clone())
            .await?;
        let buckets = group_pads(&pads, &self.run.policy);
        Ok(self.run(buckets).await)
    }

    /// Run one worker group per bucket and wait until all have drained.
    pub async fn run(&self, buckets: Vec<ClassBucket>) -> PurgeReport {
        self.run_inner(buckets).instrument(self.span.clone()).await
    }

    async fn run_inner(&self, buckets: Vec<ClassBucket>) -> PurgeReport {
        let start = Instant::now();
        let concurrency = self.run.workers_per_bucket();
        let ctx = Arc::new(RunContext {
            service: self.service.clone(),
            policy: self.run.policy.clone(),
            dry_run: self.run.dry_run,
            now: Utc::now(),
            cancel: self.cancel.clone(),
        });

        self.phase.send_replace(PurgePhase::Running);
        let feeders_left = Arc::new(AtomicUsize::new(buckets.len()));
        if buckets.is_empty() {
            self.phase.send_replace(PurgePhase::Draining);
        }

        let mut groups = JoinSet::new();
        let mut group_classes = HashMap::new();
        for bucket in buckets {
            let class = bucket.class.clone();
            let span = tracing::info_span!("bucket", class = %class);
            let handle = groups.spawn(
                run_group(
                    ctx.clone(),
                    bucket,
                    concurrency,
                    feeders_left.clone(),
                    self.phase.clone(),
                )
                .instrument(span),
            );
            group_classes.insert(handle.id(), class);
        }

        let mut reports = Vec::with_capacity(group_classes.len());
        while let Some(joined) = groups.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    let class = group_classes.remove(&e.id()).unwrap_or_default();
                    tracing::error!(class = %class, error = %e, "Worker group failed");
                    reports.push(BucketReport {
                        class,
                        outcomes: Vec::new(),
                        elapsed: start.elapsed(),
                    });
                }
            }
        }
        reports.sort_by(|a, b| a.class.cmp(&b.class));

        let report = PurgeReport {
            buckets: reports,
            elapsed: start.elapsed(),
        };
        metrics::record_purge_run(self.run.dry_run, report.elapsed.as_secs_f64());
        self.phase.send_replace(PurgePhase::Done);

        tracing::info!(
            processed = report.processed(),
            deleted = report.deleted(),
            would_delete = report.would_delete(),
            kept = report.kept(),
            failed = report.failed(),
            skipped = report.skipped(),
            took_ms = report.elapsed.as_millis() as u64,
            "Purge run complete"
        );
        report
    }
}

/// Feed one bucket through a pool of workers and collect their outcomes.
async fn run_group(
    ctx: Arc<RunContext>,
    bucket: ClassBucket,
    concurrency: usize,
    feeders_left: Arc<AtomicUsize>,
    phase: Arc<watch::Sender<PurgePhase>>,
) -> BucketReport {
    let ClassBucket { class, pads } = bucket;
    tracing::info!(class = %class, count = pads.len(), concurrency, "start bucket");
    let start = Instant::now();

    let (tx, rx) = mpsc::channel::<String>(concurrency);
    let rx = Arc::new(Mutex::new(rx));

    let mut workers = JoinSet::new();
    for _ in 0..concurrency {
        workers.spawn(
            worker(ctx.clone(), class.clone(), rx.clone()).instrument(tracing::Span::current()),
        );
    }
    // Workers hold the only receivers from here on.
    drop(rx);

    let mut outcomes = Vec::with_capacity(pads.len());
    let mut queue = pads.into_iter();
    loop {
        // Reserve first so a pad is never lost to a cancelled send. Reserving
        // fails once every worker has exited.
        let permit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            permit = tx.reserve() => permit.ok(),
        };
        let Some(permit) = permit else {
            break;
        };
        let Some(pad) = queue.next() else {
            break;
        };
        permit.send(pad);
    }
    drop(tx);
    // Pads never handed to a worker, after cancellation or a worker failure.
    for pad in queue {
        outcomes.push(PadOutcome {
            pad,
            class: class.clone(),
            status: PadStatus::Skipped,
        });
    }

    if feeders_left.fetch_sub(1, Ordering::SeqCst) == 1 {
        phase.send_replace(PurgePhase::Draining);
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(done) => outcomes.extend(done),
            Err(e) => tracing::error!(class = %class, error = %e, "Purge worker failed"),
        }
    }

    let elapsed = start.elapsed();
    tracing::info!(
        class = %class,
        took_ms = elapsed.as_millis() as u64,
        processed = outcomes.len(),
        "finished bucket"
    );

    BucketReport {
        class,
        outcomes,
        elapsed,
    }
}

async fn worker(
    ctx: Arc<RunContext>,
    class: String,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
) -> Vec<PadOutcome> {
    let mut outcomes = Vec::new();
    loop {
        let next = queue.lock().await.recv().await;
        let Some(pad) = next else {
            break;
        };
        // Each pad runs in its own task so a panic costs one pad, not the worker.
        let task = tokio::spawn(
            {
                let ctx = ctx.clone();
                let class = class.clone();
                let pad = pad.clone();
                async move { process_pad(&ctx, &class, &pad).await }
            }
            .instrument(tracing::Span::current()),
        );
        let status = match task.await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(pad = %pad, class = %class, error = %e, "Pad processing panicked");
                PadStatus::Panicked(e.to_string())
            }
        };
        metrics::record_purge_outcome(&class, status.as_str());
        outcomes.push(PadOutcome {
            pad,
            class: class.clone(),
            status,
        });
    }
    outcomes
}

async fn process_pad(ctx: &RunContext, class: &str, pad: &str) -> PadStatus {
    if ctx.cancel.is_cancelled() {
        return PadStatus::Skipped;
    }
    tracing::debug!(pad = %pad, "Process pad");

    // Metadata reads are safe to abandon mid-flight.
    let evaluated = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return PadStatus::Skipped,
        evaluated = evaluate_pad(ctx.service.as_ref(), &ctx.policy, pad, ctx.now) => evaluated,
    };

    let (metadata, decision) = match evaluated {
        Ok(evaluated) => evaluated,
        Err(e) => {
            tracing::error!(pad = %pad, class = %class, error = %e, "Failed to evaluate pad");
            return PadStatus::EvaluationFailed(e.to_string());
        }
    };

    let PurgeDecision::Delete(reason) = decision else {
        return PadStatus::Kept;
    };

    if ctx.dry_run {
        tracing::info!(
            pad = %pad,
            class = %class,
            reason = %reason,
            revisions = metadata.revisions,
            last_edited = %metadata.last_edited,
            "DRY RUN: Would delete pad"
        );
        return PadStatus::WouldDelete(reason);
    }

    // A delete is never abandoned once issued; cancellation is only checked
    // before it starts.
    if ctx.cancel.is_cancelled() {
        return PadStatus::Skipped;
    }

    match ctx.service.delete_pad(pad).await {
        Ok(()) => {
            tracing::info!(
                pad = %pad,
                class = %class,
                reason = %reason,
                revisions = metadata.revisions,
                last_edited = %metadata.last_edited,
                "Deleted pad"
            );
            PadStatus::Deleted(reason)
        }
        Err(e) => {
            tracing::error!(pad = %pad, class = %class, error = %e, "Failed to delete pad");
            PadStatus::DeleteFailed(e.to_string())
        }
    }
}
