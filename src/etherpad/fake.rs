//! In-memory [`PadService`] for tests.
//!
//! Pads live in a map; failures can be injected per pad and per operation,
//! and a per-call latency makes concurrent access observable.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{EtherpadError, EtherpadResult, PadService};

#[derive(Debug, Clone)]
struct FakePad {
    revisions: u64,
    last_edited: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FakeEtherpad {
    pads: Mutex<BTreeMap<String, FakePad>>,
    deleted: Mutex<Vec<String>>,
    failing_deletes: HashSet<String>,
    failing_metadata: HashSet<String>,
    panicking: HashSet<String>,
    fail_listing: bool,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEtherpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pad(self, id: &str, revisions: u64, last_edited: DateTime<Utc>) -> Self {
        self.pads.lock().unwrap().insert(
            id.to_string(),
            FakePad {
                revisions,
                last_edited,
            },
        );
        self
    }

    pub fn fail_delete(mut self, id: &str) -> Self {
        self.failing_deletes.insert(id.to_string());
        self
    }

    pub fn fail_metadata(mut self, id: &str) -> Self {
        self.failing_metadata.insert(id.to_string());
        self
    }

    /// Panic inside `get_revisions_count` for this pad.
    pub fn panic_on(mut self, id: &str) -> Self {
        self.panicking.insert(id.to_string());
        self
    }

    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Pads deleted so far, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    /// Pads still present, sorted.
    pub fn remaining(&self) -> Vec<String> {
        self.pads.lock().unwrap().keys().cloned().collect()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // Created before the sleep so that a dropped call is still counted out.
    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn pad(&self, id: &str) -> EtherpadResult<FakePad> {
        if self.failing_metadata.contains(id) {
            return Err(EtherpadError::InvalidResponse(format!(
                "injected metadata failure for {id}"
            )));
        }
        self.pads
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(not_found)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn not_found() -> EtherpadError {
    EtherpadError::Api {
        code: 1,
        message: "padID does not exist".to_string(),
    }
}

#[async_trait]
impl PadService for FakeEtherpad {
    async fn list_all_pads(&self) -> EtherpadResult<Vec<String>> {
        let _guard = self.enter().await;
        if self.fail_listing {
            return Err(EtherpadError::Api {
                code: 4,
                message: "no or wrong API Key".to_string(),
            });
        }
        Ok(self.remaining())
    }

    async fn get_revisions_count(&self, pad_id: &str) -> EtherpadResult<u64> {
        let _guard = self.enter().await;
        if self.panicking.contains(pad_id) {
            panic!("injected panic for {pad_id}");
        }
        self.pad(pad_id).map(|pad| pad.revisions)
    }

    async fn get_last_edited(&self, pad_id: &str) -> EtherpadResult<DateTime<Utc>> {
        let _guard = self.enter().await;
        self.pad(pad_id).map(|pad| pad.last_edited)
    }

    async fn delete_pad(&self, pad_id: &str) -> EtherpadResult<()> {
        let _guard = self.enter().await;
        if self.failing_deletes.contains(pad_id) {
            return Err(EtherpadError::InvalidResponse(format!(
                "injected delete failure for {pad_id}"
            )));
        }
        self.pads
            .lock()
            .unwrap()
            .remove(pad_id)
            .ok_or_else(not_found)?;
        self.deleted.lock().unwrap().push(pad_id.to_string());
        Ok(())
    }
}
