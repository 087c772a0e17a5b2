//! Full purge runs through the real HTTP client using wiremock.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use rstest::rstest;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

use crate::{
    etherpad::EtherpadClient,
    purge::{PadStatus, PurgeReason, PurgeRun, Purger, RetentionPolicy},
};

const API: &str = "/api/1.2.14";

/// A mocked Etherpad instance.
struct EtherpadHarness {
    server: MockServer,
}

impl EtherpadHarness {
    async fn new(pads: &[&str]) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/listAllPads")))
            .and(query_param("apikey", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": { "padIDs": pads }
            })))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Serve metadata for a pad last edited `age` ago.
    async fn pad(&self, id: &str, revisions: u64, age: TimeDelta) {
        let last_edited = (Utc::now() - age).timestamp_millis();

        Mock::given(method("GET"))
            .and(path(format!("{API}/getRevisionsCount")))
            .and(query_param("padID", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": { "revisions": revisions }
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{API}/getLastEdited")))
            .and(query_param("padID", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": { "lastEdited": last_edited }
            })))
            .mount(&self.server)
            .await;
    }

    /// Expect `deletePad` for a pad exactly `times` times.
    async fn expect_delete(&self, id: &str, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("{API}/deletePad")))
            .and(query_param("padID", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "message": "ok",
                "data": null
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    fn purger(&self, expiration: &str, dry_run: bool) -> Purger {
        let client = EtherpadClient::new(self.server.uri(), "secret").unwrap();
        let policy = RetentionPolicy::parse(expiration).unwrap();
        Purger::new(Arc::new(client), PurgeRun::new(policy, 2, dry_run))
    }
}

#[rstest]
#[case::delete(false)]
#[case::dry_run(true)]
#[tokio::test]
async fn test_purge_over_http(#[case] dry_run: bool) {
    let harness =
        EtherpadHarness::new(&["empty", "stale", "fresh", "notes-temp", "notes-keep"]).await;
    harness.pad("empty", 0, TimeDelta::hours(1)).await;
    harness.pad("stale", 12, TimeDelta::hours(999)).await;
    harness.pad("fresh", 4, TimeDelta::hours(1)).await;
    harness.pad("notes-temp", 3, TimeDelta::hours(30)).await;
    harness.pad("notes-keep", 3, TimeDelta::hours(999)).await;

    let deletes = if dry_run { 0 } else { 1 };
    harness.expect_delete("empty", deletes).await;
    harness.expect_delete("stale", deletes).await;
    harness.expect_delete("notes-temp", deletes).await;
    harness.expect_delete("fresh", 0).await;
    harness.expect_delete("notes-keep", 0).await;

    let report = harness
        .purger("default:720h,temp:24h,keep:8760h", dry_run)
        .purge_all()
        .await
        .unwrap();

    assert_eq!(report.processed(), 5);
    assert_eq!(report.kept(), 2);
    assert_eq!(report.failed(), 0);
    if dry_run {
        assert_eq!(report.would_delete(), 3);
        assert_eq!(report.deleted(), 0);
    } else {
        assert_eq!(report.deleted_pads(), vec!["empty", "notes-temp", "stale"]);
    }

    let default = report.bucket("default").unwrap();
    let empty = default.outcomes.iter().find(|o| o.pad == "empty").unwrap();
    let expected = if dry_run {
        PadStatus::WouldDelete(PurgeReason::NoHistory)
    } else {
        PadStatus::Deleted(PurgeReason::NoHistory)
    };
    assert_eq!(empty.status, expected);
}

#[tokio::test]
async fn test_api_error_is_recorded_per_pad() {
    let harness = EtherpadHarness::new(&["gone", "stale"]).await;
    harness.pad("stale", 5, TimeDelta::hours(999)).await;
    harness.expect_delete("stale", 1).await;

    Mock::given(method("GET"))
        .and(path(format!("{API}/getRevisionsCount")))
        .and(query_param("padID", "gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1,
            "message": "padID does not exist",
            "data": null
        })))
        .mount(&harness.server)
        .await;

    let report = harness.purger("default:720h", false).purge_all().await.unwrap();

    assert_eq!(report.deleted_pads(), vec!["stale"]);
    assert_eq!(report.failed(), 1);
    let gone = report.outcomes().find(|o| o.pad == "gone").unwrap();
    assert!(matches!(
        gone.status,
        PadStatus::EvaluationFailed(ref msg) if msg.contains("padID does not exist")
    ));
}

#[tokio::test]
async fn test_listing_failure_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{API}/listAllPads")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 4,
            "message": "no or wrong API Key",
            "data": null
        })))
        .mount(&server)
        .await;

    let harness = EtherpadHarness { server };
    let err = harness.purger("default:720h", false).purge_all().await.unwrap_err();
    assert!(err.is_api_error());
}
