//! End-to-end reconciliation runs against a mocked Datadog API.

use serde_json::json;
use tagsweep::config::{Credential, Settings};
use tagsweep::orchestrator;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> Settings {
    Settings {
        base_url: format!("{}/api/", server.uri()),
        requests_per_second: 50,
        max_rate_limit_retries: 3,
        metrics_window_days: 7,
        related_window_seconds: 2_592_000,
        dashboard_concurrency: 2,
        dry_run: false,
    }
}

fn credential(org: &str) -> Credential {
    Credential {
        app_key: "app-key".to_string(),
        api_key: "api-key".to_string(),
        organization: org.to_string(),
    }
}

/// Inventory: four metrics. `requests.count` is referenced by a monitor and
/// a dashboard widget, `wild.metric` by a wildcard query, `unused.metric` by
/// nothing, and `ghost.metric` has no tag configuration at all.
async fn mount_inventory(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metrics": ["requests.count", "unused.metric", "wild.metric", "ghost.metric"]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/monitor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"query": "avg:requests.count{env} by {endpoint}.rollup(60)"},
            {"query": "sum:wild.metric{*}"},
            {"query": null}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dashboards": [{"id": "dash-1"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/dashboard/dash-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "widgets": [
                {"definition": {"requests": [{"queries": [{"query": "max:requests.count{env}"}]}]}}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v2/metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "id": "requests.count",
                    "type": "manage_tags",
                    "attributes": {"tags": ["env", "endpoint", "host"]}
                },
                {
                    "id": "unused.metric",
                    "type": "manage_tags",
                    "attributes": {"tags": ["team"]}
                },
                {
                    "id": "wild.metric",
                    "type": "manage_tags",
                    "attributes": {"tags": ["foo"]}
                }
            ]
        })))
        .mount(server)
        .await;
}

async fn mount_writes(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/metrics/requests.count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "count"})))
        .mount(server)
        .await;

    // Type lookup fails for the metric about to be disabled.
    Mock::given(method("GET"))
        .and(path("/api/v1/metrics/unused.metric"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v2/metrics/requests.count/tags"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v2/metrics/requests.count/tags"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/v2/metrics/unused.metric/tags"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

#[tokio::test]
async fn full_run_reconciles_each_metric_once() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;
    mount_writes(&server).await;

    orchestrator::run(&[credential("main")], &settings(&server))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();

    // KeepSubset metric: DELETE precedes the allow-list POST.
    let kept: Vec<&str> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/v2/metrics/requests.count/tags")
        .map(|r| r.method.as_str())
        .collect();
    assert_eq!(kept, vec!["DELETE", "POST"]);

    let post = requests
        .iter()
        .find(|r| {
            r.url.path() == "/api/v2/metrics/requests.count/tags" && r.method.as_str() == "POST"
        })
        .expect("allow-list write for requests.count");
    let body: serde_json::Value = serde_json::from_slice(&post.body).unwrap();
    assert_eq!(
        body,
        json!({
            "data": {
                "type": "manage_tags",
                "id": "requests.count",
                "attributes": {
                    "metric_type": "count",
                    "exclude_tags_mode": false,
                    "tags": ["env"]
                }
            }
        })
    );

    // DisableAll metric with a failing type lookup: the delete is attempted,
    // the write is skipped.
    let disabled: Vec<&str> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/v2/metrics/unused.metric/tags")
        .map(|r| r.method.as_str())
        .collect();
    assert_eq!(disabled, vec!["DELETE"]);

    let delete_index = requests
        .iter()
        .position(|r| r.url.path() == "/api/v2/metrics/unused.metric/tags")
        .unwrap();
    let lookup_index = requests
        .iter()
        .position(|r| r.url.path() == "/api/v1/metrics/unused.metric")
        .unwrap();
    assert!(delete_index < lookup_index);

    // Wildcard-exempt and unconfigured metrics get no lookups and no writes.
    assert!(!requests
        .iter()
        .any(|r| r.url.path().contains("wild.metric") || r.url.path().contains("ghost.metric")));
}

#[tokio::test]
async fn dry_run_issues_no_writes() {
    let server = MockServer::start().await;
    mount_inventory(&server).await;

    let mut settings = settings(&server);
    settings.dry_run = true;
    orchestrator::run(&[credential("main")], &settings)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.method.as_str() == "GET"));
    // Not even type lookups happen on a dry run.
    assert!(!requests
        .iter()
        .any(|r| r.url.path().starts_with("/api/v1/metrics/")));
}

#[tokio::test]
async fn incomplete_credentials_are_skipped() {
    let server = MockServer::start().await;

    let credential = Credential {
        app_key: String::new(),
        api_key: "api-key".to_string(),
        organization: "broken".to_string(),
    };
    orchestrator::run(&[credential], &settings(&server))
        .await
        .unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn organization_failure_does_not_stop_the_next_one() {
    let server = MockServer::start().await;

    // The first organization's metric listing fails outright; this mock
    // expires after one match so the second organization sees the real
    // inventory.
    Mock::given(method("GET"))
        .and(path("/api/v1/metrics"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_inventory(&server).await;
    mount_writes(&server).await;

    orchestrator::run(
        &[credential("broken"), credential("main")],
        &settings(&server),
    )
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .any(|r| r.url.path() == "/api/v2/metrics/requests.count/tags"));
}
