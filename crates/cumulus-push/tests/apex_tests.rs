use std::time::Duration;

use cumulus_core::CumulusError;
use cumulus_push::{
    ApexClass, ApexTestRunner, PollSchedule, QueueItemStatus, SalesforceClient, TestOutcome,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERY: &str = "/services/data/v38.0/query";
const TOOLING_QUERY: &str = "/services/data/v38.0/tooling/query";

fn client(server: &MockServer) -> SalesforceClient {
    SalesforceClient::with_session(&server.uri(), "38.0", "sid").unwrap()
}

fn records(items: serde_json::Value) -> serde_json::Value {
    let total = items.as_array().map(Vec::len).unwrap_or_default();
    json!({ "totalSize": total, "done": true, "records": items })
}

fn class(id: &str, name: &str) -> ApexClass {
    ApexClass {
        id: id.into(),
        name: name.into(),
    }
}

fn fast_schedule() -> PollSchedule {
    PollSchedule {
        interval: Duration::from_millis(1),
        slow_interval: Duration::from_millis(2),
        slow_after: 1,
    }
}

#[tokio::test]
async fn finds_classes_by_any_pattern_in_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOOLING_QUERY))
        .and(query_param_contains("q", "NamespacePrefix = 'npsp'"))
        .and(query_param_contains(
            "q",
            "(Name LIKE '%_TEST' OR Name LIKE 'TDTM%')",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([
            { "Id": "01pA", "Name": "ACCT_Accounts_TEST" },
            { "Id": "01pB", "Name": "TDTM_Runnable" },
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let classes = ApexTestRunner::new(&client)
        .find_test_classes("%_TEST, TDTM%", Some("npsp"))
        .await
        .unwrap();
    assert_eq!(
        classes,
        vec![
            class("01pA", "ACCT_Accounts_TEST"),
            class("01pB", "TDTM_Runnable")
        ]
    );
}

#[tokio::test]
async fn unmanaged_classes_filter_on_null_namespace() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TOOLING_QUERY))
        .and(query_param_contains("q", "NamespacePrefix = null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let classes = ApexTestRunner::new(&client)
        .find_test_classes("%_TEST", None)
        .await
        .unwrap();
    assert!(classes.is_empty());
}

#[tokio::test]
async fn blank_pattern_is_config_error() {
    let server = MockServer::start().await;
    let client = client(&server);
    let err = ApexTestRunner::new(&client)
        .find_test_classes(" , ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CumulusError::Config(_)));
}

#[tokio::test]
async fn enqueue_posts_class_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/data/v38.0/tooling/runTestsAsynchronous/"))
        .and(body_partial_json(json!({ "classids": "01pA,01pB" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("707JOB")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let job = ApexTestRunner::new(&client)
        .enqueue(&[class("01pA", "A_TEST"), class("01pB", "B_TEST")])
        .await
        .unwrap();
    assert_eq!(job, "707JOB");
}

#[tokio::test]
async fn enqueue_without_classes_is_config_error() {
    let server = MockServer::start().await;
    let client = client(&server);
    let err = ApexTestRunner::new(&client).enqueue(&[]).await.unwrap_err();
    assert!(matches!(err, CumulusError::Config(_)));
}

#[tokio::test]
async fn wait_polls_until_every_class_finished() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .and(query_param_contains("q", "FROM ApexTestQueueItem WHERE ParentJobId = '707JOB'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([
            { "Id": "709A", "Status": "Completed" },
            { "Id": "709B", "Status": "Processing" },
        ]))))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .and(query_param_contains("q", "FROM ApexTestQueueItem WHERE ParentJobId = '707JOB'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([
            { "Id": "709A", "Status": "Completed" },
            { "Id": "709B", "Status": "Failed" },
        ]))))
        .mount(&server)
        .await;

    let client = client(&server);
    let mut seen = Vec::new();
    let progress = ApexTestRunner::new(&client)
        .wait_for_completion("707JOB", &fast_schedule(), |n, p| {
            seen.push((n, p.finished(), p.total()))
        })
        .await
        .unwrap();

    assert!(progress.is_complete());
    assert_eq!(progress.classes[&QueueItemStatus::Failed], 1);
    assert_eq!(seen, vec![(1, 1, 2), (2, 2, 2)]);
}

#[tokio::test]
async fn report_gathers_results_and_class_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .and(query_param_contains("q", "FROM ApexTestResult WHERE AsyncApexJobId = '707JOB'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([
            {
                "ApexClass": { "attributes": { "type": "ApexClass" }, "Name": "ACCT_Accounts_TEST" },
                "MethodName": "insertsAccount",
                "Outcome": "Pass",
                "Message": null,
                "StackTrace": null,
                "RunTime": 120
            },
            {
                "ApexClass": { "attributes": { "type": "ApexClass" }, "Name": "ACCT_Accounts_TEST" },
                "MethodName": "rollsUpGifts",
                "Outcome": "Fail",
                "Message": "System.AssertException: Assertion Failed",
                "StackTrace": "Class.ACCT_Accounts_TEST.rollsUpGifts: line 42",
                "RunTime": 80
            }
        ]))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .and(query_param_contains("q", "Status IN ('Failed', 'Aborted')"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([{
            "ApexClass": { "Name": "RD_Broken_TEST" },
            "Status": "Failed",
            "ExtendedStatus": "Compile error at line 3"
        }]))))
        .mount(&server)
        .await;

    let client = client(&server);
    let report = ApexTestRunner::new(&client).report("707JOB").await.unwrap();

    assert_eq!(report.results.len(), 2);
    assert_eq!(report.count(TestOutcome::Pass), 1);
    assert_eq!(report.count(TestOutcome::Fail), 1);
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.method_name, "rollsUpGifts");
    assert_eq!(failure.run_time, Some(80));
    assert_eq!(report.class_errors.len(), 1);
    assert_eq!(report.class_errors[0].class_name, "RD_Broken_TEST");
    assert_eq!(
        report.class_errors[0].detail.as_deref(),
        Some("Compile error at line 3")
    );
    assert!(!report.is_success());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["jobId"], "707JOB");
    assert_eq!(json["outcomes"]["Fail"], 1);
    assert_eq!(json["classErrors"][0]["status"], "Failed");
}
