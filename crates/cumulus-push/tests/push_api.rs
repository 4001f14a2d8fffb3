use std::time::Duration;

use cumulus_core::{CumulusError, ReleaseVersion, SalesforceConfig};
use cumulus_push::{PollSchedule, PushApi, PushStatus, SalesforceClient};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

const QUERY: &str = "/services/data/v38.0/query";

fn config(server: &MockServer) -> SalesforceConfig {
    SalesforceConfig {
        username: Some("packaging@example.com".into()),
        password: Some("secret".into()),
        server_url: server.uri(),
        api_version: "38.0".into(),
    }
}

fn client(server: &MockServer) -> SalesforceClient {
    SalesforceClient::with_session(&server.uri(), "38.0", "sid").unwrap()
}

fn records(items: serde_json::Value) -> serde_json::Value {
    let total = items.as_array().map(Vec::len).unwrap_or_default();
    json!({ "totalSize": total, "done": true, "records": items })
}

async fn mock_query(server: &MockServer, soql_fragment: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(QUERY))
        .and(query_param_contains("q", soql_fragment))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_uses_instance_from_server_url() {
    let server = MockServer::start().await;
    let login = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns="urn:partner.soap.sforce.com">
  <soapenv:Body>
    <loginResponse>
      <result>
        <serverUrl>{}/services/Soap/u/38.0/00D000000000001</serverUrl>
        <sessionId>00D!token</sessionId>
      </result>
    </loginResponse>
  </soapenv:Body>
</soapenv:Envelope>"#,
        server.uri()
    );
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/38.0"))
        .and(header("SOAPAction", "login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(login))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .and(header("Authorization", "Bearer 00D!token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([{ "Id": "033A" }]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = SalesforceClient::login(&config(&server)).await.unwrap();
    assert_eq!(client.instance_url(), server.uri());

    let found: Vec<serde_json::Value> = client.query("SELECT Id FROM MetadataPackage").await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn login_fault_is_salesforce_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/Soap/u/38.0"))
        .respond_with(ResponseTemplate::new(500).set_body_string(
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body>
    <soapenv:Fault>
      <faultcode>INVALID_LOGIN</faultcode>
      <faultstring>INVALID_LOGIN: Invalid username, password, security token; or user locked out.</faultstring>
    </soapenv:Fault>
  </soapenv:Body>
</soapenv:Envelope>"#,
        ))
        .mount(&server)
        .await;

    let err = SalesforceClient::login(&config(&server)).await.err().unwrap();
    assert!(matches!(err, CumulusError::Salesforce(_)), "got {err:?}");
}

#[tokio::test]
async fn query_follows_next_records_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "totalSize": 3,
            "done": false,
            "nextRecordsUrl": "/services/data/v38.0/query/01gD-2000",
            "records": [{ "Id": "a" }, { "Id": "b" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/services/data/v38.0/query/01gD-2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([{ "Id": "c" }]))))
        .mount(&server)
        .await;

    let rows: Vec<serde_json::Value> = client(&server).query("SELECT Id FROM Account").await.unwrap();
    let ids: Vec<&str> = rows.iter().filter_map(|r| r["Id"].as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
}

#[tokio::test]
async fn find_version_matches_numbers() {
    let server = MockServer::start().await;
    mock_query(&server, "FROM MetadataPackage WHERE", records(json!([{ "Id": "033PKG" }]))).await;
    mock_query(
        &server,
        "MajorVersion = 1 AND MinorVersion = 10 AND PatchVersion = 2",
        records(json!([{ "Id": "04tVER" }])),
    )
    .await;

    let client = client(&server);
    let api = PushApi::new(&client);
    let version = ReleaseVersion::parse("1.10.2").unwrap();
    assert_eq!(api.find_version("npsp", &version).await.unwrap(), "04tVER");
}

#[tokio::test]
async fn find_version_rejects_beta() {
    let server = MockServer::start().await;
    let client = client(&server);
    let version = ReleaseVersion::parse("1.10 (Beta 3)").unwrap();
    let err = PushApi::new(&client).find_version("npsp", &version).await.unwrap_err();
    assert!(matches!(err, CumulusError::Config(_)));
}

#[tokio::test]
async fn schedule_creates_jobs_then_marks_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/data/v38.0/sobjects/PackagePushRequest/"))
        .and(body_partial_json(json!({
            "PackageVersionId": "04tVER",
            "ScheduledStartTime": "2024-05-01T08:00:00Z"
        })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "0DV1", "success": true, "errors": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/data/v38.0/sobjects/PackagePushJob/"))
        .and(body_partial_json(json!({ "PackagePushRequestId": "0DV1" })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "id": "0DX", "success": true, "errors": [] })),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/services/data/v38.0/sobjects/PackagePushRequest/0DV1"))
        .and(body_partial_json(json!({ "Status": "Pending" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let orgs = vec!["00D1".to_string(), "00D2".to_string()];
    let start = "2024-05-01T08:00:00Z".parse().unwrap();
    let id = PushApi::new(&client)
        .schedule("04tVER", &orgs, Some(start))
        .await
        .unwrap();
    assert_eq!(id, "0DV1");
}

#[tokio::test]
async fn schedule_reports_failed_jobs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/data/v38.0/sobjects/PackagePushRequest/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "0DV1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/services/data/v38.0/sobjects/PackagePushJob/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!([{
            "errorCode": "INVALID_CROSS_REFERENCE_KEY",
            "message": "invalid org"
        }])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server);
    let err = PushApi::new(&client)
        .schedule("04tVER", &["00Dbad".to_string()], None)
        .await
        .unwrap_err();
    match err {
        CumulusError::Batch(failures) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("INVALID_CROSS_REFERENCE_KEY"), "{failures:?}");
        }
        other => panic!("expected batch error, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_polls_until_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([
            { "Id": "0DV1", "Status": "In Progress" }
        ]))))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(QUERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(records(json!([
            { "Id": "0DV1", "Status": "Succeeded" }
        ]))))
        .mount(&server)
        .await;

    let client = client(&server);
    let schedule = PollSchedule {
        interval: Duration::from_millis(1),
        slow_interval: Duration::from_millis(2),
        slow_after: 1,
    };
    let mut seen = Vec::new();
    let status = PushApi::new(&client)
        .wait_for_completion("0DV1", &schedule, |n, s| seen.push((n, s.clone())))
        .await
        .unwrap();

    assert_eq!(status, PushStatus::Succeeded);
    assert_eq!(
        seen,
        vec![
            (1, PushStatus::InProgress),
            (2, PushStatus::InProgress),
            (3, PushStatus::Succeeded),
        ]
    );
}

#[tokio::test]
async fn report_counts_jobs_and_collects_errors() {
    let server = MockServer::start().await;
    mock_query(
        &server,
        "FROM PackagePushRequest",
        records(json!([{ "Id": "0DV1", "Status": "Failed" }])),
    )
    .await;
    mock_query(
        &server,
        "FROM PackagePushJob",
        records(json!([
            { "Id": "J1", "Status": "Succeeded", "SubscriberOrganizationKey": "00D1" },
            { "Id": "J2", "Status": "Failed", "SubscriberOrganizationKey": "00D2" },
            { "Id": "J3", "Status": "Succeeded", "SubscriberOrganizationKey": "00D3" },
        ])),
    )
    .await;
    mock_query(
        &server,
        "FROM PackagePushError WHERE PackagePushJobId IN ('J2')",
        records(json!([{
            "PackagePushJobId": "J2",
            "ErrorTitle": "Install failed",
            "ErrorMessage": "Apex test failure",
            "ErrorDetails": null,
            "ErrorSeverity": "Error"
        }])),
    )
    .await;

    let client = client(&server);
    let report = PushApi::new(&client).report("0DV1").await.unwrap();

    assert_eq!(report.status, PushStatus::Failed);
    assert_eq!(report.total_jobs(), 3);
    assert_eq!(report.jobs["Succeeded"], 2);
    assert_eq!(report.jobs["Failed"], 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].org_id, "00D2");
    assert_eq!(report.errors[0].message.as_deref(), Some("Apex test failure"));
}
