use common::{JobEvent, JobEventKind, JobId, JobState, TableView};
use jobtable::{Config, JobTableController, JobsClient, Step};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn client_for(server: &mockito::Server) -> JobsClient {
    let mut config = Config::default();
    config.server.url = format!("{}/server", server.url());
    JobsClient::from_config(&config).unwrap()
}

fn job_list(n: i64) -> String {
    let jobs: Vec<_> = (1..=n)
        .map(|i| json!({"id": i, "script": "demand", "state": i % 4, "parameters": {"scenario": "baseline"}}))
        .collect();
    serde_json::Value::Array(jobs).to_string()
}

#[tokio::test]
async fn fetches_and_validates_job_list() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/server/jobs/list")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"id": 1, "script": "a.py", "state": 0, "parameters": {}},
                {"id": 2, "script": "b.py", "state": 99, "parameters": {"x": 1}},
                {"script": "no-id.py", "state": 1}
            ]"#,
        )
        .create_async()
        .await;

    let snapshot = client_for(&server).fetch_jobs().await.unwrap();
    mock.assert_async().await;

    assert_eq!(snapshot.jobs.len(), 2);
    assert_eq!(snapshot.jobs[0].state.label(), "pending");
    assert_eq!(snapshot.jobs[1].state, JobState::Unknown(99));
    assert_eq!(snapshot.quarantined.len(), 1);
    assert_eq!(snapshot.quarantined[0].index, 2);
}

#[tokio::test]
async fn server_errors_surface_as_failures() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/server/jobs/list")
        .with_status(500)
        .with_body("Internal Server Error")
        .create_async()
        .await;

    let err = client_for(&server).fetch_jobs().await.unwrap_err();
    assert!(format!("{:#}", err).contains("500"));
}

#[tokio::test]
async fn non_array_body_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/server/jobs/list")
        .with_status(200)
        .with_body(r#"{"jobs": []}"#)
        .create_async()
        .await;

    let err = client_for(&server).fetch_jobs().await.unwrap_err();
    assert!(format!("{:#}", err).contains("expected a JSON array"));
}

#[tokio::test]
async fn fetches_single_job() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/server/jobs/7")
        .with_status(200)
        .with_body(r#"{"id": 7, "script": "radiation", "state": 1, "parameters": {"buildings": ["B01"]}}"#)
        .create_async()
        .await;

    let job = client_for(&server).get_job(JobId(7)).await.unwrap();
    assert_eq!(job.script, "radiation");
    assert_eq!(job.state, JobState::Started);
    assert_eq!(job.parameters, json!({"buildings": ["B01"]}));
}

#[tokio::test]
async fn worker_event_refreshes_from_server() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/server/jobs/list")
        .with_status(200)
        .with_body(job_list(15))
        .create_async()
        .await;

    let client = client_for(&server);
    let mut controller = JobTableController::new(Arc::new(client), TableView::default());
    let handle = controller.handle();

    controller.refresh("initial load");
    assert_eq!(controller.step().await, Step::Updated);
    let table = &controller.state().table;
    assert_eq!(table.len(), 15);
    assert_eq!(table.total_pages(), 3);
    assert_eq!(table.current().rows.len(), 7);
    first.remove_async().await;

    let _second = server
        .mock("GET", "/server/jobs/list")
        .with_status(200)
        .with_body(job_list(16))
        .create_async()
        .await;

    handle.notify(JobEvent { kind: JobEventKind::Success, payload: json!({"id": 16}) });
    assert_eq!(controller.step().await, Step::Unchanged);
    assert_eq!(controller.step().await, Step::Updated);

    let table = &controller.state().table;
    assert_eq!(table.len(), 16);
    assert_eq!(table.current().rows[0].id, JobId(16));
}
