//! End-to-end tests for loading and running plans

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use jsonplan::plan::{ConfigError, OutputError, PlanError};
use jsonplan::report::writer::{CHANGES_FILE, FILTERED_FILE, NOOPS_FILE};
use jsonplan::{NdjsonWriter, Plan, ProcessError, RunOptions, TemplateError};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;

fn data_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

fn nodes() -> String {
    fs::read_to_string(data_path("nodes.json")).unwrap()
}

/// The UDP plan with literal input and output pointed at `base`.
fn udp_plan(base: &str) -> Plan {
    let mut plan = Plan::load(data_path("udp_plan.yaml")).unwrap();
    plan.input.raw = Some(nodes());
    if let Some(http) = plan.output.http.as_mut() {
        http.url = format!("{}/nodes/{{{{ .uid }}}}/gateway", base);
    }
    plan
}

/// A request seen by a test endpoint.
#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: String,
}

impl Recorded {
    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct Endpoint {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Vec<Recorded>>>,
}

async fn record(
    State(endpoint): State<Endpoint>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    endpoint.seen.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        headers,
        body,
    });
    (endpoint.status, endpoint.body.clone())
}

/// Serve every request with `status` and `body`, recording what arrives.
async fn serve(status: u16, body: String) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let endpoint = Endpoint {
        status: StatusCode::from_u16(status).unwrap(),
        body,
        seen: seen.clone(),
    };
    let app = Router::new().fallback(record).with_state(endpoint);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (base, seen)
}

/// The single run directory created under `root`.
fn run_directory(root: &Path) -> PathBuf {
    let run_dirs: Vec<PathBuf> = fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(run_dirs.len(), 1);
    run_dirs[0].clone()
}

fn csv_lines(dir: &Path, name: &str) -> Vec<String> {
    fs::read_to_string(dir.join(name))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_parse_with_environment_references() {
    std::env::set_var("JSONPLAN_TEST_TOKEN", "t0ken");
    let plan = Plan::parse(
        r#"
input:
  http:
    url: https://example.com/nodes$JSONPLAN_TEST_UNSET_SUFFIX
    headers:
      Authorization: "Bearer ${JSONPLAN_TEST_TOKEN}"
output:
  http:
    url: "https://example.com/{{ $.uid }}"
"#,
    )
    .unwrap();

    let http = plan.input.http.as_ref().unwrap();
    assert_eq!(http.url, "https://example.com/nodes");
    assert_eq!(http.headers["Authorization"], "Bearer t0ken");
    assert_eq!(plan.output.http().unwrap().url, "https://example.com/{{ $.uid }}");
    plan.validate().unwrap();
}

#[test]
fn test_load_errors() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.yaml");
    assert!(matches!(Plan::load(&missing), Err(ConfigError::Io { .. })));

    let multi_key = dir.path().join("multi.yaml");
    fs::write(
        &multi_key,
        "pipeline:\n  processors:\n    - map:\n        field: a\n      replace:\n        template: {}\n",
    )
    .unwrap();
    let err = Plan::load(&multi_key).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml(_)));
    assert!(err.to_string().contains("exactly one key"));
}

#[tokio::test]
async fn test_dry_run_reports_and_captures() {
    let reports = TempDir::new().unwrap();
    let (base, seen) = serve(204, String::new()).await;
    let plan = udp_plan(&base);
    plan.validate().unwrap();

    let options = RunOptions {
        dry_run: true,
        report_root: Some(reports.path().to_path_buf()),
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut writer = NdjsonWriter::new(Vec::new());

    let summary = plan
        .run_with_writer(&options, cancel_rx, Some(&mut writer))
        .await
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.published, 1);
    assert_eq!(summary.dropped, 2);
    assert!(seen.lock().unwrap().is_empty());

    let output = String::from_utf8(writer.into_inner()).unwrap();
    let lines: Vec<Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines, vec![json!({"uid": "b", "udpEnabled": true, "port": 8993})]);

    let report = summary.report.unwrap();
    assert_eq!((report.filtered, report.changed, report.noop), (2, 1, 0));
    assert!(report.directory.starts_with(reports.path()));

    let filtered = csv_lines(&report.directory, FILTERED_FILE);
    assert_eq!(filtered.len(), 3);
    assert!(filtered[1].starts_with("a,"));
    assert!(filtered[2].starts_with("c,"));
    assert_eq!(
        csv_lines(&report.directory, CHANGES_FILE),
        vec!["name,field,before,after", "b,udpEnabled,false,true"]
    );
    assert_eq!(csv_lines(&report.directory, NOOPS_FILE), vec!["name"]);
}

#[tokio::test]
async fn test_http_input_and_output() {
    let (input_base, input_seen) = serve(200, nodes()).await;
    let (output_base, output_seen) = serve(204, String::new()).await;

    let mut plan = udp_plan(&output_base);
    plan.input.raw = None;
    plan.input.http = Some(jsonplan::plan::HttpInput {
        url: format!("{}/nodes", input_base),
        headers: [("Authorization".to_string(), "Bearer t0ken".to_string())]
            .into_iter()
            .collect(),
    });

    let options = RunOptions {
        dry_run: false,
        report_root: None,
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let summary = plan.run(&options, cancel_rx).await.unwrap();
    assert_eq!(summary.published, 1);
    assert!(summary.report.is_none());

    let inputs = input_seen.lock().unwrap().clone();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].method, Method::GET);
    assert_eq!(inputs[0].path, "/nodes");
    assert_eq!(inputs[0].header("authorization"), "Bearer t0ken");

    let outputs = output_seen.lock().unwrap().clone();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].method, Method::PUT);
    assert_eq!(outputs[0].path, "/nodes/b/gateway");
    assert_eq!(outputs[0].header("content-type"), "application/json");
    assert_eq!(outputs[0].body, "{\"port\":8993,\"udpEnabled\":true,\"uid\":\"b\"}\n");
}

#[tokio::test]
async fn test_unexpected_status_aborts_after_reporting() {
    let reports = TempDir::new().unwrap();
    let (base, seen) = serve(500, "boom".to_string()).await;
    let plan = udp_plan(&base);

    let options = RunOptions {
        dry_run: false,
        report_root: Some(reports.path().to_path_buf()),
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let err = plan.run(&options, cancel_rx).await.unwrap_err();

    match &err {
        PlanError::Output { label, source } => {
            assert_eq!(label, "b");
            assert!(matches!(source, OutputError::Status { status: 500, .. }));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(seen.lock().unwrap().len(), 1);

    // Record c comes after b and is never reached
    let run_dir = run_directory(reports.path());
    assert_eq!(csv_lines(&run_dir, CHANGES_FILE).len(), 2);
    let filtered = csv_lines(&run_dir, FILTERED_FILE);
    assert_eq!(filtered.len(), 2);
    assert!(filtered[1].starts_with("a,"));
}

#[tokio::test]
async fn test_pipeline_error_stops_the_run() {
    let reports = TempDir::new().unwrap();
    let plan = Plan::parse(
        r#"
input:
  raw: '[{"name": "a", "k": "x"}, {"name": "b"}, {"name": "c", "k": "x"}]'
pipeline:
  processors:
    - filter:
        query: '{{ hasPrefix .k "zz" }}'
"#,
    )
    .unwrap();
    let options = RunOptions {
        dry_run: true,
        report_root: Some(reports.path().to_path_buf()),
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let mut writer = NdjsonWriter::new(Vec::new());

    let err = plan
        .run_with_writer(&options, cancel_rx, Some(&mut writer))
        .await
        .unwrap_err();
    match &err {
        PlanError::Process { label, source } => {
            assert_eq!(label, "b");
            assert!(matches!(
                source,
                ProcessError::Template(TemplateError::Execute { .. })
            ));
        }
        other => panic!("unexpected error: {}", other),
    }

    let run_dir = run_directory(reports.path());
    let filtered = csv_lines(&run_dir, FILTERED_FILE);
    assert_eq!(filtered.len(), 2);
    assert!(filtered[1].starts_with("a,"));
    assert!(!filtered.iter().any(|line| line.starts_with("c,")));
    assert_eq!(csv_lines(&run_dir, CHANGES_FILE), vec!["name,field,before,after"]);
    assert_eq!(csv_lines(&run_dir, NOOPS_FILE), vec!["name"]);
    assert!(writer.into_inner().is_empty());
}

#[tokio::test]
async fn test_input_errors() {
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let err = Plan::default()
        .run(&RunOptions::default(), cancel_rx)
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::Input(_)));

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let plan = Plan::parse("input:\n  raw: 'not json'\n").unwrap();
    let err = plan.run(&RunOptions::default(), cancel_rx).await.unwrap_err();
    assert!(matches!(err, PlanError::Decode(_)));
}
