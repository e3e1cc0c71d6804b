//! Shared helpers for stemdeck-server integration tests

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use stemdeck_common::config::{SeparationConfig, ServiceConfig};
use stemdeck_common::db::init_database_pool;
use stemdeck_server::AppState;
use tempfile::TempDir;

pub const HOST: &str = "localhost:8000";
pub const BOUNDARY: &str = "stemdeck-test-boundary";

/// Fake separation tool: four non-empty stems in the tool's own directory naming
pub const FAKE_TOOL: &str = r#"model="$2"
out="$4"
input="$5"
name=$(basename "$input")
dir="$out/$model/${name%.*}"
mkdir -p "$dir"
for stem in vocals drums bass other; do
    printf 'RIFF-%s' "$stem" > "$dir/$stem.wav"
done
"#;

/// Fake tool that exits non-zero
pub const FAILING_TOOL: &str = "echo 'separation failed' >&2\nexit 2\n";

/// Fake tool that exits zero without writing anything
pub const SILENT_TOOL: &str = "exit 0\n";

/// App state rooted in a fresh temp dir, running `script` as the separation tool
pub async fn test_state(script: &str) -> (TempDir, AppState) {
    test_state_with_purge(script, false).await
}

/// Same as [`test_state`] with an explicit failure-cleanup policy
pub async fn test_state_with_purge(script: &str, purge_failed_jobs: bool) -> (TempDir, AppState) {
    let dir = TempDir::new().expect("temp dir");
    let script_path = dir.path().join("fake_tool.sh");
    std::fs::write(&script_path, script).expect("write fake tool");

    let mut config = ServiceConfig::with_root_folder(dir.path().join("root"));
    config.separation = SeparationConfig {
        program: "sh".to_string(),
        args: vec![script_path.to_string_lossy().into_owned()],
        purge_failed_jobs,
        ..Default::default()
    };

    let pool = init_database_pool(&config.database_path)
        .await
        .expect("catalog database");
    let state = AppState::new(config, pool);
    state
        .layout
        .ensure_directories()
        .await
        .expect("layout directories");

    (dir, state)
}

/// Multipart POST /upload/ with an optional model_name field placed before the file
pub fn upload_request(filename: &str, content: &[u8], model: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();

    if let Some(model) = model {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"model_name\"\r\n\r\n{model}\r\n"
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload/")
        .header("host", HOST)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Multipart POST /upload/ from raw part bodies, closed with the final boundary
pub fn multipart_request(parts: &[String]) -> Request<Body> {
    let mut body = String::new();
    for part in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n{part}\r\n"));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/upload/")
        .header("host", HOST)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Multipart part carrying a file
pub fn file_part(filename: &str, content: &str) -> String {
    format!(
        "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}"
    )
}

/// Request without a body
pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("host", HOST)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("JSON body")
}

/// Path part of a download URL returned by the upload endpoint
pub fn download_path(url: &str) -> String {
    url.strip_prefix(&format!("http://{HOST}"))
        .expect("URL uses request host")
        .to_string()
}
