//! Shared test infrastructure for integration tests.
//!
//! Runs the built `da-status` binary against a throwaway HTTP listener that
//! answers from a fixed route table and records every request it sees.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::{Arc, Mutex};
use std::thread;

/// One request as seen by the mock server.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Minimal HTTP/1.1 responder: one request per connection, then close.
pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockServer {
    /// Routes are keyed by `"METHOD /path"`; unknown routes answer 404.
    pub fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let base_url = format!("http://{}", listener.local_addr().expect("local addr"));
        let routes: BTreeMap<String, (u16, String)> = routes
            .iter()
            .map(|(route, status, body)| (route.to_string(), (*status, body.to_string())))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                serve(stream, &routes, &recorded);
            }
        });

        Self { base_url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log").clone()
    }

    #[allow(dead_code)]
    pub fn count(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method)
            .count()
    }
}

/// Records the request before replying so the log is complete once the
/// client has its response.
fn serve(
    stream: TcpStream,
    routes: &BTreeMap<String, (u16, String)>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> Option<()> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let path = target.split('?').next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
    }

    let body = if chunked {
        read_chunked(&mut reader)
    } else {
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).ok()?;
        buf
    };

    let (status, reply) = routes
        .get(&format!("{method} {path}"))
        .cloned()
        .unwrap_or((404, String::from("not found")));
    recorded.lock().ok()?.push(RecordedRequest {
        method,
        path,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let mut stream = stream;
    let response = format!(
        "HTTP/1.1 {status} Mock\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
        reply.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
    Some(())
}

fn read_chunked(reader: &mut BufReader<TcpStream>) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        if reader.read_line(&mut size_line).is_err() {
            break;
        }
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        let mut chunk = vec![0u8; size + 2];
        if reader.read_exact(&mut chunk).is_err() {
            break;
        }
        if size == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..size]);
    }
    body
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

pub fn fixture(name: &str) -> PathBuf {
    manifest_dir().join("tests/fixtures").join(name)
}

#[allow(dead_code)]
pub fn fixture_text(name: &str) -> String {
    std::fs::read_to_string(fixture(name)).expect("read fixture")
}

/// Run the binary with an isolated environment pointing both admin hosts at
/// `base_url`.
pub fn run_da_status<S: AsRef<OsStr>>(args: &[S], base_url: &str, extra_env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_da-status"));
    command
        .args(args)
        .env("DA_ADMIN_HOST", base_url)
        .env("HLX_ADMIN_HOST", base_url)
        .env("RUST_LOG", "info")
        .env_remove("SLACK_TOKEN")
        .env_remove("SKIP_PUBLISH")
        .env_remove("CLIENT_ID")
        .env_remove("CLIENT_SECRET");
    for (key, value) in extra_env {
        command.env(key, value);
    }
    command.output().expect("run da-status")
}
