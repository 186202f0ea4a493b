//! Shared helpers for integration tests: a range-aware file responder and
//! request inspection.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bulkfetch_core::{ProgressSink, ProgressUpdate};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves a fixed body the way an object store does: `Range: bytes=a-b`
/// and `bytes=a-` get a 206 with `Content-Range`, a range past the end
/// gets 416 `bytes */N`, no range gets the whole body.
pub struct RangeFile {
    body: Vec<u8>,
    honour_ranges: bool,
}

impl RangeFile {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            honour_ranges: true,
        }
    }

    /// Ignores `Range` and never advertises `Accept-Ranges`.
    pub fn without_ranges(body: Vec<u8>) -> Self {
        Self {
            body,
            honour_ranges: false,
        }
    }
}

impl Respond for RangeFile {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.body.len() as u64;
        let requested = range_header(request).and_then(|value| parse_range(&value));

        match requested {
            Some((start, end)) if self.honour_ranges => {
                if start >= total {
                    return ResponseTemplate::new(416)
                        .insert_header("Content-Range", format!("bytes */{total}").as_str());
                }
                let end = end.unwrap_or(total - 1).min(total - 1);
                let slice = self.body[usize::try_from(start).unwrap()..=usize::try_from(end).unwrap()]
                    .to_vec();
                ResponseTemplate::new(206)
                    .insert_header("Accept-Ranges", "bytes")
                    .insert_header("Content-Range", format!("bytes {start}-{end}/{total}").as_str())
                    .set_body_bytes(slice)
            }
            _ => {
                let response = ResponseTemplate::new(200).set_body_bytes(self.body.clone());
                if self.honour_ranges {
                    response.insert_header("Accept-Ranges", "bytes")
                } else {
                    response
                }
            }
        }
    }
}

/// Value of the request's `Range` header, if any.
pub fn range_header(request: &Request) -> Option<String> {
    request
        .headers
        .get("range")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Parses `bytes=a-b` / `bytes=a-`.
fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some((start, end))
}

/// Deterministic, non-repeating test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Mounts `responder` for GETs of `route`.
pub async fn mount_file(server: &MockServer, route: &str, responder: impl Respond + 'static) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(responder)
        .mount(server)
        .await;
}

/// `Range` headers of every request the server saw, in order (`None` for
/// requests without one).
pub async fn received_ranges(server: &MockServer) -> Vec<Option<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(range_header)
        .collect()
}

pub fn write_partial(path: &Path, bytes: &[u8]) {
    std::fs::write(path, bytes).expect("failed to write partial file");
}

/// Progress sink that records everything it is sent.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub updates: Mutex<Vec<u64>>,
    pub finished: Mutex<Option<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.bytes_transferred);
    }

    fn on_finish(&self, update: &ProgressUpdate) {
        *self.finished.lock().unwrap() = Some(update.clone());
    }
}

/// Plain HTTP/1.1 server for cases a mock server cannot express, such as a
/// connection dropped mid-body or a body trickled out in timed chunks.
///
/// `respond` maps the request's `Range` header to the chunks written back;
/// the connection is closed after the last chunk.
pub struct RawServer {
    pub base: String,
    ranges: Arc<Mutex<Vec<Option<String>>>>,
}

impl RawServer {
    pub async fn start<F>(chunk_delay: Duration, respond: F) -> Self
    where
        F: Fn(Option<&str>) -> Vec<Vec<u8>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ranges);
        let respond = Arc::new(respond);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let Some(head) = read_request_head(&mut socket).await else {
                        return;
                    };
                    let range = head.lines().find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("range")
                            .then(|| value.trim().to_string())
                    });
                    seen.lock().unwrap().push(range.clone());
                    for (index, chunk) in respond(range.as_deref()).iter().enumerate() {
                        if index > 0 {
                            tokio::time::sleep(chunk_delay).await;
                        }
                        if socket.write_all(chunk).await.is_err() {
                            return;
                        }
                        let _ = socket.flush().await;
                    }
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { base, ranges }
    }

    pub fn url(&self, route: &str) -> url::Url {
        url::Url::parse(&format!("{}{route}", self.base)).unwrap()
    }

    /// `Range` headers of every request seen so far, in order.
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().unwrap().clone()
    }
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut buf = [0_u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = socket.read(&mut buf).await.ok()?;
        if read == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..read]);
    }
    String::from_utf8(head).ok()
}

/// Response head with `Connection: close` and the given extra headers.
pub fn response_head(status: &str, content_length: usize, headers: &[(&str, String)]) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {status}\r\nContent-Length: {content_length}\r\nConnection: close\r\n"
    );
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    head.into_bytes()
}
