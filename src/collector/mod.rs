//! Loopback stand-in for the inspection server.
//!
//! Accepts the same three endpoints the delivery client talks to and records
//! every accepted request so demos and integration tests can inspect what the
//! pipeline sent:
//!
//! - `POST /surface_movement` with a JSON body answers 201.
//! - `POST /pictures_batch` with a JSON body answers 201.
//! - `GET /ping` answers 204 with no body.
//!
//! Anything else is refused without being recorded: an unknown endpoint gets
//! 404, a known endpoint with the wrong method gets 405, and a body that is
//! not JSON gets 400. Each connection carries exactly one request and is
//! closed after the response, which is all `HttpTransport` needs.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::delivery::{PICTURES_BATCH_PATH, PING_PATH, SURFACE_MOVEMENT_PATH};

const MAX_REQUEST_BYTES: usize = 64 * 1024;
const DEFAULT_COLLECTOR_ADDR: &str = "127.0.0.1:5000";

/// One request the collector answered with a success status.
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedRequest {
    pub method: String,
    /// Endpoint name without the leading slash.
    pub path: String,
    /// Parsed JSON body; `Null` for body-less requests.
    pub body: Value,
}

type RequestLog = Arc<Mutex<Vec<ReceivedRequest>>>;

#[derive(Debug)]
pub struct CollectorHandle {
    pub addr: SocketAddr,
    received: RequestLog,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Base URL suitable for `HttpTransport::new`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Copy of every accepted request so far, in arrival order.
    pub fn received(&self) -> Vec<ReceivedRequest> {
        match self.received.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn received_on(&self, path: &str) -> Vec<ReceivedRequest> {
        self.received()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("collector thread panicked"))?;
        }
        Ok(())
    }
}

pub struct CollectorServer {
    addr: String,
}

impl Default for CollectorServer {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_ADDR)
    }
}

impl CollectorServer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Binds and serves on a background thread. Port 0 picks a free port.
    pub fn spawn(self) -> Result<CollectorHandle> {
        let configured_addr: SocketAddr = self.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let received = RequestLog::default();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let received_thread = received.clone();
        let join = std::thread::Builder::new()
            .name("collector".to_string())
            .spawn(move || {
                if let Err(err) = run_collector(listener, &received_thread, &shutdown_thread) {
                    log::error!("collector stopped: {}", err);
                }
            })?;
        log::info!("collector listening on {}", addr);

        Ok(CollectorHandle {
            addr,
            received,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_collector(listener: TcpListener, received: &RequestLog, shutdown: &AtomicBool) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, received) {
                    log::warn!("collector request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, received: &RequestLog) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    let endpoint = request.path.trim_start_matches('/');

    let (expected_method, status) = match endpoint {
        SURFACE_MOVEMENT_PATH | PICTURES_BATCH_PATH => ("POST", 201),
        PING_PATH => ("GET", 204),
        _ => {
            write_response(&mut stream, 404, br#"{"error":"not_found"}"#)?;
            return Ok(());
        }
    };
    if request.method != expected_method {
        write_response(&mut stream, 405, br#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }

    let body = if request.body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&request.body) {
            Ok(value) => value,
            Err(err) => {
                write_response(&mut stream, 400, br#"{"error":"invalid_json"}"#)?;
                return Err(anyhow!("invalid JSON body on {}: {}", endpoint, err));
            }
        }
    };

    log::info!("received {} request", endpoint);
    {
        let mut requests = received
            .lock()
            .map_err(|_| anyhow!("collector request log poisoned"))?;
        requests.push(ReceivedRequest {
            method: request.method.clone(),
            path: endpoint.to_string(),
            body,
        });
    }
    write_response(&mut stream, status, b"")?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed before headers"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| anyhow!("invalid content-length '{}'", value))?,
        None => 0,
    };
    if header_end + content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request too large"));
    }
    while data.len() < header_end + content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        data.extend_from_slice(&buf[..n]);
    }

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        body: data[header_end..header_end + content_length].to_vec(),
    })
}

fn write_response(stream: &mut TcpStream, status: u16, body: &[u8]) -> Result<()> {
    let status_line = match status {
        201 => "HTTP/1.1 201 Created",
        204 => "HTTP/1.1 204 No Content",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = if status == 204 {
        format!("{status_line}\r\nConnection: close\r\n\r\n")
    } else {
        format!(
            "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
            len = body.len()
        )
    };
    stream.write_all(header.as_bytes())?;
    if status != 204 {
        stream.write_all(body)?;
    }
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn answers_endpoints_with_expected_status() {
        let handle = CollectorServer::new("127.0.0.1:0").spawn().unwrap();
        let body = r#"{"velocity":30.0,"displacement":1.0}"#;
        let response = exchange(
            handle.addr,
            &format!(
                "POST /surface_movement HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            ),
        );
        assert!(response.starts_with("HTTP/1.1 201 Created"));

        let response = exchange(handle.addr, "GET /ping HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 204 No Content"));

        let received = handle.received();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].path, "surface_movement");
        assert_eq!(received[0].body["velocity"], 30.0);
        assert_eq!(received[1].body, Value::Null);
        handle.stop().unwrap();
    }

    #[test]
    fn rejects_unknown_path_and_wrong_method() {
        let handle = CollectorServer::new("127.0.0.1:0").spawn().unwrap();
        let response = exchange(handle.addr, "GET /frames HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404"));
        let response = exchange(handle.addr, "GET /pictures_batch HTTP/1.1\r\nHost: x\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 405"));
        assert!(handle.received().is_empty());
        handle.stop().unwrap();
    }

    #[test]
    fn invalid_json_is_bad_request() {
        let handle = CollectorServer::new("127.0.0.1:0").spawn().unwrap();
        let response = exchange(
            handle.addr,
            "POST /pictures_batch HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\n{{{",
        );
        assert!(response.starts_with("HTTP/1.1 400"));
        assert!(handle.received_on(PICTURES_BATCH_PATH).is_empty());
        handle.stop().unwrap();
    }
}
