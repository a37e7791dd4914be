//! Test doubles shared by the module tests.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reqwest::blocking::Client;
use tiny_http::{Header, Response, Server};

use crate::shutdown::{Sleeper, Wake};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Local HTTP server answering with a fixed script of `(status, body)`
/// pairs, one per request, and recording what it received.
pub struct MockServer {
    url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
}

impl MockServer {
    pub fn start(script: Vec<(u16, String)>) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handle = thread::spawn(move || {
            for (status, body) in script {
                let mut request = match server.recv_timeout(Duration::from_secs(5)) {
                    Ok(Some(request)) => request,
                    _ => break,
                };
                let mut received = String::new();
                request.as_reader().read_to_string(&mut received).ok();
                recorded.lock().unwrap().push(Recorded {
                    method: request.method().to_string(),
                    path: request.url().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|header| (header.field.to_string(), header.value.to_string()))
                        .collect(),
                    body: received,
                });
                let content_type =
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap();
                let response = Response::from_string(body)
                    .with_status_code(status)
                    .with_header(content_type);
                request.respond(response).ok();
            }
        });
        Self {
            url: format!("http://{addr}"),
            requests,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the script to finish (or time out) and returns the log.
    pub fn finish(mut self) -> Vec<Recorded> {
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
        let requests = self.requests.lock().unwrap();
        requests.clone()
    }
}

pub fn http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Sleeper that never blocks and never interrupts.
pub struct NoWait;

impl Sleeper for NoWait {
    fn sleep(&self, _duration: Duration) -> Wake {
        Wake::Elapsed
    }
}
