#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chain_runner::bridge::{HttpExecutor, HttpResponse, TransportError};
use chain_runner::chain::ConcreteRequest;
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_chain(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write chain file");
}

pub fn write_runner_config(dir: &Path, content: &str) {
    fs::write(dir.join("runner.yaml"), content).expect("Failed to write runner.yaml");
}

/// One step hitting `url`
pub fn simple_chain(name: &str, url: &str) -> String {
    format!(
        r#"
name: {}
steps:
  - order: 1
    name: Ping
    url: {}
    timeout: 2000
"#,
        name, url
    )
}

/// A scripted reply from [`MockExecutor`]
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond {
        status: u16,
        headers: BTreeMap<String, String>,
        body: String,
    },
    Fail(TransportError),
    Delayed(Duration, Box<MockReply>),
}

pub fn status(code: u16) -> MockReply {
    MockReply::Respond {
        status: code,
        headers: BTreeMap::new(),
        body: String::new(),
    }
}

pub fn json(code: u16, body: serde_json::Value) -> MockReply {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    MockReply::Respond {
        status: code,
        headers,
        body: body.to_string(),
    }
}

pub fn with_header(reply: MockReply, name: &str, value: &str) -> MockReply {
    match reply {
        MockReply::Respond {
            status,
            mut headers,
            body,
        } => {
            headers.insert(name.to_string(), value.to_string());
            MockReply::Respond {
                status,
                headers,
                body,
            }
        }
        other => other,
    }
}

pub fn refused() -> MockReply {
    MockReply::Fail(TransportError::Connection("connection refused".to_string()))
}

pub fn delayed(ms: u64, reply: MockReply) -> MockReply {
    MockReply::Delayed(Duration::from_millis(ms), Box::new(reply))
}

struct Route {
    fragment: String,
    replies: VecDeque<MockReply>,
}

/// In-process [`HttpExecutor`]
///
/// Routes match when the request URL contains their fragment; the first match
/// wins. Each route replays its replies in order and repeats the last one.
/// Unmatched requests get a 404.
#[derive(Default)]
pub struct MockExecutor {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<ConcreteRequest>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, fragment: &str, replies: Vec<MockReply>) -> Self {
        self.routes.lock().unwrap().push(Route {
            fragment: fragment.to_string(),
            replies: replies.into(),
        });
        self
    }

    pub fn requests(&self) -> Vec<ConcreteRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    fn next_reply(&self, url: &str) -> MockReply {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| url.contains(&r.fragment)) {
            Some(route) if route.replies.len() > 1 => route.replies.pop_front().unwrap(),
            Some(route) => route.replies.front().cloned().unwrap_or_else(|| status(404)),
            None => status(404),
        }
    }
}

#[async_trait]
impl HttpExecutor for MockExecutor {
    async fn send(
        &self,
        request: &ConcreteRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut reply = self.next_reply(&request.url);

        loop {
            match reply {
                MockReply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                MockReply::Respond {
                    status,
                    headers,
                    body,
                } => {
                    return Ok(HttpResponse {
                        status,
                        headers,
                        body,
                        elapsed_ms: 1,
                    })
                }
                MockReply::Fail(error) => return Err(error),
            }
        }
    }
}
