//! Scripted fetcher for strategy and lifecycle tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::StatusCode;
use strive_net::{Fetch, NetError, Request, Response};

#[derive(Clone)]
enum Scripted {
    Respond { status: u16, body: String },
    Fail,
}

/// A fetcher answering from per-URL scripts. Each URL holds a queue of
/// outcomes; the last one repeats once the queue drains. URLs without a
/// script fail, which doubles as "network down".
#[derive(Default)]
pub(crate) struct MockFetch {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    hits: Mutex<HashMap<String, u32>>,
}

impl MockFetch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Script a successful response for a URL.
    pub(crate) fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.push(
            url,
            Scripted::Respond {
                status,
                body: body.to_string(),
            },
        );
        self
    }

    /// Script a network failure for a URL.
    pub(crate) fn fail(self, url: &str) -> Self {
        self.push(url, Scripted::Fail);
        self
    }

    /// How many times a URL was fetched.
    pub(crate) fn hits(&self, url: &str) -> u32 {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn push(&self, url: &str, outcome: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    fn next(&self, url: &str) -> Option<Scripted> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Fetch for MockFetch {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, NetError>> {
        Box::pin(async move {
            let url = request.url.to_string();
            *self.hits.lock().unwrap().entry(url.clone()).or_insert(0) += 1;

            match self.next(&url) {
                Some(Scripted::Respond { status, body }) => Ok(Response::new(
                    request.url.clone(),
                    StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
                    Bytes::from(body.into_bytes()),
                )),
                Some(Scripted::Fail) | None => {
                    Err(NetError::RequestFailed(format!("connection refused: {url}")))
                }
            }
        })
    }
}

/// Let detached tasks run to completion on the test runtime.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
