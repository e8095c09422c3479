// aemet_exporter - InfluxDB exporter for AEMET OpenData weather observations
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! In-memory `Transport` used by unit tests.

use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Request, Response};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Status(u16, Vec<u8>),
    Error,
}

impl Reply {
    pub(crate) fn status(code: u16, body: &str) -> Self {
        Reply::Status(code, body.as_bytes().to_vec())
    }

    pub(crate) fn into_response(self) -> Response {
        match self {
            Reply::Status(code, body) => Response::from(http::Response::builder().status(code).body(body).unwrap()),
            Reply::Error => panic!("not a response"),
        }
    }

    /// A builder error stands in for any transport level failure.
    pub(crate) fn error() -> reqwest::Error {
        reqwest::Client::new().get("not a url").build().unwrap_err()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) at: Instant,
}

#[derive(Debug, Default)]
struct State {
    replies: VecDeque<Reply>,
    requests: Vec<Recorded>,
}

/// Returns scripted replies in order and records every request it sees.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(State {
                replies: replies.into(),
                requests: Vec::new(),
            })),
        }
    }

    pub(crate) fn repeat(reply: Reply, times: usize) -> Self {
        Self::new(vec![reply; times])
    }

    pub(crate) fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, req: Request) -> Result<Response, reqwest::Error> {
        let reply = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(Recorded {
                method: req.method().clone(),
                url: req.url().to_string(),
                headers: req.headers().clone(),
                body: req.body().and_then(|b| b.as_bytes()).map(|b| b.to_vec()),
                at: Instant::now(),
            });

            state.replies.pop_front().expect("no reply scripted for request")
        };

        match reply {
            Reply::Error => Err(Reply::error()),
            r => Ok(r.into_response()),
        }
    }
}
