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

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Body, Client, Method, Request, Response, StatusCode, Url, Version};
use std::time::Duration;

/// Something that can perform a single HTTP round trip.
///
/// Implemented for `reqwest::Client` directly and for `RetryingTransport`, which wraps
/// another `Transport` and re-issues failed round trips.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, req: Request) -> Result<Response, reqwest::Error>;
}

#[async_trait]
impl Transport for Client {
    async fn execute(&self, req: Request) -> Result<Response, reqwest::Error> {
        Client::execute(self, req).await
    }
}

/// Return true if the result of a round trip should be retried.
///
/// Any transport level error (DNS, connect, TLS, timeout) is retried, as are the
/// server errors 500, 502, 503, and 504. Every other status, including all 4xx
/// responses, is returned to the caller as-is.
pub fn should_retry(result: &Result<Response, reqwest::Error>) -> bool {
    match result {
        Err(_) => true,
        Ok(res) => matches!(
            res.status(),
            StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ),
    }
}

/// `Transport` that retries failed round trips with exponential backoff.
///
/// The delay before retry `n` (starting at zero) is `base_delay * 2^n`, so the default
/// policy waits 1s, 2s, and 4s before giving up. Attempts are counted per call to
/// `execute`. After the last retry the final response or error is returned unchanged.
///
/// # Request bodies
///
/// Bodies are buffered once before the first attempt and a fresh copy is supplied to
/// every retry. Requests with streaming bodies can't be buffered and are sent exactly
/// once without any retries.
///
/// Retrying a non-idempotent request (such as a database write) can apply it twice when
/// the server processed the request but the connection dropped before the response was
/// read. Callers accept that duplicate by routing writes through this transport.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    max_retries: u32,
    base_delay: Duration,
}

impl<T> RetryingTransport<T> {
    pub const DEFAULT_RETRIES: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    pub fn new(inner: T) -> Self {
        Self::with_policy(inner, Self::DEFAULT_RETRIES, Self::DEFAULT_BASE_DELAY)
    }

    pub fn with_policy(inner: T, max_retries: u32, base_delay: Duration) -> Self {
        RetryingTransport {
            inner,
            max_retries,
            base_delay,
        }
    }

    /// Delay to wait before retry `retry`, counting from zero.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

#[async_trait]
impl<T> Transport for RetryingTransport<T>
where
    T: Transport,
{
    async fn execute(&self, req: Request) -> Result<Response, reqwest::Error> {
        let replay = match ReplayableRequest::buffer(req) {
            Ok(r) => r,
            Err(req) => {
                tracing::warn!(
                    message = "request body cannot be buffered, sending without retries",
                    method = %req.method(),
                    url = %req.url(),
                );
                return self.inner.execute(req).await;
            }
        };

        let mut result = self.inner.execute(replay.build()).await;
        let mut retries = 0;

        while retries < self.max_retries && should_retry(&result) {
            let delay = self.backoff(retries);
            tracing::warn!(
                message = "request failed, retrying",
                reason = %failure_reason(&result),
                url = %replay.url,
                retry = retries + 1,
                delay_secs = delay.as_secs_f64(),
            );

            tokio::time::sleep(delay).await;
            // Dropping the previous response here discards its unread body
            result = self.inner.execute(replay.build()).await;
            retries += 1;
        }

        result
    }
}

fn failure_reason(result: &Result<Response, reqwest::Error>) -> String {
    match result {
        Ok(res) => res.status().to_string(),
        Err(e) => e.to_string(),
    }
}

/// Everything needed to build an identical copy of a request for each attempt.
#[derive(Debug)]
struct ReplayableRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    version: Version,
    body: Option<Bytes>,
}

impl ReplayableRequest {
    /// Buffer the request, handing it back untouched if its body is a stream.
    fn buffer(req: Request) -> Result<Self, Request> {
        // Outer None means the body is a stream, inner None means there's no body
        let buffered = match req.body() {
            None => Some(None),
            Some(b) => b.as_bytes().map(|bytes| Some(Bytes::copy_from_slice(bytes))),
        };

        let body = match buffered {
            Some(body) => body,
            None => return Err(req),
        };

        Ok(ReplayableRequest {
            method: req.method().clone(),
            url: req.url().clone(),
            headers: req.headers().clone(),
            timeout: req.timeout().copied(),
            version: req.version(),
            body,
        })
    }

    fn build(&self) -> Request {
        let mut req = Request::new(self.method.clone(), self.url.clone());
        *req.headers_mut() = self.headers.clone();
        *req.timeout_mut() = self.timeout;
        *req.version_mut() = self.version;
        *req.body_mut() = self.body.clone().map(Body::from);
        req
    }
}

#[cfg(test)]
mod test {
    use super::{should_retry, RetryingTransport, Transport};
    use crate::testing::{MockTransport, Reply};
    use reqwest::{Body, Method, Request, Url};
    use std::time::Duration;

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_503_retries_three_times() {
        let mock = MockTransport::repeat(Reply::status(503, "unavailable"), 5);
        let transport = RetryingTransport::new(mock.clone());

        let res = transport.execute(get("https://example.com/a")).await.unwrap();

        assert_eq!(503, res.status().as_u16());
        assert_eq!("unavailable", res.text().await.unwrap());

        let requests = mock.requests();
        assert_eq!(4, requests.len());

        let gaps: Vec<Duration> = requests.windows(2).map(|w| w[1].at - w[0].at).collect();
        assert_eq!(
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)],
            gaps
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_not_retried() {
        let mock = MockTransport::new(vec![Reply::status(404, "missing"), Reply::status(200, "ok")]);
        let transport = RetryingTransport::new(mock.clone());

        let res = transport.execute(get("https://example.com/a")).await.unwrap();

        assert_eq!(404, res.status().as_u16());
        assert_eq!(1, mock.requests().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_server_errors() {
        let mock = MockTransport::new(vec![
            Reply::status(502, ""),
            Reply::status(504, ""),
            Reply::status(200, "done"),
        ]);
        let transport = RetryingTransport::new(mock.clone());

        let res = transport.execute(get("https://example.com/a")).await.unwrap();

        assert_eq!(200, res.status().as_u16());
        assert_eq!("done", res.text().await.unwrap());
        assert_eq!(3, mock.requests().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retried_then_returned() {
        let mock = MockTransport::repeat(Reply::Error, 4);
        let transport = RetryingTransport::new(mock.clone());

        let res = transport.execute(get("https://example.com/a")).await;

        assert!(res.is_err());
        assert_eq!(4, mock.requests().len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_replayed_on_every_attempt() {
        let mock = MockTransport::repeat(Reply::status(500, ""), 4);
        let transport = RetryingTransport::new(mock.clone());

        let mut req = Request::new(Method::POST, Url::parse("https://example.com/write").unwrap());
        *req.body_mut() = Some(Body::from("a line\nanother line\n"));
        let _ = transport.execute(req).await.unwrap();

        let requests = mock.requests();
        assert_eq!(4, requests.len());
        for r in requests {
            assert_eq!(Method::POST, r.method);
            assert_eq!(Some(b"a line\nanother line\n".to_vec()), r.body);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_reset_per_request() {
        let mock = MockTransport::repeat(Reply::status(503, ""), 8);
        let transport = RetryingTransport::new(mock.clone());

        let _ = transport.execute(get("https://example.com/a")).await.unwrap();
        let _ = transport.execute(get("https://example.com/b")).await.unwrap();

        assert_eq!(8, mock.requests().len());
    }

    #[test]
    fn test_backoff() {
        let transport = RetryingTransport::new(());
        assert_eq!(Duration::from_secs(1), transport.backoff(0));
        assert_eq!(Duration::from_secs(2), transport.backoff(1));
        assert_eq!(Duration::from_secs(4), transport.backoff(2));

        let custom = RetryingTransport::with_policy((), 5, Duration::from_millis(100));
        assert_eq!(Duration::from_millis(800), custom.backoff(3));
    }

    #[test]
    fn test_should_retry() {
        for code in [500, 502, 503, 504] {
            assert!(should_retry(&Ok(Reply::status(code, "").into_response())), "{}", code);
        }

        for code in [200, 204, 301, 400, 401, 404, 429, 501] {
            assert!(!should_retry(&Ok(Reply::status(code, "").into_response())), "{}", code);
        }

        assert!(should_retry(&Err(Reply::error())));
    }
}
