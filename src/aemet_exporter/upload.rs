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

use crate::transport::Transport;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Body, Method, Request, Url};
use std::error;
use std::fmt;
use std::io::{self, Write};

#[derive(Debug)]
pub enum UploadError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    InvalidToken,
    Compression(io::Error),
    Rejected { status: u16, body: String },
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(s) => write!(f, "invalid URL {}", s),
            Self::InvalidToken => write!(f, "API token is not a valid header value"),
            Self::Compression(e) => write!(f, "unable to compress payload: {}", e),
            Self::Rejected { status, body } => write!(f, "write rejected with status {}: {}", status, body),
        }
    }
}

impl error::Error for UploadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Compression(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the InfluxDB v2 write API.
#[derive(Debug)]
pub struct InfluxClient<T> {
    transport: T,
    write_url: Url,
    auth: HeaderValue,
}

impl<T> InfluxClient<T>
where
    T: Transport,
{
    const JSON_RESPONSE: &'static str = "application/json";
    const TEXT_PAYLOAD: &'static str = "text/plain; charset=utf-8";
    const GZIP: &'static str = "gzip";

    pub fn new(transport: T, host: &str, org: &str, bucket: &str, token: &str) -> Result<Self, UploadError> {
        let raw = format!("https://{}/api/v2/write", host);
        let mut write_url = Url::parse(&raw).map_err(|e| UploadError::InvalidUrl(format!("{}: {}", raw, e)))?;
        write_url
            .query_pairs_mut()
            .append_pair("precision", "s")
            .append_pair("org", org)
            .append_pair("bucket", bucket);

        let mut auth = HeaderValue::from_str(&format!("Token {}", token)).map_err(|_| UploadError::InvalidToken)?;
        auth.set_sensitive(true);

        Ok(InfluxClient {
            transport,
            write_url,
            auth,
        })
    }

    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    /// Compress and write a line protocol payload.
    ///
    /// Any status in the range `[200, 300)` is success. Other responses are an error
    /// that includes the body returned by the server. An empty payload is still sent.
    pub async fn write(&self, payload: &[u8]) -> Result<(), UploadError> {
        let compressed = compress(payload).map_err(UploadError::Compression)?;
        tracing::debug!(
            message = "writing payload",
            url = %self.write_url,
            num_bytes = payload.len(),
            compressed_bytes = compressed.len(),
        );

        let mut req = Request::new(Method::POST, self.write_url.clone());
        {
            let headers = req.headers_mut();
            headers.insert(ACCEPT, HeaderValue::from_static(Self::JSON_RESPONSE));
            headers.insert(AUTHORIZATION, self.auth.clone());
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(Self::GZIP));
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(Self::TEXT_PAYLOAD));
        }
        *req.body_mut() = Some(Body::from(compressed));

        let res = self.transport.execute(req).await.map_err(UploadError::Internal)?;
        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = res.text().await.map_err(UploadError::Internal)?;
            Err(UploadError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Gzip compress a payload at the default compression level.
pub fn compress(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}
