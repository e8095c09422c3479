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
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Method, Request, Response, Url};
use serde::{Deserialize, Deserializer};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Internal(reqwest::Error),
    InvalidUrl(String),
    InvalidApiKey,
    Unexpected { status: u16, url: Url, body: String },
    Decode(serde_json::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::InvalidUrl(s) => write!(f, "invalid URL {}", s),
            Self::InvalidApiKey => write!(f, "API key is not a valid header value"),
            Self::Unexpected { status, url, body } => {
                write!(f, "unexpected status {} for {}: {}", status, url, body)
            }
            Self::Decode(e) => write!(f, "unable to decode response: {}", e),
        }
    }
}

impl error::Error for ClientError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// Client for the conventional observation endpoint of the AEMET OpenData API.
///
/// Fetching data is a two step process: the first request (authenticated with an API key)
/// returns a small JSON document naming the URL of the actual data. The second request
/// fetches the observations themselves from that URL.
#[derive(Debug)]
pub struct AemetClient<T> {
    transport: T,
    base_url: Url,
    api_key: HeaderValue,
}

impl<T> AemetClient<T>
where
    T: Transport,
{
    const API_KEY_HEADER: &'static str = "api_key";
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(transport: T, base_url: &str, api_key: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        let mut api_key = HeaderValue::from_str(api_key).map_err(|_| ClientError::InvalidApiKey)?;
        api_key.set_sensitive(true);

        Ok(AemetClient {
            transport,
            base_url,
            api_key,
        })
    }

    /// Fetch the latest observations for a station, in the order the API returns them.
    pub async fn observations(&self, station: &str) -> Result<Vec<Observation>, ClientError> {
        let redirect = self.redirect(station).await?;
        let data_url = Url::parse(&redirect.datos)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", redirect.datos, e)))?;
        tracing::debug!(message = "making observation data request", url = %data_url);

        let mut req = Request::new(Method::GET, data_url);
        req.headers_mut().insert(ACCEPT, HeaderValue::from_static(Self::JSON_RESPONSE));

        let body = self.make_request(req).await?;
        decode(&body)
    }

    /// Fetch the descriptor naming the URL that holds observation data for a station.
    pub async fn redirect(&self, station: &str) -> Result<RedirectDescriptor, ClientError> {
        let station_url = self.station_url(station);
        tracing::debug!(message = "making station redirect request", url = %station_url);

        let mut req = Request::new(Method::GET, station_url);
        req.headers_mut().insert(Self::API_KEY_HEADER, self.api_key.clone());
        req.headers_mut().insert(ACCEPT, HeaderValue::from_static(Self::JSON_RESPONSE));

        let body = self.make_request(req).await?;
        decode(&body)
    }

    async fn make_request(&self, req: Request) -> Result<String, ClientError> {
        let url = req.url().clone();
        let res = self.transport.execute(req).await.map_err(ClientError::Internal)?;
        let status = res.status();

        // Redirects are reported in the body rather than with a 3xx, anything
        // below 400 is treated as a usable response.
        if status.is_success() || status.is_redirection() {
            read_body(res).await
        } else {
            let body = read_body(res).await?;
            Err(ClientError::Unexpected {
                status: status.as_u16(),
                url,
                body,
            })
        }
    }

    fn station_url(&self, station: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            // Checked to be a base URL in the constructor
            if let Ok(mut p) = url.path_segments_mut() {
                p.pop_if_empty().push(station);
            }
        }

        url
    }
}

/// AEMET serves ISO-8859-15 text so anything that isn't UTF-8 (station names) is replaced.
async fn read_body(res: Response) -> Result<String, ClientError> {
    let bytes = res.bytes().await.map_err(ClientError::Internal)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode<'a, D: Deserialize<'a>>(body: &'a str) -> Result<D, ClientError> {
    serde_json::from_str(body).map_err(ClientError::Decode)
}

/// Pointer to where the actual data for a request can be fetched.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RedirectDescriptor {
    pub datos: String,
}

/// A single conventional observation from a station.
///
/// Numeric fields missing from the response (or `null`) are set to zero rather than
/// being treated as absent. Downstream consumers can't tell a missing reading from a
/// real zero.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Observation {
    #[serde(rename = "fint", deserialize_with = "de_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "ta", default, deserialize_with = "de_zero_if_missing")]
    pub temperature: f64,
    #[serde(rename = "hr", default, deserialize_with = "de_zero_if_missing")]
    pub humidity: f64,
    #[serde(rename = "pres", default, deserialize_with = "de_zero_if_missing")]
    pub pressure: f64,
    #[serde(rename = "vv", default, deserialize_with = "de_zero_if_missing")]
    pub wind_speed: f64,
    #[serde(rename = "dv", default, deserialize_with = "de_zero_if_missing")]
    pub wind_direction: f64,
    #[serde(rename = "vmax", default, deserialize_with = "de_zero_if_missing")]
    pub wind_gust: f64,
    #[serde(rename = "prec", default, deserialize_with = "de_zero_if_missing")]
    pub precipitation: f64,
    #[serde(rename = "tpr", default, deserialize_with = "de_zero_if_missing")]
    pub dew_point: f64,
    #[serde(rename = "vis", default, deserialize_with = "de_zero_if_missing")]
    pub visibility: f64,
    #[serde(rename = "inso", default, deserialize_with = "de_zero_if_missing")]
    pub insolation: f64,
    #[serde(rename = "nie", default, deserialize_with = "de_zero_if_missing")]
    pub snow: f64,
}

/// Number of leading characters of the `fint` field that make up the timestamp.
const TIMESTAMP_WIDTH: usize = 19;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse an observation timestamp, treating it as UTC.
///
/// Only the first 19 characters (`2024-05-01T12:00:00`) are used, anything after that
/// is ignored, including any offset. Shorter values are an error.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    let prefix = value
        .get(..TIMESTAMP_WIDTH)
        .ok_or_else(|| format!("timestamp {:?} shorter than {} characters", value, TIMESTAMP_WIDTH))?;

    NaiveDateTime::parse_from_str(prefix, TIMESTAMP_FORMAT)
        .map(|t| t.and_utc())
        .map_err(|e| format!("invalid timestamp {:?}: {}", value, e))
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn de_zero_if_missing<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
