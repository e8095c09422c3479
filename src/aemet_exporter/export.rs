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

use crate::client::{AemetClient, ClientError};
use crate::line::LineEncoder;
use crate::transport::Transport;
use crate::upload::{InfluxClient, UploadError};
use std::error;
use std::fmt;

#[derive(Debug)]
pub enum ExportError {
    Fetch(ClientError),
    Upload(UploadError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "unable to fetch observations: {}", e),
            Self::Upload(e) => write!(f, "unable to upload observations: {}", e),
        }
    }
}

impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Upload(e) => Some(e),
        }
    }
}

impl From<ClientError> for ExportError {
    fn from(e: ClientError) -> Self {
        Self::Fetch(e)
    }
}

impl From<UploadError> for ExportError {
    fn from(e: UploadError) -> Self {
        Self::Upload(e)
    }
}

/// Outcome of a successful export run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub observations: usize,
    pub payload_bytes: usize,
}

/// Fetch the latest observations for a station and write them to InfluxDB.
///
/// Each step runs after the previous one completes and the first failure ends the
/// run. Nothing is written unless every observation was fetched and decoded.
pub async fn export<A, I>(
    aemet: &AemetClient<A>,
    encoder: &LineEncoder,
    influx: &InfluxClient<I>,
    station: &str,
) -> Result<ExportSummary, ExportError>
where
    A: Transport,
    I: Transport,
{
    let observations = aemet.observations(station).await?;
    tracing::info!(message = "fetched observations", station = %station, count = observations.len());

    let payload = encoder.encode_all(&observations);
    influx.write(&payload).await?;
    tracing::info!(message = "wrote observations", url = %influx.write_url(), num_bytes = payload.len());

    Ok(ExportSummary {
        observations: observations.len(),
        payload_bytes: payload.len(),
    })
}
