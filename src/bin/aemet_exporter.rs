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

use aemet_exporter::client::AemetClient;
use aemet_exporter::config::Config;
use aemet_exporter::export::export;
use aemet_exporter::line::LineEncoder;
use aemet_exporter::transport::RetryingTransport;
use aemet_exporter::upload::InfluxClient;
use clap::Parser;
use reqwest::Client;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_TIMEOUT_MILLIS: u64 = 30_000;
const DEFAULT_CONFIG_PATH: &str = "aemet_exporter.json";
const DEFAULT_API_URL: &str = "https://opendata.aemet.es/opendata/api/observacion/convencional/datos/estacion/";

#[derive(Debug, Parser)]
#[clap(name = "aemet_exporter", version = clap::crate_version!())]
struct AemetExporterApplication {
    /// Path to the JSON configuration file with AEMET and InfluxDB credentials
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Base URL for AEMET OpenData conventional observations, the station code is appended
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for connecting and for each complete request to AEMET or InfluxDB, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opts = AemetExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let startup = Instant::now();
    let config = Config::from_path(&opts.config).unwrap_or_else(|e| {
        tracing::error!(message = "invalid configuration", path = %opts.config.display(), error = %e);
        process::exit(1)
    });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to initialize HTTP client", error = %e);
            process::exit(1)
        });

    // Both clients share a connection pool and the same retry policy
    let transport = RetryingTransport::new(http_client);
    let aemet = AemetClient::new(transport.clone(), &opts.api_url, &config.aemet_api_key).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize AEMET client", api_url = %opts.api_url, error = %e);
        process::exit(1)
    });
    let influx = InfluxClient::new(
        transport,
        &config.influxdb_host,
        &config.org,
        &config.bucket,
        &config.influxdb_api_token,
    )
    .unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize InfluxDB client", host = %config.influxdb_host, error = %e);
        process::exit(1)
    });

    let encoder = LineEncoder::new(config.station.as_str());
    tracing::info!(message = "export started", api_url = %opts.api_url, station = %config.station);

    match export(&aemet, &encoder, &influx, &config.station).await {
        Ok(summary) => {
            tracing::info!(
                message = "export finished",
                station = %config.station,
                observations = summary.observations,
                num_bytes = summary.payload_bytes,
                runtime_secs = startup.elapsed().as_secs_f64(),
            );
        }
        Err(e) => {
            tracing::error!(
                message = "export failed",
                station = %config.station,
                error = %e,
                runtime_secs = startup.elapsed().as_secs_f64(),
            );
            process::exit(1)
        }
    }
}
