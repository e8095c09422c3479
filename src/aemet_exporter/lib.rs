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

//! InfluxDB exporter for AEMET OpenData weather observations
//!
//! ## Features
//!
//! `aemet_exporter` fetches the latest conventional observations for a single [AEMET] weather
//! station using the [AEMET OpenData] API and writes them to an InfluxDB v2 bucket. It runs
//! once and exits, so it's meant to be run periodically by cron or a Systemd timer. Each
//! observation is written as a single point with the following fields.
//!
//! * `aemet_weather_conditions{station=$STATION}` - Measurement, tagged with the station code.
//! * `temperature` - Air temperature, in degrees celsius.
//! * `humidity` - Relative humidity (0-100).
//! * `pressure` - Pressure at station level, in hPa.
//! * `windspeed` - Mean wind speed, in m/s.
//! * `winddirection` - Mean wind direction, in degrees.
//! * `windgust` - Maximum wind gust, in m/s.
//! * `precipitation` - Accumulated precipitation, in mm.
//! * `dewpoint` - Dewpoint, in degrees celsius.
//! * `visibility` - Visibility, in km.
//! * `insolation` - Hours of sunshine.
//! * `snow` - Snow depth, in cm.
//!
//! Fields that a station doesn't report are written as `0.0`.
//!
//! [AEMET]: https://www.aemet.es/
//! [AEMET OpenData]: https://opendata.aemet.es/
//!
//! ## Build
//!
//! `aemet_exporter` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/aemet_exporter.git && cd aemet_exporter
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Configuration
//!
//! `aemet_exporter` reads its settings from a JSON file, `aemet_exporter.json` in the current
//! directory by default. Every key is required.
//!
//! ```json
//! {
//!   "AemetApiKey": "your AEMET OpenData API key",
//!   "AemetWeatherStationCode": "3195",
//!   "Bucket": "weather",
//!   "InfluxDBHost": "influx.example.com",
//!   "InfluxDBApiToken": "your InfluxDB token",
//!   "Org": "home"
//! }
//! ```
//!
//! ### Run
//!
//! ```text
//! ./aemet_exporter --config /etc/aemet_exporter.json
//! ```
//!
//! The process exits with status `0` when observations were written and `1` otherwise.
//! Requests that fail with a connection error or a 500, 502, 503, or 504 status are retried
//! up to three times, waiting 1, 2, and 4 seconds between attempts.
//!

pub mod client;
pub mod config;
pub mod export;
pub mod line;
pub mod transport;
pub mod upload;

#[cfg(test)]
pub(crate) mod testing;
