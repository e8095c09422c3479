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

use crate::client::Observation;
use std::fmt::Write;

const MEASUREMENT: &str = "aemet_weather_conditions";
const TAG_STATION: &str = "station";

/// Encoder for `Observation`s in the InfluxDB line protocol.
///
/// Each observation becomes a single line with the measurement `aemet_weather_conditions`,
/// a `station` tag, every numeric field rounded to one decimal place, and the time of the
/// observation in Unix seconds. For example:
///
/// ```text
/// aemet_weather_conditions,station=1234X temperature=21.3,humidity=55.0,...,snow=0.0 1714564800
/// ```
///
/// No escaping is done. Field values are always numbers and station codes are plain
/// alphanumeric identifiers.
#[derive(Debug, Clone)]
pub struct LineEncoder {
    station: String,
}

impl LineEncoder {
    pub fn new<S: Into<String>>(station: S) -> Self {
        LineEncoder { station: station.into() }
    }

    /// Encode a single observation as a newline terminated line.
    pub fn encode(&self, obs: &Observation) -> String {
        let mut line = String::new();
        self.write_line(&mut line, obs);
        line
    }

    /// Encode all observations, keeping their order. No observations means no bytes.
    pub fn encode_all(&self, observations: &[Observation]) -> Vec<u8> {
        let mut payload = String::new();
        for obs in observations {
            self.write_line(&mut payload, obs);
        }

        payload.into_bytes()
    }

    fn write_line(&self, out: &mut String, obs: &Observation) {
        let fields = [
            ("temperature", obs.temperature),
            ("humidity", obs.humidity),
            ("pressure", obs.pressure),
            ("windspeed", obs.wind_speed),
            ("winddirection", obs.wind_direction),
            ("windgust", obs.wind_gust),
            ("precipitation", obs.precipitation),
            ("dewpoint", obs.dew_point),
            ("visibility", obs.visibility),
            ("insolation", obs.insolation),
            ("snow", obs.snow),
        ];

        // Writing to a String can't fail
        let _ = write!(out, "{},{}={} ", MEASUREMENT, TAG_STATION, self.station);
        for (i, (key, value)) in fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}={:.1}", key, value);
        }
        let _ = writeln!(out, " {}", obs.timestamp.timestamp());
    }
}
