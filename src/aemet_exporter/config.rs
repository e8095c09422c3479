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

use serde::Deserialize;
use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, io::Error),
    Parse(serde_json::Error),
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "unable to read {}: {}", path.display(), e),
            Self::Parse(e) => write!(f, "unable to parse configuration: {}", e),
            Self::Missing(field) => write!(f, "{} is required", field),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Credentials and destination for a single export run.
///
/// Read from a JSON document. Keys that are absent decode to empty strings and are
/// then rejected by `validate` the same way as explicitly empty values.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "AemetApiKey")]
    pub aemet_api_key: String,
    #[serde(rename = "AemetWeatherStationCode")]
    pub station: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "InfluxDBHost")]
    pub influxdb_host: String,
    #[serde(rename = "InfluxDBApiToken")]
    pub influxdb_api_token: String,
    #[serde(rename = "Org")]
    pub org: String,
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Make sure every field is set, reporting the first one that isn't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("AemetApiKey", &self.aemet_api_key),
            ("AemetWeatherStationCode", &self.station),
            ("Bucket", &self.bucket),
            ("InfluxDBHost", &self.influxdb_host),
            ("InfluxDBApiToken", &self.influxdb_api_token),
            ("Org", &self.org),
        ];

        match fields.iter().find(|(_, v)| v.is_empty()) {
            Some((name, _)) => Err(ConfigError::Missing(*name)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Config, ConfigError};

    const COMPLETE: &str = r#"{
        "AemetApiKey": "key",
        "AemetWeatherStationCode": "1234X",
        "Bucket": "weather",
        "InfluxDBHost": "influx.example.com",
        "InfluxDBApiToken": "token",
        "Org": "home",
        "Unused": true
    }"#;

    #[test]
    fn test_from_json() {
        let config = Config::from_json(COMPLETE).unwrap();

        assert_eq!("key", config.aemet_api_key);
        assert_eq!("1234X", config.station);
        assert_eq!("weather", config.bucket);
        assert_eq!("influx.example.com", config.influxdb_host);
        assert_eq!("token", config.influxdb_api_token);
        assert_eq!("home", config.org);
    }

    #[test]
    fn test_missing_field() {
        let err = Config::from_json(r#"{"AemetApiKey": "key", "AemetWeatherStationCode": "1234X"}"#).unwrap_err();

        assert!(matches!(err, ConfigError::Missing("Bucket")));
        assert_eq!("Bucket is required", err.to_string());
    }

    #[test]
    fn test_empty_field() {
        let json = COMPLETE.replace(r#""Org": "home""#, r#""Org": """#);
        let err = Config::from_json(&json).unwrap_err();

        assert!(matches!(err, ConfigError::Missing("Org")));
    }

    #[test]
    fn test_first_missing_reported() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("AemetApiKey")));
    }

    #[test]
    fn test_malformed() {
        let err = Config::from_json("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = Config::from_path("/nonexistent/aemet_exporter.json").unwrap_err();

        assert!(matches!(err, ConfigError::Io(_, _)));
        assert!(err.to_string().contains("/nonexistent/aemet_exporter.json"));
    }
}
