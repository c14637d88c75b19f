use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use soundcoop_common::station::{DEFAULT_EXTENSION, StationConfig, StoreKind};

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Connect and per-read idle limit for HTTP stores. A download that keeps
    /// receiving bytes is never cut off.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub stations: Vec<StationConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DATA_DIR)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl FetchConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let config: FetchConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// The MARS (MBARI, S3) and NRS11 (NOAA, GCS) stations for 2021.
    pub fn builtin() -> Self {
        Self {
            data_dir: default_data_dir(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            stations: vec![
                StationConfig {
                    name: "MARS".to_string(),
                    kind: StoreKind::S3,
                    endpoint: "s3.us-west-2.amazonaws.com".to_string(),
                    bucket: "pacific-sound-spectra".to_string(),
                    prefix: "{year}/".to_string(),
                    year: 2021,
                    secure: false,
                    region: "us-west-2".to_string(),
                    extension: DEFAULT_EXTENSION.to_string(),
                    recursive: false,
                },
                StationConfig {
                    name: "NRS11".to_string(),
                    kind: StoreKind::Gcs,
                    endpoint: "storage.googleapis.com".to_string(),
                    bucket: "noaa-passive-bioacoustic".to_string(),
                    prefix: "soundcoop/{station}/".to_string(),
                    year: 2021,
                    secure: true,
                    region: "us-east-1".to_string(),
                    extension: DEFAULT_EXTENSION.to_string(),
                    recursive: false,
                },
            ],
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stations.is_empty() {
            anyhow::bail!("stations must contain at least one station");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        let mut seen = HashSet::new();
        for station in &self.stations {
            station.validate()?;
            if !seen.insert(station.name.as_str()) {
                anyhow::bail!("duplicate station name: {}", station.name);
            }
        }
        Ok(())
    }

    /// Keep only the named stations, in configuration order.
    pub fn select(&mut self, names: &[String]) -> anyhow::Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        for name in names {
            if !self.stations.iter().any(|s| &s.name == name) {
                anyhow::bail!("unknown station: {}", name);
            }
        }
        self.stations.retain(|s| names.contains(&s.name));
        Ok(())
    }

    pub fn set_year(&mut self, year: i32) {
        for station in &mut self.stations {
            station.year = year;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_STATIONS: &str = r#"
data_dir = "/srv/soundcoop"

[[stations]]
name = "MARS"
kind = "s3"
endpoint = "s3.us-west-2.amazonaws.com"
bucket = "pacific-sound-spectra"
prefix = "{year}/"
secure = false
region = "us-west-2"
year = 2021

[[stations]]
name = "NRS11"
kind = "gcs"
endpoint = "storage.googleapis.com"
bucket = "noaa-passive-bioacoustic"
prefix = "soundcoop/{station}/"
year = 2021
"#;

    #[test]
    fn test_parse_valid_config() {
        let config: FetchConfig = toml::from_str(TWO_STATIONS).unwrap();
        config.validate().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/soundcoop"));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.stations.len(), 2);
        assert!(!config.stations[0].secure);
        assert_eq!(config.stations[1].resolved_prefix(), "soundcoop/NRS11/");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.toml");
        std::fs::write(&path, TWO_STATIONS).unwrap();
        let config = FetchConfig::load(&path).unwrap();
        assert_eq!(config.stations[0].name, "MARS");

        assert!(FetchConfig::load(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_empty_stations_rejected() {
        let config: FetchConfig = toml::from_str("stations = []").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_station_rejected() {
        let mut config = FetchConfig::builtin();
        let dup = config.stations[0].clone();
        config.stations.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builtin_matches_reference_stations() {
        let config = FetchConfig::builtin();
        config.validate().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        let mars = &config.stations[0];
        assert_eq!(mars.resolved_prefix(), "2021/");
        assert_eq!(mars.kind, StoreKind::S3);
        let nrs11 = &config.stations[1];
        assert_eq!(nrs11.resolved_prefix(), "soundcoop/NRS11/");
        assert_eq!(nrs11.kind, StoreKind::Gcs);
    }

    #[test]
    fn test_select_and_year_override() {
        let mut config = FetchConfig::builtin();
        assert!(config.select(&["NOPE".to_string()]).is_err());

        config.select(&["NRS11".to_string()]).unwrap();
        assert_eq!(config.stations.len(), 1);

        config.set_year(2022);
        assert_eq!(config.stations[0].year, 2022);
    }
}
