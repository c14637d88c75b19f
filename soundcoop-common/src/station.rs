use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::basename;

pub const DEFAULT_EXTENSION: &str = ".nc";
pub const DEFAULT_REGION: &str = "us-east-1";

// ── Station Config ──

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoreKind {
    #[serde(rename = "s3")]
    S3,
    #[serde(rename = "gcs")]
    Gcs,
    #[serde(rename = "directory")]
    Directory,
}

/// One recording station: where its data lives remotely and which files
/// are wanted locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationConfig {
    pub name: String,
    pub kind: StoreKind,
    /// Host (optionally `host:port`) for HTTP stores, base directory for
    /// directory stores.
    pub endpoint: String,
    pub bucket: String,
    /// Key prefix; `{station}` and `{year}` are substituted.
    #[serde(default)]
    pub prefix: String,
    pub year: i32,
    #[serde(default = "default_secure")]
    pub secure: bool,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub recursive: bool,
}

fn default_secure() -> bool {
    true
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl StationConfig {
    pub fn resolved_prefix(&self) -> String {
        self.prefix
            .replace("{station}", &self.name)
            .replace("{year}", &self.year.to_string())
    }

    /// Directory holding this station's downloads under `root`.
    pub fn local_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }

    pub fn qualifies(&self, name: &str) -> bool {
        qualifies(name, self.year, &self.extension)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("station name must not be empty");
        }
        if self.name.contains('/') || self.name.contains('\\') || self.name == "." || self.name == ".." {
            anyhow::bail!("station name must be a single path segment: {}", self.name);
        }
        if self.endpoint.is_empty() {
            anyhow::bail!("endpoint must not be empty for station {}", self.name);
        }
        if self.bucket.is_empty() {
            anyhow::bail!("bucket must not be empty for station {}", self.name);
        }
        if !self.extension.starts_with('.') {
            anyhow::bail!(
                "extension must start with '.' for station {}: {}",
                self.name,
                self.extension
            );
        }
        Ok(())
    }
}

/// Whether a remote file named `name` should be downloaded.
///
/// Hidden files never qualify. The extension match is case-sensitive and
/// the year only has to appear somewhere in the name.
pub fn qualifies(name: &str, year: i32, extension: &str) -> bool {
    !name.starts_with('.') && name.ends_with(extension) && name.contains(&year.to_string())
}

/// Local target for a remote key: `{root}/{station}/{basename(key)}`.
pub fn local_path(root: &Path, station: &str, key: &str) -> PathBuf {
    root.join(station).join(basename(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mars() -> StationConfig {
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
        }
    }

    #[test]
    fn test_qualifies() {
        assert!(qualifies("MARS_20210101.nc", 2021, ".nc"));
        assert!(!qualifies("MARS_20200101.nc", 2021, ".nc"));
        assert!(!qualifies(".hidden_2021.nc", 2021, ".nc"));
        assert!(!qualifies("notes_2021.txt", 2021, ".nc"));
        assert!(!qualifies("MARS_20210101.NC", 2021, ".nc"));
        assert!(!qualifies("MARS_20210101.nc.bak", 2021, ".nc"));
        // Year may appear anywhere in the name.
        assert!(qualifies("2021_summary.nc", 2021, ".nc"));
    }

    #[test]
    fn test_local_path_flattens_key() {
        let root = Path::new("./data");
        assert_eq!(
            local_path(root, "NRS11", "soundcoop/NRS11/deep/NRS11_20210101.nc"),
            PathBuf::from("./data/NRS11/NRS11_20210101.nc")
        );
        assert_eq!(
            local_path(root, "MARS", "MARS_20210101.nc"),
            PathBuf::from("./data/MARS/MARS_20210101.nc")
        );
    }

    #[test]
    fn test_resolved_prefix() {
        let mut station = mars();
        assert_eq!(station.resolved_prefix(), "2021/");
        station.name = "NRS11".to_string();
        station.prefix = "soundcoop/{station}/".to_string();
        assert_eq!(station.resolved_prefix(), "soundcoop/NRS11/");
        station.prefix = "plain/".to_string();
        assert_eq!(station.resolved_prefix(), "plain/");
    }

    #[test]
    fn test_validate() {
        mars().validate().unwrap();

        let mut bad = mars();
        bad.name = String::new();
        assert!(bad.validate().is_err());

        let mut bad = mars();
        bad.name = "../etc".to_string();
        assert!(bad.validate().is_err());

        let mut bad = mars();
        bad.bucket = String::new();
        assert!(bad.validate().is_err());

        let mut bad = mars();
        bad.extension = "nc".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_deserialize_defaults() {
        let toml_str = r#"
name = "NRS11"
kind = "gcs"
endpoint = "storage.googleapis.com"
bucket = "noaa-passive-bioacoustic"
prefix = "soundcoop/{station}/"
year = 2021
"#;
        let station: StationConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(station.kind, StoreKind::Gcs);
        assert!(station.secure);
        assert!(!station.recursive);
        assert_eq!(station.extension, ".nc");
        assert_eq!(station.region, DEFAULT_REGION);
    }
}
