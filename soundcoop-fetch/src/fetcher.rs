use std::path::{Path, PathBuf};

use soundcoop_common::station::{DEFAULT_EXTENSION, StationConfig, local_path, qualifies};
use soundcoop_common::store::{ObjectStore, basename};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const PART_SUFFIX: &str = ".part";

/// Result of fetching one station.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// Entries returned by the listing, qualified or not.
    pub listed: u64,
    pub downloaded: u64,
    /// Qualified files already present locally.
    pub skipped: u64,
    pub ignored: u64,
    pub bytes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to create station directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to list {bucket}/{prefix}: {cause:#}")]
    List {
        bucket: String,
        prefix: String,
        cause: anyhow::Error,
    },
    #[error("failed to open {bucket}/{key}: {cause:#}")]
    Open {
        bucket: String,
        key: String,
        cause: anyhow::Error,
    },
    #[error("download of {key} interrupted: {cause:#}")]
    Stream { key: String, cause: anyhow::Error },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to move download into place at {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download target is a directory: {0}")]
    TargetIsDirectory(PathBuf),
}

/// Which listing entries to download.
#[derive(Debug, Clone)]
pub struct FileFilter {
    pub year: i32,
    pub extension: String,
    pub recursive: bool,
}

impl FileFilter {
    pub fn for_year(year: i32) -> Self {
        Self {
            year,
            extension: DEFAULT_EXTENSION.to_string(),
            recursive: false,
        }
    }
}

/// Download every `.nc` file for `year` under `bucket`/`prefix` into
/// `{local_root}/{station_name}`, skipping files already on disk.
pub async fn fetch(
    station_name: &str,
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    local_root: &Path,
    year: i32,
) -> Result<FetchSummary, FetchError> {
    fetch_filtered(
        station_name,
        store,
        bucket,
        prefix,
        local_root,
        &FileFilter::for_year(year),
    )
    .await
}

/// [`fetch`] driven by a station configuration record.
pub async fn fetch_station(
    station: &StationConfig,
    store: &dyn ObjectStore,
    local_root: &Path,
) -> Result<FetchSummary, FetchError> {
    let filter = FileFilter {
        year: station.year,
        extension: station.extension.clone(),
        recursive: station.recursive,
    };
    fetch_filtered(
        &station.name,
        store,
        &station.bucket,
        &station.resolved_prefix(),
        local_root,
        &filter,
    )
    .await
}

pub async fn fetch_filtered(
    station_name: &str,
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    local_root: &Path,
    filter: &FileFilter,
) -> Result<FetchSummary, FetchError> {
    let station_dir = local_root.join(station_name);
    tokio::fs::create_dir_all(&station_dir)
        .await
        .map_err(|source| FetchError::CreateDir {
            path: station_dir.clone(),
            source,
        })?;
    sweep_partials(station_name, &station_dir).await;

    let objects = store
        .list(bucket, prefix, filter.recursive)
        .await
        .map_err(|cause| FetchError::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            cause,
        })?;
    let total = objects.len();
    info!(station = station_name, store = store.name(), bucket, prefix, total, "Listed remote objects");

    let mut summary = FetchSummary {
        listed: total as u64,
        ..Default::default()
    };

    for (i, object) in objects.iter().enumerate() {
        let name = basename(&object.key);

        if object.is_prefix() || !qualifies(name, filter.year, &filter.extension) {
            info!(station = station_name, name, "Ignored");
            summary.ignored += 1;
            continue;
        }

        let target = local_path(local_root, station_name, &object.key);
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => return Err(FetchError::TargetIsDirectory(target)),
            Ok(_) => {
                info!(station = station_name, path = %target.display(), "Already downloaded");
                summary.skipped += 1;
                continue;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(FetchError::Write { path: target, source }),
        }

        info!(
            station = station_name,
            path = %target.display(),
            "Download {} of {}",
            i + 1,
            total
        );
        let bytes = download(store, bucket, &object.key, &station_dir, &target).await?;
        debug!(station = station_name, key = %object.key, bytes, "Download complete");
        summary.downloaded += 1;
        summary.bytes += bytes;
    }

    Ok(summary)
}

/// Remove `.part` files left behind by a run that was killed mid-download.
async fn sweep_partials(station_name: &str, dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(station = station_name, error = %e, "Failed to scan for stale partial downloads");
            return;
        }
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !(name.starts_with('.') && name.ends_with(PART_SUFFIX)) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => debug!(station = station_name, name = %name, "Removed stale partial download"),
            Err(e) => warn!(station = station_name, name = %name, error = %e, "Failed to remove stale partial download"),
        }
    }
}

/// Stream one object into `target` via a temporary file in `dir`.
///
/// The temporary file is removed on every failure path, so `target` only
/// ever appears once the whole object has been written and synced.
async fn download(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    dir: &Path,
    target: &Path,
) -> Result<u64, FetchError> {
    let write_err = |source: std::io::Error| FetchError::Write {
        path: target.to_path_buf(),
        source,
    };

    let mut body = store.open(bucket, key).await.map_err(|cause| FetchError::Open {
        bucket: bucket.to_string(),
        key: key.to_string(),
        cause,
    })?;

    let tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", basename(key)))
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)
        .map_err(write_err)?;

    let mut file = tokio::fs::File::from_std(tmp.reopen().map_err(write_err)?);
    let mut written = 0u64;
    loop {
        let chunk = body.next_chunk().await.map_err(|cause| FetchError::Stream {
            key: key.to_string(),
            cause,
        })?;
        let Some(chunk) = chunk else { break };
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_err)?;
    file.sync_all().await.map_err(write_err)?;
    drop(file);

    tmp.persist_noclobber(target).map_err(|e| FetchError::Persist {
        path: target.to_path_buf(),
        source: e.error,
    })?;

    Ok(written)
}
