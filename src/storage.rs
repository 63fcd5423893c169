#![cfg(feature = "web")]

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

const REGISTRY_FILE: &str = "registry.json";

/// The two datasets the chart is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Employee hierarchy sheet
    Org,
    /// Salary grade sheet
    Grades,
}

impl DatasetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Org => "org",
            DatasetKind::Grades => "grades",
        }
    }

    /// File shipped with the application, used until the first upload
    pub fn bundled_file_name(self) -> &'static str {
        match self {
            DatasetKind::Org => "organograma-dados.xlsx",
            DatasetKind::Grades => "grades-info.xlsx",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "org" => Some(DatasetKind::Org),
            "grades" => Some(DatasetKind::Grades),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Versioned pointer to the current copy of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetHandle {
    pub kind: DatasetKind,
    /// Increments on every upload of this kind
    pub version: u64,
    /// Name of the stored blob inside the data directory
    pub file_name: String,
    /// Name of the file as uploaded
    pub original_name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl DatasetHandle {
    /// Public URL of this version
    pub fn url(&self) -> String {
        format!("/data/{}?version={}", self.kind, self.version)
    }
}

/// Where fetched bytes came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Stored(DatasetHandle),
    Bundled(PathBuf),
}

impl DatasetSource {
    /// Version used for cache keys; bundled files are version 0
    pub fn version(&self) -> u64 {
        match self {
            DatasetSource::Stored(handle) => handle.version,
            DatasetSource::Bundled(_) => 0,
        }
    }

    /// File name to pick the spreadsheet parser from
    pub fn file_name(&self) -> String {
        match self {
            DatasetSource::Stored(handle) => handle.file_name.clone(),
            DatasetSource::Bundled(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }
}

/// A dataset read from the store
#[derive(Debug, Clone)]
pub struct Dataset {
    pub source: DatasetSource,
    pub bytes: Vec<u8>,
}

/// An upload waiting to be stored
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset registry is corrupt: {0}")]
    Registry(#[from] serde_json::Error),
    #[error("no {0} dataset has been uploaded and no bundled default exists")]
    NotFound(DatasetKind),
    #[error("version {requested} of the {kind} dataset is not available (current: {current:?})")]
    VersionUnavailable {
        kind: DatasetKind,
        requested: u64,
        current: Option<u64>,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

type Registry = BTreeMap<DatasetKind, DatasetHandle>;

/// File-backed dataset store with a pointer registry
///
/// Each upload is written as a new, uniquely named blob, then the registry
/// pointer for its kind is moved to it and the superseded blob is removed.
/// Reads hold the registry lock until the blob is read, so a blob is never
/// removed under a reader. The last completed upload wins.
pub struct DatasetStore {
    data_dir: PathBuf,
    bundled_dir: PathBuf,
    registry: RwLock<Registry>,
}

impl DatasetStore {
    /// Open (or create) a store rooted at `data_dir`
    ///
    /// # Arguments
    /// * `data_dir` - Directory for uploaded blobs and `registry.json`
    /// * `bundled_dir` - Directory with the default spreadsheets
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        bundled_dir: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(io_error(&data_dir))?;

        let registry_path = data_dir.join(REGISTRY_FILE);
        let registry: Registry = match tokio::fs::read(&registry_path).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Registry::new(),
            Err(e) => return Err(io_error(&registry_path)(e)),
        };

        Ok(Self {
            data_dir,
            bundled_dir: bundled_dir.into(),
            registry: RwLock::new(registry),
        })
    }

    /// Handle of the current upload of `kind`, if any
    pub async fn current(&self, kind: DatasetKind) -> Option<DatasetHandle> {
        self.registry.read().await.get(&kind).cloned()
    }

    /// Store both datasets and move both pointers together
    ///
    /// The blobs are written concurrently; the pointers only move once both
    /// writes have succeeded.
    pub async fn put_pair(
        &self,
        org: NewDataset,
        grades: NewDataset,
    ) -> Result<(DatasetHandle, DatasetHandle), StorageError> {
        let (org, grades) = tokio::try_join!(
            self.write_blob(DatasetKind::Org, org),
            self.write_blob(DatasetKind::Grades, grades),
        )?;
        let mut handles = self.commit(vec![org, grades]).await?;
        let grades = handles.remove(1);
        let org = handles.remove(0);
        Ok((org, grades))
    }

    /// Read the current copy of a dataset
    ///
    /// Without an upload the bundled default is returned. Asking for a
    /// specific version only succeeds when it is the current one.
    pub async fn fetch(&self, kind: DatasetKind, version: Option<u64>) -> Result<Dataset, StorageError> {
        let registry = self.registry.read().await;
        self.read_dataset(&registry, kind, version).await
    }

    /// Read both datasets from the same registry state
    pub async fn fetch_pair(&self) -> Result<(Dataset, Dataset), StorageError> {
        let registry = self.registry.read().await;
        tokio::try_join!(
            self.read_dataset(&registry, DatasetKind::Org, None),
            self.read_dataset(&registry, DatasetKind::Grades, None),
        )
    }

    async fn read_dataset(
        &self,
        registry: &Registry,
        kind: DatasetKind,
        version: Option<u64>,
    ) -> Result<Dataset, StorageError> {
        match (registry.get(&kind), version) {
            (Some(handle), Some(v)) if handle.version != v => Err(StorageError::VersionUnavailable {
                kind,
                requested: v,
                current: Some(handle.version),
            }),
            (Some(handle), _) => {
                let path = self.data_dir.join(&handle.file_name);
                let bytes = tokio::fs::read(&path).await.map_err(io_error(&path))?;
                Ok(Dataset {
                    source: DatasetSource::Stored(handle.clone()),
                    bytes,
                })
            }
            (None, Some(v)) if v != 0 => Err(StorageError::VersionUnavailable {
                kind,
                requested: v,
                current: None,
            }),
            (None, _) => {
                let path = self.bundled_dir.join(kind.bundled_file_name());
                match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(Dataset {
                        source: DatasetSource::Bundled(path),
                        bytes,
                    }),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(StorageError::NotFound(kind))
                    }
                    Err(e) => Err(io_error(&path)(e)),
                }
            }
        }
    }

    /// Current versions of both datasets (0 when not uploaded)
    pub async fn versions(&self) -> (u64, u64) {
        let registry = self.registry.read().await;
        let version = |kind| registry.get(&kind).map_or(0, |h: &DatasetHandle| h.version);
        (version(DatasetKind::Org), version(DatasetKind::Grades))
    }

    async fn write_blob(&self, kind: DatasetKind, upload: NewDataset) -> Result<DatasetHandle, StorageError> {
        let extension = Path::new(&upload.original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "xlsx".to_string());
        let file_name = format!("{}-{}.{}", kind, Uuid::new_v4(), extension);
        let path = self.data_dir.join(&file_name);

        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(io_error(&path))?;

        // The version is assigned in `commit`
        Ok(DatasetHandle {
            kind,
            version: 0,
            file_name,
            original_name: upload.original_name,
            size: upload.bytes.len() as u64,
            uploaded_at: Utc::now(),
        })
    }

    async fn commit(&self, staged: Vec<DatasetHandle>) -> Result<Vec<DatasetHandle>, StorageError> {
        let mut registry = self.registry.write().await;

        let mut next = registry.clone();
        let mut committed = Vec::with_capacity(staged.len());
        for mut handle in staged {
            handle.version = next.get(&handle.kind).map_or(1, |previous| previous.version + 1);
            next.insert(handle.kind, handle.clone());
            committed.push(handle);
        }

        let registry_path = self.data_dir.join(REGISTRY_FILE);
        let tmp_path = self.data_dir.join(format!("{}.tmp", REGISTRY_FILE));
        let json = serde_json::to_vec_pretty(&next)?;
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(io_error(&tmp_path))?;
        tokio::fs::rename(&tmp_path, &registry_path)
            .await
            .map_err(io_error(&registry_path))?;

        let superseded: Vec<DatasetHandle> = committed
            .iter()
            .filter_map(|h| registry.get(&h.kind).cloned())
            .filter(|old| committed.iter().all(|h| h.file_name != old.file_name))
            .collect();
        *registry = next;
        drop(registry);

        for handle in &committed {
            info!(
                "{} dataset now at version {} ({}, {} bytes)",
                handle.kind, handle.version, handle.original_name, handle.size
            );
        }
        for old in superseded {
            let path = self.data_dir.join(&old.file_name);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("could not remove superseded dataset {}: {}", path.display(), e);
            }
        }

        Ok(committed)
    }
}
