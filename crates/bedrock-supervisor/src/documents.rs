use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use bedrock_process::{AllowlistRecord, PermissionRecord};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{io::AsyncWriteExt, sync::Mutex};

use crate::error::{Result, SupervisorError};

/// A record stored in a per-world JSON array file, keyed by xuid.
pub trait DocumentRecord: Serialize + DeserializeOwned + Send + Sync {
    const FILE_NAME: &'static str;

    fn key(&self) -> &str;
}

impl DocumentRecord for PermissionRecord {
    const FILE_NAME: &'static str = "permissions.json";

    fn key(&self) -> &str {
        &self.xuid
    }
}

impl DocumentRecord for AllowlistRecord {
    const FILE_NAME: &'static str = "allowlist.json";

    fn key(&self) -> &str {
        &self.xuid
    }
}

/// Read-modify-write access to `permissions.json` / `allowlist.json`.
///
/// Edits to the same file are serialized; different files proceed in parallel.
#[derive(Debug, Default)]
pub struct DocumentStore {
    locks: std::sync::Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DocumentStore {
    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    pub async fn upsert<T: DocumentRecord>(&self, world: &str, dir: &Path, record: T) -> Result<()> {
        let path = dir.join(T::FILE_NAME);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        let mut records: Vec<T> = read_document(world, &path).await?;
        match records.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        write_document(&path, &records).await
    }

    /// Drops every record with `key`. An absent key, or an absent document,
    /// leaves the disk untouched.
    pub async fn remove<T: DocumentRecord>(&self, world: &str, dir: &Path, key: &str) -> Result<()> {
        let path = dir.join(T::FILE_NAME);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;

        let mut records: Vec<T> = match read_document(world, &path).await {
            Ok(records) => records,
            Err(SupervisorError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let before = records.len();
        records.retain(|r| r.key() != key);
        if records.len() == before {
            return Ok(());
        }
        write_document(&path, &records).await
    }

    pub async fn list<T: DocumentRecord>(&self, world: &str, dir: &Path) -> Result<Vec<T>> {
        let path = dir.join(T::FILE_NAME);
        let lock = self.lock_for(&path);
        let _guard = lock.lock().await;
        read_document(world, &path).await
    }
}

async fn read_document<T: DocumentRecord>(world: &str, path: &Path) -> Result<Vec<T>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(SupervisorError::NotFound(format!(
                "{} of world {world}",
                T::FILE_NAME
            )));
        }
        Err(source) => {
            return Err(SupervisorError::DocumentIo {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    // Bedrock writes `null` for a document it emptied itself.
    let records: Option<Vec<T>> =
        serde_json::from_slice(&raw).map_err(|e| SupervisorError::DocumentIo {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
    Ok(records.unwrap_or_default())
}

async fn write_document<T: DocumentRecord>(path: &Path, records: &[T]) -> Result<()> {
    let io_err = |source: std::io::Error| SupervisorError::DocumentIo {
        path: path.to_path_buf(),
        source,
    };
    let data = serde_json::to_vec_pretty(records).map_err(|e| io_err(e.into()))?;
    let tmp = path.with_extension("json.tmp");
    let mut f = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
    f.write_all(&data).await.map_err(io_err)?;
    f.flush().await.map_err(io_err)?;
    drop(f);
    tokio::fs::rename(&tmp, path).await.map_err(io_err)
}

/// Creates an empty document unless one already exists.
pub(crate) async fn ensure_document<T: DocumentRecord>(dir: &Path) -> Result<()> {
    let path = dir.join(T::FILE_NAME);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(());
    }
    write_document::<T>(&path, &[]).await
}
