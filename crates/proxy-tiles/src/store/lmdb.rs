//! Durable tile store on LMDB via `heed`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};

use super::TileStore;
use crate::types::{Result, TileError};

/// Default memory map size. LMDB only reserves address space, not disk.
pub const DEFAULT_MAP_SIZE_MB: usize = 4096;

/// Tiles in a single unnamed LMDB database, `key -> jpeg bytes`.
///
/// Every transaction runs on the blocking pool; the environment and
/// database handles are cheap to clone into those tasks.
#[derive(Clone)]
pub struct LmdbTileStore {
    env: Env,
    db: Database<Str, Bytes>,
    path: PathBuf,
}

impl LmdbTileStore {
    /// Open (or create) a store in `path` with the default map size
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE_MB)
    }

    pub fn open_with_map_size(path: impl AsRef<Path>, max_size_mb: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(&path)
        }
        .map_err(|e| TileError::CacheRead(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut wtxn = env.write_txn().map_err(write_err)?;
        let db: Database<Str, Bytes> = env.create_database(&mut wtxn, None).map_err(write_err)?;
        wtxn.commit().map_err(write_err)?;

        log::debug!("Opened tile store at {}", path.display());

        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_err(e: heed::Error) -> TileError {
    TileError::CacheRead(e.to_string())
}

fn write_err(e: heed::Error) -> TileError {
    TileError::CacheWrite(e.to_string())
}

#[async_trait]
impl TileStore for LmdbTileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let (env, db) = (self.env.clone(), self.db);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>> {
            let rtxn = env.read_txn().map_err(read_err)?;
            let value = db.get(&rtxn, &key).map_err(read_err)?;
            Ok(value.map(<[u8]>::to_vec))
        })
        .await?
    }

    async fn get_batch(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let (env, db) = (self.env.clone(), self.db);
        let keys = keys.to_vec();

        tokio::task::spawn_blocking(move || -> Result<HashMap<String, Vec<u8>>> {
            let rtxn = env.read_txn().map_err(read_err)?;
            let mut found = HashMap::new();
            for key in keys {
                if let Some(value) = db.get(&rtxn, &key).map_err(read_err)? {
                    found.insert(key, value.to_vec());
                }
            }
            Ok(found)
        })
        .await?
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        let (env, db) = (self.env.clone(), self.db);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut wtxn = env.write_txn().map_err(write_err)?;
            db.put(&mut wtxn, &key, &blob).map_err(write_err)?;
            wtxn.commit().map_err(write_err)
        })
        .await?
    }

    async fn clear(&self) -> Result<()> {
        let (env, db) = (self.env.clone(), self.db);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut wtxn = env.write_txn().map_err(write_err)?;
            db.clear(&mut wtxn).map_err(write_err)?;
            wtxn.commit().map_err(write_err)
        })
        .await?
    }

    async fn estimate_size_bytes(&self) -> Result<u64> {
        let (env, db) = (self.env.clone(), self.db);

        tokio::task::spawn_blocking(move || -> Result<u64> {
            let rtxn = env.read_txn().map_err(read_err)?;
            let mut total = 0u64;
            for entry in db.iter(&rtxn).map_err(read_err)? {
                let (_, value) = entry.map_err(read_err)?;
                total += value.len() as u64;
            }
            Ok(total)
        })
        .await?
    }
}
