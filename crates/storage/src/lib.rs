//! Snapshot persistence: the whole catalog and the whole index map as two
//! single files, each replaced atomically via a sibling temp file and
//! rename. A failed write leaves the previous snapshot intact; a missing
//! file loads as the empty state.

use std::fs;
use std::path::{Path, PathBuf};

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use catalog::Catalog;
use common::{DbError, DbResult};
use indexes::IndexCatalog;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// Owns the two snapshot paths and the load/save contract.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    db_path: PathBuf,
    index_path: PathBuf,
}

impl SnapshotStore {
    /// Create a store for the configured paths, creating parent
    /// directories if missing.
    pub fn open(config: &common::Config) -> DbResult<Self> {
        Self::at(config.db_path(), config.index_path())
    }

    pub fn at(db_path: PathBuf, index_path: PathBuf) -> DbResult<Self> {
        for path in [&db_path, &index_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(Self {
            db_path,
            index_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Read the database snapshot; a missing file is a fresh empty catalog.
    pub fn load_db(&self) -> DbResult<Catalog> {
        if !self.db_path.exists() {
            return Ok(Catalog::new());
        }
        let bytes = fs::read(&self.db_path)?;
        let (mut catalog, _): (Catalog, usize) = decode_from_slice(&bytes, bincode_config())
            .map_err(|e| DbError::Storage(format!("invalid database snapshot: {e}")))?;
        catalog.rebuild_lookups()?;
        Ok(catalog)
    }

    /// Persist the catalog atomically.
    pub fn save_db(&self, catalog: &Catalog) -> DbResult<()> {
        let bytes = encode_to_vec(catalog, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize database snapshot failed: {e}")))?;
        atomic_write(&self.db_path, &bytes)
    }

    /// Read the index snapshot; a missing file is an empty index catalog.
    pub fn load_index(&self) -> DbResult<IndexCatalog> {
        if !self.index_path.exists() {
            return Ok(IndexCatalog::new());
        }
        let bytes = fs::read(&self.index_path)?;
        let (indexes, _): (IndexCatalog, usize) = decode_from_slice(&bytes, bincode_config())
            .map_err(|e| DbError::Storage(format!("invalid index snapshot: {e}")))?;
        Ok(indexes)
    }

    /// Persist the index catalog atomically.
    pub fn save_index(&self, indexes: &IndexCatalog) -> DbResult<()> {
        let bytes = encode_to_vec(indexes, bincode_config())
            .map_err(|e| DbError::Storage(format!("serialize index snapshot failed: {e}")))?;
        atomic_write(&self.index_path, &bytes)
    }
}

/// Write to a sibling temp file, then rename onto the target. Readers never
/// observe a torn file; a failure before the rename leaves the old file.
fn atomic_write(path: &Path, bytes: &[u8]) -> DbResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
