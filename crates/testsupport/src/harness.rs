//! Disposable engine over a temp directory.

use common::{Config, DbResult, RecordBatch};
use database::{Engine, QueryResult};
use std::path::PathBuf;
use tempfile::TempDir;
use types::Value;

/// An engine whose snapshots live in a temp directory that is removed on
/// drop. `reopen` rebuilds the engine from the same files to exercise the
/// persistence path.
pub struct TestDb {
    pub engine: Engine,
    config: Config,
    _dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = Config::builder()
            .data_dir(dir.path().join("data"))
            .build();
        let engine = Engine::open(&config).expect("open engine");
        Self {
            engine,
            config,
            _dir: dir,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.config.db_path()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self, sql: &str) -> DbResult<QueryResult> {
        self.engine.execute(sql)
    }

    /// Execute and expect success.
    pub fn ok(&self, sql: &str) -> QueryResult {
        self.run(sql)
            .unwrap_or_else(|err| panic!("query failed: {err}\n  sql: {sql}"))
    }

    /// Execute a SELECT and return its batch.
    pub fn rows(&self, sql: &str) -> RecordBatch {
        match self.ok(sql) {
            QueryResult::Rows(batch) => batch,
            other => panic!("expected rows, got {other:?}"),
        }
    }

    /// Execute a DELETE/UPDATE and return the affected count.
    pub fn count(&self, sql: &str) -> u64 {
        match self.ok(sql) {
            QueryResult::Count(count) => count,
            other => panic!("expected a count, got {other:?}"),
        }
    }

    /// Drop the engine and reopen it from the same snapshot files.
    pub fn reopen(&mut self) {
        self.engine = Engine::open(&self.config).expect("reopen engine");
    }
}

impl Default for TestDb {
    fn default() -> Self {
        Self::new()
    }
}

/// Look up a cell by column label within a batch row.
pub fn cell<'a>(batch: &'a RecordBatch, row: usize, column: &str) -> &'a Value {
    let ordinal = batch
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(column))
        .unwrap_or_else(|| panic!("no column '{column}' in {:?}", batch.columns));
    &batch.rows[row].values[ordinal]
}

/// Flatten a batch into plain value matrices for compact assertions.
pub fn values(batch: &RecordBatch) -> Vec<Vec<Value>> {
    batch.rows.iter().map(|row| row.values.clone()).collect()
}
