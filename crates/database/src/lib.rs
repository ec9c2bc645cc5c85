//! The engine façade: one exclusive lock around the in-memory catalog and
//! index catalog, reload-before / save-after snapshot discipline, and
//! statement dispatch through the parser and planner.

use catalog::Catalog;
use common::{Config, DbError, DbResult, RecordBatch};
use indexes::IndexCatalog;
use planner::Plan;
use std::sync::Mutex;
use storage::SnapshotStore;

/// Result of executing a statement batch.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    /// SELECT: an ordered list of records.
    Rows(RecordBatch),
    /// DELETE/UPDATE: the affected-row count.
    Count(u64),
    /// DDL and INSERT produce no result.
    None,
}

struct EngineState {
    catalog: Catalog,
    indexes: IndexCatalog,
}

/// Single-process engine over a pair of snapshot files.
///
/// Every executor entry point is serialized: `execute` holds the lock for
/// the whole batch, reloads both snapshots at the start, and saves both
/// after each successfully applied mutating statement. A failing statement
/// returns before its save, so disk is never touched by a failed
/// statement; the next call reloads the last durable state.
pub struct Engine {
    store: SnapshotStore,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Open the snapshot store and load both snapshots into memory.
    pub fn open(config: &Config) -> DbResult<Self> {
        let store = SnapshotStore::open(config)?;
        let catalog = store.load_db()?;
        let indexes = store.load_index()?;
        Ok(Self {
            store,
            state: Mutex::new(EngineState { catalog, indexes }),
        })
    }

    /// Execute a `;`-separated batch in source order and return the last
    /// statement's result.
    pub fn execute(&self, sql: &str) -> DbResult<QueryResult> {
        let statements = parser::parse_statements(sql)?;
        if statements.is_empty() {
            return Err(DbError::Parse("empty query".into()));
        }
        tracing::debug!(statements = statements.len(), "executing batch");

        // Validation precedes every mutation, so state behind a poisoned
        // lock is still consistent.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.catalog = self.store.load_db()?;
        state.indexes = self.store.load_index()?;

        let mut last = QueryResult::None;
        for statement in statements {
            let plan = planner::plan(statement)?;
            let mutation = plan.is_mutation();
            last = apply(&mut state, plan)?;
            if mutation {
                self.store.save_db(&state.catalog)?;
                self.store.save_index(&state.indexes)?;
            }
        }
        Ok(last)
    }
}

fn apply(state: &mut EngineState, plan: Plan) -> DbResult<QueryResult> {
    match plan {
        Plan::CreateTable {
            name,
            columns,
            primary_key,
            foreign_keys,
        } => {
            executor::create_table(
                &mut state.catalog,
                &mut state.indexes,
                &name,
                columns,
                primary_key,
                foreign_keys,
            )?;
            Ok(QueryResult::None)
        }
        Plan::DropTable { name } => {
            executor::drop_table(&mut state.catalog, &mut state.indexes, &name)?;
            Ok(QueryResult::None)
        }
        Plan::CreateIndex {
            table,
            column,
            name,
        } => {
            executor::create_index(&state.catalog, &mut state.indexes, &table, &column, name)?;
            Ok(QueryResult::None)
        }
        Plan::DropIndex { name } => {
            executor::drop_index(&mut state.indexes, &name)?;
            Ok(QueryResult::None)
        }
        Plan::Insert {
            table,
            columns,
            values,
        } => {
            executor::insert(
                &mut state.catalog,
                &mut state.indexes,
                &table,
                columns.as_deref(),
                values,
            )?;
            Ok(QueryResult::None)
        }
        Plan::Delete { table, predicate } => {
            let removed = executor::delete(
                &mut state.catalog,
                &mut state.indexes,
                &table,
                predicate.as_ref(),
            )?;
            Ok(QueryResult::Count(removed))
        }
        Plan::Update {
            table,
            assignments,
            predicate,
        } => {
            let modified = executor::update(
                &mut state.catalog,
                &mut state.indexes,
                &table,
                &assignments,
                predicate.as_ref(),
            )?;
            Ok(QueryResult::Count(modified))
        }
        Plan::Select(select) => Ok(QueryResult::Rows(executor::select(
            &state.catalog,
            &state.indexes,
            &select,
        )?)),
        Plan::JoinSelect(join) => Ok(QueryResult::Rows(executor::join_select(
            &state.catalog,
            &state.indexes,
            &join,
        )?)),
    }
}
