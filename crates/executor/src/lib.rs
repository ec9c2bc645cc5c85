//! DDL/DML primitives. Every operation validates before it mutates and
//! leaves the catalog and index catalog satisfying the engine invariants:
//! typed rows of the right arity, a unique non-NULL primary key per table,
//! indexes that mirror the row layout, and intact foreign keys.

mod ddl;
mod dml;
mod query;

pub use ddl::{create_index, create_table, drop_index, drop_table};
pub use dml::{delete, insert, update};
pub use query::{join_select, select};

use catalog::{Catalog, ForeignKey};
use common::{DbError, DbResult};
use types::Value;

/// Check that a foreign key value exists in the referenced column,
/// preferring the referenced table's index when one is present.
fn check_reference(
    catalog: &Catalog,
    indexes: &indexes::IndexCatalog,
    fk: &ForeignKey,
    value: &Value,
) -> DbResult<()> {
    let ref_def = catalog.table(&fk.ref_table)?;
    let ordinal = ref_def.column_index(&fk.ref_column).ok_or_else(|| {
        DbError::Schema(format!(
            "referenced column '{}' in table '{}' does not exist",
            fk.ref_column, fk.ref_table
        ))
    })?;
    let column_name = &ref_def.columns[ordinal].name;

    let found = match indexes.index(&ref_def.name, column_name) {
        Some(index) => index.contains(value),
        None => ref_def.rows.iter().any(|row| row.values[ordinal] == *value),
    };
    if found {
        Ok(())
    } else {
        Err(DbError::Constraint(format!(
            "foreign key violation: value {value} for column '{}' not found in '{}.{}'",
            fk.column, fk.ref_table, fk.ref_column
        )))
    }
}
