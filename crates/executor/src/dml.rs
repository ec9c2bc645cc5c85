//! Data manipulation: INSERT, DELETE, UPDATE.

use crate::check_reference;
use ahash::RandomState;
use catalog::Catalog;
use common::{DbError, DbResult, Row, RowId};
use expr::{eval_bool, eval_value, EvalContext, Expr, ResolvedExpr};
use hashbrown::HashSet;
use indexes::IndexCatalog;
use types::Value;

type Set<T> = HashSet<T, RandomState>;

/// Insert one row. Validates arity, per-cell type (NULL is allowed off the
/// primary key, Int widens into Double), primary key uniqueness (index
/// fast path, linear fallback), and every foreign key before any mutation.
/// With an explicit column list, values are rearranged into schema order
/// and unmentioned columns become NULL.
pub fn insert(
    catalog: &mut Catalog,
    indexes: &mut IndexCatalog,
    table: &str,
    columns: Option<&[String]>,
    values: Vec<Value>,
) -> DbResult<()> {
    let (name, row) = {
        let def = catalog.table(table)?;

        let arranged = match columns {
            None => {
                if values.len() != def.columns.len() {
                    return Err(DbError::Value(format!(
                        "row length {} does not match the {} columns of table '{}'",
                        values.len(),
                        def.columns.len(),
                        def.name
                    )));
                }
                values
            }
            Some(cols) => {
                if cols.len() != values.len() {
                    return Err(DbError::Value(format!(
                        "{} columns listed but {} values given",
                        cols.len(),
                        values.len()
                    )));
                }
                let mut slots: Vec<Option<Value>> = vec![None; def.columns.len()];
                for (col, value) in cols.iter().zip(values) {
                    let ordinal = def.column_index(col).ok_or_else(|| {
                        DbError::Schema(format!(
                            "column '{col}' does not exist in table '{}'",
                            def.name
                        ))
                    })?;
                    if slots[ordinal].replace(value).is_some() {
                        return Err(DbError::Value(format!(
                            "column '{col}' specified more than once"
                        )));
                    }
                }
                slots
                    .into_iter()
                    .map(|slot| slot.unwrap_or(Value::Null))
                    .collect()
            }
        };

        let mut cells = Vec::with_capacity(arranged.len());
        for (ordinal, value) in arranged.into_iter().enumerate() {
            let column = &def.columns[ordinal];
            let type_name = value.type_name();
            let coerced = value.coerce(column.ty).ok_or_else(|| {
                DbError::Constraint(format!(
                    "column '{}' expects type {}, but got {type_name}",
                    column.name, column.ty
                ))
            })?;
            cells.push(coerced);
        }

        let pk_ordinal = def.pk_ordinal()?;
        let pk_value = &cells[pk_ordinal];
        if pk_value.is_null() {
            return Err(DbError::Constraint(format!(
                "primary key '{}' cannot be NULL",
                def.primary_key
            )));
        }
        let duplicate = match indexes.index(&def.name, &def.columns[pk_ordinal].name) {
            Some(index) => index.contains(pk_value),
            None => def.rows.iter().any(|row| row.values[pk_ordinal] == *pk_value),
        };
        if duplicate {
            return Err(DbError::Constraint(format!(
                "duplicate entry for primary key '{}' with value {pk_value}",
                def.primary_key
            )));
        }

        for fk in &def.foreign_keys {
            let ordinal = def.column_index(&fk.column).ok_or_else(|| {
                DbError::Schema(format!(
                    "foreign key column '{}' is not defined in table '{}'",
                    fk.column, def.name
                ))
            })?;
            let value = &cells[ordinal];
            if value.is_null() {
                continue;
            }
            check_reference(catalog, indexes, fk, value)?;
        }

        (def.name.clone(), Row::new(cells))
    };

    let def = catalog.table_mut(&name)?;
    def.rows.push(row);
    let row_id = def.rows.len() - 1;
    indexes.note_insert(catalog.table(&name)?, row_id)?;
    Ok(())
}

/// Delete every row matching the predicate (all rows when absent).
/// Compacts the data list and rebuilds the table's indexes; returns the
/// number of removed rows.
pub fn delete(
    catalog: &mut Catalog,
    indexes: &mut IndexCatalog,
    table: &str,
    predicate: Option<&Expr>,
) -> DbResult<u64> {
    let (name, kept, removed) = {
        let def = catalog.table(table)?;
        let schema = def.column_names();
        let compiled = compile_predicate(&schema, predicate)?;

        let mut kept = Vec::new();
        let mut removed = 0u64;
        for row in &def.rows {
            if matches(&compiled, row)? {
                removed += 1;
            } else {
                kept.push(row.clone());
            }
        }
        (def.name.clone(), kept, removed)
    };

    catalog.table_mut(&name)?.rows = kept;
    indexes.rebuild_table(catalog.table(&name)?);
    Ok(removed)
}

/// Update matching rows in two passes: first simulate the post-update
/// primary keys and reject collisions (against untouched rows and among
/// the updated set) and foreign key violations, then apply. Assignment
/// values are expressions evaluated against the original row. Rebuilds
/// the table's indexes; returns the number of modified rows.
pub fn update(
    catalog: &mut Catalog,
    indexes: &mut IndexCatalog,
    table: &str,
    assignments: &[(String, Expr)],
    predicate: Option<&Expr>,
) -> DbResult<u64> {
    let (name, rows, count) = {
        let def = catalog.table(table)?;
        let schema = def.column_names();
        let ctx = EvalContext::new(&schema);
        let compiled = compile_predicate(&schema, predicate)?;

        let mut resolved: Vec<(usize, ResolvedExpr)> = Vec::with_capacity(assignments.len());
        for (col, value) in assignments {
            let ordinal = def.column_index(col).ok_or_else(|| {
                DbError::Schema(format!(
                    "column '{col}' does not exist in table '{}'",
                    def.name
                ))
            })?;
            resolved.push((ordinal, ctx.resolve(value)?));
        }

        // pass one: compute the post-update image of every matching row
        let mut changed: Vec<(RowId, Row)> = Vec::new();
        for (row_id, row) in def.rows.iter().enumerate() {
            if !matches(&compiled, row)? {
                continue;
            }
            let mut new_row = row.clone();
            for (ordinal, value) in &resolved {
                let column = &def.columns[*ordinal];
                let evaluated = eval_value(value, row)?;
                let type_name = evaluated.type_name();
                new_row.values[*ordinal] = evaluated.coerce(column.ty).ok_or_else(|| {
                    DbError::Constraint(format!(
                        "column '{}' expects type {}, but got {type_name}",
                        column.name, column.ty
                    ))
                })?;
            }
            changed.push((row_id, new_row));
        }

        let pk_ordinal = def.pk_ordinal()?;
        let updated_ids: Set<RowId> = changed.iter().map(|(id, _)| *id).collect();
        let mut new_pks: Set<Value> = Set::default();
        for (_, new_row) in &changed {
            let pk = &new_row.values[pk_ordinal];
            if pk.is_null() {
                return Err(DbError::Constraint(format!(
                    "primary key '{}' cannot be NULL",
                    def.primary_key
                )));
            }
            if !new_pks.insert(pk.clone()) {
                return Err(DbError::Constraint(format!(
                    "duplicate entry for primary key '{}' with value {pk}",
                    def.primary_key
                )));
            }
        }
        for (row_id, row) in def.rows.iter().enumerate() {
            if updated_ids.contains(&row_id) {
                continue;
            }
            let pk = &row.values[pk_ordinal];
            if new_pks.contains(pk) {
                return Err(DbError::Constraint(format!(
                    "duplicate entry for primary key '{}' with value {pk}",
                    def.primary_key
                )));
            }
        }

        for (ordinal, _) in &resolved {
            let Some(fk) = def
                .foreign_keys
                .iter()
                .find(|fk| def.column_index(&fk.column) == Some(*ordinal))
            else {
                continue;
            };
            for (_, new_row) in &changed {
                let value = &new_row.values[*ordinal];
                if !value.is_null() {
                    check_reference(catalog, indexes, fk, value)?;
                }
            }
        }

        // pass two: apply
        let mut rows = def.rows.clone();
        let count = changed.len() as u64;
        for (row_id, new_row) in changed {
            rows[row_id] = new_row;
        }
        (def.name.clone(), rows, count)
    };

    catalog.table_mut(&name)?.rows = rows;
    indexes.rebuild_table(catalog.table(&name)?);
    Ok(count)
}

fn compile_predicate(schema: &[String], predicate: Option<&Expr>) -> DbResult<Option<ResolvedExpr>> {
    predicate
        .map(|p| EvalContext::new(schema).resolve(p))
        .transpose()
}

fn matches(compiled: &Option<ResolvedExpr>, row: &Row) -> DbResult<bool> {
    match compiled {
        Some(predicate) => eval_bool(predicate, row),
        None => Ok(true),
    }
}
