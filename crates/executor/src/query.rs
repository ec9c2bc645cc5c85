//! Read path: SELECT and the index-aware equi-join. Both feed one shared
//! pipeline: filter, project or group/aggregate, HAVING, ORDER BY.

use ahash::RandomState;
use catalog::{Catalog, TableDef};
use common::{DbError, DbResult, RecordBatch, Row, RowId};
use expr::{eval_bool, BinaryOp, EvalContext, Expr};
use hashbrown::HashMap;
use indexes::IndexCatalog;
use planner::{AggFunc, AggTarget, Aggregate, JoinPlan, SelectPlan, SortDirection, SortKey};
use std::cmp::Ordering;
use types::Value;

type Map<K, V> = HashMap<K, V, RandomState>;

#[derive(Clone, Copy)]
enum Strictness {
    /// Unknown projected columns fail (single-table SELECT).
    Strict,
    /// Unknown projected columns are skipped silently (join results).
    Lenient,
}

/// Single-table SELECT.
pub fn select(catalog: &Catalog, indexes: &IndexCatalog, plan: &SelectPlan) -> DbResult<RecordBatch> {
    let def = catalog.table(&plan.table)?;
    let schema = def.column_names();

    let source = match index_equality_rows(def, indexes, plan.predicate.as_ref()) {
        Some(rows) => rows,
        None => def.rows.clone(),
    };
    let filtered = filter_rows(&schema, source, plan.predicate.as_ref())?;

    let batch = if plan.aggregates.is_empty() && plan.group_by.is_empty() {
        let batch = RecordBatch {
            columns: schema,
            rows: filtered,
        };
        match &plan.columns {
            Some(columns) => project(batch, columns, Strictness::Strict)?,
            None => batch,
        }
    } else {
        aggregate_batch(schema, filtered, &plan.group_by, &plan.aggregates)?
    };

    finish(batch, plan.having.as_ref(), &plan.order_by)
}

/// Equi-join SELECT. The smaller table drives the loop; the larger side is
/// probed through its index when one exists on the join column, otherwise
/// through a transient hash map. Joined records are labeled
/// `alias.column`, outer columns first.
pub fn join_select(
    catalog: &Catalog,
    indexes: &IndexCatalog,
    plan: &JoinPlan,
) -> DbResult<RecordBatch> {
    let left = catalog.table(&plan.left)?;
    let right = catalog.table(&plan.right)?;
    let left_ordinal = join_ordinal(left, &plan.left_col)?;
    let right_ordinal = join_ordinal(right, &plan.right_col)?;

    let self_join = left.name == right.name;
    let (left_alias, right_alias) = if self_join
        && plan.left_alias.is_none()
        && plan.right_alias.is_none()
    {
        (format!("{}_L", left.name), format!("{}_R", right.name))
    } else {
        (
            plan.left_alias.clone().unwrap_or_else(|| left.name.clone()),
            plan.right_alias.clone().unwrap_or_else(|| right.name.clone()),
        )
    };

    struct Side<'a> {
        def: &'a TableDef,
        ordinal: usize,
        alias: String,
    }
    let (outer, inner) = if left.rows.len() <= right.rows.len() {
        (
            Side { def: left, ordinal: left_ordinal, alias: left_alias },
            Side { def: right, ordinal: right_ordinal, alias: right_alias },
        )
    } else {
        (
            Side { def: right, ordinal: right_ordinal, alias: right_alias },
            Side { def: left, ordinal: left_ordinal, alias: left_alias },
        )
    };

    let inner_column = &inner.def.columns[inner.ordinal].name;
    let probe: Map<Value, Vec<RowId>> = match indexes.index(&inner.def.name, inner_column) {
        Some(index) => index
            .iter()
            .map(|(value, ids)| (value.clone(), ids.to_vec()))
            .collect(),
        None => {
            let mut map: Map<Value, Vec<RowId>> = Map::default();
            for (row_id, row) in inner.def.rows.iter().enumerate() {
                map.entry(row.values[inner.ordinal].clone())
                    .or_default()
                    .push(row_id);
            }
            map
        }
    };

    let mut columns: Vec<String> = outer
        .def
        .columns
        .iter()
        .map(|c| format!("{}.{}", outer.alias, c.name))
        .collect();
    columns.extend(
        inner
            .def
            .columns
            .iter()
            .map(|c| format!("{}.{}", inner.alias, c.name)),
    );

    let mut rows = Vec::new();
    for outer_row in &outer.def.rows {
        let Some(ids) = probe.get(&outer_row.values[outer.ordinal]) else {
            continue;
        };
        for &id in ids {
            let mut values = outer_row.values.clone();
            values.extend(inner.def.rows[id].values.iter().cloned());
            rows.push(Row::new(values));
        }
    }

    let filtered = filter_rows(&columns, rows, plan.predicate.as_ref())?;
    let batch = if plan.aggregates.is_empty() && plan.group_by.is_empty() {
        let batch = RecordBatch {
            columns,
            rows: filtered,
        };
        match &plan.columns {
            Some(cols) => project(batch, cols, Strictness::Lenient)?,
            None => batch,
        }
    } else {
        aggregate_batch(columns, filtered, &plan.group_by, &plan.aggregates)?
    };

    finish(batch, plan.having.as_ref(), &plan.order_by)
}

fn finish(
    mut batch: RecordBatch,
    having: Option<&Expr>,
    order_by: &[SortKey],
) -> DbResult<RecordBatch> {
    if having.is_some() {
        batch.rows = filter_rows(&batch.columns, std::mem::take(&mut batch.rows), having)?;
    }
    if !order_by.is_empty() {
        sort_batch(&mut batch, order_by)?;
    }
    Ok(batch)
}

fn join_ordinal(def: &TableDef, column: &str) -> DbResult<usize> {
    def.column_index(column).ok_or_else(|| {
        DbError::Schema(format!(
            "join column '{column}' not found in table '{}'",
            def.name
        ))
    })
}

/// Fast path for a single `col = literal` predicate over an indexed
/// column: materialize only the matching rows. The full predicate still
/// runs afterwards, so this never changes semantics.
fn index_equality_rows(
    def: &TableDef,
    indexes: &IndexCatalog,
    predicate: Option<&Expr>,
) -> Option<Vec<Row>> {
    let Expr::Binary { left, op: BinaryOp::Eq, right } = predicate? else {
        return None;
    };
    let (Expr::Column { name, .. }, Expr::Literal(value)) = (left.as_ref(), right.as_ref())
    else {
        return None;
    };
    let ordinal = def.column_index(name)?;
    let column = &def.columns[ordinal];
    let key = value.clone().coerce(column.ty)?;
    let index = indexes.index(&def.name, &column.name)?;
    let rows = index
        .rows_for(&key)
        .map(|ids| ids.iter().map(|&id| def.rows[id].clone()).collect())
        .unwrap_or_default();
    Some(rows)
}

fn filter_rows(
    schema: &[String],
    rows: Vec<Row>,
    predicate: Option<&Expr>,
) -> DbResult<Vec<Row>> {
    let Some(predicate) = predicate else {
        return Ok(rows);
    };
    let compiled = EvalContext::new(schema).resolve(predicate)?;
    let mut filtered = Vec::with_capacity(rows.len());
    for row in rows {
        if eval_bool(&compiled, &row)? {
            filtered.push(row);
        }
    }
    Ok(filtered)
}

fn project(batch: RecordBatch, columns: &[String], strictness: Strictness) -> DbResult<RecordBatch> {
    let ctx = EvalContext::new(&batch.columns);
    let mut selected: Vec<(usize, String)> = Vec::with_capacity(columns.len());
    for label in columns {
        match find_label(&ctx, label) {
            Ok(ordinal) => selected.push((ordinal, label.clone())),
            Err(err) => match strictness {
                Strictness::Strict => return Err(err),
                Strictness::Lenient => continue,
            },
        }
    }
    let rows = batch
        .rows
        .iter()
        .map(|row| {
            Row::new(
                selected
                    .iter()
                    .map(|(ordinal, _)| row.values[*ordinal].clone())
                    .collect(),
            )
        })
        .collect();
    Ok(RecordBatch {
        columns: selected.into_iter().map(|(_, label)| label).collect(),
        rows,
    })
}

/// Resolve a flat label: qualified labels match exactly with a bare-name
/// fallback, bare labels match simple names or any `.name` suffix.
fn find_label(ctx: &EvalContext, label: &str) -> DbResult<usize> {
    match label.split_once('.') {
        Some((table, column)) => ctx
            .find_column(Some(table), column)
            .or_else(|_| ctx.find_column(None, column)),
        None => ctx.find_column(None, label),
    }
}

/// Partition records by the grouping columns (first-seen order) and reduce
/// each group with the requested aggregates. Without grouping columns the
/// whole set reduces to exactly one record.
fn aggregate_batch(
    schema: Vec<String>,
    rows: Vec<Row>,
    group_by: &[String],
    aggregates: &[(AggFunc, AggTarget)],
) -> DbResult<RecordBatch> {
    let ctx = EvalContext::new(&schema);
    let group_ordinals = group_by
        .iter()
        .map(|label| find_label(&ctx, label))
        .collect::<DbResult<Vec<_>>>()?;
    let agg_inputs = aggregates
        .iter()
        .map(|(_, target)| match target {
            AggTarget::Column(label) => find_label(&ctx, label).map(Some),
            AggTarget::Star => Ok(None),
        })
        .collect::<DbResult<Vec<_>>>()?;

    let mut order: Vec<Vec<Value>> = Vec::new();
    let mut groups: Map<Vec<Value>, Vec<Row>> = Map::default();
    if group_ordinals.is_empty() {
        order.push(Vec::new());
        groups.insert(Vec::new(), rows);
    } else {
        for row in rows {
            let key: Vec<Value> = group_ordinals
                .iter()
                .map(|&ordinal| row.values[ordinal].clone())
                .collect();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }
    }

    let mut columns: Vec<String> = group_by.to_vec();
    for (func, target) in aggregates {
        columns.push(
            Aggregate {
                func: *func,
                target: target.clone(),
            }
            .output_column(),
        );
    }

    let mut out_rows = Vec::with_capacity(order.len());
    for key in order {
        let group_rows = groups.remove(&key).unwrap_or_default();
        let mut values = key;
        for ((func, _), input) in aggregates.iter().zip(&agg_inputs) {
            values.push(compute_aggregate(*func, *input, &group_rows)?);
        }
        out_rows.push(Row::new(values));
    }
    Ok(RecordBatch {
        columns,
        rows: out_rows,
    })
}

/// Reduce one group. Aggregation skips NULL cells; an empty input yields
/// NULL, except COUNT which yields 0. Double results round to two
/// decimal places.
fn compute_aggregate(func: AggFunc, input: Option<usize>, rows: &[Row]) -> DbResult<Value> {
    let Some(ordinal) = input else {
        // COUNT(*) counts records, NULLs included
        return Ok(Value::Int(rows.len() as i64));
    };
    let values: Vec<&Value> = rows
        .iter()
        .map(|row| &row.values[ordinal])
        .filter(|value| !value.is_null())
        .collect();

    match func {
        AggFunc::Count => Ok(Value::Int(values.len() as i64)),
        AggFunc::Min | AggFunc::Max if values.is_empty() => Ok(Value::Null),
        AggFunc::Min => Ok(round_if_double(
            values.iter().copied().min().cloned().unwrap_or(Value::Null),
        )),
        AggFunc::Max => Ok(round_if_double(
            values.iter().copied().max().cloned().unwrap_or(Value::Null),
        )),
        AggFunc::Sum | AggFunc::Avg => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let mut int_sum: i64 = 0;
            let mut float_sum = 0f64;
            let mut all_int = true;
            for value in &values {
                match value {
                    Value::Int(i) => {
                        int_sum += i;
                        float_sum += *i as f64;
                    }
                    Value::Double(d) => {
                        all_int = false;
                        float_sum += d;
                    }
                    other => {
                        return Err(DbError::Value(format!(
                            "cannot aggregate {} values numerically",
                            other.type_name()
                        )))
                    }
                }
            }
            match func {
                AggFunc::Sum if all_int => Ok(Value::Int(int_sum)),
                AggFunc::Sum => Ok(Value::Double(round2(float_sum))),
                _ => Ok(Value::Double(round2(float_sum / values.len() as f64))),
            }
        }
    }
}

fn round_if_double(value: Value) -> Value {
    match value {
        Value::Double(d) => Value::Double(round2(d)),
        other => other,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn sort_batch(batch: &mut RecordBatch, order_by: &[SortKey]) -> DbResult<()> {
    let ctx = EvalContext::new(&batch.columns);
    let keys = order_by
        .iter()
        .map(|key| find_label(&ctx, &key.column).map(|ordinal| (ordinal, key.direction)))
        .collect::<DbResult<Vec<_>>>()?;
    batch.rows.sort_by(|a, b| compare_rows(a, b, &keys));
    Ok(())
}

/// Stable multi-key comparison: the leftmost key dominates, NULL sorts
/// before every value, strings compare by code point.
fn compare_rows(a: &Row, b: &Row, keys: &[(usize, SortDirection)]) -> Ordering {
    for (ordinal, direction) in keys {
        let ordering = a.values[*ordinal].cmp(&b.values[*ordinal]);
        let directed = match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if directed != Ordering::Equal {
            return directed;
        }
    }
    Ordering::Equal
}
