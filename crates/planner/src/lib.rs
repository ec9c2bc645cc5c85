//! Statement lowering: turns a parsed `Statement` into the single executor
//! call that implements it. The interesting work is on the SELECT path:
//! splitting projection into columns and aggregates, resolving which side
//! of a JOIN condition belongs to which table, and shaping ORDER BY keys.

#[cfg(test)]
mod tests;

use common::{DbError, DbResult};
use expr::Expr;
use parser::{ColumnRef, JoinClause, SelectItem, SelectStatement, Statement};
pub use parser::{AggFunc, AggTarget, Aggregate, ColumnDef, ForeignKeyDef, SortDirection};
use types::Value;

/// One executor invocation with everything it needs.
#[derive(Clone, Debug, PartialEq)]
pub enum Plan {
    CreateTable {
        name: String,
        columns: Vec<ColumnDef>,
        primary_key: String,
        foreign_keys: Vec<ForeignKeyDef>,
    },
    DropTable {
        name: String,
    },
    CreateIndex {
        table: String,
        column: String,
        name: Option<String>,
    },
    DropIndex {
        name: String,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Value>,
    },
    Delete {
        table: String,
        predicate: Option<Expr>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        predicate: Option<Expr>,
    },
    Select(SelectPlan),
    JoinSelect(JoinPlan),
}

impl Plan {
    /// Whether applying this plan can change the catalog or indexes
    /// (and therefore requires a snapshot save).
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Plan::Select(_) | Plan::JoinSelect(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

/// Single-table read.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectPlan {
    pub table: String,
    /// Projection; `None` selects every column. Ignored when aggregates
    /// are present (the result carries grouping plus aggregate columns).
    pub columns: Option<Vec<String>>,
    pub predicate: Option<Expr>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<(AggFunc, AggTarget)>,
    pub having: Option<Expr>,
    pub order_by: Vec<SortKey>,
}

/// Equi-join read. The executor picks driver and probe sides by row count;
/// the plan only fixes which column belongs to which table.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinPlan {
    pub left: String,
    pub right: String,
    pub left_col: String,
    pub right_col: String,
    pub left_alias: Option<String>,
    pub right_alias: Option<String>,
    pub columns: Option<Vec<String>>,
    pub predicate: Option<Expr>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<(AggFunc, AggTarget)>,
    pub having: Option<Expr>,
    pub order_by: Vec<SortKey>,
}

/// Lower a parsed statement into its plan.
pub fn plan(stmt: Statement) -> DbResult<Plan> {
    match stmt {
        Statement::CreateTable {
            name,
            columns,
            primary_key,
            foreign_keys,
        } => Ok(Plan::CreateTable {
            name,
            columns,
            primary_key,
            foreign_keys,
        }),
        Statement::DropTable { name } => Ok(Plan::DropTable { name }),
        Statement::CreateIndex {
            name,
            table,
            column,
        } => Ok(Plan::CreateIndex {
            table,
            column,
            name: Some(name),
        }),
        Statement::DropIndex { name } => Ok(Plan::DropIndex { name }),
        Statement::Insert {
            table,
            columns,
            values,
        } => Ok(Plan::Insert {
            table,
            columns,
            values,
        }),
        Statement::Delete { table, selection } => Ok(Plan::Delete {
            table,
            predicate: selection,
        }),
        Statement::Update {
            table,
            assignments,
            selection,
        } => Ok(Plan::Update {
            table,
            assignments,
            predicate: selection,
        }),
        Statement::Select(select) => plan_select(*select),
    }
}

fn plan_select(select: SelectStatement) -> DbResult<Plan> {
    let SelectStatement {
        table,
        table_alias,
        join,
        projection,
        selection,
        group_by,
        having,
        order_by,
    } = select;

    let (columns, aggregates) = split_projection(projection)?;
    if having.is_some() && aggregates.is_empty() && group_by.is_empty() {
        return Err(DbError::Parse(
            "HAVING requires GROUP BY or aggregates".into(),
        ));
    }
    let order_by = order_by
        .into_iter()
        .map(|o| SortKey {
            column: o.column,
            direction: o.direction,
        })
        .collect();

    match join {
        None => Ok(Plan::Select(SelectPlan {
            table,
            columns,
            predicate: selection,
            group_by,
            aggregates,
            having,
            order_by,
        })),
        Some(join) => {
            let (left_col, right_col) =
                assign_join_columns(&table, table_alias.as_deref(), &join)?;
            Ok(Plan::JoinSelect(JoinPlan {
                left: table,
                right: join.table,
                left_col,
                right_col,
                left_alias: table_alias,
                right_alias: join.alias,
                columns,
                predicate: selection,
                group_by,
                aggregates,
                having,
                order_by,
            }))
        }
    }
}

fn split_projection(
    projection: Vec<SelectItem>,
) -> DbResult<(Option<Vec<String>>, Vec<(AggFunc, AggTarget)>)> {
    let mut columns = Vec::new();
    let mut aggregates = Vec::new();
    let mut wildcard = false;
    for item in projection {
        match item {
            SelectItem::Wildcard => wildcard = true,
            SelectItem::Column(name) => columns.push(name),
            SelectItem::Aggregate(agg) => aggregates.push((agg.func, agg.target)),
        }
    }
    let columns = if wildcard || columns.is_empty() {
        None
    } else {
        Some(columns)
    };
    Ok((columns, aggregates))
}

/// Decide which side of `ON a.c = b.c` belongs to the left table. Sides
/// with a qualifier are matched against table names and aliases; without
/// qualifiers the operands are taken positionally.
fn assign_join_columns(
    left_table: &str,
    left_alias: Option<&str>,
    join: &JoinClause,
) -> DbResult<(String, String)> {
    let belongs_left = |r: &ColumnRef| {
        r.table.as_deref().is_some_and(|q| {
            q.eq_ignore_ascii_case(left_table)
                || left_alias.is_some_and(|a| q.eq_ignore_ascii_case(a))
        })
    };
    let belongs_right = |r: &ColumnRef| {
        r.table.as_deref().is_some_and(|q| {
            q.eq_ignore_ascii_case(&join.table)
                || join.alias.as_deref().is_some_and(|a| q.eq_ignore_ascii_case(a))
        })
    };

    let (first, second) = (&join.left, &join.right);
    if belongs_left(first) || belongs_right(second) {
        Ok((first.column.clone(), second.column.clone()))
    } else if belongs_left(second) || belongs_right(first) {
        Ok((second.column.clone(), first.column.clone()))
    } else if first.table.is_none() && second.table.is_none() {
        Ok((first.column.clone(), second.column.clone()))
    } else {
        Err(DbError::Schema(format!(
            "join condition references neither '{left_table}' nor '{}'",
            join.table
        )))
    }
}
