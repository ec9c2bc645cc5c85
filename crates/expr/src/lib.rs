
use common::{DbError, DbResult, Row};
use std::cmp::Ordering;
use types::Value;

/// Binary comparison, logical, and arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Condition / value expression tree.
///
/// A WHERE or HAVING clause lowers to this shape: simple comparisons at
/// the leaves, AND/OR combining them with arbitrary nesting. UPDATE
/// assignment values reuse the same tree with the arithmetic operators.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Literal(Value),
    /// Column reference with optional table/alias qualifier.
    ///
    /// Examples:
    /// - `Column { table: None, name: "id" }` - unqualified column
    /// - `Column { table: Some("users"), name: "id" }` - qualified column
    Column {
        table: Option<String>,
        name: String,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Expr {
        Expr::Column {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }
}

/// Expression with column references bound to row positions, built once
/// per statement so the per-row loop never repeats name lookups.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedExpr {
    Literal(Value),
    Column(usize),
    Binary {
        left: Box<ResolvedExpr>,
        op: BinaryOp,
        right: Box<ResolvedExpr>,
    },
}

/// Binding context: the record schema (column labels in order).
pub struct EvalContext<'a> {
    pub schema: &'a [String],
}

impl<'a> EvalContext<'a> {
    pub fn new(schema: &'a [String]) -> Self {
        Self { schema }
    }

    /// Find a column position in the schema.
    ///
    /// Schema entries may be simple names (`"id"`) or qualified labels
    /// (`"users.id"`). A qualified reference matches its label exactly;
    /// an unqualified reference matches a simple name first, then any
    /// `.name` suffix (how join records are addressed by bare name).
    pub fn find_column(&self, table: Option<&str>, name: &str) -> DbResult<usize> {
        if let Some(qualifier) = table {
            let label = format!("{qualifier}.{name}");
            self.schema
                .iter()
                .position(|c| c.eq_ignore_ascii_case(&label))
                .ok_or_else(|| DbError::Schema(format!("unknown column '{label}'")))
        } else {
            let suffix = format!(".{}", name.to_ascii_lowercase());
            self.schema
                .iter()
                .position(|c| {
                    c.eq_ignore_ascii_case(name) || c.to_ascii_lowercase().ends_with(&suffix)
                })
                .ok_or_else(|| DbError::Schema(format!("unknown column '{name}'")))
        }
    }

    /// Bind every column reference in the expression to its position.
    pub fn resolve(&self, expr: &Expr) -> DbResult<ResolvedExpr> {
        match expr {
            Expr::Literal(v) => Ok(ResolvedExpr::Literal(v.clone())),
            Expr::Column { table, name } => {
                let idx = self.find_column(table.as_deref(), name)?;
                Ok(ResolvedExpr::Column(idx))
            }
            Expr::Binary { left, op, right } => Ok(ResolvedExpr::Binary {
                left: Box::new(self.resolve(left)?),
                op: *op,
                right: Box::new(self.resolve(right)?),
            }),
        }
    }
}

/// Evaluate a condition over a row. A comparison involving NULL is false.
pub fn eval_bool(expr: &ResolvedExpr, row: &Row) -> DbResult<bool> {
    match expr {
        ResolvedExpr::Binary { left, op, right } if op.is_logical() => {
            let l = eval_bool(left, row)?;
            let r = eval_bool(right, row)?;
            Ok(match op {
                BinaryOp::And => l && r,
                _ => l || r,
            })
        }
        ResolvedExpr::Binary { left, op, right } if op.is_comparison() => {
            let lv = eval_value(left, row)?;
            let rv = eval_value(right, row)?;
            Ok(compare_values(&lv, *op, &rv))
        }
        other => Err(DbError::Value(format!(
            "condition must be a comparison, got {other:?}"
        ))),
    }
}

/// Evaluate a value expression over a row (literals, column references,
/// arithmetic). Arithmetic over NULL yields NULL.
pub fn eval_value(expr: &ResolvedExpr, row: &Row) -> DbResult<Value> {
    match expr {
        ResolvedExpr::Literal(v) => Ok(v.clone()),
        ResolvedExpr::Column(idx) => row
            .values
            .get(*idx)
            .cloned()
            .ok_or_else(|| DbError::Value(format!("column position {idx} out of bounds"))),
        ResolvedExpr::Binary { left, op, right } => {
            let lv = eval_value(left, row)?;
            let rv = eval_value(right, row)?;
            eval_arithmetic(&lv, *op, &rv)
        }
    }
}

fn compare_values(l: &Value, op: BinaryOp, r: &Value) -> bool {
    let Some(ord) = l.compare(r) else {
        return false;
    };
    match op {
        BinaryOp::Eq => ord == Ordering::Equal,
        BinaryOp::Ne => ord != Ordering::Equal,
        BinaryOp::Lt => ord == Ordering::Less,
        BinaryOp::Le => ord != Ordering::Greater,
        BinaryOp::Gt => ord == Ordering::Greater,
        BinaryOp::Ge => ord != Ordering::Less,
        _ => unreachable!("caller filtered to comparison operators"),
    }
}

fn eval_arithmetic(l: &Value, op: BinaryOp, r: &Value) -> DbResult<Value> {
    use BinaryOp::*;

    if !matches!(op, Add | Sub | Mul | Div) {
        return Err(DbError::Value(format!(
            "operator {op:?} is not valid in a value expression"
        )));
    }
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }

    match (l, r) {
        (Value::Int(a), Value::Int(b)) => match op {
            Add => Ok(Value::Int(a + b)),
            Sub => Ok(Value::Int(a - b)),
            Mul => Ok(Value::Int(a * b)),
            Div => {
                if *b == 0 {
                    Err(DbError::Value("division by zero".into()))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            _ => unreachable!(),
        },
        (Value::Int(_) | Value::Double(_), Value::Int(_) | Value::Double(_)) => {
            let a = match l {
                Value::Int(i) => *i as f64,
                Value::Double(d) => *d,
                _ => unreachable!(),
            };
            let b = match r {
                Value::Int(i) => *i as f64,
                Value::Double(d) => *d,
                _ => unreachable!(),
            };
            let out = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                _ => unreachable!(),
            };
            Ok(Value::Double(out))
        }
        _ => Err(DbError::Value(format!(
            "arithmetic requires numeric operands, got {} and {}",
            l.type_name(),
            r.type_name()
        ))),
    }
}
