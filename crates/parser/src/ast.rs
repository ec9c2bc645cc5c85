use expr::Expr;
use types::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
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
        name: String,
        table: String,
        column: String,
    },
    DropIndex {
        name: String,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Value>,
    },
    Select(Box<SelectStatement>),
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        selection: Option<Expr>,
    },
    Delete {
        table: String,
        selection: Option<Expr>,
    },
}

/// Declared column: the type is kept as written and validated by the
/// executor against the recognized set.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForeignKeyDef {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    pub table_alias: Option<String>,
    pub join: Option<JoinClause>,
    pub projection: Vec<SelectItem>,
    pub selection: Option<Expr>,
    pub group_by: Vec<String>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
}

/// `JOIN table [alias] ON left = right` with both sides column references.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub alias: Option<String>,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// A possibly-qualified column reference appearing in a join condition.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    Wildcard,
    /// Column name, qualified (`"users.id"`) or bare (`"id"`).
    Column(String),
    Aggregate(Aggregate),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub func: AggFunc,
    pub target: AggTarget,
}

impl Aggregate {
    /// Label the aggregate contributes to the result record: the bare
    /// column name, or `count` for `COUNT(*)`.
    pub fn output_column(&self) -> String {
        match &self.target {
            AggTarget::Column(name) => name
                .rsplit('.')
                .next()
                .unwrap_or(name.as_str())
                .to_string(),
            AggTarget::Star => "count".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggFunc {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl AggFunc {
    pub fn parse(name: &str) -> Option<AggFunc> {
        match name.to_ascii_uppercase().as_str() {
            "MIN" => Some(AggFunc::Min),
            "MAX" => Some(AggFunc::Max),
            "SUM" => Some(AggFunc::Sum),
            "AVG" => Some(AggFunc::Avg),
            "COUNT" => Some(AggFunc::Count),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AggTarget {
    Column(String),
    Star,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderByExpr {
    pub column: String,
    pub direction: SortDirection,
}
