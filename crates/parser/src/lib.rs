mod ast;

pub use ast::*;

use common::{DbError, DbResult};
use expr::{BinaryOp, Expr};
use sqlparser::ast as sqlast;
use sqlparser::dialect::GenericDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser as SqlParser;
use sqlparser::tokenizer::Token;
use types::Value;

/// Parse a `;`-separated batch of SQL text into the internal AST.
///
/// The parser is driven statement by statement so the `DROP INDEX name
/// [ON table]` form can be recognized directly; everything else goes
/// through the sqlparser grammar and is lowered via `map_statement`.
pub fn parse_statements(sql: &str) -> DbResult<Vec<Statement>> {
    let normalized = normalize_inline_foreign_keys(sql);
    let dialect = GenericDialect {};
    let mut parser = SqlParser::new(&dialect)
        .try_with_sql(&normalized)
        .map_err(|e| DbError::Parse(format!("SQL tokenize error: {e}")))?;

    let mut statements = Vec::new();
    loop {
        while parser.consume_token(&Token::SemiColon) {}
        if parser.peek_token().token == Token::EOF {
            break;
        }

        if parser.parse_keywords(&[Keyword::DROP, Keyword::INDEX]) {
            let name = parser
                .parse_identifier(false)
                .map_err(|e| DbError::Parse(format!("SQL parse error: {e}")))?;
            if parser.parse_keyword(Keyword::ON) {
                // the engine resolves indexes by name alone
                parser
                    .parse_object_name(false)
                    .map_err(|e| DbError::Parse(format!("SQL parse error: {e}")))?;
            }
            statements.push(Statement::DropIndex { name: name.value });
        } else {
            let stmt = parser
                .parse_statement()
                .map_err(|e| DbError::Parse(format!("SQL parse error: {e}")))?;
            statements.push(map_statement(stmt)?);
        }

        if !parser.consume_token(&Token::SemiColon) && parser.peek_token().token != Token::EOF {
            return Err(DbError::Parse(format!(
                "expected ';' between statements, found {}",
                parser.peek_token()
            )));
        }
    }
    Ok(statements)
}

/// Rewrite the inline `col TYPE FOREIGN KEY REFERENCES t(c)` spelling to
/// the bare `REFERENCES t(c)` form sqlparser understands, leaving string
/// literals untouched. Table-level `FOREIGN KEY (col) REFERENCES ...`
/// constraints are unaffected because the parenthesis breaks the phrase.
fn normalize_inline_foreign_keys(sql: &str) -> String {
    fn read_word(chars: &[char], mut at: usize) -> (String, usize) {
        let start = at;
        while at < chars.len() && (chars[at].is_alphanumeric() || chars[at] == '_') {
            at += 1;
        }
        (chars[start..at].iter().collect(), at)
    }
    fn skip_ws(chars: &[char], mut at: usize) -> usize {
        while at < chars.len() && chars[at].is_whitespace() {
            at += 1;
        }
        at
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    let mut in_string = false;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            i += 1;
        } else if c == '\'' {
            in_string = true;
            out.push(c);
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            let (word, after) = read_word(&chars, i);
            i = after;
            if word.eq_ignore_ascii_case("FOREIGN") {
                let at_key = skip_ws(&chars, i);
                let (key, after_key) = read_word(&chars, at_key);
                if key.eq_ignore_ascii_case("KEY") {
                    let at_refs = skip_ws(&chars, after_key);
                    let (refs, after_refs) = read_word(&chars, at_refs);
                    if refs.eq_ignore_ascii_case("REFERENCES") {
                        out.push_str("REFERENCES");
                        i = after_refs;
                        continue;
                    }
                }
            }
            out.push_str(&word);
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn map_statement(stmt: sqlast::Statement) -> DbResult<Statement> {
    use sqlast::Statement as SqlStatement;

    match stmt {
        SqlStatement::CreateTable {
            name,
            columns,
            constraints,
            ..
        } => map_create_table(name, columns, constraints),
        SqlStatement::Drop {
            object_type, names, ..
        } => match object_type {
            sqlast::ObjectType::Table => Ok(Statement::DropTable {
                name: first_name(names)?,
            }),
            sqlast::ObjectType::Index => Ok(Statement::DropIndex {
                name: first_name(names)?,
            }),
            _ => Err(DbError::Parse(format!(
                "unsupported DROP type: {object_type:?}"
            ))),
        },
        SqlStatement::CreateIndex {
            name,
            table_name,
            columns,
            ..
        } => {
            let index_name = name
                .ok_or_else(|| DbError::Parse("index name required".into()))
                .map(|n| object_name(&n))??;
            let table = object_name(&table_name)?;
            if columns.len() != 1 {
                return Err(DbError::Parse(
                    "CREATE INDEX expects exactly one column".into(),
                ));
            }
            let column = index_column(&columns[0])?;
            Ok(Statement::CreateIndex {
                name: index_name,
                table,
                column,
            })
        }
        SqlStatement::Insert {
            table_name,
            columns,
            source,
            ..
        } => {
            let table = object_name(&table_name)?;
            let columns = if columns.is_empty() {
                None
            } else {
                Some(columns.into_iter().map(|c| c.value).collect())
            };
            let source = source.ok_or_else(|| DbError::Parse("INSERT source missing".into()))?;
            let values = extract_values(*source)?;
            Ok(Statement::Insert {
                table,
                columns,
                values,
            })
        }
        SqlStatement::Query(query) => map_select(*query),
        SqlStatement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let (table, _) = table_factor_name(only_relation(&table)?)?;
            let assignments = assignments
                .into_iter()
                .map(|assign| {
                    let ident = assign
                        .id
                        .last()
                        .ok_or_else(|| DbError::Parse("invalid assignment target".into()))?;
                    Ok((ident.value.clone(), map_expr(assign.value)?))
                })
                .collect::<DbResult<Vec<_>>>()?;
            let selection = selection.map(map_expr).transpose()?;
            Ok(Statement::Update {
                table,
                assignments,
                selection,
            })
        }
        SqlStatement::Delete {
            from, selection, ..
        } => {
            if from.is_empty() {
                return Err(DbError::Parse("DELETE requires FROM source".into()));
            }
            if from.len() > 1 {
                return Err(DbError::Parse("multi-table DELETE not supported".into()));
            }
            let (table, _) = table_factor_name(only_relation(&from[0])?)?;
            let selection = selection.map(map_expr).transpose()?;
            Ok(Statement::Delete { table, selection })
        }
        _ => Err(DbError::Parse("unsupported statement".into())),
    }
}

fn map_create_table(
    name: sqlast::ObjectName,
    columns: Vec<sqlast::ColumnDef>,
    constraints: Vec<sqlast::TableConstraint>,
) -> DbResult<Statement> {
    let table = object_name(&name)?;
    let mut foreign_keys = Vec::new();
    let mut inline_pk = Vec::new();
    let mut mapped_columns = Vec::with_capacity(columns.len());

    for col in columns {
        let column_name = col.name.value.clone();
        for opt in &col.options {
            match &opt.option {
                sqlast::ColumnOption::Unique { is_primary: true, .. } => {
                    inline_pk.push(column_name.clone());
                }
                sqlast::ColumnOption::ForeignKey {
                    foreign_table,
                    referred_columns,
                    ..
                } => {
                    let ref_column = referred_columns
                        .first()
                        .ok_or_else(|| {
                            DbError::Parse("foreign key requires a referenced column".into())
                        })?
                        .value
                        .clone();
                    foreign_keys.push(ForeignKeyDef {
                        column: column_name.clone(),
                        ref_table: object_name(foreign_table)?,
                        ref_column,
                    });
                }
                _ => {}
            }
        }
        mapped_columns.push(ColumnDef {
            name: column_name,
            ty: col.data_type.to_string().to_uppercase(),
        });
    }

    let mut table_pk = Vec::new();
    for constraint in constraints {
        match constraint {
            sqlast::TableConstraint::Unique {
                columns,
                is_primary: true,
                ..
            } => table_pk.extend(columns.into_iter().map(|c| c.value)),
            sqlast::TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                ..
            } => {
                if columns.len() != 1 || referred_columns.len() != 1 {
                    return Err(DbError::Parse(
                        "composite foreign keys not supported".into(),
                    ));
                }
                foreign_keys.push(ForeignKeyDef {
                    column: columns[0].value.clone(),
                    ref_table: object_name(&foreign_table)?,
                    ref_column: referred_columns[0].value.clone(),
                });
            }
            _ => {}
        }
    }

    let primary_key = match (inline_pk.len(), table_pk.len()) {
        (1, 0) => inline_pk.remove(0),
        (0, 1) => table_pk.remove(0),
        (0, 0) => {
            return Err(DbError::Parse(format!(
                "table '{table}' requires exactly one PRIMARY KEY column"
            )))
        }
        _ => {
            return Err(DbError::Parse(
                "exactly one PRIMARY KEY column is supported".into(),
            ))
        }
    };

    Ok(Statement::CreateTable {
        name: table,
        columns: mapped_columns,
        primary_key,
        foreign_keys,
    })
}

fn map_select(query: sqlast::Query) -> DbResult<Statement> {
    use sqlast::SetExpr;

    let select = match *query.body {
        SetExpr::Select(select) => select,
        SetExpr::Values(_) => {
            return Err(DbError::Parse("standalone VALUES not supported".into()))
        }
        _ => return Err(DbError::Parse("SET operations not supported".into())),
    };

    let sqlast::Select {
        projection,
        from,
        selection,
        group_by,
        having,
        ..
    } = *select;

    let mut from = from;
    if from.len() != 1 {
        return Err(DbError::Parse(match from.len() {
            0 => "SELECT requires a FROM clause".into(),
            _ => "comma-separated FROM list not supported".into(),
        }));
    }
    let table_with_joins = from.remove(0);
    let (table, table_alias) = table_factor_name(&table_with_joins.relation)?;

    let mut joins = table_with_joins.joins;
    if joins.len() > 1 {
        return Err(DbError::Parse(
            "only a single JOIN per SELECT is supported".into(),
        ));
    }
    let join = joins.pop().map(map_join).transpose()?;

    let projection = projection
        .into_iter()
        .map(map_select_item)
        .collect::<DbResult<Vec<_>>>()?;
    let selection = selection.map(map_expr).transpose()?;

    let group_by = match group_by {
        sqlast::GroupByExpr::Expressions(exprs) => exprs
            .into_iter()
            .map(column_name_from_expr)
            .collect::<DbResult<Vec<_>>>()?,
        sqlast::GroupByExpr::All => {
            return Err(DbError::Parse("GROUP BY ALL not supported".into()))
        }
    };
    let having = having.map(map_expr).transpose()?;

    if query.limit.is_some() || query.offset.is_some() {
        return Err(DbError::Parse("LIMIT/OFFSET not supported".into()));
    }
    let order_by = query
        .order_by
        .into_iter()
        .map(map_order_by_expr)
        .collect::<DbResult<Vec<_>>>()?;

    Ok(Statement::Select(Box::new(SelectStatement {
        table,
        table_alias,
        join,
        projection,
        selection,
        group_by,
        having,
        order_by,
    })))
}

fn map_join(join: sqlast::Join) -> DbResult<JoinClause> {
    let (table, alias) = table_factor_name(&join.relation)?;
    let constraint = match join.join_operator {
        sqlast::JoinOperator::Inner(constraint) => constraint,
        other => {
            return Err(DbError::Parse(format!(
                "only INNER JOIN is supported, got {other:?}"
            )))
        }
    };
    let on = match constraint {
        sqlast::JoinConstraint::On(expr) => expr,
        _ => return Err(DbError::Parse("JOIN requires an ON condition".into())),
    };
    let (left, right) = match on {
        sqlast::Expr::BinaryOp { left, op, right }
            if matches!(op, sqlast::BinaryOperator::Eq) =>
        {
            (column_ref(*left)?, column_ref(*right)?)
        }
        other => {
            return Err(DbError::Parse(format!(
                "JOIN condition must be an equality of two columns, got {other:?}"
            )))
        }
    };
    Ok(JoinClause {
        table,
        alias,
        left,
        right,
    })
}

fn map_order_by_expr(expr: sqlast::OrderByExpr) -> DbResult<ast::OrderByExpr> {
    let column = column_name_from_expr(expr.expr)?;
    let direction = match expr.asc {
        Some(false) => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    Ok(ast::OrderByExpr { column, direction })
}

fn extract_values(query: sqlast::Query) -> DbResult<Vec<Value>> {
    match *query.body {
        sqlast::SetExpr::Values(values) => {
            let mut rows = values.rows.into_iter();
            let row = rows
                .next()
                .ok_or_else(|| DbError::Parse("INSERT requires at least one row".into()))?;
            if rows.next().is_some() {
                return Err(DbError::Parse("multi-row INSERT not supported".into()));
            }
            row.into_iter()
                .map(|expr| match map_expr(expr)? {
                    Expr::Literal(value) => Ok(value),
                    other => Err(DbError::Parse(format!(
                        "INSERT values must be literals, got {other:?}"
                    ))),
                })
                .collect()
        }
        _ => Err(DbError::Parse("INSERT expects a VALUES list".into())),
    }
}

fn map_select_item(item: sqlast::SelectItem) -> DbResult<SelectItem> {
    match item {
        sqlast::SelectItem::Wildcard(options) => {
            ensure_plain_wildcard(&options)?;
            Ok(SelectItem::Wildcard)
        }
        sqlast::SelectItem::QualifiedWildcard(_, _) => {
            Err(DbError::Parse("qualified wildcard not supported".into()))
        }
        sqlast::SelectItem::UnnamedExpr(expr) => match expr {
            sqlast::Expr::Identifier(_) | sqlast::Expr::CompoundIdentifier(_) => {
                Ok(SelectItem::Column(column_name_from_expr(expr)?))
            }
            sqlast::Expr::Function(func) => Ok(SelectItem::Aggregate(map_aggregate(func)?)),
            other => Err(DbError::Parse(format!(
                "unsupported select item: {other:?}"
            ))),
        },
        sqlast::SelectItem::ExprWithAlias { .. } => {
            Err(DbError::Parse("select aliases not supported".into()))
        }
    }
}

fn map_aggregate(func: sqlast::Function) -> DbResult<Aggregate> {
    let name = func.name.to_string();
    let agg = AggFunc::parse(&name)
        .ok_or_else(|| DbError::Value(format!("unsupported aggregate '{name}'")))?;

    let mut args = func.args;
    if args.len() != 1 {
        return Err(DbError::Value(format!(
            "aggregate '{name}' expects exactly one argument"
        )));
    }
    let target = match args.remove(0) {
        sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Expr(expr)) => {
            AggTarget::Column(column_name_from_expr(expr)?)
        }
        sqlast::FunctionArg::Unnamed(sqlast::FunctionArgExpr::Wildcard) => {
            if agg != AggFunc::Count {
                return Err(DbError::Value(format!(
                    "aggregate '{name}' cannot take '*'"
                )));
            }
            AggTarget::Star
        }
        other => {
            return Err(DbError::Value(format!(
                "unsupported aggregate argument: {other:?}"
            )))
        }
    };
    Ok(Aggregate { func: agg, target })
}

fn map_expr(expr: sqlast::Expr) -> DbResult<Expr> {
    use sqlast::Expr as SqlExpr;

    match expr {
        SqlExpr::Identifier(ident) => Ok(Expr::Column {
            table: None,
            name: ident.value,
        }),
        SqlExpr::CompoundIdentifier(idents) => {
            let ColumnRef { table, column } = compound_to_ref(idents)?;
            Ok(Expr::Column {
                table,
                name: column,
            })
        }
        SqlExpr::Value(value) => Ok(Expr::Literal(map_value(value)?)),
        SqlExpr::BinaryOp { left, op, right } => Ok(Expr::Binary {
            left: Box::new(map_expr(*left)?),
            op: map_binary_op(op)?,
            right: Box::new(map_expr(*right)?),
        }),
        SqlExpr::UnaryOp {
            op: sqlast::UnaryOperator::Minus,
            expr,
        } => match map_expr(*expr)? {
            Expr::Literal(Value::Int(i)) => Ok(Expr::Literal(Value::Int(-i))),
            Expr::Literal(Value::Double(d)) => Ok(Expr::Literal(Value::Double(-d))),
            other => Err(DbError::Parse(format!(
                "unary minus applies to numeric literals only, got {other:?}"
            ))),
        },
        // HAVING clauses reference aggregates by their output column
        SqlExpr::Function(func) => {
            let agg = map_aggregate(func)?;
            Ok(Expr::Column {
                table: None,
                name: agg.output_column(),
            })
        }
        SqlExpr::Nested(expr) => map_expr(*expr),
        other => Err(DbError::Parse(format!("unsupported expression: {other:?}"))),
    }
}

fn map_value(value: sqlast::Value) -> DbResult<Value> {
    use sqlast::Value as SqlValue;

    match value {
        SqlValue::Number(num, _) => {
            if let Ok(parsed) = num.parse::<i64>() {
                Ok(Value::Int(parsed))
            } else {
                num.parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| DbError::Parse(format!("invalid numeric literal: {num}")))
            }
        }
        SqlValue::SingleQuotedString(s) => Ok(Value::Str(s)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(DbError::Parse(format!("unsupported literal: {other:?}"))),
    }
}

fn map_binary_op(op: sqlast::BinaryOperator) -> DbResult<BinaryOp> {
    use sqlast::BinaryOperator as SqlBinary;

    Ok(match op {
        SqlBinary::Eq => BinaryOp::Eq,
        SqlBinary::NotEq => BinaryOp::Ne,
        SqlBinary::Lt => BinaryOp::Lt,
        SqlBinary::LtEq => BinaryOp::Le,
        SqlBinary::Gt => BinaryOp::Gt,
        SqlBinary::GtEq => BinaryOp::Ge,
        SqlBinary::And => BinaryOp::And,
        SqlBinary::Or => BinaryOp::Or,
        SqlBinary::Plus => BinaryOp::Add,
        SqlBinary::Minus => BinaryOp::Sub,
        SqlBinary::Multiply => BinaryOp::Mul,
        SqlBinary::Divide => BinaryOp::Div,
        other => return Err(DbError::Parse(format!("unsupported operator: {other:?}"))),
    })
}

fn column_ref(expr: sqlast::Expr) -> DbResult<ColumnRef> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(ColumnRef {
            table: None,
            column: ident.value,
        }),
        sqlast::Expr::CompoundIdentifier(idents) => compound_to_ref(idents),
        other => Err(DbError::Parse(format!(
            "expected a column reference, got {other:?}"
        ))),
    }
}

fn compound_to_ref(idents: Vec<sqlast::Ident>) -> DbResult<ColumnRef> {
    match idents.len() {
        1 => {
            let mut idents = idents;
            Ok(ColumnRef {
                table: None,
                column: idents.remove(0).value,
            })
        }
        2 => {
            let mut idents = idents;
            let column = idents.remove(1).value;
            let table = idents.remove(0).value;
            Ok(ColumnRef {
                table: Some(table),
                column,
            })
        }
        _ => Err(DbError::Parse("identifier nesting too deep".into())),
    }
}

/// Render a (possibly qualified) column expression back to a flat label.
fn column_name_from_expr(expr: sqlast::Expr) -> DbResult<String> {
    match expr {
        sqlast::Expr::Identifier(ident) => Ok(ident.value),
        sqlast::Expr::CompoundIdentifier(idents) => {
            let parts: Vec<String> = idents.into_iter().map(|i| i.value).collect();
            if parts.len() > 2 {
                return Err(DbError::Parse("identifier nesting too deep".into()));
            }
            Ok(parts.join("."))
        }
        other => Err(DbError::Parse(format!(
            "expected a column name, got {other:?}"
        ))),
    }
}

fn object_name(name: &sqlast::ObjectName) -> DbResult<String> {
    name.0
        .first()
        .map(|ident| ident.value.clone())
        .ok_or_else(|| DbError::Parse("invalid object name".into()))
}

fn first_name(mut names: Vec<sqlast::ObjectName>) -> DbResult<String> {
    if names.is_empty() {
        return Err(DbError::Parse("DROP requires a target".into()));
    }
    object_name(&names.remove(0))
}

fn only_relation(table: &sqlast::TableWithJoins) -> DbResult<&sqlast::TableFactor> {
    if !table.joins.is_empty() {
        return Err(DbError::Parse("joins not supported here".into()));
    }
    Ok(&table.relation)
}

fn table_factor_name(factor: &sqlast::TableFactor) -> DbResult<(String, Option<String>)> {
    match factor {
        sqlast::TableFactor::Table { name, alias, .. } => Ok((
            object_name(name)?,
            alias.as_ref().map(|a| a.name.value.clone()),
        )),
        _ => Err(DbError::Parse("unsupported table factor".into())),
    }
}

fn index_column(column: &sqlast::OrderByExpr) -> DbResult<String> {
    match &column.expr {
        sqlast::Expr::Identifier(ident) => Ok(ident.value.clone()),
        sqlast::Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|i| i.value.clone())
            .ok_or_else(|| DbError::Parse("invalid identifier".into())),
        other => Err(DbError::Parse(format!(
            "unsupported index column: {other:?}"
        ))),
    }
}

fn ensure_plain_wildcard(options: &sqlast::WildcardAdditionalOptions) -> DbResult<()> {
    let has_options = options.opt_exclude.is_some()
        || options.opt_except.is_some()
        || options.opt_rename.is_some()
        || options.opt_replace.is_some();
    if has_options {
        Err(DbError::Parse("wildcard options not supported".into()))
    } else {
        Ok(())
    }
}
