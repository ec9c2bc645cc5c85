use super::*;
use pretty_assertions::assert_eq;

fn plan_sql(sql: &str) -> Plan {
    let mut stmts = parser::parse_statements(sql).unwrap();
    assert_eq!(stmts.len(), 1);
    plan(stmts.remove(0)).unwrap()
}

#[test]
fn ddl_passes_through() {
    assert_eq!(
        plan_sql("DROP TABLE Users"),
        Plan::DropTable { name: "Users".into() }
    );
    assert_eq!(
        plan_sql("CREATE INDEX by_email ON Users(Email)"),
        Plan::CreateIndex {
            table: "Users".into(),
            column: "Email".into(),
            name: Some("by_email".into()),
        }
    );
}

#[test]
fn select_wildcard_projects_everything() {
    let Plan::Select(select) = plan_sql("SELECT * FROM Users") else {
        panic!("expected Select plan");
    };
    assert_eq!(select.columns, None);
    assert!(select.aggregates.is_empty());
}

#[test]
fn select_projection_keeps_order() {
    let Plan::Select(select) = plan_sql("SELECT UserName, UserID FROM Users") else {
        panic!("expected Select plan");
    };
    assert_eq!(
        select.columns,
        Some(vec!["UserName".to_string(), "UserID".to_string()])
    );
}

#[test]
fn aggregates_are_paired_with_their_columns() {
    let Plan::Select(select) =
        plan_sql("SELECT UserID, SUM(Amount) FROM Orders GROUP BY UserID")
    else {
        panic!("expected Select plan");
    };
    assert_eq!(select.group_by, vec!["UserID".to_string()]);
    assert_eq!(
        select.aggregates,
        vec![(AggFunc::Sum, AggTarget::Column("Amount".into()))]
    );
}

#[test]
fn having_without_grouping_is_rejected() {
    let mut stmts = parser::parse_statements("SELECT a FROM T HAVING a > 1").unwrap();
    let err = plan(stmts.remove(0)).unwrap_err();
    assert!(format!("{err}").contains("HAVING"));
}

#[test]
fn join_columns_follow_qualifiers() {
    let Plan::JoinSelect(join) =
        plan_sql("SELECT * FROM Users JOIN Orders ON Users.UserID = Orders.UserID")
    else {
        panic!("expected JoinSelect plan");
    };
    assert_eq!(join.left, "Users");
    assert_eq!(join.right, "Orders");
    assert_eq!(join.left_col, "UserID");
    assert_eq!(join.right_col, "UserID");
}

#[test]
fn swapped_join_condition_is_reoriented() {
    let Plan::JoinSelect(join) =
        plan_sql("SELECT * FROM Users JOIN Orders ON Orders.BuyerID = Users.UserID")
    else {
        panic!("expected JoinSelect plan");
    };
    assert_eq!(join.left_col, "UserID");
    assert_eq!(join.right_col, "BuyerID");
}

#[test]
fn join_qualifiers_match_aliases() {
    let Plan::JoinSelect(join) =
        plan_sql("SELECT * FROM Employees a JOIN Employees b ON a.manager_id = b.id")
    else {
        panic!("expected JoinSelect plan");
    };
    assert_eq!(join.left_alias.as_deref(), Some("a"));
    assert_eq!(join.right_alias.as_deref(), Some("b"));
    assert_eq!(join.left_col, "manager_id");
    assert_eq!(join.right_col, "id");
}

#[test]
fn unqualified_join_condition_is_positional() {
    let Plan::JoinSelect(join) =
        plan_sql("SELECT * FROM Users JOIN Orders ON UserID = BuyerID")
    else {
        panic!("expected JoinSelect plan");
    };
    assert_eq!(join.left_col, "UserID");
    assert_eq!(join.right_col, "BuyerID");
}

#[test]
fn foreign_qualifier_is_a_schema_error() {
    let mut stmts =
        parser::parse_statements("SELECT * FROM Users JOIN Orders ON Other.a = Stranger.b")
            .unwrap();
    let err = plan(stmts.remove(0)).unwrap_err();
    assert!(matches!(err, DbError::Schema(_)));
}

#[test]
fn order_by_becomes_sort_keys() {
    let Plan::Select(select) = plan_sql("SELECT * FROM Orders ORDER BY Amount, OrderID DESC")
    else {
        panic!("expected Select plan");
    };
    assert_eq!(
        select.order_by,
        vec![
            SortKey { column: "Amount".into(), direction: SortDirection::Asc },
            SortKey { column: "OrderID".into(), direction: SortDirection::Desc },
        ]
    );
}

#[test]
fn mutations_are_flagged() {
    assert!(plan_sql("DELETE FROM T").is_mutation());
    assert!(plan_sql("INSERT INTO T VALUES (1)").is_mutation());
    assert!(!plan_sql("SELECT * FROM T").is_mutation());
}
