//! Data definition: CREATE/DROP TABLE, CREATE/DROP INDEX.

use catalog::{Catalog, Column, ForeignKey, TableDef};
use common::{DbError, DbResult};
use indexes::IndexCatalog;
use planner::{ColumnDef, ForeignKeyDef};
use types::SqlType;

/// Create a table: reject a duplicate name, unknown column types, and
/// foreign keys whose targets do not exist, then register the table with
/// empty data, an empty index container, and the primary key index.
pub fn create_table(
    catalog: &mut Catalog,
    indexes: &mut IndexCatalog,
    name: &str,
    columns: Vec<ColumnDef>,
    primary_key: String,
    foreign_keys: Vec<ForeignKeyDef>,
) -> DbResult<()> {
    if catalog.contains_table(name) {
        return Err(DbError::Schema(format!("table '{name}' already exists")));
    }

    let mut mapped = Vec::with_capacity(columns.len());
    for col in &columns {
        let ty = SqlType::parse(&col.ty).ok_or_else(|| {
            DbError::Schema(format!(
                "invalid column type '{}' for column '{}'",
                col.ty, col.name
            ))
        })?;
        mapped.push(Column::new(col.name.clone(), ty));
    }

    // Foreign keys may reference the table being created (self-reference).
    for fk in &foreign_keys {
        let (ref_columns, ref_table_display): (Vec<&Column>, &str) =
            if fk.ref_table.eq_ignore_ascii_case(name) {
                (mapped.iter().collect(), name)
            } else {
                let ref_def = catalog.table(&fk.ref_table).map_err(|_| {
                    DbError::Schema(format!(
                        "referenced table '{}' in foreign key does not exist",
                        fk.ref_table
                    ))
                })?;
                (ref_def.columns.iter().collect(), ref_def.name.as_str())
            };
        if !ref_columns
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(&fk.ref_column))
        {
            return Err(DbError::Schema(format!(
                "referenced column '{}' in table '{ref_table_display}' does not exist",
                fk.ref_column
            )));
        }
    }

    let table = TableDef::try_new(
        name,
        mapped,
        primary_key.clone(),
        foreign_keys
            .into_iter()
            .map(|fk| ForeignKey {
                column: fk.column,
                ref_table: fk.ref_table,
                ref_column: fk.ref_column,
            })
            .collect(),
    )?;
    catalog.add_table(table)?;

    indexes.ensure_table(catalog.table(name)?.name.as_str());
    indexes.create(catalog.table(name)?, &primary_key, None)?;
    Ok(())
}

/// Drop a table unless another table's foreign keys reference it.
pub fn drop_table(catalog: &mut Catalog, indexes: &mut IndexCatalog, name: &str) -> DbResult<()> {
    catalog.table(name)?;
    if let Some(referrer) = catalog.referencing_table(name) {
        return Err(DbError::Schema(format!(
            "cannot drop table '{name}': it is referenced by '{}'",
            referrer.name
        )));
    }
    let removed = catalog.remove_table(name)?;
    indexes.remove_table(&removed.name);
    Ok(())
}

/// Create (or rebuild) an index on a column. An existing index on the
/// column keeps its name; otherwise the given name or the
/// `{table}_{column}_idx` default is used.
pub fn create_index(
    catalog: &Catalog,
    indexes: &mut IndexCatalog,
    table: &str,
    column: &str,
    name: Option<String>,
) -> DbResult<()> {
    let def = catalog.table(table)?;
    indexes.ensure_table(&def.name);
    indexes.create(def, column, name)
}

/// Drop an index by name, searching every table.
pub fn drop_index(indexes: &mut IndexCatalog, name: &str) -> DbResult<()> {
    indexes.drop_by_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Value;

    fn col(name: &str, ty: &str) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            ty: ty.into(),
        }
    }

    fn fresh() -> (Catalog, IndexCatalog) {
        (Catalog::new(), IndexCatalog::new())
    }

    fn users(catalog: &mut Catalog, indexes: &mut IndexCatalog) {
        create_table(
            catalog,
            indexes,
            "Users",
            vec![col("UserID", "INT"), col("UserName", "STRING")],
            "UserID".into(),
            vec![],
        )
        .unwrap();
    }

    #[test]
    fn create_table_registers_pk_index() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);

        assert!(catalog.contains_table("Users"));
        let index = indexes.index("Users", "UserID").unwrap();
        assert_eq!(index.name, "Users_UserID_idx");
        assert!(index.is_empty());
    }

    #[test]
    fn create_table_rejects_duplicates_and_bad_types() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);

        let err = create_table(
            &mut catalog,
            &mut indexes,
            "Users",
            vec![col("x", "INT")],
            "x".into(),
            vec![],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("already exists"));

        let err = create_table(
            &mut catalog,
            &mut indexes,
            "Bad",
            vec![col("x", "BLOB")],
            "x".into(),
            vec![],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("invalid column type"));
    }

    #[test]
    fn create_table_validates_foreign_key_targets() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);

        let err = create_table(
            &mut catalog,
            &mut indexes,
            "Orders",
            vec![col("OrderID", "INT"), col("UserID", "INT")],
            "OrderID".into(),
            vec![ForeignKeyDef {
                column: "UserID".into(),
                ref_table: "Ghosts".into(),
                ref_column: "id".into(),
            }],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("referenced table"));

        let err = create_table(
            &mut catalog,
            &mut indexes,
            "Orders",
            vec![col("OrderID", "INT"), col("UserID", "INT")],
            "OrderID".into(),
            vec![ForeignKeyDef {
                column: "UserID".into(),
                ref_table: "Users".into(),
                ref_column: "Ghost".into(),
            }],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("referenced column"));
    }

    #[test]
    fn self_referencing_foreign_key_is_allowed() {
        let (mut catalog, mut indexes) = fresh();
        create_table(
            &mut catalog,
            &mut indexes,
            "Employees",
            vec![col("id", "INT"), col("manager_id", "INT")],
            "id".into(),
            vec![ForeignKeyDef {
                column: "manager_id".into(),
                ref_table: "Employees".into(),
                ref_column: "id".into(),
            }],
        )
        .unwrap();
        assert!(catalog.contains_table("Employees"));
    }

    #[test]
    fn drop_table_blocked_by_referent() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);
        create_table(
            &mut catalog,
            &mut indexes,
            "Orders",
            vec![col("OrderID", "INT"), col("UserID", "INT")],
            "OrderID".into(),
            vec![ForeignKeyDef {
                column: "UserID".into(),
                ref_table: "Users".into(),
                ref_column: "UserID".into(),
            }],
        )
        .unwrap();

        let err = drop_table(&mut catalog, &mut indexes, "Users").unwrap_err();
        assert!(format!("{err}").contains("referenced by 'Orders'"));
        assert!(catalog.contains_table("Users"));

        drop_table(&mut catalog, &mut indexes, "Orders").unwrap();
        drop_table(&mut catalog, &mut indexes, "Users").unwrap();
        assert!(indexes.index("Users", "UserID").is_none());
    }

    #[test]
    fn create_index_builds_from_existing_rows() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);
        catalog.table_mut("Users").unwrap().rows.push(common::Row::new(vec![
            Value::Int(1),
            Value::Str("Alice".into()),
        ]));

        create_index(&catalog, &mut indexes, "Users", "UserName", Some("by_name".into()))
            .unwrap();
        let index = indexes.index("Users", "UserName").unwrap();
        assert_eq!(index.rows_for(&Value::Str("Alice".into())), Some(&[0usize][..]));
    }

    #[test]
    fn create_index_on_missing_column_fails() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);
        let err =
            create_index(&catalog, &mut indexes, "Users", "Ghost", None).unwrap_err();
        assert!(matches!(err, DbError::Schema(_)));
    }

    #[test]
    fn drop_index_by_name() {
        let (mut catalog, mut indexes) = fresh();
        users(&mut catalog, &mut indexes);
        create_index(&catalog, &mut indexes, "Users", "UserName", None).unwrap();

        drop_index(&mut indexes, "Users_UserName_idx").unwrap();
        assert!(indexes.index("Users", "UserName").is_none());
        assert!(drop_index(&mut indexes, "Users_UserName_idx").is_err());
    }
}
