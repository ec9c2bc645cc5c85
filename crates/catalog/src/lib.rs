use ahash::RandomState;
use common::{DbError, DbResult, Row};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::SqlType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Describes a logical column within a table schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: SqlType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Foreign key constraint: a local column referencing another table's column.
/// Validated on insert and on updates to the local column; NULL values are
/// exempt. The referenced table cannot be dropped while the constraint exists.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// A table: ordered columns, the required primary key column, foreign keys,
/// and the row store itself. Rows are positional tuples in column order;
/// the zero-based position is the row id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: String,
    pub foreign_keys: Vec<ForeignKey>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    #[serde(default)]
    name_to_ordinal: Map<String, usize>,
}

impl TableDef {
    /// Build a table definition, validating the schema shape: at least one
    /// column, no duplicate column names, primary key and foreign key local
    /// columns drawn from the column list.
    pub fn try_new(
        name: impl Into<String>,
        columns: Vec<Column>,
        primary_key: impl Into<String>,
        foreign_keys: Vec<ForeignKey>,
    ) -> DbResult<Self> {
        let name = name.into();
        let primary_key = primary_key.into();
        if columns.is_empty() {
            return Err(DbError::Schema(format!(
                "table '{name}' must contain at least one column"
            )));
        }
        let mut table = Self {
            name,
            columns,
            primary_key,
            foreign_keys,
            rows: Vec::new(),
            name_to_ordinal: Map::default(),
        };
        table.rebuild_lookup()?;
        if table.column_index(&table.primary_key).is_none() {
            return Err(DbError::Schema(format!(
                "primary key '{}' is not defined in the columns of table '{}'",
                table.primary_key, table.name
            )));
        }
        for fk in &table.foreign_keys {
            if table.column_index(&fk.column).is_none() {
                return Err(DbError::Schema(format!(
                    "foreign key column '{}' is not defined in table '{}'",
                    fk.column, table.name
                )));
            }
        }
        Ok(table)
    }

    /// Rebuild the name→ordinal lookup; rejects duplicate column names.
    /// Called after construction and after deserialization.
    pub fn rebuild_lookup(&mut self) -> DbResult<()> {
        self.name_to_ordinal.clear();
        for (idx, column) in self.columns.iter().enumerate() {
            if self
                .name_to_ordinal
                .insert(column.name.to_ascii_lowercase(), idx)
                .is_some()
            {
                return Err(DbError::Schema(format!(
                    "duplicate column '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Ordinal for a column name (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.name_to_ordinal
            .get(&name.to_ascii_lowercase())
            .copied()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn column_type(&self, ordinal: usize) -> Option<SqlType> {
        self.columns.get(ordinal).map(|c| c.ty)
    }

    /// Column labels in declaration order, display case preserved.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Ordinal of the primary key column. Guaranteed present by `try_new`.
    pub fn pk_ordinal(&self) -> DbResult<usize> {
        self.column_index(&self.primary_key).ok_or_else(|| {
            DbError::Schema(format!(
                "primary key '{}' is not defined in the columns of table '{}'",
                self.primary_key, self.name
            ))
        })
    }
}

/// The in-memory catalog: every table with its metadata and rows, in
/// creation order, mirrored to disk as the database snapshot. The lookup
/// map is rebuilt on load; iteration order never depends on a hash map.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    tables: Vec<TableDef>,
    #[serde(skip)]
    #[serde(default)]
    table_lookup: Map<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            table_lookup: Map::default(),
        }
    }

    /// Rebuild every lookup structure after deserialization.
    pub fn rebuild_lookups(&mut self) -> DbResult<()> {
        self.table_lookup.clear();
        for (idx, table) in self.tables.iter_mut().enumerate() {
            table.rebuild_lookup()?;
            self.table_lookup
                .insert(table.name.to_ascii_lowercase(), idx);
        }
        Ok(())
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table_lookup.contains_key(&name.to_ascii_lowercase())
    }

    pub fn table(&self, name: &str) -> DbResult<&TableDef> {
        self.table_lookup
            .get(&name.to_ascii_lowercase())
            .and_then(|idx| self.tables.get(*idx))
            .ok_or_else(|| DbError::Schema(format!("table '{name}' does not exist")))
    }

    pub fn table_mut(&mut self, name: &str) -> DbResult<&mut TableDef> {
        let idx = *self
            .table_lookup
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| DbError::Schema(format!("table '{name}' does not exist")))?;
        self.tables
            .get_mut(idx)
            .ok_or_else(|| DbError::Schema(format!("table '{name}' does not exist")))
    }

    /// Register a new table. Fails on a duplicate name.
    pub fn add_table(&mut self, table: TableDef) -> DbResult<()> {
        if self.contains_table(&table.name) {
            return Err(DbError::Schema(format!(
                "table '{}' already exists",
                table.name
            )));
        }
        self.table_lookup
            .insert(table.name.to_ascii_lowercase(), self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    /// Remove a table, returning its definition.
    pub fn remove_table(&mut self, name: &str) -> DbResult<TableDef> {
        let idx = *self
            .table_lookup
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| DbError::Schema(format!("table '{name}' does not exist")))?;
        let removed = self.tables.remove(idx);
        self.table_lookup.clear();
        for (idx, table) in self.tables.iter().enumerate() {
            self.table_lookup
                .insert(table.name.to_ascii_lowercase(), idx);
        }
        Ok(removed)
    }

    /// First table (other than the named one) whose foreign keys reference it.
    pub fn referencing_table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|table| {
            !table.name.eq_ignore_ascii_case(name)
                && table
                    .foreign_keys
                    .iter()
                    .any(|fk| fk.ref_table.eq_ignore_ascii_case(name))
        })
    }

    /// Immutable iterator over all tables in creation order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use types::Value;

    fn users() -> TableDef {
        TableDef::try_new(
            "Users",
            vec![
                Column::new("UserID", SqlType::Int),
                Column::new("UserName", SqlType::Str),
                Column::new("Balance", SqlType::Double),
            ],
            "UserID",
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn create_and_lookup_table() {
        let mut catalog = Catalog::new();
        catalog.add_table(users()).unwrap();

        let table = catalog.table("Users").unwrap();
        assert_eq!(table.column_index("UserName"), Some(1));
        assert_eq!(table.column_type(0), Some(SqlType::Int));
        assert_eq!(table.pk_ordinal().unwrap(), 0);

        // lookups are case-insensitive, display case is preserved
        assert_eq!(catalog.table("users").unwrap().name, "Users");
        assert_eq!(table.column("userid").unwrap().name, "UserID");
    }

    #[test]
    fn rejects_duplicate_tables() {
        let mut catalog = Catalog::new();
        catalog.add_table(users()).unwrap();
        let err = catalog.add_table(users()).unwrap_err();
        assert!(format!("{err}").contains("already exists"));
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = TableDef::try_new(
            "Bad",
            vec![
                Column::new("id", SqlType::Int),
                Column::new("id", SqlType::Int),
            ],
            "id",
            vec![],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("duplicate column"));
    }

    #[test]
    fn rejects_primary_key_outside_columns() {
        let err = TableDef::try_new(
            "Bad",
            vec![Column::new("id", SqlType::Int)],
            "missing",
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Schema(_)));
    }

    #[test]
    fn rejects_foreign_key_on_unknown_local_column() {
        let err = TableDef::try_new(
            "Orders",
            vec![Column::new("OrderID", SqlType::Int)],
            "OrderID",
            vec![ForeignKey {
                column: "UserID".into(),
                ref_table: "Users".into(),
                ref_column: "UserID".into(),
            }],
        )
        .unwrap_err();
        assert!(format!("{err}").contains("foreign key column"));
    }

    #[test]
    fn referencing_table_ignores_self_references() {
        let mut catalog = Catalog::new();
        catalog.add_table(users()).unwrap();
        catalog
            .add_table(
                TableDef::try_new(
                    "Employees",
                    vec![
                        Column::new("id", SqlType::Int),
                        Column::new("manager_id", SqlType::Int),
                    ],
                    "id",
                    vec![ForeignKey {
                        column: "manager_id".into(),
                        ref_table: "Employees".into(),
                        ref_column: "id".into(),
                    }],
                )
                .unwrap(),
            )
            .unwrap();

        assert!(catalog.referencing_table("Employees").is_none());
        assert!(catalog.referencing_table("Users").is_none());
    }

    #[test]
    fn remove_table_reindexes_the_rest() {
        let mut catalog = Catalog::new();
        catalog.add_table(users()).unwrap();
        catalog
            .add_table(
                TableDef::try_new(
                    "Orders",
                    vec![Column::new("OrderID", SqlType::Int)],
                    "OrderID",
                    vec![],
                )
                .unwrap(),
            )
            .unwrap();

        catalog.remove_table("Users").unwrap();
        assert!(catalog.table("Users").is_err());
        assert_eq!(catalog.table("Orders").unwrap().name, "Orders");
    }

    #[test]
    fn rows_live_on_the_table() {
        let mut catalog = Catalog::new();
        catalog.add_table(users()).unwrap();
        let table = catalog.table_mut("Users").unwrap();
        table.rows.push(Row::new(vec![
            Value::Int(1),
            Value::Str("Alice".into()),
            Value::Double(10.0),
        ]));
        assert_eq!(catalog.table("Users").unwrap().rows.len(), 1);
    }
}
