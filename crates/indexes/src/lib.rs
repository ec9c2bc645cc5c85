//! Ordered secondary indexes: per (table, column), a map from column value
//! to the row ids holding that value, plus a unique user-visible name.
//!
//! Maintenance policy: inserts append the new row id in place; deletes and
//! updates rebuild every index on the table from the compacted data, since
//! compaction reassigns row ids and partial maintenance would drift.

use catalog::TableDef;
use common::{DbError, DbResult, RowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use types::Value;

/// Name given to an index when the statement does not provide one.
pub fn default_index_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_idx")
}

/// One index: value → non-empty list of row ids, ordered by value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OrderedIndex {
    pub name: String,
    tree: BTreeMap<Value, Vec<RowId>>,
}

impl OrderedIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tree: BTreeMap::new(),
        }
    }

    /// Build an index by scanning rows once, binding each cell to its row id.
    pub fn build(name: impl Into<String>, rows: &[common::Row], ordinal: usize) -> Self {
        let mut index = Self::new(name);
        for (row_id, row) in rows.iter().enumerate() {
            if let Some(value) = row.values.get(ordinal) {
                index.insert(value.clone(), row_id);
            }
        }
        index
    }

    pub fn insert(&mut self, value: Value, row_id: RowId) {
        self.tree.entry(value).or_default().push(row_id);
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.tree.contains_key(value)
    }

    pub fn rows_for(&self, value: &Value) -> Option<&[RowId]> {
        self.tree.get(value).map(Vec::as_slice)
    }

    /// Entries in value order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &[RowId])> {
        self.tree.iter().map(|(v, ids)| (v, ids.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// All indexes, keyed table → column. `BTreeMap` keeps serialization
/// deterministic so snapshot round-trips compare key-by-key.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexCatalog {
    tables: BTreeMap<String, BTreeMap<String, OrderedIndex>>,
}

impl IndexCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an (empty) index container for a new table.
    pub fn ensure_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    pub fn remove_table(&mut self, table: &str) {
        self.tables.remove(table);
    }

    pub fn table_indexes(&self, table: &str) -> Option<&BTreeMap<String, OrderedIndex>> {
        self.tables.get(table)
    }

    pub fn index(&self, table: &str, column: &str) -> Option<&OrderedIndex> {
        self.tables.get(table).and_then(|cols| cols.get(column))
    }

    /// Whether any index in any table carries this name.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.tables
            .values()
            .flat_map(|cols| cols.values())
            .any(|index| index.name == name)
    }

    /// Create an index on `column`, scanning the table's rows once. When an
    /// index already exists on the column the tree is rebuilt and the
    /// existing name is preserved; otherwise the provided name (or the
    /// `{table}_{column}_idx` default) is registered, rejecting a name
    /// already used by a different index.
    pub fn create(&mut self, table: &TableDef, column: &str, name: Option<String>) -> DbResult<()> {
        let ordinal = table.column_index(column).ok_or_else(|| {
            DbError::Schema(format!(
                "column '{column}' does not exist in table '{}'",
                table.name
            ))
        })?;
        let column_key = table.columns[ordinal].name.clone();

        let existing_name = self
            .index(&table.name, &column_key)
            .map(|index| index.name.clone());
        let name = match existing_name {
            Some(existing) => existing,
            None => {
                let name = name.unwrap_or_else(|| default_index_name(&table.name, &column_key));
                if self.name_in_use(&name) {
                    return Err(DbError::Schema(format!("index '{name}' already exists")));
                }
                name
            }
        };

        let index = OrderedIndex::build(name, &table.rows, ordinal);
        self.tables
            .entry(table.name.clone())
            .or_default()
            .insert(column_key, index);
        Ok(())
    }

    /// Drop an index by name, searching every (table, column) entry.
    pub fn drop_by_name(&mut self, name: &str) -> DbResult<()> {
        for columns in self.tables.values_mut() {
            let found = columns
                .iter()
                .find(|(_, index)| index.name == name)
                .map(|(column, _)| column.clone());
            if let Some(column) = found {
                columns.remove(&column);
                return Ok(());
            }
        }
        Err(DbError::Schema(format!(
            "no index found with the name '{name}'"
        )))
    }

    /// Register a freshly appended row in every index on the table.
    pub fn note_insert(&mut self, table: &TableDef, row_id: RowId) -> DbResult<()> {
        let Some(columns) = self.tables.get_mut(&table.name) else {
            return Ok(());
        };
        let row = table.rows.get(row_id).ok_or_else(|| {
            DbError::Value(format!("row id {row_id} out of bounds in '{}'", table.name))
        })?;
        for (column, index) in columns.iter_mut() {
            let Some(ordinal) = table.column_index(column) else {
                continue;
            };
            index.insert(row.values[ordinal].clone(), row_id);
        }
        Ok(())
    }

    /// Rebuild every index on the table from its current rows, preserving
    /// index names. Used after any compacting mutation.
    pub fn rebuild_table(&mut self, table: &TableDef) {
        let Some(columns) = self.tables.get_mut(&table.name) else {
            return;
        };
        for (column, index) in columns.iter_mut() {
            let Some(ordinal) = table.column_index(column) else {
                continue;
            };
            *index = OrderedIndex::build(index.name.clone(), &table.rows, ordinal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Column;
    use common::Row;
    use pretty_assertions::assert_eq;
    use types::SqlType;

    fn users_with_rows() -> TableDef {
        let mut table = TableDef::try_new(
            "Users",
            vec![
                Column::new("UserID", SqlType::Int),
                Column::new("UserName", SqlType::Str),
            ],
            "UserID",
            vec![],
        )
        .unwrap();
        table.rows = vec![
            Row::new(vec![Value::Int(1), Value::Str("Alice".into())]),
            Row::new(vec![Value::Int(2), Value::Str("Bob".into())]),
            Row::new(vec![Value::Int(3), Value::Str("Alice".into())]),
        ];
        table
    }

    #[test]
    fn build_binds_values_to_row_ids() {
        let table = users_with_rows();
        let index = OrderedIndex::build("u_name", &table.rows, 1);
        assert_eq!(
            index.rows_for(&Value::Str("Alice".into())),
            Some(&[0usize, 2][..])
        );
        assert_eq!(index.rows_for(&Value::Str("Bob".into())), Some(&[1usize][..]));
        assert_eq!(index.rows_for(&Value::Str("Cara".into())), None);
    }

    #[test]
    fn iteration_is_value_ordered() {
        let table = users_with_rows();
        let index = OrderedIndex::build("u_id", &table.rows, 0);
        let keys: Vec<&Value> = index.iter().map(|(v, _)| v).collect();
        assert_eq!(keys, vec![&Value::Int(1), &Value::Int(2), &Value::Int(3)]);
    }

    #[test]
    fn create_uses_the_default_name() {
        let table = users_with_rows();
        let mut indexes = IndexCatalog::new();
        indexes.create(&table, "UserName", None).unwrap();
        assert_eq!(
            indexes.index("Users", "UserName").unwrap().name,
            "Users_UserName_idx"
        );
    }

    #[test]
    fn recreate_rebuilds_but_keeps_the_name() {
        let mut table = users_with_rows();
        let mut indexes = IndexCatalog::new();
        indexes
            .create(&table, "UserName", Some("by_name".into()))
            .unwrap();

        table.rows.pop();
        indexes.create(&table, "UserName", Some("ignored".into())).unwrap();

        let index = indexes.index("Users", "UserName").unwrap();
        assert_eq!(index.name, "by_name");
        assert_eq!(index.rows_for(&Value::Str("Alice".into())), Some(&[0usize][..]));
    }

    #[test]
    fn duplicate_names_are_rejected_across_tables() {
        let table = users_with_rows();
        let mut indexes = IndexCatalog::new();
        indexes
            .create(&table, "UserID", Some("shared".into()))
            .unwrap();
        let err = indexes
            .create(&table, "UserName", Some("shared".into()))
            .unwrap_err();
        assert!(format!("{err}").contains("already exists"));
    }

    #[test]
    fn drop_by_name_searches_all_tables() {
        let table = users_with_rows();
        let mut indexes = IndexCatalog::new();
        indexes.create(&table, "UserName", None).unwrap();

        indexes.drop_by_name("Users_UserName_idx").unwrap();
        assert!(indexes.index("Users", "UserName").is_none());

        let err = indexes.drop_by_name("Users_UserName_idx").unwrap_err();
        assert!(format!("{err}").contains("no index found"));
    }

    #[test]
    fn note_insert_appends_to_every_index() {
        let mut table = users_with_rows();
        let mut indexes = IndexCatalog::new();
        indexes.create(&table, "UserID", None).unwrap();
        indexes.create(&table, "UserName", None).unwrap();

        table
            .rows
            .push(Row::new(vec![Value::Int(4), Value::Str("Bob".into())]));
        indexes.note_insert(&table, 3).unwrap();

        assert_eq!(
            indexes
                .index("Users", "UserName")
                .unwrap()
                .rows_for(&Value::Str("Bob".into())),
            Some(&[1usize, 3][..])
        );
        assert_eq!(
            indexes
                .index("Users", "UserID")
                .unwrap()
                .rows_for(&Value::Int(4)),
            Some(&[3usize][..])
        );
    }

    #[test]
    fn rebuild_reflects_compacted_row_ids() {
        let mut table = users_with_rows();
        let mut indexes = IndexCatalog::new();
        indexes.create(&table, "UserName", None).unwrap();

        // drop the middle row; Alice at position 2 becomes row id 1
        table.rows.remove(1);
        indexes.rebuild_table(&table);

        assert_eq!(
            indexes
                .index("Users", "UserName")
                .unwrap()
                .rows_for(&Value::Str("Alice".into())),
            Some(&[0usize, 1][..])
        );
        assert_eq!(
            indexes
                .index("Users", "UserName")
                .unwrap()
                .rows_for(&Value::Str("Bob".into())),
            None
        );
    }
}
