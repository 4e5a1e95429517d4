// Copyright 2020 - present Rex Calloway
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Row storage (component C): a table's rows plus the hash indexes backing
//! its PRIMARY KEY and UNIQUE columns, durable as one JSON file per table.

use catalog::TableDef;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use types::{SqlType, Value};

#[derive(Debug, PartialEq, Eq)]
pub enum StorageError {
    PrimaryKeyViolation { column: String, value: String },
    UniqueViolation { column: String, value: String },
    Io(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::PrimaryKeyViolation { column, value } => {
                write!(f, "PRIMARY KEY constraint failed: duplicate value {} for column {}", value, column)
            }
            StorageError::UniqueViolation { column, value } => {
                write!(f, "UNIQUE constraint failed: duplicate value {} for column {}", value, column)
            }
            StorageError::Io(message) => write!(f, "{}", message),
        }
    }
}

/// One unique-column index: value -> row id.
struct Index {
    column: String,
    primary_key: bool,
    entries: HashMap<Value, usize>,
}

pub struct Table {
    def: TableDef,
    path: PathBuf,
    rows: Vec<Option<Vec<Value>>>,
    indexes: Vec<Index>,
}

impl Table {
    pub fn load(def: TableDef, dir: impl AsRef<Path>) -> Result<Table, StorageError> {
        let path = dir.as_ref().join(format!("{}.json", def.name));
        let rows = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| StorageError::Io(e.to_string()))?;
            let raw: Vec<serde_json::Map<String, serde_json::Value>> =
                serde_json::from_str(&content).map_err(|e| StorageError::Io(e.to_string()))?;
            raw.into_iter()
                .map(|obj| {
                    def.columns
                        .iter()
                        .map(|c| {
                            let json = obj.get(&c.name).cloned().unwrap_or(serde_json::Value::Null);
                            Value::from_json(&json, c.sql_type).map_err(|e| StorageError::Io(e.to_string()))
                        })
                        .collect::<Result<Vec<Value>, StorageError>>()
                        .map(Some)
                })
                .collect::<Result<Vec<Option<Vec<Value>>>, StorageError>>()?
        } else {
            Vec::new()
        };

        let mut indexes: Vec<Index> = def
            .unique_columns()
            .map(|c| Index {
                column: c.name.clone(),
                primary_key: c.primary_key,
                entries: HashMap::new(),
            })
            .collect();
        for (row_id, row) in rows.iter().enumerate() {
            if let Some(row) = row {
                for index in indexes.iter_mut() {
                    let col = def.column_index(&index.column).expect("indexed column must exist");
                    index.entries.insert(row[col].clone(), row_id);
                }
            }
        }

        Ok(Table { def, path, rows, indexes })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &TableDef {
        &self.def
    }

    pub fn rows(&self) -> impl Iterator<Item = &Vec<Value>> {
        self.rows.iter().filter_map(|row| row.as_ref())
    }

    /// Appends a row, after checking every unique/primary-key column
    /// against the values already stored (Invariant 1).
    pub fn insert(&mut self, row: Vec<Value>) -> Result<(), StorageError> {
        for index in &self.indexes {
            let col = self.def.column_index(&index.column).expect("indexed column must exist");
            let value = &row[col];
            if !value.is_null() && index.entries.contains_key(value) {
                return Err(violation(index, value));
            }
        }
        let row_id = self.rows.len();
        for index in self.indexes.iter_mut() {
            let col = self.def.column_index(&index.column).expect("indexed column must exist");
            let value = &row[col];
            if !value.is_null() {
                index.entries.insert(value.clone(), row_id);
            }
        }
        self.rows.push(Some(row));
        self.persist()
    }

    /// Overwrites the cells named in `assignments` on every row for which
    /// `predicate` returns true. Every reassigned unique value across every
    /// matching row is checked before any index entry is mutated, so a
    /// constraint violation on row N never leaves row N-1 half updated.
    pub fn update<P>(&mut self, assignments: &[(usize, Value)], predicate: P) -> Result<usize, StorageError>
    where
        P: Fn(&[Value]) -> bool,
    {
        let matching: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(id, row)| row.as_ref().filter(|r| predicate(r)).map(|_| id))
            .collect();

        for index in &self.indexes {
            let col = self.def.column_index(&index.column).expect("indexed column must exist");
            if let Some((_, new_value)) = assignments.iter().find(|(c, _)| *c == col) {
                if new_value.is_null() {
                    continue;
                }
                if matching.len() > 1 {
                    return Err(violation(index, new_value));
                }
                for &row_id in &matching {
                    if let Some(existing_row_id) = index.entries.get(new_value) {
                        if *existing_row_id != row_id {
                            return Err(violation(index, new_value));
                        }
                    }
                }
            }
        }

        for &row_id in &matching {
            for index in self.indexes.iter_mut() {
                let col = self.def.column_index(&index.column).expect("indexed column must exist");
                if let Some((_, new_value)) = assignments.iter().find(|(c, _)| *c == col) {
                    let old_value = self.rows[row_id].as_ref().unwrap()[col].clone();
                    if !old_value.is_null() {
                        index.entries.remove(&old_value);
                    }
                    if !new_value.is_null() {
                        index.entries.insert(new_value.clone(), row_id);
                    }
                }
            }
            let row = self.rows[row_id].as_mut().unwrap();
            for (col, value) in assignments {
                row[*col] = value.clone();
            }
        }

        self.persist()?;
        Ok(matching.len())
    }

    /// Removes every row for which `predicate` returns true and rebuilds
    /// every index from scratch.
    pub fn delete<P>(&mut self, predicate: P) -> Result<usize, StorageError>
    where
        P: Fn(&[Value]) -> bool,
    {
        let mut deleted = 0;
        for row in self.rows.iter_mut() {
            if row.as_ref().map(|r| predicate(r)).unwrap_or(false) {
                *row = None;
                deleted += 1;
            }
        }
        for index in self.indexes.iter_mut() {
            index.entries.clear();
        }
        for (row_id, row) in self.rows.iter().enumerate() {
            if let Some(row) = row {
                for index in self.indexes.iter_mut() {
                    let col = self.def.column_index(&index.column).expect("indexed column must exist");
                    if !row[col].is_null() {
                        index.entries.insert(row[col].clone(), row_id);
                    }
                }
            }
        }
        self.persist()?;
        Ok(deleted)
    }

    fn persist(&self) -> Result<(), StorageError> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> = self
            .rows()
            .map(|row| {
                self.def
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| (col.name.clone(), value.to_json()))
                    .collect()
            })
            .collect();
        let content = serde_json::to_string_pretty(&objects).map_err(|e| StorageError::Io(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        fs::write(&self.path, content).map_err(|e| StorageError::Io(e.to_string()))?;
        log::debug!("table {} persisted to {}", self.def.name, self.path.display());
        Ok(())
    }
}

fn violation(index: &Index, value: &Value) -> StorageError {
    if index.primary_key {
        StorageError::PrimaryKeyViolation {
            column: index.column.clone(),
            value: value.to_string(),
        }
    } else {
        StorageError::UniqueViolation {
            column: index.column.clone(),
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::ColumnDef;
    use tempfile::tempdir;

    fn users_table() -> TableDef {
        TableDef {
            name: "users".to_owned(),
            columns: vec![
                ColumnDef {
                    name: "id".to_owned(),
                    sql_type: SqlType::Int,
                    primary_key: true,
                    unique: false,
                },
                ColumnDef {
                    name: "email".to_owned(),
                    sql_type: SqlType::Text,
                    primary_key: false,
                    unique: true,
                },
            ],
        }
    }

    #[cfg(test)]
    mod insertions {
        use super::*;

        #[test]
        fn inserts_a_row() {
            let dir = tempdir().unwrap();
            let mut table = Table::load(users_table(), dir.path()).unwrap();
            table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
            assert_eq!(table.rows().count(), 1);
        }

        #[test]
        fn rejects_a_duplicate_primary_key() {
            let dir = tempdir().unwrap();
            let mut table = Table::load(users_table(), dir.path()).unwrap();
            table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
            let result = table.insert(vec![Value::Int(1), Value::Text("b@example.com".to_owned())]);
            assert_eq!(
                result,
                Err(StorageError::PrimaryKeyViolation {
                    column: "id".to_owned(),
                    value: "1".to_owned(),
                })
            );
        }

        #[test]
        fn rejects_a_duplicate_unique_value() {
            let dir = tempdir().unwrap();
            let mut table = Table::load(users_table(), dir.path()).unwrap();
            table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
            let result = table.insert(vec![Value::Int(2), Value::Text("a@example.com".to_owned())]);
            assert_eq!(
                result,
                Err(StorageError::UniqueViolation {
                    column: "email".to_owned(),
                    value: "a@example.com".to_owned(),
                })
            );
        }
    }

    #[test]
    fn update_validates_every_matching_row_before_committing_any() {
        let dir = tempdir().unwrap();
        let mut table = Table::load(users_table(), dir.path()).unwrap();
        table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
        table.insert(vec![Value::Int(2), Value::Text("b@example.com".to_owned())]).unwrap();

        let result = table.update(&[(1, Value::Text("b@example.com".to_owned()))], |row| row[0] == Value::Int(1));
        assert!(result.is_err());
        let rows: Vec<_> = table.rows().cloned().collect();
        assert_eq!(rows[0][1], Value::Text("a@example.com".to_owned()));
    }

    #[test]
    fn update_rejects_two_matching_rows_assigned_the_same_unique_value() {
        let dir = tempdir().unwrap();
        let mut table = Table::load(users_table(), dir.path()).unwrap();
        table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
        table.insert(vec![Value::Int(2), Value::Text("b@example.com".to_owned())]).unwrap();

        let result = table.update(&[(1, Value::Text("same@example.com".to_owned()))], |_| true);
        assert!(result.is_err());
        let rows: Vec<_> = table.rows().cloned().collect();
        assert_eq!(rows[0][1], Value::Text("a@example.com".to_owned()));
        assert_eq!(rows[1][1], Value::Text("b@example.com".to_owned()));
    }

    #[test]
    fn delete_removes_matching_rows_and_frees_unique_values() {
        let dir = tempdir().unwrap();
        let mut table = Table::load(users_table(), dir.path()).unwrap();
        table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
        let deleted = table.delete(|row| row[0] == Value::Int(1)).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(table.rows().count(), 0);
        table.insert(vec![Value::Int(2), Value::Text("a@example.com".to_owned())]).unwrap();
        assert_eq!(table.rows().count(), 1);
    }

    #[test]
    fn reloading_a_table_rebuilds_its_indexes() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        {
            let mut table = Table::load(users_table(), &path).unwrap();
            table.insert(vec![Value::Int(1), Value::Text("a@example.com".to_owned())]).unwrap();
        }
        let mut reloaded = Table::load(users_table(), &path).unwrap();
        let result = reloaded.insert(vec![Value::Int(1), Value::Text("c@example.com".to_owned())]);
        assert!(result.is_err());
    }
}
