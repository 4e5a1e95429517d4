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

//! The catalog (component B): table definitions and constraints, durable
//! as a single human-readable `catalog.json` file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use types::SqlType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Every column participating in a uniqueness check, primary key first.
    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.primary_key || c.unique)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CatalogError {
    TableAlreadyExists(String),
    DuplicatePrimaryKey,
    Io(String),
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::TableAlreadyExists(name) => write!(f, "Table {} already exists", name),
            CatalogError::DuplicatePrimaryKey => write!(f, "Table cannot have more than one PRIMARY KEY column"),
            CatalogError::Io(message) => write!(f, "{}", message),
        }
    }
}

/// The on-disk shape of one column: `{"name": ..., "type": ...}`, dropping
/// the constraint flags that the schema-level `primary_key`/`unique` fields
/// carry instead.
#[derive(Debug, Serialize, Deserialize)]
struct StoredColumn {
    name: String,
    #[serde(rename = "type")]
    sql_type: SqlType,
}

/// The on-disk shape of one table's schema: columns plus the constraints
/// lifted to the schema level, per the catalog file contract.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTable {
    columns: Vec<StoredColumn>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    primary_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    unique: Vec<String>,
}

impl From<&TableDef> for StoredTable {
    fn from(def: &TableDef) -> StoredTable {
        StoredTable {
            columns: def
                .columns
                .iter()
                .map(|c| StoredColumn {
                    name: c.name.clone(),
                    sql_type: c.sql_type,
                })
                .collect(),
            primary_key: def.columns.iter().find(|c| c.primary_key).map(|c| c.name.clone()),
            unique: def.columns.iter().filter(|c| c.unique).map(|c| c.name.clone()).collect(),
        }
    }
}

fn table_def_from_stored(name: String, stored: StoredTable) -> TableDef {
    let columns = stored
        .columns
        .into_iter()
        .map(|c| ColumnDef {
            primary_key: stored.primary_key.as_deref() == Some(c.name.as_str()),
            unique: stored.unique.iter().any(|u| u == &c.name),
            name: c.name,
            sql_type: c.sql_type,
        })
        .collect();
    TableDef { name, columns }
}

/// All known table definitions, loaded from and saved back to a single
/// JSON file on every mutation.
pub struct Catalog {
    path: PathBuf,
    tables: HashMap<String, TableDef>,
}

impl Catalog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Catalog, CatalogError> {
        let path = path.into();
        let tables = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| CatalogError::Io(e.to_string()))?;
            let file: HashMap<String, StoredTable> = serde_json::from_str(&content).map_err(|e| CatalogError::Io(e.to_string()))?;
            file.into_iter().map(|(name, stored)| (name.clone(), table_def_from_stored(name, stored))).collect()
        } else {
            HashMap::new()
        };
        Ok(Catalog { path, tables })
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn create_table(&mut self, table: TableDef) -> Result<(), CatalogError> {
        if self.tables.contains_key(&table.name) {
            return Err(CatalogError::TableAlreadyExists(table.name));
        }
        if table.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(CatalogError::DuplicatePrimaryKey);
        }
        log::debug!("creating table {}", table.name);
        self.tables.insert(table.name.clone(), table);
        self.persist()
    }

    fn persist(&self) -> Result<(), CatalogError> {
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        let mut file = serde_json::Map::new();
        for name in names {
            let stored = StoredTable::from(&self.tables[name]);
            file.insert(name.clone(), serde_json::to_value(&stored).map_err(|e| CatalogError::Io(e.to_string()))?);
        }
        let content = serde_json::to_string_pretty(&file).map_err(|e| CatalogError::Io(e.to_string()))?;
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CatalogError::Io(e.to_string()))?;
            }
        }
        fs::write(&self.path, content).map_err(|e| CatalogError::Io(e.to_string()))?;
        log::debug!("catalog persisted to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn column(name: &str, sql_type: SqlType) -> ColumnDef {
        ColumnDef {
            name: name.to_owned(),
            sql_type,
            primary_key: false,
            unique: false,
        }
    }

    #[cfg(test)]
    mod table_creation {
        use super::*;

        #[test]
        fn creates_a_new_table() {
            let dir = tempdir().unwrap();
            let mut catalog = Catalog::open(dir.path().join("catalog.json")).unwrap();
            let table = TableDef {
                name: "users".to_owned(),
                columns: vec![column("id", SqlType::Int)],
            };
            assert!(catalog.create_table(table).is_ok());
            assert!(catalog.table_exists("users"));
        }

        #[test]
        fn rejects_a_duplicate_table_name() {
            let dir = tempdir().unwrap();
            let mut catalog = Catalog::open(dir.path().join("catalog.json")).unwrap();
            let table = TableDef {
                name: "users".to_owned(),
                columns: vec![column("id", SqlType::Int)],
            };
            catalog.create_table(table.clone()).unwrap();
            assert_eq!(catalog.create_table(table), Err(CatalogError::TableAlreadyExists("users".to_owned())));
        }

        #[test]
        fn rejects_more_than_one_primary_key() {
            let dir = tempdir().unwrap();
            let mut catalog = Catalog::open(dir.path().join("catalog.json")).unwrap();
            let mut a = column("a", SqlType::Int);
            a.primary_key = true;
            let mut b = column("b", SqlType::Int);
            b.primary_key = true;
            let table = TableDef {
                name: "t".to_owned(),
                columns: vec![a, b],
            };
            assert_eq!(catalog.create_table(table), Err(CatalogError::DuplicatePrimaryKey));
        }
    }

    #[test]
    fn reloads_tables_persisted_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        {
            let mut catalog = Catalog::open(&path).unwrap();
            let table = TableDef {
                name: "users".to_owned(),
                columns: vec![column("id", SqlType::Int)],
            };
            catalog.create_table(table).unwrap();
        }
        let reopened = Catalog::open(&path).unwrap();
        assert!(reopened.table_exists("users"));
    }

    #[test]
    fn persists_primary_key_and_unique_at_the_schema_level() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut catalog = Catalog::open(&path).unwrap();
        let mut id = column("id", SqlType::Int);
        id.primary_key = true;
        let mut email = column("email", SqlType::Text);
        email.unique = true;
        let table = TableDef {
            name: "users".to_owned(),
            columns: vec![id, email],
        };
        catalog.create_table(table).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(raw["users"]["primary_key"], "id");
        assert_eq!(raw["users"]["unique"][0], "email");
        assert_eq!(raw["users"]["columns"][0]["name"], "id");
        assert_eq!(raw["users"]["columns"][0]["type"], "INT");

        let reopened = Catalog::open(&path).unwrap();
        let def = reopened.table("users").unwrap();
        assert!(def.column("id").unwrap().primary_key);
        assert!(def.column("email").unwrap().unique);
    }
}
