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

//! The executor (component E): turns a parsed [`Statement`] into catalog
//! and storage operations, evaluating predicates, joins and projections
//! along the way.

use catalog::{Catalog, CatalogError, ColumnDef, TableDef};
use query_parsing::{Join, Predicate, Projection, QualifiedColumn, Statement};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::Path;
use storage::{StorageError, Table};
use types::{cast, CastError, SqlType, Value};

#[derive(Debug, PartialEq, Eq)]
pub enum ExecError {
    Catalog(CatalogError),
    Storage(StorageError),
    Cast(CastError),
    UnknownColumn(String),
    TableDoesNotExist(String),
    ColumnCountMismatch { expected: usize, actual: usize },
}

impl Display for ExecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Catalog(e) => write!(f, "{}", e),
            ExecError::Storage(e) => write!(f, "{}", e),
            ExecError::Cast(e) => write!(f, "{}", e),
            ExecError::UnknownColumn(c) => write!(f, "Unknown column {}", c),
            ExecError::TableDoesNotExist(t) => write!(f, "Table {} does not exist", t),
            ExecError::ColumnCountMismatch { expected, actual } => {
                write!(f, "Expected {} values, got {}", expected, actual)
            }
        }
    }
}

impl From<CatalogError> for ExecError {
    fn from(e: CatalogError) -> ExecError {
        ExecError::Catalog(e)
    }
}

impl From<StorageError> for ExecError {
    fn from(e: StorageError) -> ExecError {
        ExecError::Storage(e)
    }
}

impl From<CastError> for ExecError {
    fn from(e: CastError) -> ExecError {
        ExecError::Cast(e)
    }
}

#[derive(Debug)]
pub enum QueryResult {
    TableCreated,
    Inserted(Vec<(String, Value)>),
    Selected { columns: Vec<String>, rows: Vec<Vec<Value>> },
    Updated(usize),
    Deleted(usize),
}

/// Owns no state itself: every call is handed the catalog and the open
/// tables it should read or mutate.
pub struct Executor;

impl Executor {
    pub fn execute(
        statement: Statement,
        catalog: &mut Catalog,
        tables: &mut HashMap<String, Table>,
        data_dir: &Path,
    ) -> Result<QueryResult, ExecError> {
        match statement {
            Statement::CreateTable { table, columns } => Self::create_table(table, columns, catalog),
            Statement::Insert { table, columns, values } => {
                Self::insert(&table, columns, values, catalog, tables, data_dir)
            }
            Statement::Select {
                table,
                join,
                projection,
                filter,
            } => Self::select(&table, join, projection, filter, catalog, tables, data_dir),
            Statement::Update {
                table,
                assignments,
                filter,
            } => Self::update(&table, assignments, filter, catalog, tables, data_dir),
            Statement::Delete { table, filter } => Self::delete(&table, filter, catalog, tables, data_dir),
        }
    }

    fn create_table(
        table: String,
        columns: Vec<query_parsing::ColumnSpec>,
        catalog: &mut Catalog,
    ) -> Result<QueryResult, ExecError> {
        let def = TableDef {
            name: table,
            columns: columns
                .into_iter()
                .map(|c| ColumnDef {
                    name: c.name,
                    sql_type: c.sql_type,
                    primary_key: c.primary_key,
                    unique: c.unique,
                })
                .collect(),
        };
        catalog.create_table(def)?;
        Ok(QueryResult::TableCreated)
    }

    fn open_table<'a>(
        name: &str,
        catalog: &Catalog,
        tables: &'a mut HashMap<String, Table>,
        data_dir: &Path,
    ) -> Result<&'a mut Table, ExecError> {
        if !tables.contains_key(name) {
            let def = catalog.table(name).ok_or_else(|| ExecError::TableDoesNotExist(name.to_owned()))?;
            let table = Table::load(def.clone(), data_dir)?;
            tables.insert(name.to_owned(), table);
        }
        Ok(tables.get_mut(name).expect("just inserted"))
    }

    fn insert(
        table: &str,
        columns: Option<Vec<String>>,
        values: Vec<Value>,
        catalog: &mut Catalog,
        tables: &mut HashMap<String, Table>,
        data_dir: &Path,
    ) -> Result<QueryResult, ExecError> {
        let def = catalog.table(table).ok_or_else(|| ExecError::TableDoesNotExist(table.to_owned()))?.clone();
        let order: Vec<usize> = match &columns {
            Some(names) => names
                .iter()
                .map(|name| def.column_index(name).ok_or_else(|| ExecError::UnknownColumn(name.clone())))
                .collect::<Result<_, _>>()?,
            None => (0..def.columns.len()).collect(),
        };
        if values.len() != order.len() {
            return Err(ExecError::ColumnCountMismatch {
                expected: order.len(),
                actual: values.len(),
            });
        }

        let mut full = vec![Value::Null; def.columns.len()];
        for (value, &col) in values.into_iter().zip(order.iter()) {
            full[col] = cast(value, def.columns[col].sql_type)?;
        }

        let handle = Self::open_table(table, catalog, tables, data_dir)?;
        handle.insert(full.clone())?;

        let row = def.columns.iter().map(|c| c.name.clone()).zip(full).collect();
        Ok(QueryResult::Inserted(row))
    }

    fn select(
        table: &str,
        join: Option<Join>,
        projection: Projection,
        filter: Option<Predicate>,
        catalog: &mut Catalog,
        tables: &mut HashMap<String, Table>,
        data_dir: &Path,
    ) -> Result<QueryResult, ExecError> {
        let left_def = catalog.table(table).ok_or_else(|| ExecError::TableDoesNotExist(table.to_owned()))?.clone();

        match join {
            None => {
                let resolved = resolve_predicate(&left_def, filter.as_deref())?;
                let handle = Self::open_table(table, catalog, tables, data_dir)?;
                let columns: Vec<String> = left_def.columns.iter().map(|c| c.name.clone()).collect();
                let mut result_rows = Vec::new();
                for row in handle.rows() {
                    if row_matches(row, &resolved) {
                        result_rows.push(row.clone());
                    }
                }
                let (out_columns, out_rows) = project(&columns, result_rows, &projection, None)?;
                Ok(QueryResult::Selected {
                    columns: out_columns,
                    rows: out_rows,
                })
            }
            Some(join) => {
                let right_def = catalog
                    .table(&join.table)
                    .ok_or_else(|| ExecError::TableDoesNotExist(join.table.clone()))?
                    .clone();

                let left_idx = resolve_column(&join.left, table, &left_def)?;
                let right_idx = resolve_column(&join.right, &join.table, &right_def)?;

                let left_rows: Vec<Vec<Value>> = Self::open_table(table, catalog, tables, data_dir)?.rows().cloned().collect();
                let right_rows: Vec<Vec<Value>> =
                    Self::open_table(&join.table, catalog, tables, data_dir)?.rows().cloned().collect();

                let qualified: Vec<String> = left_def
                    .columns
                    .iter()
                    .map(|c| format!("{}.{}", table, c.name))
                    .chain(right_def.columns.iter().map(|c| format!("{}.{}", join.table, c.name)))
                    .collect();

                let mut combined_rows = Vec::new();
                for left_row in &left_rows {
                    for right_row in &right_rows {
                        if left_row[left_idx].to_string() == right_row[right_idx].to_string() {
                            let mut combined = left_row.clone();
                            combined.extend(right_row.clone());
                            combined_rows.push(combined);
                        }
                    }
                }

                let mut filtered = Vec::new();
                for row in combined_rows {
                    if matches_qualified_predicate(&row, &qualified, filter.as_deref()) {
                        filtered.push(row);
                    }
                }

                let (out_columns, out_rows) = project(&qualified, filtered, &projection, Some((table, &join.table)))?;
                Ok(QueryResult::Selected {
                    columns: out_columns,
                    rows: out_rows,
                })
            }
        }
    }

    fn update(
        table: &str,
        assignments: Vec<(String, Value)>,
        filter: Option<Predicate>,
        catalog: &mut Catalog,
        tables: &mut HashMap<String, Table>,
        data_dir: &Path,
    ) -> Result<QueryResult, ExecError> {
        let def = catalog.table(table).ok_or_else(|| ExecError::TableDoesNotExist(table.to_owned()))?.clone();
        let resolved: Vec<(usize, Value)> = assignments
            .into_iter()
            .map(|(name, value)| {
                let idx = def.column_index(&name).ok_or_else(|| ExecError::UnknownColumn(name.clone()))?;
                let typed = cast(value, def.columns[idx].sql_type)?;
                Ok((idx, typed))
            })
            .collect::<Result<_, ExecError>>()?;
        let predicate = resolve_predicate(&def, filter.as_deref())?;

        let handle = Self::open_table(table, catalog, tables, data_dir)?;
        let updated = handle.update(&resolved, |row| row_matches(row, &predicate))?;
        Ok(QueryResult::Updated(updated))
    }

    fn delete(
        table: &str,
        filter: Option<Predicate>,
        catalog: &mut Catalog,
        tables: &mut HashMap<String, Table>,
        data_dir: &Path,
    ) -> Result<QueryResult, ExecError> {
        let def = catalog.table(table).ok_or_else(|| ExecError::TableDoesNotExist(table.to_owned()))?.clone();
        let predicate = resolve_predicate(&def, filter.as_deref())?;
        let handle = Self::open_table(table, catalog, tables, data_dir)?;
        let deleted = handle.delete(|row| row_matches(row, &predicate))?;
        Ok(QueryResult::Deleted(deleted))
    }
}

fn resolve_column(qualified: &QualifiedColumn, default_table: &str, def: &TableDef) -> Result<usize, ExecError> {
    match &qualified.table {
        Some(t) if t != default_table => Err(ExecError::UnknownColumn(qualified.to_string())),
        _ => def.column_index(&qualified.column).ok_or_else(|| ExecError::UnknownColumn(qualified.to_string())),
    }
}

/// Single-table WHERE semantics: resolves each predicate column to its
/// index and casts its literal to the column's declared type once, up
/// front, so `UnknownColumn`/`Cast` errors surface before storage is
/// touched instead of being swallowed inside an infallible row closure.
fn resolve_predicate(def: &TableDef, filter: Option<&[(QualifiedColumn, Value)]>) -> Result<Option<Vec<(usize, Value)>>, ExecError> {
    let predicate = match filter {
        Some(p) => p,
        None => return Ok(None),
    };
    let mut resolved = Vec::with_capacity(predicate.len());
    for (column, literal) in predicate {
        let idx = def.column_index(&column.column).ok_or_else(|| ExecError::UnknownColumn(column.to_string()))?;
        let typed = cast(literal.clone(), def.columns[idx].sql_type)?;
        resolved.push((idx, typed));
    }
    Ok(Some(resolved))
}

fn row_matches(row: &[Value], resolved: &Option<Vec<(usize, Value)>>) -> bool {
    match resolved {
        None => true,
        Some(conditions) => conditions.iter().all(|(idx, typed)| row[*idx] == *typed),
    }
}

/// Joined-query WHERE semantics: columns are looked up by their qualified
/// "table.column" name and compared as strings, since the two sides of a
/// join may carry different declared types.
fn matches_qualified_predicate(row: &[Value], qualified_names: &[String], filter: Option<&[(QualifiedColumn, Value)]>) -> bool {
    let predicate = match filter {
        Some(p) => p,
        None => return true,
    };
    predicate.iter().all(|(column, literal)| {
        qualified_names
            .iter()
            .position(|name| name.ends_with(&format!(".{}", column.column)) && matches_table(name, &column.table))
            .map(|idx| row[idx].to_string() == literal.to_string())
            .unwrap_or(false)
    })
}

fn matches_table(qualified_name: &str, wanted: &Option<String>) -> bool {
    match wanted {
        Some(t) => qualified_name.starts_with(&format!("{}.", t)),
        None => true,
    }
}

fn project(
    columns: &[String],
    rows: Vec<Vec<Value>>,
    projection: &Projection,
    tables: Option<(&str, &str)>,
) -> Result<(Vec<String>, Vec<Vec<Value>>), ExecError> {
    match projection {
        Projection::All => Ok((columns.to_vec(), rows)),
        Projection::Columns(wanted) => {
            let indexes: Vec<usize> = wanted
                .iter()
                .map(|qc| find_column(columns, qc, tables).ok_or_else(|| ExecError::UnknownColumn(qc.to_string())))
                .collect::<Result<_, _>>()?;
            let out_rows = rows
                .into_iter()
                .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
                .collect();
            let out_columns = wanted.iter().map(|qc| qc.to_string()).collect();
            Ok((out_columns, out_rows))
        }
    }
}

fn find_column(columns: &[String], wanted: &QualifiedColumn, tables: Option<(&str, &str)>) -> Option<usize> {
    match tables {
        None => columns.iter().position(|c| *c == wanted.column),
        Some((left, right)) => {
            let qualified = match &wanted.table {
                Some(t) => format!("{}.{}", t, wanted.column),
                None => {
                    let left_q = format!("{}.{}", left, wanted.column);
                    let right_q = format!("{}.{}", right, wanted.column);
                    if let Some(i) = columns.iter().position(|c| *c == left_q) {
                        return Some(i);
                    }
                    return columns.iter().position(|c| *c == right_q);
                }
            };
            columns.iter().position(|c| *c == qualified)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_parsing::parse;
    use tempfile::tempdir;

    fn setup() -> (Catalog, HashMap<String, Table>, std::path::PathBuf) {
        let root = tempdir().unwrap().into_path();
        let catalog_path = root.join("catalog.json");
        let data_dir = root.join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        let catalog = Catalog::open(catalog_path).unwrap();
        (catalog, HashMap::new(), data_dir)
    }

    #[test]
    fn creates_inserts_and_selects() {
        let (mut catalog, mut tables, dir) = setup();
        let create = parse("CREATE TABLE users (id INT PRIMARY KEY, name TEXT);").unwrap();
        Executor::execute(create, &mut catalog, &mut tables, &dir).unwrap();

        let insert = parse("INSERT INTO users VALUES (1, 'ana');").unwrap();
        let result = Executor::execute(insert, &mut catalog, &mut tables, &dir).unwrap();
        match result {
            QueryResult::Inserted(row) => {
                assert_eq!(row, vec![("id".to_owned(), Value::Int(1)), ("name".to_owned(), Value::Text("ana".to_owned()))]);
            }
            _ => panic!("expected Inserted"),
        }

        let select = parse("SELECT * FROM users WHERE id = 1;").unwrap();
        match Executor::execute(select, &mut catalog, &mut tables, &dir).unwrap() {
            QueryResult::Selected { rows, .. } => assert_eq!(rows.len(), 1),
            _ => panic!("expected Selected"),
        }
    }

    #[test]
    fn duplicate_primary_key_surfaces_as_storage_error() {
        let (mut catalog, mut tables, dir) = setup();
        let create = parse("CREATE TABLE users (id INT PRIMARY KEY);").unwrap();
        Executor::execute(create, &mut catalog, &mut tables, &dir).unwrap();
        Executor::execute(parse("INSERT INTO users VALUES (1);").unwrap(), &mut catalog, &mut tables, &dir).unwrap();
        let err = Executor::execute(parse("INSERT INTO users VALUES (1);").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap_err();
        assert!(matches!(err, ExecError::Storage(_)));
    }

    #[test]
    fn update_and_delete_report_affected_row_counts() {
        let (mut catalog, mut tables, dir) = setup();
        Executor::execute(parse("CREATE TABLE users (id INT PRIMARY KEY, name TEXT);").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap();
        Executor::execute(parse("INSERT INTO users VALUES (1, 'a');").unwrap(), &mut catalog, &mut tables, &dir).unwrap();

        match Executor::execute(parse("UPDATE users SET name = 'b' WHERE id = 1;").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap()
        {
            QueryResult::Updated(count) => assert_eq!(count, 1),
            _ => panic!("expected Updated"),
        }

        match Executor::execute(parse("DELETE FROM users WHERE id = 1;").unwrap(), &mut catalog, &mut tables, &dir).unwrap() {
            QueryResult::Deleted(count) => assert_eq!(count, 1),
            _ => panic!("expected Deleted"),
        }
    }

    #[test]
    fn delete_with_an_unknown_where_column_is_an_error_not_zero_rows() {
        let (mut catalog, mut tables, dir) = setup();
        Executor::execute(parse("CREATE TABLE users (id INT PRIMARY KEY, name TEXT);").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap();
        Executor::execute(parse("INSERT INTO users VALUES (1, 'a');").unwrap(), &mut catalog, &mut tables, &dir).unwrap();

        let err = Executor::execute(parse("DELETE FROM users WHERE bogus = 1;").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap_err();
        assert_eq!(err, ExecError::UnknownColumn("bogus".to_owned()));

        match Executor::execute(parse("SELECT * FROM users;").unwrap(), &mut catalog, &mut tables, &dir).unwrap() {
            QueryResult::Selected { rows, .. } => assert_eq!(rows.len(), 1),
            _ => panic!("expected Selected"),
        }
    }

    #[test]
    fn update_with_an_unknown_where_column_is_an_error() {
        let (mut catalog, mut tables, dir) = setup();
        Executor::execute(parse("CREATE TABLE users (id INT PRIMARY KEY, name TEXT);").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap();
        Executor::execute(parse("INSERT INTO users VALUES (1, 'a');").unwrap(), &mut catalog, &mut tables, &dir).unwrap();

        let err = Executor::execute(parse("UPDATE users SET name = 'b' WHERE bogus = 1;").unwrap(), &mut catalog, &mut tables, &dir)
            .unwrap_err();
        assert_eq!(err, ExecError::UnknownColumn("bogus".to_owned()));
    }
}
