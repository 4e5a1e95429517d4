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

//! The engine façade (component F): a single [`Engine::execute`] entry
//! point sitting in front of the catalog, the table store and the SQL
//! parser and executor.

use catalog::{Catalog, CatalogError};
use query_parsing::{parse, ParseError};
use query_processing::{ExecError, Executor, QueryResult};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use storage::Table;

#[derive(Debug)]
pub enum EngineError {
    Parse(ParseError),
    Catalog(CatalogError),
    Exec(ExecError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Parse(e) => write!(f, "{}", e),
            EngineError::Catalog(e) => write!(f, "{}", e),
            EngineError::Exec(e) => write!(f, "{}", e),
        }
    }
}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> EngineError {
        EngineError::Parse(e)
    }
}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> EngineError {
        EngineError::Catalog(e)
    }
}

impl From<ExecError> for EngineError {
    fn from(e: ExecError) -> EngineError {
        EngineError::Exec(e)
    }
}

const DEFAULT_CATALOG_PATH: &str = "catalog.json";
const DEFAULT_DATA_DIR: &str = "data";

pub struct Engine {
    catalog: Catalog,
    tables: HashMap<String, Table>,
    data_dir: PathBuf,
}

impl Engine {
    pub fn new(catalog_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Engine, EngineError> {
        let catalog_path = catalog_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_PATH));
        let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let catalog = Catalog::open(catalog_path)?;
        Ok(Engine {
            catalog,
            tables: HashMap::new(),
            data_dir,
        })
    }

    pub fn execute(&mut self, sql: &str) -> Result<QueryResult, EngineError> {
        let statement = parse(sql)?;
        log::debug!("executing statement: {:?}", statement);
        Executor::execute(statement, &mut self.catalog, &mut self.tables, &self.data_dir).map_err(EngineError::from)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(None, None).expect("default catalog path must be openable")
    }
}
