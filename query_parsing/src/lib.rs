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

//! A hand-rolled lexer and recursive-descent parser (component D) for the
//! restricted CREATE/INSERT/SELECT/UPDATE/DELETE dialect this engine
//! accepts. There is no general-purpose grammar here: each statement verb
//! has its own fixed shape.

use std::fmt::{self, Display, Formatter};
use types::{SqlType, Value};

mod lexer;

use lexer::{Lexer, Token};

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub unique: bool,
}

/// A column reference, optionally qualified with its table name, as it
/// appears in a projection, a WHERE clause or a JOIN ON clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedColumn {
    pub table: Option<String>,
    pub column: String,
}

impl Display for QualifiedColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Projection {
    All,
    Columns(Vec<QualifiedColumn>),
}

#[derive(Debug, Clone)]
pub struct Join {
    pub table: String,
    pub left: QualifiedColumn,
    pub right: QualifiedColumn,
}

/// A conjunction of `column = value` equalities. Multiple entries are
/// implicitly ANDed together.
pub type Predicate = Vec<(QualifiedColumn, Value)>;

#[derive(Debug, Clone)]
pub enum Statement {
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        values: Vec<Value>,
    },
    Select {
        table: String,
        join: Option<Join>,
        projection: Projection,
        filter: Option<Predicate>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        filter: Option<Predicate>,
    },
    Delete {
        table: String,
        filter: Option<Predicate>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidSyntax(&'static str),
    InvalidWhere,
    InvalidJoinOn,
    UnexpectedEof,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidSyntax(verb) => write!(f, "Invalid {} syntax", verb),
            ParseError::InvalidWhere => write!(f, "Invalid WHERE condition"),
            ParseError::InvalidJoinOn => write!(f, "Invalid JOIN ON condition"),
            ParseError::UnexpectedEof => write!(f, "Invalid syntax"),
        }
    }
}

pub fn parse(sql: &str) -> Result<Statement, ParseError> {
    let tokens = Lexer::new(sql).tokenize();
    Parser::new(tokens).parse_statement()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Parser {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_punct(&mut self, punct: char) -> bool {
        match self.peek() {
            Some(Token::Punct(p)) if *p == punct => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn identifier(&mut self) -> Option<String> {
        match self.advance() {
            Some(Token::Word(w)) => Some(w),
            _ => None,
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("create") => self.parse_create(),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("insert") => self.parse_insert(),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("select") => self.parse_select(),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("update") => self.parse_update(),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("delete") => self.parse_delete(),
            _ => Err(ParseError::UnexpectedEof),
        }
    }

    fn parse_create(&mut self) -> Result<Statement, ParseError> {
        let err = || ParseError::InvalidSyntax("CREATE TABLE");
        self.advance();
        if !self.expect_keyword("table") {
            return Err(err());
        }
        let table = self.identifier().ok_or_else(err)?;
        if !self.expect_punct('(') {
            return Err(err());
        }
        let mut columns = Vec::new();
        let mut table_primary_key: Option<String> = None;
        let mut table_unique: Vec<String> = Vec::new();
        loop {
            if self.expect_keyword("primary") {
                if !self.expect_keyword("key") {
                    return Err(err());
                }
                if !self.expect_punct('(') {
                    return Err(err());
                }
                table_primary_key = Some(self.identifier().ok_or_else(err)?);
                if !self.expect_punct(')') {
                    return Err(err());
                }
            } else if self.expect_keyword("unique") {
                if !self.expect_punct('(') {
                    return Err(err());
                }
                loop {
                    table_unique.push(self.identifier().ok_or_else(err)?);
                    if self.expect_punct(',') {
                        continue;
                    }
                    break;
                }
                if !self.expect_punct(')') {
                    return Err(err());
                }
            } else {
                let name = self.identifier().ok_or_else(err)?;
                let type_word = self.identifier().ok_or_else(err)?;
                let sql_type = match type_word.to_uppercase().as_str() {
                    "INT" | "INTEGER" => SqlType::Int,
                    "TEXT" | "VARCHAR" => SqlType::Text,
                    "BOOL" | "BOOLEAN" => SqlType::Bool,
                    "DATETIME" | "TIMESTAMP" => SqlType::DateTime,
                    _ => return Err(err()),
                };
                let mut primary_key = false;
                let mut unique = false;
                loop {
                    if self.expect_keyword("primary") {
                        if !self.expect_keyword("key") {
                            return Err(err());
                        }
                        primary_key = true;
                    } else if self.expect_keyword("unique") {
                        unique = true;
                    } else {
                        break;
                    }
                }
                columns.push(ColumnSpec {
                    name,
                    sql_type,
                    primary_key,
                    unique,
                });
            }
            if self.expect_punct(',') {
                continue;
            }
            break;
        }
        if !self.expect_punct(')') {
            return Err(err());
        }
        self.expect_punct(';');

        for name in &table_unique {
            let column = columns.iter_mut().find(|c| &c.name == name).ok_or_else(err)?;
            column.unique = true;
        }
        if let Some(name) = table_primary_key {
            let column = columns.iter_mut().find(|c| c.name == name).ok_or_else(err)?;
            column.primary_key = true;
        }

        Ok(Statement::CreateTable { table, columns })
    }

    fn parse_insert(&mut self) -> Result<Statement, ParseError> {
        let err = || ParseError::InvalidSyntax("INSERT");
        self.advance();
        if !self.expect_keyword("into") {
            return Err(err());
        }
        let table = self.identifier().ok_or_else(err)?;

        let columns = if self.expect_punct('(') {
            let mut names = Vec::new();
            loop {
                names.push(self.identifier().ok_or_else(err)?);
                if self.expect_punct(',') {
                    continue;
                }
                break;
            }
            if !self.expect_punct(')') {
                return Err(err());
            }
            Some(names)
        } else {
            None
        };

        if !self.expect_keyword("values") {
            return Err(err());
        }

        if !self.expect_punct('(') {
            return Err(err());
        }
        let mut values = Vec::new();
        loop {
            values.push(self.literal().ok_or_else(err)?);
            if self.expect_punct(',') {
                continue;
            }
            break;
        }
        if !self.expect_punct(')') {
            return Err(err());
        }
        self.expect_punct(';');
        Ok(Statement::Insert { table, columns, values })
    }

    fn parse_select(&mut self) -> Result<Statement, ParseError> {
        let err = || ParseError::InvalidSyntax("SELECT");
        self.advance();

        let projection = if self.expect_punct('*') {
            Projection::All
        } else {
            let mut columns = Vec::new();
            loop {
                columns.push(self.qualified_column().ok_or_else(err)?);
                if self.expect_punct(',') {
                    continue;
                }
                break;
            }
            Projection::Columns(columns)
        };

        if !self.expect_keyword("from") {
            return Err(err());
        }
        let table = self.identifier().ok_or_else(err)?;

        let starts_join = matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case("inner") || w.eq_ignore_ascii_case("join"));
        let join = if starts_join {
            self.expect_keyword("inner");
            if !self.expect_keyword("join") {
                return Err(err());
            }
            let joined = self.identifier().ok_or_else(err)?;
            if !self.expect_keyword("on") {
                return Err(ParseError::InvalidJoinOn);
            }
            let left = self.qualified_column().ok_or(ParseError::InvalidJoinOn)?;
            if !self.expect_punct('=') {
                return Err(ParseError::InvalidJoinOn);
            }
            let right = self.qualified_column().ok_or(ParseError::InvalidJoinOn)?;
            Some(Join {
                table: joined,
                left,
                right,
            })
        } else {
            None
        };

        let filter = self.parse_optional_where()?;
        self.expect_punct(';');
        Ok(Statement::Select {
            table,
            join,
            projection,
            filter,
        })
    }

    fn parse_update(&mut self) -> Result<Statement, ParseError> {
        let err = || ParseError::InvalidSyntax("UPDATE");
        self.advance();
        let table = self.identifier().ok_or_else(err)?;
        if !self.expect_keyword("set") {
            return Err(err());
        }
        let mut assignments = Vec::new();
        loop {
            let name = self.identifier().ok_or_else(err)?;
            if !self.expect_punct('=') {
                return Err(err());
            }
            let value = self.literal().ok_or_else(err)?;
            assignments.push((name, value));
            if self.expect_punct(',') {
                continue;
            }
            break;
        }
        let filter = self.parse_optional_where()?;
        self.expect_punct(';');
        Ok(Statement::Update {
            table,
            assignments,
            filter,
        })
    }

    fn parse_delete(&mut self) -> Result<Statement, ParseError> {
        let err = || ParseError::InvalidSyntax("DELETE");
        self.advance();
        if !self.expect_keyword("from") {
            return Err(err());
        }
        let table = self.identifier().ok_or_else(err)?;
        let filter = self.parse_optional_where()?;
        self.expect_punct(';');
        Ok(Statement::Delete { table, filter })
    }

    fn parse_optional_where(&mut self) -> Result<Option<Predicate>, ParseError> {
        if !self.expect_keyword("where") {
            return Ok(None);
        }
        let mut predicate = Vec::new();
        loop {
            let column = self.qualified_column().ok_or(ParseError::InvalidWhere)?;
            if !self.expect_punct('=') {
                return Err(ParseError::InvalidWhere);
            }
            let value = self.literal().ok_or(ParseError::InvalidWhere)?;
            predicate.push((column, value));
            if self.expect_keyword("and") {
                continue;
            }
            break;
        }
        Ok(Some(predicate))
    }

    fn qualified_column(&mut self) -> Option<QualifiedColumn> {
        let first = self.identifier()?;
        if matches!(self.peek(), Some(Token::Punct('.'))) {
            self.pos += 1;
            let column = self.identifier()?;
            Some(QualifiedColumn {
                table: Some(first),
                column,
            })
        } else {
            Some(QualifiedColumn { table: None, column: first })
        }
    }

    fn literal(&mut self) -> Option<Value> {
        match self.advance()? {
            Token::QuotedString(s) => Some(Value::Raw(s)),
            Token::Word(w) if w.eq_ignore_ascii_case("null") => Some(Value::Null),
            Token::Word(w) => Some(Value::Raw(w)),
            Token::Number(n) => Some(Value::Raw(n)),
            _ => None,
        }
    }
}
