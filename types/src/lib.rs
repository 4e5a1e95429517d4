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

//! The typed value system (component A): [`SqlType`], [`Value`] and the
//! `cast` family of functions that coerce a raw literal into a typed value.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum SqlType {
    #[serde(rename = "INT")]
    Int,
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "DATETIME")]
    DateTime,
}

impl Display for SqlType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Int => write!(f, "INT"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Bool => write!(f, "BOOL"),
            SqlType::DateTime => write!(f, "DATETIME"),
        }
    }
}

/// A cell value. `Raw` is transient: it only ever appears between the parser
/// handing over an uninterpreted literal and [`cast`] coercing it into one
/// of the typed shapes.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Text(String),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Raw(String),
}

impl Value {
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Int(_) => Some(SqlType::Int),
            Value::Text(_) => Some(SqlType::Text),
            Value::Bool(_) => Some(SqlType::Bool),
            Value::DateTime(_) => Some(SqlType::DateTime),
            Value::Null | Value::Raw(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The persistent JSON representation (§6): DATETIME is an ISO-8601
    /// string, everything else keeps its native JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Text(v) => serde_json::Value::from(v.clone()),
            Value::Bool(v) => serde_json::Value::from(*v),
            Value::DateTime(v) => serde_json::Value::from(v.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::Raw(v) => serde_json::Value::from(v.clone()),
        }
    }

    /// Revives a stored JSON cell back into a typed `Value`, given the
    /// column's declared type. Used when a table file is loaded at startup.
    pub fn from_json(json: &serde_json::Value, sql_type: SqlType) -> Result<Value, CastError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        match (sql_type, json) {
            (SqlType::Int, serde_json::Value::Number(n)) if n.is_i64() => Ok(Value::Int(n.as_i64().unwrap())),
            (SqlType::Text, serde_json::Value::String(s)) => Ok(Value::Text(s.clone())),
            (SqlType::Bool, serde_json::Value::Bool(b)) => Ok(Value::Bool(*b)),
            (SqlType::DateTime, serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| CastError::new(sql_type, s.clone())),
            (_, other) => Err(CastError::new(sql_type, other.to_string())),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Value::Raw(v) => write!(f, "{}", v),
        }
    }
}

/// `Null` compares unequal to everything, including another `Null`: see
/// the data model's note on predicate-purposes equality.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Only non-null values are ever used as index keys (see Invariant 1), so
/// hashing `Null` is never exercised in practice.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Int(v) => {
                1u8.hash(state);
                v.hash(state);
            }
            Value::Text(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Value::Bool(v) => {
                3u8.hash(state);
                v.hash(state);
            }
            Value::DateTime(v) => {
                4u8.hash(state);
                v.hash(state);
            }
            Value::Raw(v) => {
                5u8.hash(state);
                v.hash(state);
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CastError {
    sql_type: SqlType,
    value: String,
}

impl CastError {
    fn new(sql_type: SqlType, value: String) -> CastError {
        CastError { sql_type, value }
    }
}

impl Display for CastError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {} value: {}", self.sql_type, self.value)
    }
}

/// Coerces a raw literal into a typed `Value`. `Null` is preserved
/// regardless of the requested type (§4.1).
pub fn cast(raw: Value, sql_type: SqlType) -> Result<Value, CastError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }
    match sql_type {
        SqlType::Int => cast_int(raw),
        SqlType::Text => cast_text(raw),
        SqlType::Bool => cast_bool(raw),
        SqlType::DateTime => cast_datetime(raw),
    }
}

fn raw_text(value: &Value) -> Option<&str> {
    match value {
        Value::Raw(s) | Value::Text(s) => Some(s.as_str()),
        _ => None,
    }
}

fn cast_int(raw: Value) -> Result<Value, CastError> {
    match &raw {
        Value::Int(v) => Ok(Value::Int(*v)),
        _ => match raw_text(&raw) {
            Some(s) if is_integer_literal(s) => s
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| CastError::new(SqlType::Int, s.to_owned())),
            _ => Err(CastError::new(SqlType::Int, raw.to_string())),
        },
    }
}

fn is_integer_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn cast_text(raw: Value) -> Result<Value, CastError> {
    match raw {
        Value::Text(s) | Value::Raw(s) => Ok(Value::Text(s)),
        Value::Int(v) => Ok(Value::Text(v.to_string())),
        Value::Bool(v) => Ok(Value::Text(v.to_string())),
        Value::DateTime(v) => Ok(Value::Text(v.to_rfc3339_opts(SecondsFormat::Micros, true))),
        Value::Null => Ok(Value::Null),
    }
}

fn cast_bool(raw: Value) -> Result<Value, CastError> {
    match &raw {
        Value::Bool(v) => Ok(Value::Bool(*v)),
        Value::Int(0) => Ok(Value::Bool(false)),
        Value::Int(1) => Ok(Value::Bool(true)),
        _ => match raw_text(&raw) {
            Some(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(CastError::new(SqlType::Bool, s.to_owned())),
            },
            None => Err(CastError::new(SqlType::Bool, raw.to_string())),
        },
    }
}

fn cast_datetime(raw: Value) -> Result<Value, CastError> {
    match &raw {
        Value::DateTime(v) => Ok(Value::DateTime(*v)),
        _ => match raw_text(&raw) {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| CastError::new(SqlType::DateTime, s.to_owned())),
            None => Err(CastError::new(SqlType::DateTime, raw.to_string())),
        },
    }
}
