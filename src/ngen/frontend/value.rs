use std::collections::BTreeMap;
use std::fmt;

use crate::util::errors::{ErrorKind, GenError, Location, NgenResult};

pub type ValueMap = BTreeMap<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Scope(ValueMap),
}

/// A value in the declarative source language, with the location it was
/// written for error attribution.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub kind: ValueKind,
    pub origin: Option<Location>,
}

impl Value {
    pub fn new(kind: ValueKind, origin: Option<Location>) -> Value {
        Value { kind, origin }
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value {
            kind: ValueKind::String(s.into()),
            origin: None,
        }
    }

    pub fn bool(b: bool) -> Value {
        Value {
            kind: ValueKind::Bool(b),
            origin: None,
        }
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value {
            kind: ValueKind::List(items),
            origin: None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Bool(_) => "boolean",
            ValueKind::Int(_) => "integer",
            ValueKind::String(_) => "string",
            ValueKind::List(_) => "list",
            ValueKind::Scope(_) => "scope",
        }
    }

    fn type_error(&self, expected: &str) -> anyhow::Error {
        GenError::new(
            ErrorKind::Parse,
            format!("expected a {}, got a {}", expected, self.type_name()),
        )
        .at(self.origin.clone())
        .into()
    }

    pub fn as_string(&self) -> NgenResult<&str> {
        match &self.kind {
            ValueKind::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    pub fn as_bool(&self) -> NgenResult<bool> {
        match &self.kind {
            ValueKind::Bool(b) => Ok(*b),
            _ => Err(self.type_error("boolean")),
        }
    }

    pub fn as_int(&self) -> NgenResult<i64> {
        match &self.kind {
            ValueKind::Int(i) => Ok(*i),
            _ => Err(self.type_error("integer")),
        }
    }

    pub fn as_list(&self) -> NgenResult<&[Value]> {
        match &self.kind {
            ValueKind::List(l) => Ok(l),
            _ => Err(self.type_error("list")),
        }
    }

    pub fn as_scope(&self) -> NgenResult<&ValueMap> {
        match &self.kind {
            ValueKind::Scope(s) => Ok(s),
            _ => Err(self.type_error("scope")),
        }
    }

    /// The strings of a list value.
    pub fn as_string_list(&self) -> NgenResult<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_string().map(str::to_string))
            .collect()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Bool(b) => write!(f, "{}", b),
            ValueKind::Int(i) => write!(f, "{}", i),
            ValueKind::String(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            ValueKind::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ValueKind::Scope(map) => {
                write!(f, "{{")?;
                for (k, v) in map {
                    write!(f, " {} = {}", k, v)?;
                }
                write!(f, " }}")
            }
        }
    }
}

/// A symbol table for file execution. Lookups walk the parent chain, so
/// values set by the build config (and arg overrides) are visible to every
/// file executed beneath it.
pub struct Scope<'a> {
    values: ValueMap,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    pub fn new(values: ValueMap) -> Scope<'a> {
        Scope {
            values,
            parent: None,
        }
    }

    pub fn with_parent(parent: &'a Scope<'a>) -> Scope<'a> {
        Scope {
            values: ValueMap::new(),
            parent: Some(parent),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .get(name)
            .or_else(|| self.parent.and_then(|p| p.get(name)))
    }

    pub fn set(&mut self, name: String, value: Value) {
        self.values.insert(name, value);
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    pub fn into_values(self) -> ValueMap {
        self.values
    }
}
