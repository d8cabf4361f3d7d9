use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::FilterError;

/// A single named option value, as written in a chain file or passed at
/// call time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Integer(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
            ArgValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Text(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Text(value)
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Integer(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Integer(value.into())
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

/// Named filter options. Construction-time arguments act as defaults that
/// call-time arguments override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, ArgValue>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ArgValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `overrides` laid over `self`; overrides win on conflicts.
    pub fn merged(&self, overrides: Option<&Arguments>) -> Arguments {
        let mut merged = self.clone();
        if let Some(overrides) = overrides {
            for (name, value) in &overrides.0 {
                merged.0.insert(name.clone(), value.clone());
            }
        }
        merged
    }

    /// Rejects any option not listed in `known`.
    pub fn check_known(&self, filter: &str, known: &[&str]) -> Result<(), FilterError> {
        match self.names().find(|name| !known.contains(name)) {
            Some(name) => Err(FilterError::UnknownOption {
                filter: filter.to_string(),
                option: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Any value rendered as text; integers and booleans included.
    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(ArgValue::to_string)
    }

    pub fn integer(&self, filter: &str, name: &str) -> Result<Option<i64>, FilterError> {
        match self.get(name) {
            None => Ok(None),
            Some(ArgValue::Integer(v)) => Ok(Some(*v)),
            Some(ArgValue::Text(s)) => s.trim().parse().map(Some).map_err(|_| {
                FilterError::invalid(filter, name, format!("'{s}' is not an integer"))
            }),
            Some(other) => Err(FilterError::invalid(
                filter,
                name,
                format!("'{other}' is not an integer"),
            )),
        }
    }

    /// Parses the option with `FromStr`, reporting failures as configuration
    /// errors against this option.
    pub fn parsed<T>(&self, filter: &str, name: &str) -> Result<Option<T>, FilterError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.text(name) {
            None => Ok(None),
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|e: T::Err| FilterError::invalid(filter, name, e.to_string())),
        }
    }
}

impl FromIterator<(String, ArgValue)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, ArgValue)>>(iter: I) -> Self {
        Arguments(iter.into_iter().collect())
    }
}
