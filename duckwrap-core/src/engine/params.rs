//! Parameter binding for prepared statements.

use std::collections::HashMap;

use duckdb::types::Value;
use duckdb::Statement;

use crate::error::WrapperError;

/// Values for a statement's placeholders.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Params<'a> {
    /// One value per `?` placeholder, in order.
    Positional(&'a [Value]),
    /// Values for `$name` placeholders; a leading `$` in the name is optional.
    Named(&'a [(&'a str, Value)]),
}

impl Params<'_> {
    /// Values in the statement's one-based placeholder order.
    ///
    /// Everything is checked against the prepared statement before execution:
    /// positional counts must match, named values must each fill a distinct
    /// placeholder and every placeholder must be filled.
    pub(crate) fn bind_order<'v>(
        &'v self,
        stmt: &Statement<'_>,
    ) -> Result<Vec<&'v Value>, WrapperError> {
        let expected = stmt.parameter_count();
        match self {
            Params::Positional(values) => {
                if expected != values.len() {
                    return Err(WrapperError::ParameterMismatch {
                        expected,
                        supplied: values.len(),
                    });
                }
                Ok(values.iter().collect())
            }
            Params::Named(pairs) => {
                let mut by_name: HashMap<&str, &'v Value> = HashMap::with_capacity(pairs.len());
                for (name, value) in pairs.iter() {
                    let bare = name.strip_prefix('$').unwrap_or(*name);
                    if by_name.insert(bare, value).is_some() {
                        return Err(WrapperError::DuplicateParameter(bare.to_string()));
                    }
                }

                let mut ordered = Vec::with_capacity(expected);
                let mut missing = Vec::new();
                for index in 1..=expected {
                    let name = stmt.parameter_name(index)?;
                    match by_name.remove(name.as_str()) {
                        Some(value) => ordered.push(value),
                        None => missing.push(name),
                    }
                }

                if let Some(unknown) = by_name.keys().min() {
                    return Err(WrapperError::UnknownParameter(unknown.to_string()));
                }
                if !missing.is_empty() {
                    return Err(WrapperError::MissingParameters(missing.join(", ")));
                }
                Ok(ordered)
            }
        }
    }
}
