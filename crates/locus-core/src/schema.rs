//! Column schemas shared by logical and physical plans.
//!
//! The planner only needs field names and types to translate column identity
//! through projections and joins.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float32,
    Float64,
    Utf8,
    Binary,
    Date64,
    Decimal128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Like `index_of`, but an unknown column is a planning error.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::Plan(format!("unknown column '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Concatenate two schemas (join output: left columns first).
    pub fn join(&self, right: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Schema { fields }
    }

    /// Copy of this schema with every field marked nullable.
    pub fn nullable(&self) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|f| Field::new(f.name.clone(), f.data_type.clone(), true))
                .collect(),
        }
    }

    /// Union branches must agree on arity; names come from the first branch.
    pub fn check_union_compatible(&self, other: &Schema) -> Result<()> {
        if self.len() != other.len() {
            return Err(Error::Schema(format!(
                "union branch has {} columns, expected {}",
                other.len(),
                self.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> Schema {
        Schema::new(
            names
                .iter()
                .map(|n| Field::new(*n, DataType::Int64, false))
                .collect(),
        )
    }

    #[test]
    fn join_keeps_left_first() {
        let s = schema(&["a", "b"]).join(&schema(&["c"]));
        assert_eq!(s.names(), vec!["a", "b", "c"]);
        assert_eq!(s.index_of("c"), Some(2));
    }

    #[test]
    fn require_reports_unknown_column() {
        let err = schema(&["a"]).require("zz").unwrap_err();
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn union_arity_mismatch_is_rejected() {
        assert!(schema(&["a", "b"])
            .check_union_compatible(&schema(&["x"]))
            .is_err());
    }
}
