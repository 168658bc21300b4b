//! Relation and type descriptors.
//!
//! Types are resolved in topological order as the graph is walked;
//! see [`crate::ir::graph::Graph::resolve_all_types`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Closed set of primitive column data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    String,
    Time64Ns,
    UInt128,
}

/// Semantic type tag, carried alongside a `DataType` for UI rendering
/// hints. Closed set; not user-extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    None,
    Bytes,
    Duration64Ns,
    Percent,
    Quantiles,
    ServiceName,
    Throughput,
}

impl Default for SemanticType {
    fn default() -> Self {
        SemanticType::None
    }
}

/// A primitive data type paired with an optional semantic tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType {
    pub data_type: DataType,
    pub semantic_type: SemanticType,
}

impl ValueType {
    pub fn new(data_type: DataType) -> Self {
        ValueType {
            data_type,
            semantic_type: SemanticType::None,
        }
    }

    pub fn with_semantic(data_type: DataType, semantic_type: SemanticType) -> Self {
        ValueType {
            data_type,
            semantic_type,
        }
    }

    /// Apply a `type_cast` that only changes the semantic tag. The
    /// underlying data type must already match; violating this is
    /// `CoreError::SemanticTypeCastMismatch`.
    pub fn cast_semantic(&self, target: DataType, semantic: SemanticType) -> crate::error::CoreResult<ValueType> {
        if self.data_type != target {
            return Err(crate::error::CoreError::SemanticTypeCastMismatch {
                from: self.data_type,
                to: target,
            });
        }
        Ok(ValueType {
            data_type: self.data_type,
            semantic_type: semantic,
        })
    }
}

/// An ordered list of `(name, datatype)` pairs with unique names —
/// an operator's output schema before semantic-type resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    columns: Vec<(String, DataType)>,
}

impl Relation {
    pub fn new(columns: Vec<(String, DataType)>) -> Self {
        Relation { columns }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn data_type_of(&self, name: &str) -> Option<DataType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn columns(&self) -> &[(String, DataType)] {
        &self.columns
    }
}

/// Maps column name to `ValueType`, preserving insertion order — the
/// resolved type of an operator's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableType {
    order: Vec<String>,
    types: HashMap<String, ValueType>,
}

impl TableType {
    pub fn new() -> Self {
        TableType::default()
    }

    pub fn insert(&mut self, name: String, value_type: ValueType) {
        if !self.types.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.types.insert(name, value_type);
    }

    pub fn get(&self, name: &str) -> Option<&ValueType> {
        self.types.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn to_relation(&self) -> Relation {
        Relation::new(
            self.order
                .iter()
                .map(|n| (n.clone(), self.types[n].data_type))
                .collect(),
        )
    }
}
