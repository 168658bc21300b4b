//! Compiler-side collaborator state.
//!
//! Grounded on `original_source/src/carnot/planner/compiler_state/compiler_state.h`,
//! simplified: the original's UDF/UDA id-registry maps are dropped since
//! this crate resolves only the closed `BuiltinFunction` set (executing
//! or registering user-defined functions is out of scope).

use std::collections::HashMap;

use crate::ir::node::BuiltinFunction;
use crate::ir::types::{DataType, Relation};

/// Table name -> schema, the planner's view of what tables exist.
#[derive(Debug, Clone, Default)]
pub struct RelationMap {
    relations: HashMap<String, Relation>,
}

impl RelationMap {
    pub fn new() -> Self {
        RelationMap::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, relation: Relation) {
        self.relations.insert(table.into(), relation);
    }

    pub fn get(&self, table: &str) -> Option<&Relation> {
        self.relations.get(table)
    }
}

/// Argument/return type signature for a `BuiltinFunction`.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub arg_types: Vec<DataType>,
    pub return_type: DataType,
}

/// Lookup table for `BuiltinFunction` signatures, standing in for the
/// original's UDF/UDA registry (`registry_info_`) scoped to the closed
/// builtin set this crate resolves types against.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    signatures: HashMap<&'static str, FunctionSignature>,
}

impl FunctionRegistry {
    pub fn lookup(&self, f: BuiltinFunction) -> &FunctionSignature {
        &self.signatures[Self::key(f)]
    }

    fn key(f: BuiltinFunction) -> &'static str {
        match f {
            BuiltinFunction::Equals => "eq",
            BuiltinFunction::NotEquals => "neq",
            BuiltinFunction::LessThan => "lt",
            BuiltinFunction::LessThanEquals => "lte",
            BuiltinFunction::GreaterThan => "gt",
            BuiltinFunction::GreaterThanEquals => "gte",
            BuiltinFunction::And => "and",
            BuiltinFunction::Or => "or",
            BuiltinFunction::Not => "not",
            BuiltinFunction::Add => "add",
            BuiltinFunction::Subtract => "sub",
            BuiltinFunction::Multiply => "mul",
            BuiltinFunction::Divide => "div",
            BuiltinFunction::Mean => "mean",
            BuiltinFunction::Sum => "sum",
            BuiltinFunction::Count => "count",
            BuiltinFunction::Max => "max",
            BuiltinFunction::Min => "min",
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        let mut signatures = HashMap::new();
        let comparisons = [
            "eq", "neq", "lt", "lte", "gt", "gte",
        ];
        for name in comparisons {
            signatures.insert(
                name,
                FunctionSignature {
                    arg_types: vec![DataType::Int64, DataType::Int64],
                    return_type: DataType::Boolean,
                },
            );
        }
        for name in ["and", "or"] {
            signatures.insert(
                name,
                FunctionSignature {
                    arg_types: vec![DataType::Boolean, DataType::Boolean],
                    return_type: DataType::Boolean,
                },
            );
        }
        signatures.insert(
            "not",
            FunctionSignature {
                arg_types: vec![DataType::Boolean],
                return_type: DataType::Boolean,
            },
        );
        for name in ["add", "sub", "mul", "div"] {
            signatures.insert(
                name,
                FunctionSignature {
                    arg_types: vec![DataType::Float64, DataType::Float64],
                    return_type: DataType::Float64,
                },
            );
        }
        for name in ["mean", "sum", "max", "min"] {
            signatures.insert(
                name,
                FunctionSignature {
                    arg_types: vec![DataType::Float64],
                    return_type: DataType::Float64,
                },
            );
        }
        signatures.insert(
            "count",
            FunctionSignature {
                arg_types: vec![],
                return_type: DataType::Int64,
            },
        );
        FunctionRegistry { signatures }
    }
}

/// Per-compilation planner state threaded through type resolution.
#[derive(Debug, Clone, Default)]
pub struct CompilerState {
    pub relation_map: RelationMap,
    pub function_registry: FunctionRegistry,
    /// Wall-clock time the compilation started, used to resolve
    /// `now()`-style time literals.
    pub time_now: chrono::DateTime<chrono::Utc>,
    /// Address of the query broker result sink, when planning a
    /// distributed fragment that must report back.
    pub result_address: Option<String>,
}

impl CompilerState {
    pub fn new() -> Self {
        CompilerState::default()
    }
}
