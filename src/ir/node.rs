//! Node identity and the closed `NodeKind` enum.
//!
//! Operator and expression kinds live in a single tagged variant so
//! dispatch is an exhaustive `match` rather than a trait-object
//! hierarchy; see DESIGN.md's "Dispatch over node kinds" entry.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::ir::types::{Relation, TableType, ValueType};

/// Stable integer identity for a node within one `Graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic id allocator, one per `Graph`.
#[derive(Debug, Default)]
pub struct IdAllocator(AtomicU64);

impl IdAllocator {
    pub fn next(&self) -> NodeId {
        NodeId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Join variants, mirroring spec §6's `op_type` enum for join operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    FullOuter,
}

/// Arithmetic/comparison/logical function identifiers usable in `Func`
/// expressions. Closed set; mirrors the teacher's `BuiltinFunction`
/// enum-dispatch convention but scoped to what the filter push-down
/// rule and type resolution need to reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinFunction {
    Equals,
    NotEquals,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    And,
    Or,
    Not,
    Add,
    Subtract,
    Multiply,
    Divide,
    Mean,
    Sum,
    Count,
    Max,
    Min,
}

/// A resolved type slot: unset, a scalar `ValueType` (expressions), or a
/// `TableType` (operators).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedType {
    Value(ValueType),
    Table(TableType),
}

/// The closed set of operator and expression kinds. Column references
/// inside an expression subtree are validated against the owning
/// operator's parents' relations (invariant I3) at type-resolution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    // --- Operators ---
    /// Reads rows from a named table; forwards only `column_names` (its
    /// projection — supports pruning by shrinking this list).
    MemorySource {
        table: String,
        column_names: Vec<String>,
    },
    /// A source with no rows, used for schema-only fragments.
    EmptySource { relation: Option<Relation> },
    /// Projects/renames columns. `col_exprs` is an ordered list of
    /// `(output_name, expr)`. When `keep_input_columns` is true, columns
    /// not named in `col_exprs` pass through unchanged.
    Map {
        col_exprs: Vec<(String, NodeId)>,
        keep_input_columns: bool,
    },
    /// Filters rows by a single boolean expression.
    Filter { expr: Option<NodeId> },
    /// Merges ≥1 parents with identical schemas.
    Union,
    /// Group-by aggregate. `group_exprs` are passthrough group keys,
    /// `agg_exprs` are `(output_name, expr)` aggregate computations.
    BlockingAgg {
        group_exprs: Vec<(String, NodeId)>,
        agg_exprs: Vec<(String, NodeId)>,
    },
    /// Terminal operator writing to a named in-memory table.
    MemorySink { name: String },
    /// Terminal operator writing to a remote agent over gRPC.
    GRPCSink { agent_id: Option<String> },
    /// Binds two parents on equality of `left_on`/`right_on` columns.
    Join {
        left_on: Vec<String>,
        right_on: Vec<String>,
        join_type: JoinType,
    },

    // --- Expressions ---
    /// Function application; `args` are expression-ownership children.
    Func { name: BuiltinFunction, args: Vec<NodeId> },
    /// A column reference, resolved against the owning operator's
    /// parents' relations.
    Column { name: String },
    Int(i64),
    Float(f64),
    String(String),
    UInt128(u128),
    /// A timestamp literal, nanoseconds since epoch.
    Time(i64),
    /// A metadata reference (e.g. `pod_name`), resolved externally.
    Metadata { name: String },
    /// A metadata literal value used as a join/filter argument.
    MetadataLiteral { value: String },
    /// A semantic-tag-only cast. The underlying data type of `expr` must
    /// already equal `target_data_type`; a mismatch is
    /// `CoreError::SemanticTypeCastMismatch`.
    Cast {
        expr: NodeId,
        target_data_type: crate::ir::types::DataType,
        target_semantic: crate::ir::types::SemanticType,
    },
}

/// Coarse variant tag for `find_nodes_of_type`, decoupled from the
/// payload so callers can query without constructing a dummy `NodeKind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKindTag {
    MemorySource,
    EmptySource,
    Map,
    Filter,
    Union,
    BlockingAgg,
    MemorySink,
    GRPCSink,
    Join,
    Func,
    Column,
    Int,
    Float,
    String,
    UInt128,
    Time,
    Metadata,
    MetadataLiteral,
    Cast,
}

impl NodeKind {
    pub fn tag(&self) -> NodeKindTag {
        match self {
            NodeKind::MemorySource { .. } => NodeKindTag::MemorySource,
            NodeKind::EmptySource { .. } => NodeKindTag::EmptySource,
            NodeKind::Map { .. } => NodeKindTag::Map,
            NodeKind::Filter { .. } => NodeKindTag::Filter,
            NodeKind::Union => NodeKindTag::Union,
            NodeKind::BlockingAgg { .. } => NodeKindTag::BlockingAgg,
            NodeKind::MemorySink { .. } => NodeKindTag::MemorySink,
            NodeKind::GRPCSink { .. } => NodeKindTag::GRPCSink,
            NodeKind::Join { .. } => NodeKindTag::Join,
            NodeKind::Func { .. } => NodeKindTag::Func,
            NodeKind::Column { .. } => NodeKindTag::Column,
            NodeKind::Int(_) => NodeKindTag::Int,
            NodeKind::Float(_) => NodeKindTag::Float,
            NodeKind::String(_) => NodeKindTag::String,
            NodeKind::UInt128(_) => NodeKindTag::UInt128,
            NodeKind::Time(_) => NodeKindTag::Time,
            NodeKind::Metadata { .. } => NodeKindTag::Metadata,
            NodeKind::MetadataLiteral { .. } => NodeKindTag::MetadataLiteral,
            NodeKind::Cast { .. } => NodeKindTag::Cast,
        }
    }

    pub fn is_operator(&self) -> bool {
        matches!(
            self.tag(),
            NodeKindTag::MemorySource
                | NodeKindTag::EmptySource
                | NodeKindTag::Map
                | NodeKindTag::Filter
                | NodeKindTag::Union
                | NodeKindTag::BlockingAgg
                | NodeKindTag::MemorySink
                | NodeKindTag::GRPCSink
                | NodeKindTag::Join
        )
    }

    pub fn is_expression(&self) -> bool {
        !self.is_operator()
    }

    /// Expression-ownership children: the arguments of a `Func` node.
    /// Operators expose their owned expression *roots* separately (see
    /// `Graph::owned_expr_roots`), since those roots are not uniformly
    /// named across variants.
    pub fn expr_children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Func { args, .. } => args.clone(),
            NodeKind::Cast { expr, .. } => vec![*expr],
            _ => Vec::new(),
        }
    }
}

/// A node: its identity, payload, and resolved type slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub resolved_type: Option<ResolvedType>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Node {
            id,
            kind,
            resolved_type: None,
        }
    }
}
