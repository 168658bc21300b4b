//! Query-plan intermediate representation.
//!
//! A [`graph::Graph`] is an arena of [`node::NodeKind`] values — both
//! relational operators and the expressions they own — addressed by
//! [`node::NodeId`]. [`operator`] resolves types and column
//! dependencies per operator kind; [`rules`] rewrites the graph to
//! fixpoint; [`proto`] serializes a resolved graph for transfer to
//! remote agents.

pub mod compiler_state;
pub mod graph;
pub mod node;
pub mod operator;
pub mod proto;
pub mod rules;
pub mod types;

pub use compiler_state::CompilerState;
pub use graph::Graph;
pub use node::{BuiltinFunction, JoinType, Node, NodeId, NodeKind, NodeKindTag, ResolvedType};
pub use types::{DataType, Relation, SemanticType, TableType, ValueType};
