//! Serialized plan representation, exchanged with remote agents and
//! persisted for query history.
//!
//! Grounded on `original_source/src/carnot/planner/ir/ir.cc`'s
//! `ToProto` dispatch. The original emits protobuf; this crate keeps
//! the same shape as plain serde structs and lets the caller choose a
//! wire format (JSON for the CLI, bincode for agent-to-agent transfer).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::ir::graph::Graph;
use crate::ir::node::{BuiltinFunction, JoinType, NodeId, NodeKind};
use crate::ir::types::{DataType, SemanticType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueTypeProto {
    pub data_type: DataType,
    pub semantic_type: SemanticType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprProto {
    Column { name: String },
    Func { name: BuiltinFunction, args: Vec<ExprProto> },
    Int(i64),
    Float(f64),
    String(String),
    UInt128(u128),
    Time(i64),
    Metadata { name: String },
    MetadataLiteral { value: String },
    Cast { expr: Box<ExprProto>, target_data_type: DataType, target_semantic: SemanticType },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperatorProto {
    MemorySource { table: String, column_names: Vec<String> },
    EmptySource { column_names: Vec<String> },
    Map { col_exprs: Vec<(String, ExprProto)>, keep_input_columns: bool },
    Filter { expr: Option<ExprProto> },
    Union,
    BlockingAgg { group_exprs: Vec<(String, ExprProto)>, agg_exprs: Vec<(String, ExprProto)> },
    MemorySink { name: String },
    GRPCSink { agent_id: Option<String> },
    Join { left_on: Vec<String>, right_on: Vec<String>, join_type: JoinType },
}

/// One operator plus its structural parents, addressed by the same
/// `NodeId` numbering the in-memory graph used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorNodeProto {
    pub id: u64,
    pub op: OperatorProto,
    pub parents: Vec<u64>,
}

/// A single-agent fragment of a distributed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFragmentProto {
    pub fragment_id: u64,
    pub nodes: Vec<OperatorNodeProto>,
}

/// The whole plan as handed to one agent: its fragment plus addressing
/// metadata for stitching results back together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanProto {
    pub agent_id: Option<String>,
    pub fragment: PlanFragmentProto,
}

/// The full, unsplit plan graph — what the compiler produces before
/// distributed splitting assigns fragments to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagProto {
    pub fragments: Vec<PlanFragmentProto>,
}

impl Graph {
    pub fn to_plan_proto(&self, agent_id: Option<String>) -> CoreResult<PlanProto> {
        let order = self.topological_sort()?;
        let mut nodes = Vec::with_capacity(order.len());
        for id in order {
            let node = self.node(id)?;
            if !node.kind.is_operator() {
                continue;
            }
            nodes.push(OperatorNodeProto {
                id: id.0,
                op: self.operator_to_proto(id)?,
                parents: self.parents(id).into_iter().map(|p| p.0).collect(),
            });
        }
        Ok(PlanProto {
            agent_id,
            fragment: PlanFragmentProto { fragment_id: 0, nodes },
        })
    }

    fn operator_to_proto(&self, id: NodeId) -> CoreResult<OperatorProto> {
        match &self.node(id)?.kind {
            NodeKind::MemorySource { table, column_names } => Ok(OperatorProto::MemorySource {
                table: table.clone(),
                column_names: column_names.clone(),
            }),
            NodeKind::EmptySource { relation } => Ok(OperatorProto::EmptySource {
                column_names: relation
                    .as_ref()
                    .map(|r| r.column_names().map(str::to_string).collect())
                    .unwrap_or_default(),
            }),
            NodeKind::Map {
                col_exprs,
                keep_input_columns,
            } => Ok(OperatorProto::Map {
                col_exprs: col_exprs
                    .iter()
                    .map(|(n, e)| Ok((n.clone(), self.expr_to_proto(*e)?)))
                    .collect::<CoreResult<Vec<_>>>()?,
                keep_input_columns: *keep_input_columns,
            }),
            NodeKind::Filter { expr } => Ok(OperatorProto::Filter {
                expr: expr.map(|e| self.expr_to_proto(e)).transpose()?,
            }),
            NodeKind::Union => Ok(OperatorProto::Union),
            NodeKind::BlockingAgg {
                group_exprs,
                agg_exprs,
            } => Ok(OperatorProto::BlockingAgg {
                group_exprs: group_exprs
                    .iter()
                    .map(|(n, e)| Ok((n.clone(), self.expr_to_proto(*e)?)))
                    .collect::<CoreResult<Vec<_>>>()?,
                agg_exprs: agg_exprs
                    .iter()
                    .map(|(n, e)| Ok((n.clone(), self.expr_to_proto(*e)?)))
                    .collect::<CoreResult<Vec<_>>>()?,
            }),
            NodeKind::MemorySink { name } => Ok(OperatorProto::MemorySink { name: name.clone() }),
            NodeKind::GRPCSink { agent_id } => Ok(OperatorProto::GRPCSink {
                agent_id: agent_id.clone(),
            }),
            NodeKind::Join {
                left_on,
                right_on,
                join_type,
            } => Ok(OperatorProto::Join {
                left_on: left_on.clone(),
                right_on: right_on.clone(),
                join_type: *join_type,
            }),
            other => Err(CoreError::Internal {
                message: format!("{other:?} is not an operator"),
            }),
        }
    }

    fn expr_to_proto(&self, id: NodeId) -> CoreResult<ExprProto> {
        match &self.node(id)?.kind {
            NodeKind::Column { name } => Ok(ExprProto::Column { name: name.clone() }),
            NodeKind::Func { name, args } => Ok(ExprProto::Func {
                name: *name,
                args: args
                    .iter()
                    .map(|a| self.expr_to_proto(*a))
                    .collect::<CoreResult<Vec<_>>>()?,
            }),
            NodeKind::Int(v) => Ok(ExprProto::Int(*v)),
            NodeKind::Float(v) => Ok(ExprProto::Float(*v)),
            NodeKind::String(v) => Ok(ExprProto::String(v.clone())),
            NodeKind::UInt128(v) => Ok(ExprProto::UInt128(*v)),
            NodeKind::Time(v) => Ok(ExprProto::Time(*v)),
            NodeKind::Metadata { name } => Ok(ExprProto::Metadata { name: name.clone() }),
            NodeKind::MetadataLiteral { value } => Ok(ExprProto::MetadataLiteral { value: value.clone() }),
            NodeKind::Cast {
                expr,
                target_data_type,
                target_semantic,
            } => Ok(ExprProto::Cast {
                expr: Box::new(self.expr_to_proto(*expr)?),
                target_data_type: *target_data_type,
                target_semantic: *target_semantic,
            }),
            other => Err(CoreError::Internal {
                message: format!("{other:?} is not an expression"),
            }),
        }
    }
}

/// Encode a `DagProto` with bincode, the wire format used for
/// agent-to-agent plan transfer.
pub fn encode_dag(dag: &DagProto) -> CoreResult<Vec<u8>> {
    Ok(bincode::serialize(dag)?)
}

pub fn decode_dag(bytes: &[u8]) -> CoreResult<DagProto> {
    Ok(bincode::deserialize(bytes)?)
}

/// Bucket fragments' relation-by-table lookups for explain output —
/// maps each `MemorySource` table name to the fragment ids that read
/// it.
pub fn tables_by_fragment(dag: &DagProto) -> HashMap<String, Vec<u64>> {
    let mut out: HashMap<String, Vec<u64>> = HashMap::new();
    for fragment in &dag.fragments {
        for node in &fragment.nodes {
            if let OperatorProto::MemorySource { table, .. } = &node.op {
                out.entry(table.clone()).or_default().push(fragment.fragment_id);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Graph;

    #[test]
    fn round_trips_through_bincode() {
        let mut g = Graph::new();
        let src = g.add_node(NodeKind::MemorySource {
            table: "http_events".into(),
            column_names: vec!["latency_ns".into()],
        });
        g.add_node(NodeKind::MemorySink { name: "out".into() });
        let sink = g.find_nodes_of_type(crate::ir::node::NodeKindTag::MemorySink)[0];
        g.add_edge(src, sink).unwrap();

        let plan = g.to_plan_proto(Some("agent-1".into())).unwrap();
        let dag = DagProto {
            fragments: vec![plan.fragment],
        };
        let bytes = encode_dag(&dag).unwrap();
        let decoded = decode_dag(&bytes).unwrap();
        assert_eq!(decoded.fragments.len(), 1);
        assert_eq!(decoded.fragments[0].nodes.len(), 2);
    }

    #[test]
    fn tables_by_fragment_groups_sources() {
        let dag = DagProto {
            fragments: vec![PlanFragmentProto {
                fragment_id: 7,
                nodes: vec![OperatorNodeProto {
                    id: 0,
                    op: OperatorProto::MemorySource {
                        table: "http_events".into(),
                        column_names: vec![],
                    },
                    parents: vec![],
                }],
            }],
        };
        let tables = tables_by_fragment(&dag);
        assert_eq!(tables["http_events"], vec![7]);
    }
}
