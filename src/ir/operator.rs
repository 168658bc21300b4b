//! Operator-specific behavior layered on top of the arena: required
//! input columns, output-column pruning, and type resolution.
//!
//! Grounded on `original_source/src/carnot/planner/ir/ir.cc`'s
//! per-kind `ResolveType`/`RequiredInputColumns`/`PruneOutputColumnsToImpl`
//! dispatch and `filter_ir.cc`'s pass-through implementations for
//! `FilterIR`.

use std::collections::HashSet;

use crate::error::{CoreError, CoreResult};
use crate::ir::compiler_state::CompilerState;
use crate::ir::graph::Graph;
use crate::ir::node::{BuiltinFunction, NodeId, NodeKind};
use crate::ir::types::{DataType, Relation, SemanticType, TableType, ValueType};

impl Graph {
    /// `set_relation(Relation)`. Only meaningful for source operators,
    /// which carry an explicit schema rather than deriving one from a
    /// parent.
    pub fn set_relation(&mut self, op: NodeId, relation: Relation) -> CoreResult<()> {
        let node = self.node_mut(op)?;
        match &mut node.kind {
            NodeKind::MemorySource { column_names, .. } => {
                *column_names = relation.column_names().map(str::to_string).collect();
                Ok(())
            }
            NodeKind::EmptySource { relation: r } => {
                *r = Some(relation);
                Ok(())
            }
            _ => Err(CoreError::InvalidArgument {
                message: "set_relation only applies to source operators".into(),
            }),
        }
    }

    /// `required_input_columns() -> Vec<Set<String>>`, one set per
    /// parent, in parent order.
    pub fn required_input_columns(&self, op: NodeId) -> CoreResult<Vec<HashSet<String>>> {
        let parents = self.parents(op);
        let node = self.node(op)?;
        let columns = match &node.kind {
            NodeKind::Filter { expr } => {
                let mut cols = HashSet::new();
                if let Some(e) = expr {
                    self.collect_column_refs(*e, &mut cols);
                }
                vec![cols]
            }
            NodeKind::Map { col_exprs, .. } => {
                let mut cols = HashSet::new();
                for (_, e) in col_exprs {
                    self.collect_column_refs(*e, &mut cols);
                }
                vec![cols]
            }
            NodeKind::BlockingAgg {
                group_exprs,
                agg_exprs,
            } => {
                let mut cols = HashSet::new();
                for (_, e) in group_exprs.iter().chain(agg_exprs) {
                    self.collect_column_refs(*e, &mut cols);
                }
                vec![cols]
            }
            NodeKind::Union => parents.iter().map(|_| HashSet::new()).collect(),
            NodeKind::Join { left_on, right_on, .. } => {
                vec![
                    left_on.iter().cloned().collect(),
                    right_on.iter().cloned().collect(),
                ]
            }
            NodeKind::MemorySink { .. } | NodeKind::GRPCSink { .. } => {
                vec![HashSet::new()]
            }
            _ => {
                return Err(CoreError::InvalidArgument {
                    message: "required_input_columns only applies to operators with parents".into(),
                })
            }
        };
        Ok(columns)
    }

    fn collect_column_refs(&self, expr: NodeId, out: &mut HashSet<String>) {
        let Ok(node) = self.node(expr) else { return };
        match &node.kind {
            NodeKind::Column { name } => {
                out.insert(name.clone());
            }
            NodeKind::Func { args, .. } => {
                for a in args {
                    self.collect_column_refs(*a, out);
                }
            }
            NodeKind::Cast { expr, .. } => self.collect_column_refs(*expr, out),
            _ => {}
        }
    }

    /// `prune_output_columns_to(kept) -> Set<String>`: the set actually
    /// retained, propagated upward from sinks.
    pub fn prune_output_columns_to(&mut self, op: NodeId, kept: HashSet<String>) -> CoreResult<HashSet<String>> {
        let node = self.node(op)?;
        match &node.kind {
            NodeKind::MemorySource { column_names, .. } => {
                let retained: Vec<String> = column_names
                    .iter()
                    .filter(|c| kept.contains(*c))
                    .cloned()
                    .collect();
                let retained_set: HashSet<String> = retained.iter().cloned().collect();
                if let NodeKind::MemorySource { column_names, .. } = &mut self.node_mut(op)?.kind {
                    *column_names = retained;
                }
                Ok(retained_set)
            }
            NodeKind::Map { col_exprs, .. } => {
                Ok(col_exprs
                    .iter()
                    .filter(|(name, _)| kept.contains(name))
                    .map(|(name, _)| name.clone())
                    .collect())
            }
            _ => {
                // Pass-through operators (Filter, Union, sinks, ...)
                // retain exactly what's asked for; they cannot drop
                // columns themselves.
                Ok(kept)
            }
        }
    }

    /// Resolve types for every operator in topological order. Stores
    /// the resolved `TableType` on each node (via `resolved_type`) and
    /// returns the final sink's type, if any.
    pub fn resolve_all_types(&mut self, cs: &CompilerState) -> CoreResult<()> {
        let order = self.topological_sort()?;
        for op in order {
            let tt = self.resolve_type(op, cs)?;
            self.node_mut(op)?.resolved_type = Some(crate::ir::node::ResolvedType::Table(tt));
        }
        Ok(())
    }

    fn parent_table_type(&self, parent: NodeId) -> CoreResult<TableType> {
        match &self.node(parent)?.resolved_type {
            Some(crate::ir::node::ResolvedType::Table(tt)) => Ok(tt.clone()),
            _ => Err(CoreError::Internal {
                message: format!("parent {parent:?} has not been type-resolved yet"),
            }),
        }
    }

    /// `resolve_type(CompilerState) -> TableType`, topological-order
    /// dispatch over operator kinds.
    pub fn resolve_type(&self, op: NodeId, cs: &CompilerState) -> CoreResult<TableType> {
        let parents = self.parents(op);
        match &self.node(op)?.kind {
            NodeKind::MemorySource { table, column_names } => {
                let relation = cs.relation_map.get(table).ok_or_else(|| CoreError::UnknownTable {
                    name: table.clone(),
                })?;
                let mut tt = TableType::new();
                for name in column_names {
                    let dt = relation.data_type_of(name).ok_or_else(|| CoreError::Internal {
                        message: format!("column {name} not present in relation {table}"),
                    })?;
                    tt.insert(name.clone(), ValueType::new(dt));
                }
                Ok(tt)
            }
            NodeKind::EmptySource { relation } => {
                let mut tt = TableType::new();
                if let Some(r) = relation {
                    for (name, dt) in r.columns() {
                        tt.insert(name.clone(), ValueType::new(*dt));
                    }
                }
                Ok(tt)
            }
            NodeKind::Map {
                col_exprs,
                keep_input_columns,
            } => {
                let parent_tt = self.parent_table_type(single_parent(&parents)?)?;
                let mut tt = if *keep_input_columns {
                    parent_tt.clone()
                } else {
                    TableType::new()
                };
                for (name, expr) in col_exprs {
                    let vt = self.resolve_expr_type(*expr, &[&parent_tt], cs)?;
                    tt.insert(name.clone(), vt);
                }
                Ok(tt)
            }
            NodeKind::Filter { .. } | NodeKind::MemorySink { .. } | NodeKind::GRPCSink { .. } => {
                self.parent_table_type(single_parent(&parents)?)
            }
            NodeKind::Union => {
                let mut types = parents.iter().map(|p| self.parent_table_type(*p));
                let first = types.next().ok_or_else(|| CoreError::InvalidArgument {
                    message: "Union requires at least one parent".into(),
                })??;
                for t in types {
                    if t? != first {
                        return Err(CoreError::SchemaMismatch {
                            message: "Union inputs disagree on schema".into(),
                        });
                    }
                }
                Ok(first)
            }
            NodeKind::BlockingAgg {
                group_exprs,
                agg_exprs,
            } => {
                let parent_tt = self.parent_table_type(single_parent(&parents)?)?;
                let mut tt = TableType::new();
                for (name, expr) in group_exprs {
                    let vt = self.resolve_expr_type(*expr, &[&parent_tt], cs)?;
                    tt.insert(name.clone(), vt);
                }
                for (name, expr) in agg_exprs {
                    let vt = self.resolve_expr_type(*expr, &[&parent_tt], cs)?;
                    tt.insert(name.clone(), vt);
                }
                Ok(tt)
            }
            NodeKind::Join { .. } => {
                if parents.len() != 2 {
                    return Err(CoreError::InvalidArgument {
                        message: "Join requires exactly 2 parents".into(),
                    });
                }
                let left = self.parent_table_type(parents[0])?;
                let right = self.parent_table_type(parents[1])?;
                let mut tt = left.clone();
                for name in right.column_names() {
                    if left.get(name).is_some() {
                        return Err(CoreError::SchemaMismatch {
                            message: format!("join sides both define column {name}"),
                        });
                    }
                    tt.insert(name.to_string(), *right.get(name).unwrap());
                }
                Ok(tt)
            }
            other => Err(CoreError::InvalidArgument {
                message: format!("resolve_type called on non-operator node {other:?}"),
            }),
        }
    }

    fn resolve_expr_type(&self, expr: NodeId, parents: &[&TableType], cs: &CompilerState) -> CoreResult<ValueType> {
        match &self.node(expr)?.kind {
            NodeKind::Column { name } => parents
                .iter()
                .find_map(|tt| tt.get(name))
                .copied()
                .ok_or_else(|| CoreError::Compiler {
                    message: format!("column {name} not found in parent relations"),
                    span: None,
                }),
            NodeKind::Int(_) => Ok(ValueType::new(DataType::Int64)),
            NodeKind::Float(_) => Ok(ValueType::new(DataType::Float64)),
            NodeKind::String(_) => Ok(ValueType::new(DataType::String)),
            NodeKind::UInt128(_) => Ok(ValueType::new(DataType::UInt128)),
            NodeKind::Time(_) => Ok(ValueType::new(DataType::Time64Ns)),
            NodeKind::Metadata { .. } | NodeKind::MetadataLiteral { .. } => {
                Ok(ValueType::with_semantic(DataType::String, SemanticType::ServiceName))
            }
            NodeKind::Cast {
                expr,
                target_data_type,
                target_semantic,
            } => {
                let inner = self.resolve_expr_type(*expr, parents, cs)?;
                inner.cast_semantic(*target_data_type, *target_semantic)
            }
            NodeKind::Func { name, args } => {
                let sig = cs.function_registry.lookup(*name);
                if !matches!(name, BuiltinFunction::Count) && args.len() != sig.arg_types.len() && sig.arg_types.len() > 1 {
                    return Err(CoreError::Compiler {
                        message: format!("{name:?} expects {} args, got {}", sig.arg_types.len(), args.len()),
                        span: None,
                    });
                }
                for a in args {
                    self.resolve_expr_type(*a, parents, cs)?;
                }
                Ok(ValueType::new(sig.return_type))
            }
            other => Err(CoreError::Internal {
                message: format!("resolve_expr_type called on operator node {other:?}"),
            }),
        }
    }
}

fn single_parent(parents: &[NodeId]) -> CoreResult<NodeId> {
    match parents {
        [p] => Ok(*p),
        _ => Err(CoreError::InvalidArgument {
            message: format!("expected exactly one parent, got {}", parents.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::graph::Graph;
    use crate::ir::node::NodeKind;

    fn setup_source(cs: &mut CompilerState, g: &mut Graph) -> NodeId {
        cs.relation_map.insert(
            "t",
            Relation::new(vec![
                ("abc".into(), DataType::Int64),
                ("xyz".into(), DataType::Int64),
            ]),
        );
        g.add_node(NodeKind::MemorySource {
            table: "t".into(),
            column_names: vec!["abc".into(), "xyz".into()],
        })
    }

    #[test]
    fn resolve_type_memory_source() {
        let mut cs = CompilerState::new();
        let mut g = Graph::new();
        let src = setup_source(&mut cs, &mut g);
        let tt = g.resolve_type(src, &cs).unwrap();
        assert_eq!(tt.len(), 2);
        assert_eq!(tt.get("abc").unwrap().data_type, DataType::Int64);
    }

    #[test]
    fn resolve_type_filter_passes_through() {
        let mut cs = CompilerState::new();
        let mut g = Graph::new();
        let src = setup_source(&mut cs, &mut g);
        let filter = g.add_node(NodeKind::Filter { expr: None });
        g.add_edge(src, filter).unwrap();
        g.resolve_all_types(&cs).unwrap();
        let src_tt = g.resolve_type(src, &cs).unwrap();
        let filt_tt = g.resolve_type(filter, &cs).unwrap();
        assert_eq!(src_tt, filt_tt);
    }

    #[test]
    fn union_rejects_mismatched_schema() {
        let mut cs = CompilerState::new();
        let mut g = Graph::new();
        let a = setup_source(&mut cs, &mut g);
        cs.relation_map.insert("u", Relation::new(vec![("only".into(), DataType::String)]));
        let b = g.add_node(NodeKind::MemorySource {
            table: "u".into(),
            column_names: vec!["only".into()],
        });
        let union = g.add_node(NodeKind::Union);
        g.add_edge(a, union).unwrap();
        g.add_edge(b, union).unwrap();
        g.node_mut(a).unwrap().resolved_type =
            Some(crate::ir::node::ResolvedType::Table(g.resolve_type(a, &cs).unwrap()));
        g.node_mut(b).unwrap().resolved_type =
            Some(crate::ir::node::ResolvedType::Table(g.resolve_type(b, &cs).unwrap()));
        assert!(g.resolve_type(union, &cs).is_err());
    }
}
