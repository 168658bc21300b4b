//! Filter push-down: move a `Filter` operator as close to its source
//! as the columns it references allow, so cheaper stages run first.
//!
//! Grounded on the distributed splitter's presplit filter push-down
//! rule (`filter_push_down_rule_test.cc`'s 13 scenarios) and
//! `filter_ir.cc`'s expression-ownership rules. A filter can move past
//! another `Filter` unconditionally (filters commute), and past a
//! `Map`/`BlockingAgg` only while every column it references is a
//! pass-through (rename) rather than a fresh computation — and only
//! while the node being passed has exactly one child, since pushing
//! past a shared ancestor would change what that ancestor's other
//! children see.

use std::collections::{HashMap, HashSet};

use crate::error::CoreResult;
use crate::ir::compiler_state::CompilerState;
use crate::ir::graph::Graph;
use crate::ir::node::{NodeId, NodeKind, NodeKindTag};
use crate::ir::rules::Rule;

pub struct FilterPushdownRule;

impl Rule for FilterPushdownRule {
    fn name(&self) -> &'static str {
        "filter_pushdown"
    }

    fn apply(&self, graph: &mut Graph, _cs: &CompilerState) -> CoreResult<bool> {
        let mut filters = graph.find_nodes_of_type(NodeKindTag::Filter);
        filters.sort_by_key(|id| id.0);
        let mut changed = false;
        for filter in filters {
            if attempt_push(graph, filter)? {
                changed = true;
            }
        }
        Ok(changed)
    }
}

/// Push a single filter as far toward its source as possible. Returns
/// whether it moved at all.
fn attempt_push(graph: &mut Graph, filter: NodeId) -> CoreResult<bool> {
    let expr = match &graph.node(filter)?.kind {
        NodeKind::Filter { expr: Some(e) } => *e,
        NodeKind::Filter { expr: None } => return Ok(false),
        _ => return Ok(false),
    };
    let mut columns = HashSet::new();
    collect_columns(graph, expr, &mut columns);

    let parents = graph.parents(filter);
    if parents.len() != 1 {
        return Ok(false);
    }
    let mut cur = parents[0];
    let mut chain = Vec::new();
    let stop_node;
    loop {
        let tag = graph.node(cur)?.kind.tag();
        if !matches!(tag, NodeKindTag::Map | NodeKindTag::BlockingAgg | NodeKindTag::Filter) {
            stop_node = cur;
            break;
        }
        if graph.children(cur).len() != 1 {
            stop_node = cur;
            break;
        }
        let renames = match &graph.node(cur)?.kind {
            NodeKind::Filter { .. } => Some(HashMap::new()),
            NodeKind::Map {
                col_exprs,
                keep_input_columns,
            } => rename_through_map(graph, col_exprs, *keep_input_columns, &columns),
            NodeKind::BlockingAgg {
                group_exprs,
                agg_exprs,
            } => rename_through_agg(graph, group_exprs, agg_exprs, &columns),
            _ => unreachable!(),
        };
        let Some(renames) = renames else {
            stop_node = cur;
            break;
        };
        if !renames.is_empty() {
            rewrite_columns(graph, expr, &renames)?;
            columns = columns
                .iter()
                .map(|c| renames.get(c).cloned().unwrap_or_else(|| c.clone()))
                .collect();
        }
        chain.push(cur);
        let next_parents = graph.parents(cur);
        if next_parents.len() != 1 {
            stop_node = cur;
            break;
        }
        cur = next_parents[0];
    }

    if chain.is_empty() {
        return Ok(false);
    }

    let old_parent = chain[0];
    let filter_children = graph.children(filter);
    if filter_children.len() != 1 {
        return Ok(false);
    }
    let old_child = filter_children[0];
    graph.delete_edge(old_parent, filter)?;
    graph.delete_edge(filter, old_child)?;
    graph.add_edge(old_parent, old_child)?;

    let innermost = *chain.last().unwrap();
    graph.delete_edge(stop_node, innermost)?;
    graph.add_edge(stop_node, filter)?;
    graph.add_edge(filter, innermost)?;

    Ok(true)
}

/// For each name in `required`, find the column it would be known as
/// one step further up, through this `Map`'s `col_exprs`. `None` means
/// at least one required column is computed here rather than renamed,
/// which blocks the push.
fn rename_through_map(
    graph: &Graph,
    col_exprs: &[(String, NodeId)],
    keep_input_columns: bool,
    required: &HashSet<String>,
) -> Option<HashMap<String, String>> {
    let mut renames = HashMap::new();
    for name in required {
        if let Some((_, e)) = col_exprs.iter().find(|(n, _)| n == name) {
            match &graph.node(*e).ok()?.kind {
                NodeKind::Column { name: src } => {
                    renames.insert(name.clone(), src.clone());
                }
                _ => return None,
            }
        } else if keep_input_columns {
            renames.insert(name.clone(), name.clone());
        } else {
            return None;
        }
    }
    Some(renames)
}

/// Same idea for `BlockingAgg`: `group_exprs` may be pass-throughs,
/// `agg_exprs` are always freshly computed and block the push.
fn rename_through_agg(
    graph: &Graph,
    group_exprs: &[(String, NodeId)],
    agg_exprs: &[(String, NodeId)],
    required: &HashSet<String>,
) -> Option<HashMap<String, String>> {
    let mut renames = HashMap::new();
    for name in required {
        if agg_exprs.iter().any(|(n, _)| n == name) {
            return None;
        }
        if let Some((_, e)) = group_exprs.iter().find(|(n, _)| n == name) {
            match &graph.node(*e).ok()?.kind {
                NodeKind::Column { name: src } => {
                    renames.insert(name.clone(), src.clone());
                }
                _ => return None,
            }
        } else {
            return None;
        }
    }
    Some(renames)
}

fn collect_columns(graph: &Graph, expr: NodeId, out: &mut HashSet<String>) {
    let Ok(node) = graph.node(expr) else { return };
    match &node.kind {
        NodeKind::Column { name } => {
            out.insert(name.clone());
        }
        NodeKind::Func { args, .. } => {
            for a in args {
                collect_columns(graph, *a, out);
            }
        }
        NodeKind::Cast { expr, .. } => collect_columns(graph, *expr, out),
        _ => {}
    }
}

fn rewrite_columns(graph: &mut Graph, expr: NodeId, renames: &HashMap<String, String>) -> CoreResult<()> {
    let children = match &graph.node(expr)?.kind {
        NodeKind::Func { args, .. } => args.clone(),
        NodeKind::Cast { expr, .. } => vec![*expr],
        _ => Vec::new(),
    };
    if let NodeKind::Column { name } = &mut graph.node_mut(expr)?.kind {
        if let Some(new_name) = renames.get(name) {
            *name = new_name.clone();
        }
    }
    for child in children {
        rewrite_columns(graph, child, renames)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::node::BuiltinFunction;

    fn column(graph: &mut Graph, name: &str) -> NodeId {
        graph.add_node(NodeKind::Column { name: name.into() })
    }

    fn int(graph: &mut Graph, v: i64) -> NodeId {
        graph.add_node(NodeKind::Int(v))
    }

    fn equals(graph: &mut Graph, a: NodeId, b: NodeId) -> NodeId {
        graph.add_node(NodeKind::Func {
            name: BuiltinFunction::Equals,
            args: vec![a, b],
        })
    }

    fn source(graph: &mut Graph, cols: &[&str]) -> NodeId {
        graph.add_node(NodeKind::MemorySource {
            table: "t".into(),
            column_names: cols.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn map(graph: &mut Graph, parent: NodeId, col_exprs: Vec<(&str, NodeId)>, keep: bool) -> NodeId {
        let exprs: Vec<NodeId> = col_exprs.iter().map(|(_, e)| *e).collect();
        let node = graph.add_node(NodeKind::Map {
            col_exprs: col_exprs.into_iter().map(|(n, e)| (n.to_string(), e)).collect(),
            keep_input_columns: keep,
        });
        graph.add_edge(parent, node).unwrap();
        for e in exprs {
            graph.optionally_clone_with_edge(node, e).unwrap();
        }
        node
    }

    fn filter(graph: &mut Graph, parent: NodeId, expr: NodeId) -> NodeId {
        let node = graph.add_node(NodeKind::Filter { expr: Some(expr) });
        graph.add_edge(parent, node).unwrap();
        graph.optionally_clone_with_edge(node, expr).unwrap();
        node
    }

    fn sink(graph: &mut Graph, parent: NodeId, name: &str) -> NodeId {
        let node = graph.add_node(NodeKind::MemorySink { name: name.into() });
        graph.add_edge(parent, node).unwrap();
        node
    }

    #[test]
    fn simple_no_op() {
        let mut g = Graph::new();
        let src = source(&mut g, &["abc", "xyz"]);
        let col = column(&mut g, "abc");
        let lit = int(&mut g, 10);
        let eq = equals(&mut g, col, lit);
        let f = filter(&mut g, src, eq);
        sink(&mut g, f, "foo");

        let cs = CompilerState::new();
        let changed = FilterPushdownRule.apply(&mut g, &cs).unwrap();
        assert!(!changed);
    }

    #[test]
    fn simple_push_past_one_map() {
        let mut g = Graph::new();
        let src = source(&mut g, &["abc", "xyz"]);
        let abc_ref1 = column(&mut g, "abc");
        let abc_ref2 = column(&mut g, "abc");
        let m = map(&mut g, src, vec![("abc_1", abc_ref1), ("abc", abc_ref2)], false);
        let col = column(&mut g, "abc");
        let lit = int(&mut g, 2);
        let eq = equals(&mut g, col, lit);
        let f = filter(&mut g, m, eq);
        sink(&mut g, f, "foo");

        let cs = CompilerState::new();
        let changed = FilterPushdownRule.apply(&mut g, &cs).unwrap();
        assert!(changed);
        assert_eq!(g.parents(f), vec![src]);
        assert_eq!(g.parents(m), vec![f]);
    }

    #[test]
    fn multicol_rename_collision_resolves_to_source_names() {
        let mut g = Graph::new();
        let src = source(&mut g, &["abc", "xyz"]);
        let swap1 = column(&mut g, "abc");
        let swap2 = column(&mut g, "xyz");
        let m1 = map(&mut g, src, vec![("xyz", swap1), ("abc", swap2)], false);
        let swap3 = column(&mut g, "abc");
        let swap4 = column(&mut g, "xyz");
        let m2 = map(&mut g, m1, vec![("xyz", swap3), ("abc", swap4)], false);
        let col = column(&mut g, "abc");
        let lit = int(&mut g, 2);
        let eq = equals(&mut g, col, lit);
        let f = filter(&mut g, m2, eq);
        sink(&mut g, f, "foo");

        let cs = CompilerState::new();
        let changed = FilterPushdownRule.apply(&mut g, &cs).unwrap();
        assert!(changed);
        assert_eq!(g.parents(f), vec![src]);
        assert_eq!(g.parents(m1), vec![f]);
        assert_eq!(g.parents(m2), vec![m1]);

        let NodeKind::Filter { expr: Some(e) } = &g.node(f).unwrap().kind else {
            panic!("expected filter");
        };
        let NodeKind::Func { args, .. } = &g.node(*e).unwrap().kind else {
            panic!("expected equals func");
        };
        let NodeKind::Column { name } = &g.node(args[0]).unwrap().kind else {
            panic!("expected column arg");
        };
        assert_eq!(name, "abc");
    }

    #[test]
    fn multiple_children_dont_push() {
        let mut g = Graph::new();
        let src = source(&mut g, &["abc", "xyz"]);
        let xyz = column(&mut g, "xyz");
        let mean = g.add_node(NodeKind::Func {
            name: BuiltinFunction::Mean,
            args: vec![xyz],
        });
        let abc_group = column(&mut g, "abc");
        let agg = g.add_node(NodeKind::BlockingAgg {
            group_exprs: vec![("abc".into(), abc_group)],
            agg_exprs: vec![("out".into(), mean)],
        });
        g.add_edge(src, agg).unwrap();
        g.optionally_clone_with_edge(agg, abc_group).unwrap();
        g.optionally_clone_with_edge(agg, mean).unwrap();

        let col = column(&mut g, "abc");
        let lit = int(&mut g, 2);
        let eq = equals(&mut g, col, lit);
        let f = filter(&mut g, agg, eq);
        sink(&mut g, f, "foo");
        sink(&mut g, agg, "bar");

        let cs = CompilerState::new();
        let changed = FilterPushdownRule.apply(&mut g, &cs).unwrap();
        assert!(!changed);
        assert_eq!(g.parents(f), vec![agg]);
    }
}
