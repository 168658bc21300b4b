//! End-to-end exercises of the public IR API: build a plan, resolve
//! types, optimize, and serialize, checking the result shape rather
//! than internal rule mechanics (those are covered by
//! `ir::rules::filter_pushdown`'s own unit tests).

use carnotstitch::ir::compiler_state::{CompilerState, RelationMap};
use carnotstitch::ir::node::BuiltinFunction;
use carnotstitch::ir::proto::OperatorProto;
use carnotstitch::ir::rules::Optimizer;
use carnotstitch::ir::types::{DataType, Relation};
use carnotstitch::ir::{Graph, NodeKind};

/// Scenario 2 from the testable-properties list: a filter referencing
/// a renamed column rewrites and pushes below the map that renamed it.
#[test]
fn filter_on_renamed_column_pushes_below_rename() {
    let mut graph = Graph::new();
    let source = graph.add_node(NodeKind::MemorySource {
        table: "t".to_string(),
        column_names: vec!["abc".to_string(), "xyz".to_string()],
    });

    let abc_ref = graph.add_node(NodeKind::Column { name: "abc".to_string() });
    let map1 = graph.add_node(NodeKind::Map {
        col_exprs: vec![("def".to_string(), abc_ref)],
        keep_input_columns: false,
    });
    graph.add_edge(source, map1).unwrap();
    graph.optionally_clone_with_edge(map1, abc_ref).unwrap();

    let three = graph.add_node(NodeKind::Int(3));
    let def_ref = graph.add_node(NodeKind::Column { name: "def".to_string() });
    let map2 = graph.add_node(NodeKind::Map {
        col_exprs: vec![("xyz".to_string(), three), ("def".to_string(), def_ref)],
        keep_input_columns: false,
    });
    graph.add_edge(map1, map2).unwrap();
    graph.optionally_clone_with_edge(map2, three).unwrap();
    graph.optionally_clone_with_edge(map2, def_ref).unwrap();

    let def_filter_ref = graph.add_node(NodeKind::Column { name: "def".to_string() });
    let two = graph.add_node(NodeKind::Int(2));
    let predicate = graph.add_node(NodeKind::Func {
        name: BuiltinFunction::Equals,
        args: vec![def_filter_ref, two],
    });
    let filter = graph.add_node(NodeKind::Filter { expr: Some(predicate) });
    graph.add_edge(map2, filter).unwrap();
    graph.optionally_clone_with_edge(filter, predicate).unwrap();

    let sink = graph.add_node(NodeKind::MemorySink { name: "out".to_string() });
    graph.add_edge(filter, sink).unwrap();

    let mut relation_map = RelationMap::new();
    relation_map.insert(
        "t",
        Relation::new(vec![
            ("abc".to_string(), DataType::Int64),
            ("xyz".to_string(), DataType::Int64),
        ]),
    );
    let cs = CompilerState {
        relation_map,
        ..CompilerState::new()
    };

    Optimizer::new().optimize(&mut graph, &cs).unwrap();

    // Filter now sits directly on top of the source, below map1.
    let filter_parents = graph.parents(filter);
    assert_eq!(filter_parents, vec![source]);
    let filter_children = graph.children(filter);
    assert_eq!(filter_children, vec![map1]);
}

/// Building, resolving, optimizing, and serializing a plan end to end
/// produces a proto whose sink is still reachable and whose filter
/// survived the round trip.
#[test]
fn optimized_plan_serializes_to_proto() {
    let mut graph = Graph::new();
    let source = graph.add_node(NodeKind::MemorySource {
        table: "http_events".to_string(),
        column_names: vec!["latency_ns".to_string()],
    });
    let column = graph.add_node(NodeKind::Column { name: "latency_ns".to_string() });
    let threshold = graph.add_node(NodeKind::Int(1_000_000));
    let predicate = graph.add_node(NodeKind::Func {
        name: BuiltinFunction::GreaterThan,
        args: vec![column, threshold],
    });
    let filter = graph.add_node(NodeKind::Filter { expr: Some(predicate) });
    graph.add_edge(source, filter).unwrap();
    graph.optionally_clone_with_edge(filter, predicate).unwrap();
    let sink = graph.add_node(NodeKind::MemorySink { name: "slow_requests".to_string() });
    graph.add_edge(filter, sink).unwrap();

    let mut relation_map = RelationMap::new();
    relation_map.insert(
        "http_events",
        Relation::new(vec![("latency_ns".to_string(), DataType::Int64)]),
    );
    let cs = CompilerState {
        relation_map,
        ..CompilerState::new()
    };

    graph.resolve_all_types(&cs).unwrap();
    Optimizer::new().optimize(&mut graph, &cs).unwrap();

    let plan = graph.to_plan_proto(Some("agent-1".to_string())).unwrap();
    assert_eq!(plan.agent_id.as_deref(), Some("agent-1"));
    let fragment = &plan.fragment;
    assert!(fragment
        .nodes
        .iter()
        .any(|n| matches!(n.op, OperatorProto::MemorySink { .. })));
    assert!(fragment
        .nodes
        .iter()
        .any(|n| matches!(n.op, OperatorProto::Filter { expr: Some(_) })));
}
