//! Command-line entry point.
//!
//! Loads config, sets up logging, then dispatches to one of three
//! subcommands: list preset queries, dump a demo optimized plan, or
//! replay a captured CQL byte stream through the stitcher.

use std::collections::VecDeque;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use carnotstitch::config::Config;
use carnotstitch::ir::compiler_state::{CompilerState, RelationMap};
use carnotstitch::ir::node::BuiltinFunction;
use carnotstitch::ir::rules::Optimizer;
use carnotstitch::ir::types::{DataType, Relation};
use carnotstitch::ir::{Graph, NodeKind};
use carnotstitch::presets;
use carnotstitch::protocol::cql::{find_frame_boundary, parse_frame, stitch_frames, ReqOp};
use carnotstitch::protocol::wire::Direction;
use carnotstitch::{logging, CoreResult};

#[derive(Parser)]
#[command(name = "carnotstitch", about = "query-plan IR, CQL stitching, and uprobe tooling")]
struct Cli {
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the preset query catalog.
    Presets {
        #[arg(value_name = "TOML_FILE")]
        path: PathBuf,
    },
    /// Build a small demo plan (scan -> filter -> sink), run it
    /// through the optimizer, and print the serialized proto.
    Plan,
    /// Replay a raw captured CQL byte stream (request and response
    /// frames concatenated in a single file, in arrival order) and
    /// print stitched records.
    Stitch {
        #[arg(value_name = "CAPTURE_FILE")]
        path: PathBuf,
    },
}

fn main() -> CoreResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path.to_string_lossy().as_ref()).unwrap_or_else(|e| {
            eprintln!("failed to load config from {}: {e}", path.display());
            Config::default()
        }),
        None => Config::load().unwrap_or_default(),
    };
    let _logging_guard = logging::init(&config.logging, None);

    match cli.command {
        Command::Presets { path } => run_presets(&path),
        Command::Plan => run_plan(&config),
        Command::Stitch { path } => run_stitch(&path),
    }
}

fn run_presets(path: &std::path::Path) -> CoreResult<()> {
    let presets = presets::load_presets(path)?;
    for preset in &presets {
        println!("{}\t{}", preset.name, preset.query_text);
    }
    tracing::info!(count = presets.len(), "loaded preset queries");
    Ok(())
}

fn run_plan(config: &Config) -> CoreResult<()> {
    let relation = Relation::new(vec![
        ("upid".to_string(), DataType::UInt128),
        ("latency_ns".to_string(), DataType::Int64),
    ]);
    let column_names: Vec<String> = relation.column_names().map(str::to_string).collect();

    let mut graph = Graph::new();
    let source = graph.add_node(NodeKind::MemorySource {
        table: "http_events".to_string(),
        column_names,
    });

    let threshold = graph.add_node(NodeKind::Int(1_000_000));
    let column = graph.add_node(NodeKind::Column {
        name: "latency_ns".to_string(),
    });
    let predicate = graph.add_node(NodeKind::Func {
        name: BuiltinFunction::GreaterThan,
        args: vec![column, threshold],
    });
    let filter = graph.add_node(NodeKind::Filter { expr: Some(predicate) });
    graph.add_edge(source, filter)?;
    graph.optionally_clone_with_edge(filter, predicate)?;

    let sink = graph.add_node(NodeKind::MemorySink { name: "slow_requests".to_string() });
    graph.add_edge(filter, sink)?;

    let mut relation_map = RelationMap::new();
    relation_map.insert("http_events".to_string(), relation);
    let cs = CompilerState {
        relation_map,
        ..CompilerState::new()
    };

    graph.resolve_all_types(&cs)?;
    Optimizer::with_max_iterations(config.optimizer.max_iterations).optimize(&mut graph, &cs)?;

    let plan = graph.to_plan_proto(None)?;
    println!("{plan:#?}");
    Ok(())
}

fn run_stitch(path: &std::path::Path) -> CoreResult<()> {
    let bytes = std::fs::read(path)?;

    let mut req_frames = VecDeque::new();
    let mut resp_frames = VecDeque::new();
    let mut offset = 0usize;
    let mut timestamp_ns = 0i64;
    let mut resynced_bytes = 0usize;

    // This capture format concatenates both directions without tagging
    // which is which, so a corrupt prefix is resynced against whichever
    // direction's opcode set matches first.
    while offset < bytes.len() {
        match parse_frame(Direction::Recv, &bytes[offset..], timestamp_ns) {
            Ok((frame, consumed)) => {
                offset += consumed;
                timestamp_ns += 1;

                if ReqOp::try_from(frame.opcode).is_ok() {
                    req_frames.push_back(frame);
                } else {
                    resp_frames.push_back(frame);
                }
            }
            Err(carnotstitch::CoreError::NeedsMoreData) => break,
            Err(_) => {
                let send_boundary = find_frame_boundary(Direction::Send, &bytes[offset..], 1);
                let recv_boundary = find_frame_boundary(Direction::Recv, &bytes[offset..], 1);
                let skip = send_boundary.min(recv_boundary).max(1);
                resynced_bytes += skip;
                offset += skip;
            }
        }
    }

    let result = stitch_frames(&mut req_frames, &mut resp_frames);
    for record in &result.records {
        println!("{:?} -> {:?}", record.req, record.resp);
    }
    if resynced_bytes > 0 {
        tracing::warn!(bytes_skipped = resynced_bytes, "resynced past corrupt CQL frame prefix");
    }
    tracing::info!(
        records = result.records.len(),
        errors = result.error_count,
        "stitched capture"
    );
    Ok(())
}
