//! The IR graph: an arena of nodes addressed by integer id, with two
//! parallel edge relations (structural operator dependencies and
//! expression ownership) and the mutation primitives that preserve the
//! invariants in spec §3.1.
//!
//! Grounded on `original_source/src/carnot/planner/ir/ir.cc` (node
//! lifecycle, `DeleteOrphansInSubtree`, `IndependentGraphs`) and
//! `filter_ir.cc` (`SetFilterExpr`'s attach/replace ordering). No
//! `Rc`/`Arc` back-edges: every reference is a `NodeId`, per DESIGN
//! NOTES §9.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{CoreError, CoreResult};
use crate::ir::node::{IdAllocator, Node, NodeId, NodeKind, NodeKindTag};

/// The query-plan IR graph. Exactly one graph exists per compilation
/// (spec §5: IR core is single-threaded, one graph per compilation).
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, Node>,
    ids: IdAllocator,

    /// operator -> operators it structurally depends on (its parents).
    struct_parents: HashMap<NodeId, Vec<NodeId>>,
    /// operator -> operators that structurally depend on it (its children).
    struct_children: HashMap<NodeId, Vec<NodeId>>,

    /// expression node -> its current owner (an operator or a containing
    /// `Func` expression). Absence means "no parent" (orphaned or never
    /// attached).
    expr_parent: HashMap<NodeId, NodeId>,
    /// operator -> expression-subtree roots it owns directly (e.g. a
    /// `Filter`'s predicate, a `Map`'s `col_exprs` values). Kept
    /// alongside each operator's own fields so graph-level deletion
    /// doesn't need per-kind logic duplicated everywhere.
    owned_expr_roots: HashMap<NodeId, Vec<NodeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    // ---- node access ----

    pub fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.nodes.get(&id).ok_or_else(|| CoreError::InvalidArgument {
            message: format!("no such node: {id:?}"),
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> CoreResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or_else(|| CoreError::InvalidArgument {
            message: format!("no such node: {id:?}"),
        })
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn operator_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.kind.is_operator())
            .map(|n| n.id)
            .collect()
    }

    // ---- construction ----

    /// `add_node(kind) -> id`. Newly added expression nodes have no
    /// owner until attached via [`Graph::optionally_clone_with_edge`].
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.ids.next();
        if kind.is_operator() {
            self.struct_parents.entry(id).or_default();
            self.struct_children.entry(id).or_default();
            self.owned_expr_roots.entry(id).or_default();
        }
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    /// `add_edge(from, to)`: a structural parent→child edge (the child
    /// depends on the parent's output). Rejects cycles (I1).
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> CoreResult<()> {
        if !self.node(from)?.kind.is_operator() || !self.node(to)?.kind.is_operator() {
            return Err(CoreError::InvalidArgument {
                message: "structural edges connect operators only".into(),
            });
        }
        if from == to || self.reaches(to, from) {
            return Err(CoreError::InvalidArgument {
                message: format!("edge {from:?} -> {to:?} would introduce a cycle"),
            });
        }
        self.struct_children.entry(from).or_default().push(to);
        self.struct_parents.entry(to).or_default().push(from);
        Ok(())
    }

    /// `delete_edge(from, to)`.
    pub fn delete_edge(&mut self, from: NodeId, to: NodeId) -> CoreResult<()> {
        let removed_child = self
            .struct_children
            .get_mut(&from)
            .map(|v| remove_one(v, to))
            .unwrap_or(false);
        let removed_parent = self
            .struct_parents
            .get_mut(&to)
            .map(|v| remove_one(v, from))
            .unwrap_or(false);
        if !removed_child || !removed_parent {
            return Err(CoreError::InvalidArgument {
                message: format!("no such edge: {from:?} -> {to:?}"),
            });
        }
        Ok(())
    }

    /// Is `to` reachable from `from` via structural child edges?
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if !seen.insert(n) {
                continue;
            }
            if let Some(children) = self.struct_children.get(&n) {
                stack.extend(children.iter().copied());
            }
        }
        false
    }

    pub fn parents(&self, op: NodeId) -> Vec<NodeId> {
        self.struct_parents.get(&op).cloned().unwrap_or_default()
    }

    pub fn children(&self, op: NodeId) -> Vec<NodeId> {
        self.struct_children.get(&op).cloned().unwrap_or_default()
    }

    // ---- expression ownership ----

    /// `OptionallyCloneWithEdge(parent, expr)`. If `expr` already has a
    /// parent other than `parent`, deep-copy the expression subtree and
    /// attach the copy; otherwise reuse. The *sole* means by which
    /// expression sharing is prevented (spec §4.1.2).
    pub fn optionally_clone_with_edge(&mut self, parent: NodeId, expr: NodeId) -> CoreResult<NodeId> {
        if !self.node(expr)?.kind.is_expression() {
            return Err(CoreError::InvalidArgument {
                message: "expression edges attach expression nodes only".into(),
            });
        }
        let target = match self.expr_parent.get(&expr) {
            Some(owner) if *owner != parent => self.deep_clone_expr(expr)?,
            _ => expr,
        };
        self.expr_parent.insert(target, parent);
        if self.node(parent)?.kind.is_operator() {
            let roots = self.owned_expr_roots.entry(parent).or_default();
            if !roots.contains(&target) {
                roots.push(target);
            }
        }
        Ok(target)
    }

    fn deep_clone_expr(&mut self, id: NodeId) -> CoreResult<NodeId> {
        let kind = self.node(id)?.kind.clone();
        let new_kind = match kind {
            NodeKind::Func { name, args } => {
                let mut new_args = Vec::with_capacity(args.len());
                for a in args {
                    new_args.push(self.deep_clone_expr(a)?);
                }
                NodeKind::Func { name, args: new_args }
            }
            NodeKind::Cast {
                expr,
                target_data_type,
                target_semantic,
            } => NodeKind::Cast {
                expr: self.deep_clone_expr(expr)?,
                target_data_type,
                target_semantic,
            },
            other => other,
        };
        let new_id = self.add_node(new_kind.clone());
        for child in new_kind.expr_children() {
            self.expr_parent.insert(child, new_id);
        }
        Ok(new_id)
    }

    /// `DeleteOrphansInSubtree(id)`. If `id` has any remaining parents,
    /// do nothing; else delete `id` and recurse on each former child
    /// (I5).
    pub fn delete_orphans_in_subtree(&mut self, id: NodeId) -> CoreResult<()> {
        if !self.nodes.contains_key(&id) {
            return Ok(());
        }
        if self.expr_parent.contains_key(&id) {
            return Ok(());
        }
        let children = self.node(id)?.kind.expr_children();
        self.nodes.remove(&id);
        for child in children {
            if self.expr_parent.get(&child).copied() == Some(id) {
                self.expr_parent.remove(&child);
            }
            self.delete_orphans_in_subtree(child)?;
        }
        Ok(())
    }

    /// Detach `expr` from its current owner without deleting it —
    /// step 3 of the attach/replace pattern ("delete edge to old
    /// child") when `expr` is an expression root, before calling
    /// `delete_orphans_in_subtree`.
    pub fn detach_expr(&mut self, expr: NodeId) {
        if let Some(owner) = self.expr_parent.remove(&expr) {
            if let Some(roots) = self.owned_expr_roots.get_mut(&owner) {
                remove_one(roots, expr);
            }
        }
    }

    pub fn expr_owner(&self, expr: NodeId) -> Option<NodeId> {
        self.expr_parent.get(&expr).copied()
    }

    pub fn owned_expr_roots(&self, op: NodeId) -> Vec<NodeId> {
        self.owned_expr_roots.get(&op).cloned().unwrap_or_default()
    }

    // ---- deletion ----

    /// `delete_node(id)`: removes a single node's slot. The caller must
    /// already have detached all structural and expression edges
    /// referencing it (no implicit cascade) — use `delete_subtree` when
    /// cascading deletion is wanted.
    pub fn delete_node(&mut self, id: NodeId) -> CoreResult<()> {
        if !self.parents(id).is_empty() || !self.children(id).is_empty() {
            return Err(CoreError::Internal {
                message: format!("cannot delete {id:?}: still has structural edges"),
            });
        }
        if self.expr_parent.contains_key(&id) {
            return Err(CoreError::Internal {
                message: format!("cannot delete {id:?}: still owned by {:?}", self.expr_parent[&id]),
            });
        }
        self.nodes.remove(&id);
        self.struct_parents.remove(&id);
        self.struct_children.remove(&id);
        self.owned_expr_roots.remove(&id);
        Ok(())
    }

    /// `delete_subtree(id)`: deletes an operator (detaching it from its
    /// structural neighbors first) together with every expression
    /// subtree it owns, or deletes a bare expression subtree.
    pub fn delete_subtree(&mut self, id: NodeId) -> CoreResult<()> {
        let is_operator = self.node(id)?.kind.is_operator();
        if is_operator {
            for p in self.parents(id) {
                let _ = self.delete_edge(p, id);
            }
            for c in self.children(id) {
                let _ = self.delete_edge(id, c);
            }
            let roots = self.owned_expr_roots(id);
            for root in roots {
                self.detach_expr(root);
                self.delete_orphans_in_subtree(root)?;
            }
            self.delete_node(id)
        } else {
            self.detach_expr(id);
            self.delete_orphans_in_subtree(id)
        }
    }

    // ---- cloning ----

    /// `clone()`: deep-copies the whole graph under fresh ids. No node
    /// id is shared between original and clone.
    pub fn deep_clone(&self) -> Graph {
        let mut ordered: Vec<NodeId> = self.nodes.keys().copied().collect();
        ordered.sort();

        let mut out = Graph::new();
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();

        for old_id in &ordered {
            let node = &self.nodes[old_id];
            let new_kind = remap_kind(&node.kind, &remap);
            let new_id = out.add_node(new_kind);
            remap.insert(*old_id, new_id);
        }
        for old_id in &ordered {
            let new_id = remap[old_id];
            out.nodes.get_mut(&new_id).unwrap().resolved_type = self.nodes[old_id].resolved_type.clone();
        }
        for (child, parent) in &self.expr_parent {
            out.expr_parent.insert(remap[child], remap[parent]);
        }
        for (op, roots) in &self.owned_expr_roots {
            out.owned_expr_roots
                .insert(remap[op], roots.iter().map(|r| remap[r]).collect());
        }
        for (op, children) in &self.struct_children {
            out.struct_children
                .insert(remap[op], children.iter().map(|c| remap[c]).collect());
        }
        for (op, parents) in &self.struct_parents {
            out.struct_parents
                .insert(remap[op], parents.iter().map(|p| remap[p]).collect());
        }
        out
    }

    /// `copy_selected_nodes_and_deps`: clone only the structural
    /// sub-DAG reachable backward from `ids` (operators plus everything
    /// that feeds them), keyed under fresh ids. Used when splitting a
    /// plan fragment out of a larger graph.
    pub fn copy_selected_nodes_and_deps(&self, ids: &[NodeId]) -> CoreResult<Graph> {
        let mut needed: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = ids.to_vec();
        while let Some(id) = stack.pop() {
            if !needed.insert(id) {
                continue;
            }
            stack.extend(self.parents(id));
        }
        let mut ordered: Vec<NodeId> = needed.into_iter().collect();
        ordered.sort();

        let mut out = Graph::new();
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        for old_id in &ordered {
            let node = self.node(*old_id)?;
            let mut kind = node.kind.clone();
            // expression subtrees are cloned in full (fresh ids), since
            // they don't participate in the structural `needed` set.
            kind = clone_expr_fields(self, &kind, &mut out, &mut remap)?;
            let new_id = out.add_node(kind);
            remap.insert(*old_id, new_id);
        }
        for old_id in &ordered {
            for child in self.struct_children.get(old_id).cloned().unwrap_or_default() {
                if let (Some(&a), Some(&b)) = (remap.get(old_id), remap.get(&child)) {
                    out.add_edge(a, b)?;
                }
            }
        }
        Ok(out)
    }

    // ---- prune / keep ----

    /// `prune(ids)`: removes the given node ids (and anything they
    /// orphan) from the graph.
    pub fn prune(&mut self, ids: &[NodeId]) -> CoreResult<()> {
        for id in ids {
            if self.nodes.contains_key(id) {
                self.delete_subtree(*id)?;
            }
        }
        Ok(())
    }

    /// `keep(ids)`: removes every node *not* in `ids`. `keep(all)` is
    /// the identity.
    pub fn keep(&mut self, ids: &[NodeId]) -> CoreResult<()> {
        let keep_set: HashSet<NodeId> = ids.iter().copied().collect();
        let complement: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !keep_set.contains(id))
            .copied()
            .collect();
        self.prune(&complement)
    }

    // ---- traversal / queries ----

    /// Topological order over operator nodes (Kahn's algorithm).
    pub fn topological_sort(&self) -> CoreResult<Vec<NodeId>> {
        let mut indegree: HashMap<NodeId, usize> = HashMap::new();
        for op in self.operator_ids() {
            indegree.insert(op, self.parents(op).len());
        }
        let mut queue: VecDeque<NodeId> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(indegree.len());
        while let Some(n) = queue.pop_front() {
            order.push(n);
            for child in self.children(n) {
                let d = indegree.get_mut(&child).unwrap();
                *d -= 1;
                if *d == 0 {
                    queue.push_back(child);
                }
            }
        }
        if order.len() != indegree.len() {
            return Err(CoreError::Internal {
                message: "cycle detected during topological sort".into(),
            });
        }
        Ok(order)
    }

    pub fn find_nodes_of_type(&self, tag: NodeKindTag) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.kind.tag() == tag)
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }

    pub fn find_nodes_that_match(&self, pattern: impl Fn(&Node) -> bool) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| pattern(n))
            .map(|n| n.id)
            .collect();
        ids.sort();
        ids
    }

    /// `independent_subgraphs()`: union-find over operators reachable
    /// from each source, merging sets on shared descendants. Grounded
    /// on `ir.cc`'s `IndependentGraphs`.
    pub fn independent_subgraphs(&self) -> Vec<Vec<NodeId>> {
        let mut parent_of: HashMap<NodeId, NodeId> = HashMap::new();
        for op in self.operator_ids() {
            parent_of.insert(op, op);
        }

        fn find(parent_of: &mut HashMap<NodeId, NodeId>, x: NodeId) -> NodeId {
            if parent_of[&x] == x {
                return x;
            }
            let root = find(parent_of, parent_of[&x]);
            parent_of.insert(x, root);
            root
        }
        fn union(parent_of: &mut HashMap<NodeId, NodeId>, a: NodeId, b: NodeId) {
            let ra = find(parent_of, a);
            let rb = find(parent_of, b);
            if ra != rb {
                parent_of.insert(ra, rb);
            }
        }

        let sources: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| matches!(n.kind.tag(), NodeKindTag::MemorySource | NodeKindTag::EmptySource))
            .map(|n| n.id)
            .collect();

        for source in sources {
            let mut seen = HashSet::new();
            let mut queue = VecDeque::new();
            queue.push_back(source);
            while let Some(n) = queue.pop_front() {
                if !seen.insert(n) {
                    continue;
                }
                union(&mut parent_of, source, n);
                for child in self.children(n) {
                    queue.push_back(child);
                }
            }
        }

        let mut groups: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let keys: Vec<NodeId> = parent_of.keys().copied().collect();
        for op in keys {
            let root = find(&mut parent_of, op);
            groups.entry(root).or_default().push(op);
        }
        let mut out: Vec<Vec<NodeId>> = groups.into_values().collect();
        for g in &mut out {
            g.sort();
        }
        out.sort_by_key(|g| g[0]);
        out
    }
}

fn remove_one(v: &mut Vec<NodeId>, target: NodeId) -> bool {
    if let Some(pos) = v.iter().position(|&x| x == target) {
        v.remove(pos);
        true
    } else {
        false
    }
}

fn remap_kind(kind: &NodeKind, remap: &HashMap<NodeId, NodeId>) -> NodeKind {
    let r = |id: &NodeId| *remap.get(id).unwrap_or(id);
    match kind.clone() {
        NodeKind::Map {
            col_exprs,
            keep_input_columns,
        } => NodeKind::Map {
            col_exprs: col_exprs.into_iter().map(|(n, e)| (n, r(&e))).collect(),
            keep_input_columns,
        },
        NodeKind::Filter { expr } => NodeKind::Filter {
            expr: expr.map(|e| r(&e)),
        },
        NodeKind::BlockingAgg {
            group_exprs,
            agg_exprs,
        } => NodeKind::BlockingAgg {
            group_exprs: group_exprs.into_iter().map(|(n, e)| (n, r(&e))).collect(),
            agg_exprs: agg_exprs.into_iter().map(|(n, e)| (n, r(&e))).collect(),
        },
        NodeKind::Func { name, args } => NodeKind::Func {
            name,
            args: args.iter().map(r).collect(),
        },
        NodeKind::Cast {
            expr,
            target_data_type,
            target_semantic,
        } => NodeKind::Cast {
            expr: r(&expr),
            target_data_type,
            target_semantic,
        },
        other => other,
    }
}

fn clone_expr_fields(
    src: &Graph,
    kind: &NodeKind,
    out: &mut Graph,
    remap: &mut HashMap<NodeId, NodeId>,
) -> CoreResult<NodeKind> {
    fn clone_one(src: &Graph, out: &mut Graph, remap: &mut HashMap<NodeId, NodeId>, id: NodeId) -> CoreResult<NodeId> {
        if let Some(&existing) = remap.get(&id) {
            return Ok(existing);
        }
        let kind = src.node(id)?.kind.clone();
        let new_kind = match kind {
            NodeKind::Func { name, args } => {
                let mut new_args = Vec::with_capacity(args.len());
                for a in args {
                    new_args.push(clone_one(src, out, remap, a)?);
                }
                NodeKind::Func { name, args: new_args }
            }
            NodeKind::Cast {
                expr,
                target_data_type,
                target_semantic,
            } => NodeKind::Cast {
                expr: clone_one(src, out, remap, expr)?,
                target_data_type,
                target_semantic,
            },
            other => other,
        };
        let new_id = out.add_node(new_kind.clone());
        for child in new_kind.expr_children() {
            out.expr_parent.insert(child, new_id);
        }
        remap.insert(id, new_id);
        Ok(new_id)
    }

    Ok(match kind.clone() {
        NodeKind::Map {
            col_exprs,
            keep_input_columns,
        } => {
            let mut new_exprs = Vec::with_capacity(col_exprs.len());
            for (n, e) in col_exprs {
                let new_e = clone_one(src, out, remap, e)?;
                new_exprs.push((n, new_e));
            }
            NodeKind::Map {
                col_exprs: new_exprs,
                keep_input_columns,
            }
        }
        NodeKind::Filter { expr } => {
            let new_expr = match expr {
                Some(e) => Some(clone_one(src, out, remap, e)?),
                None => None,
            };
            NodeKind::Filter { expr: new_expr }
        }
        NodeKind::BlockingAgg {
            group_exprs,
            agg_exprs,
        } => {
            let mut new_group = Vec::with_capacity(group_exprs.len());
            for (n, e) in group_exprs {
                new_group.push((n, clone_one(src, out, remap, e)?));
            }
            let mut new_agg = Vec::with_capacity(agg_exprs.len());
            for (n, e) in agg_exprs {
                new_agg.push((n, clone_one(src, out, remap, e)?));
            }
            NodeKind::BlockingAgg {
                group_exprs: new_group,
                agg_exprs: new_agg,
            }
        }
        other => other,
    })
}
