//! Control-flow graph construction.
//!
//! One graph per scope root. Vertices wrap statement nodes (plus the few
//! expression positions control flow branches on: case tests and for-in
//! iteration bindings); edges carry a [`Branch`] label. All normal
//! terminations flow to a distinguished implicit-return vertex; `throw`
//! flows to the enclosing catch, or nowhere when uncaught, so exit
//! environments stay separate from the implicit return.
//!
//! Nested function bodies produce no vertices here: each function gets its
//! own graph when its scope is analyzed.

use rustc_hash::FxHashMap;

use stoat_ast::{AstArena, NodeId, NodeKind, Symbol};

/// Edge label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Uncond,
    OnTrue,
    OnFalse,
    OnEx,
}

/// Vertex handle, dense from zero in construction order. Construction
/// order approximates reverse post-order, and the dataflow worklist
/// relies on it being deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CfgVertexId(pub u32);

#[derive(Debug)]
pub struct ControlFlowGraph {
    /// `None` marks the implicit-return sink.
    nodes: Vec<Option<NodeId>>,
    node_to_vertex: FxHashMap<NodeId, CfgVertexId>,
    succs: Vec<Vec<(CfgVertexId, Branch)>>,
    preds: Vec<Vec<(CfgVertexId, Branch)>>,
    entry: CfgVertexId,
    implicit_return: CfgVertexId,
}

impl ControlFlowGraph {
    pub fn entry(&self) -> CfgVertexId {
        self.entry
    }

    pub fn implicit_return(&self) -> CfgVertexId {
        self.implicit_return
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node a vertex wraps; `None` for the implicit return.
    pub fn node(&self, v: CfgVertexId) -> Option<NodeId> {
        self.nodes[v.0 as usize]
    }

    pub fn vertex_of(&self, node: NodeId) -> Option<CfgVertexId> {
        self.node_to_vertex.get(&node).copied()
    }

    pub fn succs(&self, v: CfgVertexId) -> &[(CfgVertexId, Branch)] {
        &self.succs[v.0 as usize]
    }

    pub fn preds(&self, v: CfgVertexId) -> &[(CfgVertexId, Branch)] {
        &self.preds[v.0 as usize]
    }

    /// All vertices in construction order.
    pub fn vertices(&self) -> impl DoubleEndedIterator<Item = CfgVertexId> {
        (0..self.nodes.len() as u32).map(CfgVertexId)
    }
}

/// A dangling forward edge awaiting its destination.
type Edge = (CfgVertexId, Branch);

struct LoopCtx {
    label: Option<Symbol>,
    /// `None` for constructs `continue` cannot target (switch, plain
    /// labeled blocks).
    continue_target: Option<CfgVertexId>,
    /// Loops and switches accept unlabeled `break`; labeled blocks only
    /// match by label.
    is_breakable: bool,
    break_exits: Vec<Edge>,
}

/// Builds the CFG for one scope root.
pub struct ControlFlowAnalysis<'a> {
    arena: &'a AstArena,
    nodes: Vec<Option<NodeId>>,
    node_to_vertex: FxHashMap<NodeId, CfgVertexId>,
    succs: Vec<Vec<Edge>>,
    preds: Vec<Vec<Edge>>,
    handlers: Vec<CfgVertexId>,
    loops: Vec<LoopCtx>,
    pending_label: Option<Symbol>,
    returns: Vec<CfgVertexId>,
}

impl<'a> ControlFlowAnalysis<'a> {
    pub fn compute(arena: &'a AstArena, scope_root: NodeId) -> ControlFlowGraph {
        let mut cfa = ControlFlowAnalysis {
            arena,
            nodes: Vec::new(),
            node_to_vertex: FxHashMap::default(),
            succs: Vec::new(),
            preds: Vec::new(),
            handlers: Vec::new(),
            loops: Vec::new(),
            pending_label: None,
            returns: Vec::new(),
        };

        let entry = cfa.new_vertex_raw(Some(scope_root));
        let body: Vec<NodeId> = match arena.kind(scope_root) {
            NodeKind::Function => arena.children(arena.child(scope_root, 2)).to_vec(),
            // The whole-program graph runs the scripts in order.
            NodeKind::Root => arena
                .children(scope_root)
                .iter()
                .flat_map(|&s| arena.children(s).iter().copied())
                .collect(),
            _ => arena.children(scope_root).to_vec(),
        };
        let exits = cfa.build_seq(&body, vec![(entry, Branch::Uncond)]);

        let implicit_return = cfa.new_vertex_raw(None);
        cfa.connect_all(exits, implicit_return);
        let returns = std::mem::take(&mut cfa.returns);
        for v in returns {
            cfa.add_edge(v, implicit_return, Branch::Uncond);
        }

        ControlFlowGraph {
            nodes: cfa.nodes,
            node_to_vertex: cfa.node_to_vertex,
            succs: cfa.succs,
            preds: cfa.preds,
            entry,
            implicit_return,
        }
    }

    fn new_vertex_raw(&mut self, node: Option<NodeId>) -> CfgVertexId {
        let id = CfgVertexId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        if let Some(n) = node {
            self.node_to_vertex.insert(n, id);
        }
        id
    }

    /// Create a vertex for a statement. Statements lexically inside a try
    /// block may complete abruptly, so they get an exceptional edge to the
    /// innermost handler.
    fn new_vertex(&mut self, node: NodeId) -> CfgVertexId {
        let id = self.new_vertex_raw(Some(node));
        if let Some(&handler) = self.handlers.last() {
            self.add_edge(id, handler, Branch::OnEx);
        }
        id
    }

    fn add_edge(&mut self, from: CfgVertexId, to: CfgVertexId, branch: Branch) {
        self.succs[from.0 as usize].push((to, branch));
        self.preds[to.0 as usize].push((from, branch));
    }

    fn connect_all(&mut self, edges: Vec<Edge>, to: CfgVertexId) {
        for (from, branch) in edges {
            self.add_edge(from, to, branch);
        }
    }

    fn build_seq(&mut self, stmts: &[NodeId], mut incoming: Vec<Edge>) -> Vec<Edge> {
        for &stmt in stmts {
            incoming = self.build_stmt(stmt, incoming);
        }
        incoming
    }

    /// Wire one statement: consume `incoming` dangling edges, return the
    /// dangling normal exits.
    fn build_stmt(&mut self, stmt: NodeId, incoming: Vec<Edge>) -> Vec<Edge> {
        let label = self.pending_label.take();
        match self.arena.kind(stmt) {
            // Function declarations are hoisted; they contribute no flow.
            NodeKind::Empty | NodeKind::Function => incoming,

            NodeKind::Block => {
                if let Some(label) = label {
                    self.loops.push(LoopCtx {
                        label: Some(label),
                        continue_target: None,
                        is_breakable: false,
                        break_exits: Vec::new(),
                    });
                    let children: Vec<NodeId> = self.arena.children(stmt).to_vec();
                    let mut exits = self.build_seq(&children, incoming);
                    let ctx = self.loops.pop().unwrap();
                    exits.extend(ctx.break_exits);
                    exits
                } else {
                    let children: Vec<NodeId> = self.arena.children(stmt).to_vec();
                    self.build_seq(&children, incoming)
                }
            }

            NodeKind::Label(sym) => {
                self.pending_label = Some(*sym);
                let child = self.arena.child(stmt, 0);
                self.build_stmt(child, incoming)
            }

            NodeKind::If => {
                let v = self.new_vertex(stmt);
                self.connect_all(incoming, v);
                let then = self.arena.child(stmt, 1);
                let mut exits = self.build_stmt(then, vec![(v, Branch::OnTrue)]);
                if self.arena.child_count(stmt) > 2 {
                    let other = self.arena.child(stmt, 2);
                    exits.extend(self.build_stmt(other, vec![(v, Branch::OnFalse)]));
                } else {
                    exits.push((v, Branch::OnFalse));
                }
                exits
            }

            NodeKind::While => {
                let header = self.new_vertex(stmt);
                self.connect_all(incoming, header);
                self.loops.push(LoopCtx {
                    label,
                    continue_target: Some(header),
                    is_breakable: true,
                    break_exits: Vec::new(),
                });
                let body = self.arena.child(stmt, 1);
                let body_exits = self.build_stmt(body, vec![(header, Branch::OnTrue)]);
                self.connect_all(body_exits, header);
                let ctx = self.loops.pop().unwrap();
                let mut exits = vec![(header, Branch::OnFalse)];
                exits.extend(ctx.break_exits);
                exits
            }

            NodeKind::DoWhile => {
                // The body executes at least once; the condition vertex is
                // only reached after it.
                let cond = self.new_vertex(stmt);
                self.loops.push(LoopCtx {
                    label,
                    continue_target: Some(cond),
                    is_breakable: true,
                    break_exits: Vec::new(),
                });
                let body = self.arena.child(stmt, 0);
                let mut body_in = incoming;
                body_in.push((cond, Branch::OnTrue));
                let body_exits = self.build_stmt(body, body_in);
                self.connect_all(body_exits, cond);
                let ctx = self.loops.pop().unwrap();
                let mut exits = vec![(cond, Branch::OnFalse)];
                exits.extend(ctx.break_exits);
                exits
            }

            NodeKind::For => {
                let init = self.arena.child(stmt, 0);
                let incr = self.arena.child(stmt, 2);
                let body = self.arena.child(stmt, 3);

                let incoming = if matches!(self.arena.kind(init), NodeKind::Empty) {
                    incoming
                } else {
                    let v = self.new_vertex(init);
                    self.connect_all(incoming, v);
                    vec![(v, Branch::Uncond)]
                };

                let header = self.new_vertex(stmt);
                self.connect_all(incoming, header);

                let continue_target = if matches!(self.arena.kind(incr), NodeKind::Empty) {
                    header
                } else {
                    self.new_vertex(incr)
                };
                self.loops.push(LoopCtx {
                    label,
                    continue_target: Some(continue_target),
                    is_breakable: true,
                    break_exits: Vec::new(),
                });
                let body_exits = self.build_stmt(body, vec![(header, Branch::OnTrue)]);
                self.connect_all(body_exits, continue_target);
                if continue_target != header {
                    self.add_edge(continue_target, header, Branch::Uncond);
                }
                let ctx = self.loops.pop().unwrap();
                let mut exits = vec![(header, Branch::OnFalse)];
                exits.extend(ctx.break_exits);
                exits
            }

            NodeKind::ForIn | NodeKind::ForOf => {
                // One vertex evaluates the iterable once; a second performs
                // the per-iteration binding and is the back-edge target.
                let iterable = self.new_vertex(stmt);
                self.connect_all(incoming, iterable);
                let target = self.arena.child(stmt, 0);
                let binding = self.new_vertex(target);
                self.add_edge(iterable, binding, Branch::Uncond);

                self.loops.push(LoopCtx {
                    label,
                    continue_target: Some(binding),
                    is_breakable: true,
                    break_exits: Vec::new(),
                });
                let body = self.arena.child(stmt, 2);
                let body_exits = self.build_stmt(body, vec![(binding, Branch::OnTrue)]);
                self.connect_all(body_exits, binding);
                let ctx = self.loops.pop().unwrap();
                let mut exits = vec![(binding, Branch::OnFalse)];
                exits.extend(ctx.break_exits);
                exits
            }

            NodeKind::Switch => {
                let subject = self.new_vertex(stmt);
                self.connect_all(incoming, subject);
                self.loops.push(LoopCtx {
                    label,
                    continue_target: None,
                    is_breakable: true,
                    break_exits: Vec::new(),
                });

                let children: Vec<NodeId> = self.arena.children(stmt)[1..].to_vec();
                let mut pending_test: Vec<Edge> = vec![(subject, Branch::Uncond)];
                let mut fallthrough: Vec<Edge> = Vec::new();
                let mut default_body: Option<NodeId> = None;

                for &clause in &children {
                    match self.arena.kind(clause) {
                        NodeKind::Case => {
                            let test = self.new_vertex(clause);
                            self.connect_all(pending_test, test);
                            let body = self.arena.child(clause, 1);
                            let mut body_in = vec![(test, Branch::OnTrue)];
                            body_in.append(&mut fallthrough);
                            fallthrough = self.build_stmt(body, body_in);
                            pending_test = vec![(test, Branch::OnFalse)];
                        }
                        NodeKind::DefaultCase => {
                            default_body = Some(self.arena.child(clause, 0));
                        }
                        _ => {}
                    }
                }

                let mut exits = Vec::new();
                if let Some(body) = default_body {
                    let mut body_in = pending_test;
                    body_in.append(&mut fallthrough);
                    exits.extend(self.build_stmt(body, body_in));
                } else {
                    exits.extend(pending_test);
                    exits.extend(fallthrough);
                }
                let ctx = self.loops.pop().unwrap();
                exits.extend(ctx.break_exits);
                exits
            }

            NodeKind::Try => {
                let block = self.arena.child(stmt, 0);
                let catch = self.arena.child(stmt, 1);
                let finally = if self.arena.child_count(stmt) > 2 {
                    Some(self.arena.child(stmt, 2))
                } else {
                    None
                };
                let has_catch = matches!(self.arena.kind(catch), NodeKind::Catch);

                // A finally clause gets an exceptional-merge vertex
                // (wrapping the finally block node) so both normal and
                // exceptional completions flow through it. While it is on
                // the handler stack it catches everything the catch
                // clause does not intercept: throws in a catch-less try
                // body and throws inside the catch body itself.
                let finally_merge = finally.map(|f| self.new_vertex_raw(Some(f)));
                if let Some(fm) = finally_merge {
                    self.handlers.push(fm);
                }

                let mut exits = if has_catch {
                    let catch_vertex = self.new_vertex(catch);
                    self.handlers.push(catch_vertex);
                    let body_exits = self.build_stmt(block, incoming);
                    self.handlers.pop();

                    let catch_body = self.arena.child(catch, 1);
                    let catch_exits =
                        self.build_stmt(catch_body, vec![(catch_vertex, Branch::Uncond)]);
                    let mut exits = body_exits;
                    exits.extend(catch_exits);
                    exits
                } else {
                    self.build_stmt(block, incoming)
                };

                if let Some(fm) = finally_merge {
                    self.handlers.pop();
                    exits.push((fm, Branch::Uncond));
                }
                if let Some(finally) = finally {
                    exits = self.build_stmt(finally, exits);
                }
                exits
            }

            NodeKind::Throw => {
                let v = self.new_vertex(stmt);
                self.connect_all(incoming, v);
                // Uncaught throws have no successor: they reach exit
                // environments, not the implicit return.
                Vec::new()
            }

            NodeKind::Return => {
                let v = self.new_vertex(stmt);
                self.connect_all(incoming, v);
                // connected to the implicit return at the end of compute()
                self.pending_returns_edge(v);
                Vec::new()
            }

            NodeKind::Break { label } => {
                let v = self.new_vertex(stmt);
                self.connect_all(incoming, v);
                let target = *label;
                if let Some(ctx) = self.find_break_ctx(target) {
                    ctx.break_exits.push((v, Branch::Uncond));
                }
                Vec::new()
            }

            NodeKind::Continue { label } => {
                let v = self.new_vertex(stmt);
                self.connect_all(incoming, v);
                let target = *label;
                if let Some(header) = self.find_continue_target(target) {
                    self.add_edge(v, header, Branch::Uncond);
                }
                Vec::new()
            }

            // Plain single-vertex statements.
            _ => {
                let v = self.new_vertex(stmt);
                self.connect_all(incoming, v);
                vec![(v, Branch::Uncond)]
            }
        }
    }

    /// Return vertices connect to the implicit return, which does not
    /// exist until the end of construction; record them for later.
    fn pending_returns_edge(&mut self, v: CfgVertexId) {
        self.returns.push(v);
    }

    fn find_break_ctx(&mut self, label: Option<Symbol>) -> Option<&mut LoopCtx> {
        match label {
            Some(l) => self.loops.iter_mut().rev().find(|c| c.label == Some(l)),
            None => self.loops.iter_mut().rev().find(|c| c.is_breakable),
        }
    }

    fn find_continue_target(&self, label: Option<Symbol>) -> Option<CfgVertexId> {
        match label {
            Some(l) => self
                .loops
                .iter()
                .rev()
                .find(|c| c.label == Some(l))
                .and_then(|c| c.continue_target),
            None => self.loops.iter().rev().find_map(|c| c.continue_target),
        }
    }
}
