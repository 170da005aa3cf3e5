//! Generic monotone dataflow framework.
//!
//! A worklist fixed-point engine over a caller-supplied lattice and
//! transfer function. Worklist order follows CFG construction order
//! (approximate reverse post-order) and is fully deterministic, so two
//! runs over the same graph produce identical results.

use std::collections::VecDeque;

use stoat_ast::NodeId;

use crate::cfg::{Branch, CfgVertexId, ControlFlowGraph};

/// A join-semilattice element. `join` must be associative, commutative,
/// and idempotent; `PartialEq` doubles as the "changed?" test.
pub trait LatticeElement: Clone + PartialEq {
    fn join(&self, other: &Self) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A concrete analysis: lattice states plus a transfer function.
pub trait DataFlowAnalysis {
    type State: LatticeElement;

    fn direction(&self) -> Direction;

    /// State at the boundary: the entry vertex for forward analyses, the
    /// implicit return for backward ones.
    fn boundary_state(&self) -> Self::State;

    /// Bottom: the initial state at every non-boundary vertex.
    fn initial_state(&self) -> Self::State;

    /// Transfer across one vertex. `node` is `None` at the implicit
    /// return. Forward: input is the in-state, result the out-state;
    /// backward: input is the out-state, result the in-state.
    fn flow_through(&mut self, node: Option<NodeId>, input: &Self::State) -> Self::State;
}

/// Final states per vertex, indexed by `CfgVertexId`.
#[derive(Debug)]
pub struct DataFlowResult<S> {
    pub in_states: Vec<S>,
    pub out_states: Vec<S>,
}

#[derive(Debug, thiserror::Error)]
#[error("dataflow analysis did not converge after {steps} steps")]
pub struct Divergence {
    pub steps: usize,
}

/// The worklist solver.
pub struct DataFlowSolver {
    /// Escape hatch for non-monotone transfer functions; hit only on a
    /// framework-client bug.
    max_steps_per_vertex: usize,
}

impl Default for DataFlowSolver {
    fn default() -> Self {
        Self {
            max_steps_per_vertex: 256,
        }
    }
}

impl DataFlowSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn solve<A: DataFlowAnalysis>(
        &self,
        cfg: &ControlFlowGraph,
        analysis: &mut A,
    ) -> Result<DataFlowResult<A::State>, Divergence> {
        let n = cfg.vertex_count();
        let forward = analysis.direction() == Direction::Forward;
        let boundary = if forward {
            cfg.entry()
        } else {
            cfg.implicit_return()
        };

        let mut in_states: Vec<A::State> = (0..n).map(|_| analysis.initial_state()).collect();
        let mut out_states: Vec<A::State> = (0..n).map(|_| analysis.initial_state()).collect();
        if forward {
            in_states[boundary.0 as usize] = analysis.boundary_state();
        } else {
            out_states[boundary.0 as usize] = analysis.boundary_state();
        }

        let order: Vec<CfgVertexId> = if forward {
            cfg.vertices().collect()
        } else {
            cfg.vertices().rev().collect()
        };
        let mut queue: VecDeque<CfgVertexId> = order.iter().copied().collect();
        let mut queued = vec![true; n];

        let max_steps = self.max_steps_per_vertex * n.max(1);
        let mut steps = 0usize;

        while let Some(v) = queue.pop_front() {
            queued[v.0 as usize] = false;
            steps += 1;
            if steps > max_steps {
                return Err(Divergence { steps });
            }

            let vi = v.0 as usize;
            if forward {
                // in[v] = join of predecessor out-states
                if v != boundary {
                    let mut acc: Option<A::State> = None;
                    for &(p, _branch) in cfg.preds(v) {
                        let s = &out_states[p.0 as usize];
                        acc = Some(match acc {
                            None => s.clone(),
                            Some(a) => a.join(s),
                        });
                    }
                    if let Some(acc) = acc {
                        in_states[vi] = acc;
                    }
                }
                let new_out = analysis.flow_through(cfg.node(v), &in_states[vi]);
                if new_out != out_states[vi] {
                    out_states[vi] = new_out;
                    for &(s, _branch) in cfg.succs(v) {
                        if !queued[s.0 as usize] {
                            queued[s.0 as usize] = true;
                            queue.push_back(s);
                        }
                    }
                }
            } else {
                // out[v] = join of successor in-states
                if v != boundary {
                    let mut acc: Option<A::State> = None;
                    for &(s, branch) in cfg.succs(v) {
                        // Exceptional successors see the pre-state of the
                        // throwing vertex, which the transfer already
                        // accounts for; join them like any other edge.
                        let _ = branch;
                        let st = &in_states[s.0 as usize];
                        acc = Some(match acc {
                            None => st.clone(),
                            Some(a) => a.join(st),
                        });
                    }
                    if let Some(acc) = acc {
                        out_states[vi] = acc;
                    }
                }
                let new_in = analysis.flow_through(cfg.node(v), &out_states[vi]);
                if new_in != in_states[vi] {
                    in_states[vi] = new_in;
                    for &(p, _branch) in cfg.preds(v) {
                        if !queued[p.0 as usize] {
                            queued[p.0 as usize] = true;
                            queue.push_back(p);
                        }
                    }
                }
            }
        }

        Ok(DataFlowResult {
            in_states,
            out_states,
        })
    }
}

/// Edge-sensitive hook: some analyses need to know which branch an edge
/// carries (the type inference engine publishes different environments on
/// true/false edges). The generic solver treats edges uniformly; clients
/// needing branch sensitivity iterate `cfg.succs` themselves.
pub fn branch_of(cfg: &ControlFlowGraph, from: CfgVertexId, to: CfgVertexId) -> Option<Branch> {
    cfg.succs(from)
        .iter()
        .find(|(s, _)| *s == to)
        .map(|(_, b)| *b)
}
