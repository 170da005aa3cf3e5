//! The node arena: pool-allocated syntax tree with index-based links.
//!
//! All parent/child references are [`NodeId`] indices into the arena, so
//! the tree can be freely mutated without ownership gymnastics and node
//! identity is exactly the id. Detached nodes stay in the pool: analyses
//! that captured their ids may still read them, they are simply no longer
//! reachable from the root.

use rustc_hash::FxHashMap;

use stoat_identity::{InputId, TypeId};

use crate::features::FeatureSet;
use crate::intern::{Interner, Symbol};
use crate::jsdoc::JsDoc;
use crate::kind::NodeKind;
use crate::source::SourcePos;

/// Unique identifier for an AST node. Identity is by id: two nodes with
/// identical content are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Per-pass node properties. The common boolean properties live in a
/// fixed bit set on the node; anything else goes to a side map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropKey {
    /// Synthesized temporary introduced by a transform.
    GeneratedTemp,
    /// Object-literal key written with quotes in the source.
    Quoted,
    /// Name is a compile-time constant by convention or annotation.
    Constant,
    /// Block inserted by a transform rather than present in the source.
    SyntheticBlock,
    /// Rarely used, pass-specific marker.
    Other(u8),
}

impl PropKey {
    fn common_bit(self) -> Option<u8> {
        match self {
            PropKey::GeneratedTemp => Some(0),
            PropKey::Quoted => Some(1),
            PropKey::Constant => Some(2),
            PropKey::SyntheticBlock => Some(3),
            PropKey::Other(_) => None,
        }
    }
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    jsdoc: Option<Box<JsDoc>>,
    /// Inference's annotation slot. Write-once per inference run: once a
    /// concrete type is recorded, `unknown` never overwrites it.
    ty: Option<TypeId>,
    change_stamp: u32,
    input: Option<InputId>,
    pos: SourcePos,
    flags: u8,
}

/// The node pool plus the interner for the names it references.
#[derive(Debug, Default)]
pub struct AstArena {
    nodes: Vec<NodeData>,
    interner: Interner,
    side_props: FxHashMap<(NodeId, u8), i64>,
    script_features: FxHashMap<NodeId, FeatureSet>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        self.interner.intern(s)
    }

    pub fn name_of(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn new_node(&mut self, kind: NodeKind) -> NodeId {
        self.new_node_at(kind, SourcePos::synthetic())
    }

    pub fn new_node_at(&mut self, kind: NodeKind, pos: SourcePos) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
            jsdoc: None,
            ty: None,
            change_stamp: 0,
            input: None,
            pos,
            flags: 0,
        });
        id
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn kind(&self, n: NodeId) -> &NodeKind {
        &self.nodes[n.0 as usize].kind
    }

    pub fn parent(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n.0 as usize].parent
    }

    pub fn children(&self, n: NodeId) -> &[NodeId] {
        &self.nodes[n.0 as usize].children
    }

    pub fn child_count(&self, n: NodeId) -> usize {
        self.nodes[n.0 as usize].children.len()
    }

    pub fn child(&self, n: NodeId, i: usize) -> NodeId {
        self.nodes[n.0 as usize].children[i]
    }

    pub fn first_child(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n.0 as usize].children.first().copied()
    }

    pub fn last_child(&self, n: NodeId) -> Option<NodeId> {
        self.nodes[n.0 as usize].children.last().copied()
    }

    pub fn next_sibling(&self, n: NodeId) -> Option<NodeId> {
        let parent = self.parent(n)?;
        let siblings = self.children(parent);
        let idx = siblings.iter().position(|&c| c == n)?;
        siblings.get(idx + 1).copied()
    }

    /// Whether `ancestor` is on `n`'s parent chain (inclusive).
    pub fn is_ancestor(&self, ancestor: NodeId, n: NodeId) -> bool {
        let mut cur = Some(n);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// The nearest enclosing script node, or `n` itself if it is one.
    pub fn enclosing_script(&self, n: NodeId) -> Option<NodeId> {
        let mut cur = Some(n);
        while let Some(c) = cur {
            if self.kind(c).is_script() {
                return Some(c);
            }
            cur = self.parent(c);
        }
        None
    }

    /// The nearest enclosing change-scope root (function, script, or root),
    /// or `n` itself if it is one.
    pub fn enclosing_change_scope(&self, n: NodeId) -> NodeId {
        let mut cur = n;
        loop {
            if self.kind(cur).is_change_scope_root() {
                return cur;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return cur,
            }
        }
    }

    /// Whether `n` is reachable from `root`.
    pub fn is_attached_under(&self, root: NodeId, n: NodeId) -> bool {
        self.is_ancestor(root, n)
    }

    // ------------------------------------------------------------------
    // Mutation. Structural changes only; the caller owns change reporting.
    // ------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.0 as usize].parent.is_none());
        debug_assert!(!self.is_ancestor(child, parent), "cycle");
        self.nodes[child.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.push(child);
    }

    pub fn add_child_to_front(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.0 as usize].parent.is_none());
        self.nodes[child.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.insert(0, child);
    }

    /// Insert `new` immediately after `sibling` under the same parent.
    pub fn insert_after(&mut self, sibling: NodeId, new: NodeId) {
        let parent = self.parent(sibling).expect("sibling must be attached");
        debug_assert!(self.nodes[new.0 as usize].parent.is_none());
        let idx = self.nodes[parent.0 as usize]
            .children
            .iter()
            .position(|&c| c == sibling)
            .expect("sibling not under parent");
        self.nodes[new.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.insert(idx + 1, new);
    }

    /// Remove `n` from its parent. The node stays in the pool and keeps its
    /// children; it is simply unreachable from the root afterwards.
    pub fn detach(&mut self, n: NodeId) -> NodeId {
        if let Some(parent) = self.nodes[n.0 as usize].parent.take() {
            self.nodes[parent.0 as usize].children.retain(|&c| c != n);
        }
        n
    }

    /// Replace `old` with `new` at the same child position.
    pub fn replace_with(&mut self, old: NodeId, new: NodeId) {
        let parent = self.parent(old).expect("old must be attached");
        debug_assert!(self.nodes[new.0 as usize].parent.is_none());
        let idx = self.nodes[parent.0 as usize]
            .children
            .iter()
            .position(|&c| c == old)
            .expect("old not under parent");
        self.nodes[parent.0 as usize].children[idx] = new;
        self.nodes[new.0 as usize].parent = Some(parent);
        self.nodes[old.0 as usize].parent = None;
    }

    // ------------------------------------------------------------------
    // Attribute slots. Not change-reported.
    // ------------------------------------------------------------------

    pub fn jsdoc(&self, n: NodeId) -> Option<&JsDoc> {
        self.nodes[n.0 as usize].jsdoc.as_deref()
    }

    pub fn set_jsdoc(&mut self, n: NodeId, doc: JsDoc) {
        self.nodes[n.0 as usize].jsdoc = Some(Box::new(doc));
    }

    pub fn inferred_type(&self, n: NodeId) -> Option<TypeId> {
        self.nodes[n.0 as usize].ty
    }

    /// Record an inferred type. The slot is write-once within a run: a
    /// concrete type is never downgraded to `unknown`.
    pub fn set_inferred_type(&mut self, n: NodeId, ty: TypeId) {
        let slot = &mut self.nodes[n.0 as usize].ty;
        match slot {
            Some(existing) if !existing.is_unknown() && ty.is_unknown() => {}
            _ => *slot = Some(ty),
        }
    }

    /// Drop all inferred types, e.g. before a fresh inference run.
    pub fn clear_inferred_types(&mut self) {
        for node in &mut self.nodes {
            node.ty = None;
        }
    }

    pub fn change_stamp(&self, n: NodeId) -> u32 {
        self.nodes[n.0 as usize].change_stamp
    }

    pub fn set_change_stamp(&mut self, n: NodeId, stamp: u32) {
        self.nodes[n.0 as usize].change_stamp = stamp;
    }

    pub fn input(&self, n: NodeId) -> Option<InputId> {
        let mut cur = Some(n);
        while let Some(c) = cur {
            if let Some(input) = self.nodes[c.0 as usize].input {
                return Some(input);
            }
            cur = self.parent(c);
        }
        None
    }

    pub fn set_input(&mut self, n: NodeId, input: InputId) {
        self.nodes[n.0 as usize].input = Some(input);
    }

    pub fn pos(&self, n: NodeId) -> SourcePos {
        self.nodes[n.0 as usize].pos
    }

    pub fn set_pos(&mut self, n: NodeId, pos: SourcePos) {
        self.nodes[n.0 as usize].pos = pos;
    }

    pub fn get_prop(&self, n: NodeId, key: PropKey) -> bool {
        match key.common_bit() {
            Some(bit) => self.nodes[n.0 as usize].flags & (1 << bit) != 0,
            None => {
                let PropKey::Other(k) = key else { unreachable!() };
                self.side_props.contains_key(&(n, k))
            }
        }
    }

    pub fn set_prop(&mut self, n: NodeId, key: PropKey, on: bool) {
        match key.common_bit() {
            Some(bit) => {
                let flags = &mut self.nodes[n.0 as usize].flags;
                if on {
                    *flags |= 1 << bit;
                } else {
                    *flags &= !(1 << bit);
                }
            }
            None => {
                let PropKey::Other(k) = key else { unreachable!() };
                if on {
                    self.side_props.insert((n, k), 1);
                } else {
                    self.side_props.remove(&(n, k));
                }
            }
        }
    }

    pub fn script_features(&self, script: NodeId) -> FeatureSet {
        self.script_features
            .get(&script)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_script_features(&mut self, script: NodeId, features: FeatureSet) {
        self.script_features.insert(script, features);
    }

    // ------------------------------------------------------------------
    // Queries used throughout the analyses
    // ------------------------------------------------------------------

    /// The name payload, if `n` is a `Name` node.
    pub fn name_sym(&self, n: NodeId) -> Option<Symbol> {
        match self.kind(n) {
            NodeKind::Name(sym) => Some(*sym),
            _ => None,
        }
    }

    /// Whether `n` is a `Name` with the given spelling.
    pub fn is_name_str(&self, n: NodeId, s: &str) -> bool {
        self.name_sym(n)
            .is_some_and(|sym| self.interner.resolve(sym) == s)
    }

    /// Deep-copy the subtree at `n`. The copy is detached and carries the
    /// original kinds, positions, and doc info, but fresh identities and
    /// no inferred types or change stamps.
    pub fn clone_subtree(&mut self, n: NodeId) -> NodeId {
        let kind = *self.kind(n);
        let pos = self.pos(n);
        let jsdoc = self.nodes[n.0 as usize].jsdoc.clone();
        let copy = self.new_node_at(kind, pos);
        self.nodes[copy.0 as usize].jsdoc = jsdoc;
        let children: Vec<NodeId> = self.children(n).to_vec();
        for c in children {
            let child_copy = self.clone_subtree(c);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Pre-order walk of the subtree at `n`.
    pub fn preorder(&self, n: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![n];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            for &c in self.children(cur).iter().rev() {
                stack.push(c);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_detach() {
        let mut arena = AstArena::new();
        let block = arena.new_node(NodeKind::Block);
        let a = arena.new_node(NodeKind::Empty);
        let b = arena.new_node(NodeKind::Empty);
        arena.append_child(block, a);
        arena.append_child(block, b);
        assert_eq!(arena.children(block), &[a, b]);
        assert_eq!(arena.parent(a), Some(block));

        arena.detach(a);
        assert_eq!(arena.children(block), &[b]);
        assert_eq!(arena.parent(a), None);
        // the detached node is still addressable
        assert!(matches!(arena.kind(a), NodeKind::Empty));
    }

    #[test]
    fn replace_preserves_position() {
        let mut arena = AstArena::new();
        let block = arena.new_node(NodeKind::Block);
        let a = arena.new_node(NodeKind::Empty);
        let b = arena.new_node(NodeKind::Null);
        let c = arena.new_node(NodeKind::Empty);
        arena.append_child(block, a);
        arena.append_child(block, c);
        arena.replace_with(a, b);
        assert_eq!(arena.children(block), &[b, c]);
        assert_eq!(arena.parent(a), None);
    }

    #[test]
    fn inferred_type_not_downgraded_to_unknown() {
        use stoat_identity::TypeId;
        let mut arena = AstArena::new();
        let n = arena.new_node(NodeKind::Null);
        arena.set_inferred_type(n, TypeId::NUMBER);
        arena.set_inferred_type(n, TypeId::UNKNOWN);
        assert_eq!(arena.inferred_type(n), Some(TypeId::NUMBER));
        // a more precise write still lands
        arena.set_inferred_type(n, TypeId::STRING);
        assert_eq!(arena.inferred_type(n), Some(TypeId::STRING));
    }

    #[test]
    fn enclosing_change_scope_walks_to_function() {
        let mut arena = AstArena::new();
        let script = arena.new_node(NodeKind::Script);
        let func = arena.new_node(NodeKind::Function);
        let body = arena.new_node(NodeKind::Block);
        let stmt = arena.new_node(NodeKind::Empty);
        arena.append_child(script, func);
        arena.append_child(func, body);
        arena.append_child(body, stmt);
        assert_eq!(arena.enclosing_change_scope(stmt), func);
        assert_eq!(arena.enclosing_change_scope(func), func);
        assert_eq!(arena.enclosing_change_scope(script), script);
    }

    #[test]
    fn input_inherited_from_script() {
        use stoat_identity::InputId;
        let mut arena = AstArena::new();
        let script = arena.new_node(NodeKind::Script);
        let stmt = arena.new_node(NodeKind::Empty);
        arena.append_child(script, stmt);
        arena.set_input(script, InputId::new(2));
        assert_eq!(arena.input(stmt), Some(InputId::new(2)));
    }
}
