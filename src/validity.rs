//! Between-pass validity checking.
//!
//! Re-traverses the tree and asserts the invariants passes must preserve:
//! every name reference resolves to a declaration, block-scoped bindings
//! are not redeclared, and each script's feature-set annotation still
//! covers the features its tree uses. Violations are program diagnostics,
//! not fatal errors: a broken invariant here usually means a pass bug,
//! and all of them should surface in one run.

use rustc_hash::{FxHashMap, FxHashSet};

use stoat_ast::{AstArena, Feature, FeatureSet, NodeId, NodeKind, Symbol};

use crate::compiler::Compiler;
use crate::diagnostics::Diagnostic;

/// Names usable without a declaration.
const IMPLICIT_GLOBALS: [&str; 4] = ["undefined", "arguments", "NaN", "Infinity"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Hoisted,
    Block,
}

struct ScopeFrame {
    is_hoist_scope: bool,
    names: FxHashMap<Symbol, DeclKind>,
}

pub struct AstValidator;

impl AstValidator {
    /// Validate and report. Returns whether the tree passed.
    pub fn validate(compiler: &mut Compiler, root: NodeId) -> bool {
        let mut reports: Vec<Diagnostic> = Vec::new();
        {
            let arena = &compiler.arena;
            let implicit: FxHashSet<Symbol> = IMPLICIT_GLOBALS
                .iter()
                .filter_map(|s| arena.interner().get(s))
                .collect();
            let mut checker = Checker {
                arena,
                implicit,
                scopes: Vec::new(),
                reports: &mut reports,
            };
            checker.check_scope_root(root);

            for &script in arena.children(root) {
                let used = used_features(arena, script);
                if !arena.script_features(script).contains(used) {
                    checker.reports.push(
                        Diagnostic::error(
                            "S2017",
                            "feature set annotation does not cover features used in script",
                        )
                        .at(arena.input(script), 0, 0),
                    );
                }
            }
        }
        let ok = reports.is_empty();
        for d in reports {
            compiler.errors.report(d);
        }
        ok
    }
}

struct Checker<'a> {
    arena: &'a AstArena,
    implicit: FxHashSet<Symbol>,
    scopes: Vec<ScopeFrame>,
    reports: &'a mut Vec<Diagnostic>,
}

impl Checker<'_> {
    fn report_at(&mut self, key: &str, message: String, node: NodeId) {
        let pos = self.arena.pos(node);
        self.reports.push(
            Diagnostic::error(key, message).at(self.arena.input(node), pos.line, pos.col),
        );
    }

    fn declare(&mut self, name_node: NodeId, sym: Symbol, kind: DeclKind, suppressed: bool) {
        let frame_idx = match kind {
            DeclKind::Hoisted => self
                .scopes
                .iter()
                .rposition(|f| f.is_hoist_scope)
                .unwrap_or(0),
            DeclKind::Block => self.scopes.len() - 1,
        };
        let existing = self.scopes[frame_idx].names.get(&sym).copied();
        if let Some(existing) = existing {
            // var-on-var redeclaration is legal; anything involving a
            // block-scoped binding is not, unless suppressed.
            let both_hoisted = existing == DeclKind::Hoisted && kind == DeclKind::Hoisted;
            if !both_hoisted && !suppressed {
                let name = self.arena.name_of(sym).to_string();
                self.report_at("S2016", format!("duplicate declaration of {name}"), name_node);
            }
            return;
        }
        self.scopes[frame_idx].names.insert(sym, kind);
    }

    fn resolve(&self, sym: Symbol) -> bool {
        self.implicit.contains(&sym)
            || self.scopes.iter().rev().any(|f| f.names.contains_key(&sym))
    }

    /// Pre-scan declarations owned by the scope rooted at `root` into the
    /// top frame, then walk its statements.
    fn check_scope_root(&mut self, root: NodeId) {
        let is_hoist = matches!(self.arena.kind(root), NodeKind::Root | NodeKind::Function);
        self.scopes.push(ScopeFrame {
            is_hoist_scope: is_hoist,
            names: FxHashMap::default(),
        });

        let bodies: Vec<NodeId> = match self.arena.kind(root) {
            NodeKind::Root => self.arena.children(root).to_vec(),
            NodeKind::Function => {
                let name = self.arena.child(root, 0);
                if let Some(sym) = self.arena.name_sym(name) {
                    if !self.arena.name_of(sym).is_empty() {
                        self.declare(name, sym, DeclKind::Hoisted, false);
                    }
                }
                let params = self.arena.child(root, 1);
                for &p in self.arena.children(params) {
                    if let Some(sym) = self.arena.name_sym(p) {
                        self.declare(p, sym, DeclKind::Hoisted, false);
                    }
                }
                vec![self.arena.child(root, 2)]
            }
            NodeKind::Catch => {
                let param = self.arena.child(root, 0);
                if let Some(sym) = self.arena.name_sym(param) {
                    self.declare(param, sym, DeclKind::Block, false);
                }
                vec![self.arena.child(root, 1)]
            }
            _ => vec![root],
        };

        for &body in &bodies {
            self.prescan(body, true);
        }
        for &body in &bodies {
            let children: Vec<NodeId> = self.arena.children(body).to_vec();
            for c in children {
                self.walk_stmt(c);
            }
        }

        self.scopes.pop();
    }

    /// Collect the declarations the current scope owns: hoisted ones
    /// through nested blocks, block-scoped ones only at the top level.
    fn prescan(&mut self, node: NodeId, top_level: bool) {
        for &child in &self.arena.children(node).to_vec() {
            match self.arena.kind(child) {
                NodeKind::Var => {
                    let suppressed = self.is_duplicate_suppressed(child);
                    for &binding in &self.arena.children(child).to_vec() {
                        self.declare_binding(binding, DeclKind::Hoisted, suppressed);
                    }
                }
                NodeKind::Let | NodeKind::Const if top_level => {
                    for &binding in &self.arena.children(child).to_vec() {
                        self.declare_binding(binding, DeclKind::Block, false);
                    }
                }
                NodeKind::Let | NodeKind::Const => {}
                NodeKind::Function => {
                    let name = self.arena.child(child, 0);
                    if let Some(sym) = self.arena.name_sym(name) {
                        if !self.arena.name_of(sym).is_empty() {
                            let suppressed = self.is_duplicate_suppressed(child);
                            self.declare(name, sym, DeclKind::Hoisted, suppressed);
                        }
                    }
                }
                NodeKind::Block => self.prescan(child, false),
                _ => self.prescan(child, false),
            }
        }
    }

    fn declare_binding(&mut self, binding: NodeId, kind: DeclKind, suppressed: bool) {
        match self.arena.kind(binding) {
            NodeKind::Name(sym) => self.declare(binding, *sym, kind, suppressed),
            NodeKind::DestructuringLhs => {
                let pattern = self.arena.child(binding, 0);
                for &sk in &self.arena.children(pattern).to_vec() {
                    if let Some(target) = self.arena.first_child(sk) {
                        if let Some(sym) = self.arena.name_sym(target) {
                            self.declare(target, sym, kind, suppressed);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn is_duplicate_suppressed(&self, decl: NodeId) -> bool {
        let Some(doc) = self.arena.jsdoc(decl) else {
            return false;
        };
        self.arena
            .interner()
            .get("duplicate")
            .is_some_and(|sym| doc.suppresses(sym))
    }

    fn walk_stmt(&mut self, node: NodeId) {
        match self.arena.kind(node) {
            NodeKind::Function => self.check_scope_root(node),
            NodeKind::Catch => self.check_scope_root(node),
            NodeKind::Block => {
                // A block with block-scoped declarations opens a frame.
                self.scopes.push(ScopeFrame {
                    is_hoist_scope: false,
                    names: FxHashMap::default(),
                });
                self.prescan_block_decls(node);
                for &c in &self.arena.children(node).to_vec() {
                    self.walk_stmt(c);
                }
                self.scopes.pop();
            }
            NodeKind::Var | NodeKind::Let | NodeKind::Const => {
                for &binding in &self.arena.children(node).to_vec() {
                    match self.arena.kind(binding) {
                        NodeKind::Name(_) => {
                            if let Some(init) = self.arena.first_child(binding) {
                                self.walk_expr(init);
                            }
                        }
                        NodeKind::DestructuringLhs => {
                            self.walk_expr(self.arena.child(binding, 1));
                        }
                        _ => {}
                    }
                }
            }
            _ => {
                let is_expr_name = matches!(self.arena.kind(node), NodeKind::Name(_));
                if is_expr_name {
                    self.walk_expr(node);
                    return;
                }
                for &c in &self.arena.children(node).to_vec() {
                    self.walk_stmt(c);
                }
            }
        }
    }

    fn prescan_block_decls(&mut self, block: NodeId) {
        for &child in &self.arena.children(block).to_vec() {
            if matches!(self.arena.kind(child), NodeKind::Let | NodeKind::Const) {
                for &binding in &self.arena.children(child).to_vec() {
                    self.declare_binding(binding, DeclKind::Block, false);
                }
            }
        }
    }

    fn walk_expr(&mut self, node: NodeId) {
        match self.arena.kind(node) {
            NodeKind::Name(sym) => {
                if !self.resolve(*sym) {
                    let name = self.arena.name_of(*sym).to_string();
                    self.report_at("S2015", format!("variable {name} is not declared"), node);
                }
            }
            NodeKind::Function => self.check_scope_root(node),
            NodeKind::GetProp(_) => self.walk_expr(self.arena.child(node, 0)),
            NodeKind::StringKey(_) => {
                if let Some(v) = self.arena.first_child(node) {
                    self.walk_expr(v);
                }
            }
            _ => {
                for &c in &self.arena.children(node).to_vec() {
                    self.walk_expr(c);
                }
            }
        }
    }
}

/// The optional language features a script's tree actually uses.
fn used_features(arena: &AstArena, script: NodeId) -> FeatureSet {
    let mut features = FeatureSet::ES3;
    for n in arena.preorder(script) {
        match arena.kind(n) {
            NodeKind::Let | NodeKind::Const => {
                features = features.with(Feature::LetConst);
            }
            NodeKind::DestructuringLhs | NodeKind::ObjectPattern => {
                features = features.with(Feature::Destructuring);
            }
            NodeKind::ForOf => {
                features = features.with(Feature::ForOf);
            }
            _ => {}
        }
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_ast::build;

    fn setup(stmts: impl FnOnce(&mut AstArena) -> Vec<NodeId>) -> (Compiler, NodeId) {
        let mut compiler = Compiler::new();
        let body = stmts(&mut compiler.arena);
        let script = build::script(&mut compiler.arena, body);
        let root = build::root(&mut compiler.arena, vec![script]);
        compiler.register_input(script, "main.js", false);
        compiler.set_root(root);
        (compiler, root)
    }

    #[test]
    fn resolved_references_pass() {
        let (mut compiler, root) = setup(|a| {
            let one = build::number(a, 1.0);
            let d = build::var_decl(a, "x", Some(one));
            let xr = build::name(a, "x");
            let s = build::expr_result(a, xr);
            vec![d, s]
        });
        assert!(AstValidator::validate(&mut compiler, root));
    }

    #[test]
    fn undeclared_reference_reports_once_per_use() {
        let (mut compiler, root) = setup(|a| {
            let y1 = build::name(a, "y");
            let s1 = build::expr_result(a, y1);
            let y2 = build::name(a, "y");
            let s2 = build::expr_result(a, y2);
            vec![s1, s2]
        });
        assert!(!AstValidator::validate(&mut compiler, root));
        let undeclared: Vec<_> = compiler
            .errors
            .diagnostics()
            .iter()
            .filter(|d| d.key == "S2015")
            .collect();
        assert_eq!(undeclared.len(), 2);
    }

    #[test]
    fn hoisted_use_before_decl_passes() {
        let (mut compiler, root) = setup(|a| {
            let xr = build::name(a, "x");
            let s = build::expr_result(a, xr);
            let d = build::var_decl(a, "x", None);
            vec![s, d]
        });
        assert!(AstValidator::validate(&mut compiler, root));
    }

    #[test]
    fn var_let_duplicate_is_an_error() {
        let (mut compiler, root) = setup(|a| {
            let d1 = build::var_decl(a, "x", None);
            let d2 = build::let_decl(a, "x", None);
            vec![d1, d2]
        });
        assert!(!AstValidator::validate(&mut compiler, root));
    }

    #[test]
    fn var_var_duplicate_is_fine() {
        let (mut compiler, root) = setup(|a| {
            let d1 = build::var_decl(a, "x", None);
            let d2 = build::var_decl(a, "x", None);
            vec![d1, d2]
        });
        assert!(AstValidator::validate(&mut compiler, root));
    }

    #[test]
    fn catch_binding_is_scoped_to_the_catch_block() {
        let (mut compiler, root) = setup(|a| {
            let body = build::block(a, vec![]);
            let er = build::name(a, "e");
            let use_in_catch = build::expr_result(a, er);
            let catch_body = build::block(a, vec![use_in_catch]);
            let catch = build::catch_clause(a, "e", catch_body);
            let t = build::try_stmt(a, body, Some(catch), None);
            // a use after the try: the binding is gone
            let er2 = build::name(a, "e");
            let after = build::expr_result(a, er2);
            vec![t, after]
        });
        assert!(!AstValidator::validate(&mut compiler, root));
        let undeclared: Vec<_> = compiler
            .errors
            .diagnostics()
            .iter()
            .filter(|d| d.key == "S2015")
            .collect();
        assert_eq!(undeclared.len(), 1);
    }

    #[test]
    fn feature_annotation_must_cover_usage() {
        let (mut compiler, root) = setup(|a| {
            let d = build::let_decl(a, "x", None);
            vec![d]
        });
        // annotation says ES3, tree uses let
        assert!(!AstValidator::validate(&mut compiler, root));

        let script = compiler.arena.child(root, 0);
        compiler
            .arena
            .set_script_features(script, FeatureSet::ES3.with(Feature::LetConst));
        let mut compiler2 = compiler;
        compiler2.errors = crate::diagnostics::ErrorManager::new();
        assert!(AstValidator::validate(&mut compiler2, root));
    }
}
