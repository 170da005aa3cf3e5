//! The compiler instance: exclusive owner of the tree, the inputs, the
//! change counter, the memoized scopes, and the diagnostic stream.
//!
//! Passes never hold a compiler reference beyond their own invocation;
//! they receive it through the pass context and report every structural
//! mutation back so change stamps and memoized scopes stay honest.

use rustc_hash::{FxHashMap, FxHashSet};

use stoat_ast::{AstArena, NodeId};
use stoat_identity::{InputId, ModuleId};
use stoat_sema::IncrementalScopeCreator;

use crate::diagnostics::ErrorManager;

/// One registered source file.
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub path: String,
    pub is_extern: bool,
    pub module: Option<ModuleId>,
}

/// A named group of inputs with explicit dependencies, delivered by the
/// build collaborator as a DAG.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub deps: Vec<ModuleId>,
}

#[derive(Debug, Default)]
pub struct Compiler {
    pub arena: AstArena,
    pub errors: ErrorManager,
    inputs: Vec<SourceInput>,
    modules: Vec<Module>,
    root: Option<NodeId>,
    change_stamp: u32,
    deleted_functions: FxHashSet<NodeId>,
    scope_creator: Option<IncrementalScopeCreator>,
    /// Counter for temporaries synthesized by transforms.
    next_temp: u32,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Inputs and root
    // ------------------------------------------------------------------

    /// Register a source file for the given script node. Returns the
    /// input identity, which is also recorded on the script.
    pub fn register_input(&mut self, script: NodeId, path: &str, is_extern: bool) -> InputId {
        let id = InputId::new(self.inputs.len() as u32);
        self.inputs.push(SourceInput {
            path: path.to_string(),
            is_extern,
            module: None,
        });
        self.arena.set_input(script, id);
        id
    }

    pub fn input(&self, id: InputId) -> &SourceInput {
        &self.inputs[id.index() as usize]
    }

    /// Register a module. `deps` must already be registered, which keeps
    /// the module graph a DAG by construction.
    pub fn register_module(&mut self, name: &str, deps: Vec<ModuleId>) -> ModuleId {
        let id = ModuleId::new(self.modules.len() as u32);
        debug_assert!(deps.iter().all(|d| d.index() < id.index()));
        self.modules.push(Module {
            name: name.to_string(),
            deps,
        });
        id
    }

    pub fn assign_input_to_module(&mut self, input: InputId, module: ModuleId) {
        self.inputs[input.index() as usize].module = Some(module);
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index() as usize]
    }

    pub fn module_of(&self, input: InputId) -> Option<ModuleId> {
        self.inputs[input.index() as usize].module
    }

    pub fn input_paths(&self) -> FxHashMap<InputId, String> {
        self.inputs
            .iter()
            .enumerate()
            .map(|(i, input)| (InputId::new(i as u32), input.path.clone()))
            .collect()
    }

    pub fn extern_inputs(&self) -> FxHashSet<InputId> {
        self.inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| input.is_extern)
            .map(|(i, _)| InputId::new(i as u32))
            .collect()
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> NodeId {
        self.root.expect("compiler root not initialized")
    }

    // ------------------------------------------------------------------
    // Change tracking
    // ------------------------------------------------------------------

    pub fn change_stamp(&self) -> u32 {
        self.change_stamp
    }

    pub fn increment_change_stamp(&mut self) -> u32 {
        self.change_stamp += 1;
        self.change_stamp
    }

    /// Report a mutation under the given change scope (script or
    /// function). Stamps the scope and invalidates its memoized scopes.
    pub fn report_change_to_change_scope(&mut self, scope_root: NodeId) {
        self.change_stamp += 1;
        self.arena.set_change_stamp(scope_root, self.change_stamp);
        if let Some(creator) = &mut self.scope_creator {
            creator.invalidate(scope_root);
        }
    }

    /// Report a mutation at an arbitrary node against its enclosing
    /// change scope.
    pub fn report_change_to_enclosing_scope(&mut self, node: NodeId) {
        let scope = self.arena.enclosing_change_scope(node);
        self.report_change_to_change_scope(scope);
    }

    /// A pass that detaches a function must report the deletion in
    /// addition to the change on the enclosing scope.
    pub fn report_function_deleted(&mut self, fn_node: NodeId) {
        self.deleted_functions.insert(fn_node);
    }

    pub fn deleted_functions(&self) -> &FxHashSet<NodeId> {
        &self.deleted_functions
    }

    /// Change scopes whose stamp is newer than `stamp`, in tree order.
    /// This is what a repeatable pass's should-run check consults.
    pub fn changed_scopes_since(&self, stamp: u32) -> Vec<NodeId> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        self.arena
            .preorder(root)
            .into_iter()
            .filter(|&n| {
                self.arena.kind(n).is_change_scope_root() && self.arena.change_stamp(n) > stamp
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// The shared memoized scope creator. Lives as long as the compiler;
    /// change reports flow into it automatically.
    pub fn incremental_scope_creator(&mut self) -> &mut IncrementalScopeCreator {
        if self.scope_creator.is_none() {
            self.scope_creator = Some(IncrementalScopeCreator::with_externs(
                self.extern_inputs(),
            ));
        }
        self.scope_creator.as_mut().expect("just initialized")
    }

    // ------------------------------------------------------------------
    // Transform support
    // ------------------------------------------------------------------

    /// A fresh name for a synthesized temporary.
    pub fn unique_temp_name(&mut self, prefix: &str) -> String {
        let n = self.next_temp;
        self.next_temp += 1;
        format!("${prefix}${n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_ast::build;

    #[test]
    fn change_reports_stamp_the_enclosing_scope() {
        let mut compiler = Compiler::new();
        let stmt = {
            let arena = &mut compiler.arena;
            let n = build::null(arena);
            build::expr_result(arena, n)
        };
        let script = build::script(&mut compiler.arena, vec![stmt]);
        let root = build::root(&mut compiler.arena, vec![script]);
        compiler.set_root(root);

        compiler.report_change_to_enclosing_scope(stmt);
        assert_eq!(compiler.arena.change_stamp(script), compiler.change_stamp());
        assert_eq!(compiler.changed_scopes_since(0), vec![script]);
        assert!(compiler.changed_scopes_since(compiler.change_stamp()).is_empty());
    }

    #[test]
    fn inputs_round_trip() {
        let mut compiler = Compiler::new();
        let script = build::script(&mut compiler.arena, vec![]);
        let id = compiler.register_input(script, "a.js", false);
        assert_eq!(compiler.input(id).path, "a.js");
        assert_eq!(compiler.arena.input(script), Some(id));
    }
}
