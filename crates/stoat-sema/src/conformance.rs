//! Conformance checking: declarative rules evaluated over the typed AST.
//!
//! Rules are a closed set of kinds plus one open arm for caller-provided
//! predicates. Each hit is either a definite violation or, when the
//! deciding evidence is an inferred loose type, a possible violation.

use regex::Regex;
use rustc_hash::FxHashMap;

use stoat_ast::{AstArena, NodeId, NodeKind};
use stoat_identity::{InputId, TypeId};

use crate::types::{TypeData, TypeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConformanceResult {
    Conforms,
    /// The inferred type was too loose to be sure.
    PossibleViolation,
    Violation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropAccessMode {
    Read,
    Write,
    Any,
    NonConstantWrite,
}

/// A custom rule: a boxed predicate over the typed AST.
pub trait CustomRule {
    fn check(&self, arena: &AstArena, store: &TypeStore, node: NodeId) -> ConformanceResult;
}

/// The closed set of rule behaviors.
pub enum RuleKind {
    /// Reads of a named global identifier.
    BannedName { names: Vec<String> },
    /// Calls of a named identifier.
    BannedNameCall { names: Vec<String> },
    /// Accesses of `Type.prototype.prop` (or `ns.prop`), honoring
    /// subtype relationships through the receiver's inferred type.
    BannedProperty {
        entries: Vec<(String, String)>,
        mode: PropAccessMode,
    },
    /// Structural match against a code fragment, compared in printed
    /// form.
    BannedCodePattern { patterns: Vec<String> },
    /// Any reference into a named source file.
    BannedDependency { paths: Vec<String> },
    /// Calls of a named identifier whose argument types must match the
    /// declared signature.
    RestrictedNameCall { entries: Vec<(String, String)> },
    /// Method calls (`recv.m(...)`) whose argument types must match the
    /// declared signature.
    RestrictedMethodCall { entries: Vec<(String, String)> },
    Custom(Box<dyn CustomRule>),
}

impl std::fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::BannedName { names } => f.debug_struct("BannedName").field("names", names).finish(),
            RuleKind::BannedNameCall { names } => {
                f.debug_struct("BannedNameCall").field("names", names).finish()
            }
            RuleKind::BannedProperty { entries, mode } => f
                .debug_struct("BannedProperty")
                .field("entries", entries)
                .field("mode", mode)
                .finish(),
            RuleKind::BannedCodePattern { patterns } => f
                .debug_struct("BannedCodePattern")
                .field("patterns", patterns)
                .finish(),
            RuleKind::BannedDependency { paths } => {
                f.debug_struct("BannedDependency").field("paths", paths).finish()
            }
            RuleKind::RestrictedNameCall { entries } => f
                .debug_struct("RestrictedNameCall")
                .field("entries", entries)
                .finish(),
            RuleKind::RestrictedMethodCall { entries } => f
                .debug_struct("RestrictedMethodCall")
                .field("entries", entries)
                .finish(),
            RuleKind::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One configured requirement.
#[derive(Debug)]
pub struct Rule {
    pub kind: RuleKind,
    pub error_message: String,
    pub whitelist: Vec<String>,
    pub whitelist_regexp: Vec<Regex>,
    pub only_apply_to: Vec<String>,
    pub only_apply_to_regexp: Vec<Regex>,
    pub report_loose_type_violations: bool,
    pub rule_id: Option<String>,
}

impl Rule {
    pub fn new(kind: RuleKind, error_message: impl Into<String>) -> Self {
        Rule {
            kind,
            error_message: error_message.into(),
            whitelist: Vec::new(),
            whitelist_regexp: Vec::new(),
            only_apply_to: Vec::new(),
            only_apply_to_regexp: Vec::new(),
            report_loose_type_violations: true,
            rule_id: None,
        }
    }

    /// Whether the rule applies to a file at all.
    fn applies_to(&self, path: &str) -> bool {
        if self.whitelist.iter().any(|w| path.starts_with(w.as_str()))
            || self.whitelist_regexp.iter().any(|r| r.is_match(path))
        {
            return false;
        }
        let restricted = !self.only_apply_to.is_empty() || !self.only_apply_to_regexp.is_empty();
        if restricted {
            return self.only_apply_to.iter().any(|p| path.starts_with(p.as_str()))
                || self.only_apply_to_regexp.iter().any(|r| r.is_match(path));
        }
        true
    }
}

/// A reported hit.
#[derive(Debug)]
pub struct ConformanceViolation {
    pub node: NodeId,
    pub result: ConformanceResult,
    pub message: String,
    pub input: Option<InputId>,
}

/// Evaluates rules against the typed AST. `input_paths` maps source
/// inputs to the file names whitelists are matched against.
pub struct ConformanceEngine<'a> {
    arena: &'a AstArena,
    store: &'a mut TypeStore,
    input_paths: &'a FxHashMap<InputId, String>,
}

impl<'a> ConformanceEngine<'a> {
    pub fn new(
        arena: &'a AstArena,
        store: &'a mut TypeStore,
        input_paths: &'a FxHashMap<InputId, String>,
    ) -> Self {
        ConformanceEngine {
            arena,
            store,
            input_paths,
        }
    }

    pub fn check(&mut self, root: NodeId, rules: &[Rule]) -> Vec<ConformanceViolation> {
        let mut out = Vec::new();
        let nodes = self.arena.preorder(root);
        for rule in rules {
            for &node in &nodes {
                let path = self
                    .arena
                    .input(node)
                    .and_then(|i| self.input_paths.get(&i))
                    .map(String::as_str)
                    .unwrap_or("");
                if !rule.applies_to(path) {
                    continue;
                }
                let result = self.check_rule(rule, node);
                let reportable = match result {
                    ConformanceResult::Conforms => false,
                    ConformanceResult::Violation => true,
                    ConformanceResult::PossibleViolation => rule.report_loose_type_violations,
                };
                if reportable {
                    out.push(ConformanceViolation {
                        node,
                        result,
                        message: rule.error_message.clone(),
                        input: self.arena.input(node),
                    });
                }
            }
        }
        out
    }

    fn check_rule(&mut self, rule: &Rule, node: NodeId) -> ConformanceResult {
        match &rule.kind {
            RuleKind::BannedName { names } => self.check_banned_name(names, node),
            RuleKind::BannedNameCall { names } => {
                if !matches!(self.arena.kind(node), NodeKind::Call | NodeKind::New) {
                    return ConformanceResult::Conforms;
                }
                let callee = self.arena.child(node, 0);
                self.check_banned_name(names, callee)
            }
            RuleKind::BannedProperty { entries, mode } => {
                self.check_banned_property(entries, *mode, node)
            }
            RuleKind::BannedCodePattern { patterns } => {
                let printed = stoat_ast::to_source(self.arena, node);
                if patterns.iter().any(|p| normalized(p) == normalized(&printed)) {
                    ConformanceResult::Violation
                } else {
                    ConformanceResult::Conforms
                }
            }
            RuleKind::BannedDependency { paths } => {
                let Some(input) = self.arena.input(node) else {
                    return ConformanceResult::Conforms;
                };
                // One hit per script is enough.
                if !matches!(self.arena.kind(node), NodeKind::Script) {
                    return ConformanceResult::Conforms;
                }
                let path = self
                    .input_paths
                    .get(&input)
                    .map(String::as_str)
                    .unwrap_or("");
                if paths.iter().any(|p| path.ends_with(p.as_str())) {
                    ConformanceResult::Violation
                } else {
                    ConformanceResult::Conforms
                }
            }
            RuleKind::RestrictedNameCall { entries } => {
                self.check_restricted_call(entries, node, false)
            }
            RuleKind::RestrictedMethodCall { entries } => {
                self.check_restricted_call(entries, node, true)
            }
            RuleKind::Custom(custom) => custom.check(self.arena, self.store, node),
        }
    }

    fn check_banned_name(&self, names: &[String], node: NodeId) -> ConformanceResult {
        let NodeKind::Name(sym) = *self.arena.kind(node) else {
            return ConformanceResult::Conforms;
        };
        // Declarations of the name are not uses of the banned global.
        if self
            .arena
            .parent(node)
            .is_some_and(|p| self.arena.kind(p).is_decl())
        {
            return ConformanceResult::Conforms;
        }
        if names.iter().any(|n| n == self.arena.name_of(sym)) {
            ConformanceResult::Violation
        } else {
            ConformanceResult::Conforms
        }
    }

    fn check_banned_property(
        &mut self,
        entries: &[(String, String)],
        mode: PropAccessMode,
        node: NodeId,
    ) -> ConformanceResult {
        let NodeKind::GetProp(prop) = *self.arena.kind(node) else {
            return ConformanceResult::Conforms;
        };
        let prop_name = self.arena.name_of(prop).to_string();

        let parent = self.arena.parent(node);
        let is_write = parent.is_some_and(|p| {
            matches!(self.arena.kind(p), NodeKind::Assign(_)) && self.arena.child(p, 0) == node
        });
        let mode_matches = match mode {
            PropAccessMode::Read => !is_write,
            PropAccessMode::Write => is_write,
            PropAccessMode::Any => true,
            PropAccessMode::NonConstantWrite => {
                is_write
                    && parent.is_some_and(|p| {
                        let rhs = self.arena.child(p, 1);
                        !self.arena.kind(rhs).is_literal_value()
                    })
            }
        };
        if !mode_matches {
            return ConformanceResult::Conforms;
        }

        let obj = self.arena.child(node, 0);
        let receiver = self.arena.inferred_type(obj).unwrap_or(TypeId::UNKNOWN);

        for (type_name, banned_prop) in entries {
            if *banned_prop != prop_name {
                continue;
            }
            match self.receiver_matches(receiver, type_name) {
                ReceiverMatch::Definite => return ConformanceResult::Violation,
                ReceiverMatch::Possible => return ConformanceResult::PossibleViolation,
                ReceiverMatch::No => {}
            }
        }
        ConformanceResult::Conforms
    }

    fn receiver_matches(&mut self, receiver: TypeId, type_name: &str) -> ReceiverMatch {
        if receiver.is_unknown() || receiver.is_top() || self.store.is_loose(receiver) {
            return ReceiverMatch::Possible;
        }
        match self.store.get(receiver).clone() {
            TypeData::Object(o) => match o.nominal {
                Some(nominal) => {
                    // Walk the superclass chain: banning a base type bans
                    // the subtypes.
                    let mut cur = Some(nominal);
                    while let Some(c) = cur {
                        let def = self.store.nominal(c);
                        if self.arena.interner().resolve(def.name) == type_name {
                            return ReceiverMatch::Definite;
                        }
                        cur = def.superclass;
                    }
                    ReceiverMatch::No
                }
                None => ReceiverMatch::No,
            },
            TypeData::Union(members) => {
                let mut any_possible = false;
                for m in members {
                    match self.receiver_matches(m, type_name) {
                        ReceiverMatch::Definite => return ReceiverMatch::Definite,
                        ReceiverMatch::Possible => any_possible = true,
                        ReceiverMatch::No => {}
                    }
                }
                if any_possible {
                    ReceiverMatch::Possible
                } else {
                    ReceiverMatch::No
                }
            }
            _ => ReceiverMatch::No,
        }
    }

    fn check_restricted_call(
        &mut self,
        entries: &[(String, String)],
        node: NodeId,
        method: bool,
    ) -> ConformanceResult {
        if !matches!(self.arena.kind(node), NodeKind::Call) {
            return ConformanceResult::Conforms;
        }
        let callee = self.arena.child(node, 0);
        let callee_name = match (method, self.arena.kind(callee)) {
            (false, NodeKind::Name(sym)) => self.arena.name_of(*sym).to_string(),
            (true, NodeKind::GetProp(prop)) => self.arena.name_of(*prop).to_string(),
            _ => return ConformanceResult::Conforms,
        };

        for (name, signature) in entries {
            if *name != callee_name {
                continue;
            }
            let formals = parse_signature(signature);
            let args = &self.arena.children(node)[1..];
            if args.len() != formals.len() {
                return ConformanceResult::Violation;
            }
            for (&arg, formal) in args.iter().zip(&formals) {
                let ty = self.arena.inferred_type(arg).unwrap_or(TypeId::UNKNOWN);
                if ty.is_unknown() {
                    return ConformanceResult::PossibleViolation;
                }
                if !self.store.is_subtype(ty, *formal) {
                    return ConformanceResult::Violation;
                }
            }
        }
        ConformanceResult::Conforms
    }
}

enum ReceiverMatch {
    Definite,
    Possible,
    No,
}

/// Signatures in rule values are a comma list of scalar type names, e.g.
/// `"number,string"`.
fn parse_signature(sig: &str) -> Vec<TypeId> {
    sig.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| match s.trim() {
            "number" => TypeId::NUMBER,
            "string" => TypeId::STRING,
            "boolean" => TypeId::BOOLEAN,
            "null" => TypeId::NULL,
            "undefined" => TypeId::UNDEFINED,
            _ => TypeId::UNKNOWN,
        })
        .collect()
}

fn normalized(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_ast::build;

    fn setup(eval_file: &str) -> (AstArena, NodeId, FxHashMap<InputId, String>) {
        let mut arena = AstArena::new();
        let call = build::call_name(&mut arena, "eval", vec![]);
        let stmt = build::expr_result(&mut arena, call);
        let script = build::script(&mut arena, vec![stmt]);
        let root = build::root(&mut arena, vec![script]);
        arena.set_input(script, InputId::new(0));
        let mut paths = FxHashMap::default();
        paths.insert(InputId::new(0), eval_file.to_string());
        (arena, root, paths)
    }

    #[test]
    fn banned_name_reports_use() {
        let (arena, root, paths) = setup("src/app.js");
        let mut store = TypeStore::new();
        let rule = Rule::new(
            RuleKind::BannedName {
                names: vec!["eval".into()],
            },
            "eval is not allowed",
        );
        let violations = ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].result, ConformanceResult::Violation);
        assert_eq!(violations[0].message, "eval is not allowed");
    }

    #[test]
    fn whitelist_regexp_suppresses() {
        let (arena, root, paths) = setup("test_file.js");
        let mut store = TypeStore::new();
        let mut rule = Rule::new(
            RuleKind::BannedName {
                names: vec!["eval".into()],
            },
            "eval is not allowed",
        );
        rule.whitelist_regexp.push(Regex::new("test_").unwrap());
        let violations = ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert!(violations.is_empty());
    }

    #[test]
    fn only_apply_to_restricts() {
        let (arena, root, paths) = setup("src/app.js");
        let mut store = TypeStore::new();
        let mut rule = Rule::new(
            RuleKind::BannedName {
                names: vec!["eval".into()],
            },
            "no eval",
        );
        rule.only_apply_to.push("vendor/".into());
        let violations = ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert!(violations.is_empty());
    }

    #[test]
    fn banned_name_ignores_declarations() {
        let mut arena = AstArena::new();
        let d = build::var_decl(&mut arena, "eval", None);
        let script = build::script(&mut arena, vec![d]);
        let root = build::root(&mut arena, vec![script]);
        let mut store = TypeStore::new();
        let paths = FxHashMap::default();
        let rule = Rule::new(
            RuleKind::BannedName {
                names: vec!["eval".into()],
            },
            "no eval",
        );
        let violations = ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert!(violations.is_empty());
    }

    #[test]
    fn banned_code_pattern_matches_printed_form() {
        let mut arena = AstArena::new();
        let lhs = build::name(&mut arena, "x");
        let rhs = build::name(&mut arena, "x");
        let cmp = build::binary(&mut arena, stoat_ast::BinaryOp::StrictEq, lhs, rhs);
        let stmt = build::expr_result(&mut arena, cmp);
        let script = build::script(&mut arena, vec![stmt]);
        let root = build::root(&mut arena, vec![script]);
        let mut store = TypeStore::new();
        let paths = FxHashMap::default();
        let rule = Rule::new(
            RuleKind::BannedCodePattern {
                patterns: vec!["(x === x)".into()],
            },
            "self comparison",
        );
        let violations = ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn banned_property_honors_subtypes_and_looseness() {
        use crate::types::{NominalDef, Property};
        use stoat_identity::TypeId;

        let mut arena = AstArena::new();
        let o = build::name(&mut arena, "o");
        let access = build::getprop(&mut arena, o, "dangerous");
        let stmt = build::expr_result(&mut arena, access);
        let script = build::script(&mut arena, vec![stmt]);
        let root = build::root(&mut arena, vec![script]);

        let mut store = TypeStore::new();
        let base_name = arena.intern("Base");
        let sub_name = arena.intern("Sub");
        let dangerous = arena.intern("dangerous");
        let base = store.define_nominal(NominalDef {
            name: base_name,
            superclass: None,
            is_interface: false,
            instance_props: vec![(dangerous, Property::required(TypeId::NUMBER))],
        });
        let sub = store.define_nominal(NominalDef {
            name: sub_name,
            superclass: Some(base),
            is_interface: false,
            instance_props: vec![],
        });
        // The receiver is a Sub instance; banning Base.prototype.dangerous
        // must still hit.
        let sub_inst = store.instance_of(sub);
        arena.set_inferred_type(o, sub_inst);

        let rule = Rule::new(
            RuleKind::BannedProperty {
                entries: vec![("Base".into(), "dangerous".into())],
                mode: PropAccessMode::Any,
            },
            "dangerous is banned",
        );
        let paths = FxHashMap::default();
        let violations =
            ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].result, ConformanceResult::Violation);

        // An unknown receiver only possibly violates.
        let mut arena2 = AstArena::new();
        let o2 = build::name(&mut arena2, "o");
        let access2 = build::getprop(&mut arena2, o2, "dangerous");
        let stmt2 = build::expr_result(&mut arena2, access2);
        let script2 = build::script(&mut arena2, vec![stmt2]);
        let root2 = build::root(&mut arena2, vec![script2]);
        arena2.intern("Base");
        let mut store2 = TypeStore::new();
        let rule2 = Rule::new(
            RuleKind::BannedProperty {
                entries: vec![("Base".into(), "dangerous".into())],
                mode: PropAccessMode::Any,
            },
            "dangerous is banned",
        );
        let violations2 =
            ConformanceEngine::new(&arena2, &mut store2, &paths).check(root2, &[rule2]);
        assert_eq!(violations2.len(), 1);
        assert_eq!(violations2[0].result, ConformanceResult::PossibleViolation);
    }

    #[test]
    fn restricted_name_call_checks_signature() {
        use stoat_identity::TypeId;

        let mut arena = AstArena::new();
        let arg = build::string(&mut arena, "not a number");
        let call = build::call_name(&mut arena, "setTimeout", vec![arg]);
        let stmt = build::expr_result(&mut arena, call);
        let script = build::script(&mut arena, vec![stmt]);
        let root = build::root(&mut arena, vec![script]);
        arena.set_inferred_type(arg, TypeId::STRING);

        let mut store = TypeStore::new();
        let paths = FxHashMap::default();
        let rule = Rule::new(
            RuleKind::RestrictedNameCall {
                entries: vec![("setTimeout".into(), "number".into())],
            },
            "setTimeout requires a numeric delay",
        );
        let violations =
            ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].result, ConformanceResult::Violation);
    }

    #[test]
    fn custom_rule_arm() {
        struct NoNumbers;
        impl CustomRule for NoNumbers {
            fn check(&self, arena: &AstArena, _store: &TypeStore, node: NodeId) -> ConformanceResult {
                if matches!(arena.kind(node), NodeKind::Number(_)) {
                    ConformanceResult::Violation
                } else {
                    ConformanceResult::Conforms
                }
            }
        }
        let mut arena = AstArena::new();
        let n = build::number(&mut arena, 42.0);
        let stmt = build::expr_result(&mut arena, n);
        let script = build::script(&mut arena, vec![stmt]);
        let root = build::root(&mut arena, vec![script]);
        let mut store = TypeStore::new();
        let paths = FxHashMap::default();
        let rule = Rule::new(RuleKind::Custom(Box::new(NoNumbers)), "no numbers");
        let violations = ConformanceEngine::new(&arena, &mut store, &paths).check(root, &[rule]);
        assert_eq!(violations.len(), 1);
    }
}
