//! End-to-end scenarios over the whole pipeline: passes scheduled by the
//! phase optimizer, inference feeding conformance, and the change
//! verifier policing mutations.

use rustc_hash::FxHashSet;

use stoat::passes::{InlineVariables, PeepholeFoldConstants, RewriteDestructuring};
use stoat::{Compiler, PhaseOptimizer};
use stoat_ast::{build, to_source, AstArena, Feature, FeatureSet, JsDoc, NodeId, TypeExpr};
use stoat_sema::{ChangeVerifier, ConformanceEngine, SemanticError, TypeInference, TypeStore};

/// `function f() { var x = 1; return x + 5; } f();`
fn inline_candidate(compiler: &mut Compiler) -> (NodeId, NodeId) {
    let a = &mut compiler.arena;
    let one = build::number(a, 1.0);
    let x = build::var_decl(a, "x", Some(one));
    let xr = build::name(a, "x");
    let five = build::number(a, 5.0);
    let sum = build::add(a, xr, five);
    let ret = build::return_stmt(a, Some(sum));
    let f = build::function(a, "f", &[], vec![x, ret]);
    let call = build::call_name(a, "f", vec![]);
    let call_stmt = build::expr_result(a, call);
    let script = build::script(a, vec![f, call_stmt]);
    let root = build::root(a, vec![script]);
    (script, root)
}

#[test]
fn constant_folding_through_inlining() {
    let mut compiler = Compiler::new();
    let (script, root) = inline_candidate(&mut compiler);
    compiler.register_input(script, "main.js", false);
    compiler.set_root(root);

    let mut optimizer = PhaseOptimizer::new();
    optimizer.with_change_verification();
    optimizer.add_loop(
        "optimizations",
        vec![
            Box::new(InlineVariables::new()),
            Box::new(PeepholeFoldConstants::new()),
        ],
    );
    optimizer.process(&mut compiler).unwrap();

    assert_eq!(
        to_source(&compiler.arena, script),
        "function f(){return 6;}f();"
    );
    assert!(!compiler.errors.has_errors());
}

#[test]
fn destructuring_lowering_binds_rhs_once() {
    let mut compiler = Compiler::new();
    let a = &mut compiler.arena;
    let foo = build::function(a, "foo", &[], vec![]);
    let rhs = build::call_name(a, "foo", vec![]);
    let d = build::destructuring_var(a, &[("x", "y")], rhs);
    let script = build::script(a, vec![foo, d]);
    let root = build::root(a, vec![script]);
    compiler
        .arena
        .set_script_features(script, FeatureSet::ES3.with(Feature::Destructuring));
    compiler.register_input(script, "main.js", false);
    compiler.set_root(root);

    let mut optimizer = PhaseOptimizer::new();
    optimizer.with_change_verification();
    optimizer.add_one_time_pass(Box::new(RewriteDestructuring::new()));
    optimizer.process(&mut compiler).unwrap();

    let out = to_source(&compiler.arena, script);
    // the RHS is bound once to a fresh temporary, then the property read
    // assigns to y
    assert_eq!(
        out,
        "function foo(){}var $destructuring$0=foo();var y=$destructuring$0.x;"
    );
    assert_eq!(out.matches("foo()").count(), 1);
    assert!(!compiler
        .arena
        .script_features(script)
        .has(Feature::Destructuring));
}

#[test]
fn conformance_whitelist_suppresses_banned_name() {
    // a file named test_file.js containing eval(), banned-name rule on
    // eval with whitelist_regexp "test_": no diagnostic
    let mut compiler = Compiler::new();
    let a = &mut compiler.arena;
    let call = build::call_name(a, "eval", vec![]);
    let stmt = build::expr_result(a, call);
    let script = build::script(a, vec![stmt]);
    let root = build::root(a, vec![script]);
    compiler.register_input(script, "test_file.js", false);
    compiler.set_root(root);

    let config = r#"
        requirement: {
          type: BANNED_NAME
          value: 'eval'
          error_message: 'eval is not allowed'
          whitelist_regexp: 'test_'
        }
    "#;
    let (rules, config_errors) = stoat::parse_conformance_config(config);
    assert!(config_errors.is_empty(), "{config_errors:?}");

    let mut store = TypeStore::new();
    let paths = compiler.input_paths();
    let violations = ConformanceEngine::new(&compiler.arena, &mut store, &paths)
        .check(root, &rules);
    assert!(violations.is_empty(), "{violations:?}");
}

#[test]
fn conformance_reports_outside_whitelist() {
    let mut compiler = Compiler::new();
    let a = &mut compiler.arena;
    let call = build::call_name(a, "eval", vec![]);
    let stmt = build::expr_result(a, call);
    let script = build::script(a, vec![stmt]);
    let root = build::root(a, vec![script]);
    compiler.register_input(script, "src/app.js", false);
    compiler.set_root(root);

    let (rules, _) = stoat::parse_conformance_config(
        r#"
        requirement: {
          type: BANNED_NAME
          value: 'eval'
          error_message: 'eval is not allowed'
          whitelist_regexp: 'test_'
        }
        "#,
    );
    let mut store = TypeStore::new();
    let paths = compiler.input_paths();
    let violations = ConformanceEngine::new(&compiler.arena, &mut store, &paths)
        .check(root, &rules);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].message, "eval is not allowed");
}

#[test]
fn generic_instantiation_ambiguity_names_the_candidates() {
    // id<T>(x: T, y: T): T called as id(1, "a")
    let mut arena = AstArena::new();
    let xr = build::name(&mut arena, "x");
    let ret = build::return_stmt(&mut arena, Some(xr));
    let id = build::function(&mut arena, "id", &["x", "y"], vec![ret]);
    let t = arena.intern("T");
    let x_sym = arena.intern("x");
    let y_sym = arena.intern("y");
    arena.set_jsdoc(
        id,
        JsDoc {
            templates: vec![t],
            params: vec![(x_sym, TypeExpr::Name(t)), (y_sym, TypeExpr::Name(t))],
            return_ty: Some(TypeExpr::Name(t)),
            ..JsDoc::default()
        },
    );
    let one = build::number(&mut arena, 1.0);
    let a_lit = build::string(&mut arena, "a");
    let call = build::call_name(&mut arena, "id", vec![one, a_lit]);
    let stmt = build::expr_result(&mut arena, call);
    let script = build::script(&mut arena, vec![id, stmt]);
    let root = build::root(&mut arena, vec![script]);

    let mut store = TypeStore::new();
    let result = TypeInference::new(&mut arena, &mut store).process(root);

    let ambiguity = result
        .errors
        .iter()
        .find_map(|e| match &e.error {
            SemanticError::NotUniqueInstantiation {
                type_var,
                first,
                second,
            } => Some((type_var.clone(), first.clone(), second.clone())),
            _ => None,
        })
        .expect("expected a not-unique-instantiation diagnostic");
    assert_eq!(ambiguity.0, "T");
    assert_eq!(ambiguity.1, "number");
    assert_eq!(ambiguity.2, "string");
}

#[test]
fn change_verifier_catches_unreported_detach() {
    // snapshot a script, detach one statement without reporting a change
    let mut compiler = Compiler::new();
    let a = &mut compiler.arena;
    let n = build::null(a);
    let stmt = build::expr_result(a, n);
    let f = build::function(a, "g", &[], vec![]);
    let script = build::script(a, vec![f, stmt]);
    let root = build::root(a, vec![script]);
    compiler.set_root(root);

    let verifier = ChangeVerifier::snapshot(&compiler.arena, root, compiler.change_stamp());
    compiler.arena.detach(stmt);

    let err = verifier
        .check_recorded_changes("scenario", &compiler.arena, root, &FxHashSet::default())
        .unwrap_err();
    assert!(err
        .message
        .contains("changed scope not marked as changed"));
}

#[test]
fn full_pipeline_is_deterministic() {
    // identical inputs, identical outputs, byte for byte
    fn run_once() -> String {
        let mut compiler = Compiler::new();
        let (script, root) = inline_candidate(&mut compiler);
        compiler.register_input(script, "main.js", false);
        compiler.set_root(root);
        let mut optimizer = PhaseOptimizer::new();
        optimizer.add_loop(
            "optimizations",
            vec![
                Box::new(InlineVariables::new()),
                Box::new(PeepholeFoldConstants::new()),
            ],
        );
        optimizer.process(&mut compiler).unwrap();
        to_source(&compiler.arena, compiler.root())
    }
    assert_eq!(run_once(), run_once());
}

#[test]
fn debug_sink_observes_each_pass_in_order() {
    let mut compiler = Compiler::new();
    let (script, root) = inline_candidate(&mut compiler);
    compiler.register_input(script, "main.js", false);
    compiler.set_root(root);

    let mut names: Vec<String> = Vec::new();
    {
        let mut optimizer = PhaseOptimizer::new();
        optimizer.with_debug_sink(Box::new(|name, _src| names.push(name.to_string())));
        optimizer.add_one_time_pass(Box::new(InlineVariables::new()));
        optimizer.add_one_time_pass(Box::new(PeepholeFoldConstants::new()));
        optimizer.process(&mut compiler).unwrap();
    }
    assert_eq!(names, vec!["inline-variables", "peephole-fold-constants"]);
}
