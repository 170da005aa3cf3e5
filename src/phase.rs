//! The phase optimizer: schedules passes, loops repeatable groups to a
//! fixed point, gates passes on language feature sets, and polices the
//! change-report contract between passes.

use stoat_ast::{to_source, FeatureSet, NodeId};
use stoat_sema::{ChangeVerifier, ChangeVerifierError};

use crate::compiler::Compiler;
use crate::diagnostics::Diagnostic;
use crate::validity::AstValidator;

/// A unit of work over the tree.
pub trait CompilerPass {
    fn name(&self) -> &'static str;

    /// The richest feature set the pass understands. The optimizer
    /// refuses to run a pass on a program using features beyond it.
    fn feature_set(&self) -> FeatureSet {
        FeatureSet::LATEST
    }

    fn process(&mut self, cx: &mut PassContext<'_>);
}

/// Everything a pass may touch during one invocation. Passes do not hold
/// compiler references beyond this borrow.
pub struct PassContext<'a> {
    pub compiler: &'a mut Compiler,
    pub root: NodeId,
    /// The compiler change stamp when this pass last ran, if it has.
    /// `compiler.changed_scopes_since(stamp)` scopes the work.
    pub last_run_stamp: Option<u32>,
}

/// An unrecoverable internal failure: the pass manager stops the
/// compilation and surfaces it as an internal compiler error.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("change verification failed after pass {pass}: {source}")]
    ChangeVerification {
        pass: String,
        #[source]
        source: ChangeVerifierError,
    },
    #[error("pass loop {loop_name} did not converge after {iterations} iterations (last change from {last_pass})")]
    LoopDidNotConverge {
        loop_name: String,
        iterations: usize,
        last_pass: String,
    },
}

enum Entry {
    OneTime { pass: Box<dyn CompilerPass>, last_run: Option<u32> },
    Loop {
        name: String,
        passes: Vec<(Box<dyn CompilerPass>, Option<u32>)>,
    },
}

type DebugSink<'s> = Box<dyn FnMut(&str, &str) + 's>;

/// Orchestrates an ordered list of passes over one compiler instance.
pub struct PhaseOptimizer<'s> {
    entries: Vec<Entry>,
    max_loop_iterations: usize,
    validity_check: bool,
    verify_changes: bool,
    debug_sink: Option<DebugSink<'s>>,
}

impl Default for PhaseOptimizer<'_> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            max_loop_iterations: 100,
            validity_check: false,
            verify_changes: false,
            debug_sink: None,
        }
    }
}

impl<'s> PhaseOptimizer<'s> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_one_time_pass(&mut self, pass: Box<dyn CompilerPass>) -> &mut Self {
        self.entries.push(Entry::OneTime { pass, last_run: None });
        self
    }

    /// A named group of repeatable passes, iterated until a full round
    /// reports no change.
    pub fn add_loop(&mut self, name: &str, passes: Vec<Box<dyn CompilerPass>>) -> &mut Self {
        self.entries.push(Entry::Loop {
            name: name.to_string(),
            passes: passes.into_iter().map(|p| (p, None)).collect(),
        });
        self
    }

    pub fn with_max_loop_iterations(&mut self, n: usize) -> &mut Self {
        self.max_loop_iterations = n;
        self
    }

    /// Run the between-pass validity check (duplicate declarations,
    /// unresolved references, feature-set annotations).
    pub fn with_validity_check(&mut self) -> &mut Self {
        self.validity_check = true;
        self
    }

    /// Snapshot before and audit after every pass.
    pub fn with_change_verification(&mut self) -> &mut Self {
        self.verify_changes = true;
        self
    }

    /// Observe the program after each pass: the sink receives the pass
    /// name, then the printed source.
    pub fn with_debug_sink(&mut self, sink: DebugSink<'s>) -> &mut Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn process(&mut self, compiler: &mut Compiler) -> Result<(), FatalError> {
        let root = compiler.root();
        let mut entries = std::mem::take(&mut self.entries);
        let result = self.process_entries(compiler, root, &mut entries);
        self.entries = entries;
        result
    }

    fn process_entries(
        &mut self,
        compiler: &mut Compiler,
        root: NodeId,
        entries: &mut [Entry],
    ) -> Result<(), FatalError> {
        for entry in entries.iter_mut() {
            match entry {
                Entry::OneTime { pass, last_run } => {
                    self.run_pass(compiler, root, pass.as_mut(), last_run)?;
                }
                Entry::Loop { name, passes } => {
                    let mut iterations = 0usize;
                    loop {
                        let mut last_changer: Option<&'static str> = None;
                        for (pass, last_run) in passes.iter_mut() {
                            let changed =
                                self.run_pass(compiler, root, pass.as_mut(), last_run)?;
                            if changed {
                                last_changer = Some(pass.name());
                            }
                        }
                        let Some(changer) = last_changer else { break };
                        iterations += 1;
                        tracing::debug!(
                            loop_name = name.as_str(),
                            iterations,
                            last_change = changer,
                            "pass loop iteration complete"
                        );
                        if iterations >= self.max_loop_iterations {
                            return Err(FatalError::LoopDidNotConverge {
                                loop_name: name.clone(),
                                iterations,
                                last_pass: changer.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one pass if its should-run check says there is work, then
    /// audit. Returns whether the pass reported any change.
    fn run_pass(
        &mut self,
        compiler: &mut Compiler,
        root: NodeId,
        pass: &mut dyn CompilerPass,
        last_run: &mut Option<u32>,
    ) -> Result<bool, FatalError> {
        // Should-run: skip a repeatable pass when no scope changed since
        // it last ran.
        if let Some(stamp) = *last_run {
            if compiler.changed_scopes_since(stamp).is_empty() {
                tracing::trace!(pass = pass.name(), "skipped: no scope changed since last run");
                return Ok(false);
            }
        }

        // Feature gate: the program's sugar level must be within what the
        // pass supports.
        let program_features = program_features(compiler, root);
        if !pass.feature_set().contains(program_features) {
            compiler.errors.report(Diagnostic::error(
                "UNSUPPORTED_FEATURE_SET",
                format!(
                    "pass {} cannot run: the program uses language features the pass does not support",
                    pass.name()
                ),
            ));
            return Ok(false);
        }

        let verifier = self
            .verify_changes
            .then(|| ChangeVerifier::snapshot(&compiler.arena, root, compiler.change_stamp()));

        let stamp_before = compiler.change_stamp();
        tracing::debug!(pass = pass.name(), "running pass");
        {
            let mut cx = PassContext {
                compiler,
                root,
                last_run_stamp: *last_run,
            };
            pass.process(&mut cx);
        }
        // The pass's own mutations count as "changed since last run":
        // they may have opened new opportunities for it.
        *last_run = Some(stamp_before);

        if let Some(verifier) = verifier {
            verifier
                .check_recorded_changes(
                    pass.name(),
                    &compiler.arena,
                    root,
                    compiler.deleted_functions(),
                )
                .map_err(|source| FatalError::ChangeVerification {
                    pass: pass.name().to_string(),
                    source,
                })?;
        }

        if self.validity_check {
            AstValidator::validate(compiler, root);
        }

        if let Some(sink) = &mut self.debug_sink {
            let source = to_source(&compiler.arena, root);
            sink(pass.name(), &source);
        }

        Ok(compiler.change_stamp() > stamp_before)
    }
}

/// The union of every script's recorded feature set.
fn program_features(compiler: &Compiler, root: NodeId) -> FeatureSet {
    let mut features = FeatureSet::ES3;
    for &script in compiler.arena.children(root) {
        features = features.union(compiler.arena.script_features(script));
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoat_ast::{build, Feature};

    /// Counts its invocations; reports a change the first `changes` runs.
    struct CountingPass {
        name: &'static str,
        runs: std::rc::Rc<std::cell::Cell<usize>>,
        changes: usize,
        features: FeatureSet,
    }

    impl CompilerPass for CountingPass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn feature_set(&self) -> FeatureSet {
            self.features
        }

        fn process(&mut self, cx: &mut PassContext<'_>) {
            let n = self.runs.get() + 1;
            self.runs.set(n);
            if n <= self.changes {
                let script = cx.compiler.arena.child(cx.root, 0);
                cx.compiler.report_change_to_change_scope(script);
            }
        }
    }

    fn setup() -> Compiler {
        let mut compiler = Compiler::new();
        let script = build::script(&mut compiler.arena, vec![]);
        let root = build::root(&mut compiler.arena, vec![script]);
        compiler.register_input(script, "main.js", false);
        compiler.set_root(root);
        compiler
    }

    #[test]
    fn loop_runs_until_fixed_point() {
        let mut compiler = setup();
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let pass = CountingPass {
            name: "counting",
            runs: runs.clone(),
            changes: 3,
            features: FeatureSet::LATEST,
        };
        let mut optimizer = PhaseOptimizer::new();
        optimizer.add_loop("main", vec![Box::new(pass)]);
        optimizer.process(&mut compiler).unwrap();
        // three changing runs plus the quiet run that ends the loop
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn runaway_loop_hits_the_cap() {
        let mut compiler = setup();
        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let pass = CountingPass {
            name: "restless",
            runs: runs.clone(),
            changes: usize::MAX,
            features: FeatureSet::LATEST,
        };
        let mut optimizer = PhaseOptimizer::new();
        optimizer.with_max_loop_iterations(5);
        optimizer.add_loop("main", vec![Box::new(pass)]);
        let err = optimizer.process(&mut compiler).unwrap_err();
        assert!(matches!(err, FatalError::LoopDidNotConverge { iterations: 5, .. }));
    }

    #[test]
    fn feature_gate_refuses_narrow_pass() {
        let mut compiler = setup();
        let script = compiler.arena.child(compiler.root(), 0);
        compiler
            .arena
            .set_script_features(script, FeatureSet::ES3.with(Feature::LetConst));

        let runs = std::rc::Rc::new(std::cell::Cell::new(0));
        let pass = CountingPass {
            name: "es3-only",
            runs: runs.clone(),
            changes: 0,
            features: FeatureSet::ES3,
        };
        let mut optimizer = PhaseOptimizer::new();
        optimizer.add_one_time_pass(Box::new(pass));
        optimizer.process(&mut compiler).unwrap();

        assert_eq!(runs.get(), 0);
        assert!(compiler.errors.has_errors());
    }

    #[test]
    fn unreported_mutation_is_fatal_under_verification() {
        struct SneakyPass;
        impl CompilerPass for SneakyPass {
            fn name(&self) -> &'static str {
                "sneaky"
            }
            fn process(&mut self, cx: &mut PassContext<'_>) {
                let script = cx.compiler.arena.child(cx.root, 0);
                let arena = &mut cx.compiler.arena;
                let n = build::null(arena);
                let stmt = build::expr_result(arena, n);
                arena.append_child(script, stmt);
                // no change report
            }
        }

        let mut compiler = setup();
        let mut optimizer = PhaseOptimizer::new();
        optimizer.with_change_verification();
        optimizer.add_one_time_pass(Box::new(SneakyPass));
        let err = optimizer.process(&mut compiler).unwrap_err();
        assert!(matches!(err, FatalError::ChangeVerification { .. }));
    }

    #[test]
    fn debug_sink_sees_pass_name_then_source() {
        let mut compiler = setup();
        let script = compiler.arena.child(compiler.root(), 0);
        let n = build::number(&mut compiler.arena, 1.0);
        let stmt = build::expr_result(&mut compiler.arena, n);
        compiler.arena.append_child(script, stmt);

        let mut observed: Vec<(String, String)> = Vec::new();
        {
            let mut optimizer = PhaseOptimizer::new();
            optimizer.with_debug_sink(Box::new(|name, src| {
                observed.push((name.to_string(), src.to_string()));
            }));
            let runs = std::rc::Rc::new(std::cell::Cell::new(0));
            optimizer.add_one_time_pass(Box::new(CountingPass {
                name: "observe-me",
                runs,
                changes: 0,
                features: FeatureSet::LATEST,
            }));
            optimizer.process(&mut compiler).unwrap();
        }
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].0, "observe-me");
        assert_eq!(observed[0].1, "1;");
    }
}
