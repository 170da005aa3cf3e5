//! Constant folding: evaluate pure literal expressions at compile time.
//!
//! Folds arithmetic and string concatenation over literal operands,
//! boolean negation, numeric negation, and comparison of equal literals.
//! Each fold replaces a node with a smaller literal, so the pass strictly
//! shrinks the tree.

use stoat_ast::{build, AstArena, BinaryOp, NodeId, NodeKind, UnaryOp};

use crate::phase::{CompilerPass, PassContext};

#[derive(Default)]
pub struct PeepholeFoldConstants {
    folded: usize,
}

impl PeepholeFoldConstants {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompilerPass for PeepholeFoldConstants {
    fn name(&self) -> &'static str {
        "peephole-fold-constants"
    }

    fn process(&mut self, cx: &mut PassContext<'_>) {
        // Repeat locally until nothing folds: folding an inner pair can
        // expose an outer one in the same run.
        loop {
            let mut folded_any = false;
            let nodes = cx.compiler.arena.preorder(cx.root);
            // Post-order-ish: fold deepest first by walking the preorder
            // list backward.
            for &n in nodes.iter().rev() {
                if cx.compiler.arena.parent(n).is_none() && n != cx.root {
                    continue; // already detached by an enclosing fold
                }
                if let Some(value) = fold(&cx.compiler.arena, n) {
                    let replacement = value.build(&mut cx.compiler.arena);
                    cx.compiler.arena.replace_with(n, replacement);
                    cx.compiler.report_change_to_enclosing_scope(replacement);
                    self.folded += 1;
                    folded_any = true;
                }
            }
            if !folded_any {
                break;
            }
        }
        tracing::debug!(folded = self.folded, "constant folding complete");
    }
}

/// A folded literal value.
enum Folded {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Folded {
    fn build(&self, arena: &mut AstArena) -> NodeId {
        match self {
            Folded::Number(v) => build::number(arena, *v),
            Folded::Str(s) => build::string(arena, s),
            Folded::Bool(b) => build::boolean(arena, *b),
        }
    }
}

fn literal(arena: &AstArena, n: NodeId) -> Option<Folded> {
    match arena.kind(n) {
        NodeKind::Number(v) => Some(Folded::Number(*v)),
        NodeKind::Str(sym) => Some(Folded::Str(arena.name_of(*sym).to_string())),
        NodeKind::Bool(b) => Some(Folded::Bool(*b)),
        _ => None,
    }
}

fn fold(arena: &AstArena, n: NodeId) -> Option<Folded> {
    match arena.kind(n) {
        NodeKind::Binary(op) => {
            let lhs = literal(arena, arena.child(n, 0))?;
            let rhs = literal(arena, arena.child(n, 1))?;
            fold_binary(*op, lhs, rhs)
        }
        NodeKind::Unary(UnaryOp::Neg) => match literal(arena, arena.child(n, 0))? {
            Folded::Number(v) => Some(Folded::Number(-v)),
            _ => None,
        },
        NodeKind::Unary(UnaryOp::Not) => match literal(arena, arena.child(n, 0))? {
            Folded::Bool(b) => Some(Folded::Bool(!b)),
            _ => None,
        },
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, lhs: Folded, rhs: Folded) -> Option<Folded> {
    match (op, lhs, rhs) {
        (BinaryOp::Add, Folded::Number(a), Folded::Number(b)) => Some(Folded::Number(a + b)),
        (BinaryOp::Add, Folded::Str(a), Folded::Str(b)) => Some(Folded::Str(format!("{a}{b}"))),
        (BinaryOp::Sub, Folded::Number(a), Folded::Number(b)) => Some(Folded::Number(a - b)),
        (BinaryOp::Mul, Folded::Number(a), Folded::Number(b)) => Some(Folded::Number(a * b)),
        (BinaryOp::Div, Folded::Number(a), Folded::Number(b)) if b != 0.0 => {
            Some(Folded::Number(a / b))
        }
        (BinaryOp::Mod, Folded::Number(a), Folded::Number(b)) if b != 0.0 => {
            Some(Folded::Number(a % b))
        }
        (BinaryOp::Lt, Folded::Number(a), Folded::Number(b)) => Some(Folded::Bool(a < b)),
        (BinaryOp::Gt, Folded::Number(a), Folded::Number(b)) => Some(Folded::Bool(a > b)),
        (BinaryOp::Le, Folded::Number(a), Folded::Number(b)) => Some(Folded::Bool(a <= b)),
        (BinaryOp::Ge, Folded::Number(a), Folded::Number(b)) => Some(Folded::Bool(a >= b)),
        (BinaryOp::StrictEq, Folded::Number(a), Folded::Number(b)) => Some(Folded::Bool(a == b)),
        (BinaryOp::StrictEq, Folded::Str(a), Folded::Str(b)) => Some(Folded::Bool(a == b)),
        (BinaryOp::StrictNe, Folded::Number(a), Folded::Number(b)) => Some(Folded::Bool(a != b)),
        (BinaryOp::StrictNe, Folded::Str(a), Folded::Str(b)) => Some(Folded::Bool(a != b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use stoat_ast::to_source;

    fn run(compiler: &mut Compiler, root: NodeId) {
        let mut pass = PeepholeFoldConstants::new();
        let mut cx = PassContext {
            compiler,
            root,
            last_run_stamp: None,
        };
        pass.process(&mut cx);
    }

    #[test]
    fn folds_nested_arithmetic() {
        let mut compiler = Compiler::new();
        let a = &mut compiler.arena;
        let one = build::number(a, 1.0);
        let two = build::number(a, 2.0);
        let three = build::number(a, 3.0);
        let sum = build::add(a, one, two);
        let product = build::binary(a, BinaryOp::Mul, sum, three);
        let stmt = build::expr_result(a, product);
        let script = build::script(a, vec![stmt]);
        let root = build::root(a, vec![script]);
        compiler.set_root(root);

        run(&mut compiler, root);
        assert_eq!(to_source(&compiler.arena, script), "9;");
        assert!(compiler.change_stamp() > 0);
    }

    #[test]
    fn folds_string_concat_and_negation() {
        let mut compiler = Compiler::new();
        let a = &mut compiler.arena;
        let hello = build::string(a, "he");
        let world = build::string(a, "llo");
        let cat = build::add(a, hello, world);
        let s1 = build::expr_result(a, cat);
        let t = build::boolean(a, true);
        let nt = build::not(a, t);
        let s2 = build::expr_result(a, nt);
        let script = build::script(a, vec![s1, s2]);
        let root = build::root(a, vec![script]);
        compiler.set_root(root);

        run(&mut compiler, root);
        assert_eq!(to_source(&compiler.arena, script), "\"hello\";false;");
    }

    #[test]
    fn leaves_division_by_zero_alone() {
        let mut compiler = Compiler::new();
        let a = &mut compiler.arena;
        let one = build::number(a, 1.0);
        let zero = build::number(a, 0.0);
        let div = build::binary(a, BinaryOp::Div, one, zero);
        let stmt = build::expr_result(a, div);
        let script = build::script(a, vec![stmt]);
        let root = build::root(a, vec![script]);
        compiler.set_root(root);

        run(&mut compiler, root);
        assert_eq!(to_source(&compiler.arena, script), "(1/0);");
    }
}
