//! Debug source printer.
//!
//! Renders a subtree back to compact JavaScript-like text. This is the
//! pass-observation and test-assertion channel, not a code emitter: no
//! minification, no source maps, deterministic output.

use crate::kind::{AssignOp, BinaryOp, NodeKind, UnaryOp};
use crate::node::{AstArena, NodeId};

pub fn to_source(arena: &AstArena, node: NodeId) -> String {
    let mut out = String::new();
    emit(arena, node, &mut out);
    out
}

fn emit_stmts(arena: &AstArena, children: &[NodeId], out: &mut String) {
    for &c in children {
        emit(arena, c, out);
    }
}

fn emit_decl(arena: &AstArena, keyword: &str, node: NodeId, out: &mut String) {
    out.push_str(keyword);
    out.push(' ');
    let mut first = true;
    for &child in arena.children(node) {
        if !first {
            out.push(',');
        }
        first = false;
        match arena.kind(child) {
            NodeKind::Name(sym) => {
                out.push_str(arena.name_of(*sym));
                if let Some(init) = arena.first_child(child) {
                    out.push('=');
                    emit(arena, init, out);
                }
            }
            NodeKind::DestructuringLhs => {
                let pattern = arena.child(child, 0);
                let rhs = arena.child(child, 1);
                emit(arena, pattern, out);
                out.push('=');
                emit(arena, rhs, out);
            }
            _ => emit(arena, child, out),
        }
    }
    out.push(';');
}

fn binop_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitOr => "|",
        BinaryOp::BitXor => "^",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::UShr => ">>>",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::StrictEq => "===",
        BinaryOp::StrictNe => "!==",
        BinaryOp::InstanceOf => " instanceof ",
        BinaryOp::In => " in ",
    }
}

fn assignop_text(op: AssignOp) -> &'static str {
    match op {
        AssignOp::Assign => "=",
        AssignOp::Add => "+=",
        AssignOp::Sub => "-=",
        AssignOp::Mul => "*=",
        AssignOp::Div => "/=",
        AssignOp::Mod => "%=",
        AssignOp::BitAnd => "&=",
        AssignOp::BitOr => "|=",
        AssignOp::BitXor => "^=",
        AssignOp::Shl => "<<=",
        AssignOp::Shr => ">>=",
        AssignOp::UShr => ">>>=",
    }
}

fn emit(arena: &AstArena, node: NodeId, out: &mut String) {
    match arena.kind(node) {
        NodeKind::Root => emit_stmts(arena, arena.children(node), out),
        NodeKind::Script => emit_stmts(arena, arena.children(node), out),
        NodeKind::Block => {
            out.push('{');
            emit_stmts(arena, arena.children(node), out);
            out.push('}');
        }
        NodeKind::Var => emit_decl(arena, "var", node, out),
        NodeKind::Let => emit_decl(arena, "let", node, out),
        NodeKind::Const => emit_decl(arena, "const", node, out),

        NodeKind::Name(sym) => out.push_str(arena.name_of(*sym)),
        NodeKind::Number(v) => {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                out.push_str(&format!("{}", *v as i64));
            } else {
                out.push_str(&format!("{}", v));
            }
        }
        NodeKind::Str(sym) => {
            out.push('"');
            out.push_str(arena.name_of(*sym));
            out.push('"');
        }
        NodeKind::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        NodeKind::Null => out.push_str("null"),
        NodeKind::This => out.push_str("this"),

        NodeKind::Function => {
            let name = arena.child(node, 0);
            let params = arena.child(node, 1);
            let body = arena.child(node, 2);
            out.push_str("function");
            if let Some(sym) = arena.name_sym(name) {
                let s = arena.name_of(sym);
                if !s.is_empty() {
                    out.push(' ');
                    out.push_str(s);
                }
            }
            out.push('(');
            let mut first = true;
            for &p in arena.children(params) {
                if !first {
                    out.push(',');
                }
                first = false;
                emit(arena, p, out);
            }
            out.push(')');
            emit(arena, body, out);
        }
        NodeKind::ParamList => {}
        NodeKind::Call | NodeKind::New => {
            if matches!(arena.kind(node), NodeKind::New) {
                out.push_str("new ");
            }
            let children = arena.children(node);
            emit(arena, children[0], out);
            out.push('(');
            let mut first = true;
            for &a in &children[1..] {
                if !first {
                    out.push(',');
                }
                first = false;
                emit(arena, a, out);
            }
            out.push(')');
        }
        NodeKind::Assign(op) => {
            emit(arena, arena.child(node, 0), out);
            out.push_str(assignop_text(*op));
            emit(arena, arena.child(node, 1), out);
        }
        NodeKind::Binary(op) => {
            out.push('(');
            emit(arena, arena.child(node, 0), out);
            out.push_str(binop_text(*op));
            emit(arena, arena.child(node, 1), out);
            out.push(')');
        }
        NodeKind::Unary(op) => {
            let text = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "!",
                UnaryOp::BitNot => "~",
                UnaryOp::TypeOf => "typeof ",
                UnaryOp::Void => "void ",
                UnaryOp::Delete => "delete ",
            };
            out.push_str(text);
            emit(arena, arena.child(node, 0), out);
        }
        NodeKind::Update { prefix, inc } => {
            let op = if *inc { "++" } else { "--" };
            if *prefix {
                out.push_str(op);
                emit(arena, arena.child(node, 0), out);
            } else {
                emit(arena, arena.child(node, 0), out);
                out.push_str(op);
            }
        }
        NodeKind::And => {
            out.push('(');
            emit(arena, arena.child(node, 0), out);
            out.push_str("&&");
            emit(arena, arena.child(node, 1), out);
            out.push(')');
        }
        NodeKind::Or => {
            out.push('(');
            emit(arena, arena.child(node, 0), out);
            out.push_str("||");
            emit(arena, arena.child(node, 1), out);
            out.push(')');
        }
        NodeKind::Hook => {
            emit(arena, arena.child(node, 0), out);
            out.push('?');
            emit(arena, arena.child(node, 1), out);
            out.push(':');
            emit(arena, arena.child(node, 2), out);
        }
        NodeKind::Comma => {
            emit(arena, arena.child(node, 0), out);
            out.push(',');
            emit(arena, arena.child(node, 1), out);
        }
        NodeKind::GetProp(sym) => {
            emit(arena, arena.child(node, 0), out);
            out.push('.');
            out.push_str(arena.name_of(*sym));
        }
        NodeKind::GetElem => {
            emit(arena, arena.child(node, 0), out);
            out.push('[');
            emit(arena, arena.child(node, 1), out);
            out.push(']');
        }
        NodeKind::ObjectLit => {
            out.push('{');
            let mut first = true;
            for &sk in arena.children(node) {
                if !first {
                    out.push(',');
                }
                first = false;
                emit(arena, sk, out);
            }
            out.push('}');
        }
        NodeKind::StringKey(sym) => {
            out.push_str(arena.name_of(*sym));
            if let Some(value) = arena.first_child(node) {
                out.push(':');
                emit(arena, value, out);
            }
        }
        NodeKind::ArrayLit => {
            out.push('[');
            let mut first = true;
            for &e in arena.children(node) {
                if !first {
                    out.push(',');
                }
                first = false;
                emit(arena, e, out);
            }
            out.push(']');
        }
        NodeKind::ObjectPattern => {
            out.push('{');
            let mut first = true;
            for &sk in arena.children(node) {
                if !first {
                    out.push(',');
                }
                first = false;
                emit(arena, sk, out);
            }
            out.push('}');
        }
        NodeKind::DestructuringLhs => {
            emit(arena, arena.child(node, 0), out);
            out.push('=');
            emit(arena, arena.child(node, 1), out);
        }
        NodeKind::Cast => emit(arena, arena.child(node, 0), out),

        NodeKind::If => {
            out.push_str("if(");
            emit(arena, arena.child(node, 0), out);
            out.push(')');
            emit(arena, arena.child(node, 1), out);
            if arena.child_count(node) > 2 {
                out.push_str("else ");
                emit(arena, arena.child(node, 2), out);
            }
        }
        NodeKind::While => {
            out.push_str("while(");
            emit(arena, arena.child(node, 0), out);
            out.push(')');
            emit(arena, arena.child(node, 1), out);
        }
        NodeKind::DoWhile => {
            out.push_str("do");
            emit(arena, arena.child(node, 0), out);
            out.push_str("while(");
            emit(arena, arena.child(node, 1), out);
            out.push_str(");");
        }
        NodeKind::For => {
            out.push_str("for(");
            emit(arena, arena.child(node, 0), out);
            out.push(';');
            emit(arena, arena.child(node, 1), out);
            out.push(';');
            emit(arena, arena.child(node, 2), out);
            out.push(')');
            emit(arena, arena.child(node, 3), out);
        }
        NodeKind::ForIn => {
            out.push_str("for(");
            emit(arena, arena.child(node, 0), out);
            out.push_str(" in ");
            emit(arena, arena.child(node, 1), out);
            out.push(')');
            emit(arena, arena.child(node, 2), out);
        }
        NodeKind::ForOf => {
            out.push_str("for(");
            emit(arena, arena.child(node, 0), out);
            out.push_str(" of ");
            emit(arena, arena.child(node, 1), out);
            out.push(')');
            emit(arena, arena.child(node, 2), out);
        }
        NodeKind::Switch => {
            out.push_str("switch(");
            emit(arena, arena.child(node, 0), out);
            out.push_str("){");
            for &c in &arena.children(node)[1..] {
                emit(arena, c, out);
            }
            out.push('}');
        }
        NodeKind::Case => {
            out.push_str("case ");
            emit(arena, arena.child(node, 0), out);
            out.push(':');
            emit(arena, arena.child(node, 1), out);
        }
        NodeKind::DefaultCase => {
            out.push_str("default:");
            emit(arena, arena.child(node, 0), out);
        }
        NodeKind::Try => {
            out.push_str("try");
            emit(arena, arena.child(node, 0), out);
            let catch = arena.child(node, 1);
            if !matches!(arena.kind(catch), NodeKind::Empty) {
                emit(arena, catch, out);
            }
            if arena.child_count(node) > 2 {
                out.push_str("finally");
                emit(arena, arena.child(node, 2), out);
            }
        }
        NodeKind::Catch => {
            out.push_str("catch(");
            emit(arena, arena.child(node, 0), out);
            out.push(')');
            emit(arena, arena.child(node, 1), out);
        }
        NodeKind::Throw => {
            out.push_str("throw ");
            emit(arena, arena.child(node, 0), out);
            out.push(';');
        }
        NodeKind::Return => {
            out.push_str("return");
            if let Some(e) = arena.first_child(node) {
                out.push(' ');
                emit(arena, e, out);
            }
            out.push(';');
        }
        NodeKind::Break { label } => {
            out.push_str("break");
            if let Some(l) = label {
                out.push(' ');
                out.push_str(arena.name_of(*l));
            }
            out.push(';');
        }
        NodeKind::Continue { label } => {
            out.push_str("continue");
            if let Some(l) = label {
                out.push(' ');
                out.push_str(arena.name_of(*l));
            }
            out.push(';');
        }
        NodeKind::Label(sym) => {
            out.push_str(arena.name_of(*sym));
            out.push(':');
            emit(arena, arena.child(node, 0), out);
        }
        NodeKind::ExprResult => {
            emit(arena, arena.child(node, 0), out);
            out.push(';');
        }
        NodeKind::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;

    #[test]
    fn prints_function_with_return() {
        let mut arena = AstArena::new();
        let one = build::number(&mut arena, 1.0);
        let x = build::var_decl(&mut arena, "x", Some(one));
        let xr = build::name(&mut arena, "x");
        let five = build::number(&mut arena, 5.0);
        let sum = build::add(&mut arena, xr, five);
        let ret = build::return_stmt(&mut arena, Some(sum));
        let f = build::function(&mut arena, "f", &[], vec![x, ret]);
        let script = build::script(&mut arena, vec![f]);

        assert_eq!(
            to_source(&arena, script),
            "function f(){var x=1;return (x+5);}"
        );
    }

    #[test]
    fn prints_destructuring_decl() {
        let mut arena = AstArena::new();
        let rhs = build::call_name(&mut arena, "foo", vec![]);
        let d = build::destructuring_var(&mut arena, &[("x", "y")], rhs);
        assert_eq!(to_source(&arena, d), "var {x:y}=foo();");
    }
}
