//! Node constructors.
//!
//! The interface through which collaborators (the parser, transforms, and
//! tests) assemble trees. Every constructor returns a detached node; the
//! caller attaches it where it belongs.

use crate::intern::Symbol;
use crate::kind::{AssignOp, BinaryOp, NodeKind, UnaryOp};
use crate::node::{AstArena, NodeId};

pub fn root(arena: &mut AstArena, scripts: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::Root);
    for s in scripts {
        arena.append_child(n, s);
    }
    n
}

pub fn script(arena: &mut AstArena, stmts: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::Script);
    for s in stmts {
        arena.append_child(n, s);
    }
    n
}

pub fn block(arena: &mut AstArena, stmts: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::Block);
    for s in stmts {
        arena.append_child(n, s);
    }
    n
}

pub fn empty(arena: &mut AstArena) -> NodeId {
    arena.new_node(NodeKind::Empty)
}

// ----------------------------------------------------------------------
// Names and literals
// ----------------------------------------------------------------------

pub fn name(arena: &mut AstArena, s: &str) -> NodeId {
    let sym = arena.intern(s);
    arena.new_node(NodeKind::Name(sym))
}

pub fn name_sym(arena: &mut AstArena, sym: Symbol) -> NodeId {
    arena.new_node(NodeKind::Name(sym))
}

pub fn number(arena: &mut AstArena, value: f64) -> NodeId {
    arena.new_node(NodeKind::Number(value))
}

pub fn string(arena: &mut AstArena, value: &str) -> NodeId {
    let sym = arena.intern(value);
    arena.new_node(NodeKind::Str(sym))
}

pub fn boolean(arena: &mut AstArena, value: bool) -> NodeId {
    arena.new_node(NodeKind::Bool(value))
}

pub fn null(arena: &mut AstArena) -> NodeId {
    arena.new_node(NodeKind::Null)
}

pub fn this(arena: &mut AstArena) -> NodeId {
    arena.new_node(NodeKind::This)
}

// ----------------------------------------------------------------------
// Declarations
// ----------------------------------------------------------------------

fn decl(arena: &mut AstArena, kind: NodeKind, n: &str, init: Option<NodeId>) -> NodeId {
    let d = arena.new_node(kind);
    let nm = name(arena, n);
    if let Some(init) = init {
        arena.append_child(nm, init);
    }
    arena.append_child(d, nm);
    d
}

/// `var n = init;`
pub fn var_decl(arena: &mut AstArena, n: &str, init: Option<NodeId>) -> NodeId {
    decl(arena, NodeKind::Var, n, init)
}

/// `var a, b, c;`
pub fn var_decl_multi(arena: &mut AstArena, names: &[&str]) -> NodeId {
    let d = arena.new_node(NodeKind::Var);
    for n in names {
        let nm = name(arena, n);
        arena.append_child(d, nm);
    }
    d
}

pub fn let_decl(arena: &mut AstArena, n: &str, init: Option<NodeId>) -> NodeId {
    decl(arena, NodeKind::Let, n, init)
}

pub fn const_decl(arena: &mut AstArena, n: &str, init: NodeId) -> NodeId {
    decl(arena, NodeKind::Const, n, Some(init))
}

/// `var {key: target} = rhs;` — an object-pattern declaration.
pub fn destructuring_var(arena: &mut AstArena, entries: &[(&str, &str)], rhs: NodeId) -> NodeId {
    let pattern = arena.new_node(NodeKind::ObjectPattern);
    for (key, target) in entries {
        let sym = arena.intern(key);
        let sk = arena.new_node(NodeKind::StringKey(sym));
        let tgt = name(arena, target);
        arena.append_child(sk, tgt);
        arena.append_child(pattern, sk);
    }
    let lhs = arena.new_node(NodeKind::DestructuringLhs);
    arena.append_child(lhs, pattern);
    arena.append_child(lhs, rhs);
    let d = arena.new_node(NodeKind::Var);
    arena.append_child(d, lhs);
    d
}

/// `function name(params) { body }`
pub fn function(arena: &mut AstArena, fn_name: &str, params: &[&str], body: Vec<NodeId>) -> NodeId {
    let f = arena.new_node(NodeKind::Function);
    let nm = name(arena, fn_name);
    arena.append_child(f, nm);
    let plist = arena.new_node(NodeKind::ParamList);
    for p in params {
        let pn = name(arena, p);
        arena.append_child(plist, pn);
    }
    arena.append_child(f, plist);
    let b = block(arena, body);
    arena.append_child(f, b);
    f
}

// ----------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------

pub fn assign(arena: &mut AstArena, target: NodeId, value: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Assign(AssignOp::Assign));
    arena.append_child(n, target);
    arena.append_child(n, value);
    n
}

pub fn assign_op(arena: &mut AstArena, op: AssignOp, target: NodeId, value: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Assign(op));
    arena.append_child(n, target);
    arena.append_child(n, value);
    n
}

pub fn binary(arena: &mut AstArena, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Binary(op));
    arena.append_child(n, lhs);
    arena.append_child(n, rhs);
    n
}

pub fn add(arena: &mut AstArena, lhs: NodeId, rhs: NodeId) -> NodeId {
    binary(arena, BinaryOp::Add, lhs, rhs)
}

pub fn and(arena: &mut AstArena, lhs: NodeId, rhs: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::And);
    arena.append_child(n, lhs);
    arena.append_child(n, rhs);
    n
}

pub fn or(arena: &mut AstArena, lhs: NodeId, rhs: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Or);
    arena.append_child(n, lhs);
    arena.append_child(n, rhs);
    n
}

pub fn unary(arena: &mut AstArena, op: UnaryOp, operand: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Unary(op));
    arena.append_child(n, operand);
    n
}

pub fn not(arena: &mut AstArena, operand: NodeId) -> NodeId {
    unary(arena, UnaryOp::Not, operand)
}

pub fn typeof_(arena: &mut AstArena, operand: NodeId) -> NodeId {
    unary(arena, UnaryOp::TypeOf, operand)
}

pub fn update(arena: &mut AstArena, operand: NodeId, prefix: bool, inc: bool) -> NodeId {
    let n = arena.new_node(NodeKind::Update { prefix, inc });
    arena.append_child(n, operand);
    n
}

pub fn hook(arena: &mut AstArena, cond: NodeId, then: NodeId, other: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Hook);
    arena.append_child(n, cond);
    arena.append_child(n, then);
    arena.append_child(n, other);
    n
}

pub fn comma(arena: &mut AstArena, lhs: NodeId, rhs: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Comma);
    arena.append_child(n, lhs);
    arena.append_child(n, rhs);
    n
}

pub fn call(arena: &mut AstArena, callee: NodeId, args: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::Call);
    arena.append_child(n, callee);
    for a in args {
        arena.append_child(n, a);
    }
    n
}

/// `f(args)` with a plain name callee.
pub fn call_name(arena: &mut AstArena, f: &str, args: Vec<NodeId>) -> NodeId {
    let callee = name(arena, f);
    call(arena, callee, args)
}

pub fn new_expr(arena: &mut AstArena, ctor: NodeId, args: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::New);
    arena.append_child(n, ctor);
    for a in args {
        arena.append_child(n, a);
    }
    n
}

pub fn getprop(arena: &mut AstArena, obj: NodeId, prop: &str) -> NodeId {
    let sym = arena.intern(prop);
    let n = arena.new_node(NodeKind::GetProp(sym));
    arena.append_child(n, obj);
    n
}

pub fn getelem(arena: &mut AstArena, obj: NodeId, key: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::GetElem);
    arena.append_child(n, obj);
    arena.append_child(n, key);
    n
}

pub fn object_lit(arena: &mut AstArena, entries: Vec<(&str, NodeId)>) -> NodeId {
    let n = arena.new_node(NodeKind::ObjectLit);
    for (key, value) in entries {
        let sym = arena.intern(key);
        let sk = arena.new_node(NodeKind::StringKey(sym));
        arena.append_child(sk, value);
        arena.append_child(n, sk);
    }
    n
}

pub fn array_lit(arena: &mut AstArena, elements: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::ArrayLit);
    for e in elements {
        arena.append_child(n, e);
    }
    n
}

pub fn cast(arena: &mut AstArena, expr: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Cast);
    arena.append_child(n, expr);
    n
}

// ----------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------

pub fn expr_result(arena: &mut AstArena, expr: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::ExprResult);
    arena.append_child(n, expr);
    n
}

pub fn if_stmt(arena: &mut AstArena, cond: NodeId, then: NodeId, other: Option<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::If);
    arena.append_child(n, cond);
    arena.append_child(n, then);
    if let Some(e) = other {
        arena.append_child(n, e);
    }
    n
}

pub fn while_stmt(arena: &mut AstArena, cond: NodeId, body: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::While);
    arena.append_child(n, cond);
    arena.append_child(n, body);
    n
}

pub fn do_while(arena: &mut AstArena, body: NodeId, cond: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::DoWhile);
    arena.append_child(n, body);
    arena.append_child(n, cond);
    n
}

pub fn for_stmt(
    arena: &mut AstArena,
    init: Option<NodeId>,
    cond: Option<NodeId>,
    incr: Option<NodeId>,
    body: NodeId,
) -> NodeId {
    let n = arena.new_node(NodeKind::For);
    let init = init.unwrap_or_else(|| empty(arena));
    let cond = cond.unwrap_or_else(|| empty(arena));
    let incr = incr.unwrap_or_else(|| empty(arena));
    arena.append_child(n, init);
    arena.append_child(n, cond);
    arena.append_child(n, incr);
    arena.append_child(n, body);
    n
}

pub fn for_in(arena: &mut AstArena, target: NodeId, object: NodeId, body: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::ForIn);
    arena.append_child(n, target);
    arena.append_child(n, object);
    arena.append_child(n, body);
    n
}

pub fn for_of(arena: &mut AstArena, target: NodeId, iterable: NodeId, body: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::ForOf);
    arena.append_child(n, target);
    arena.append_child(n, iterable);
    arena.append_child(n, body);
    n
}

pub fn switch_stmt(arena: &mut AstArena, subject: NodeId, cases: Vec<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::Switch);
    arena.append_child(n, subject);
    for c in cases {
        arena.append_child(n, c);
    }
    n
}

pub fn case(arena: &mut AstArena, test: NodeId, body: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Case);
    arena.append_child(n, test);
    arena.append_child(n, body);
    n
}

pub fn default_case(arena: &mut AstArena, body: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::DefaultCase);
    arena.append_child(n, body);
    n
}

pub fn try_stmt(
    arena: &mut AstArena,
    body: NodeId,
    catch: Option<NodeId>,
    finally: Option<NodeId>,
) -> NodeId {
    let n = arena.new_node(NodeKind::Try);
    arena.append_child(n, body);
    let catch = catch.unwrap_or_else(|| empty(arena));
    arena.append_child(n, catch);
    if let Some(f) = finally {
        arena.append_child(n, f);
    }
    n
}

pub fn catch_clause(arena: &mut AstArena, param: &str, body: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Catch);
    let p = name(arena, param);
    arena.append_child(n, p);
    arena.append_child(n, body);
    n
}

pub fn throw_stmt(arena: &mut AstArena, expr: NodeId) -> NodeId {
    let n = arena.new_node(NodeKind::Throw);
    arena.append_child(n, expr);
    n
}

pub fn return_stmt(arena: &mut AstArena, expr: Option<NodeId>) -> NodeId {
    let n = arena.new_node(NodeKind::Return);
    if let Some(e) = expr {
        arena.append_child(n, e);
    }
    n
}

pub fn break_stmt(arena: &mut AstArena, label: Option<&str>) -> NodeId {
    let label = label.map(|l| arena.intern(l));
    arena.new_node(NodeKind::Break { label })
}

pub fn continue_stmt(arena: &mut AstArena, label: Option<&str>) -> NodeId {
    let label = label.map(|l| arena.intern(l));
    arena.new_node(NodeKind::Continue { label })
}

pub fn label(arena: &mut AstArena, l: &str, stmt: NodeId) -> NodeId {
    let sym = arena.intern(l);
    let n = arena.new_node(NodeKind::Label(sym));
    arena.append_child(n, stmt);
    n
}
