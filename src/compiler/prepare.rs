//! Shapes the parsed program into the order it will be emitted in.
//!
//! Address 0 runs the top-level statements, then hands over to `main` when
//! there is a parameterless one. Function bodies always end in a return so
//! control never falls into the next function.

use crate::ast::{Ast, NodeId, NodeKind, Span};

pub fn run(ast: &mut Ast, root: NodeId) {
    let items = ast.child_list(root);
    let (defs, stmts): (Vec<NodeId>, Vec<NodeId>) = items
        .into_iter()
        .partition(|&c| matches!(ast[c].kind, NodeKind::FuncDef | NodeKind::StructDef | NodeKind::SyscallDef));

    let funcs: Vec<NodeId> = defs.iter().copied().filter(|&c| ast[c].kind == NodeKind::FuncDef).collect();
    for f in funcs {
        ensure_trailing_return(ast, f);
    }

    let has_main = defs.iter().any(|&c| {
        ast[c].kind == NodeKind::FuncDef
            && ast[c].name() == "main"
            && ast.children(c).iter().all(|&a| ast[a].kind != NodeKind::FuncDefArg)
    });
    let value = if has_main {
        ast.add_named(NodeKind::FuncCall, "main", Span::UNKNOWN)
    } else {
        ast.add_number(0, Span::UNKNOWN)
    };
    let epilogue = ast.add_with(NodeKind::Return, Span::UNKNOWN, vec![value]);

    let mut order = stmts;
    order.push(epilogue);
    order.extend(defs);
    ast[root].children = order;
}

fn ensure_trailing_return(ast: &mut Ast, f: NodeId) {
    let Some(&body) = ast.children(f).last() else { return };
    let ends_in_return = ast.children(body).last().is_some_and(|&s| ast[s].kind == NodeKind::Return);
    if !ends_in_return {
        let zero = ast.add_number(0, Span::UNKNOWN);
        let ret = ast.add_with(NodeKind::Return, Span::UNKNOWN, vec![zero]);
        ast.push_child(body, ret);
    }
}
