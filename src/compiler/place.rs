//! Storage placement.
//!
//! Globals sit at the bottom of the VM stack and are laid out inline, one
//! after another. Parameters live below the frame base, the last one
//! nearest. Every local takes exactly one frame slot: scalars hold their
//! value, composites hold the tagged address of a block allocated when the
//! declaration runs. Sibling scopes reuse the same slots; nested scopes
//! start above their parent's.

use crate::ast::{Ast, NodeId, NodeKind, Span};

use super::CompileError;

/// Cells between the frame base and the last parameter: saved ap, saved bp
/// and the return address.
const FRAME_LINKAGE: i32 = 3;

/// Place every declaration; returns the size of the global area.
pub fn run(ast: &mut Ast, root: NodeId) -> Result<usize, CompileError> {
    let mut next = 0i64;
    for item in ast.child_list(root) {
        match ast[item].kind {
            NodeKind::FuncDef => function(ast, item),
            NodeKind::StructDef | NodeKind::SyscallDef => {}
            _ => globals(ast, item, &mut next),
        }
    }
    if next > i64::from(u16::MAX) {
        return Err(CompileError::new(
            "GL-E001",
            Span::UNKNOWN,
            format!("program too large: {next} global cells"),
        ));
    }
    Ok(next as usize)
}

/// Every declaration outside a function is global, nested blocks included.
fn globals(ast: &mut Ast, id: NodeId, next: &mut i64) {
    if ast[id].kind == NodeKind::Declare {
        let node = &mut ast[id];
        node.global = true;
        node.valpos = *next as i32;
        *next += i64::from(node.size.max(1));
        return;
    }
    for c in ast.child_list(id) {
        globals(ast, c, next);
    }
}

fn function(ast: &mut Ast, f: NodeId) {
    let params: Vec<NodeId> = ast
        .children(f)
        .iter()
        .copied()
        .filter(|&c| ast[c].kind == NodeKind::FuncDefArg)
        .collect();
    let n = params.len() as i32;
    for (i, p) in params.into_iter().enumerate() {
        ast[p].valpos = -(FRAME_LINKAGE + 1) - (n - 1 - i as i32);
    }

    let locals = match ast.children(f).last() {
        Some(&body) => scope(ast, body, 0),
        None => 0,
    };
    let marker = ast.add(NodeKind::LocalSize, Span::UNKNOWN);
    ast[marker].size = locals;
    ast[marker].parent = Some(f);
    ast[f].children.insert(0, marker);
}

/// Place the declarations made directly in `id`, then any nested scopes
/// above them. Returns the high-water slot.
fn scope(ast: &mut Ast, id: NodeId, base: i32) -> i32 {
    let mut next = base;
    for d in direct_declarations(ast, id) {
        ast[d].valpos = next;
        next += 1;
    }
    let mut high = next;
    for c in ast.child_list(id) {
        high = high.max(nested(ast, c, next));
    }
    high
}

fn nested(ast: &mut Ast, id: NodeId, base: i32) -> i32 {
    match ast[id].kind {
        NodeKind::Block | NodeKind::For => scope(ast, id, base),
        NodeKind::If | NodeKind::While => {
            let mut high = base;
            for c in ast.child_list(id) {
                high = high.max(nested(ast, c, base));
            }
            high
        }
        _ => base,
    }
}

/// Declarations belonging to the scope `id` opens. `Multi` does not open a
/// scope, so its declarations belong to the enclosing one; this is how a
/// `for` initializer lands in the loop's scope.
pub(crate) fn direct_declarations(ast: &Ast, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &c in ast.children(id) {
        match ast[c].kind {
            NodeKind::Declare => out.push(c),
            NodeKind::Multi => out.extend(direct_declarations(ast, c)),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::compile_ok;

    fn declaration(ast: &Ast, root: NodeId, name: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        ast.walk(root, &mut |id| {
            if matches!(ast[id].kind, NodeKind::Declare | NodeKind::FuncDefArg) && ast[id].name() == name {
                out.push(id);
            }
        });
        out
    }

    fn local_size(ast: &Ast, root: NodeId, f: &str) -> i32 {
        let f = ast
            .children(root)
            .iter()
            .copied()
            .find(|&c| ast[c].kind == NodeKind::FuncDef && ast[c].name() == f)
            .unwrap();
        let marker = ast.children(f).iter().copied().find(|&c| ast[c].kind == NodeKind::LocalSize).unwrap();
        ast[marker].size
    }

    #[test]
    fn globals_are_inline_and_sequential() {
        let c = compile_ok("var a; var b[3]; var c; fn main() { return 0; }");
        assert_eq!(c.globals_size, 5);
        let cv = declaration(&c.ast, c.root, "c")[0];
        assert!(c.ast[cv].global);
        assert_eq!(c.ast[cv].valpos, 4);
    }

    #[test]
    fn parameters_sit_below_the_frame() {
        let c = compile_ok("fn f(a, b, c) { return a; } fn main() { return f(1, 2, 3); }");
        let slots: Vec<i32> = ["a", "b", "c"].iter().map(|n| c.ast[declaration(&c.ast, c.root, n)[0]].valpos).collect();
        assert_eq!(slots, vec![-6, -5, -4]);
    }

    #[test]
    fn sibling_blocks_share_slots() {
        let c = compile_ok("fn main() { var x; { var a; var b; } { var c; } return x; }");
        let slot = |n| c.ast[declaration(&c.ast, c.root, n)[0]].valpos;
        assert_eq!(slot("x"), 0);
        assert_eq!(slot("a"), 1);
        assert_eq!(slot("b"), 2);
        assert_eq!(slot("c"), 1);
        assert_eq!(local_size(&c.ast, c.root, "main"), 3);
    }

    #[test]
    fn nested_blocks_do_not_share() {
        let c = compile_ok("fn main() { { var a; { var b; } } return 0; }");
        let slot = |n| c.ast[declaration(&c.ast, c.root, n)[0]].valpos;
        assert_ne!(slot("a"), slot("b"));
        assert_eq!(local_size(&c.ast, c.root, "main"), 2);
    }

    #[test]
    fn composite_locals_take_one_slot() {
        let c = compile_ok("fn main() { var a[10]; var b; return b; }");
        let slot = |n| c.ast[declaration(&c.ast, c.root, n)[0]].valpos;
        assert_eq!(slot("b"), 1);
        assert_eq!(local_size(&c.ast, c.root, "main"), 2);
    }

    #[test]
    fn for_initializer_belongs_to_the_loop() {
        let c = compile_ok("fn main() { var s; for (var i = 0; i < 3; i++) { var t; } return s; }");
        let slot = |n| c.ast[declaration(&c.ast, c.root, n)[0]].valpos;
        assert_eq!((slot("s"), slot("i"), slot("t")), (0, 1, 2));
    }
}
