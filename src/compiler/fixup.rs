//! Final pass: frame sizes, addresses and the byte image.

use crate::ast::{Ast, NodeId, NodeKind};
use crate::vm::image_header;
use crate::vm::opcode::Op;

use super::CompileError;

pub fn run(ast: &mut Ast, root: NodeId, globals: usize) -> Result<Vec<u8>, CompileError> {
    ast.fix_parents(root);
    frames(ast, root);
    let end = assign_addresses(ast, root);
    resolve_references(ast, root);
    strip_labels(ast, root);
    log::trace!("code ends at {end}");
    encode(ast, root, globals)
}

/// `ENTER` gets the frame's local count and `RETURN` the number of
/// arguments to drop. Top-level code has neither.
fn frames(ast: &mut Ast, root: NodeId) {
    for f in ast.child_list(root) {
        if ast[f].kind != NodeKind::FuncDef {
            continue;
        }
        let locals = ast
            .children(f)
            .iter()
            .find(|&&c| ast[c].kind == NodeKind::LocalSize)
            .map_or(0, |&c| ast[c].size);
        let params = ast[f].number;
        for insn in ast.instructions(f) {
            match ast[insn].insn() {
                Some(Op::Enter) if locals == 0 => ast[insn].kind = NodeKind::Insn(Op::Nop),
                Some(Op::Enter) => ast[insn].arg = locals,
                Some(Op::Return) => ast[insn].arg = params,
                _ => {}
            }
        }
    }
}

fn assign_addresses(ast: &mut Ast, root: NodeId) -> usize {
    let mut order = Vec::new();
    ast.walk(root, &mut |id| order.push(id));
    let mut pc = 0usize;
    for id in order {
        match ast[id].kind {
            NodeKind::FuncDef => ast[id].valpos = pc as i32,
            NodeKind::Insn(op) => {
                ast[id].valpos = pc as i32;
                pc += op.encoded_len();
            }
            _ => {}
        }
    }
    pc
}

fn resolve_references(ast: &mut Ast, root: NodeId) {
    for insn in ast.instructions(root) {
        if let Some(target) = ast[insn].value {
            ast[insn].arg = ast[target].valpos;
        }
    }
}

/// Labels have served their purpose once jumps hold addresses.
fn strip_labels(ast: &mut Ast, root: NodeId) {
    let mut order = Vec::new();
    ast.walk(root, &mut |id| order.push(id));
    for id in order {
        let keep: Vec<NodeId> = ast
            .children(id)
            .iter()
            .copied()
            .filter(|&c| ast[c].insn() != Some(Op::Nop))
            .collect();
        ast[id].children = keep;
    }
}

fn encode(ast: &Ast, root: NodeId, globals: usize) -> Result<Vec<u8>, CompileError> {
    let mut out = image_header(globals as u32);
    for insn in ast.instructions(root) {
        let n = &ast[insn];
        let Some(op) = n.insn() else { continue };
        let class = op.arg_class();
        if !class.fits(n.arg) {
            return Err(CompileError::new(
                "GL-E001",
                n.span,
                format!("program too large: operand {} of {} is out of range", n.arg, op.mnemonic()),
            ));
        }
        out.push(op.byte());
        out.extend_from_slice(&n.arg.to_le_bytes()[..class.width()]);
    }
    Ok(out)
}
