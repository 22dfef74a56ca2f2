//! Instruction selection.
//!
//! Splices `Insn` nodes into the tree so that a pre-order walk yields the
//! program. Operands are generated first, then the node's own instructions
//! are placed around them. Jump targets are `Nop` label nodes referenced
//! through `value`; the fixup pass turns references into addresses.

use crate::ast::{Ast, NodeId, NodeKind, Returns, Span};
use crate::vm::fixed;
use crate::vm::opcode::{self, Op};

use super::CompileError;
use super::layout::type_of;
use super::place::direct_declarations;

type Result<T> = std::result::Result<T, CompileError>;

pub fn run(ast: &mut Ast, root: NodeId) -> Result<()> {
    let mut g = Codegen { ast };
    for item in g.ast.child_list(root) {
        g.node(item)?;
    }
    Ok(())
}

struct Codegen<'a> {
    ast: &'a mut Ast,
}

fn internal(span: Span, what: &str) -> CompileError {
    CompileError::new("GL-E002", span, format!("internal compiler error: {what}"))
}

impl Codegen<'_> {
    fn emit_ref(&mut self, owner: NodeId, op: Op, target: NodeId) -> NodeId {
        let insn = self.ast.emit_end(owner, op, 0);
        self.ast[insn].value = Some(target);
        insn
    }

    /// Push a constant, using the short form when it is a small integer.
    fn push_const(&mut self, owner: NodeId, value: i32, front: bool) {
        let short = value & fixed::FRAC_MASK == 0 && i16::try_from(fixed::to_int(value)).is_ok();
        let (op, arg) = if short { (Op::PushI, fixed::to_int(value)) } else { (Op::PushR, value) };
        if front {
            self.ast.emit_front(owner, op, arg);
        } else {
            self.ast.emit_end(owner, op, arg);
        }
    }

    fn node(&mut self, id: NodeId) -> Result<()> {
        let kind = self.ast[id].kind;
        match kind {
            NodeKind::Number => {
                let v = self.ast[id].number;
                self.push_const(id, v, false);
            }
            k if k.is_binary() || k.is_unary() => {
                for c in self.ast.operands(id) {
                    self.node(c)?;
                }
                let op = k.operator().ok_or_else(|| internal(self.ast[id].span, "operator"))?;
                self.ast.emit_end(id, op, 0);
            }
            NodeKind::Deref | NodeKind::Ref => self.chain(id)?,
            NodeKind::FuncPtr => {
                let f = self.ast[id].value.ok_or_else(|| internal(self.ast[id].span, "function pointer"))?;
                self.emit_ref(id, Op::PushR, f);
            }
            NodeKind::FuncCall => {
                for a in self.ast.operands(id) {
                    self.node(a)?;
                }
                let f = self.ast[id].value.ok_or_else(|| internal(self.ast[id].span, "unresolved call"))?;
                self.emit_ref(id, Op::Call, f);
            }
            NodeKind::Syscall => {
                let args = self.ast.operands(id);
                for &a in &args {
                    self.node(a)?;
                }
                let operand = opcode::syscall_operand(args.len(), self.ast[id].number as usize);
                self.ast.emit_end(id, Op::Syscall, operand);
            }
            NodeKind::PreAdd | NodeKind::PostAdd => {
                for c in self.ast.operands(id) {
                    self.node(c)?;
                }
                let op = if kind == NodeKind::PreAdd { Op::PreAdd } else { Op::PostAdd };
                let delta = self.ast[id].number;
                self.ast.emit_end(id, op, delta);
            }
            NodeKind::Assign => self.assign(id)?,
            NodeKind::Drop => {
                for c in self.ast.operands(id) {
                    self.node(c)?;
                }
                self.ast.emit_end(id, Op::Pop, 0);
            }
            NodeKind::Return => {
                for c in self.ast.operands(id) {
                    self.node(c)?;
                }
                // argument count is filled in once frames are known
                self.ast.emit_end(id, Op::Return, 0);
            }
            NodeKind::If => self.if_stmt(id)?,
            NodeKind::While => self.while_stmt(id)?,
            NodeKind::For => self.for_stmt(id)?,
            NodeKind::Block => {
                for c in self.ast.operands(id) {
                    self.node(c)?;
                }
                self.scope_bracket(id);
            }
            NodeKind::Multi | NodeKind::ProgramStart => {
                for c in self.ast.operands(id) {
                    self.node(c)?;
                }
            }
            NodeKind::Declare => {
                let d = &self.ast[id];
                if !d.global && d.returns.is_composite() {
                    let size = d.size;
                    self.emit_ref(id, Op::Lea, id);
                    self.ast.emit_end(id, Op::Alloc, size);
                }
            }
            NodeKind::FuncDef => self.function(id)?,
            NodeKind::StructDef
            | NodeKind::SyscallDef
            | NodeKind::LocalSize
            | NodeKind::FuncDefArg
            | NodeKind::Insn(_) => {}
            NodeKind::Var | NodeKind::ArrayRef | NodeKind::StructMember | NodeKind::DataType => {
                return Err(internal(self.ast[id].span, &format!("{kind:?} outside an access chain")));
            }
            // operators are all handled by the `is_binary() || is_unary()` arm above
            k => unreachable!("{k:?} is an operator"),
        }
        Ok(())
    }

    fn function(&mut self, f: NodeId) -> Result<()> {
        // frame size is filled in by fixup
        self.ast.emit_front(f, Op::Enter, 0);
        let body = *self
            .ast
            .operands(f)
            .last()
            .ok_or_else(|| internal(self.ast[f].span, "function without body"))?;
        // the body's locals are part of the frame, not a nested scope
        for s in self.ast.operands(body) {
            self.node(s)?;
        }
        Ok(())
    }

    /// Blocks that allocate composites release them on the way out.
    fn scope_bracket(&mut self, id: NodeId) {
        let allocates = direct_declarations(self.ast, id).into_iter().any(|d| {
            let d = &self.ast[d];
            !d.global && d.returns.is_composite()
        });
        if allocates {
            self.ast.emit_front(id, Op::ScopeEnter, 0);
            self.ast.emit_end(id, Op::ScopeLeave, 0);
        }
    }

    // ---- Access chains ----

    fn chain(&mut self, wrapper: NodeId) -> Result<()> {
        let span = self.ast[wrapper].span;
        let var = self.ast.operand(wrapper, 0).ok_or_else(|| internal(span, "empty access chain"))?;
        let decl = self.ast[var].value.ok_or_else(|| internal(span, "unresolved variable"))?;
        let by_value = self.ast[wrapper].kind == NodeKind::Deref;
        let has_accessors = !self.ast.operands(var).is_empty();
        let (global, scalar) = (self.ast[decl].global, self.ast[decl].returns == Returns::Pod);

        if scalar && !has_accessors {
            let op = match (by_value, global) {
                (true, true) => Op::LdG,
                (true, false) => Op::LdL,
                (false, true) => Op::LeaG,
                (false, false) => Op::Lea,
            };
            let insn = self.ast.emit_front(var, op, 0);
            self.ast[insn].value = Some(decl);
            return Ok(());
        }

        // base address of the composite
        if global {
            let addr = fixed::make_addr(self.ast[decl].valpos as usize, self.ast[decl].size as usize);
            self.ast.emit_front(var, Op::PushR, addr);
        } else {
            let insn = self.ast.emit_front(var, Op::LdL, 0);
            self.ast[insn].value = Some(decl);
        }

        let mut cur = var;
        while let Some(acc) = self.next_accessor(cur) {
            if self.ast[acc].kind == NodeKind::ArrayRef {
                let idx = self.ast.operand(acc, 0).ok_or_else(|| internal(span, "index"))?;
                self.node(idx)?;
                let size = self.ast[acc].size;
                self.ast.emit_after(acc, 0, Op::ArrayIdx, size);
            } else {
                let (offset, size) = (self.ast[acc].number, self.ast[acc].size);
                self.ast.emit_front(acc, Op::StructIdx, size);
                self.push_const(acc, fixed::from_int(offset), true);
            }
            cur = acc;
        }

        if by_value && self.ast[wrapper].returns == Returns::Pod {
            self.ast.emit_end(wrapper, Op::Deref, 0);
        }
        Ok(())
    }

    fn next_accessor(&self, node: NodeId) -> Option<NodeId> {
        let skip = usize::from(self.ast[node].kind == NodeKind::ArrayRef);
        self.ast
            .operand(node, skip)
            .filter(|&c| matches!(self.ast[c].kind, NodeKind::ArrayRef | NodeKind::StructMember))
    }

    fn assign(&mut self, id: NodeId) -> Result<()> {
        let span = self.ast[id].span;
        let target = self.ast.operand(id, 0).ok_or_else(|| internal(span, "assignment target"))?;
        let value = self.ast.operand(id, 1).ok_or_else(|| internal(span, "assignment value"))?;
        let var = self.ast.operand(target, 0).ok_or_else(|| internal(span, "empty access chain"))?;
        let decl = self.ast[var].value.ok_or_else(|| internal(span, "unresolved variable"))?;

        let direct = self.ast.operands(var).is_empty() && type_of(self.ast, decl).is_none();
        if direct {
            self.node(value)?;
            let op = if self.ast[decl].global { Op::StG } else { Op::StL };
            self.emit_ref(id, op, decl);
        } else {
            self.node(target)?;
            self.node(value)?;
            self.ast.emit_end(id, Op::WrVar, 0);
        }
        Ok(())
    }

    // ---- Control flow ----

    fn label(&mut self, owner: NodeId, at: Option<usize>) -> NodeId {
        match at {
            Some(k) => self.ast.emit_before(owner, k, Op::Nop, 0),
            None => self.ast.emit_end(owner, Op::Nop, 0),
        }
    }

    fn if_stmt(&mut self, id: NodeId) -> Result<()> {
        let ops = self.ast.operands(id);
        for &c in &ops {
            self.node(c)?;
        }
        let jz = self.ast.emit_after(id, 0, Op::Jz, 0);
        if ops.len() > 2 {
            let jmp = self.ast.emit_after(id, 1, Op::Jmp, 0);
            let l_else = self.label(id, Some(2));
            let l_end = self.label(id, None);
            self.ast[jz].value = Some(l_else);
            self.ast[jmp].value = Some(l_end);
        } else {
            let l_end = self.label(id, None);
            self.ast[jz].value = Some(l_end);
        }
        Ok(())
    }

    fn while_stmt(&mut self, id: NodeId) -> Result<()> {
        for c in self.ast.operands(id) {
            self.node(c)?;
        }
        let l_top = self.ast.emit_front(id, Op::Nop, 0);
        let jz = self.ast.emit_after(id, 0, Op::Jz, 0);
        self.emit_ref(id, Op::Jmp, l_top);
        let l_end = self.label(id, None);
        self.ast[jz].value = Some(l_end);
        Ok(())
    }

    /// `[init, cond, body, step]` becomes
    /// `init; top: cond; JZ end; body; step; JMP top; end:`.
    fn for_stmt(&mut self, id: NodeId) -> Result<()> {
        for c in self.ast.operands(id) {
            self.node(c)?;
        }
        let l_top = self.label(id, Some(1));
        let jz = self.ast.emit_after(id, 1, Op::Jz, 0);
        self.emit_ref(id, Op::Jmp, l_top);
        let l_end = self.label(id, None);
        self.ast[jz].value = Some(l_end);
        self.scope_bracket(id);
        Ok(())
    }
}
