use serde::Serialize;

use crate::vm::opcode::Op;

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        if self.is_unknown() {
            return other;
        }
        if other.is_unknown() {
            return self;
        }
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_unknown(self) -> bool {
        self == Span::UNKNOWN
    }
}

// ---- Node arena ----

/// Handle into an [`Ast`]. Only meaningful for the arena that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    ProgramStart,
    Number,
    // binary operators, children: [lhs, rhs]
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
    LogAnd,
    LogOr,
    BitAnd,
    BitOr,
    BitXor,
    // unary operators, children: [operand]
    LogNot,
    BitNot,
    /// children: [init, cond, body, step]
    For,
    /// children: [cond, then, else?]
    If,
    /// children: [cond, body]
    While,
    /// children: [LocalSize?, FuncDefArg*, Block]
    FuncDef,
    /// children: [type?]
    FuncDefArg,
    FuncCall,
    Block,
    /// Statement list that does not open a scope.
    Multi,
    /// Expression statement; the value is discarded.
    Drop,
    /// children: [Ref, value]
    Assign,
    /// Root of an access chain, children: [accessor?]
    Var,
    /// children: [type?]
    Declare,
    LocalSize,
    Insn(Op),
    Return,
    Syscall,
    SyscallDef,
    FuncPtr,
    /// Index accessor, children: [index, accessor?]. As a type node,
    /// children: [dimension, type?].
    ArrayRef,
    /// children: [member Declare*]
    StructDef,
    /// Member accessor, children: [accessor?]
    StructMember,
    /// Named struct type.
    DataType,
    /// Access chain read by value.
    Deref,
    /// Access chain used as a location.
    Ref,
    /// children: [Ref]
    PreAdd,
    PostAdd,
}

impl NodeKind {
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            NodeKind::Add
                | NodeKind::Sub
                | NodeKind::Mul
                | NodeKind::Div
                | NodeKind::Mod
                | NodeKind::Eq
                | NodeKind::Neq
                | NodeKind::Lt
                | NodeKind::Gt
                | NodeKind::Leq
                | NodeKind::Geq
                | NodeKind::LogAnd
                | NodeKind::LogOr
                | NodeKind::BitAnd
                | NodeKind::BitOr
                | NodeKind::BitXor
        )
    }

    pub fn is_unary(self) -> bool {
        matches!(self, NodeKind::LogNot | NodeKind::BitNot)
    }

    /// The VM opcode implementing an operator node.
    pub fn operator(self) -> Option<Op> {
        let op = match self {
            NodeKind::Add => Op::Add,
            NodeKind::Sub => Op::Sub,
            NodeKind::Mul => Op::Mul,
            NodeKind::Div => Op::Div,
            NodeKind::Mod => Op::Mod,
            NodeKind::Eq => Op::Teq,
            NodeKind::Neq => Op::Tneq,
            NodeKind::Lt => Op::Tl,
            NodeKind::Gt => Op::Tg,
            NodeKind::Leq => Op::Tleq,
            NodeKind::Geq => Op::Tgeq,
            NodeKind::LogAnd => Op::LAnd,
            NodeKind::LogOr => Op::LOr,
            NodeKind::BitAnd => Op::BAnd,
            NodeKind::BitOr => Op::BOr,
            NodeKind::BitXor => Op::BXor,
            NodeKind::LogNot => Op::LNot,
            NodeKind::BitNot => Op::BNot,
            _ => return None,
        };
        Some(op)
    }

    /// Synthesized nodes that are not operands of their parent.
    pub fn is_bookkeeping(self) -> bool {
        matches!(self, NodeKind::Insn(_) | NodeKind::LocalSize)
    }
}

/// Shape an expression or declaration evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Returns {
    #[default]
    Unknown,
    Const,
    Pod,
    Array,
    Struct,
    Function,
}

impl Returns {
    pub fn is_scalar(self) -> bool {
        matches!(self, Returns::Const | Returns::Pod)
    }

    pub fn is_composite(self) -> bool {
        matches!(self, Returns::Array | Returns::Struct)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fixed-point constant, element count, or syscall handle depending on kind.
    pub number: i32,
    /// Cell count; meaning depends on kind.
    pub size: i32,
    pub returns: Returns,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<NodeId>,
    pub valpos: i32,
    /// Storage is in the global area rather than the current frame.
    pub global: bool,
    /// Instruction operand.
    pub arg: i32,
    pub span: Span,
    #[serde(skip)]
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, span: Span) -> Self {
        Node {
            kind,
            name: None,
            number: 0,
            size: 0,
            returns: Returns::Unknown,
            value: None,
            valpos: 0,
            global: false,
            arg: 0,
            span,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn insn(&self) -> Option<Op> {
        match self.kind {
            NodeKind::Insn(op) => Some(op),
            _ => None,
        }
    }
}

/// Owns every node of one compilation. Dropping the arena frees the whole
/// tree, whatever shape the passes left it in.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl std::ops::Index<NodeId> for Ast {
    type Output = Node;
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl std::ops::IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}

impl Ast {
    pub fn new() -> Self {
        Ast { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(kind, span));
        id
    }

    pub fn add_named(&mut self, kind: NodeKind, name: impl Into<String>, span: Span) -> NodeId {
        let id = self.add(kind, span);
        self[id].name = Some(name.into());
        id
    }

    pub fn add_number(&mut self, number: i32, span: Span) -> NodeId {
        let id = self.add(NodeKind::Number, span);
        self[id].number = number;
        id
    }

    pub fn add_with(&mut self, kind: NodeKind, span: Span, children: Vec<NodeId>) -> NodeId {
        let id = self.add(kind, span);
        self[id].children = children;
        id
    }

    pub fn push_child(&mut self, parent: NodeId, child: NodeId) {
        self[parent].children.push(child);
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    /// Snapshot of the children, for walks that mutate the tree.
    pub fn child_list(&self, id: NodeId) -> Vec<NodeId> {
        self[id].children.clone()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    // ---- Operand access ----
    //
    // Code generation splices instruction nodes in among a node's children;
    // operands are counted past them.

    fn operand_slot(&self, id: NodeId, k: usize) -> Option<usize> {
        self[id]
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| !self[**c].kind.is_bookkeeping())
            .nth(k)
            .map(|(i, _)| i)
    }

    pub fn operand(&self, id: NodeId, k: usize) -> Option<NodeId> {
        self.operand_slot(id, k).map(|i| self[id].children[i])
    }

    pub fn operands(&self, id: NodeId) -> Vec<NodeId> {
        self[id]
            .children
            .iter()
            .copied()
            .filter(|c| !self[*c].kind.is_bookkeeping())
            .collect()
    }

    fn new_insn(&mut self, owner: NodeId, op: Op, arg: i32) -> NodeId {
        let span = self[owner].span;
        let id = self.add(NodeKind::Insn(op), span);
        self[id].arg = arg;
        self[id].parent = Some(owner);
        id
    }

    /// Insert an instruction ahead of every child of `id`.
    pub fn emit_front(&mut self, id: NodeId, op: Op, arg: i32) -> NodeId {
        let insn = self.new_insn(id, op, arg);
        self[id].children.insert(0, insn);
        insn
    }

    /// Insert an instruction after all children of `id`.
    pub fn emit_end(&mut self, id: NodeId, op: Op, arg: i32) -> NodeId {
        let insn = self.new_insn(id, op, arg);
        self[id].children.push(insn);
        insn
    }

    /// Insert an instruction immediately before operand `k`, or at the end if
    /// there is no such operand.
    pub fn emit_before(&mut self, id: NodeId, k: usize, op: Op, arg: i32) -> NodeId {
        let insn = self.new_insn(id, op, arg);
        match self.operand_slot(id, k) {
            Some(i) => self[id].children.insert(i, insn),
            None => self[id].children.push(insn),
        }
        insn
    }

    /// Insert an instruction immediately after operand `k` and any
    /// instructions already emitted behind it.
    pub fn emit_after(&mut self, id: NodeId, k: usize, op: Op, arg: i32) -> NodeId {
        let insn = self.new_insn(id, op, arg);
        let at = match self.operand_slot(id, k + 1) {
            Some(i) => i,
            None => self[id].children.len(),
        };
        self[id].children.insert(at, insn);
        insn
    }

    // ---- Whole-tree passes ----

    /// Recompute parent links from the child lists.
    pub fn fix_parents(&mut self, root: NodeId) {
        self[root].parent = None;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            for c in self.child_list(id) {
                self[c].parent = Some(id);
                stack.push(c);
            }
        }
    }

    /// Copy a subtree, keeping `value` links pointed at the originals.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let mut copy = self[id].clone();
        copy.children = Vec::new();
        let new_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(copy);
        for c in self.child_list(id) {
            let cc = self.deep_clone(c);
            self[new_id].children.push(cc);
        }
        new_id
    }

    /// Pre-order walk.
    pub fn walk(&self, root: NodeId, f: &mut impl FnMut(NodeId)) {
        f(root);
        for &c in &self[root].children {
            self.walk(c, f);
        }
    }

    /// Instruction nodes in program order.
    pub fn instructions(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(root, &mut |id| {
            if self[id].insn().is_some() {
                out.push(id);
            }
        });
        out
    }

    /// Shift spans after a prelude of `offset` bytes; nodes that lie inside
    /// the prelude lose their location.
    pub fn rebase_spans(&mut self, offset: usize) {
        for n in &mut self.nodes {
            if n.span.end <= offset {
                n.span = Span::UNKNOWN;
            } else {
                n.span = Span {
                    start: n.span.start.saturating_sub(offset),
                    end: n.span.end - offset,
                };
            }
        }
    }

    /// Source span of the instruction emitted at `pc`. Valid once addresses
    /// have been assigned.
    pub fn span_for_pc(&self, root: NodeId, pc: usize) -> Option<Span> {
        let insn = self
            .instructions(root)
            .into_iter()
            .find(|&id| self[id].valpos as usize == pc && self[id].insn() != Some(Op::Nop))?;
        let mut cur = Some(insn);
        while let Some(id) = cur {
            if !self[id].span.is_unknown() {
                return Some(self[id].span);
            }
            cur = self[id].parent;
        }
        None
    }

    /// Indented one-node-per-line rendering of a subtree.
    pub fn dump(&self, root: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(root, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        let n = &self[id];
        out.push_str(&"  ".repeat(depth));
        match n.kind {
            NodeKind::Insn(op) => out.push_str(&format!("{} {}", op.mnemonic(), n.arg)),
            kind => out.push_str(&format!("{kind:?}")),
        }
        if let Some(name) = &n.name {
            out.push_str(&format!(" '{name}'"));
        }
        match n.kind {
            NodeKind::Number => out.push_str(&format!(" {}", crate::vm::fixed::format(n.number))),
            NodeKind::Insn(_) => out.push_str(&format!(" @{}", n.valpos)),
            _ => {
                if n.returns != Returns::Unknown {
                    out.push_str(&format!(" :{:?}", n.returns));
                }
                if n.size != 0 {
                    out.push_str(&format!(" size={}", n.size));
                }
                if n.valpos != 0 || n.global {
                    let area = if n.global { "g" } else { "l" };
                    out.push_str(&format!(" {area}{}", n.valpos));
                }
            }
        }
        out.push('\n');
        for &c in &n.children {
            self.dump_into(c, depth + 1, out);
        }
    }
}
