//! Sizes, shapes and constant folding.
//!
//! Every declaration gets its shape (`returns`) and cell count; struct
//! members get their offsets; every access chain is checked against the
//! declared type and annotated with the element or member it ends at.
//! Operator subtrees whose operands are all constants are replaced by the
//! folded constant, using the same arithmetic as the VM.

use std::collections::HashMap;

use crate::ast::{Ast, NodeId, NodeKind, Returns, Span};
use crate::vm::fixed;

use super::CompileError;

type Result<T> = std::result::Result<T, CompileError>;

/// Largest object a tagged address can describe.
const MAX_OBJECT_CELLS: i64 = 0xffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructState {
    InProgress,
    Done,
}

struct Layout<'a> {
    ast: &'a mut Ast,
    structs: HashMap<NodeId, StructState>,
}

pub fn run(ast: &mut Ast, root: NodeId) -> Result<()> {
    let mut l = Layout { ast, structs: HashMap::new() };
    for item in l.ast.child_list(root) {
        if l.ast[item].kind == NodeKind::StructDef {
            l.struct_size(item)?;
        }
    }
    for item in l.ast.child_list(root) {
        match l.ast[item].kind {
            NodeKind::FuncDef => l.function(item)?,
            NodeKind::StructDef | NodeKind::SyscallDef => {}
            _ => l.statement(item)?,
        }
    }
    Ok(())
}

/// The type node of a declaration, if it has one.
pub(crate) fn type_of(ast: &Ast, decl: NodeId) -> Option<NodeId> {
    ast.children(decl)
        .iter()
        .copied()
        .find(|&c| matches!(ast[c].kind, NodeKind::ArrayRef | NodeKind::DataType))
}

fn internal(span: Span, what: &str) -> CompileError {
    CompileError::new("GL-E002", span, format!("internal compiler error: {what}"))
}

impl Layout<'_> {
    // ---- Types ----

    fn struct_size(&mut self, s: NodeId) -> Result<i32> {
        match self.structs.get(&s) {
            Some(StructState::Done) => return Ok(self.ast[s].size),
            Some(StructState::InProgress) => {
                return Err(CompileError::new(
                    "GL-T009",
                    self.ast[s].span,
                    format!("struct '{}' contains itself", self.ast[s].name()),
                ));
            }
            None => {}
        }
        self.structs.insert(s, StructState::InProgress);
        let mut offset: i64 = 0;
        for m in self.ast.child_list(s) {
            self.declaration(m, false)?;
            self.ast[m].valpos = offset as i32;
            offset += self.ast[m].size as i64;
        }
        if offset > MAX_OBJECT_CELLS {
            return Err(CompileError::new(
                "GL-T011",
                self.ast[s].span,
                format!("struct '{}' is too large", self.ast[s].name()),
            ));
        }
        let node = &mut self.ast[s];
        node.size = offset as i32;
        node.returns = Returns::Struct;
        self.structs.insert(s, StructState::Done);
        Ok(offset as i32)
    }

    /// Give a declaration its shape and size. Idempotent, so uses that come
    /// before the declaration can trigger it early.
    fn declaration(&mut self, decl: NodeId, is_param: bool) -> Result<()> {
        if self.ast[decl].returns != Returns::Unknown {
            return Ok(());
        }
        let (returns, size, count) = match type_of(self.ast, decl) {
            None => (Returns::Pod, 1, 0),
            Some(t) => {
                let size = self.type_size(t, is_param)?;
                (self.ast[t].returns, size, self.ast[t].number)
            }
        };
        let node = &mut self.ast[decl];
        node.returns = returns;
        node.size = size;
        node.number = count;
        Ok(())
    }

    /// Cell count of a type node; `-1` for an open array.
    fn type_size(&mut self, t: NodeId, open_allowed: bool) -> Result<i32> {
        match self.ast[t].kind {
            NodeKind::ArrayRef => {
                let children = self.ast.child_list(t);
                let span = self.ast[t].span;
                let open = self.ast[t].size == -1;
                if open && !open_allowed {
                    return Err(CompileError::new(
                        "GL-T010",
                        span,
                        "only the first dimension of a parameter may be left open",
                    ));
                }
                let count = if open {
                    -1
                } else {
                    let dim = *children.first().ok_or_else(|| internal(span, "array type without a size"))?;
                    self.expr(dim)?;
                    if self.ast[dim].kind != NodeKind::Number {
                        return Err(CompileError::new("GL-T001", self.ast[dim].span, "array size must be const"));
                    }
                    let n = fixed::to_int(self.ast[dim].number);
                    if n <= 0 {
                        return Err(CompileError::new(
                            "GL-T002",
                            self.ast[dim].span,
                            format!("array size must be positive, got {n}"),
                        ));
                    }
                    n
                };
                let elem = match children.get(1) {
                    Some(&inner) => self.type_size(inner, false)?,
                    None => 1,
                };
                let total = if open { -1 } else { count as i64 * elem as i64 };
                if total > MAX_OBJECT_CELLS {
                    return Err(CompileError::new("GL-T011", span, "array is too large"));
                }
                let node = &mut self.ast[t];
                node.number = count;
                node.size = total as i32;
                node.returns = Returns::Array;
                Ok(total as i32)
            }
            NodeKind::DataType => {
                let s = self.ast[t].value.ok_or_else(|| internal(self.ast[t].span, "unresolved struct type"))?;
                let size = self.struct_size(s)?;
                self.ast[t].size = size;
                self.ast[t].returns = Returns::Struct;
                Ok(size)
            }
            _ => Ok(1),
        }
    }

    fn same_shape(&self, param: Option<NodeId>, arg: Option<NodeId>) -> bool {
        let (p, a) = match (param, arg) {
            (None, None) => return true,
            (Some(p), Some(a)) => (p, a),
            _ => return false,
        };
        match (self.ast[p].kind, self.ast[a].kind) {
            (NodeKind::ArrayRef, NodeKind::ArrayRef) => {
                let p_open = self.ast[p].size == -1;
                let a_open = self.ast[a].size == -1;
                let counts = p_open || (!a_open && self.ast[p].number == self.ast[a].number);
                counts
                    && self.same_shape(
                        self.ast.children(p).get(1).copied(),
                        self.ast.children(a).get(1).copied(),
                    )
            }
            (NodeKind::DataType, NodeKind::DataType) => self.ast[p].value == self.ast[a].value,
            _ => false,
        }
    }

    // ---- Statements ----

    fn function(&mut self, f: NodeId) -> Result<()> {
        let mut params = 0;
        for c in self.ast.child_list(f) {
            if self.ast[c].kind == NodeKind::FuncDefArg {
                self.declaration(c, true)?;
                params += 1;
            }
        }
        self.ast[f].number = params;
        self.ast[f].returns = Returns::Function;
        if let Some(&body) = self.ast.children(f).last() {
            self.statement(body)?;
        }
        Ok(())
    }

    fn statement(&mut self, id: NodeId) -> Result<()> {
        let ops = self.ast.operands(id);
        match self.ast[id].kind {
            NodeKind::Block | NodeKind::Multi => {
                for c in ops {
                    self.statement(c)?;
                }
            }
            NodeKind::Declare => self.declaration(id, false)?,
            NodeKind::If => {
                self.scalar(ops[0])?;
                for &c in &ops[1..] {
                    self.statement(c)?;
                }
            }
            NodeKind::While => {
                self.scalar(ops[0])?;
                self.statement(ops[1])?;
            }
            NodeKind::For => {
                self.statement(ops[0])?;
                self.scalar(ops[1])?;
                self.statement(ops[2])?;
                self.statement(ops[3])?;
            }
            NodeKind::Return | NodeKind::Drop => self.scalar(ops[0])?,
            NodeKind::Assign => {
                if self.chain(ops[0])? != Returns::Pod {
                    return Err(CompileError::new(
                        "GL-T008",
                        self.ast[ops[0]].span,
                        "cannot assign to a whole array or struct",
                    ));
                }
                self.scalar(ops[1])?;
            }
            _ => self.scalar(id)?,
        }
        Ok(())
    }

    // ---- Expressions ----

    fn scalar(&mut self, id: NodeId) -> Result<()> {
        if self.expr(id)?.is_scalar() {
            return Ok(());
        }
        Err(CompileError::new("GL-T008", self.ast[id].span, "expected a scalar value"))
    }

    fn expr(&mut self, id: NodeId) -> Result<Returns> {
        let kind = self.ast[id].kind;
        let returns = match kind {
            NodeKind::Number => Returns::Const,
            k if k.is_binary() || k.is_unary() => {
                for c in self.ast.operands(id) {
                    self.scalar(c)?;
                }
                self.fold(id)
            }
            NodeKind::Deref | NodeKind::Ref => self.chain(id)?,
            NodeKind::PreAdd | NodeKind::PostAdd => {
                let target = self.ast.operand(id, 0).ok_or_else(|| internal(self.ast[id].span, "empty increment"))?;
                if self.chain(target)? != Returns::Pod {
                    return Err(CompileError::new("GL-T008", self.ast[id].span, "++ and -- need a scalar variable"));
                }
                Returns::Pod
            }
            NodeKind::FuncCall => {
                self.call(id)?;
                Returns::Pod
            }
            NodeKind::Syscall => {
                // composites go to the host by address
                for a in self.ast.operands(id) {
                    self.expr(a)?;
                }
                Returns::Pod
            }
            NodeKind::FuncPtr => Returns::Function,
            other => return Err(internal(self.ast[id].span, &format!("unexpected {other:?} in expression"))),
        };
        self.ast[id].returns = returns;
        Ok(returns)
    }

    /// Replace an operator whose operands are constants by its value.
    /// Division by a constant zero is left for the VM to report.
    fn fold(&mut self, id: NodeId) -> Returns {
        let ops = self.ast.operands(id);
        let Some(op) = self.ast[id].kind.operator() else { return Returns::Pod };
        if !ops.iter().all(|&c| self.ast[c].kind == NodeKind::Number) {
            return Returns::Pod;
        }
        let value = match ops.as_slice() {
            [a] => fixed::unary(op, self.ast[*a].number),
            [a, b] => fixed::binary(op, self.ast[*a].number, self.ast[*b].number),
            _ => None,
        };
        match value {
            Some(v) => {
                let node = &mut self.ast[id];
                node.kind = NodeKind::Number;
                node.number = v;
                node.children.clear();
                Returns::Const
            }
            None => Returns::Pod,
        }
    }

    /// Check an access chain against the declared type. The wrapper ends up
    /// with the shape, size and type node of the final element.
    fn chain(&mut self, wrapper: NodeId) -> Result<Returns> {
        let span = self.ast[wrapper].span;
        let var = *self.ast.children(wrapper).first().ok_or_else(|| internal(span, "empty access chain"))?;
        let decl = self.ast[var].value.ok_or_else(|| internal(span, "unresolved variable"))?;
        let is_param = self.ast[decl].kind == NodeKind::FuncDefArg;
        self.declaration(decl, is_param)?;
        let name = self.ast[var].name().to_string();

        let mut ty = type_of(self.ast, decl);
        let mut size = self.ast[decl].size;
        let mut cur = var;
        while let Some(acc) = next_accessor(self.ast, cur) {
            let acc_span = self.ast[acc].span;
            match self.ast[acc].kind {
                NodeKind::ArrayRef => {
                    let Some(t) = ty.filter(|&t| self.ast[t].kind == NodeKind::ArrayRef) else {
                        return Err(CompileError::new("GL-T003", acc_span, format!("'{name}' is not indexable here")));
                    };
                    let idx = *self.ast.children(acc).first().ok_or_else(|| internal(acc_span, "index"))?;
                    self.scalar(idx)?;
                    let elem = self.ast.children(t).get(1).copied();
                    size = elem.map_or(1, |e| self.ast[e].size);
                    let node = &mut self.ast[acc];
                    node.size = size;
                    node.value = Some(t);
                    ty = elem;
                }
                _ => {
                    let member_name = self.ast[acc].name().to_string();
                    let Some(t) = ty.filter(|&t| self.ast[t].kind == NodeKind::DataType) else {
                        return Err(CompileError::new(
                            "GL-T004",
                            acc_span,
                            format!("'.{member_name}' used on a value that is not a struct"),
                        ));
                    };
                    let s = self.ast[t].value.ok_or_else(|| internal(acc_span, "unresolved struct type"))?;
                    let Some(m) = self.ast.children(s).iter().copied().find(|&m| self.ast[m].name() == member_name)
                    else {
                        return Err(CompileError::new(
                            "GL-T005",
                            acc_span,
                            format!("struct '{}' has no member '{member_name}'", self.ast[s].name()),
                        ));
                    };
                    size = self.ast[m].size;
                    let offset = self.ast[m].valpos;
                    let node = &mut self.ast[acc];
                    node.value = Some(m);
                    node.number = offset;
                    node.size = size;
                    ty = type_of(self.ast, m);
                }
            }
            cur = acc;
        }

        let shape = match ty.map(|t| self.ast[t].kind) {
            Some(NodeKind::ArrayRef) => Returns::Array,
            Some(NodeKind::DataType) => Returns::Struct,
            _ => Returns::Pod,
        };
        let node = &mut self.ast[wrapper];
        node.returns = shape;
        node.size = size;
        node.value = ty;
        Ok(shape)
    }

    fn call(&mut self, id: NodeId) -> Result<()> {
        let span = self.ast[id].span;
        let f = self.ast[id].value.ok_or_else(|| internal(span, "unresolved call"))?;
        let name = self.ast[f].name().to_string();
        let params: Vec<NodeId> = self
            .ast
            .children(f)
            .iter()
            .copied()
            .filter(|&c| self.ast[c].kind == NodeKind::FuncDefArg)
            .collect();
        let args = self.ast.operands(id);
        if args.len() != params.len() {
            return Err(CompileError::new(
                "GL-T006",
                span,
                format!("'{name}' takes {} arguments, got {}", params.len(), args.len()),
            ));
        }

        for (i, (&a, &p)) in args.iter().zip(&params).enumerate() {
            self.declaration(p, true)?;
            if self.ast[p].returns.is_scalar() {
                self.scalar(a)?;
                continue;
            }
            let mismatch = || {
                CompileError::new(
                    "GL-T007",
                    span,
                    format!("argument {} of '{name}' does not match the parameter's array or struct shape", i + 1),
                )
            };
            if !matches!(self.ast[a].kind, NodeKind::Deref | NodeKind::Ref) {
                return Err(mismatch());
            }
            let shape = self.chain(a)?;
            let param_ty = type_of(self.ast, p);
            if !shape.is_composite() || !self.same_shape(param_ty, self.ast[a].value) {
                return Err(mismatch());
            }
            // composites are passed by address
            self.ast[a].kind = NodeKind::Ref;
        }
        Ok(())
    }
}

/// The accessor following `node` in a chain. Index accessors keep their
/// index expression first.
fn next_accessor(ast: &Ast, node: NodeId) -> Option<NodeId> {
    let skip = usize::from(ast[node].kind == NodeKind::ArrayRef);
    ast.children(node)
        .get(skip)
        .copied()
        .filter(|&c| matches!(ast[c].kind, NodeKind::ArrayRef | NodeKind::StructMember))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::tests::{compile_err, compile_ok, run_int};
    use crate::parser::parse;
    use crate::syscall::Registry;

    fn laid_out(source: &str) -> (Ast, NodeId) {
        let (mut ast, root) = parse(source).unwrap();
        crate::compiler::prepare::run(&mut ast, root);
        crate::compiler::resolve::run(&mut ast, root, &Registry::new()).unwrap();
        run(&mut ast, root).unwrap();
        (ast, root)
    }

    fn named(ast: &Ast, root: NodeId, kind: NodeKind, name: &str) -> NodeId {
        let mut found = None;
        ast.walk(root, &mut |id| {
            if found.is_none() && ast[id].kind == kind && ast[id].name() == name {
                found = Some(id);
            }
        });
        found.unwrap()
    }

    #[test]
    fn struct_member_offsets() {
        let (ast, root) = laid_out("struct p { var x; var v[3]; var y; } var q: p;");
        let s = named(&ast, root, NodeKind::StructDef, "p");
        assert_eq!(ast[s].size, 5);
        let y = named(&ast, root, NodeKind::Declare, "y");
        assert_eq!(ast[y].valpos, 4);
        let q = named(&ast, root, NodeKind::Declare, "q");
        assert_eq!((ast[q].returns, ast[q].size), (Returns::Struct, 5));
    }

    #[test]
    fn nested_array_sizes() {
        let (ast, root) = laid_out("struct p { var a, b; } var m[2][3]: p;");
        let m = named(&ast, root, NodeKind::Declare, "m");
        assert_eq!((ast[m].returns, ast[m].size, ast[m].number), (Returns::Array, 12, 2));
    }

    #[test]
    fn constant_dimension_expressions_fold() {
        let (ast, root) = laid_out("var a[2 * 3 + 1];");
        let a = named(&ast, root, NodeKind::Declare, "a");
        assert_eq!(ast[a].size, 7);
    }

    #[test]
    fn folding_replaces_constant_subtrees() {
        let (ast, root) = laid_out("fn main() { return (2 + 4) / 3; }");
        let f = named(&ast, root, NodeKind::FuncDef, "main");
        let body = *ast.children(f).last().unwrap();
        let ret = ast.children(body)[0];
        let value = ast.children(ret)[0];
        assert_eq!(ast[value].kind, NodeKind::Number);
        assert_eq!(ast[value].number, fixed::from_int(2));
        assert_eq!(run_int("fn main() { return (2 + 4) / 3; }"), 2);
    }

    #[test]
    fn division_by_constant_zero_is_not_folded() {
        let (ast, root) = laid_out("fn main() { return 1 / 0; }");
        let mut divs = 0;
        ast.walk(root, &mut |id| divs += usize::from(ast[id].kind == NodeKind::Div));
        assert_eq!(divs, 1);
    }

    #[test]
    fn non_constant_size_rejected() {
        let e = compile_err("var n = 3; var a[n];");
        assert_eq!(e.code, "GL-T001");
        assert_eq!(e.message, "array size must be const");
        assert_eq!(compile_err("var a[0];").code, "GL-T002");
    }

    #[test]
    fn shape_errors() {
        assert_eq!(compile_err("var x; fn main() { return x[1]; }").code, "GL-T003");
        assert_eq!(compile_err("var x[2]; fn main() { return x.a; }").code, "GL-T004");
        assert_eq!(compile_err("struct p { var a; } var q: p; fn main() { return q.b; }").code, "GL-T005");
        assert_eq!(compile_err("var a[2]; fn main() { return a + 1; }").code, "GL-T008");
        assert_eq!(compile_err("var a[2]; fn main() { a = 1; }").code, "GL-T008");
        assert_eq!(compile_err("struct a { var b: a; }").code, "GL-T009");
        assert_eq!(compile_err("var a[];").code, "GL-T010");
        assert_eq!(compile_err("fn f(a[][]) { return 0; }").code, "GL-T010");
    }

    #[test]
    fn call_checks() {
        assert_eq!(compile_err("fn f(a) { return a; } fn main() { return f(); }").code, "GL-T006");
        assert_eq!(compile_err("fn f(a[3]) { return 0; } var b[4]; fn main() { return f(b); }").code, "GL-T007");
        assert_eq!(compile_err("fn f(a[3]) { return 0; } fn main() { return f(1); }").code, "GL-T007");
        compile_ok("fn f(a[]) { return a[0]; } var b[4]; fn main() { return f(b); }");
    }

    #[test]
    fn composite_arguments_become_references() {
        let (ast, root) = laid_out("fn f(a[2]) { return a[1]; } var b[2]; fn main() { return f(b); }");
        let call = named(&ast, root, NodeKind::FuncCall, "f");
        let arg = ast.children(call)[0];
        assert_eq!(ast[arg].kind, NodeKind::Ref);
    }
}
