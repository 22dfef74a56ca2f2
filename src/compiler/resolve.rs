//! Name resolution.
//!
//! Links every use of a name to its declaration through `value`. Top-level
//! names are visible everywhere, which is what makes forward references
//! work; block-local names are visible from their declaration to the end of
//! the enclosing block or `for`. Calls that do not reach a user function are
//! looked up in the syscall registry and become `Syscall` nodes.

use std::collections::HashSet;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::syscall::Registry;

use super::CompileError;

type Result<T> = std::result::Result<T, CompileError>;

struct Symbol {
    name: String,
    node: NodeId,
}

struct Resolver<'a> {
    ast: &'a mut Ast,
    registry: &'a Registry,
    symbols: Vec<Symbol>,
    /// First symbol of the innermost scope.
    scope_start: usize,
}

pub fn run(ast: &mut Ast, root: NodeId, registry: &Registry) -> Result<()> {
    let mut r = Resolver { ast, registry, symbols: Vec::new(), scope_start: 0 };
    r.seed(root)?;
    for item in r.ast.child_list(root) {
        match r.ast[item].kind {
            NodeKind::FuncDef => r.function(item)?,
            NodeKind::StructDef => r.struct_def(item)?,
            NodeKind::SyscallDef => {}
            _ => r.node(item)?,
        }
    }
    Ok(())
}

impl Resolver<'_> {
    /// Declare every top-level name up front.
    fn seed(&mut self, root: NodeId) -> Result<()> {
        for item in self.ast.child_list(root) {
            match self.ast[item].kind {
                NodeKind::FuncDef | NodeKind::StructDef | NodeKind::SyscallDef | NodeKind::Declare => {
                    self.declare(item)?
                }
                NodeKind::Multi => {
                    for d in self.ast.child_list(item) {
                        if self.ast[d].kind == NodeKind::Declare {
                            self.declare(d)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn declare(&mut self, node: NodeId) -> Result<()> {
        let name = self.ast[node].name().to_string();
        if let Some(prev) = self.symbols[self.scope_start..].iter().find(|s| s.name == name) {
            if prev.node == node {
                return Ok(());
            }
            return Err(CompileError::new(
                "GL-R003",
                self.ast[node].span,
                format!("'{name}' is already declared in this scope"),
            ));
        }
        self.symbols.push(Symbol { name, node });
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<NodeId> {
        self.symbols.iter().rev().find(|s| s.name == name).map(|s| s.node)
    }

    fn open_scope(&mut self) -> (usize, usize) {
        let saved = (self.symbols.len(), self.scope_start);
        self.scope_start = self.symbols.len();
        saved
    }

    fn close_scope(&mut self, (len, start): (usize, usize)) {
        self.symbols.truncate(len);
        self.scope_start = start;
    }

    // ---- Definitions ----

    fn function(&mut self, f: NodeId) -> Result<()> {
        let scope = self.open_scope();
        for c in self.ast.child_list(f) {
            match self.ast[c].kind {
                NodeKind::FuncDefArg => {
                    self.type_children(c)?;
                    self.declare(c)?;
                }
                // the body shares the parameters' scope
                NodeKind::Block => {
                    for s in self.ast.child_list(c) {
                        self.node(s)?;
                    }
                }
                _ => {}
            }
        }
        self.close_scope(scope);
        Ok(())
    }

    fn struct_def(&mut self, s: NodeId) -> Result<()> {
        let mut seen = HashSet::new();
        for member in self.ast.child_list(s) {
            let name = self.ast[member].name().to_string();
            if !seen.insert(name.clone()) {
                return Err(CompileError::new(
                    "GL-R003",
                    self.ast[member].span,
                    format!("'{name}' is already a member of struct '{}'", self.ast[s].name()),
                ));
            }
            self.type_children(member)?;
        }
        Ok(())
    }

    fn type_children(&mut self, decl: NodeId) -> Result<()> {
        for t in self.ast.child_list(decl) {
            self.type_node(t)?;
        }
        Ok(())
    }

    fn type_node(&mut self, t: NodeId) -> Result<()> {
        match self.ast[t].kind {
            NodeKind::ArrayRef => {
                let children = self.ast.child_list(t);
                if let Some(&dim) = children.first() {
                    self.node(dim)?;
                }
                for &inner in children.iter().skip(1) {
                    self.type_node(inner)?;
                }
            }
            NodeKind::DataType => {
                let name = self.ast[t].name().to_string();
                match self.lookup(&name) {
                    Some(s) if self.ast[s].kind == NodeKind::StructDef => self.ast[t].value = Some(s),
                    Some(_) => {
                        return Err(CompileError::new(
                            "GL-R006",
                            self.ast[t].span,
                            format!("'{name}' is not a struct type"),
                        ));
                    }
                    None => {
                        return Err(CompileError::new(
                            "GL-R001",
                            self.ast[t].span,
                            format!("undefined symbol '{name}'"),
                        ));
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ---- Statements and expressions ----

    fn node(&mut self, id: NodeId) -> Result<()> {
        match self.ast[id].kind {
            NodeKind::Block | NodeKind::For => {
                let scope = self.open_scope();
                for c in self.ast.child_list(id) {
                    self.node(c)?;
                }
                self.close_scope(scope);
            }
            NodeKind::Declare => {
                self.type_children(id)?;
                self.declare(id)?;
            }
            NodeKind::Deref => self.chain(id, false)?,
            NodeKind::Ref => self.chain(id, false)?,
            NodeKind::FuncCall => self.call(id)?,
            _ => {
                for c in self.ast.child_list(id) {
                    self.node(c)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve the root of an access chain and the index expressions along it.
    fn chain(&mut self, wrapper: NodeId, fn_ptr_allowed: bool) -> Result<()> {
        let Some(&var) = self.ast.children(wrapper).first() else { return Ok(()) };
        let name = self.ast[var].name().to_string();
        let span = self.ast[var].span;
        let Some(decl) = self.lookup(&name) else {
            return Err(CompileError::new("GL-R001", span, format!("undefined symbol '{name}'")));
        };
        let by_value = self.ast[wrapper].kind == NodeKind::Deref;

        match self.ast[decl].kind {
            NodeKind::Declare | NodeKind::FuncDefArg => {
                self.ast[var].value = Some(decl);
                for acc in self.ast.child_list(var) {
                    self.accessor(acc)?;
                }
                Ok(())
            }
            NodeKind::FuncDef if by_value && self.ast.children(var).is_empty() => {
                if !fn_ptr_allowed {
                    return Err(CompileError::new(
                        "GL-R004",
                        span,
                        format!("function '{name}' can only be used as a value when passed to a syscall"),
                    ));
                }
                let w = &mut self.ast[wrapper];
                w.kind = NodeKind::FuncPtr;
                w.value = Some(decl);
                w.name = Some(name);
                w.children.clear();
                Ok(())
            }
            NodeKind::FuncDef | NodeKind::SyscallDef if by_value => Err(CompileError::new(
                "GL-R004",
                span,
                format!("'{name}' is a function and cannot be used as a value here"),
            )),
            _ => Err(CompileError::new("GL-R007", span, format!("'{name}' is not a variable"))),
        }
    }

    fn accessor(&mut self, acc: NodeId) -> Result<()> {
        for c in self.ast.child_list(acc) {
            match self.ast[c].kind {
                NodeKind::ArrayRef | NodeKind::StructMember => self.accessor(c)?,
                _ => self.node(c)?,
            }
        }
        Ok(())
    }

    fn call(&mut self, id: NodeId) -> Result<()> {
        let name = self.ast[id].name().to_string();
        let span = self.ast[id].span;
        let target = self.lookup(&name);
        let args = self.ast.child_list(id);

        match target.map(|t| self.ast[t].kind) {
            Some(NodeKind::FuncDef) => {
                self.ast[id].value = target;
                for a in args {
                    self.node(a)?;
                }
                Ok(())
            }
            Some(NodeKind::SyscallDef) | None => {
                let Some(handle) = self.registry.handle_for_name(&name) else {
                    let message = match target {
                        Some(_) => format!("syscall '{name}' is not provided by the host"),
                        None => format!("undefined symbol '{name}'"),
                    };
                    return Err(CompileError::new("GL-R001", span, message));
                };
                let arity = self.registry.entry(handle).map_or(0, |e| e.arity);
                if arity != args.len() {
                    return Err(CompileError::new(
                        "GL-R005",
                        span,
                        format!("syscall '{name}' takes {arity} arguments, got {}", args.len()),
                    ));
                }
                self.ast[id].kind = NodeKind::Syscall;
                self.ast[id].number = handle as i32;
                for a in args {
                    if self.ast[a].kind == NodeKind::Deref {
                        self.chain(a, true)?;
                    } else {
                        self.node(a)?;
                    }
                }
                Ok(())
            }
            Some(_) => Err(CompileError::new("GL-R002", span, format!("'{name}' is not a function"))),
        }
    }
}
