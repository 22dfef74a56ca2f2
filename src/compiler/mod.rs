//! Source to bytecode.
//!
//! The pipeline runs over one [`Ast`] arena: parse, [`prepare`], [`resolve`],
//! [`layout`], [`place`], [`codegen`], [`fixup`]. Each pass annotates or
//! splices the tree in place; the first failing pass stops the compilation.

use crate::ast::{Ast, NodeId, NodeKind, Span};
use crate::lexer::LexError;
use crate::parser::{ParseError, Parser};
use crate::syscall::Registry;

pub mod codegen;
pub mod fixup;
pub mod layout;
pub mod place;
pub mod prepare;
pub mod resolve;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CompileError {
    pub code: &'static str,
    pub span: Span,
    pub message: String,
}

impl CompileError {
    pub fn new(code: &'static str, span: Span, message: impl Into<String>) -> Self {
        CompileError { code, span, message: message.into() }
    }
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        let span = Span { start: e.position, end: e.position + e.snippet.len().max(1) };
        CompileError::new(e.code, span, format!("unexpected token '{}'. {}", e.snippet, e.suggestion))
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::new(e.code, e.span, e.message)
    }
}

/// Receives every diagnostic the compiler produces. Hosts decide how to
/// render them; closures taking `(Span, &str)` implement it directly.
pub trait DiagnosticSink {
    fn report(&mut self, span: Span, message: &str);
}

impl<F: FnMut(Span, &str)> DiagnosticSink for F {
    fn report(&mut self, span: Span, message: &str) {
        self(span, message)
    }
}

/// A compiled program together with the tree it came from. The tree stays
/// around so runtime errors can be mapped back to source.
#[derive(Debug)]
pub struct Compilation {
    pub ast: Ast,
    pub root: NodeId,
    pub bytecode: Vec<u8>,
    pub globals_size: usize,
}

impl Compilation {
    pub fn span_for_pc(&self, pc: usize) -> Option<Span> {
        self.ast.span_for_pc(self.root, pc)
    }

    fn function(&self, name: &str) -> Option<NodeId> {
        self.ast
            .children(self.root)
            .iter()
            .copied()
            .find(|&c| self.ast[c].kind == NodeKind::FuncDef && self.ast[c].name() == name)
    }

    /// Entry address of a named function.
    pub fn function_address(&self, name: &str) -> Option<usize> {
        self.function(name).map(|f| self.ast[f].valpos as usize)
    }

    pub fn function_arity(&self, name: &str) -> Option<usize> {
        self.function(name).map(|f| self.ast[f].number as usize)
    }

    /// Disassembly with function labels and the names operands refer to.
    pub fn listing(&self) -> String {
        let mut out = String::from("top:\n");
        self.ast.walk(self.root, &mut |id| {
            let n = &self.ast[id];
            if n.kind == NodeKind::FuncDef {
                out.push_str(&format!("{}:\n", n.name()));
            }
            let Some(op) = n.insn() else { return };
            let mut line = format!("{:5}  {:<11}", n.valpos, op.mnemonic());
            if op.arg_class().width() > 0 {
                line.push_str(&format!(" {}", n.arg));
            }
            let target = n.value.map(|v| self.ast[v].name()).unwrap_or("");
            let note = match (target, n.parent) {
                ("", Some(p)) if op == crate::vm::opcode::Op::Syscall => self.ast[p].name(),
                (t, _) => t,
            };
            if !note.is_empty() {
                line = format!("{line:<28} ; {note}");
            }
            out.push_str(&line);
            out.push('\n');
        });
        out
    }

    pub fn dump_ast(&self) -> String {
        self.ast.dump(self.root)
    }

    pub fn ast_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.ast)
    }
}

/// Compile `source` against the syscalls in `registry`.
pub fn compile(source: &str, registry: &Registry) -> Result<Compilation, CompileError> {
    compile_with_sink(source, registry, &mut |_: Span, _: &str| {})
}

/// Like [`compile`], additionally reporting every diagnostic to `sink`.
/// Parse errors are all reported; later passes stop at their first error.
pub fn compile_with_sink(
    source: &str,
    registry: &Registry,
    sink: &mut dyn DiagnosticSink,
) -> Result<Compilation, CompileError> {
    match build(source, registry) {
        Ok(c) => Ok(c),
        Err(mut errors) => {
            for e in &errors {
                sink.report(e.span, &e.message);
            }
            Err(errors.swap_remove(0))
        }
    }
}

fn build(source: &str, registry: &Registry) -> Result<Compilation, Vec<CompileError>> {
    let prelude = registry.headers();
    let offset = prelude.len();
    let full = format!("{prelude}{source}");
    let rebase = |mut e: CompileError| {
        if e.span.end <= offset {
            e.message = format!("{} (in syscall header)", e.message);
            e.span = Span::UNKNOWN;
        } else {
            e.span = Span { start: e.span.start.saturating_sub(offset), end: e.span.end - offset };
        }
        e
    };

    let tokens = crate::lexer::lex(&full).map_err(|e| vec![rebase(e.into())])?;
    let (mut ast, root, errors) = Parser::from_lexed(tokens).parse_program();
    if !errors.is_empty() {
        return Err(errors.into_iter().map(|e| rebase(e.into())).collect());
    }
    ast.rebase_spans(offset);
    log::debug!("parsed {} nodes", ast.len());

    let one = |e: CompileError| vec![e];
    prepare::run(&mut ast, root);
    resolve::run(&mut ast, root, registry).map_err(one)?;
    log::debug!("resolved symbols");
    layout::run(&mut ast, root).map_err(one)?;
    let globals_size = place::run(&mut ast, root).map_err(one)?;
    log::debug!("placed storage: {globals_size} global cells");
    codegen::run(&mut ast, root).map_err(one)?;
    let bytecode = fixup::run(&mut ast, root, globals_size).map_err(one)?;
    log::debug!("emitted {} bytes, {} nodes", bytecode.len(), ast.len());

    Ok(Compilation { ast, root, bytecode, globals_size })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vm::{Vm, VmErrorKind, fixed};

    pub(crate) fn compile_ok(source: &str) -> Compilation {
        let registry = Registry::with_builtins();
        match compile(source, &registry) {
            Ok(c) => c,
            Err(e) => panic!("compile failed: {e} ({}) at {:?}", e.code, e.span),
        }
    }

    pub(crate) fn compile_err(source: &str) -> CompileError {
        let registry = Registry::with_builtins();
        compile(source, &registry).expect_err("expected a compile error")
    }

    pub(crate) fn run(source: &str) -> Result<i32, crate::vm::VmError> {
        let registry = Registry::with_builtins();
        let c = compile(source, &registry).unwrap_or_else(|e| panic!("compile failed: {e} ({})", e.code));
        let mut vm = Vm::new(&c.bytecode, 1024, &registry).unwrap();
        vm.run_main()
    }

    pub(crate) fn run_int(source: &str) -> i32 {
        fixed::to_int(run(source).unwrap())
    }

    #[test]
    fn returns_forty_two() {
        assert_eq!(run("fn main(){ return 20*2+2; }"), Ok(0x002A_0000));
    }

    #[test]
    fn global_scenario() {
        let c = compile_ok("var x; fn main(){ x=5; return x+1; }");
        assert_eq!(c.globals_size, 1);
        assert_eq!(&c.bytecode[0..4], &1u32.to_le_bytes());
        assert_eq!(&c.bytecode[4..8], &1u32.to_le_bytes());
        assert_eq!(run("var x; fn main(){ x=5; return x+1; }"), Ok(6 << 16));
    }

    #[test]
    fn undeclared_call_is_undefined_symbol() {
        let e = compile_err("fn main(){ return foo(); }");
        assert_eq!(e.code, "GL-R001");
        assert!(e.message.contains("undefined symbol"), "{}", e.message);
    }

    #[test]
    fn error_spans_point_into_user_source() {
        let src = "fn main() {\n  return y;\n}";
        let e = compile_err(src);
        assert_eq!(&src[e.span.start..e.span.end], "y");
    }

    #[test]
    fn sink_receives_every_parse_error() {
        let registry = Registry::with_builtins();
        let mut seen = Vec::new();
        let mut sink = |span: Span, msg: &str| seen.push((span, msg.to_string()));
        let r = compile_with_sink("x = ;\ny = );", &registry, &mut sink);
        assert!(r.is_err());
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn top_level_runs_before_main() {
        assert_eq!(run_int("var g = 4; fn main() { return g * 2; }"), 8);
    }

    #[test]
    fn program_without_main_returns_zero() {
        assert_eq!(run("var g = 3;"), Ok(0));
    }

    #[test]
    fn function_address_and_listing() {
        let c = compile_ok("fn helper(a) { return a; } fn main() { return helper(1); }");
        let addr = c.function_address("helper").unwrap();
        assert!(addr > 0);
        assert_eq!(c.function_arity("helper"), Some(1));
        assert_eq!(c.function_arity("main"), Some(0));
        assert_eq!(c.function_arity("missing"), None);
        let listing = c.listing();
        assert!(listing.contains("helper:"));
        assert!(listing.contains(&format!("CALL        {addr}")), "{listing}");
        assert!(listing.contains("; helper"));
    }

    #[test]
    fn runtime_error_maps_to_source() {
        let src = "fn main() {\n  var a[2];\n  return a[5];\n}";
        let registry = Registry::with_builtins();
        let c = compile(src, &registry).unwrap();
        let mut vm = Vm::new(&c.bytecode, 256, &registry).unwrap();
        let err = vm.run_main().unwrap_err();
        assert_eq!(err.kind, VmErrorKind::OutOfBounds);
        let span = c.span_for_pc(err.pc).unwrap();
        assert_eq!(&src[span.start..span.end], "[5]");
    }

    #[test]
    fn dump_and_json() {
        let c = compile_ok("fn main() { return 1; }");
        assert!(c.dump_ast().contains("FuncDef 'main'"));
        let json = c.ast_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(v.as_array().is_some_and(|a| !a.is_empty()));
    }
}
