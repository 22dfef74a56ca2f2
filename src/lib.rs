//! glint: a small scripting language compiled to bytecode for a 16.16
//! fixed-point stack VM.
//!
//! ```no_run
//! use glint::{compiler, syscall::Registry, vm::Vm};
//!
//! let registry = Registry::with_builtins();
//! let program = compiler::compile("fn main() { return abs(0 - 3); }", &registry)?;
//! let mut vm = Vm::new(&program.bytecode, 1024, &registry)?;
//! let result = vm.run_main()?;
//! assert_eq!(glint::vm::fixed::to_int(result), 3);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod compiler;
pub mod diagnostic;
pub mod lexer;
pub mod parser;
pub mod syscall;
pub mod vm;

pub use compiler::{Compilation, CompileError, DiagnosticSink, compile, compile_with_sink};
pub use syscall::{Registry, SyscallList};
pub use vm::{LoadError, Vm, VmError, VmErrorKind};
