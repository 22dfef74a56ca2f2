use crate::syscall::Registry;

pub mod fixed;
pub mod opcode;

use opcode::{ArgClass, Op};

/// Bytecode format version written to and checked against every image.
pub const VERSION: u32 = 1;
pub const HEADER_LEN: usize = 8;
/// Tagged addresses carry a 16-bit position, so this is the hard ceiling.
pub const MAX_STACK_WORDS: usize = 0xffff;
/// Return address pushed by the host for the outermost call.
const NO_CALLER: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VmErrorKind {
    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("unknown opcode")]
    UnknownOpcode,
    #[error("array or struct access out of bounds")]
    OutOfBounds,
    #[error("division by zero")]
    DivideByZero,
    #[error("internal error")]
    Internal,
}

impl VmErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            VmErrorKind::StackOverflow => "GL-V001",
            VmErrorKind::StackUnderflow => "GL-V002",
            VmErrorKind::UnknownOpcode => "GL-V003",
            VmErrorKind::OutOfBounds => "GL-V004",
            VmErrorKind::DivideByZero => "GL-V005",
            VmErrorKind::Internal => "GL-V006",
        }
    }
}

/// A runtime error and the address of the instruction that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at pc {pc}")]
pub struct VmError {
    pub kind: VmErrorKind,
    pub pc: usize,
}

type VmResult<T> = Result<T, VmError>;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("program image is {len} bytes; the header alone needs {header}", header = HEADER_LEN)]
    Truncated { len: usize },
    #[error("bytecode version {found} is not supported (expected {expected})", expected = VERSION)]
    BadVersion { found: u32 },
    #[error("program needs {globals} global cells but the stack holds {stack}")]
    GlobalsTooLarge { globals: usize, stack: usize },
    #[error("stack of {0} words exceeds the addressable maximum of {max}", max = MAX_STACK_WORDS)]
    StackTooLarge(usize),
}

/// Header for an image: version and global area size, little endian.
pub fn image_header(globals: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&globals.to_le_bytes());
    out
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ── Virtual machine ──────────────────────────────────────────────────

/// One executing program. Not reentrant across threads; syscalls that call
/// back into the script reuse this instance and its stack.
pub struct Vm<'r> {
    code: Vec<u8>,
    globals: usize,
    max_stack: usize,
    stack: Vec<i32>,
    pc: usize,
    bp: usize,
    ap: usize,
    registry: &'r Registry,
    failed: Option<VmError>,
}

impl<'r> Vm<'r> {
    pub fn new(image: &[u8], stack_words: usize, registry: &'r Registry) -> Result<Self, LoadError> {
        if image.len() < HEADER_LEN {
            return Err(LoadError::Truncated { len: image.len() });
        }
        let version = read_u32(&image[0..4]);
        if version != VERSION {
            return Err(LoadError::BadVersion { found: version });
        }
        if stack_words > MAX_STACK_WORDS {
            return Err(LoadError::StackTooLarge(stack_words));
        }
        let globals = read_u32(&image[4..8]) as usize;
        if globals > stack_words {
            return Err(LoadError::GlobalsTooLarge { globals, stack: stack_words });
        }
        log::debug!("vm: {} code bytes, {} globals, {} stack words", image.len() - HEADER_LEN, globals, stack_words);
        Ok(Vm {
            code: image[HEADER_LEN..].to_vec(),
            globals,
            max_stack: stack_words,
            stack: vec![0; globals],
            pc: 0,
            bp: globals,
            ap: globals,
            registry,
            failed: None,
        })
    }

    /// Back to the freshly loaded state: globals zeroed, no frames.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.stack.resize(self.globals, 0);
        self.pc = 0;
        self.bp = self.globals;
        self.ap = self.globals;
        self.failed = None;
    }

    pub fn stack_pointer(&self) -> usize {
        self.stack.len()
    }

    pub fn read_cell(&self, position: usize) -> Option<i32> {
        self.stack.get(position).copied()
    }

    pub fn globals_size(&self) -> usize {
        self.globals
    }

    /// Build an error located at the instruction being executed.
    pub fn fault(&self, kind: VmErrorKind) -> VmError {
        VmError { kind, pc: self.pc }
    }

    /// Run the top-level function at address 0.
    pub fn run_main(&mut self) -> VmResult<i32> {
        self.run_function(0, &[])
    }

    /// Call the function at `address` with `args` and run it to completion.
    /// May be called from inside a syscall handler; the nested call runs on
    /// top of the current stack.
    pub fn run_function(&mut self, address: usize, args: &[i32]) -> VmResult<i32> {
        if let Some(e) = self.failed {
            return Err(e);
        }
        let sp_before = self.stack.len();
        let saved_pc = self.pc;
        log::debug!("vm: call {address} with {} args, sp {sp_before}", args.len());

        let result = self.call_from_host(address, args).and_then(|v| {
            if self.stack.len() != sp_before {
                log::warn!("vm: stack pointer {} after call, expected {sp_before}", self.stack.len());
                return Err(self.fault(VmErrorKind::Internal));
            }
            Ok(v)
        });
        match result {
            Ok(v) => {
                self.pc = saved_pc;
                log::debug!("vm: call {address} returned {}", fixed::format(v));
                Ok(v)
            }
            Err(e) => {
                self.failed = Some(e);
                Err(e)
            }
        }
    }

    fn call_from_host(&mut self, address: usize, args: &[i32]) -> VmResult<i32> {
        for &a in args {
            self.push(a)?;
        }
        self.push(self.ap as i32)?;
        self.push(self.bp as i32)?;
        self.push(NO_CALLER)?;
        self.bp = self.stack.len();
        self.ap = self.bp;
        self.pc = address;
        self.execute()
    }

    // ---- Stack primitives ----

    fn push(&mut self, v: i32) -> VmResult<()> {
        if self.stack.len() >= self.max_stack {
            return Err(self.fault(VmErrorKind::StackOverflow));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<i32> {
        self.stack.pop().ok_or_else(|| self.fault(VmErrorKind::StackUnderflow))
    }

    /// Grow the stack by `n` zeroed cells.
    fn reserve(&mut self, n: usize) -> VmResult<usize> {
        let base = self.stack.len();
        if base + n > self.max_stack {
            return Err(self.fault(VmErrorKind::StackOverflow));
        }
        self.stack.resize(base + n, 0);
        Ok(base)
    }

    fn pop_index(&mut self) -> VmResult<usize> {
        let v = self.pop()?;
        usize::try_from(v).map_err(|_| self.fault(VmErrorKind::Internal))
    }

    /// Frame-relative slot to absolute position.
    fn frame_slot(&self, offset: i32) -> VmResult<usize> {
        let pos = self.bp as i64 + offset as i64;
        if pos < 0 || pos as usize >= self.stack.len() {
            return Err(self.fault(VmErrorKind::Internal));
        }
        Ok(pos as usize)
    }

    fn global_slot(&self, offset: i32) -> VmResult<usize> {
        let pos = offset as usize;
        if offset < 0 || pos >= self.globals {
            return Err(self.fault(VmErrorKind::Internal));
        }
        Ok(pos)
    }

    /// Resolve a tagged address to a stack position, checking it lies in
    /// the live stack.
    fn cell(&self, addr: i32) -> VmResult<usize> {
        let pos = fixed::addr_position(addr);
        if fixed::addr_size(addr) == 0 || pos >= self.stack.len() {
            return Err(self.fault(VmErrorKind::OutOfBounds));
        }
        Ok(pos)
    }

    /// Narrow a tagged address to `size` cells starting `offset` cells in.
    fn sub_address(&self, addr: i32, offset: i64, size: usize) -> VmResult<i32> {
        let limit = fixed::addr_size(addr) as i64;
        if offset < 0 || offset + size as i64 > limit {
            return Err(self.fault(VmErrorKind::OutOfBounds));
        }
        Ok(fixed::make_addr(fixed::addr_position(addr) + offset as usize, size))
    }

    // ---- Decoding ----

    fn fetch(&mut self) -> VmResult<(Op, i32)> {
        let at = self.pc;
        let byte = *self.code.get(at).ok_or_else(|| self.fault(VmErrorKind::Internal))?;
        let op = Op::from_byte(byte).ok_or_else(|| self.fault(VmErrorKind::UnknownOpcode))?;
        let width = op.arg_class().width();
        let bytes = self
            .code
            .get(at + 1..at + 1 + width)
            .ok_or_else(|| self.fault(VmErrorKind::Internal))?;
        let arg = match op.arg_class() {
            ArgClass::Stripped => return Err(self.fault(VmErrorKind::UnknownOpcode)),
            ArgClass::None => 0,
            ArgClass::U8 => bytes[0] as i32,
            ArgClass::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
            ArgClass::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as i32,
            ArgClass::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        };
        Ok((op, arg))
    }

    // ---- Execution loop ----

    fn execute(&mut self) -> VmResult<i32> {
        loop {
            let at = self.pc;
            let (op, arg) = self.fetch()?;
            log::trace!("{at:5} {:<11} {arg:<8} sp={} bp={}", op.mnemonic(), self.stack.len(), self.bp);
            let next = at + op.encoded_len();
            // pc stays on this instruction until it completes, so faults
            // raised below report it
            let mut goto = next;

            match op {
                Op::Nop => {}
                Op::PushI => self.push(fixed::from_int(arg))?,
                Op::PushR => self.push(arg)?,
                Op::Pop => {
                    self.pop()?;
                }
                Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Teq | Op::Tneq | Op::Tl | Op::Tg
                | Op::Tleq | Op::Tgeq | Op::LAnd | Op::LOr | Op::BAnd | Op::BOr | Op::BXor => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    let v = fixed::binary(op, a, b).ok_or(self.fault(VmErrorKind::DivideByZero))?;
                    self.push(v)?;
                }
                Op::LNot | Op::BNot => {
                    let a = self.pop()?;
                    let v = fixed::unary(op, a).ok_or(self.fault(VmErrorKind::Internal))?;
                    self.push(v)?;
                }
                Op::Jmp => goto = arg as usize,
                Op::Jz => {
                    if self.pop()? == 0 {
                        goto = arg as usize;
                    }
                }
                Op::Enter => {
                    self.reserve(arg as usize)?;
                }
                Op::Call => {
                    self.push(self.ap as i32)?;
                    self.push(self.bp as i32)?;
                    self.push(next as i32)?;
                    self.bp = self.stack.len();
                    self.ap = self.bp;
                    goto = arg as usize;
                }
                Op::Return => {
                    let v = self.pop()?;
                    if self.bp > self.stack.len() {
                        return Err(self.fault(VmErrorKind::StackUnderflow));
                    }
                    self.stack.truncate(self.bp);
                    let ret = self.pop()?;
                    self.bp = self.pop_index()?;
                    self.ap = self.pop_index()?;
                    let argc = arg as usize;
                    if argc > self.stack.len() {
                        return Err(self.fault(VmErrorKind::StackUnderflow));
                    }
                    self.stack.truncate(self.stack.len() - argc);
                    if ret == NO_CALLER {
                        return Ok(v);
                    }
                    goto = usize::try_from(ret).map_err(|_| self.fault(VmErrorKind::Internal))?;
                    self.push(v)?;
                }
                Op::Syscall => {
                    let (argc, handle) = opcode::split_syscall_operand(arg);
                    let registry = self.registry;
                    let entry = registry.entry(handle).ok_or(self.fault(VmErrorKind::Internal))?;
                    // handlers index their arguments by arity
                    if argc != entry.arity {
                        return Err(self.fault(VmErrorKind::Internal));
                    }
                    if argc > self.stack.len() {
                        return Err(self.fault(VmErrorKind::StackUnderflow));
                    }
                    let args = self.stack.split_off(self.stack.len() - argc);
                    let v = (entry.handler)(self, &args)?;
                    self.push(v)?;
                }
                Op::Lea => {
                    let pos = self.frame_slot(arg)?;
                    self.push(fixed::make_addr(pos, 1))?;
                }
                Op::LeaG => {
                    let pos = self.global_slot(arg)?;
                    self.push(fixed::make_addr(pos, 1))?;
                }
                Op::LdL => {
                    let pos = self.frame_slot(arg)?;
                    self.push(self.stack[pos])?;
                }
                Op::LdG => {
                    let pos = self.global_slot(arg)?;
                    self.push(self.stack[pos])?;
                }
                Op::StL => {
                    let v = self.pop()?;
                    let pos = self.frame_slot(arg)?;
                    self.stack[pos] = v;
                }
                Op::StG => {
                    let v = self.pop()?;
                    let pos = self.global_slot(arg)?;
                    self.stack[pos] = v;
                }
                Op::Deref => {
                    let addr = self.pop()?;
                    let pos = self.cell(addr)?;
                    self.push(self.stack[pos])?;
                }
                Op::WrVar => {
                    let v = self.pop()?;
                    let addr = self.pop()?;
                    let pos = self.cell(addr)?;
                    self.stack[pos] = v;
                }
                Op::PreAdd | Op::PostAdd => {
                    let addr = self.pop()?;
                    let pos = self.cell(addr)?;
                    let old = self.stack[pos];
                    let new = old.wrapping_add(arg);
                    self.stack[pos] = new;
                    self.push(if op == Op::PreAdd { new } else { old })?;
                }
                Op::ArrayIdx => {
                    let index = fixed::to_int(self.pop()?);
                    let addr = self.pop()?;
                    let size = arg as usize;
                    let elem = self.sub_address(addr, index as i64 * size as i64, size)?;
                    self.push(elem)?;
                }
                Op::StructIdx => {
                    let offset = fixed::to_int(self.pop()?);
                    let addr = self.pop()?;
                    let member = self.sub_address(addr, offset as i64, arg as usize)?;
                    self.push(member)?;
                }
                Op::Alloc => {
                    let slot = self.pop()?;
                    let pos = self.cell(slot)?;
                    let size = arg as usize;
                    let base = self.reserve(size)?;
                    self.stack[pos] = fixed::make_addr(base, size);
                }
                Op::ScopeEnter => {
                    self.push(self.ap as i32)?;
                    self.ap = self.stack.len();
                }
                Op::ScopeLeave => {
                    if self.ap > self.stack.len() {
                        return Err(self.fault(VmErrorKind::StackUnderflow));
                    }
                    self.stack.truncate(self.ap);
                    self.ap = self.pop_index()?;
                }
            }
            self.pc = goto;
        }
    }

    // ---- Introspection ----

    /// One line per live cell, with frame markers.
    pub fn dump_stack(&self) -> String {
        let mut out = format!("stack: {} cells, bp={} ap={}\n", self.stack.len(), self.bp, self.ap);
        for (i, v) in self.stack.iter().enumerate() {
            let mut marks = String::new();
            if i < self.globals {
                marks.push_str(" global");
            }
            if i == self.bp {
                marks.push_str(" <bp");
            }
            if i == self.ap {
                marks.push_str(" <ap");
            }
            out.push_str(&format!("{i:5}: {:08x} {:>12}{marks}\n", *v as u32, fixed::format(*v)));
        }
        out
    }
}
