//! Host functions callable from scripts.
//!
//! A [`Registry`] is an ordered list of named entries. Entries are added in
//! lists; each list starts at the next free handle and contributes a header
//! of `syscalldef` declarations that is compiled ahead of every script. The
//! compiler resolves names to handles and the VM dispatches on the same
//! handles, so one registry must be shared by both sides.

use crate::vm::opcode::{SYSCALL_MAX_ARGS, SYSCALL_MAX_HANDLE};
use crate::vm::{Vm, VmError, fixed};

pub type Handler = Box<dyn Fn(&mut Vm<'_>, &[i32]) -> Result<i32, VmError>>;

pub struct SyscallEntry {
    pub name: String,
    pub arity: usize,
    pub handler: Handler,
}

impl std::fmt::Debug for SyscallEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyscallEntry")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

/// A batch of syscalls registered together.
#[derive(Debug)]
pub struct SyscallList {
    name: String,
    entries: Vec<SyscallEntry>,
    extra_header: String,
}

impl SyscallList {
    pub fn new(name: impl Into<String>) -> Self {
        SyscallList {
            name: name.into(),
            entries: Vec::new(),
            extra_header: String::new(),
        }
    }

    pub fn entry<F>(mut self, name: impl Into<String>, arity: usize, handler: F) -> Self
    where
        F: Fn(&mut Vm<'_>, &[i32]) -> Result<i32, VmError> + 'static,
    {
        self.entries.push(SyscallEntry {
            name: name.into(),
            arity,
            handler: Box::new(handler),
        });
        self
    }

    /// Source text appended to the generated `syscalldef` lines.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.extra_header = header.into();
        self
    }

    fn header(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            let params: Vec<String> = (0..e.arity).map(|i| format!("a{i}")).collect();
            out.push_str(&format!("syscalldef {}({});\n", e.name, params.join(", ")));
        }
        out.push_str(&self.extra_header);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("syscall '{name}' is already registered")]
    Duplicate { name: String },
    #[error("syscall '{name}' takes {arity} arguments; at most {max} are supported", max = SYSCALL_MAX_ARGS)]
    TooManyArgs { name: String, arity: usize },
    #[error("registry is full: at most {max} syscalls are supported", max = SYSCALL_MAX_HANDLE + 1)]
    Full,
}

#[derive(Debug)]
struct ListInfo {
    name: String,
    start: usize,
    header: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    lists: Vec<ListInfo>,
    entries: Vec<SyscallEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry holding the builtin list.
    pub fn with_builtins() -> Self {
        let mut r = Registry::new();
        // the builtin list is well-formed, so this cannot fail
        if let Err(e) = r.add_list(builtins()) {
            log::warn!("builtin syscalls rejected: {e}");
        }
        r
    }

    /// Append a list; returns the handle of its first entry.
    pub fn add_list(&mut self, list: SyscallList) -> Result<usize, RegistryError> {
        for (i, e) in list.entries.iter().enumerate() {
            if e.arity > SYSCALL_MAX_ARGS {
                return Err(RegistryError::TooManyArgs { name: e.name.clone(), arity: e.arity });
            }
            let seen_here = list.entries[..i].iter().any(|o| o.name == e.name);
            if seen_here || self.handle_for_name(&e.name).is_some() {
                return Err(RegistryError::Duplicate { name: e.name.clone() });
            }
        }
        if self.entries.len() + list.entries.len() > SYSCALL_MAX_HANDLE + 1 {
            return Err(RegistryError::Full);
        }

        let start = self.entries.len();
        let header = list.header();
        log::debug!("syscall list '{}': {} entries from handle {}", list.name, list.entries.len(), start);
        self.lists.push(ListInfo { name: list.name, start, header });
        self.entries.extend(list.entries);
        Ok(start)
    }

    pub fn handle_for_name(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    pub fn entry(&self, handle: usize) -> Option<&SyscallEntry> {
        self.entries.get(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declarations of every registered list, in registration order.
    pub fn headers(&self) -> String {
        self.lists.iter().map(|l| l.header.as_str()).collect()
    }

    /// `(list name, first handle)` pairs.
    pub fn lists(&self) -> impl Iterator<Item = (&str, usize)> {
        self.lists.iter().map(|l| (l.name.as_str(), l.start))
    }
}

// ── Builtins ─────────────────────────────────────────────────────────

fn unary(f: fn(f64) -> f64) -> impl Fn(&mut Vm<'_>, &[i32]) -> Result<i32, VmError> {
    move |_, args| Ok(fixed::from_f64(f(fixed::to_f64(args[0]))))
}

pub fn builtins() -> SyscallList {
    SyscallList::new("builtin")
        .entry("abs", 1, |_, a| Ok(a[0].wrapping_abs()))
        .entry("floor", 1, |_, a| Ok(fixed::floor(a[0])))
        .entry("ceil", 1, |_, a| Ok(fixed::ceil(a[0])))
        .entry("clamp", 3, |_, a| Ok(a[0].max(a[1]).min(a[2])))
        .entry("sin", 1, unary(f64::sin))
        .entry("cos", 1, unary(f64::cos))
        .entry("tan", 1, unary(f64::tan))
        .entry("rand", 2, |_, a| {
            let (lo, hi) = (a[0], a[1]);
            if hi <= lo {
                return Ok(lo);
            }
            Ok(fastrand::i32(lo..hi))
        })
        .entry("dump_stack", 0, |vm, _| {
            eprint!("{}", vm.dump_stack());
            Ok(0)
        })
}
