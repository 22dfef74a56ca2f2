/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,  // one line, for `glint explain --list`
    pub long: &'static str,   // full explanation for `glint explain CODE`
}

/// All stable error codes.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Lexer ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "GL-L001",
        short: "unexpected character",
        long: r#"## GL-L001: unexpected character

A character was found that cannot start any token. There are no string
or character literals, and `$`, `@`, `#` and backticks have no meaning.

**Example:**

    var x = 1 @ 2;
"#,
    },
    ErrorEntry {
        code: "GL-L002",
        short: "numeric literal out of range",
        long: r#"## GL-L002: numeric literal out of range

Numbers are 16.16 fixed point, so the integer part of a literal must be
at most 65535 (`0xFFFF`). Values from 32768 upward wrap into the sign
bit, which is how bit patterns are written.

**Example that triggers this:**

    var big = 70000;
"#,
    },

    // ── Parser ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "GL-P001",
        short: "unexpected token",
        long: r#"## GL-P001: unexpected token

The parser expected a particular token, such as `;` or `)`, and found
something else. The most common cause is a missing semicolon at the end
of the previous statement.

**Example:**

    var x
    var y;
"#,
    },
    ErrorEntry {
        code: "GL-P002",
        short: "unexpected end of file",
        long: r#"## GL-P002: unexpected end of file

The source ended in the middle of a construct, usually because a `}` or
`)` is missing.

**Example:**

    fn main() { return 1;
"#,
    },
    ErrorEntry {
        code: "GL-P003",
        short: "expected an expression",
        long: r#"## GL-P003: expected an expression

A value was required here: a number, a variable, a call or a
parenthesised expression.

**Example:**

    x = ;
"#,
    },
    ErrorEntry {
        code: "GL-P004",
        short: "target is not assignable",
        long: r#"## GL-P004: target is not assignable

Only variables, array elements and struct members can be assigned to or
incremented. Call results and arithmetic are values, not locations.

**Example:**

    f() = 3;
    (a + 1)++;
"#,
    },
    ErrorEntry {
        code: "GL-P005",
        short: "item not allowed here",
        long: r#"## GL-P005: item not allowed here

Functions, structs and `syscalldef` declarations may only appear at top
level. Variable declarations may not be the bare body of `if`, `while`
or `for`; wrap them in a block.

**Example:**

    fn outer() { fn inner() { } }
    if (x) var y;
"#,
    },
    ErrorEntry {
        code: "GL-P006",
        short: "struct member with initializer",
        long: r#"## GL-P006: struct member with initializer

Struct members describe layout only and cannot be given initial values.

**Example:**

    struct point { var x = 0; }
"#,
    },

    // ── Resolver ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "GL-R001",
        short: "undefined symbol",
        long: r#"## GL-R001: undefined symbol

A name was used that is not declared in any enclosing scope, is not a
function and is not a syscall the host provides. Block-local variables
stop being visible at the end of their block.

**Example:**

    fn main() { { var t; } return t; }
"#,
    },
    ErrorEntry {
        code: "GL-R002",
        short: "not a function",
        long: r#"## GL-R002: not a function

A variable or struct type was called as if it were a function.

**Example:**

    var speed;
    fn main() { return speed(); }
"#,
    },
    ErrorEntry {
        code: "GL-R003",
        short: "duplicate declaration",
        long: r#"## GL-R003: duplicate declaration

The same name was declared twice in one scope. Top-level functions,
structs, globals and syscalls share a single scope, so a function cannot
reuse the name of a host syscall. Parameters and the body's top-level
locals share a scope as well, and so do the members of one struct.

**Example:**

    fn f(a) { var a; }
    struct p { var x; var x; }
"#,
    },
    ErrorEntry {
        code: "GL-R004",
        short: "function used as a value",
        long: r#"## GL-R004: function used as a value

A function name without a call can only be passed directly as a syscall
argument, where it becomes the function's address for the host to call
back. Anywhere else it is an error.

**Example:**

    fn tick() { return 0; }
    fn main() { var t = tick; }
"#,
    },
    ErrorEntry {
        code: "GL-R005",
        short: "wrong number of syscall arguments",
        long: r#"## GL-R005: wrong number of syscall arguments

Each syscall is registered with a fixed arity, and calls must match it.

**Example:**

    fn main() { return abs(1, 2); }
"#,
    },
    ErrorEntry {
        code: "GL-R006",
        short: "not a struct type",
        long: r#"## GL-R006: not a struct type

The name after `:` in a declaration must be a struct.

**Example:**

    var q;
    var p: q;
"#,
    },
    ErrorEntry {
        code: "GL-R007",
        short: "not a variable",
        long: r#"## GL-R007: not a variable

A function, struct or syscall name was used where a variable is
required, for example as an assignment target.

**Example:**

    fn f() { }
    fn main() { f = 1; }
"#,
    },

    // ── Types and layout ─────────────────────────────────────────────────────
    ErrorEntry {
        code: "GL-T001",
        short: "array size must be const",
        long: r#"## GL-T001: array size must be const

Array dimensions are fixed at compile time. A dimension may be any
expression that folds to a constant, but it may not read variables.

**Example:**

    var n = 3;
    var a[n];
"#,
    },
    ErrorEntry {
        code: "GL-T002",
        short: "array size must be positive",
        long: r#"## GL-T002: array size must be positive

A dimension folded to zero or a negative number.

**Example:**

    var a[2 - 2];
"#,
    },
    ErrorEntry {
        code: "GL-T003",
        short: "value is not indexable",
        long: r#"## GL-T003: value is not indexable

`[...]` was applied to something that is not an array at that point of
the access chain.

**Example:**

    var x;
    fn main() { return x[1]; }
"#,
    },
    ErrorEntry {
        code: "GL-T004",
        short: "member access on a non-struct",
        long: r#"## GL-T004: member access on a non-struct

`.name` was applied to something that is not a struct.

**Example:**

    var x[2];
    fn main() { return x.a; }
"#,
    },
    ErrorEntry {
        code: "GL-T005",
        short: "unknown struct member",
        long: r#"## GL-T005: unknown struct member

The struct has no member with that name.

**Example:**

    struct point { var x, y; }
    var p: point;
    fn main() { return p.z; }
"#,
    },
    ErrorEntry {
        code: "GL-T006",
        short: "wrong number of arguments",
        long: r#"## GL-T006: wrong number of arguments

A user function was called with a different number of arguments than it
declares.

**Example:**

    fn f(a) { return a; }
    fn main() { return f(); }
"#,
    },
    ErrorEntry {
        code: "GL-T007",
        short: "argument shape mismatch",
        long: r#"## GL-T007: argument shape mismatch

Array and struct parameters are passed by reference, and the argument
must be a variable of the same shape: equal dimensions, or any length
for an open `[]` first dimension, and the same struct type.

**Example:**

    fn f(a[3]) { return 0; }
    var b[4];
    fn main() { return f(b); }
"#,
    },
    ErrorEntry {
        code: "GL-T008",
        short: "scalar value required",
        long: r#"## GL-T008: scalar value required

Arithmetic, conditions, return values and assignments work on single
values. A whole array or struct can only be passed to a function or a
syscall.

**Example:**

    var a[2];
    fn main() { return a + 1; }
"#,
    },
    ErrorEntry {
        code: "GL-T009",
        short: "recursive struct",
        long: r#"## GL-T009: recursive struct

A struct contains itself, directly or through other structs, so it would
have infinite size.

**Example:**

    struct node { var next: node; }
"#,
    },
    ErrorEntry {
        code: "GL-T010",
        short: "open array dimension not allowed",
        long: r#"## GL-T010: open array dimension not allowed

Only the first dimension of a function parameter may be written `[]`.
Variables, struct members and inner dimensions need a size.

**Example:**

    var a[];
    fn f(m[][]) { return 0; }
"#,
    },
    ErrorEntry {
        code: "GL-T011",
        short: "object too large",
        long: r#"## GL-T011: object too large

Addresses carry a 16-bit size, so no array or struct can exceed 65535
cells.

**Example:**

    var grid[300][300];
"#,
    },

    // ── Emitter ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "GL-E001",
        short: "program too large",
        long: r#"## GL-E001: program too large

An instruction operand does not fit its encoding. Code addresses and
global offsets are 16 bits, frame offsets are signed 16 bits, and a
function can drop at most 255 arguments.
"#,
    },
    ErrorEntry {
        code: "GL-E002",
        short: "internal compiler error",
        long: r#"## GL-E002: internal compiler error

The compiler reached a state it should not. This is a bug in glint, not
in the script.
"#,
    },

    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "GL-V001",
        short: "stack overflow",
        long: r#"## GL-V001: stack overflow

The VM stack is full. Deep or unbounded recursion is the usual cause;
`glint run --stack` raises the limit up to 65535 cells.
"#,
    },
    ErrorEntry {
        code: "GL-V002",
        short: "stack underflow",
        long: r#"## GL-V002: stack underflow

An instruction needed more values than the stack held. Compiled scripts
do not do this; hand-made or corrupted bytecode can.
"#,
    },
    ErrorEntry {
        code: "GL-V003",
        short: "unknown opcode",
        long: r#"## GL-V003: unknown opcode

The byte at the program counter is not an instruction. The bytecode is
corrupt or was produced for a different format version.
"#,
    },
    ErrorEntry {
        code: "GL-V004",
        short: "access out of bounds",
        long: r#"## GL-V004: access out of bounds

An array index or member offset fell outside the object it was applied
to. Every element access is checked against the size carried in the
object's address.

**Example:**

    fn main() { var a[3]; return a[3]; }
"#,
    },
    ErrorEntry {
        code: "GL-V005",
        short: "division by zero",
        long: r#"## GL-V005: division by zero

`/` or `%` was evaluated with a zero right-hand side.
"#,
    },
    ErrorEntry {
        code: "GL-V006",
        short: "internal VM error",
        long: r#"## GL-V006: internal VM error

The VM found an inconsistent state: a jump outside the code, a frame
slot outside the stack, an unbalanced call. For compiled scripts this
indicates a bug; a syscall handler that misuses the VM can also cause it.
"#,
    },
    ErrorEntry {
        code: "GL-V007",
        short: "bytecode cannot be loaded",
        long: r#"## GL-V007: bytecode cannot be loaded

The image is truncated, has the wrong format version, or needs more
global cells than the configured stack provides.
"#,
    },
];

/// Look up an error entry by code (e.g. `"GL-T001"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}
