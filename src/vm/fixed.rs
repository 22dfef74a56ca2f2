//! 16.16 fixed-point helpers shared by the VM and the constant folder.
//!
//! Every value the VM manipulates is an `i32` whose low 16 bits hold the
//! fraction. Compile-time folding goes through the same functions so a
//! folded constant is bit-identical to what the VM would have computed.

use super::opcode::Op;

pub const ONE: i32 = 1 << 16;
pub const FRAC_MASK: i32 = 0xffff;

pub fn from_int(i: i32) -> i32 {
    ((i as u32) << 16) as i32
}

/// Integer part, rounding toward negative infinity.
pub fn to_int(v: i32) -> i32 {
    v >> 16
}

pub fn from_f64(f: f64) -> i32 {
    (f * ONE as f64) as i32
}

pub fn to_f64(v: i32) -> f64 {
    v as f64 / ONE as f64
}

pub fn truth(b: bool) -> i32 {
    if b { ONE } else { 0 }
}

pub fn mul(a: i32, b: i32) -> i32 {
    ((a as i64 * b as i64) >> 16) as i32
}

/// `None` on division by zero.
pub fn div(a: i32, b: i32) -> Option<i32> {
    if b == 0 {
        return None;
    }
    Some((((a as i64) << 16) / b as i64) as i32)
}

pub fn rem(a: i32, b: i32) -> Option<i32> {
    if b == 0 {
        return None;
    }
    Some(a.wrapping_rem(b))
}

pub fn floor(v: i32) -> i32 {
    v & !FRAC_MASK
}

pub fn ceil(v: i32) -> i32 {
    floor(v.wrapping_add(FRAC_MASK))
}

/// Apply a two-operand opcode. Returns `None` for division by zero and for
/// opcodes that do not take two operands.
pub fn binary(op: Op, a: i32, b: i32) -> Option<i32> {
    let v = match op {
        Op::Add => a.wrapping_add(b),
        Op::Sub => a.wrapping_sub(b),
        Op::Mul => mul(a, b),
        Op::Div => return div(a, b),
        Op::Mod => return rem(a, b),
        Op::Teq => truth(a == b),
        Op::Tneq => truth(a != b),
        Op::Tl => truth(a < b),
        Op::Tg => truth(a > b),
        Op::Tleq => truth(a <= b),
        Op::Tgeq => truth(a >= b),
        Op::LAnd => truth(a != 0 && b != 0),
        Op::LOr => truth(a != 0 || b != 0),
        Op::BAnd => a & b,
        Op::BOr => a | b,
        Op::BXor => a ^ b,
        _ => return None,
    };
    Some(v)
}

pub fn unary(op: Op, a: i32) -> Option<i32> {
    match op {
        Op::LNot => Some(truth(a == 0)),
        Op::BNot => Some(!a),
        _ => None,
    }
}

// ── Tagged addresses ─────────────────────────────────────────────────
//
// [ position:16 | size:16 ]

pub fn make_addr(position: usize, size: usize) -> i32 {
    (((position as u32) << 16) | (size as u32 & 0xffff)) as i32
}

pub fn addr_position(addr: i32) -> usize {
    (addr as u32 >> 16) as usize
}

pub fn addr_size(addr: i32) -> usize {
    (addr as u32 & 0xffff) as usize
}

/// Human-readable rendering: integers print bare, fractions with up to five
/// decimals and trailing zeros trimmed.
pub fn format(v: i32) -> String {
    if v & FRAC_MASK == 0 {
        return to_int(v).to_string();
    }
    let s = format!("{:.5}", to_f64(v));
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        assert_eq!(from_int(42), 0x002A_0000);
        assert_eq!(to_int(from_int(-7)), -7);
    }

    #[test]
    fn mul_keeps_fraction() {
        let half = ONE / 2;
        assert_eq!(mul(from_int(3), half), from_int(3) / 2);
        assert_eq!(mul(from_int(-4), from_int(5)), from_int(-20));
    }

    #[test]
    fn div_widens_dividend() {
        assert_eq!(div(from_int(6), from_int(3)), Some(from_int(2)));
        assert_eq!(div(ONE, from_int(4)), Some(ONE / 4));
        assert_eq!(div(ONE, 0), None);
    }

    #[test]
    fn floor_and_ceil() {
        let v = from_f64(2.25);
        assert_eq!(floor(v), from_int(2));
        assert_eq!(ceil(v), from_int(3));
        assert_eq!(ceil(from_int(5)), from_int(5));
        assert_eq!(floor(from_f64(-1.5)), from_int(-2));
    }

    #[test]
    fn comparisons_yield_one_or_zero() {
        assert_eq!(binary(Op::Tl, 1, 2), Some(ONE));
        assert_eq!(binary(Op::Tgeq, 1, 2), Some(0));
        assert_eq!(unary(Op::LNot, 0), Some(ONE));
        assert_eq!(binary(Op::Jmp, 1, 2), None);
    }

    #[test]
    fn tagged_address_fields() {
        let a = make_addr(40000, 12);
        assert_eq!(addr_position(a), 40000);
        assert_eq!(addr_size(a), 12);
    }

    #[test]
    fn format_values() {
        assert_eq!(format(from_int(42)), "42");
        assert_eq!(format(from_int(-3)), "-3");
        assert_eq!(format(from_f64(1.5)), "1.5");
        assert_eq!(format(ONE / 4), "0.25");
    }
}
