//! Fixed-width bit vectors and Verilog constant arithmetic
//!
//! Values wider than 128 bits, or containing `x`/`z` digits, are not
//! representable and fold to `Symbolic` in the concretizer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and signedness of an expression. Context-determined operands are
/// evaluated at the type their context propagates down, not their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType {
    pub width: u32,
    pub signed: bool,
}

impl ValueType {
    pub const BIT: Self = Self::new(1, false);
    pub const INT: Self = Self::new(32, true);

    pub const fn new(width: u32, signed: bool) -> Self {
        Self { width, signed }
    }

    /// Common type of two context-determined operands: the wider width,
    /// signed only if both are.
    pub fn join(self, other: Self) -> Self {
        Self::new(self.width.max(other.width), self.signed && other.signed)
    }

    /// Type an assignment evaluates its right-hand side at: at least as wide
    /// as the target, with the right-hand side's own signedness.
    pub fn assigned_to(self, target: Self) -> Self {
        Self::new(self.width.max(target.width), self.signed)
    }
}

/// A two-state constant of 1 to 128 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitVector {
    value: u128,
    width: u32,
    signed: bool,
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl BitVector {
    pub const MAX_WIDTH: u32 = 128;

    /// Build a vector, truncating `value` to `width` bits. `None` if the width
    /// is zero or above [`Self::MAX_WIDTH`].
    pub fn new(value: u128, width: u32, signed: bool) -> Option<Self> {
        if width == 0 || width > Self::MAX_WIDTH {
            return None;
        }
        Some(Self {
            value: value & mask(width),
            width,
            signed,
        })
    }

    /// An unsized decimal integer: 32-bit signed.
    pub fn int(value: i64) -> Self {
        Self {
            value: (value as u128) & mask(32),
            width: 32,
            signed: true,
        }
    }

    fn bool(b: bool) -> Self {
        Self {
            value: u128::from(b),
            width: 1,
            signed: false,
        }
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    fn sign_bit(&self) -> bool {
        (self.value >> (self.width - 1)) & 1 == 1
    }

    pub fn is_negative(&self) -> bool {
        self.signed && self.sign_bit()
    }

    /// Value as a mathematical integer, honouring signedness.
    pub fn to_i128(&self) -> Option<i128> {
        if self.is_negative() {
            // Two's complement: value - 2^width
            if self.width == 128 {
                Some(self.value as i128)
            } else {
                Some(self.value as i128 - (1i128 << self.width))
            }
        } else {
            i128::try_from(self.value).ok()
        }
    }

    /// Non-negative value as `u64`, for widths, counts, and indices.
    pub fn to_u64(&self) -> Option<u64> {
        if self.is_negative() {
            return None;
        }
        u64::try_from(self.value).ok()
    }

    /// Minimum number of bits needed to hold the unsigned value (0 for zero).
    pub fn bit_length(&self) -> u32 {
        128 - self.value.leading_zeros()
    }

    pub fn with_signed(self, signed: bool) -> Self {
        Self { signed, ..self }
    }

    /// Truncate or extend to `width` bits; extension copies the sign bit for
    /// signed values and zero-fills otherwise.
    pub fn resize(self, width: u32) -> Option<Self> {
        if width == 0 || width > Self::MAX_WIDTH {
            return None;
        }
        let value = if width > self.width && self.is_negative() {
            self.value | (mask(width) & !mask(self.width))
        } else {
            self.value
        };
        Self::new(value, width, self.signed)
    }

    pub fn ty(&self) -> ValueType {
        ValueType::new(self.width, self.signed)
    }

    /// Convert to `ty`: signedness first, then extend or truncate, so the
    /// extension is a sign extension only when `ty` is signed.
    pub fn cast(self, ty: ValueType) -> Option<Self> {
        self.with_signed(ty.signed).resize(ty.width)
    }

    /// Render as a Verilog literal that denotes exactly this value and type.
    pub fn to_verilog(&self) -> String {
        if self.width == 32 && self.signed && !self.sign_bit() {
            return self.value.to_string();
        }
        let s = if self.signed { "s" } else { "" };
        if self.signed && self.sign_bit() {
            format!("{}'{s}h{:x}", self.width, self.value)
        } else {
            format!("{}'{s}d{}", self.width, self.value)
        }
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_verilog())
    }
}

/// Parse a literal token (`42`, `8'hff`, `4'sb1010`, `'0`).
///
/// Returns `None` for anything that cannot be represented exactly: `x`/`z`
/// digits, widths over 128 bits, strings, or the context-sized fills `'1`,
/// `'x`, `'z`.
pub fn parse_literal(text: &str) -> Option<BitVector> {
    let text = text.trim();
    if let Some(rest) = text.strip_prefix('-') {
        let magnitude = parse_literal(rest)?;
        return unary(UnaryOp::Neg, magnitude);
    }
    match text.find('\'') {
        None => parse_decimal(text),
        Some(0) if text.len() == 2 => match &text[1..] {
            "0" => BitVector::new(0, 1, false),
            _ => None,
        },
        Some(tick) => parse_based(&text[..tick], &text[tick + 1..]),
    }
}

/// Self-determined type of a literal token, known even when its digits are
/// not (`4'b1x01` is four bits). `None` for strings.
pub fn literal_type(text: &str) -> Option<ValueType> {
    let text = text.trim();
    match text.find('\'') {
        None => parse_literal(text).map(|v| v.ty()),
        // Fills are a single bit on their own and stretch to their context
        Some(0) if text.len() == 2 => Some(ValueType::BIT),
        Some(tick) => {
            let size = &text[..tick];
            let width = if size.is_empty() {
                32
            } else {
                size.replace('_', "").parse::<u32>().ok()?
            };
            let signed = text[tick + 1..].starts_with(['s', 'S']);
            Some(ValueType::new(width, signed))
        }
    }
}

fn parse_decimal(text: &str) -> Option<BitVector> {
    let digits: String = text.chars().filter(|c| *c != '_').collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u128 = digits.parse().ok()?;
    if value <= u128::from(u32::MAX) {
        return BitVector::new(value, 32, true);
    }
    // Unsized literals are at least 32 bits; keep room for the sign bit
    let width = 128 - value.leading_zeros() + 1;
    BitVector::new(value, width, true)
}

fn parse_based(size: &str, rest: &str) -> Option<BitVector> {
    let width = if size.is_empty() {
        32
    } else {
        size.replace('_', "").parse::<u32>().ok()?
    };
    let (signed, rest) = match rest.strip_prefix(['s', 'S']) {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let mut chars = rest.chars();
    let radix = match chars.next()?.to_ascii_lowercase() {
        'b' => 2,
        'o' => 8,
        'd' => 10,
        'h' => 16,
        _ => return None,
    };
    let mut value: u128 = 0;
    let mut any = false;
    for c in chars {
        if c == '_' {
            continue;
        }
        let digit = c.to_digit(radix)?;
        value = value.checked_mul(u128::from(radix))?.checked_add(u128::from(digit))?;
        any = true;
    }
    if !any {
        return None;
    }
    BitVector::new(value, width, signed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
    LogicalNot,
    ReduceAnd,
    ReduceOr,
    ReduceXor,
    ReduceNand,
    ReduceNor,
    ReduceXnor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    And,
    Or,
    Xor,
    Xnor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    Shl,
    Shr,
    AShl,
    AShr,
}

pub fn unary(op: UnaryOp, a: BitVector) -> Option<BitVector> {
    let w = a.width;
    let ones = mask(w);
    let result = match op {
        UnaryOp::Plus => a,
        UnaryOp::Neg => BitVector::new(a.value.wrapping_neg(), w, a.signed)?,
        UnaryOp::Not => BitVector::new(!a.value, w, a.signed)?,
        UnaryOp::LogicalNot => BitVector::bool(a.value == 0),
        UnaryOp::ReduceAnd => BitVector::bool(a.value == ones),
        UnaryOp::ReduceOr => BitVector::bool(a.value != 0),
        UnaryOp::ReduceXor => BitVector::bool(a.value.count_ones() % 2 == 1),
        UnaryOp::ReduceNand => BitVector::bool(a.value != ones),
        UnaryOp::ReduceNor => BitVector::bool(a.value == 0),
        UnaryOp::ReduceXnor => BitVector::bool(a.value.count_ones() % 2 == 0),
    };
    Some(result)
}

/// Bring both operands to a common width and signedness. Callers that fold
/// whole expressions cast operands to the propagated type first, which makes
/// this a no-op; on its own it only gives the self-determined result.
fn unify(a: BitVector, b: BitVector) -> Option<(BitVector, BitVector)> {
    let width = a.width.max(b.width);
    let signed = a.signed && b.signed;
    Some((
        a.with_signed(signed).resize(width)?,
        b.with_signed(signed).resize(width)?,
    ))
}

pub fn binary(op: BinaryOp, a: BitVector, b: BitVector) -> Option<BitVector> {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div | Mod | And | Or | Xor | Xnor => {
            let (x, y) = unify(a, b)?;
            let (w, s) = (x.width, x.signed);
            let value = match op {
                Add => x.value.wrapping_add(y.value),
                Sub => x.value.wrapping_sub(y.value),
                Mul => x.value.wrapping_mul(y.value),
                Div | Mod if y.value == 0 => return None,
                Div if s => (x.to_i128()?.checked_div(y.to_i128()?)?) as u128,
                Mod if s => (x.to_i128()?.checked_rem(y.to_i128()?)?) as u128,
                Div => x.value / y.value,
                Mod => x.value % y.value,
                And => x.value & y.value,
                Or => x.value | y.value,
                Xor => x.value ^ y.value,
                _ => !(x.value ^ y.value),
            };
            BitVector::new(value, w, s)
        }
        Eq | Ne | Lt | Le | Gt | Ge => {
            let (x, y) = unify(a, b)?;
            let ordering = if x.signed {
                x.to_i128()?.cmp(&y.to_i128()?)
            } else {
                x.value.cmp(&y.value)
            };
            let holds = match op {
                Eq => ordering.is_eq(),
                Ne => ordering.is_ne(),
                Lt => ordering.is_lt(),
                Le => ordering.is_le(),
                Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Some(BitVector::bool(holds))
        }
        LogicalAnd => Some(BitVector::bool(a.value != 0 && b.value != 0)),
        LogicalOr => Some(BitVector::bool(a.value != 0 || b.value != 0)),
        Shl | AShl | Shr | AShr => {
            // The shift amount is always treated as unsigned
            let amount = b.value;
            let w = a.width;
            if amount >= u128::from(w) {
                let fill = op == AShr && a.is_negative();
                return BitVector::new(if fill { u128::MAX } else { 0 }, w, a.signed);
            }
            let amount = amount as u32;
            let value = match op {
                Shl | AShl => a.value << amount,
                Shr => a.value >> amount,
                _ if a.is_negative() => {
                    (a.value >> amount) | (mask(w) & !(mask(w) >> amount))
                }
                _ => a.value >> amount,
            };
            BitVector::new(value, w, a.signed)
        }
        Pow => {
            if b.is_negative() {
                return None;
            }
            let mut base = a.value;
            let mut exp = b.value;
            let mut acc: u128 = 1;
            while exp > 0 {
                if exp & 1 == 1 {
                    acc = acc.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            BitVector::new(acc, a.width, a.signed && b.signed)
        }
    }
}

/// `{a, b, ...}`: widths add, result is unsigned.
pub fn concat(parts: &[BitVector]) -> Option<BitVector> {
    let width: u32 = parts.iter().map(|p| p.width).sum();
    if parts.is_empty() || width > BitVector::MAX_WIDTH {
        return None;
    }
    let value = parts
        .iter()
        .fold(0u128, |acc, p| if p.width == 128 { p.value } else { (acc << p.width) | p.value });
    BitVector::new(value, width, false)
}

/// `{n{a}}`
pub fn replicate(count: u64, part: BitVector) -> Option<BitVector> {
    let count = usize::try_from(count).ok()?;
    if count == 0 || count > BitVector::MAX_WIDTH as usize {
        return None;
    }
    concat(&vec![part; count])
}

/// `c ? t : e` with a constant predicate; the chosen arm is extended to the
/// wider arm's width.
pub fn conditional(pred: BitVector, then: BitVector, other: BitVector) -> Option<BitVector> {
    let (t, e) = unify(then, other)?;
    Some(if pred.is_zero() { e } else { t })
}

/// `$clog2(n)`, an integer result.
pub fn clog2(n: BitVector) -> Option<BitVector> {
    if n.is_negative() {
        return None;
    }
    let v = n.value;
    let bits = if v <= 1 { 0 } else { 128 - (v - 1).leading_zeros() };
    Some(BitVector::int(i64::from(bits)))
}

/// Constant bit or range select `a[hi:lo]` / `a[i]`.
pub fn select(base: BitVector, hi: u64, lo: u64) -> Option<BitVector> {
    if hi < lo || hi >= u64::from(base.width) {
        return None;
    }
    let width = u32::try_from(hi - lo + 1).ok()?;
    BitVector::new(base.value >> lo, width, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(value: u128, width: u32, signed: bool) -> BitVector {
        BitVector::new(value, width, signed).expect("valid width")
    }

    #[test]
    fn test_parse_decimal_is_32_bit_signed() {
        let v = parse_literal("42").expect("literal");
        assert_eq!((v.value(), v.width(), v.is_signed()), (42, 32, true));
        assert_eq!(parse_literal("1_000").map(|v| v.value()), Some(1000));
    }

    #[test]
    fn test_parse_based_literals() {
        assert_eq!(parse_literal("8'hFF"), Some(bv(255, 8, false)));
        assert_eq!(parse_literal("3'b101"), Some(bv(5, 3, false)));
        assert_eq!(parse_literal("4'sb1010"), Some(bv(10, 4, true)));
        assert_eq!(parse_literal("'d10"), Some(bv(10, 32, false)));
        assert_eq!(parse_literal("'0"), Some(bv(0, 1, false)));
        // Over-long digits are truncated to the declared size
        assert_eq!(parse_literal("4'hFF"), Some(bv(15, 4, false)));
    }

    #[test]
    fn test_parse_rejects_unknowns() {
        assert_eq!(parse_literal("4'b1x01"), None);
        assert_eq!(parse_literal("'1"), None);
        assert_eq!(parse_literal("200'h1"), None);
        assert_eq!(parse_literal("\"str\""), None);
    }

    #[test]
    fn test_negative_override() {
        let v = parse_literal("-3").expect("literal");
        assert_eq!(v.to_i128(), Some(-3));
        assert_eq!(v.width(), 32);
    }

    #[test]
    fn test_arithmetic_width_rules() {
        let a = bv(200, 8, false);
        let b = bv(100, 16, false);
        let sum = binary(BinaryOp::Add, a, b).expect("sum");
        assert_eq!((sum.value(), sum.width()), (300, 16));

        // Mixed signedness is unsigned
        let s = BitVector::int(-1);
        let r = binary(BinaryOp::Add, s, bv(1, 8, false)).expect("sum");
        assert!(!r.is_signed());
        assert_eq!(r.width(), 32);
        assert_eq!(r.value(), 0);
    }

    #[test]
    fn test_context_type_changes_result() {
        // Self-determined, 4'hf + 4'h1 wraps to zero
        let (a, b) = (bv(0xf, 4, false), bv(1, 4, false));
        assert_eq!(binary(BinaryOp::Add, a, b).map(|v| v.value()), Some(0));

        // In a 9-bit context both operands are extended first
        let ctx = ValueType::new(9, false);
        let (a, b) = (a.cast(ctx).expect("cast"), b.cast(ctx).expect("cast"));
        let sum = binary(BinaryOp::Add, a, b).expect("sum");
        assert_eq!((sum.value(), sum.width()), (16, 9));
    }

    #[test]
    fn test_cast_converts_sign_before_extending() {
        let v = bv(0b1010, 4, true);
        assert_eq!(v.cast(ValueType::new(8, false)).map(|v| v.value()), Some(0b1010));
        assert_eq!(v.cast(ValueType::new(8, true)).map(|v| v.value()), Some(0b1111_1010));
        assert_eq!(
            ValueType::new(8, false).join(ValueType::INT),
            ValueType::new(32, false)
        );
        assert_eq!(
            ValueType::new(4, true).assigned_to(ValueType::new(8, false)),
            ValueType::new(8, true)
        );
    }

    #[test]
    fn test_literal_type() {
        assert_eq!(literal_type("4'b1x01"), Some(ValueType::new(4, false)));
        assert_eq!(literal_type("8'shff"), Some(ValueType::new(8, true)));
        assert_eq!(literal_type("'1"), Some(ValueType::BIT));
        assert_eq!(literal_type("17"), Some(ValueType::INT));
        assert_eq!(literal_type("\"s\""), None);
    }

    #[test]
    fn test_signed_division() {
        let q = binary(BinaryOp::Div, BitVector::int(-7), BitVector::int(2)).expect("div");
        assert_eq!(q.to_i128(), Some(-3));
        assert_eq!(binary(BinaryOp::Div, BitVector::int(1), BitVector::int(0)), None);
        assert_eq!(binary(BinaryOp::Mod, BitVector::int(1), BitVector::int(0)), None);
    }

    #[test]
    fn test_shifts() {
        let a = bv(0b1000_0001, 8, true);
        let logical = binary(BinaryOp::Shr, a, BitVector::int(1)).expect("shr");
        assert_eq!(logical.value(), 0b0100_0000);
        let arith = binary(BinaryOp::AShr, a, BitVector::int(1)).expect("ashr");
        assert_eq!(arith.value(), 0b1100_0000);
        let unsigned = binary(BinaryOp::AShr, a.with_signed(false), BitVector::int(1)).expect("ashr");
        assert_eq!(unsigned.value(), 0b0100_0000);
        let out = binary(BinaryOp::Shl, a, BitVector::int(9)).expect("shl");
        assert_eq!(out.value(), 0);
    }

    #[test]
    fn test_comparisons_are_one_bit() {
        let r = binary(BinaryOp::Lt, BitVector::int(-1), BitVector::int(0)).expect("lt");
        assert_eq!((r.value(), r.width()), (1, 1));
        // Unsigned comparison when either side is unsigned
        let r = binary(BinaryOp::Lt, BitVector::int(-1), bv(0, 32, false)).expect("lt");
        assert_eq!(r.value(), 0);
    }

    #[test]
    fn test_concat_and_replicate() {
        let c = concat(&[bv(1, 1, false), bv(2, 4, false)]).expect("concat");
        assert_eq!((c.value(), c.width()), (0b10010, 5));
        let r = replicate(3, bv(0b10, 2, false)).expect("replicate");
        assert_eq!((r.value(), r.width()), (0b101010, 6));
        assert_eq!(replicate(100, bv(0, 2, false)), None);
    }

    #[test]
    fn test_clog2() {
        let cases = [(0, 0), (1, 0), (2, 1), (3, 2), (4, 2), (5, 3), (256, 8)];
        for (n, expected) in cases {
            let r = clog2(BitVector::int(n)).expect("clog2");
            assert_eq!(r.value(), expected, "clog2({n})");
        }
    }

    #[test]
    fn test_resize_sign_extends() {
        let v = bv(0b1010, 4, true).resize(8).expect("resize");
        assert_eq!(v.value(), 0b1111_1010);
        let u = bv(0b1010, 4, false).resize(8).expect("resize");
        assert_eq!(u.value(), 0b1010);
        assert_eq!(bv(0x1ff, 12, false).resize(8).map(|v| v.value()), Some(0xff));
    }

    #[test]
    fn test_to_verilog() {
        assert_eq!(BitVector::int(7).to_verilog(), "7");
        assert_eq!(bv(5, 3, false).to_verilog(), "3'd5");
        assert_eq!(bv(0xfb, 8, true).to_verilog(), "8'shfb");
        assert_eq!(BitVector::int(-1).to_verilog(), "32'shffffffff");
    }

    #[test]
    fn test_select() {
        let v = bv(0b1101_0110, 8, false);
        assert_eq!(select(v, 3, 0).map(|b| b.value()), Some(0b0110));
        assert_eq!(select(v, 7, 7).map(|b| b.value()), Some(1));
        assert_eq!(select(v, 8, 0), None);
    }
}
