//! Numeric codec between text, typed values and fixed-width byte sequences.
//!
//! Integers are stored as two's complement, floats as IEEE-754 single or double
//! precision. Both are laid out little-endian first and byte-reversed when the
//! target representation is big-endian. The bit layouts are built explicitly so
//! the encoding never depends on the host's own number representation.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::{Value, ValueType};

/// Byte order of an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Encoded width and byte order of one value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Representation {
    pub width: usize,
    pub endianness: Endianness,
}

impl Representation {
    pub const fn new(width: usize, endianness: Endianness) -> Self {
        Self { width, endianness }
    }

    /// The type's natural size in the given byte order.
    pub const fn natural(ty: ValueType, endianness: Endianness) -> Self {
        Self::new(ty.size(), endianness)
    }

    /// Whether values of `ty` can be laid out on this width.
    pub fn supports(&self, ty: ValueType) -> bool {
        if ty.is_float() {
            self.width == 4 || self.width == 8
        } else {
            (1..=8).contains(&self.width)
        }
    }
}

/// Conversion between operand text, values and bytecode bytes.
///
/// The VM only talks to its bytecode through this trait, so a custom encoding
/// can be plugged in with [`Vm::with_codec`](super::vm::Vm::with_codec).
pub trait BytecodeCodec: Send + Sync {
    /// Parses operand text into a value of type `ty`.
    fn parse(&self, ty: ValueType, text: &str) -> Result<Value, VMError>;

    fn encode(&self, value: Value, repr: Representation) -> Result<Vec<u8>, VMError>;

    /// Decodes exactly `repr.width` bytes into a value of type `ty`.
    fn decode(&self, ty: ValueType, repr: Representation, bytes: &[u8]) -> Result<Value, VMError>;

    /// Canonical text of a value, as printed by the disassembler.
    fn format(&self, value: Value) -> String {
        value.to_string()
    }

    fn encode_text(
        &self,
        ty: ValueType,
        repr: Representation,
        text: &str,
    ) -> Result<Vec<u8>, VMError> {
        let value = self.parse(ty, text)?;
        self.encode(value, repr).map_err(|err| match err {
            VMError::NumberOutOfRange { .. } => VMError::NumberOutOfRange {
                text: text.to_string(),
                ty,
                width: repr.width,
            },
            other => other,
        })
    }
}

/// Default codec: decimal or `0x` hexadecimal integers, decimal floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericCodec;

impl BytecodeCodec for NumericCodec {
    fn parse(&self, ty: ValueType, text: &str) -> Result<Value, VMError> {
        let malformed = || VMError::MalformedNumber {
            text: text.to_string(),
            ty,
        };
        let out_of_range = || VMError::NumberOutOfRange {
            text: text.to_string(),
            ty,
            width: ty.size(),
        };

        let value = match ty {
            ValueType::F32 => Value::F32(text.parse::<f32>().map_err(|_| malformed())?),
            ValueType::F64 => Value::F64(text.parse::<f64>().map_err(|_| malformed())?),
            _ => {
                let number = parse_integer(text).ok_or_else(malformed)?;
                return Value::from_i128(ty, number).ok_or_else(out_of_range);
            }
        };

        // finite text that rounds to infinity
        let overflowed = value.as_f64().is_some_and(f64::is_infinite)
            && !text.to_ascii_lowercase().contains("inf");
        if overflowed {
            return Err(out_of_range());
        }
        Ok(value)
    }

    fn encode(&self, value: Value, repr: Representation) -> Result<Vec<u8>, VMError> {
        let ty = value.ty();
        let out_of_range = || VMError::NumberOutOfRange {
            text: value.to_string(),
            ty,
            width: repr.width,
        };
        if !repr.supports(ty) {
            return Err(out_of_range());
        }

        let mut bytes = match value {
            Value::F32(v) => pack_float(f64::from(v), repr.width).ok_or_else(out_of_range)?,
            Value::F64(v) => pack_float(v, repr.width).ok_or_else(out_of_range)?,
            integer => {
                let number = integer.as_i128().ok_or_else(out_of_range)?;
                pack_integer(number, ty.is_signed(), repr.width).ok_or_else(out_of_range)?
            }
        };

        if repr.endianness == Endianness::Big {
            bytes.reverse();
        }
        Ok(bytes)
    }

    fn decode(&self, ty: ValueType, repr: Representation, bytes: &[u8]) -> Result<Value, VMError> {
        if bytes.len() != repr.width || !repr.supports(ty) {
            return Err(VMError::CodeOverflow {
                offset: 0,
                requested: repr.width,
                available: bytes.len(),
            });
        }

        let mut little = bytes.to_vec();
        if repr.endianness == Endianness::Big {
            little.reverse();
        }

        if ty.is_float() {
            let number = unpack_float(&little).ok_or(VMError::CodeOverflow {
                offset: 0,
                requested: repr.width,
                available: bytes.len(),
            })?;
            if ty == ValueType::F32 && overflows_single(number) {
                return Err(VMError::DecodedFloatOutOfRange { value: number, ty });
            }
            // from_f64 only fails on integer types
            Value::from_f64(ty, number).ok_or(VMError::DecodedOutOfRange { value: 0, ty })
        } else {
            let number = unpack_integer(&little, ty.is_signed());
            Value::from_i128(ty, number).ok_or(VMError::DecodedOutOfRange { value: number, ty })
        }
    }
}

/// Parses an optionally signed decimal or `0x` hexadecimal integer.
fn parse_integer(text: &str) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u128::from_str_radix(hex, 16).ok()?
        }
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<u128>().ok()?
        }
        _ => return None,
    };

    let magnitude = i128::try_from(magnitude).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Lays `number` out little-endian on `width` bytes, `None` if it does not fit.
fn pack_integer(number: i128, signed: bool, width: usize) -> Option<Vec<u8>> {
    let bits = 8 * width as u32;
    let (min, max) = if signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    if number < min || number > max {
        return None;
    }

    let mask = (1u128 << bits) - 1;
    let raw = if number < 0 {
        (!number.unsigned_abs()).wrapping_add(1) & mask
    } else {
        number as u128
    };
    Some((0..width).map(|i| (raw >> (8 * i)) as u8).collect())
}

fn unpack_integer(little: &[u8], signed: bool) -> i128 {
    let bits = 8 * little.len() as u32;
    let raw = little
        .iter()
        .enumerate()
        .fold(0u128, |acc, (i, byte)| acc | (u128::from(*byte) << (8 * i)));

    if signed && bits > 0 && (raw >> (bits - 1)) & 1 == 1 {
        let mask = (1u128 << bits) - 1;
        let magnitude = (!raw).wrapping_add(1) & mask;
        -(magnitude as i128)
    } else {
        raw as i128
    }
}

/// IEEE-754 binary interchange format.
#[derive(Debug, Clone, Copy)]
struct FloatFormat {
    exponent_bits: u32,
    mantissa_bits: u32,
    bias: i32,
}

const SINGLE: FloatFormat = FloatFormat {
    exponent_bits: 8,
    mantissa_bits: 23,
    bias: 127,
};

const DOUBLE: FloatFormat = FloatFormat {
    exponent_bits: 11,
    mantissa_bits: 52,
    bias: 1023,
};

impl FloatFormat {
    fn for_width(width: usize) -> Option<FloatFormat> {
        match width {
            4 => Some(SINGLE),
            8 => Some(DOUBLE),
            _ => None,
        }
    }

    fn max_exponent(self) -> u64 {
        (1u64 << self.exponent_bits) - 1
    }

    /// `x` must be exactly representable in this format.
    fn pack(self, x: f64) -> u64 {
        let sign = u64::from(x.is_sign_negative());
        let mantissa_bits = self.mantissa_bits as i32;

        let (exponent, mantissa) = if x.is_nan() {
            (self.max_exponent(), 1u64 << (self.mantissa_bits - 1))
        } else if x.is_infinite() {
            (self.max_exponent(), 0)
        } else if x == 0.0 {
            (0, 0)
        } else {
            let (fraction, exp) = frexp(x.abs());
            let biased = exp - 1 + self.bias;
            if biased >= 1 {
                // implicit leading one
                let mantissa = ldexp(2.0 * fraction - 1.0, mantissa_bits);
                (biased as u64, mantissa as u64)
            } else {
                let mantissa = ldexp(x.abs(), mantissa_bits + self.bias - 1);
                (0, mantissa as u64)
            }
        };

        (sign << (self.exponent_bits + self.mantissa_bits)) | (exponent << self.mantissa_bits) | mantissa
    }

    fn unpack(self, bits: u64) -> f64 {
        let mantissa_bits = self.mantissa_bits as i32;
        let mantissa = bits & ((1u64 << self.mantissa_bits) - 1);
        let exponent = (bits >> self.mantissa_bits) & self.max_exponent();
        let negative = (bits >> (self.exponent_bits + self.mantissa_bits)) & 1 == 1;

        let magnitude = if exponent == self.max_exponent() {
            if mantissa == 0 { f64::INFINITY } else { f64::NAN }
        } else if exponent == 0 {
            ldexp(mantissa as f64, 1 - self.bias - mantissa_bits)
        } else {
            let significand = (1u64 << self.mantissa_bits) | mantissa;
            ldexp(significand as f64, exponent as i32 - self.bias - mantissa_bits)
        };

        if negative { -magnitude } else { magnitude }
    }
}

fn pack_float(x: f64, width: usize) -> Option<Vec<u8>> {
    let format = FloatFormat::for_width(width)?;
    let x = if width == 4 {
        if overflows_single(x) {
            return None;
        }
        f64::from(x as f32)
    } else {
        x
    };
    let bits = format.pack(x);
    Some((0..width).map(|i| (bits >> (8 * i)) as u8).collect())
}

/// Finite double that single precision can only hold as infinity.
fn overflows_single(x: f64) -> bool {
    x.is_finite() && (x as f32).is_infinite()
}

fn unpack_float(little: &[u8]) -> Option<f64> {
    let format = FloatFormat::for_width(little.len())?;
    let bits = little
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, byte)| acc | (u64::from(*byte) << (8 * i)));
    Some(format.unpack(bits))
}

/// Splits a positive finite `x` into `fraction * 2^exp` with `fraction` in `[0.5, 1)`.
fn frexp(x: f64) -> (f64, i32) {
    let mut fraction = x;
    let mut exp = 0;
    while fraction >= 1.0 {
        fraction /= 2.0;
        exp += 1;
    }
    while fraction < 0.5 {
        fraction *= 2.0;
        exp -= 1;
    }
    (fraction, exp)
}

/// `x * 2^n`, scaled in steps that keep every intermediate finite.
fn ldexp(mut x: f64, mut n: i32) -> f64 {
    const STEP: i32 = 1000;
    while n > 0 {
        let step = n.min(STEP);
        x *= pow2(step);
        n -= step;
    }
    while n < 0 {
        let step = (-n).min(STEP);
        x /= pow2(step);
        n += step;
    }
    x
}

fn pow2(n: i32) -> f64 {
    (0..n).fold(1.0, |acc, _| acc * 2.0)
}
