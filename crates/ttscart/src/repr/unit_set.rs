//! Textual presentation of leaf unit sets.
//!
//! A leaf stores which unit values route to it as a bit set. On disk the set
//! is written as `"<mode> <bit_len> <payload>"` where `mode` is one of:
//!
//! - `B`: packed hexadecimal bitmap, least significant nibble on the right.
//!   `B 8 05` has bits 0 and 2 set.
//! - `I`: explicit index list preceded by its count. `I 256 2 3 200` has bits
//!   3 and 200 set.
//!
//! [`compose_unit_set`] picks the shorter form; [`parse_unit_set`] reads both.

use fixedbitset::FixedBitSet;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Largest bit length accepted when reading a unit set.
pub const MAX_UNIT_SET_LEN: usize = 1 << 24;

/// Errors raised while parsing a unit set presentation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitSetError {
    #[error("empty unit set presentation")]
    Empty,
    #[error("unsupported unit set format: {0}")]
    UnsupportedFormat(String),
    #[error("missing {0} in unit set presentation")]
    MissingToken(&'static str),
    #[error("invalid {field} in unit set presentation: {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("invalid hex digit '{0}' in unit set bitmap")]
    InvalidHexDigit(char),
    #[error("bit index {index} out of range for unit set of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("unit set declares {expected} indices but lists {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("unexpected trailing token in unit set presentation: {0}")]
    TrailingToken(String),
    #[error("unit set length {len} exceeds the maximum of {max}")]
    LengthTooLarge { len: usize, max: usize },
}

/// The two on-disk presentations of a unit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// `B`: hexadecimal bitmap.
    Bitmap,
    /// `I`: explicit index list.
    IndexList,
}

impl Presentation {
    /// The mode token written in front of the payload.
    pub fn token(self) -> &'static str {
        match self {
            Presentation::Bitmap => "B",
            Presentation::IndexList => "I",
        }
    }

    /// Choose the presentation for a set of `len` bits with `count` bits set.
    ///
    /// The bitmap costs roughly one character per four bits, the index list
    /// roughly four characters per set bit.
    pub fn select(len: usize, count: usize) -> Self {
        if len / 4 < count * 4 {
            Presentation::Bitmap
        } else {
            Presentation::IndexList
        }
    }
}

/// Render a unit set in its shorter textual presentation.
pub fn compose_unit_set(set: &FixedBitSet) -> String {
    let len = set.len();
    let count = set.count_ones(..);
    let presentation = Presentation::select(len, count);

    let payload = match presentation {
        Presentation::Bitmap => compose_bitmap(set),
        Presentation::IndexList => {
            let mut parts = Vec::with_capacity(count + 1);
            parts.push(count.to_string());
            parts.extend(set.ones().map(|i| i.to_string()));
            parts.join(" ")
        }
    };

    format!("{} {} {}", presentation.token(), len, payload)
        .trim()
        .to_string()
}

fn compose_bitmap(set: &FixedBitSet) -> String {
    let len = set.len();
    let n_nibbles = len.div_ceil(4);

    // Collected lowest nibble first, reversed at the end.
    let mut digits = Vec::with_capacity(n_nibbles + 1);
    for nibble in 0..n_nibbles {
        let mut value = 0usize;
        for bit in 0..4 {
            let index = nibble * 4 + bit;
            if index < len && set.contains(index) {
                value |= 1 << bit;
            }
        }
        digits.push(HEX_DIGITS[value]);
    }
    if digits.len() % 2 == 1 {
        digits.push(b'0');
    }
    digits.reverse();

    digits.into_iter().map(char::from).collect()
}

/// Parse a unit set presentation into a fresh bit set.
pub fn parse_unit_set(text: &str) -> Result<FixedBitSet, UnitSetError> {
    let mut set = FixedBitSet::new();
    parse_unit_set_into(text, &mut set)?;
    Ok(set)
}

/// Parse a unit set presentation into `out`.
///
/// `out` is replaced by a cleared set of the declared length before any bit
/// is decoded. On error its contents are unspecified.
pub fn parse_unit_set_into(text: &str, out: &mut FixedBitSet) -> Result<(), UnitSetError> {
    let mut tokens = text.split_whitespace();

    let mode = tokens.next().ok_or(UnitSetError::Empty)?;
    let presentation = match mode {
        "B" => Presentation::Bitmap,
        "I" => Presentation::IndexList,
        other => return Err(UnitSetError::UnsupportedFormat(other.to_string())),
    };

    let len = parse_number("length", tokens.next())?;
    if len > MAX_UNIT_SET_LEN {
        return Err(UnitSetError::LengthTooLarge {
            len,
            max: MAX_UNIT_SET_LEN,
        });
    }
    *out = FixedBitSet::with_capacity(len);

    match presentation {
        Presentation::Bitmap => {
            let payload = tokens.next().ok_or(UnitSetError::MissingToken("bitmap"))?;
            for (nibble, ch) in payload.chars().rev().enumerate() {
                let value = ch.to_digit(16).ok_or(UnitSetError::InvalidHexDigit(ch))?;
                for bit in 0..4 {
                    if value & (1 << bit) == 0 {
                        continue;
                    }
                    let index = nibble * 4 + bit;
                    if index >= len {
                        return Err(UnitSetError::IndexOutOfRange { index, len });
                    }
                    out.insert(index);
                }
            }
        }
        Presentation::IndexList => {
            let expected = parse_number("count", tokens.next())?;
            let mut actual = 0;
            for token in tokens.by_ref() {
                let index = parse_number("index", Some(token))?;
                if index >= len {
                    return Err(UnitSetError::IndexOutOfRange { index, len });
                }
                out.insert(index);
                actual += 1;
            }
            if actual != expected {
                return Err(UnitSetError::CountMismatch { expected, actual });
            }
        }
    }

    match tokens.next() {
        Some(extra) => Err(UnitSetError::TrailingToken(extra.to_string())),
        None => Ok(()),
    }
}

fn parse_number(field: &'static str, token: Option<&str>) -> Result<usize, UnitSetError> {
    let token = token.ok_or(UnitSetError::MissingToken(field))?;
    token.parse().map_err(|_| UnitSetError::InvalidNumber {
        field,
        value: token.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
