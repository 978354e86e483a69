//! Decode/encode pair for every [`TypeTag`].
//!
//! All functions here are pure: they see a byte slice and return a value (or
//! the bytes for a value) without touching the image.

use std::fmt::{Display, Error, Formatter};

use crate::error::{EngineError, Result};
use crate::loader::parse_int;
use crate::schema::{FieldDescriptor, TypeTag};
use crate::text;

/// A decoded field value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(u32),
    Flag(bool),
    Text(String),
    Table(Vec<Value>),
}

impl Value {
    pub fn as_integer(&self) -> Option<u32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse user input for a field of the given type.
    pub fn parse(input: &str, tag: TypeTag) -> Result<Value> {
        let input = input.trim();
        match tag {
            TypeTag::String => Ok(Value::Text(input.to_string())),
            TypeTag::Bool | TypeTag::Check => match input.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Value::Flag(true)),
                "0" | "false" | "no" | "off" => Ok(Value::Flag(false)),
                _ => Err(EngineError::Range(format!("'{}' is not a flag value", input))),
            },
            TypeTag::Table => input
                .split(',')
                .map(|item| Value::parse(item, TypeTag::Decimal))
                .collect::<Result<Vec<_>>>()
                .map(Value::Table),
            _ => parse_int(input)
                .map(Value::Integer)
                .map_err(|_| EngineError::Range(format!("'{}' is not a number", input))),
        }
    }

    /// Human readable form, hex for address-like tags.
    pub fn display_as(&self, tag: TypeTag) -> String {
        match (self, tag) {
            (Value::Integer(v), TypeTag::Hex | TypeTag::Pointer | TypeTag::Word | TypeTag::Mark) => {
                format!("{:#04x}", v)
            }
            (Value::Table(items), _) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                format!("[{}]", parts.join(", "))
            }
            _ => self.to_string(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Flag(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "\"{}\"", s.escape_debug()),
            Value::Table(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Decoding parameters for one field (or one table element)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    pub tag: TypeTag,
    pub width: usize,
    pub bit: Option<u8>,
    pub scale: u32,
    pub terminator: u8,
}

impl Codec {
    pub fn new(tag: TypeTag, width: usize) -> Self {
        let width = match tag {
            TypeTag::Word | TypeTag::Pointer => 2,
            TypeTag::Bool | TypeTag::Check => 1,
            _ => width,
        };
        Codec {
            tag,
            width,
            bit: None,
            scale: 1,
            terminator: text::DEFAULT_TERMINATOR,
        }
    }

    pub fn for_field(field: &FieldDescriptor, terminator: u8) -> Self {
        Codec {
            bit: field.bit,
            scale: field.scale.max(1),
            terminator,
            ..Codec::new(field.tag, field.width)
        }
    }

    /// Bytes read per value; strings are open ended.
    pub fn byte_len(&self) -> Option<usize> {
        match self.tag {
            TypeTag::String => None,
            _ => Some(self.width),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        match self.tag {
            TypeTag::String => match text::scan(bytes, 0, self.terminator) {
                Some(raw) => Ok(Value::Text(text::decode(raw))),
                None => Err(EngineError::Truncation { addr: 0 }),
            },
            TypeTag::Bool | TypeTag::Check => {
                let byte = *bytes
                    .first()
                    .ok_or_else(|| EngineError::Address("flag read past end of image".to_string()))?;
                Ok(Value::Flag(match self.bit {
                    Some(bit) => byte & (1 << bit) != 0,
                    None => byte != 0,
                }))
            }
            TypeTag::Table => Err(EngineError::Range(
                "table fields are decoded element by element".to_string(),
            )),
            TypeTag::Attribute => {
                let raw = read_le(bytes, self.width)?;
                raw.checked_mul(self.scale)
                    .map(Value::Integer)
                    .ok_or_else(|| EngineError::Range(format!("{} * {} overflows", raw, self.scale)))
            }
            _ => read_le(bytes, self.width).map(Value::Integer),
        }
    }

    /// Encode `value`. `current` holds the bytes presently at the target so
    /// single-bit flags can keep the other bits of their byte.
    pub fn encode(&self, value: &Value, current: &[u8]) -> Result<Vec<u8>> {
        match (self.tag, value) {
            (TypeTag::String, Value::Text(s)) => {
                let mut bytes = text::encode(s)?;
                if bytes.contains(&self.terminator) {
                    return Err(EngineError::Range(format!(
                        "text contains the terminator code {:#04x}",
                        self.terminator
                    )));
                }
                bytes.push(self.terminator);
                Ok(bytes)
            }
            (TypeTag::Bool | TypeTag::Check, Value::Flag(set)) => match self.bit {
                Some(bit) => {
                    let old = current.first().copied().unwrap_or(0);
                    let mask = 1u8 << bit;
                    Ok(vec![if *set { old | mask } else { old & !mask }])
                }
                None => Ok(vec![*set as u8]),
            },
            (TypeTag::Attribute, Value::Integer(v)) => {
                if v % self.scale != 0 {
                    return Err(EngineError::Range(format!(
                        "{} is not a multiple of the attribute scale {}",
                        v, self.scale
                    )));
                }
                write_le(v / self.scale, self.width)
            }
            (tag, Value::Integer(v)) if tag.is_integer() => write_le(*v, self.width),
            (tag, other) => Err(EngineError::Range(format!(
                "{} cannot hold {}",
                tag, other
            ))),
        }
    }
}

/// Decode with the tag's default parameters.
pub fn decode(bytes: &[u8], tag: TypeTag, width: usize) -> Result<Value> {
    Codec::new(tag, width).decode(bytes)
}

/// Encode with the tag's default parameters (flags overwrite the whole byte).
pub fn encode(value: &Value, tag: TypeTag, width: usize) -> Result<Vec<u8>> {
    Codec::new(tag, width).encode(value, &[])
}

/// Little-endian unsigned read of `width` bytes
pub fn read_le(bytes: &[u8], width: usize) -> Result<u32> {
    if width == 0 || width > 4 {
        return Err(EngineError::Range(format!("unsupported width {}", width)));
    }
    let slice = bytes.get(..width).ok_or_else(|| {
        EngineError::Address(format!("{}-byte read past end of image", width))
    })?;
    Ok(slice
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32))
}

pub fn write_le(value: u32, width: usize) -> Result<Vec<u8>> {
    if width == 0 || width > 4 {
        return Err(EngineError::Range(format!("unsupported width {}", width)));
    }
    if width < 4 && value >> (8 * width) != 0 {
        return Err(EngineError::Range(format!(
            "{} does not fit in {} byte(s)",
            value, width
        )));
    }
    Ok(value.to_le_bytes()[..width].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_tags_round_trip() {
        for tag in [
            TypeTag::Decimal,
            TypeTag::Hex,
            TypeTag::Location,
            TypeTag::Mark,
            TypeTag::Npc,
        ] {
            for v in [0u32, 1, 0x7F, 0xFF] {
                let bytes = encode(&Value::Integer(v), tag, 1).unwrap();
                assert_eq!(decode(&bytes, tag, 1).unwrap(), Value::Integer(v));
            }
        }
    }

    #[test]
    fn test_word_is_little_endian() {
        let bytes = encode(&Value::Integer(0xD569), TypeTag::Word, 2).unwrap();
        assert_eq!(bytes, vec![0x69, 0xD5]);
        assert_eq!(decode(&bytes, TypeTag::Word, 2).unwrap(), Value::Integer(0xD569));
        assert_eq!(
            decode(&[0x00, 0x80], TypeTag::Pointer, 1).unwrap(),
            Value::Integer(0x8000)
        );
    }

    #[test]
    fn test_range_errors() {
        assert!(matches!(
            encode(&Value::Integer(256), TypeTag::Decimal, 1),
            Err(EngineError::Range(_))
        ));
        assert!(matches!(
            encode(&Value::Integer(0x1_0000), TypeTag::Word, 2),
            Err(EngineError::Range(_))
        ));
        assert!(matches!(
            encode(&Value::Flag(true), TypeTag::Hex, 1),
            Err(EngineError::Range(_))
        ));
        assert_eq!(
            encode(&Value::Integer(0x1234), TypeTag::Hex, 2).unwrap(),
            vec![0x34, 0x12]
        );
    }

    #[test]
    fn test_flag_whole_byte() {
        assert_eq!(encode(&Value::Flag(false), TypeTag::Bool, 1).unwrap(), vec![0]);
        assert_eq!(encode(&Value::Flag(true), TypeTag::Check, 1).unwrap(), vec![1]);
        assert_eq!(decode(&[0x40], TypeTag::Bool, 1).unwrap(), Value::Flag(true));
        assert_eq!(decode(&[0x00], TypeTag::Bool, 1).unwrap(), Value::Flag(false));
    }

    #[test]
    fn test_flag_bit_preserves_neighbours() {
        let codec = Codec {
            bit: Some(2),
            ..Codec::new(TypeTag::Check, 1)
        };
        assert_eq!(codec.encode(&Value::Flag(true), &[0b1000_0001]).unwrap(), vec![0b1000_0101]);
        assert_eq!(codec.encode(&Value::Flag(false), &[0xFF]).unwrap(), vec![0xFB]);
        assert_eq!(codec.decode(&[0b0000_0100]).unwrap(), Value::Flag(true));
        assert_eq!(codec.decode(&[0b1111_1011]).unwrap(), Value::Flag(false));
    }

    #[test]
    fn test_attribute_scale() {
        let codec = Codec {
            scale: 2,
            ..Codec::new(TypeTag::Attribute, 1)
        };
        assert_eq!(codec.decode(&[25]).unwrap(), Value::Integer(50));
        assert_eq!(codec.encode(&Value::Integer(50), &[]).unwrap(), vec![25]);
        assert!(matches!(
            codec.encode(&Value::Integer(51), &[]),
            Err(EngineError::Range(_))
        ));
    }

    #[test]
    fn test_string_codec() {
        let bytes = encode(&Value::Text("HEAL".to_string()), TypeTag::String, 0).unwrap();
        assert_eq!(bytes.last(), Some(&text::DEFAULT_TERMINATOR));
        assert_eq!(
            decode(&bytes, TypeTag::String, 0).unwrap(),
            Value::Text("HEAL".to_string())
        );
        assert!(matches!(
            decode(&[0x8A, 0x8B], TypeTag::String, 0),
            Err(EngineError::Truncation { .. })
        ));
        assert!(matches!(
            encode(&Value::Text("A\\xFF".to_string()), TypeTag::String, 0),
            Err(EngineError::Range(_))
        ));
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("0x0A", TypeTag::Decimal).unwrap(), Value::Integer(10));
        assert_eq!(Value::parse("yes", TypeTag::Bool).unwrap(), Value::Flag(true));
        assert_eq!(
            Value::parse("1, 2,0x10", TypeTag::Table).unwrap(),
            Value::Table(vec![Value::Integer(1), Value::Integer(2), Value::Integer(16)])
        );
        assert!(Value::parse("maybe", TypeTag::Check).is_err());
    }
}
