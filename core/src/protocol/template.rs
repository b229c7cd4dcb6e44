use crate::prelude::{DecodeError, DecodeResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Little-endian scalar encodings understood by [`StructTemplate`].
///
/// The single-character codes match the ones used in the sensor interface
/// documentation (`B`, `H`, `I`, `Q`, `f`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCode {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl FormatCode {
    pub fn from_char(code: char) -> Option<Self> {
        Some(match code {
            'B' => Self::U8,
            'b' => Self::I8,
            'H' => Self::U16,
            'h' => Self::I16,
            'I' => Self::U32,
            'i' => Self::I32,
            'Q' => Self::U64,
            'q' => Self::I64,
            'f' => Self::F32,
            'd' => Self::F64,
            _ => return None,
        })
    }

    pub fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> FieldValue {
        let mut le = [0u8; 8];
        le[..bytes.len()].copy_from_slice(bytes);
        match self {
            Self::U8 => FieldValue::Unsigned(u64::from(bytes[0])),
            Self::I8 => FieldValue::Signed(i64::from(bytes[0] as i8)),
            Self::U16 => FieldValue::Unsigned(u64::from(u16::from_le_bytes([le[0], le[1]]))),
            Self::I16 => FieldValue::Signed(i64::from(i16::from_le_bytes([le[0], le[1]]))),
            Self::U32 => FieldValue::Unsigned(u64::from(u32::from_le_bytes([
                le[0], le[1], le[2], le[3],
            ]))),
            Self::I32 => FieldValue::Signed(i64::from(i32::from_le_bytes([
                le[0], le[1], le[2], le[3],
            ]))),
            Self::U64 => FieldValue::Unsigned(u64::from_le_bytes(le)),
            Self::I64 => FieldValue::Signed(i64::from_le_bytes(le)),
            Self::F32 => FieldValue::Float(f64::from(f32::from_le_bytes([
                le[0], le[1], le[2], le[3],
            ]))),
            Self::F64 => FieldValue::Float(f64::from_le_bytes(le)),
        }
    }
}

/// A decoded scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_u64(self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => Some(v),
            Self::Signed(v) => u64::try_from(v).ok(),
            Self::Float(_) => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Unsigned(v) => v as f64,
            Self::Signed(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

pub type DecodedStruct = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub format: FormatCode,
    pub width: usize,
}

/// Ordered named-field layout of a packed little-endian record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructTemplate {
    fields: Vec<FieldSpec>,
}

impl StructTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field whose width is implied by its format code.
    pub fn field(mut self, name: &str, format: FormatCode) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            format,
            width: format.width(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn byte_length(&self) -> usize {
        self.fields.iter().map(|field| field.width).sum()
    }

    pub fn decode(&self, bytes: &[u8]) -> DecodeResult<DecodedStruct> {
        let expected = self.byte_length();
        if bytes.len() != expected {
            return Err(DecodeError::StructUnpackMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let mut result = DecodedStruct::new();
        let mut offset = 0;
        for field in &self.fields {
            let slice = &bytes[offset..offset + field.width];
            result.insert(field.name.clone(), field.format.decode(slice));
            offset += field.width;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_template() -> StructTemplate {
        StructTemplate::new()
            .field("frameNumber", FormatCode::U32)
            .field("rx", FormatCode::I16)
            .field("flag", FormatCode::U8)
            .field("power", FormatCode::F32)
    }

    #[test]
    fn byte_length_sums_widths() {
        assert_eq!(stats_template().byte_length(), 11);
        assert_eq!(StructTemplate::new().byte_length(), 0);
    }

    #[test]
    fn decode_reads_little_endian_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0102_0304u32.to_le_bytes());
        bytes.extend_from_slice(&(-42i16).to_le_bytes());
        bytes.push(7);
        bytes.extend_from_slice(&1.5f32.to_le_bytes());

        let decoded = stats_template().decode(&bytes).unwrap();
        assert_eq!(decoded["frameNumber"], FieldValue::Unsigned(0x0102_0304));
        assert_eq!(decoded["rx"], FieldValue::Signed(-42));
        assert_eq!(decoded["flag"], FieldValue::Unsigned(7));
        assert_eq!(decoded["power"], FieldValue::Float(1.5));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let err = stats_template().decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::StructUnpackMismatch {
                expected: 11,
                actual: 10
            }
        ));
    }

    #[test]
    fn format_codes_parse_from_characters() {
        assert_eq!(FormatCode::from_char('Q'), Some(FormatCode::U64));
        assert_eq!(FormatCode::from_char('h'), Some(FormatCode::I16));
        assert_eq!(FormatCode::from_char('x'), None);
    }

    #[test]
    fn field_values_serialize_as_plain_numbers() {
        let decoded = stats_template()
            .decode(&[1, 0, 0, 0, 0xff, 0xff, 0, 0, 0, 0, 0])
            .unwrap();
        let json = serde_json::to_string(&decoded).unwrap();
        assert_eq!(json, r#"{"flag":0,"frameNumber":1,"power":0.0,"rx":-1}"#);
    }
}
