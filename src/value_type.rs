//-----------------------------------------------------------------------------
// Module value_type
// Numeric value types of calibration parameters and their decoding from raw bytes

use byteorder::{BigEndian, LittleEndian};

use crate::HexError;

//-------------------------------------------------------------------------------------------------
// HexTypeEncoding

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HexTypeEncoding {
    Unsigned,
    Signed,
    Float,
}

//-------------------------------------------------------------------------------------------------
// HexValueType

/// Scalar value types
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum HexValueType {
    Float32,
    Float64,
    Ulong,
    Slong,
    Uword,
    Sword,
    Ubyte,
    Sbyte,
}

// Keywords found in A2L record layout names
const RECORD_LAYOUT_KEYWORDS: [(&str, HexValueType); 17] = [
    ("FLOAT64", HexValueType::Float64),
    ("FLOAT32", HexValueType::Float32),
    ("ULONG", HexValueType::Ulong),
    ("SLONG", HexValueType::Slong),
    ("UWORD", HexValueType::Uword),
    ("SWORD", HexValueType::Sword),
    ("UBYTE", HexValueType::Ubyte),
    ("SBYTE", HexValueType::Sbyte),
    ("FLOAT32_IEEE", HexValueType::Float32),
    ("FLOAT64_IEEE", HexValueType::Float64),
    ("BOOLEAN", HexValueType::Ubyte),
    ("SCALAR_BOOLEAN", HexValueType::Ubyte),
    ("SCALAR_LONG", HexValueType::Slong),
    ("LOOKUP1D_FLOAT32_IEEE", HexValueType::Float32),
    ("LOOKUP1D_X_FLOAT32_IEEE", HexValueType::Float32),
    ("LOOKUP2D_FLOAT32_IEEE", HexValueType::Float32),
    ("LOOKUP2D_X_FLOAT32_IEEE", HexValueType::Float32),
];

impl HexValueType {
    pub const ALL: [HexValueType; 8] = [
        HexValueType::Float32,
        HexValueType::Float64,
        HexValueType::Ulong,
        HexValueType::Slong,
        HexValueType::Uword,
        HexValueType::Sword,
        HexValueType::Ubyte,
        HexValueType::Sbyte,
    ];

    /// Size in bytes
    pub fn size(&self) -> usize {
        match self {
            HexValueType::Float64 => 8,
            HexValueType::Float32 | HexValueType::Ulong | HexValueType::Slong => 4,
            HexValueType::Uword | HexValueType::Sword => 2,
            HexValueType::Ubyte | HexValueType::Sbyte => 1,
        }
    }

    pub fn encoding(&self) -> HexTypeEncoding {
        match self {
            HexValueType::Ubyte | HexValueType::Uword | HexValueType::Ulong => HexTypeEncoding::Unsigned,
            HexValueType::Sbyte | HexValueType::Sword | HexValueType::Slong => HexTypeEncoding::Signed,
            HexValueType::Float32 | HexValueType::Float64 => HexTypeEncoding::Float,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HexValueType::Float32 => "FLOAT32",
            HexValueType::Float64 => "FLOAT64",
            HexValueType::Ulong => "ULONG",
            HexValueType::Slong => "SLONG",
            HexValueType::Uword => "UWORD",
            HexValueType::Sword => "SWORD",
            HexValueType::Ubyte => "UBYTE",
            HexValueType::Sbyte => "SBYTE",
        }
    }

    /// Comma separated list of all supported type names
    pub fn supported_names() -> String {
        HexValueType::ALL.iter().map(HexValueType::as_str).collect::<Vec<_>>().join(", ")
    }

    fn unknown(name: &str) -> HexError {
        HexError::UnknownType {
            name: name.to_string(),
            supported: HexValueType::supported_names(),
        }
    }

    /// Value type of an A2L record layout name like Scalar_FLOAT32_IEEE, Array_UWORD or Map_SBYTE
    /// The longest keyword contained in the name wins
    pub fn from_record_layout(record_layout: &str) -> Result<HexValueType, HexError> {
        let upper = record_layout.trim().to_uppercase();
        if upper.is_empty() {
            return Err(HexValueType::unknown(record_layout));
        }
        RECORD_LAYOUT_KEYWORDS
            .iter()
            .filter(|(keyword, _)| upper.contains(keyword))
            .max_by_key(|(keyword, _)| keyword.len())
            .map(|(_, value_type)| *value_type)
            .ok_or_else(|| HexValueType::unknown(record_layout))
    }
}

impl std::fmt::Display for HexValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HexValueType {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FLOAT32" | "FLOAT32_IEEE" => Ok(HexValueType::Float32),
            "FLOAT64" | "FLOAT64_IEEE" => Ok(HexValueType::Float64),
            "ULONG" => Ok(HexValueType::Ulong),
            "SLONG" => Ok(HexValueType::Slong),
            "UWORD" => Ok(HexValueType::Uword),
            "SWORD" => Ok(HexValueType::Sword),
            "UBYTE" => Ok(HexValueType::Ubyte),
            "SBYTE" => Ok(HexValueType::Sbyte),
            _ => Err(HexValueType::unknown(s)),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// ByteOrder

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl std::fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little"),
            ByteOrder::Big => write!(f, "big"),
        }
    }
}

impl std::str::FromStr for ByteOrder {
    type Err = HexError;

    // A2L: MSB_LAST is little endian, MSB_FIRST is big endian
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "little" | "msb_last" => Ok(ByteOrder::Little),
            "big" | "msb_first" => Ok(ByteOrder::Big),
            _ => Err(HexError::UnknownByteOrder(s.to_string())),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// HexValue

/// Decoded physical value
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum HexValue {
    Unsigned(u64),
    Signed(i64),
    Float32(f32),
    Float64(f64),
}

impl HexValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            HexValue::Unsigned(v) => v as f64,
            HexValue::Signed(v) => v as f64,
            HexValue::Float32(v) => v as f64,
            HexValue::Float64(v) => v,
        }
    }
}

impl std::fmt::Display for HexValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexValue::Unsigned(v) => write!(f, "{}", v),
            HexValue::Signed(v) => write!(f, "{}", v),
            HexValue::Float32(v) => write!(f, "{:?}", v),
            HexValue::Float64(v) => write!(f, "{:?}", v),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Decoder

// bytes holds exactly value_type.size() bytes
fn decode_as<B: byteorder::ByteOrder>(value_type: HexValueType, bytes: &[u8]) -> HexValue {
    let size = value_type.size();
    match value_type.encoding() {
        HexTypeEncoding::Unsigned => HexValue::Unsigned(B::read_uint(bytes, size)),
        HexTypeEncoding::Signed => HexValue::Signed(B::read_int(bytes, size)),
        HexTypeEncoding::Float if size == 4 => HexValue::Float32(B::read_f32(bytes)),
        HexTypeEncoding::Float => HexValue::Float64(B::read_f64(bytes)),
    }
}

/// Decode exactly value_type.size() bytes
pub fn decode_scalar(bytes: &[u8], value_type: HexValueType, byte_order: ByteOrder) -> Result<HexValue, HexError> {
    if bytes.len() != value_type.size() {
        return Err(HexError::WidthMismatch {
            value_type: value_type.to_string(),
            expected: value_type.size(),
            actual: bytes.len(),
        });
    }
    Ok(match byte_order {
        ByteOrder::Little => decode_as::<LittleEndian>(value_type, bytes),
        ByteOrder::Big => decode_as::<BigEndian>(value_type, bytes),
    })
}

/// Decode count consecutive values, bytes must hold exactly count values
pub fn decode_many(bytes: &[u8], value_type: HexValueType, byte_order: ByteOrder, count: usize) -> Result<Vec<HexValue>, HexError> {
    let expected = value_type.size() * count;
    if bytes.len() != expected {
        return Err(HexError::WidthMismatch {
            value_type: format!("{}[{}]", value_type, count),
            expected,
            actual: bytes.len(),
        });
    }
    bytes.chunks_exact(value_type.size()).map(|chunk| decode_scalar(chunk, value_type, byte_order)).collect()
}

//-------------------------------------------------------------------------------------------------
// Test module
