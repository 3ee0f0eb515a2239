//-----------------------------------------------------------------------------
// Module resolver
// Resolve ECU addresses to physical values from a HexImage

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::path::Path;

use crate::address::{EcuAddress, IntoEcuAddress};
use crate::hex_image::{HexImage, LoadOptions};
use crate::value_type::{ByteOrder, HexValue, HexValueType, decode_many, decode_scalar};
use crate::HexError;

/// Upper case hex string of raw bytes, for display
pub fn raw_bytes_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(feature = "serde")]
pub(crate) fn serialize_raw_bytes<S: serde::Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&raw_bytes_hex(bytes))
}

//-------------------------------------------------------------------------------------------------
// ResolvedValue

/// Scalar value with its provenance
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedValue {
    pub address: EcuAddress,   // Address as given
    pub resolved_address: u64, // Address used for the lookup
    pub value_type: HexValueType,
    pub byte_order: ByteOrder,
    pub value: HexValue,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_raw_bytes"))]
    pub raw_bytes: Vec<u8>,
    pub source_line: usize, // Line of the first contributing HEX record
}

impl ResolvedValue {
    pub fn raw_bytes_hex(&self) -> String {
        raw_bytes_hex(&self.raw_bytes)
    }
}

impl std::fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (0x{:X}) line {}: {} {} [{}] = {}",
            self.address,
            self.resolved_address,
            self.source_line,
            self.value_type,
            self.byte_order,
            self.raw_bytes_hex(),
            self.value
        )
    }
}

//-------------------------------------------------------------------------------------------------
// ResolvedArray

/// Fixed length array (VAL_BLK) with its provenance
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolvedArray {
    pub address: EcuAddress,
    pub resolved_address: u64,
    pub value_type: HexValueType,
    pub byte_order: ByteOrder,
    pub values: Vec<HexValue>,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_raw_bytes"))]
    pub raw_bytes: Vec<u8>,
    pub source_line: usize,
}

impl ResolvedArray {
    pub fn raw_bytes_hex(&self) -> String {
        raw_bytes_hex(&self.raw_bytes)
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Display for ResolvedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values: Vec<String> = self.values.iter().map(HexValue::to_string).collect();
        write!(
            f,
            "{} (0x{:X}) line {}: {}[{}] {} = [{}]",
            self.address,
            self.resolved_address,
            self.source_line,
            self.value_type,
            self.values.len(),
            self.byte_order,
            values.join(", ")
        )
    }
}

//-------------------------------------------------------------------------------------------------
// Resolver

/// Read and decode one scalar value at address
pub fn resolve_address<A: IntoEcuAddress>(image: &HexImage, address: A, value_type: HexValueType, byte_order: ByteOrder) -> Result<ResolvedValue, HexError> {
    let address = address.into_ecu_address()?;
    let resolved_address = address.lookup_address();
    let (raw_bytes, source_line) = image.fetch_bytes(resolved_address, value_type.size())?;
    let value = decode_scalar(&raw_bytes, value_type, byte_order)?;
    debug!("Resolved {} {} line {}: {}", address, value_type, source_line, value);

    Ok(ResolvedValue {
        address,
        resolved_address,
        value_type,
        byte_order,
        value,
        raw_bytes,
        source_line,
    })
}

/// Read and decode count consecutive values starting at address
/// Same result as count calls of resolve_address at address + i * size, but with a single lookup
pub fn resolve_array<A: IntoEcuAddress>(
    image: &HexImage,
    address: A,
    value_type: HexValueType,
    byte_order: ByteOrder,
    count: usize,
) -> Result<ResolvedArray, HexError> {
    let address = address.into_ecu_address()?;
    if count == 0 {
        return Err(HexError::InvalidCount {
            name: address.to_string(),
            count: 0,
        });
    }
    let resolved_address = address.lookup_address();
    let size = value_type.size().checked_mul(count).ok_or(HexError::Range {
        address: resolved_address,
        size: usize::MAX,
    })?;

    let (raw_bytes, source_line) = image.fetch_bytes(resolved_address, size)?;
    let values = decode_many(&raw_bytes, value_type, byte_order, count)?;
    debug!("Resolved {} {}[{}] line {}", address, value_type, count, source_line);

    Ok(ResolvedArray {
        address,
        resolved_address,
        value_type,
        byte_order,
        values,
        raw_bytes,
        source_line,
    })
}

/// Load a HEX file and resolve a single address
/// Address, data type and byte order are validated before the file is read
/// Callers resolving more than one address should load the HexImage once and use resolve_address
pub fn resolve_hex_address<P: AsRef<Path>, A: IntoEcuAddress>(path: P, address: A, data_type: &str, byte_order: &str) -> Result<ResolvedValue, HexError> {
    let address = address.into_ecu_address()?;
    let value_type: HexValueType = data_type.parse()?;
    let byte_order: ByteOrder = byte_order.parse()?;
    let image = HexImage::load_with_options(path, LoadOptions::default())?;
    resolve_address(&image, address, value_type, byte_order)
}

//-------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------
// Test module

#[cfg(test)]
mod resolver_tests {

    use super::*;
    use crate::hex_image::HexRecord;
    use crate::HexErrorCategory;

    // 0x40000..0x40200 in two adjacent records, 0x40300..0x40400 after a gap
    fn test_image() -> HexImage {
        let mut first: Vec<u8> = (0..=255u8).collect();
        first[0x10..0x14].copy_from_slice(&[0x00, 0x00, 0x48, 0x44]); // 800.0
        first[0x20..0x24].copy_from_slice(&[0x14, 0x03, 0xEC, 0xFC]); // 788, -788
        let second: Vec<u8> = (0..=255u8).rev().collect();
        let mut third = vec![0u8; 256];
        third[0x14..0x18].copy_from_slice(&[0xB8, 0x44, 0x0A, 0x42]);
        HexImage::from_records(
            vec![
                HexRecord::new(2, 0x40000, first),
                HexRecord::new(3, 0x40100, second),
                HexRecord::new(5, 0x40300, third),
            ],
            LoadOptions::default(),
        )
    }

    #[test]
    fn test_resolve_address() {
        let image = test_image();

        let r = resolve_address(&image, "0x40010", HexValueType::Float32, ByteOrder::Little).unwrap();
        assert_eq!(r.value, HexValue::Float32(800.0));
        assert_eq!(r.raw_bytes, vec![0x00, 0x00, 0x48, 0x44]);
        assert_eq!(r.raw_bytes_hex(), "00004844");
        assert_eq!(r.resolved_address, 0x40010);
        assert_eq!(r.source_line, 2);

        let r = resolve_address(&image, 0x40020i64, HexValueType::Uword, ByteOrder::Little).unwrap();
        assert_eq!(r.value, HexValue::Unsigned(788));
        let r = resolve_address(&image, "262178", HexValueType::Sword, ByteOrder::Little).unwrap();
        assert_eq!(r.address, EcuAddress::new(0x40022));
        assert_eq!(r.value, HexValue::Signed(-788));

        let r = resolve_address(&image, 0x40314i64, HexValueType::Float32, ByteOrder::Little).unwrap();
        assert_eq!(r.source_line, 5);
        assert!((r.value.as_f64() - 34.567).abs() < 1e-3);
        let b = resolve_address(&image, 0x40314i64, HexValueType::Float32, ByteOrder::Big).unwrap();
        assert_ne!(r.value, b.value);
        assert_eq!(r.raw_bytes, b.raw_bytes);
    }

    #[test]
    fn test_resolve_across_records() {
        let image = test_image();
        let r = resolve_address(&image, 0x400FEi64, HexValueType::Ulong, ByteOrder::Big).unwrap();
        assert_eq!(r.raw_bytes, vec![0xFE, 0xFF, 0xFF, 0xFE]);
        assert_eq!(r.value, HexValue::Unsigned(0xFEFF_FFFE));
        assert_eq!(r.source_line, 2);
    }

    #[test]
    fn test_resolve_negative_address() {
        let image = test_image();
        let e = resolve_address(&image, -0xfdc55c48i64, HexValueType::Float32, ByteOrder::Little).unwrap_err();
        match e {
            HexError::Range { address, size } => {
                assert_eq!(address, 0xFFFF_FFFF_FDC5_5C48);
                assert_eq!(size, 4);
            }
            _ => panic!("unexpected error"),
        }

        // High bit set address present in the image
        let image = HexImage::from_records(vec![HexRecord::new(7, 0xFFFF_FFFF_FDC5_5C40, vec![0x11; 16])], LoadOptions::default());
        let r = resolve_address(&image, "-0xFDC55C48", HexValueType::Ubyte, ByteOrder::Little).unwrap();
        assert_eq!(r.address.signed(), -0xFDC55C48);
        assert_eq!(r.resolved_address, 0xFFFF_FFFF_FDC5_5C48);
        assert_eq!(r.value, HexValue::Unsigned(0x11));
        assert_eq!(r.to_string(), "-0xFDC55C48 (0xFFFFFFFFFDC55C48) line 7: UBYTE little [11] = 17");

        // -1 is the last byte of the address space
        let image = HexImage::from_records(vec![HexRecord::new(8, u64::MAX - 3, vec![0x01, 0x02, 0x03, 0x04])], LoadOptions::default());
        let r = resolve_address(&image, -1i64, HexValueType::Ubyte, ByteOrder::Little).unwrap();
        assert_eq!(r.value, HexValue::Unsigned(0x04));
        let r = resolve_address(&image, -4i64, HexValueType::Ulong, ByteOrder::Big).unwrap();
        assert_eq!(r.value, HexValue::Unsigned(0x0102_0304));
        assert!(matches!(resolve_address(&image, -2i64, HexValueType::Ulong, ByteOrder::Little), Err(HexError::Range { .. })));
    }

    #[test]
    fn test_resolve_errors() {
        let image = test_image();
        let e = resolve_address(&image, "not_a_number", HexValueType::Float32, ByteOrder::Little).unwrap_err();
        assert_eq!(e.category(), HexErrorCategory::Value);

        // Gap between 0x40200 and 0x40300
        let e = resolve_address(&image, 0x401FEi64, HexValueType::Ulong, ByteOrder::Little).unwrap_err();
        assert_eq!(e.category(), HexErrorCategory::Range);
    }

    // Bitwise comparison, decoded floats may be NaN
    fn same_value(a: &HexValue, b: &HexValue) -> bool {
        match (a, b) {
            (HexValue::Float32(a), HexValue::Float32(b)) => a.to_bits() == b.to_bits(),
            (HexValue::Float64(a), HexValue::Float64(b)) => a.to_bits() == b.to_bits(),
            _ => a == b,
        }
    }

    #[test]
    fn test_resolve_array_equals_single_values() {
        let image = test_image();
        for value_type in HexValueType::ALL {
            for byte_order in [ByteOrder::Little, ByteOrder::Big] {
                for count in [1usize, 2, 7, 33] {
                    let start = 0x400F0u64;
                    let array = resolve_array(&image, start as i64, value_type, byte_order, count).unwrap();
                    assert_eq!(array.len(), count);
                    assert_eq!(array.raw_bytes.len(), count * value_type.size());
                    for (i, value) in array.values.iter().enumerate() {
                        let address = start + (i * value_type.size()) as u64;
                        let single = resolve_address(&image, address as i64, value_type, byte_order).unwrap();
                        assert!(same_value(value, &single.value), "{value_type} {byte_order} {i}");
                    }
                    let first = resolve_address(&image, start as i64, value_type, byte_order).unwrap();
                    assert_eq!(array.source_line, first.source_line);
                }
            }
        }
    }

    #[test]
    fn test_resolve_array_errors() {
        let image = test_image();

        let e = resolve_array(&image, 0x40000i64, HexValueType::Ulong, ByteOrder::Little, 0).unwrap_err();
        assert!(matches!(e, HexError::InvalidCount { count: 0, .. }));

        // Last element runs into the gap, no partial array
        let e = resolve_array(&image, 0x401F0i64, HexValueType::Ulong, ByteOrder::Little, 5).unwrap_err();
        assert!(matches!(e, HexError::Range { address: 0x401F0, size: 20 }));
        assert!(resolve_array(&image, 0x401F0i64, HexValueType::Ulong, ByteOrder::Little, 4).is_ok());

        let e = resolve_array(&image, 0x40000i64, HexValueType::Float64, ByteOrder::Little, usize::MAX).unwrap_err();
        assert_eq!(e.category(), HexErrorCategory::Range);
    }

    #[test]
    fn test_resolve_hex_address_validates_before_io() {
        let missing = "/nonexistent/dir/firmware.hex";
        let e = resolve_hex_address(missing, "not_a_number", "FLOAT32", "little").unwrap_err();
        assert!(matches!(e, HexError::InvalidAddress(_)));

        let e = resolve_hex_address(missing, "0x40314", "INVALID_TYPE", "little").unwrap_err();
        assert_eq!(e.category(), HexErrorCategory::Config);
        assert!(e.to_string().contains("FLOAT32, FLOAT64, ULONG, SLONG, UWORD, SWORD, UBYTE, SBYTE"));

        let e = resolve_hex_address(missing, "0x40314", "FLOAT32", "little").unwrap_err();
        assert_eq!(e.category(), HexErrorCategory::File);
    }

    #[test]
    fn test_resolve_hex_address_from_file() {
        let path = std::env::temp_dir().join(format!("ecu_hex_resolve_{}.hex", std::process::id()));
        let text = ihex::create_object_file_representation(&[
            ihex::Record::ExtendedLinearAddress(0x0004),
            ihex::Record::Data {
                offset: 0x0310,
                value: vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x48, 0x44],
            },
            ihex::Record::EndOfFile,
        ])
        .unwrap();
        std::fs::write(&path, text).unwrap();
        let r = resolve_hex_address(&path, "0x40314", "FLOAT32", "little");
        std::fs::remove_file(&path).unwrap();

        let r = r.unwrap();
        assert_eq!(r.value, HexValue::Float32(800.0));
        assert_eq!(r.source_line, 2);
    }
}
