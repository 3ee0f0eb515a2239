//-----------------------------------------------------------------------------
// Crate ecu_hex
// Path: src/lib.rs

// Resolve ECU memory addresses of calibration parameters to physical values,
// using the Intel-Hex image of the ECU firmware
//
// Use cargo test --features=serde -- --nocapture

// This crate is a library
#![crate_type = "lib"]
// The library crate is named "ecu_hex"
#![crate_name = "ecu_hex"]

//-----------------------------------------------------------------------------

// Submodule error
mod error;
pub use error::HexError;
pub use error::HexErrorCategory;

// Public submodule hex_image
pub mod hex_image;
pub use hex_image::ChecksumMode;
pub use hex_image::HexImage;
pub use hex_image::HexRecord;
pub use hex_image::LoadOptions;

// Submodule value_type
mod value_type;
pub use value_type::ByteOrder;
pub use value_type::HexTypeEncoding;
pub use value_type::HexValue;
pub use value_type::HexValueType;
pub use value_type::decode_many;
pub use value_type::decode_scalar;

// Submodule address
mod address;
pub use address::EcuAddress;
pub use address::IntoEcuAddress;

// Submodule resolver
mod resolver;
pub use resolver::ResolvedArray;
pub use resolver::ResolvedValue;
pub use resolver::raw_bytes_hex;
pub use resolver::resolve_address;
pub use resolver::resolve_array;
pub use resolver::resolve_hex_address;

// Submodule characteristic
mod characteristic;
pub use characteristic::AxisDescr;
pub use characteristic::BatchSummary;
pub use characteristic::BlockValues;
pub use characteristic::Characteristic;
pub use characteristic::CharacteristicData;
pub use characteristic::CharacteristicType;
pub use characteristic::CharacteristicValue;
pub use characteristic::resolve_characteristic;
pub use characteristic::resolve_characteristics;
pub use characteristic::resolve_curve;
pub use characteristic::resolve_map;

//-----------------------------------------------------------------------------
// Test helpers
