//-----------------------------------------------------------------------------
// Module address
// EcuAddress

use crate::HexError;

//-------------------------------------------------------------------------------------------------
// EcuAddress
// ECU address as found in A2L files and calibration databases
// Tools often store 32 bit addresses with the high bit set as negative signed values (-0xFDC55C48),
// the signed value as given is kept for display, lookups use its 64 bit two's complement

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EcuAddress(i64);

impl EcuAddress {
    pub const fn new(value: i64) -> Self {
        EcuAddress(value)
    }

    /// Signed value as given
    pub fn signed(&self) -> i64 {
        self.0
    }

    /// Unsigned address used for HEX lookups
    pub fn lookup_address(&self) -> u64 {
        self.0 as u64
    }

    /// Address 0 marks characteristics without memory location
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    fn parse(text: &str) -> Result<i64, HexError> {
        let invalid = || HexError::InvalidAddress(text.to_string());
        let s = text.trim();
        let (negative, magnitude) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if let Some(digits) = magnitude.strip_prefix("0x").or_else(|| magnitude.strip_prefix("0X")) {
            if digits.is_empty() || !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let value = u64::from_str_radix(digits, 16).map_err(|_| invalid())?;
            if negative {
                if value > i64::MIN.unsigned_abs() {
                    return Err(invalid());
                }
                Ok((value as i64).wrapping_neg())
            } else {
                // Up to 64 bit unsigned, reinterpreted as signed
                Ok(value as i64)
            }
        } else {
            s.parse::<i64>().map_err(|_| invalid())
        }
    }
}

impl From<i64> for EcuAddress {
    fn from(value: i64) -> Self {
        EcuAddress(value)
    }
}

impl From<i32> for EcuAddress {
    fn from(value: i32) -> Self {
        EcuAddress(value as i64)
    }
}

impl From<u32> for EcuAddress {
    fn from(value: u32) -> Self {
        EcuAddress(value as i64)
    }
}

impl std::str::FromStr for EcuAddress {
    type Err = HexError;

    /// Decimal ("262932", "-42"), hex ("0x40314") or negative hex ("-0xFDC55C48")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EcuAddress::parse(s).map(EcuAddress)
    }
}

impl std::fmt::Display for EcuAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-0x{:X}", self.0.unsigned_abs())
        } else {
            write!(f, "0x{:X}", self.0)
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for EcuAddress {
    // Integer or string
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum RawAddress {
            Int(i64),
            Text(String),
        }
        match RawAddress::deserialize(deserializer)? {
            RawAddress::Int(value) => Ok(EcuAddress(value)),
            RawAddress::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// IntoEcuAddress
// Address input as integer or string

pub trait IntoEcuAddress {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError>;
}

impl IntoEcuAddress for EcuAddress {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError> {
        Ok(self)
    }
}

impl IntoEcuAddress for i64 {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError> {
        Ok(EcuAddress(self))
    }
}

impl IntoEcuAddress for i32 {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError> {
        Ok(self.into())
    }
}

impl IntoEcuAddress for u32 {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError> {
        Ok(self.into())
    }
}

impl IntoEcuAddress for &str {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError> {
        self.parse()
    }
}

impl IntoEcuAddress for &String {
    fn into_ecu_address(self) -> Result<EcuAddress, HexError> {
        self.parse()
    }
}

//-------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------
// Test module
