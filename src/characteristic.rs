//-----------------------------------------------------------------------------
// Module characteristic
// Calibration parameters (A2L CHARACTERISTIC) and their values in a HexImage
//
// The descriptors are supplied by an external A2L reader or calibration database,
// this module only reads and decodes their memory

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::address::EcuAddress;
use crate::hex_image::HexImage;
use crate::resolver::{ResolvedArray, resolve_array};
use crate::value_type::{ByteOrder, HexValue, HexValueType};
use crate::HexError;

#[cfg(feature = "serde")]
use crate::resolver::serialize_raw_bytes;

//-------------------------------------------------------------------------------------------------
// CharacteristicType

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CharacteristicType {
    #[default]
    Value,
    ValBlk,
    Curve,
    Map,
}

impl std::fmt::Display for CharacteristicType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CharacteristicType::Value => write!(f, "VALUE"),
            CharacteristicType::ValBlk => write!(f, "VAL_BLK"),
            CharacteristicType::Curve => write!(f, "CURVE"),
            CharacteristicType::Map => write!(f, "MAP"),
        }
    }
}

impl std::str::FromStr for CharacteristicType {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "VALUE" => Ok(CharacteristicType::Value),
            "VAL_BLK" => Ok(CharacteristicType::ValBlk),
            "CURVE" => Ok(CharacteristicType::Curve),
            "MAP" => Ok(CharacteristicType::Map),
            _ => Err(HexError::UnknownType {
                name: s.to_string(),
                supported: "VALUE, VAL_BLK, CURVE, MAP".to_string(),
            }),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Descriptors

/// Axis description of a CURVE or MAP
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisDescr {
    pub name: String,
    pub record_layout: String,
    pub ecu_address: EcuAddress,
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_axis_points: u32,
}

impl AxisDescr {
    pub fn new<T: Into<String>, L: Into<String>>(name: T, record_layout: L, ecu_address: i64, max_axis_points: u32) -> AxisDescr {
        AxisDescr {
            name: name.into(),
            record_layout: record_layout.into(),
            ecu_address: EcuAddress::new(ecu_address),
            max_axis_points,
        }
    }
}

/// Calibration parameter description
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Characteristic {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub characteristic_type: CharacteristicType,
    pub record_layout: String,
    pub ecu_address: EcuAddress,
    #[cfg_attr(feature = "serde", serde(default))]
    pub number: Option<u32>, // Number of elements, VAL_BLK and CURVE
    #[cfg_attr(feature = "serde", serde(default))]
    pub byte_order: ByteOrder,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub x_axis: Option<AxisDescr>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub y_axis: Option<AxisDescr>,
}

impl Characteristic {
    pub fn new<T: Into<String>, L: Into<String>>(name: T, characteristic_type: CharacteristicType, record_layout: L, ecu_address: i64) -> Characteristic {
        Characteristic {
            name: name.into(),
            characteristic_type,
            record_layout: record_layout.into(),
            ecu_address: EcuAddress::new(ecu_address),
            ..Default::default()
        }
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_x_axis(mut self, axis: AxisDescr) -> Self {
        self.x_axis = Some(axis);
        self
    }

    pub fn with_y_axis(mut self, axis: AxisDescr) -> Self {
        self.y_axis = Some(axis);
        self
    }

    /// Number of elements stored at ecu_address
    /// VALUE is always 1, VAL_BLK and CURVE need a number > 0
    /// The size of a MAP is given by its axes, see resolve_map
    pub fn element_count(&self) -> Result<usize, HexError> {
        match self.characteristic_type {
            CharacteristicType::Value => Ok(1),
            _ => match self.number {
                Some(number) if number > 0 => Ok(number as usize),
                number => Err(HexError::InvalidCount {
                    name: self.name.clone(),
                    count: number.unwrap_or(0) as i64,
                }),
            },
        }
    }

    pub fn value_type(&self) -> Result<HexValueType, HexError> {
        HexValueType::from_record_layout(&self.record_layout)
    }
}

//-------------------------------------------------------------------------------------------------
// Results

/// Values of one memory block (characteristic data or axis) with provenance
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BlockValues {
    pub name: String,
    pub record_layout: String,
    pub address: EcuAddress,
    pub line_no: usize,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_raw_bytes"))]
    pub raw_bytes: Vec<u8>,
    pub values: Vec<HexValue>,
}

impl BlockValues {
    fn new(name: &str, record_layout: &str, array: ResolvedArray) -> BlockValues {
        BlockValues {
            name: name.to_string(),
            record_layout: record_layout.to_string(),
            address: array.address,
            line_no: array.source_line,
            raw_bytes: array.raw_bytes,
            values: array.values,
        }
    }

    pub fn byte_count(&self) -> usize {
        self.raw_bytes.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CharacteristicData {
    Value(HexValue),
    ValBlk(Vec<HexValue>),
    Curve {
        x_axis: BlockValues,
        y_axis: BlockValues,
        data_points: Vec<(HexValue, HexValue)>,
    },
    Map {
        x_axis: BlockValues,
        y_axis: BlockValues,
        z_data: BlockValues,
        matrix: Vec<Vec<HexValue>>, // [y][x]
    },
}

/// Resolved characteristic
/// address, line_no and raw_bytes describe the memory at the characteristic address
/// (the value, the array, the CURVE Y values or the MAP Z data)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CharacteristicValue {
    pub name: String,
    pub characteristic_type: CharacteristicType,
    pub record_layout: String,
    pub address: EcuAddress,
    pub line_no: usize,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_raw_bytes"))]
    pub raw_bytes: Vec<u8>,
    pub data: CharacteristicData,
}

impl CharacteristicValue {
    pub fn byte_count(&self) -> usize {
        self.raw_bytes.len()
    }

    /// All values at the characteristic address, a VALUE gives a single element
    pub fn values(&self) -> Vec<HexValue> {
        match &self.data {
            CharacteristicData::Value(value) => vec![*value],
            CharacteristicData::ValBlk(values) => values.clone(),
            CharacteristicData::Curve { y_axis, .. } => y_axis.values.clone(),
            CharacteristicData::Map { z_data, .. } => z_data.values.clone(),
        }
    }
}

impl std::fmt::Display for CharacteristicValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} line {} [{}]: ", self.name, self.characteristic_type, self.address, self.line_no, self.byte_count())?;
        let join = |values: &[HexValue]| values.iter().map(HexValue::to_string).collect::<Vec<_>>().join(", ");
        match &self.data {
            CharacteristicData::Value(value) => write!(f, "{}", value),
            CharacteristicData::ValBlk(values) => write!(f, "[{}]", join(values)),
            CharacteristicData::Curve { data_points, .. } => {
                let points: Vec<String> = data_points.iter().map(|(x, y)| format!("({}, {})", x, y)).collect();
                write!(f, "{}", points.join(", "))
            }
            CharacteristicData::Map { x_axis, y_axis, matrix, .. } => {
                write!(f, "x=[{}] y=[{}]", join(&x_axis.values), join(&y_axis.values))?;
                for row in matrix {
                    write!(f, " [{}]", join(row))?;
                }
                Ok(())
            }
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Resolver

fn read_block(image: &HexImage, name: &str, record_layout: &str, address: EcuAddress, byte_order: ByteOrder, count: usize) -> Result<BlockValues, HexError> {
    let value_type = HexValueType::from_record_layout(record_layout)?;
    let array = resolve_array(image, address, value_type, byte_order, count)?;
    Ok(BlockValues::new(name, record_layout, array))
}

fn axis_point_count(name: &str, axis: &AxisDescr) -> Result<usize, HexError> {
    if axis.max_axis_points == 0 {
        return Err(HexError::InvalidCount {
            name: format!("{}.{}", name, axis.name),
            count: 0,
        });
    }
    Ok(axis.max_axis_points as usize)
}

/// Read a characteristic of any type
pub fn resolve_characteristic(image: &HexImage, characteristic: &Characteristic) -> Result<CharacteristicValue, HexError> {
    let c = characteristic;
    match c.characteristic_type {
        CharacteristicType::Curve => return resolve_curve(image, c),
        CharacteristicType::Map => return resolve_map(image, c),
        CharacteristicType::Value | CharacteristicType::ValBlk => {}
    }

    let count = c.element_count()?;
    let block = read_block(image, &c.name, &c.record_layout, c.ecu_address, c.byte_order, count)?;
    let data = match c.characteristic_type {
        CharacteristicType::Value => CharacteristicData::Value(block.values[0]),
        _ => CharacteristicData::ValBlk(block.values),
    };
    Ok(CharacteristicValue {
        name: c.name.clone(),
        characteristic_type: c.characteristic_type,
        record_layout: c.record_layout.clone(),
        address: block.address,
        line_no: block.line_no,
        raw_bytes: block.raw_bytes,
        data,
    })
}

/// Read a CURVE, Y values at the characteristic address, X values at the axis address
/// The X axis has max_axis_points values, or number values if max_axis_points is 0
pub fn resolve_curve(image: &HexImage, characteristic: &Characteristic) -> Result<CharacteristicValue, HexError> {
    let c = characteristic;
    let x_descr = c.x_axis.as_ref().ok_or_else(|| HexError::MissingAxis {
        name: c.name.clone(),
        axis: "X",
    })?;
    let y_count = c.element_count()?;
    let x_count = if x_descr.max_axis_points > 0 { x_descr.max_axis_points as usize } else { y_count };

    let mut y_axis = read_block(image, &c.name, &c.record_layout, c.ecu_address, c.byte_order, y_count)?;
    let mut x_axis = read_block(image, &x_descr.name, &x_descr.record_layout, x_descr.ecu_address, c.byte_order, x_count)?;

    let point_count = x_axis.values.len().min(y_axis.values.len());
    if x_axis.values.len() != y_axis.values.len() {
        warn!(
            "CURVE {} X/Y length mismatch: X={} Y={}, using the first {} points",
            c.name,
            x_axis.values.len(),
            y_axis.values.len(),
            point_count
        );
        x_axis.values.truncate(point_count);
        y_axis.values.truncate(point_count);
    }
    let data_points = x_axis.values.iter().copied().zip(y_axis.values.iter().copied()).collect();

    Ok(CharacteristicValue {
        name: c.name.clone(),
        characteristic_type: CharacteristicType::Curve,
        record_layout: c.record_layout.clone(),
        address: y_axis.address,
        line_no: y_axis.line_no,
        raw_bytes: y_axis.raw_bytes.clone(),
        data: CharacteristicData::Curve { x_axis, y_axis, data_points },
    })
}

/// Read a MAP, Z data at the characteristic address, stored row by row:
/// [y0x0, y0x1, .. y0xN, y1x0, ..]
pub fn resolve_map(image: &HexImage, characteristic: &Characteristic) -> Result<CharacteristicValue, HexError> {
    let c = characteristic;
    let x_descr = c.x_axis.as_ref().ok_or_else(|| HexError::MissingAxis {
        name: c.name.clone(),
        axis: "X",
    })?;
    let y_descr = c.y_axis.as_ref().ok_or_else(|| HexError::MissingAxis {
        name: c.name.clone(),
        axis: "Y",
    })?;
    let x_count = axis_point_count(&c.name, x_descr)?;
    let y_count = axis_point_count(&c.name, y_descr)?;

    let x_axis = read_block(image, &x_descr.name, &x_descr.record_layout, x_descr.ecu_address, c.byte_order, x_count)?;
    let y_axis = read_block(image, &y_descr.name, &y_descr.record_layout, y_descr.ecu_address, c.byte_order, y_count)?;
    let z_data = read_block(image, &c.name, &c.record_layout, c.ecu_address, c.byte_order, x_count * y_count)?;
    let matrix = z_data.values.chunks(x_count).map(<[HexValue]>::to_vec).collect();

    Ok(CharacteristicValue {
        name: c.name.clone(),
        characteristic_type: CharacteristicType::Map,
        record_layout: c.record_layout.clone(),
        address: z_data.address,
        line_no: z_data.line_no,
        raw_bytes: z_data.raw_bytes.clone(),
        data: CharacteristicData::Map { x_axis, y_axis, z_data, matrix },
    })
}

//-------------------------------------------------------------------------------------------------
// Batch

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BatchSummary {
    pub resolved: usize,
    pub skipped_null_address: usize,
    pub skipped_unsupported: usize, // Unknown record layout, invalid count or missing axis
    pub skipped_out_of_range: usize,
}

impl BatchSummary {
    pub fn skipped(&self) -> usize {
        self.skipped_null_address + self.skipped_unsupported + self.skipped_out_of_range
    }
}

/// Read a list of characteristics, skipping those which can not be resolved
/// Characteristics with address 0 have no memory location and are skipped
pub fn resolve_characteristics(image: &HexImage, characteristics: &[Characteristic]) -> (Vec<CharacteristicValue>, BatchSummary) {
    let mut summary = BatchSummary::default();
    let mut values = Vec::with_capacity(characteristics.len());

    for c in characteristics {
        if c.ecu_address.is_null() {
            info!("Characteristic {} has address 0, skipped", c.name);
            summary.skipped_null_address += 1;
            continue;
        }
        match resolve_characteristic(image, c) {
            Ok(value) => {
                summary.resolved += 1;
                values.push(value);
            }
            Err(e @ HexError::Range { .. }) => {
                warn!("Characteristic {} at {} not in HEX data: {}", c.name, c.ecu_address, e);
                summary.skipped_out_of_range += 1;
            }
            Err(e) => {
                warn!("Characteristic {} ({} {}) skipped: {}", c.name, c.characteristic_type, c.record_layout, e);
                summary.skipped_unsupported += 1;
            }
        }
    }

    info!(
        "Resolved {} of {} characteristics, {} skipped",
        summary.resolved,
        characteristics.len(),
        summary.skipped()
    );
    (values, summary)
}

//-------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------
// Test module
