//--------------------------------------------------------------------------------------------------------------------------------------------------
// Module hex_image
// Load an Intel-Hex file (.HEX) into a sorted, randomly addressable record index
//
// Only data records and extended linear address records contribute to the image,
// all other record types are recognized and skipped

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use std::path::{Path, PathBuf};

pub mod hex_format;
use hex_format::HexLine;
use hex_format::{RECORD_START, RECORD_TYPE_DATA, RECORD_TYPE_EXTENDED_LINEAR_ADDRESS};

use crate::HexError;

//-------------------------------------------------------------------------------------------------
// Load options

/// Checksum handling when loading a HEX file
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChecksumMode {
    /// Checksums are parsed but not verified, unknown record types are skipped
    #[default]
    Lenient,
    /// Every record is validated with the ihex reader,
    /// a checksum mismatch, an unknown record type or a wrong payload length for the record type aborts loading
    Strict,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadOptions {
    pub checksum: ChecksumMode,
}

impl LoadOptions {
    pub fn strict() -> LoadOptions {
        LoadOptions { checksum: ChecksumMode::Strict }
    }
}

//-------------------------------------------------------------------------------------------------
// HexRecord

/// One data record of a HEX file with its absolute address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexRecord {
    line_no: usize,     // 1 based line number in the source file
    offset: u16,        // Offset field of the source line
    base_address: u64,  // (extended linear address << 16) + offset
    data: Vec<u8>,      // Never empty
    checksum: u8,       // Checksum field of the source line, not necessarily valid
}

impl HexRecord {
    /// Create a record which did not come from a parsed line, offset and checksum are derived from the address and data
    pub fn new(line_no: usize, base_address: u64, data: Vec<u8>) -> HexRecord {
        let offset = (base_address & 0xFFFF) as u16;
        let checksum = HexLine {
            offset,
            record_type: RECORD_TYPE_DATA,
            data: data.clone(),
            checksum: 0,
        }
        .expected_checksum();
        HexRecord {
            line_no,
            offset,
            base_address,
            data,
            checksum,
        }
    }

    fn from_line(line_no: usize, extended_upper: u64, line: HexLine) -> HexRecord {
        HexRecord {
            line_no,
            offset: line.offset,
            base_address: (extended_upper << 16) + line.offset as u64,
            data: line.data,
            checksum: line.checksum,
        }
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }
    pub fn offset(&self) -> u16 {
        self.offset
    }
    pub fn record_type(&self) -> u8 {
        RECORD_TYPE_DATA
    }
    pub fn checksum(&self) -> u8 {
        self.checksum
    }
    pub fn base_address(&self) -> u64 {
        self.base_address
    }
    /// Last address covered by this record, None if the record is empty or reaches beyond u64::MAX
    pub fn last_address(&self) -> Option<u64> {
        let len = self.data.len() as u64;
        self.base_address.checked_add(len.checked_sub(1)?)
    }
    pub fn data(&self) -> &[u8] {
        &self.data
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base_address && address - self.base_address < self.data.len() as u64
    }
}

//-------------------------------------------------------------------------------------------------
// HexImage

/// Read only memory image of a HEX file
/// Records are sorted by base address, records with equal base address keep their file order
/// Overlapping records are not merged, which bytes win in an overlap is undefined
#[derive(Debug)]
pub struct HexImage {
    path: Option<PathBuf>,
    options: LoadOptions,
    records: Vec<HexRecord>,
    record_starts: Vec<u64>, // records[i].base_address, for binary search
}

impl HexImage {
    /// Load a HEX file with default options (checksums not verified)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<HexImage, HexError> {
        HexImage::load_with_options(path, LoadOptions::default())
    }

    pub fn load_with_options<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<HexImage, HexError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HexError::File {
            path: path.to_path_buf(),
            source,
        })?;

        let mut image = HexImage::from_hex_str(&text, options)?;
        image.path = Some(path.to_path_buf());

        info!("Loaded HEX file {}: {} data records, {} bytes", path.display(), image.len(), image.data_byte_count());
        if let Some((start, end)) = image.address_range() {
            debug!("  Address range 0x{:08X}..=0x{:08X}", start, end);
        }
        Ok(image)
    }

    /// Build an image from the text content of a HEX file
    pub fn from_hex_str(text: &str, options: LoadOptions) -> Result<HexImage, HexError> {
        let mut records = Vec::new();
        let mut extended_upper: u64 = 0;

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.as_bytes().first() != Some(&RECORD_START) {
                if !line.is_empty() {
                    trace!("Skipping line {}, no record start", line_no);
                }
                continue;
            }

            let hex_line = HexLine::parse(line_no, line)?;
            if options.checksum == ChecksumMode::Strict {
                ihex::Record::from_record_string(line).map_err(|e| HexError::format(line_no, e.to_string()))?;
            }

            match hex_line.record_type {
                RECORD_TYPE_DATA => {
                    if hex_line.data.is_empty() {
                        trace!("Skipping empty data record in line {}", line_no);
                        continue;
                    }
                    records.push(HexRecord::from_line(line_no, extended_upper, hex_line));
                }
                RECORD_TYPE_EXTENDED_LINEAR_ADDRESS => {
                    if hex_line.data.len() != 2 {
                        return Err(HexError::format(
                            line_no,
                            format!("extended linear address record needs 2 data bytes, found {}", hex_line.data.len()),
                        ));
                    }
                    extended_upper = u16::from_be_bytes([hex_line.data[0], hex_line.data[1]]) as u64;
                    debug!("Extended linear address 0x{:04X} in line {}", extended_upper, line_no);
                }
                _ if hex_line.is_known_record_type() => {
                    trace!("Skipping record type 0x{:02X} in line {}", hex_line.record_type, line_no);
                }
                record_type => {
                    warn!("Ignoring unknown record type 0x{:02X} in line {}", record_type, line_no);
                }
            }
        }

        Ok(HexImage::from_records(records, options))
    }

    /// Build an image from records which are already parsed
    /// Empty records and records reaching beyond the 64 bit address space are dropped
    pub fn from_records(mut records: Vec<HexRecord>, options: LoadOptions) -> HexImage {
        records.retain(|record| {
            if !record.is_empty() && record.last_address().is_none() {
                warn!("Ignoring record of line {} at 0x{:X}, {} bytes exceed the address space", record.line_no, record.base_address, record.len());
            }
            record.last_address().is_some()
        });
        // Stable sort, file order decides between equal base addresses
        records.sort_by_key(|record| record.base_address);
        let record_starts = records.iter().map(|record| record.base_address).collect();
        HexImage {
            path: None,
            options,
            records,
            record_starts,
        }
    }

    /// Path of the file this image was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    /// All data records, sorted by base address
    pub fn records(&self) -> &[HexRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total number of data bytes, overlapping bytes are counted twice
    pub fn data_byte_count(&self) -> usize {
        self.records.iter().map(HexRecord::len).sum()
    }

    /// Lowest and highest address covered by records, both inclusive
    pub fn address_range(&self) -> Option<(u64, u64)> {
        let start = self.records.first()?.base_address;
        let last = self.records.iter().filter_map(HexRecord::last_address).max()?;
        Some((start, last))
    }

    // Index of the last record starting at or before address, 0 if address precedes all records
    fn start_index(&self, address: u64) -> usize {
        let mut low = 0;
        let mut high = self.record_starts.len();
        while low < high {
            let mid = low + (high - low) / 2;
            if self.record_starts[mid] <= address {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low.saturating_sub(1)
    }

    /// Record containing address
    pub fn record_at(&self, address: u64) -> Option<&HexRecord> {
        let record = self.records.get(self.start_index(address))?;
        if record.contains(address) { Some(record) } else { None }
    }

    /// Get size bytes starting at address and the line number of the first contributing record
    /// The range may span several records, but it must be covered without gaps
    pub fn fetch_bytes(&self, address: u64, size: usize) -> Result<(Vec<u8>, usize), HexError> {
        if size == 0 {
            return Err(HexError::EmptyRange(address));
        }
        let range_error = || HexError::Range { address, size };
        address.checked_add(size as u64 - 1).ok_or_else(range_error)?;

        let mut cursor = address;
        let mut remaining = size;
        let mut data = Vec::with_capacity(size);
        let mut first_line = None;

        let mut idx = self.start_index(address);
        while remaining > 0 {
            let Some(record) = self.records.get(idx) else {
                break;
            };
            if cursor < record.base_address {
                // Gap
                break;
            }
            if !record.contains(cursor) {
                idx += 1;
                continue;
            }

            let offset = (cursor - record.base_address) as usize;
            let take = remaining.min(record.data.len() - offset);
            first_line.get_or_insert(record.line_no);
            data.extend_from_slice(&record.data[offset..offset + take]);
            remaining -= take;
            if remaining == 0 {
                break;
            }
            // Does not overflow, the range ends at or below u64::MAX
            cursor += take as u64;
            idx += 1;
        }

        match first_line {
            Some(line_no) if remaining == 0 => Ok((data, line_no)),
            _ => Err(range_error()),
        }
    }
}

//-------------------------------------------------------------------------------------------------
//-------------------------------------------------------------------------------------------------
// Test module

#[cfg(test)]
mod hex_image_tests {

    use super::*;
    use crate::test_util::test_setup;

    fn image_from_ihex(records: &[ihex::Record]) -> HexImage {
        let text = ihex::create_object_file_representation(records).unwrap();
        HexImage::from_hex_str(&text, LoadOptions::strict()).unwrap()
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
    }

    // Three records of 256 bytes at 0x40000, 0x40100 and 0x40300, gap between 0x40200 and 0x40300
    fn three_record_image() -> HexImage {
        let mut third = pattern(256, 3);
        third[20..24].copy_from_slice(&[0xB8, 0x44, 0x0A, 0x42]);
        HexImage::from_records(
            vec![
                HexRecord::new(30, 0x40300, third),
                HexRecord::new(10, 0x40000, pattern(256, 1)),
                HexRecord::new(20, 0x40100, pattern(256, 2)),
            ],
            LoadOptions::default(),
        )
    }

    #[test]
    fn test_load_extended_linear_address() {
        let image = image_from_ihex(&[
            ihex::Record::ExtendedLinearAddress(0x0004),
            ihex::Record::Data {
                offset: 0x0310,
                value: vec![0x00, 0x00, 0x00, 0x00, 0xB8, 0x44, 0x0A, 0x42],
            },
            ihex::Record::ExtendedLinearAddress(0x8000),
            ihex::Record::Data {
                offset: 0x0000,
                value: vec![1, 2, 3, 4],
            },
            ihex::Record::EndOfFile,
        ]);

        assert_eq!(image.len(), 2);
        let records = image.records();
        assert_eq!(records[0].base_address(), 0x40310);
        assert_eq!(records[0].last_address(), Some(0x40317));
        assert_eq!(records[0].line_no(), 2);
        assert_eq!(records[0].offset(), 0x0310);
        assert_eq!(records[1].base_address(), 0x8000_0000);
        assert_eq!(records[1].line_no(), 4);
        assert_eq!(image.address_range(), Some((0x40310, 0x8000_0003)));
        assert_eq!(image.data_byte_count(), 12);

        let (data, line_no) = image.fetch_bytes(0x40314, 4).unwrap();
        assert_eq!(data, vec![0xB8, 0x44, 0x0A, 0x42]);
        assert_eq!(line_no, 2);
    }

    #[test]
    fn test_records_sorted_by_address() {
        // Records appear in descending address order in the file
        let image = image_from_ihex(&[
            ihex::Record::Data {
                offset: 0x0200,
                value: vec![3; 16],
            },
            ihex::Record::Data {
                offset: 0x0100,
                value: vec![2; 16],
            },
            ihex::Record::Data {
                offset: 0x0000,
                value: vec![1; 16],
            },
            ihex::Record::EndOfFile,
        ]);
        let starts: Vec<u64> = image.records().iter().map(HexRecord::base_address).collect();
        assert_eq!(starts, vec![0x0000, 0x0100, 0x0200]);
        assert_eq!(image.records()[0].line_no(), 3);
        assert_eq!(image.record_starts, starts);
    }

    #[test]
    fn test_skip_lines_without_record_start() {
        let text = "\n// generated by flash tool\n:0400140044FA0000AA\n\n   \n:00000001FF\n";
        let image = HexImage::from_hex_str(text, LoadOptions::strict()).unwrap();
        assert_eq!(image.len(), 1);
        assert_eq!(image.records()[0].line_no(), 3);
        assert_eq!(image.records()[0].base_address(), 0x14);
    }

    #[test]
    fn test_segment_records_do_not_change_address() {
        // Extended segment address record (02) is skipped and does not change the upper address
        let text = ":020000040001F9\n:020000021000EC\n:0400140044FA0000AA\n";
        let image = HexImage::from_hex_str(text, LoadOptions::strict()).unwrap();
        assert_eq!(image.records()[0].base_address(), 0x10014);
    }

    #[test]
    fn test_checksum_modes() {
        let text = ":0400140044FA000000\n";
        let image = HexImage::from_hex_str(text, LoadOptions::default()).unwrap();
        assert_eq!(image.records()[0].checksum(), 0x00);

        let e = HexImage::from_hex_str(text, LoadOptions::strict()).unwrap_err();
        assert!(matches!(e, HexError::Format { line: 1, .. }));
        assert!(e.to_string().contains("checksum"), "{e}");
    }

    #[test]
    fn test_strict_record_validation() {
        // Start linear address record with a 2 byte payload, valid checksum
        let text = ":020000040004F6\n:0400140044FA0000AA\n:020000050000F9\n:00000001FF\n";
        let image = HexImage::from_hex_str(text, LoadOptions::default()).unwrap();
        assert_eq!(image.records()[0].base_address(), 0x40014);
        let e = HexImage::from_hex_str(text, LoadOptions::strict()).unwrap_err();
        assert!(matches!(e, HexError::Format { line: 3, .. }));

        // Valid files load the same in both modes
        let text = ":020000040004F6\n:0400140044FA0000AA\n:0400000500040314DC\n:00000001FF\n";
        let lenient = HexImage::from_hex_str(text, LoadOptions::default()).unwrap();
        let strict = HexImage::from_hex_str(text, LoadOptions::strict()).unwrap();
        assert_eq!(lenient.records(), strict.records());
    }

    #[test]
    fn test_unknown_record_type() {
        test_setup(log::LevelFilter::Warn);
        let text = ":0400140044FA0000AA\n:00000007F9\n";
        assert_eq!(HexImage::from_hex_str(text, LoadOptions::default()).unwrap().len(), 1);
        let e = HexImage::from_hex_str(text, LoadOptions::strict()).unwrap_err();
        assert!(matches!(e, HexError::Format { line: 2, .. }));
    }

    #[test]
    fn test_format_errors() {
        // Extended linear address with 1 data byte
        let e = HexImage::from_hex_str(":0400140044FA0000AA\n:0100000400FB\n", LoadOptions::default()).unwrap_err();
        assert!(matches!(e, HexError::Format { line: 2, .. }));

        // Byte count does not match payload
        let e = HexImage::from_hex_str(":0400140044FA0000AA\n\n:0300140044FA0000AA\n", LoadOptions::default()).unwrap_err();
        assert!(matches!(e, HexError::Format { line: 3, .. }));

        // Non hex digits
        let e = HexImage::from_hex_str(":04001400ZZFA0000AA\n", LoadOptions::default()).unwrap_err();
        assert!(matches!(e, HexError::Format { line: 1, .. }));
    }

    #[test]
    fn test_load_file() {
        test_setup(log::LevelFilter::Debug);
        let path = std::env::temp_dir().join(format!("ecu_hex_load_{}.hex", std::process::id()));
        std::fs::write(&path, ":020000040004F6\r\n:0400140044FA0000AA\r\n:00000001FF\r\n").unwrap();
        let image = HexImage::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(image.path(), Some(path.as_path()));
        assert_eq!(image.options(), LoadOptions::default());
        let (data, line_no) = image.fetch_bytes(0x40014, 2).unwrap();
        assert_eq!(data, vec![0x44, 0xFA]);
        assert_eq!(line_no, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let e = HexImage::load("/nonexistent/dir/firmware.hex").unwrap_err();
        match &e {
            HexError::File { path, .. } => assert_eq!(path, &PathBuf::from("/nonexistent/dir/firmware.hex")),
            _ => panic!("unexpected error {e}"),
        }
    }

    #[test]
    fn test_binary_search_locates_record() {
        let image = three_record_image();
        let (data, line_no) = image.fetch_bytes(0x40314, 4).unwrap();
        assert_eq!(data, vec![0xB8, 0x44, 0x0A, 0x42]);
        assert_eq!(line_no, 30);

        assert_eq!(image.record_at(0x40000).map(HexRecord::line_no), Some(10));
        assert_eq!(image.record_at(0x401FF).map(HexRecord::line_no), Some(20));
        assert_eq!(image.record_at(0x40200), None);
        assert_eq!(image.record_at(0x3FFFF), None);
    }

    #[test]
    fn test_fetch_matches_record_bytes() {
        let image = three_record_image();
        for record in image.records() {
            for (offset, width) in [(0usize, 1usize), (1, 2), (13, 4), (100, 8), (252, 4), (255, 1)] {
                let address = record.base_address() + offset as u64;
                let (data, line_no) = image.fetch_bytes(address, width).unwrap();
                assert_eq!(data.as_slice(), &record.data()[offset..offset + width]);
                assert_eq!(line_no, record.line_no());
            }
        }
    }

    #[test]
    fn test_fetch_across_adjacent_records() {
        let image = three_record_image();
        let (data, line_no) = image.fetch_bytes(0x400FE, 4).unwrap();
        let records = image.records();
        assert_eq!(&data[0..2], &records[0].data()[254..256]);
        assert_eq!(&data[2..4], &records[1].data()[0..2]);
        assert_eq!(line_no, 10);

        // Whole first two records
        let (data, _) = image.fetch_bytes(0x40000, 512).unwrap();
        assert_eq!(data.len(), 512);
        assert_eq!(&data[..256], records[0].data());
        assert_eq!(&data[256..], records[1].data());
    }

    #[test]
    fn test_fetch_gap_fails() {
        let image = three_record_image();

        // Prefix available, continues into the gap
        let e = image.fetch_bytes(0x401FE, 4).unwrap_err();
        assert!(matches!(e, HexError::Range { address: 0x401FE, size: 4 }));

        // Inside the gap
        assert!(matches!(image.fetch_bytes(0x40250, 1), Err(HexError::Range { .. })));

        // Spanning the gap
        assert!(matches!(image.fetch_bytes(0x401F0, 0x120), Err(HexError::Range { .. })));

        // Before any data and after all data
        assert!(matches!(image.fetch_bytes(0x10, 4), Err(HexError::Range { .. })));
        assert!(matches!(image.fetch_bytes(0x403FE, 4), Err(HexError::Range { .. })));
        assert!(matches!(image.fetch_bytes(0xFFFF_FFFF_FDC5_5C48, 4), Err(HexError::Range { .. })));
        assert!(matches!(image.fetch_bytes(u64::MAX, 2), Err(HexError::Range { .. })));

        assert!(matches!(image.fetch_bytes(0x40000, 0), Err(HexError::EmptyRange(0x40000))));
    }

    #[test]
    fn test_empty_image() {
        let image = HexImage::from_hex_str(":00000001FF\n", LoadOptions::default()).unwrap();
        assert!(image.is_empty());
        assert_eq!(image.address_range(), None);
        assert!(matches!(image.fetch_bytes(0, 1), Err(HexError::Range { .. })));
    }

    #[test]
    fn test_overlapping_records_keep_file_order() {
        let image = HexImage::from_records(
            vec![HexRecord::new(1, 0x100, vec![1; 8]), HexRecord::new(2, 0x100, vec![2; 8])],
            LoadOptions::default(),
        );
        let lines: Vec<usize> = image.records().iter().map(HexRecord::line_no).collect();
        assert_eq!(lines, vec![1, 2]);
        // A range starting in the overlap is served without gap
        let (data, _) = image.fetch_bytes(0x104, 4).unwrap();
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_record_at_top_of_address_space() {
        test_setup(log::LevelFilter::Warn);
        let image = HexImage::from_records(
            vec![
                HexRecord::new(1, u64::MAX - 15, pattern(16, 9)),
                HexRecord::new(2, u64::MAX - 3, vec![0; 8]), // Beyond u64::MAX, dropped
            ],
            LoadOptions::default(),
        );
        assert_eq!(image.len(), 1);
        let record = &image.records()[0];
        assert_eq!(record.last_address(), Some(u64::MAX));
        assert_eq!(image.address_range(), Some((u64::MAX - 15, u64::MAX)));

        let (data, line_no) = image.fetch_bytes(u64::MAX - 7, 4).unwrap();
        assert_eq!(data.as_slice(), &record.data()[8..12]);
        assert_eq!(line_no, 1);

        // Range ending exactly at the last address
        let (data, _) = image.fetch_bytes(u64::MAX - 3, 4).unwrap();
        assert_eq!(data.as_slice(), &record.data()[12..16]);
        assert_eq!(image.fetch_bytes(u64::MAX, 1).unwrap().0, vec![record.data()[15]]);

        assert!(matches!(image.fetch_bytes(u64::MAX, 2), Err(HexError::Range { .. })));
        assert_eq!(image.record_at(u64::MAX).map(HexRecord::line_no), Some(1));
        assert_eq!(image.record_at(u64::MAX - 16), None);

        let overflowing = HexRecord::new(3, u64::MAX - 3, vec![0; 8]);
        assert_eq!(overflowing.last_address(), None);
        assert!(overflowing.contains(u64::MAX));
        assert!(HexRecord::new(4, 0x100, Vec::new()).last_address().is_none());
    }

    #[test]
    fn test_concurrent_fetch() {
        let image = three_record_image();
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let image = &image;
                s.spawn(move || {
                    for i in 0..64u64 {
                        let address = 0x40000 + t * 64 + i;
                        let (data, _) = image.fetch_bytes(address, 2).unwrap();
                        assert_eq!(data.len(), 2);
                    }
                });
            }
        });
    }
}
