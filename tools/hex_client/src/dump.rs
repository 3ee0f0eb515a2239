//-----------------------------------------------------------------------------
// Module dump
// Print the record table and hex dumps of a HexImage

use ecu_hex::{HexImage, HexRecord};

const BYTES_PER_LINE: usize = 16;

// One dump line: address, 16 hex bytes with a gap after 8, ASCII
fn format_dump_line(address: u64, chunk: &[u8]) -> String {
    let mut line = format!("    {:08X}:  ", address);

    for i in 0..BYTES_PER_LINE {
        match chunk.get(i) {
            Some(byte) => line.push_str(&format!("{:02X} ", byte)),
            None => line.push_str("   "),
        }
        if i == 7 {
            line.push(' ');
        }
    }

    line.push_str(" |");
    for byte in chunk {
        if (0x20..=0x7E).contains(byte) {
            line.push(*byte as char);
        } else {
            line.push('.');
        }
    }
    line.push('|');
    line
}

pub fn dump_hex_data(data: &[u8], base_address: u64) {
    for (line_idx, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        println!("{}", format_dump_line(base_address + (line_idx * BYTES_PER_LINE) as u64, chunk));
    }
}

fn format_record(record: &HexRecord) -> String {
    format!(
        "  line {:>6}  0x{:08X}..=0x{:08X}  offset 0x{:04X}  len {:>3}  checksum 0x{:02X}",
        record.line_no(),
        record.base_address(),
        record.last_address().unwrap_or(record.base_address()),
        record.offset(),
        record.len(),
        record.checksum()
    )
}

/// Print the image summary and the record table, with verbose > 0 a hex dump of each record
pub fn dump_image(image: &HexImage, verbose: usize) {
    match image.path() {
        Some(path) => println!("HEX image {}:", path.display()),
        None => println!("HEX image:"),
    }
    match image.address_range() {
        Some((start, last)) => println!(
            "  {} data records, {} bytes, address range 0x{:08X}..=0x{:08X}",
            image.len(),
            image.data_byte_count(),
            start,
            last
        ),
        None => println!("  no data records"),
    }

    for record in image.records() {
        println!("{}", format_record(record));
        if verbose > 0 {
            dump_hex_data(record.data(), record.base_address());
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Test module
