//-----------------------------------------------------------------------------
// hex_client - Intel-Hex ECU image tool
//
// - Load and validate Intel-Hex firmware images
// - Resolve a single ECU address or an array (VAL_BLK) to physical values
// - Batch resolve calibration parameters exported from an A2L file (json)
// - Dump the record table and data of a HEX image
//
// hex_client --help
//-----------------------------------------------------------------------------

use std::error::Error;

use ecu_hex::{ByteOrder, Characteristic, ChecksumMode, EcuAddress, HexImage, HexValueType, LoadOptions, resolve_address, resolve_array, resolve_characteristics};

mod dump;
use dump::dump_image;

//-----------------------------------------------------------------------------
// Command line arguments

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "hex_client")]
#[command(about = concat!("hex_client v", env!("CARGO_PKG_VERSION"), " resolves ECU addresses to values from Intel-Hex images"))]
#[command(long_about = concat!("hex_client v", env!("CARGO_PKG_VERSION"), " resolves ECU addresses to values from Intel-Hex images.

Examples:
  hex_client --hex firmware.hex --addr 0x40314
  hex_client --hex firmware.hex --addr -0xFDC55C48 --type ULONG --big-endian
  hex_client --hex firmware.hex --addr 0x46FE0 --type UWORD --count 280
  hex_client --hex firmware.hex --characteristics params.json --filter \"Limit.*\" --json
  hex_client --hex firmware.hex --dump -v"))]
#[command(version)]
struct Args {
    // -l --log-level
    /// Log level (Off=0, Error=1, Warn=2, Info=3, Debug=4, Trace=5)
    #[arg(short, long, default_value_t = 3)]
    log_level: u8,

    // -v --verbose
    /// Verbose output
    /// Enables hex dumps of the record data
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    // --hex
    /// Intel-Hex file name
    #[arg(long)]
    hex: String,

    // --strict-checksum
    /// Reject records with checksum errors or unknown record types
    #[arg(long, default_value_t = false)]
    strict_checksum: bool,

    // -a --addr
    /// ECU address to resolve, decimal, hex (0x40314) or negative hex (-0xFDC55C48)
    #[arg(short, long, allow_hyphen_values = true)]
    addr: Option<String>,

    // -t --type
    /// Data type of the value at --addr (FLOAT32, FLOAT64, ULONG, SLONG, UWORD, SWORD, UBYTE, SBYTE)
    #[arg(short, long, default_value = "FLOAT32")]
    r#type: String,

    // --big-endian
    /// Decode values as big endian (MSB_FIRST), default is little endian
    #[arg(long, default_value_t = false)]
    big_endian: bool,

    // -c --count
    /// Number of elements at --addr, > 1 resolves an array (VAL_BLK)
    #[arg(short, long, default_value_t = 1)]
    count: usize,

    // --characteristics
    /// json file with a list of characteristic descriptions to resolve
    #[arg(long)]
    characteristics: Option<String>,

    // -f --filter
    /// Resolve only characteristics with names matching this regular expression
    #[arg(short, long, default_value = "")]
    filter: String,

    // -d --dump
    /// Print the record table of the HEX image
    #[arg(short, long, default_value_t = false)]
    dump: bool,

    // --json
    /// Print results as json
    #[arg(long, default_value_t = false)]
    json: bool,
}

//----------------------------------------------------------------------------------------------
// Logging

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

trait ToLogLevelFilter {
    fn to_log_level_filter(self) -> log::LevelFilter;
}

impl ToLogLevelFilter for u8 {
    fn to_log_level_filter(self) -> log::LevelFilter {
        match self {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Error,
            2 => log::LevelFilter::Warn,
            3 => log::LevelFilter::Info,
            4 => log::LevelFilter::Debug,
            5 => log::LevelFilter::Trace,
            _ => log::LevelFilter::Warn,
        }
    }
}

//------------------------------------------------------------------------
// Address resolution (--addr)

fn print_address(image: &HexImage, args: &Args) -> Result<(), Box<dyn Error>> {
    let Some(addr) = &args.addr else {
        return Ok(());
    };
    let address: EcuAddress = addr.parse()?;
    let value_type: HexValueType = args.r#type.parse()?;
    let byte_order = if args.big_endian { ByteOrder::Big } else { ByteOrder::Little };

    if args.count > 1 {
        let array = resolve_array(image, address, value_type, byte_order, args.count)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&array)?);
        } else {
            println!("{}", array);
        }
    } else {
        let value = resolve_address(image, address, value_type, byte_order)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("{}", value);
        }
    }
    Ok(())
}

//------------------------------------------------------------------------
// Characteristic batch resolution (--characteristics)

fn load_characteristics(path: &str, filter: &str) -> Result<Vec<Characteristic>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("Can not read characteristics file '{}': {}", path, e))?;
    let list: Vec<Characteristic> = serde_json::from_str(&text)?;
    info!("Loaded {} characteristics from {}", list.len(), path);

    if filter.is_empty() {
        return Ok(list);
    }
    let regex = regex::Regex::new(filter)?;
    let list: Vec<Characteristic> = list.into_iter().filter(|c| regex.is_match(&c.name)).collect();
    debug!("{} characteristics match '{}'", list.len(), filter);
    Ok(list)
}

fn print_characteristics(image: &HexImage, args: &Args) -> Result<(), Box<dyn Error>> {
    let Some(path) = &args.characteristics else {
        return Ok(());
    };
    let list = load_characteristics(path, &args.filter)?;
    let (values, summary) = resolve_characteristics(image, &list);

    if args.json {
        let report = serde_json::json!({ "values": values, "summary": summary });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for value in &values {
            println!("{}", value);
        }
        println!(
            "{} resolved, {} skipped (address 0: {}, unsupported: {}, out of range: {})",
            summary.resolved,
            summary.skipped(),
            summary.skipped_null_address,
            summary.skipped_unsupported,
            summary.skipped_out_of_range
        );
    }
    Ok(())
}

//------------------------------------------------------------------------
// Main function

fn main() -> Result<(), Box<dyn Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.to_log_level_filter();
    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .filter_level(log_level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    info!("hex_client");

    // Validate the address before loading the file
    if let Some(addr) = &args.addr {
        addr.parse::<EcuAddress>()?;
        args.r#type.parse::<HexValueType>()?;
    }

    let options = LoadOptions {
        checksum: if args.strict_checksum { ChecksumMode::Strict } else { ChecksumMode::Lenient },
    };
    let image = HexImage::load_with_options(&args.hex, options)?;

    if args.dump {
        dump_image(&image, args.verbose as usize);
    }
    print_address(&image, &args)?;
    print_characteristics(&image, &args)?;

    Ok(())
}

//-------------------------------------------------------------------------------------------------
// Test module
