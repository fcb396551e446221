//! Thin command-line front-end: reads a raw MVLC word stream from a file,
//! parses it against a crate map, and prints each collated event.
//!
//! Argument parsing and file I/O live here, outside the core; see
//! `mesytec_mvlc_parser::reader` for the actual parser.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use mesytec_mvlc_parser::{BufferReader, CrateMap, SinkOutcome};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "mesytec-mvlc-dump", about = "Decode a Mesytec MVLC readout stream")]
struct Opt {
    /// Path to the crate-map text file (name,hex_id,nchan_or_nbus,firmware_tag per line).
    #[structopt(long, parse(from_os_str))]
    crate_map: PathBuf,

    /// Path to the detector-correspondence text file (optional).
    #[structopt(long, parse(from_os_str))]
    detector_map: Option<PathBuf>,

    /// Raw binary file containing the 32-bit little-endian MVLC word stream.
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let opt = Opt::from_args();

    let crate_map_text = fs::read_to_string(&opt.crate_map)
        .with_context(|| format!("reading crate map {}", opt.crate_map.display()))?;
    let mut crate_map = CrateMap::from_csv(&opt.crate_map.display().to_string(), &crate_map_text)
        .with_context(|| "parsing crate map")?;

    if let Some(det_path) = &opt.detector_map {
        let det_text = fs::read_to_string(det_path)
            .with_context(|| format!("reading detector map {}", det_path.display()))?;
        crate_map
            .load_detector_correspondence(&det_path.display().to_string(), &det_text)
            .with_context(|| "parsing detector correspondence")?;
    }

    log::info!("{}", crate_map);

    let buf = fs::read(&opt.input).with_context(|| format!("reading {}", opt.input.display()))?;
    let mut reader = BufferReader::new(crate_map);

    let delivered = reader.read_buffer_collate_events(&buf, |event, crate_map| {
        println!(
            "event {:>8}  tgv=({:#06x},{:#06x},{:#06x})  modules={}",
            event.event_counter, event.tgv_ts_lo, event.tgv_ts_mid, event.tgv_ts_hi, event.modules.len()
        );
        for module in &event.modules {
            let name = crate_map
                .get_module(module.module_id)
                .map(|m| m.name.as_str())
                .unwrap_or("?");
            println!(
                "  0x{:02X} {:<16} {} item(s)",
                module.module_id,
                name,
                module.items.len()
            );
        }
        SinkOutcome::Accepted
    })?;

    log::info!("{} event(s) delivered, {} total", delivered, reader.total_events_parsed());
    Ok(())
}
