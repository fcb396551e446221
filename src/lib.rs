//! A decoding library for the Mesytec MVLC VME controller's readout stream.
//!
//! Parses the byte stream produced by an MVLC reading a crate of digitizing
//! modules (MDPP-16/32, VMMR, the TGV centrum-timestamp unit, and MVLC's
//! internal scaler pseudo-module) during a data-acquisition run, collates
//! per-module fragments into complete physics events, attaches the TGV
//! timestamp, and hands each event to a caller-supplied sink.
//!
//! The parser is single-threaded, synchronous and re-entrant: [`BufferReader`]
//! is a plain struct whose [`read_buffer_collate_events`](BufferReader::read_buffer_collate_events)
//! method never suspends except by returning control to its caller, and its
//! state survives across calls so that an event split across two input
//! buffers completes cleanly.
//!
//! ```
//! use mesytec_mvlc_parser::{BufferReader, CrateMapBuilder, Firmware, SinkOutcome};
//!
//! let crate_map = CrateMapBuilder::new()
//!     .with_mdpp(0x00, "mdpp0", Firmware::MdppScp, 16)
//!     .with_start_readout(0xF0)
//!     .with_end_readout(0xF1)
//!     .build();
//! let mut reader = BufferReader::new(crate_map);
//!
//! let words: [u32; 9] = [
//!     0xF3000008, 0x40F00000, 0xC0000000, 0x4000000A, 0x10020123, 0x10030456,
//!     0xC0000001, 0x40F10000, 0xC0000000,
//! ];
//! let mut buf = Vec::new();
//! for w in words {
//!     buf.extend_from_slice(&w.to_le_bytes());
//! }
//!
//! let mut delivered = 0;
//! reader
//!     .read_buffer_collate_events(&buf, |_event, _crate_map| {
//!         delivered += 1;
//!         SinkOutcome::Accepted
//!     })
//!     .unwrap();
//! assert_eq!(delivered, 1);
//! ```

pub mod crate_map;
pub mod diag;
pub mod error;
pub mod event;
pub mod module_data;
pub mod reader;
pub mod state;
pub mod word;

pub use crate_map::{Bus, CrateMap, CrateMapBuilder, CrateMapError, Firmware, Module};
pub use error::ReaderError;
pub use event::Event;
pub use module_data::{ChannelDatum, ModuleData};
pub use reader::{BufferReader, SinkOutcome};
pub use state::{ModuleAcceptance, Phase, ReadoutStateMachine};
pub use word::ChannelKind;
