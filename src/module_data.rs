//! The module-data accumulator: a reusable buffer that collects one
//! module's header and decoded items within a single event.

use crate::crate_map::{CrateMap, Firmware};
use crate::word::{self, ChannelKind};

/// A single decoded item belonging to one module within one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelDatum {
    pub raw_word: u32,
    pub datum: u16,
    pub bus: u8,
    pub channel: u8,
    pub kind: ChannelKind,
}

/// The collected contents of one module within one event. Cleared (capacity
/// retained) when the accumulator is reused for the next module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleData {
    pub module_id: u8,
    pub header_word: u32,
    pub announced_length: u16,
    pub items: Vec<ChannelDatum>,
}

impl ModuleData {
    pub fn clear(&mut self) {
        self.module_id = 0;
        self.header_word = 0;
        self.announced_length = 0;
        self.items.clear();
    }
}

/// Owns the single in-flight [`ModuleData`] record plus the firmware context
/// needed to interpret subsequent data words.
#[derive(Debug, Default)]
pub(crate) struct ModuleAccumulator {
    pub data: ModuleData,
    pub firmware: Option<Firmware>,
    pub num_channels_or_buses: u8,
}

impl ModuleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears prior contents and opens a new module from a header word.
    /// `firmware` is `None` for the start/end sentinels (dummy modules).
    pub fn set_header(&mut self, word: u32, module_id: u8, firmware: Option<Firmware>, num_channels_or_buses: u8) {
        self.data.clear();
        self.data.module_id = module_id;
        self.data.header_word = word;
        self.firmware = firmware;
        self.num_channels_or_buses = num_channels_or_buses;
        self.data.announced_length = match firmware {
            Some(Firmware::MdppScp) | Some(Firmware::MdppQdc) | Some(Firmware::MdppCsi) => {
                word::mdpp_announced_length(word)
            }
            Some(Firmware::Vmmr) => word::vmmr_announced_length(word),
            // TGV and MvlcScaler record no announced length; the caller manages counts.
            _ => 0,
        };
    }

    /// Appends a decoded item after classifying `word` under the active
    /// module's firmware. For `MvlcScaler`, data is stored verbatim with no
    /// field extraction.
    pub fn add_item(&mut self, word: u32) {
        let firmware = match self.firmware {
            Some(f) => f,
            None => return,
        };
        let datum = match firmware {
            Firmware::MdppScp | Firmware::MdppQdc | Firmware::MdppCsi => {
                let d = word::decode_mdpp_data(word, self.num_channels_or_buses, firmware);
                ChannelDatum {
                    raw_word: word,
                    datum: d.datum,
                    bus: 0,
                    channel: d.channel,
                    kind: d.kind,
                }
            }
            Firmware::Vmmr => {
                let d = word::decode_vmmr_data(word);
                ChannelDatum {
                    raw_word: word,
                    datum: d.datum,
                    bus: d.bus,
                    channel: d.channel,
                    kind: d.kind,
                }
            }
            Firmware::MvlcScaler => ChannelDatum {
                raw_word: word,
                datum: (word & 0x0000_FFFF) as u16,
                bus: 0,
                channel: 0,
                kind: ChannelKind::Unknown,
            },
            Firmware::Tgv | Firmware::Unknown => return,
        };
        self.data.items.push(datum);
    }

    /// Takes the accumulated module data, leaving an empty (cleared) record
    /// behind with capacity retained for reuse.
    pub fn take(&mut self) -> ModuleData {
        std::mem::take(&mut self.data)
    }
}

/// Resolves the descriptor-backed firmware and channel count for a module id
/// from the crate map, or `None` if `id` is not a real module.
pub(crate) fn lookup(crate_map: &CrateMap, id: u8) -> Option<(Firmware, u8)> {
    crate_map
        .get_module(id)
        .map(|m| (m.firmware, m.num_channels_or_buses))
}
