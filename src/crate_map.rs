//! The crate map: a dense, immutable table of module descriptors built once
//! at start-up from a pair of text files, and consulted by the accumulator
//! and the sink while parsing.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Firmware identity of a module, as declared in the crate-map file.
///
/// `StartReadout` and `EndReadout` never appear as a stored [`Module`]
/// descriptor; their ids live in [`CrateMap::start_readout_id`] /
/// [`CrateMap::end_readout_id`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Firmware {
    Unknown,
    MdppScp,
    MdppQdc,
    MdppCsi,
    Vmmr,
    Tgv,
    MvlcScaler,
    StartReadout,
    EndReadout,
}

impl Firmware {
    fn parse_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "MDPP_SCP" | "SCP" => Some(Firmware::MdppScp),
            "MDPP_QDC" | "QDC" => Some(Firmware::MdppQdc),
            "MDPP_CSI" | "CSI" => Some(Firmware::MdppCsi),
            "VMMR" => Some(Firmware::Vmmr),
            "TGV" => Some(Firmware::Tgv),
            "MVLC_SCALER" => Some(Firmware::MvlcScaler),
            "START_READOUT" => Some(Firmware::StartReadout),
            "END_READOUT" => Some(Firmware::EndReadout),
            _ => None,
        }
    }
}

/// One optical/electronics bus within a module: an id plus its ordered
/// channel names. MDPP modules have exactly one synthetic bus (id 0).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bus {
    pub bus_id: u8,
    pub channel_names: Vec<String>,
}

impl Bus {
    fn synthesized(bus_id: u8, num_channels: u16) -> Self {
        let channel_names = (0..num_channels)
            .map(|c| format!("bus_{}_chan_{}", bus_id, c))
            .collect();
        Bus { bus_id, channel_names }
    }
}

/// A single module descriptor held in the crate map.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Module {
    pub name: String,
    pub firmware: Firmware,
    pub num_channels_or_buses: u8,
    pub channels: Vec<Bus>,
}

#[derive(Debug, Error)]
pub enum CrateMapError {
    #[error("{file}:{line}: malformed crate-map row: {row:?}")]
    MalformedCrateMap {
        file: String,
        line: usize,
        row: String,
    },
    #[error("{file}:{line}: unknown firmware tag {tag:?}")]
    UnknownFirmwareTag {
        file: String,
        line: usize,
        tag: String,
    },
    #[error("{file}:{line}: malformed detector-correspondence row: {row:?}")]
    MalformedDetectorFile {
        file: String,
        line: usize,
        row: String,
    },
    #[error("detector correspondence references unknown module id 0x{id:02X}")]
    UnknownModuleInDetectorFile { id: u8 },
    #[error("module id 0x{id:02X} collides with a start/end readout sentinel")]
    SentinelCollision { id: u8 },
}

/// The immutable, dense module table consulted throughout a parse.
///
/// Built once via [`CrateMap::from_csv`] (or assembled programmatically with
/// [`CrateMapBuilder`]); never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct CrateMap {
    modules: Vec<Option<Module>>,
    start_readout_id: Option<u8>,
    end_readout_id: Option<u8>,
}

impl CrateMap {
    pub fn has_module(&self, id: u8) -> bool {
        self.modules
            .get(id as usize)
            .map(|m| m.is_some())
            .unwrap_or(false)
    }

    pub fn get_module(&self, id: u8) -> Option<&Module> {
        self.modules.get(id as usize).and_then(|m| m.as_ref())
    }

    pub fn number_of_modules(&self) -> usize {
        self.modules.iter().filter(|m| m.is_some()).count()
    }

    pub fn start_readout_id(&self) -> Option<u8> {
        self.start_readout_id
    }

    pub fn end_readout_id(&self) -> Option<u8> {
        self.end_readout_id
    }

    /// Looks up the detector name for a channel, falling back to the
    /// synthesized `bus_<b>_chan_<c>` form when no correspondence entry was
    /// loaded for it.
    pub fn detector_name(&self, id: u8, bus: u8, channel: u8) -> String {
        match self.get_module(id).and_then(|m| m.channels.get(bus as usize)) {
            Some(b) => b
                .channel_names
                .get(channel as usize)
                .cloned()
                .unwrap_or_else(|| format!("bus_{}_chan_{}", bus, channel)),
            None => format!("bus_{}_chan_{}", bus, channel),
        }
    }

    /// Parses a crate-map file: one module per line, `name,hex_id,nchan_or_nbus,firmware_tag`.
    /// Tolerant of trailing blank lines.
    pub fn from_csv(file_name: &str, text: &str) -> Result<Self, CrateMapError> {
        let mut modules: Vec<Option<Module>> = Vec::new();
        let mut start_readout_id = None;
        let mut end_readout_id = None;

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(CrateMapError::MalformedCrateMap {
                    file: file_name.to_string(),
                    line: line_no,
                    row: line.to_string(),
                });
            }
            let name = fields[0].to_string();
            let id = u8::from_str_radix(fields[1].trim_start_matches("0x").trim_start_matches("0X"), 16)
                .map_err(|_| CrateMapError::MalformedCrateMap {
                    file: file_name.to_string(),
                    line: line_no,
                    row: line.to_string(),
                })?;
            let count: u16 = fields[2].parse().map_err(|_| CrateMapError::MalformedCrateMap {
                file: file_name.to_string(),
                line: line_no,
                row: line.to_string(),
            })?;
            let firmware = Firmware::parse_tag(fields[3]).ok_or_else(|| CrateMapError::UnknownFirmwareTag {
                file: file_name.to_string(),
                line: line_no,
                tag: fields[3].to_string(),
            })?;

            match firmware {
                Firmware::StartReadout => {
                    start_readout_id = Some(id);
                    continue;
                }
                Firmware::EndReadout => {
                    end_readout_id = Some(id);
                    continue;
                }
                _ => {}
            }

            let count_valid = match firmware {
                Firmware::MdppScp | Firmware::MdppQdc | Firmware::MdppCsi => count == 16 || count == 32,
                Firmware::Vmmr => count == 8 || count == 16,
                _ => true,
            };
            if !count_valid {
                return Err(CrateMapError::MalformedCrateMap {
                    file: file_name.to_string(),
                    line: line_no,
                    row: line.to_string(),
                });
            }

            let channels = match firmware {
                Firmware::Vmmr => (0..count as u8)
                    .map(|b| Bus::synthesized(b, 128))
                    .collect(),
                _ => vec![Bus::synthesized(0, count)],
            };

            if modules.len() <= id as usize {
                modules.resize_with(id as usize + 1, || None);
            }
            modules[id as usize] = Some(Module {
                name,
                firmware,
                num_channels_or_buses: count as u8,
                channels,
            });
        }

        if let (Some(s), Some(e)) = (start_readout_id, end_readout_id) {
            if modules.get(s as usize).map(|m| m.is_some()).unwrap_or(false) {
                return Err(CrateMapError::SentinelCollision { id: s });
            }
            if modules.get(e as usize).map(|m| m.is_some()).unwrap_or(false) {
                return Err(CrateMapError::SentinelCollision { id: e });
            }
        }

        Ok(CrateMap {
            modules,
            start_readout_id,
            end_readout_id,
        })
    }

    /// Parses a detector-correspondence file and fills in real names over the
    /// synthesized defaults: `hex_id,channel,name` for MDPP, `hex_id,bus,channel,name` for VMMR.
    pub fn load_detector_correspondence(&mut self, file_name: &str, text: &str) -> Result<(), CrateMapError> {
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let line_no = idx + 1;
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let malformed = || CrateMapError::MalformedDetectorFile {
                file: file_name.to_string(),
                line: line_no,
                row: line.to_string(),
            };
            let id = u8::from_str_radix(
                fields.get(0).ok_or_else(malformed)?.trim_start_matches("0x").trim_start_matches("0X"),
                16,
            )
            .map_err(|_| malformed())?;

            let is_vmmr = matches!(
                self.get_module(id).map(|m| m.firmware),
                Some(Firmware::Vmmr)
            );

            let (bus, channel, name) = if is_vmmr {
                if fields.len() != 4 {
                    return Err(malformed());
                }
                let bus: u8 = fields[1].parse().map_err(|_| malformed())?;
                let channel: u8 = fields[2].parse().map_err(|_| malformed())?;
                (bus, channel, fields[3].to_string())
            } else {
                if fields.len() != 3 {
                    return Err(malformed());
                }
                let channel: u8 = fields[1].parse().map_err(|_| malformed())?;
                (0u8, channel, fields[2].to_string())
            };

            let module = self
                .modules
                .get_mut(id as usize)
                .and_then(|m| m.as_mut())
                .ok_or(CrateMapError::UnknownModuleInDetectorFile { id })?;
            let bus_entry = module
                .channels
                .get_mut(bus as usize)
                .ok_or_else(malformed)?;
            if let Some(slot) = bus_entry.channel_names.get_mut(channel as usize) {
                *slot = name;
            }
        }
        Ok(())
    }
}

impl fmt::Display for CrateMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "crate map: {} module(s), start_readout=0x{:02X?}, end_readout=0x{:02X?}",
            self.number_of_modules(),
            self.start_readout_id,
            self.end_readout_id
        )?;
        for (id, module) in self.modules.iter().enumerate() {
            if let Some(m) = module {
                writeln!(f, "  0x{:02X} {} ({:?})", id, m.name, m.firmware)?;
            }
        }
        Ok(())
    }
}

/// Programmatic alternative to [`CrateMap::from_csv`], useful for tests and
/// for embedders that already hold their configuration in memory.
#[derive(Debug, Default)]
pub struct CrateMapBuilder {
    modules: HashMap<u8, Module>,
    start_readout_id: Option<u8>,
    end_readout_id: Option<u8>,
}

impl CrateMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mdpp(mut self, id: u8, name: &str, firmware: Firmware, num_channels: u16) -> Self {
        assert!(
            num_channels == 16 || num_channels == 32,
            "MDPP channel count must be 16 or 32, got {}",
            num_channels
        );
        self.modules.insert(
            id,
            Module {
                name: name.to_string(),
                firmware,
                num_channels_or_buses: num_channels as u8,
                channels: vec![Bus::synthesized(0, num_channels)],
            },
        );
        self
    }

    pub fn with_vmmr(mut self, id: u8, name: &str, num_buses: u8) -> Self {
        assert!(
            num_buses == 8 || num_buses == 16,
            "VMMR bus count must be 8 or 16, got {}",
            num_buses
        );
        self.modules.insert(
            id,
            Module {
                name: name.to_string(),
                firmware: Firmware::Vmmr,
                num_channels_or_buses: num_buses,
                channels: (0..num_buses).map(|b| Bus::synthesized(b, 128)).collect(),
            },
        );
        self
    }

    pub fn with_tgv(mut self, id: u8, name: &str) -> Self {
        self.modules.insert(
            id,
            Module {
                name: name.to_string(),
                firmware: Firmware::Tgv,
                num_channels_or_buses: 0,
                channels: Vec::new(),
            },
        );
        self
    }

    pub fn with_mvlc_scaler(mut self, id: u8, name: &str) -> Self {
        self.modules.insert(
            id,
            Module {
                name: name.to_string(),
                firmware: Firmware::MvlcScaler,
                num_channels_or_buses: 0,
                channels: Vec::new(),
            },
        );
        self
    }

    pub fn with_start_readout(mut self, id: u8) -> Self {
        self.start_readout_id = Some(id);
        self
    }

    pub fn with_end_readout(mut self, id: u8) -> Self {
        self.end_readout_id = Some(id);
        self
    }

    pub fn build(self) -> CrateMap {
        let max_id = self.modules.keys().copied().max().unwrap_or(0);
        let mut modules = vec![None; max_id as usize + 1];
        for (id, module) in self.modules {
            modules[id as usize] = Some(module);
        }
        CrateMap {
            modules,
            start_readout_id: self.start_readout_id,
            end_readout_id: self.end_readout_id,
        }
    }
}
