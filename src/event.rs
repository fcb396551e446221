//! The event assembler: a reusable container of module-data plus the TGV
//! centrum timestamp and a monotonically increasing event counter.

use crate::module_data::ModuleData;
use crate::word::TGV_DATA_READY_MASK;

/// One fully collated physics event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub event_counter: u32,
    pub tgv_ts_lo: u16,
    pub tgv_ts_mid: u16,
    pub tgv_ts_hi: u16,
    pub modules: Vec<ModuleData>,
}

impl Event {
    pub fn add_module_data(&mut self, m: ModuleData) {
        self.modules.push(m);
    }

    /// An event has "data" iff at least one module was added.
    pub fn has_data(&self) -> bool {
        !self.modules.is_empty()
    }

    pub fn clear(&mut self) {
        self.event_counter = 0;
        self.tgv_ts_lo = 0;
        self.tgv_ts_mid = 0;
        self.tgv_ts_hi = 0;
        self.modules.clear();
    }

    /// Applies the TGV timestamp rule: if exactly four TGV words were
    /// collected and the first word's ready bit is set, the low 16 bits of
    /// words 1/2/3 become the timestamp fields; otherwise all three fields
    /// are zeroed. Returns `true` iff the ready flag was set (used by the
    /// caller to decide whether to emit a `TgvNotReady` warning).
    pub fn finalize_tgv(&mut self, tgv_words: &[u32]) -> bool {
        if tgv_words.len() == 4 && tgv_words[0] & TGV_DATA_READY_MASK != 0 {
            self.tgv_ts_lo = (tgv_words[1] & 0xFFFF) as u16;
            self.tgv_ts_mid = (tgv_words[2] & 0xFFFF) as u16;
            self.tgv_ts_hi = (tgv_words[3] & 0xFFFF) as u16;
            true
        } else {
            self.tgv_ts_lo = 0;
            self.tgv_ts_mid = 0;
            self.tgv_ts_hi = 0;
            false
        }
    }

    /// Writes each module's header word and stored raw words back-to-back
    /// into a 32-bit little-endian byte sequence. Modules with no items are
    /// omitted. The result is re-parseable by [`crate::reader::BufferReader::read_event_in_buffer_v1`].
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for module in &self.modules {
            if module.items.is_empty() {
                continue;
            }
            bytes.extend_from_slice(&module.header_word.to_le_bytes());
            for item in &module.items {
                bytes.extend_from_slice(&item.raw_word.to_le_bytes());
            }
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;
    use crate::module_data::ChannelDatum;
    use crate::word::ChannelKind;

    fn datum(raw: u32) -> ChannelDatum {
        ChannelDatum {
            raw_word: raw,
            datum: (raw & 0xFFFF) as u16,
            bus: 0,
            channel: 0,
            kind: ChannelKind::Adc,
        }
    }

    #[test]
    fn finalize_tgv_ready() {
        let mut ev = Event::default();
        let ready = ev.finalize_tgv(&[0x00000004, 0x0000BEEF, 0x0000CAFE, 0x0000F00D]);
        assert!(ready);
        assert_eq!(ev.tgv_ts_lo, 0xBEEF);
        assert_eq!(ev.tgv_ts_mid, 0xCAFE);
        assert_eq!(ev.tgv_ts_hi, 0xF00D);
    }

    #[test]
    fn finalize_tgv_not_ready_zeroes_timestamps() {
        let mut ev = Event::default();
        let ready = ev.finalize_tgv(&[0x00000000, 0x0000BEEF, 0x0000CAFE, 0x0000F00D]);
        assert!(!ready);
        assert_eq!(ev.tgv_ts_lo, 0);
        assert_eq!(ev.tgv_ts_mid, 0);
        assert_eq!(ev.tgv_ts_hi, 0);
    }

    #[test]
    fn has_data_false_until_module_added() {
        let mut ev = Event::default();
        assert!(!ev.has_data());
        ev.add_module_data(ModuleData {
            module_id: 0,
            header_word: 0x4000000A,
            announced_length: 2,
            items: vec![datum(0x10020123)],
        });
        assert!(ev.has_data());
    }

    #[test]
    fn serialize_omits_empty_modules() {
        let mut ev = Event::default();
        ev.add_module_data(ModuleData {
            module_id: 0,
            header_word: 0x4000000A,
            announced_length: 2,
            items: vec![datum(0x10020123), datum(0x10030456)],
        });
        ev.add_module_data(ModuleData {
            module_id: 1,
            header_word: 0x40010000,
            announced_length: 0,
            items: vec![],
        });
        let bytes = ev.serialize();
        assert_eq!(bytes.len(), 12);
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0x4000000A);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 0x10020123);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 0x10030456);
    }
}
