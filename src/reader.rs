//! The buffer reader: the outer loop that walks a caller-provided byte
//! buffer, drives the readout state machine and module-data accumulator,
//! and dispatches completed events to the caller's sink.

use std::convert::TryInto;

use crate::crate_map::{CrateMap, Firmware};
use crate::error::ReaderError;
use crate::event::Event;
use crate::module_data::{self, ChannelDatum, ModuleAccumulator, ModuleData};
use crate::state::{ModuleAcceptance, ReadoutStateMachine};
use crate::word::{self, ChannelKind};

/// What the sink tells the reader about one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// The event was consumed; the reader may proceed to the next one.
    Accepted,
    /// The downstream output is full; retain the event and retry it on the
    /// next call before resuming the walk.
    FullRetryLater,
}

enum StepOutcome {
    Continue,
    Backpressure,
}

/// Parses a Mesytec MVLC readout stream into collated [`Event`]s.
///
/// Single-threaded, synchronous, and re-entrant: [`read_buffer_collate_events`](Self::read_buffer_collate_events)
/// never suspends except by returning, and all of its state (state machine
/// phase, in-flight accumulator, in-flight event, TGV side-buffer) survives
/// across calls so that an event split across two input buffers completes
/// cleanly.
pub struct BufferReader {
    crate_map: CrateMap,
    state: ReadoutStateMachine,
    accumulator: ModuleAccumulator,
    event: Event,
    tgv_words: Vec<u32>,
    storing_last_complete_event: bool,
    next_event_counter: u32,
    events_parsed_this_call: u32,
    total_events_parsed: u32,
}

impl BufferReader {
    /// Builds a reader over an already-populated crate map.
    ///
    /// # Panics
    ///
    /// Panics if the crate map has no start/end readout sentinels recorded;
    /// per the design, the crate map must include both before any parsing
    /// is attempted.
    pub fn new(crate_map: CrateMap) -> Self {
        let start = crate_map
            .start_readout_id()
            .expect("crate map must declare a START_READOUT sentinel");
        let end = crate_map
            .end_readout_id()
            .expect("crate map must declare an END_READOUT sentinel");
        BufferReader {
            crate_map,
            state: ReadoutStateMachine::new(start, end),
            accumulator: ModuleAccumulator::new(),
            event: Event::default(),
            tgv_words: Vec::with_capacity(4),
            storing_last_complete_event: false,
            next_event_counter: 0,
            events_parsed_this_call: 0,
            total_events_parsed: 0,
        }
    }

    pub fn crate_map(&self) -> &CrateMap {
        &self.crate_map
    }

    pub fn total_events_parsed(&self) -> u32 {
        self.total_events_parsed
    }

    pub fn storing_last_complete_event(&self) -> bool {
        self.storing_last_complete_event
    }

    /// Returns the reader to the same state as immediately after
    /// construction: state machine re-armed, accumulator and event cleared,
    /// counters zeroed. Any event in flight is lost without being
    /// delivered.
    pub fn reset(&mut self) {
        self.state.begin_readout();
        self.accumulator.data.clear();
        self.accumulator.firmware = None;
        self.event.clear();
        self.tgv_words.clear();
        self.storing_last_complete_event = false;
        self.next_event_counter = 0;
        self.events_parsed_this_call = 0;
        self.total_events_parsed = 0;
    }

    /// Walks `buf` one 32-bit little-endian word at a time, dispatching
    /// complete events to `sink`. Returns the count of events dispatched
    /// during this call.
    ///
    /// If a previous call ended with an event the sink refused, that event
    /// is re-offered first, before any word of `buf` is consumed.
    pub fn read_buffer_collate_events(
        &mut self,
        buf: &[u8],
        mut sink: impl FnMut(&Event, &CrateMap) -> SinkOutcome,
    ) -> Result<u32, ReaderError> {
        if buf.len() % 4 != 0 {
            return Err(ReaderError::BufferSizeNotMultipleOfFour(buf.len()));
        }
        self.events_parsed_this_call = 0;

        if self.storing_last_complete_event {
            match sink(&self.event, &self.crate_map) {
                SinkOutcome::Accepted => self.cleanup_last_complete_event(),
                SinkOutcome::FullRetryLater => return Ok(self.events_parsed_this_call),
            }
        }

        let mut cursor = 0usize;
        while cursor + 4 <= buf.len() {
            let word = word::word_from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            let (outcome, extra_skip) = self.step(word, &mut sink);
            if let StepOutcome::Backpressure = outcome {
                return Ok(self.events_parsed_this_call);
            }
            if extra_skip {
                cursor += 4;
            }
        }
        Ok(self.events_parsed_this_call)
    }

    /// Re-dispatches the preserved event after the sink has accepted it,
    /// clearing the hold and re-arming the state machine.
    fn cleanup_last_complete_event(&mut self) {
        self.storing_last_complete_event = false;
        self.event.clear();
        self.state.begin_readout();
        self.next_event_counter += 1;
        self.events_parsed_this_call += 1;
        self.total_events_parsed += 1;
    }

    fn step(
        &mut self,
        word: u32,
        sink: &mut impl FnMut(&Event, &CrateMap) -> SinkOutcome,
    ) -> (StepOutcome, bool) {
        if self.state.reading_module() && word::is_end_of_event(word) {
            self.finish_current_module();
            if self.state.is_complete() {
                if let StepOutcome::Backpressure = self.treat_complete_event(sink) {
                    return (StepOutcome::Backpressure, false);
                }
            }
            return (StepOutcome::Continue, false);
        }

        if self.state.reading_module() && !self.state.current_is_dummy() {
            match self.accumulator.firmware {
                Some(Firmware::Tgv) => {
                    if self.tgv_words.len() < 4 {
                        self.tgv_words.push(word);
                    }
                    return (StepOutcome::Continue, false);
                }
                Some(firmware) if word::is_mesytec_data_word(word, firmware) => {
                    self.accumulator.add_item(word);
                    return (StepOutcome::Continue, false);
                }
                _ => {}
            }
        }

        if word::is_module_header(word) {
            self.handle_module_header(word);
            return (StepOutcome::Continue, false);
        }

        // Ignored: framing header, extended timestamp, fill word, or any
        // other unclassifiable padding. A SystemEvent UnixTimetick still
        // needs its trailing timestamp word skipped.
        (StepOutcome::Continue, word::is_unix_timetick(word))
    }

    fn handle_module_header(&mut self, word: u32) {
        let id = word::module_id(word);
        let known = self.crate_map.has_module(id);
        match self.state.is_next_module(id, known) {
            ModuleAcceptance::Accepted => {
                let is_sentinel = Some(id) == self.crate_map.start_readout_id()
                    || Some(id) == self.crate_map.end_readout_id();
                if is_sentinel {
                    self.accumulator.set_header(word, id, None, 0);
                } else if let Some((firmware, nchan)) = module_data::lookup(&self.crate_map, id) {
                    self.accumulator.set_header(word, id, Some(firmware), nchan);
                    if firmware == Firmware::Tgv {
                        self.tgv_words.clear();
                    }
                }
            }
            ModuleAcceptance::Ignored => {
                let is_sentinel = Some(id) == self.crate_map.start_readout_id()
                    || Some(id) == self.crate_map.end_readout_id();
                if !known && !is_sentinel {
                    log::warn!("unknown module id 0x{:02X} in header, ignoring", id);
                }
            }
            ModuleAcceptance::Restart => {
                log::warn!(
                    "START_READOUT seen mid-readout (id 0x{:02X}); discarding in-flight event",
                    id
                );
                self.accumulator.data.clear();
                self.event.clear();
                self.tgv_words.clear();
                self.state.begin_readout();
                self.handle_module_header(word);
            }
        }
    }

    fn finish_current_module(&mut self) {
        let dummy = self.state.current_is_dummy();
        let is_tgv = self.accumulator.firmware == Some(Firmware::Tgv);
        if !dummy && !is_tgv && !self.accumulator.data.items.is_empty() {
            let module_data = self.accumulator.take();
            self.event.add_module_data(module_data);
        } else {
            self.accumulator.data.clear();
        }
        self.state.module_end_of_event();
    }

    fn treat_complete_event(
        &mut self,
        sink: &mut impl FnMut(&Event, &CrateMap) -> SinkOutcome,
    ) -> StepOutcome {
        let ready = self.event.finalize_tgv(&self.tgv_words);
        if self.tgv_words.len() == 4 && !ready {
            log::warn!(
                "TGV not ready for event {}: timestamps zeroed",
                self.next_event_counter
            );
        }
        self.tgv_words.clear();
        self.accumulator.data.clear();

        if !self.event.has_data() {
            self.event.clear();
            self.state.begin_readout();
            return StepOutcome::Continue;
        }

        self.event.event_counter = self.next_event_counter;
        self.storing_last_complete_event = true;
        match sink(&self.event, &self.crate_map) {
            SinkOutcome::Accepted => {
                self.storing_last_complete_event = false;
                self.event.clear();
                self.state.begin_readout();
                self.next_event_counter += 1;
                self.events_parsed_this_call += 1;
                self.total_events_parsed += 1;
                StepOutcome::Continue
            }
            SinkOutcome::FullRetryLater => StepOutcome::Backpressure,
        }
    }

    /// Reads a single event pre-extracted into `buf` (MFM frame revision 1):
    /// only module headers and their payload words, no end-of-event markers.
    pub fn read_event_in_buffer_v1(
        &self,
        buf: &[u8],
        mut sink: impl FnMut(&Event, &CrateMap) -> SinkOutcome,
    ) -> Result<(), ReaderError> {
        if buf.len() % 4 != 0 {
            return Err(ReaderError::BufferSizeNotMultipleOfFour(buf.len()));
        }
        let mut event = Event::default();
        let mut current: Option<(u8, u32, Firmware, u8)> = None;
        let mut acc = ModuleData::default();

        for word in buf
            .chunks_exact(4)
            .map(|c| word::word_from_le_bytes(c.try_into().unwrap()))
        {
            if word::is_module_header(word) {
                if let Some((id, header_word, _, _)) = current.take() {
                    if !acc.items.is_empty() {
                        acc.module_id = id;
                        acc.header_word = header_word;
                        event.add_module_data(std::mem::take(&mut acc));
                    }
                }
                let id = word::module_id(word);
                if let Some(module) = self.crate_map.get_module(id) {
                    current = Some((id, word, module.firmware, module.num_channels_or_buses));
                    acc = ModuleData {
                        module_id: id,
                        header_word: word,
                        announced_length: 0,
                        items: Vec::new(),
                    };
                } else {
                    current = None;
                }
                continue;
            }
            if let Some((_, _, firmware, nchan)) = current {
                match firmware {
                    Firmware::MvlcScaler => acc.items.push(ChannelDatum {
                        raw_word: word,
                        datum: (word & 0xFFFF) as u16,
                        bus: 0,
                        channel: 0,
                        kind: ChannelKind::Unknown,
                    }),
                    Firmware::Vmmr if word::is_mesytec_data_word(word, firmware) => {
                        let d = word::decode_vmmr_data(word);
                        acc.items.push(ChannelDatum {
                            raw_word: word,
                            datum: d.datum,
                            bus: d.bus,
                            channel: d.channel,
                            kind: d.kind,
                        });
                    }
                    _ if word::is_mesytec_data_word(word, firmware) => {
                        let d = word::decode_mdpp_data(word, nchan, firmware);
                        acc.items.push(ChannelDatum {
                            raw_word: word,
                            datum: d.datum,
                            bus: 0,
                            channel: d.channel,
                            kind: d.kind,
                        });
                    }
                    _ => {}
                }
            }
        }
        if let Some((id, header_word, _, _)) = current {
            if !acc.items.is_empty() {
                acc.module_id = id;
                acc.header_word = header_word;
                event.add_module_data(acc);
            }
        }
        sink(&event, &self.crate_map);
        Ok(())
    }

    /// Reads a single event pre-extracted into `buf` (MFM frame revision 0,
    /// legacy): module headers appear even for modules without data, and an
    /// end-of-event word *or* a framing-header word closes the current
    /// module. Retained for bug-compatibility with historical files; do not
    /// use for new data.
    pub fn read_event_in_buffer_v0(
        &self,
        buf: &[u8],
        mut sink: impl FnMut(&Event, &CrateMap) -> SinkOutcome,
    ) -> Result<(), ReaderError> {
        if buf.len() % 4 != 0 {
            return Err(ReaderError::BufferSizeNotMultipleOfFour(buf.len()));
        }
        let mut event = Event::default();
        let mut got_header = false;
        let mut reading_data = false;
        let mut acc = ModuleData::default();
        let mut current_firmware: Option<Firmware> = None;
        let mut current_nchan: u8 = 0;

        for word in buf
            .chunks_exact(4)
            .map(|c| word::word_from_le_bytes(c.try_into().unwrap()))
        {
            if word::is_module_header(word) {
                let id = word::module_id(word);
                acc = ModuleData {
                    module_id: id,
                    header_word: word,
                    announced_length: 0,
                    items: Vec::new(),
                };
                current_firmware = self.crate_map.get_module(id).map(|m| m.firmware);
                current_nchan = self
                    .crate_map
                    .get_module(id)
                    .map(|m| m.num_channels_or_buses)
                    .unwrap_or(0);
                got_header = true;
                reading_data = false;
                continue;
            }
            if let Some(firmware) = current_firmware {
                let is_mdpp = matches!(
                    firmware,
                    Firmware::MdppScp | Firmware::MdppQdc | Firmware::MdppCsi
                );
                if is_mdpp && word::is_mesytec_data_word(word, firmware) {
                    reading_data = true;
                    let d = word::decode_mdpp_data(word, current_nchan, firmware);
                    acc.items.push(ChannelDatum {
                        raw_word: word,
                        datum: d.datum,
                        bus: 0,
                        channel: d.channel,
                        kind: d.kind,
                    });
                    continue;
                }
            }
            if (got_header || reading_data)
                && (word::is_end_of_event(word) || word::frame_header(word).is_some())
            {
                got_header = false;
                reading_data = false;
                event.add_module_data(std::mem::take(&mut acc));
            }
        }
        sink(&event, &self.crate_map);
        Ok(())
    }
}
