//! End-to-end scenarios and cross-cutting invariants for the buffer reader,
//! built directly from 32-bit little-endian word sequences the way the MVLC
//! actually emits them.

use mesytec_mvlc_parser::{BufferReader, CrateMapBuilder, Event, Firmware, SinkOutcome};

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(words.len() * 4);
    for w in words {
        buf.extend_from_slice(&w.to_le_bytes());
    }
    buf
}

fn basic_crate_map() -> mesytec_mvlc_parser::CrateMap {
    CrateMapBuilder::new()
        .with_mdpp(0x00, "mdpp0", Firmware::MdppScp, 16)
        .with_start_readout(0xF0)
        .with_end_readout(0xF1)
        .build()
}

fn crate_map_with_tgv() -> mesytec_mvlc_parser::CrateMap {
    CrateMapBuilder::new()
        .with_mdpp(0x00, "mdpp0", Firmware::MdppScp, 16)
        .with_tgv(0x01, "tgv0")
        .with_start_readout(0xF0)
        .with_end_readout(0xF1)
        .build()
}

const S1_WORDS: [u32; 9] = [
    0xF3000008, 0x40F00000, 0xC0000000, 0x4000000A, 0x10020123, 0x10030456, 0xC0000001,
    0x40F10000, 0xC0000000,
];

fn s2_words(first_tgv_word: u32) -> Vec<u32> {
    vec![
        0xF3000008, 0x40F00000, 0xC0000000, 0x4000000A, 0x10020123, 0x10030456, 0xC0000001,
        0x40010004, first_tgv_word, 0x0000BEEF, 0x0000CAFE, 0x0000F00D, 0xC0000000, 0x40F10000,
        0xC0000000,
    ]
}

#[test]
fn s1_single_mdpp_event() {
    let mut reader = BufferReader::new(basic_crate_map());
    let buf = words_to_bytes(&S1_WORDS);
    let mut delivered: Vec<Event> = Vec::new();
    reader
        .read_buffer_collate_events(&buf, |ev, _cm| {
            delivered.push(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();

    assert_eq!(delivered.len(), 1);
    let ev = &delivered[0];
    assert_eq!(ev.event_counter, 0);
    assert_eq!(ev.modules.len(), 1);
    assert_eq!(ev.modules[0].module_id, 0x00);
    assert_eq!(ev.modules[0].items.len(), 2);
    assert_eq!(ev.modules[0].items[0].channel, 2);
    assert_eq!(ev.modules[0].items[0].datum, 0x0123);
    assert_eq!(ev.modules[0].items[1].channel, 3);
    assert_eq!(ev.modules[0].items[1].datum, 0x0456);
    assert_eq!((ev.tgv_ts_lo, ev.tgv_ts_mid, ev.tgv_ts_hi), (0, 0, 0));
}

#[test]
fn s2_tgv_ready() {
    let mut reader = BufferReader::new(crate_map_with_tgv());
    let buf = words_to_bytes(&s2_words(0x00000004));
    let mut delivered: Vec<Event> = Vec::new();
    reader
        .read_buffer_collate_events(&buf, |ev, _cm| {
            delivered.push(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();

    assert_eq!(delivered.len(), 1);
    let ev = &delivered[0];
    assert_eq!(ev.tgv_ts_lo, 0xBEEF);
    assert_eq!(ev.tgv_ts_mid, 0xCAFE);
    assert_eq!(ev.tgv_ts_hi, 0xF00D);
    // the TGV module itself never becomes a module-data entry in the event
    assert_eq!(ev.modules.len(), 1);
    assert_eq!(ev.modules[0].module_id, 0x00);
}

#[test]
fn s3_tgv_not_ready() {
    let mut reader = BufferReader::new(crate_map_with_tgv());
    let buf = words_to_bytes(&s2_words(0x00000000));
    let mut delivered: Vec<Event> = Vec::new();
    reader
        .read_buffer_collate_events(&buf, |ev, _cm| {
            delivered.push(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();

    assert_eq!(delivered.len(), 1);
    let ev = &delivered[0];
    assert_eq!((ev.tgv_ts_lo, ev.tgv_ts_mid, ev.tgv_ts_hi), (0, 0, 0));
}

/// One full readout cycle (start sentinel .. module .. end sentinel)
/// carrying a single distinguishing data word, so each cycle produces
/// exactly one event.
fn one_cycle(datum: u16) -> Vec<u32> {
    vec![
        0x40F00000,
        0xC0000000,
        0x4000000A,
        0x1002_0000 | datum as u32,
        0xC0000000,
        0x40F10000,
        0xC0000000,
    ]
}

#[test]
fn s4_sink_backpressure() {
    // Three back-to-back events (one per readout cycle), distinguished by
    // their data word, concatenated into one buffer.
    let mut combined = vec![0xF3000008u32];
    combined.extend(one_cycle(0x0001));
    combined.extend(one_cycle(0x0003));
    let words_before_event3 = combined.len();
    combined.extend(one_cycle(0x0005));
    let buf = words_to_bytes(&combined);

    let mut reader = BufferReader::new(basic_crate_map());
    let mut refuse_next = true;
    let mut delivered: Vec<u16> = Vec::new();
    let record = |ev: &Event, deliv: &mut Vec<u16>| deliv.push(ev.modules[0].items[0].datum);

    let n1 = reader
        .read_buffer_collate_events(&buf, |ev, _cm| {
            if ev.modules[0].items[0].datum == 0x0003 && refuse_next {
                refuse_next = false;
                return SinkOutcome::FullRetryLater;
            }
            record(ev, &mut delivered);
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(n1, 1);
    assert!(reader.storing_last_complete_event());

    let n2 = reader
        .read_buffer_collate_events(&[], |ev, _cm| {
            record(ev, &mut delivered);
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(n2, 1);
    assert!(!reader.storing_last_complete_event());

    let rest_bytes = words_to_bytes(&combined[words_before_event3..]);
    let n3 = reader
        .read_buffer_collate_events(&rest_bytes, |ev, _cm| {
            record(ev, &mut delivered);
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(n3, 1);
    assert_eq!(delivered, vec![0x0001, 0x0003, 0x0005]);
}

#[test]
fn s5_split_across_buffers() {
    let full = s2_words(0x00000004);
    // cut between the MDPP's second data word and its end-of-event
    let split_at = full.iter().position(|&w| w == 0xC0000001).unwrap();
    let (first_half, second_half) = full.split_at(split_at);

    let mut reader = BufferReader::new(crate_map_with_tgv());
    let mut delivered: Vec<Event> = Vec::new();
    reader
        .read_buffer_collate_events(&words_to_bytes(first_half), |ev, _cm| {
            delivered.push(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();
    assert!(delivered.is_empty());

    reader
        .read_buffer_collate_events(&words_to_bytes(second_half), |ev, _cm| {
            delivered.push(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].tgv_ts_lo, 0xBEEF);
}

#[test]
fn s6_empty_event_suppressed() {
    let mut reader = BufferReader::new(basic_crate_map());
    let words = [0x40F00000u32, 0xC0000000, 0x40F10000, 0xC0000000];
    let mut invocations = 0;
    reader
        .read_buffer_collate_events(&words_to_bytes(&words), |_ev, _cm| {
            invocations += 1;
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(invocations, 0);
    assert_eq!(reader.total_events_parsed(), 0);
}

#[test]
fn p1_alignment_rejects_unaligned_buffer() {
    let mut reader = BufferReader::new(basic_crate_map());
    let err = reader
        .read_buffer_collate_events(&[0, 1, 2], |_ev, _cm| SinkOutcome::Accepted)
        .unwrap_err();
    assert!(matches!(err, mesytec_mvlc_parser::ReaderError::BufferSizeNotMultipleOfFour(3)));
}

#[test]
fn p2_order_preservation() {
    let mut combined = Vec::new();
    for a in [1u16, 2, 3] {
        combined.extend(one_cycle(a));
    }

    let mut reader = BufferReader::new(basic_crate_map());
    let mut order = Vec::new();
    reader
        .read_buffer_collate_events(&words_to_bytes(&combined), |ev, _cm| {
            order.push(ev.modules[0].items[0].datum);
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn p3_counter_monotonicity() {
    let mut combined = Vec::new();
    for _ in 0..3 {
        combined.extend(one_cycle(1));
    }

    let mut reader = BufferReader::new(basic_crate_map());
    let mut counters = Vec::new();
    reader
        .read_buffer_collate_events(&words_to_bytes(&combined), |ev, _cm| {
            counters.push(ev.event_counter);
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(counters, vec![0, 1, 2]);
}

#[test]
fn p4_tgv_contract_both_branches() {
    for (flag, expect_nonzero) in [(0x00000004u32, true), (0x00000000u32, false)] {
        let mut reader = BufferReader::new(crate_map_with_tgv());
        let mut got: Option<Event> = None;
        reader
            .read_buffer_collate_events(&words_to_bytes(&s2_words(flag)), |ev, _cm| {
                got = Some(ev.clone());
                SinkOutcome::Accepted
            })
            .unwrap();
        let ev = got.unwrap();
        if expect_nonzero {
            assert_eq!((ev.tgv_ts_lo, ev.tgv_ts_mid, ev.tgv_ts_hi), (0xBEEF, 0xCAFE, 0xF00D));
        } else {
            assert_eq!((ev.tgv_ts_lo, ev.tgv_ts_mid, ev.tgv_ts_hi), (0, 0, 0));
        }
    }
}

#[test]
fn p5_empty_event_suppression() {
    s6_empty_event_suppressed();
}

#[test]
fn p6_resume_idempotence() {
    s4_sink_backpressure();
}

#[test]
fn p7_v1_round_trip() {
    let mut reader = BufferReader::new(basic_crate_map());
    let mut original: Option<Event> = None;
    reader
        .read_buffer_collate_events(&words_to_bytes(&S1_WORDS), |ev, _cm| {
            original = Some(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();
    let original = original.unwrap();
    let serialized = original.serialize();

    let mut roundtripped: Option<Event> = None;
    reader
        .read_event_in_buffer_v1(&serialized, |ev, _cm| {
            roundtripped = Some(ev.clone());
            SinkOutcome::Accepted
        })
        .unwrap();
    let roundtripped = roundtripped.unwrap();

    assert_eq!(roundtripped.modules.len(), original.modules.len());
    for (a, b) in original.modules.iter().zip(roundtripped.modules.iter()) {
        assert_eq!(a.module_id, b.module_id);
        let a_data: Vec<_> = a.items.iter().map(|i| (i.channel, i.datum)).collect();
        let b_data: Vec<_> = b.items.iter().map(|i| (i.channel, i.datum)).collect();
        assert_eq!(a_data, b_data);
    }
}

#[test]
fn p8_split_buffer_continuity() {
    s5_split_across_buffers();
}

#[test]
fn p9_reset_purity() {
    let mut reader = BufferReader::new(basic_crate_map());
    reader
        .read_buffer_collate_events(&words_to_bytes(&S1_WORDS), |_ev, _cm| SinkOutcome::Accepted)
        .unwrap();
    assert_eq!(reader.total_events_parsed(), 1);

    reader.reset();
    assert_eq!(reader.total_events_parsed(), 0);
    assert!(!reader.storing_last_complete_event());

    let mut fresh = BufferReader::new(basic_crate_map());
    let mut reset_counters = Vec::new();
    let mut fresh_counters = Vec::new();
    reader
        .read_buffer_collate_events(&words_to_bytes(&S1_WORDS), |ev, _cm| {
            reset_counters.push(ev.event_counter);
            SinkOutcome::Accepted
        })
        .unwrap();
    fresh
        .read_buffer_collate_events(&words_to_bytes(&S1_WORDS), |ev, _cm| {
            fresh_counters.push(ev.event_counter);
            SinkOutcome::Accepted
        })
        .unwrap();
    assert_eq!(reset_counters, fresh_counters);
}
