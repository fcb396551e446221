//! A pretty-printer for buffers around the current read position. Used only
//! to annotate failures from the error-handler collaborator; never called on
//! the hot path.

use std::convert::TryInto;

use crate::word::{self, FrameType};

fn classify_for_display(word: u32) -> &'static str {
    if let Some(fh) = word::frame_header(word) {
        return match fh.frame_type {
            FrameType::SuperFrame => "SuperFrame",
            FrameType::StackFrame => "StackFrame",
            FrameType::BlockRead => "BlockRead",
            FrameType::StackError => "StackError",
            FrameType::StackContinuation => "StackContinuation",
            FrameType::SystemEvent => "SystemEvent",
        };
    }
    if word::is_module_header(word) {
        return "ModuleHeader";
    }
    if word::is_end_of_event(word) {
        return "EndOfEvent";
    }
    if word & word::MDPP_DATA_MASK == word::MDPP_DATA_VALUE {
        return "MdppData";
    }
    if word & 0xF000_0000 == word::VMMR_TDC_DATA_VALUE {
        return "VmmrTdcData";
    }
    if word & word::EXTENDED_TS_MASK == word::EXTENDED_TS_VALUE {
        return "ExtendedTimestamp";
    }
    if word == 0 {
        return "FillWord";
    }
    if word & word::LOW_PAYLOAD_MASK == word::LOW_PAYLOAD_VALUE {
        return "LowPayload";
    }
    "Unknown"
}

/// Walks a window of `words_before`/`words_after` around `cursor_word_index`
/// (a word offset, not a byte offset, into `buf`), rendering each word in
/// hex with its classification and bracketing the cursor word.
pub fn dump_buffer(
    buf: &[u8],
    cursor_word_index: usize,
    words_before: usize,
    words_after: usize,
    annotation: &str,
) -> String {
    let total_words = buf.len() / 4;
    let start = cursor_word_index.saturating_sub(words_before);
    let end = (cursor_word_index + words_after + 1).min(total_words);

    let mut out = String::new();
    out.push_str(&format!("-- {} --\n", annotation));
    for i in start..end {
        let off = i * 4;
        let word = word::word_from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let marker = if i == cursor_word_index { ">>" } else { "  " };
        out.push_str(&format!(
            "{marker} [{i:>6}] 0x{word:08X}  {kind}\n",
            marker = marker,
            i = i,
            word = word,
            kind = classify_for_display(word)
        ));
    }
    out
}
