// SPDX-License-Identifier: MIT OR Apache-2.0
//! Incremental decoder for the `text/event-stream` wire format.
//!
//! The decoder is a push-style state machine: callers feed it text or byte
//! chunks split at arbitrary boundaries and collect complete records as they
//! fall out. Carry state between calls is limited to one partial line, the
//! field group accumulated so far, a possible trailing `\r`, and (for the
//! byte API) an incomplete UTF-8 suffix.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Records and lines
// ---------------------------------------------------------------------------

/// One decoded server-sent event.
///
/// `data` is the newline-joined concatenation of every `data:` field in the
/// group; the remaining fields keep the last valid occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SseRecord {
    /// Last `id:` field of the group, if any carried no NUL byte.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Last `event:` field of the group.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// All `data:` field values joined with `\n`.
    pub data: String,
    /// Last `retry:` field of the group whose value was all ASCII digits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<String>,
}

/// One classified line of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// A line starting with `:`, ignored by the protocol.
    Comment(String),
    /// A `key: value` line. A line with no colon is a field with an empty
    /// value.
    Field {
        /// Field name, the text before the first colon.
        key: String,
        /// Field value with at most one leading space removed.
        value: String,
    },
}

/// Classify a single line (without its terminator) as comment or field.
///
/// Splits on the first colon and strips one leading space from the value,
/// so `data: x` and `data:x` carry the same value while `data:  x` keeps
/// one space.
#[must_use]
pub fn parse_line(line: &str) -> SseLine {
    if let Some(rest) = line.strip_prefix(':') {
        return SseLine::Comment(rest.to_owned());
    }
    match line.split_once(':') {
        Some((key, value)) => SseLine::Field {
            key: key.to_owned(),
            value: value.strip_prefix(' ').unwrap_or(value).to_owned(),
        },
        None => SseLine::Field {
            key: line.to_owned(),
            value: String::new(),
        },
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Incremental event-stream decoder.
///
/// Feed chunks with [`SseDecoder::feed`] or [`SseDecoder::feed_bytes`]; each
/// call returns the records completed by that chunk. A record is complete
/// only once its terminating blank line has been seen, so a partial trailing
/// record is carried silently until more input arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Incomplete UTF-8 suffix carried between `feed_bytes` calls.
    utf8_tail: Vec<u8>,
    /// A chunk ended in `\r`; a leading `\n` in the next chunk is part of
    /// the same terminator.
    pending_cr: bool,
    /// Partial line carried between chunks.
    line: String,
    /// Lines of the group being accumulated, already classified.
    fields: Vec<(String, String)>,
}

impl SseDecoder {
    /// Create a decoder with no carry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a text chunk and collect the records it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseRecord> {
        let mut records = Vec::new();
        for ch in chunk.chars() {
            match ch {
                '\n' if self.pending_cr => self.pending_cr = false,
                '\n' => self.end_line(&mut records),
                '\r' => {
                    self.end_line(&mut records);
                    self.pending_cr = true;
                }
                other => {
                    self.pending_cr = false;
                    self.line.push(other);
                }
            }
        }
        records
    }

    /// Feed a byte chunk, reassembling UTF-8 sequences split across chunks.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<SseRecord> {
        let text = self.take_utf8(chunk);
        self.feed(&text)
    }

    /// Drop all carry state, returning the decoder to its initial state.
    pub fn reset(&mut self) {
        self.utf8_tail.clear();
        self.pending_cr = false;
        self.line.clear();
        self.fields.clear();
    }

    /// Finish the current line: a blank line seals the group into a record,
    /// anything else joins the group.
    fn end_line(&mut self, records: &mut Vec<SseRecord>) {
        if self.line.is_empty() {
            records.push(fold_group(std::mem::take(&mut self.fields)));
            return;
        }
        let line = std::mem::take(&mut self.line);
        if let SseLine::Field { key, value } = parse_line(&line) {
            self.fields.push((key, value));
        }
    }

    /// Splice `chunk` onto the carried suffix and split off whatever trails
    /// as an incomplete UTF-8 sequence for the next call.
    fn take_utf8(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.utf8_tail);
        buf.extend_from_slice(chunk);
        let keep = buf.len() - incomplete_suffix_len(&buf);
        self.utf8_tail = buf.split_off(keep);
        match String::from_utf8(buf) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(&err.into_bytes()).into_owned(),
        }
    }
}

/// Decode a complete event-stream text in one call.
#[must_use]
pub fn decode(text: &str) -> Vec<SseRecord> {
    SseDecoder::new().feed(text)
}

// ---------------------------------------------------------------------------
// Group folding
// ---------------------------------------------------------------------------

/// Fold one field group into a record. `data` lines join with `\n`; `id`,
/// `event` and `retry` keep the last valid occurrence. An `id` containing a
/// NUL byte is skipped without clearing an earlier one, and `retry` must be
/// a non-empty run of ASCII digits.
fn fold_group(fields: Vec<(String, String)>) -> SseRecord {
    let mut record = SseRecord::default();
    let mut data = Vec::new();
    for (key, value) in fields {
        match key.as_str() {
            "data" => data.push(value),
            "id" => {
                if !value.contains('\0') {
                    record.id = Some(value);
                }
            }
            "event" => record.event = Some(value),
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    record.retry = Some(value);
                }
            }
            _ => {}
        }
    }
    record.data = data.join("\n");
    record
}

/// Length of the incomplete UTF-8 sequence at the end of `buf`, or 0 when
/// the buffer ends on a sequence boundary (including ending mid-garbage,
/// which the lossy pass handles).
fn incomplete_suffix_len(buf: &[u8]) -> usize {
    // Walk back over at most three continuation bytes to the lead byte.
    let mut have = 0;
    for &byte in buf.iter().rev().take(4) {
        have += 1;
        if byte & 0b1100_0000 != 0b1000_0000 {
            let need = match byte {
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => return 0,
            };
            return if have < need { have } else { 0 };
        }
    }
    0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
