//! Normalizes raw `didChange` notifications into minimal text edits.
//!
//! `minimal_contiguous_difference` is ported from
//! `observable_lsp.py::_minimal_contiguous_difference`: find the shortest
//! contiguous span in which two strings disagree, operating on Unicode
//! scalar values (not bytes) so the result always lands on a UTF-8 char
//! boundary.

use async_lsp::lsp_types::{Position, Range, TextEdit};

use crate::error::CoreError;
use crate::position::PositionCodec;

/// A single raw change event as received from the client, before
/// normalization against the document it was applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Ranged { range: Range, text: String },
    Full { text: String },
}

/// One change event, plus the document text immediately before and after it
/// was applied, plus its minimal ranged-edit equivalent.
#[derive(Debug, Clone)]
pub struct ChangeDetails {
    pub original: ChangeEvent,
    pub from_text: String,
    pub to_text: String,
    pub minimal: TextEdit,
}

/// A `didChange` notification's full batch of events, normalized against the
/// document version they transition between.
#[derive(Debug, Clone)]
pub struct ChangeTransaction {
    pub from_version: i32,
    pub to_version: i32,
    pub changes: Vec<ChangeDetails>,
}

pub struct ChangeNormalizer;

impl ChangeNormalizer {
    /// Applies `events` to `document` in order, mutating it in place, and
    /// returns the resulting transaction. Events that leave the document
    /// unchanged are dropped (their minimal edit would be empty).
    pub fn normalize(
        document: &mut String,
        from_version: i32,
        to_version: i32,
        events: &[ChangeEvent],
    ) -> Result<ChangeTransaction, CoreError> {
        let mut changes = Vec::with_capacity(events.len());
        for event in events {
            let from_text = document.clone();
            apply_event(document, event)?;
            let to_text = document.clone();
            if to_text == from_text {
                continue;
            }
            let minimal = minimal_change_event(&from_text, &to_text, event);
            changes.push(ChangeDetails {
                original: event.clone(),
                from_text,
                to_text,
                minimal,
            });
        }
        Ok(ChangeTransaction {
            from_version,
            to_version,
            changes,
        })
    }
}

fn apply_event(document: &mut String, event: &ChangeEvent) -> Result<(), CoreError> {
    match event {
        ChangeEvent::Full { text } => {
            *document = text.clone();
            Ok(())
        }
        ChangeEvent::Ranged { range, text } => {
            if range.start > range.end {
                return Err(CoreError::ProtocolViolation(format!(
                    "change range start {:?} after end {:?}",
                    range.start, range.end
                )));
            }
            let start = PositionCodec::offset_from_position(document, range.start);
            let end = PositionCodec::offset_from_position(document, range.end);
            if start > end || end > document.len() {
                return Err(CoreError::ProtocolViolation(format!(
                    "change range {range:?} falls outside the document"
                )));
            }
            document.replace_range(start..end, text);
            Ok(())
        }
    }
}

/// Returns the minimal ranged `TextEdit` that transforms `from_text` into
/// `to_text`, consistent with `original` when `original` is already minimal
/// (a ranged event whose range is empty, or whose text is empty).
fn minimal_change_event(from_text: &str, to_text: &str, original: &ChangeEvent) -> TextEdit {
    if let ChangeEvent::Ranged { range, text } = original {
        if range.start == range.end || text.is_empty() {
            return TextEdit {
                range: *range,
                new_text: text.clone(),
            };
        }
    }

    let ((a_start, a_end), (b_start, b_end)) = minimal_contiguous_difference(from_text, to_text);
    let byte_a_start = PositionCodec::byte_offset_for_char_index(from_text, a_start);
    let byte_a_end = PositionCodec::byte_offset_for_char_index(from_text, a_end);
    let byte_b_start = PositionCodec::byte_offset_for_char_index(to_text, b_start);
    let byte_b_end = PositionCodec::byte_offset_for_char_index(to_text, b_end);

    TextEdit {
        range: Range {
            start: PositionCodec::position_from_offset(from_text, byte_a_start),
            end: PositionCodec::position_from_offset(from_text, byte_a_end),
        },
        new_text: to_text[byte_b_start..byte_b_end].to_string(),
    }
}

/// Finds the shortest contiguous span `(a_start, a_end)` in `a` and
/// `(b_start, b_end)` in `b`, expressed as Unicode scalar indices, such that
/// replacing `a[a_start..a_end]` with `b[b_start..b_end]` yields `b`.
fn minimal_contiguous_difference(a: &str, b: &str) -> ((usize, usize), (usize, usize)) {
    let len_a = a.chars().count();
    let len_b = b.chars().count();

    if len_a == 0 {
        return ((0, 0), (0, len_b));
    }
    if len_b == 0 {
        return ((0, len_a), (0, 0));
    }
    if len_a < len_b {
        if b.starts_with(a) {
            return ((len_a, len_a), (len_a, len_b));
        }
        if b.ends_with(a) {
            return ((0, 0), (0, len_b - len_a));
        }
    } else if len_b < len_a {
        if a.starts_with(b) {
            return ((len_b, len_a), (len_b, len_b));
        }
        if a.ends_with(b) {
            return ((0, len_a - len_b), (0, 0));
        }
    } else if a == b {
        return ((0, 0), (0, 0));
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let min_len = len_a.min(len_b);

    let forward = (0..min_len)
        .find(|&i| a_chars[i] != b_chars[i])
        .expect("a and b differ but share no prefix/suffix shortcut");
    let backward = (1..=min_len)
        .find(|&j| a_chars[len_a - j] != b_chars[len_b - j])
        .expect("a and b differ but share no prefix/suffix shortcut");

    ((forward, len_a - backward + 1), (forward, len_b - backward + 1))
}
