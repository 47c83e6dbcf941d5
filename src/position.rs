//! Conversions between UTF-16 code units (the client's position encoding)
//! and byte offsets into a document's UTF-8 source.
//!
//! Generalizes the byte-offset approximation in the teacher's
//! `documents::line_char_to_offset` (which it flags as "may be slightly off
//! for non-ASCII") into an exact codec.

use async_lsp::lsp_types::Position;

pub struct PositionCodec;

impl PositionCodec {
    /// Number of UTF-16 code units `s` would occupy on the wire.
    pub fn client_units(s: &str) -> u32 {
        s.encode_utf16().count() as u32
    }

    /// Byte offset of `pos` within `source`. Out-of-range lines clamp to the
    /// end of the document; out-of-range characters clamp to the end of the
    /// line.
    pub fn offset_from_position(source: &str, pos: Position) -> usize {
        let mut offset = 0usize;
        let mut lines = source.split('\n');
        for _ in 0..pos.line {
            match lines.next() {
                Some(line) => offset += line.len() + 1,
                None => return source.len(),
            }
        }
        match lines.next() {
            Some(line) => offset + byte_offset_for_units(line, pos.character),
            None => source.len(),
        }
    }

    /// Client `Position` of a byte offset within `source`.
    pub fn position_from_offset(source: &str, offset: usize) -> Position {
        let offset = offset.min(source.len());
        let prefix = &source[..offset];
        let line = prefix.matches('\n').count() as u32;
        let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
        Position {
            line,
            character: Self::client_units(&prefix[line_start..]),
        }
    }

    /// Byte offset of char-index `idx` (a Unicode scalar count, not a UTF-16
    /// unit count) within `s`.
    pub fn byte_offset_for_char_index(s: &str, idx: usize) -> usize {
        s.char_indices().nth(idx).map_or(s.len(), |(byte, _)| byte)
    }
}

fn byte_offset_for_units(line: &str, character: u32) -> usize {
    let mut units = 0u32;
    for (byte_idx, ch) in line.char_indices() {
        if units >= character {
            return byte_idx;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trip() {
        let source = "hello\nworld\n";
        let pos = Position { line: 1, character: 3 };
        let offset = PositionCodec::offset_from_position(source, pos);
        assert_eq!(offset, "hello\nwor".len());
        assert_eq!(PositionCodec::position_from_offset(source, offset), pos);
    }

    #[test]
    fn astral_characters_count_as_two_utf16_units() {
        let source = "a\u{1F600}b"; // a, emoji (surrogate pair), b
        assert_eq!(PositionCodec::client_units("\u{1F600}"), 2);
        let pos_after_emoji = Position { line: 0, character: 3 };
        let offset = PositionCodec::offset_from_position(source, pos_after_emoji);
        assert_eq!(&source[offset..], "b");
    }

    #[test]
    fn character_beyond_line_end_clamps() {
        let source = "hi\nthere";
        let pos = Position { line: 0, character: 100 };
        assert_eq!(PositionCodec::offset_from_position(source, pos), 2);
    }

    #[test]
    fn line_beyond_document_clamps_to_end() {
        let source = "hi";
        let pos = Position { line: 5, character: 0 };
        assert_eq!(PositionCodec::offset_from_position(source, pos), source.len());
    }
}
