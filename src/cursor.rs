//! Cursor-tracking state machine.
//!
//! Ported from `inserter.py`'s `compute_updated_cursor_position` and
//! `TextInserter.notify_document_content_change`: given a change
//! transaction, fold it through a tracked cursor's position, reconciling
//! against an in-flight edit the driver may be racing against the client.

use async_lsp::lsp_types::{Position, TextEdit};

use crate::change::{ChangeEvent, ChangeTransaction};
use crate::error::CoreError;
use crate::position::PositionCodec;

/// The glyph the driver inserts to mark the live cursor position in the
/// document while no real insertion point exists there yet.
pub const CURSOR_CHAR: char = '\u{2588}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorDescription {
    pub position: Position,
    pub has_cursor_char: bool,
    pub has_eol: bool,
}

/// An edit the driver has submitted via `applyEdit` but not yet confirmed,
/// together with the cursor state it will adopt if the edit lands.
#[derive(Debug, Clone)]
pub struct CursorUpdate {
    pub from_version: i32,
    pub to_version: i32,
    pub text_edits: Vec<TextEdit>,
    pub cursor: CursorDescription,
}

#[derive(Debug, Clone)]
pub struct CursorState {
    pub cursor: CursorDescription,
    pub at_version: i32,
    pub pending: Option<CursorUpdate>,
}

/// Updates every tracked cursor state against `transaction`, inspecting
/// `document_source` (the document text *after* the transaction) to refresh
/// `has_cursor_char`/`has_eol`. Returns whether any cursor's fold detected a
/// live cursor glyph surviving where our own edit expected one — the signal
/// the driver uses to request a cursor-sequence repair.
pub fn update_cursor_states(
    cursor_states: &mut [CursorState],
    transaction: &ChangeTransaction,
    document_source: &str,
) -> bool {
    let mut do_request_repair = false;
    for cursor_state in cursor_states.iter_mut() {
        if update_cursor_state(cursor_state, transaction, document_source) {
            do_request_repair = true;
        }
    }
    do_request_repair
}

fn update_cursor_state(
    cursor_state: &mut CursorState,
    transaction: &ChangeTransaction,
    document_source: &str,
) -> bool {
    let reconciled = reconcile_pending(cursor_state, transaction);
    if reconciled.skip_fold {
        return false;
    }

    let position = fold_position(
        cursor_state.cursor.position,
        cursor_state.cursor.has_cursor_char,
        reconciled.expect_cursor_char_repair,
        &reconciled.fold_transaction.changes,
    );

    let (has_cursor_char, has_eol) = inspect_document_at(document_source, position);
    let do_request_repair = cursor_state.cursor.has_cursor_char && has_cursor_char;

    cursor_state.cursor = CursorDescription {
        position,
        has_cursor_char,
        has_eol,
    };
    cursor_state.at_version = transaction.to_version;

    do_request_repair
}

struct ReconcileResult {
    skip_fold: bool,
    expect_cursor_char_repair: bool,
    fold_transaction: ChangeTransaction,
}

/// Attempts to match `cursor_state.pending` against `transaction`. The six
/// cases below mirror `notify_document_content_change`'s handling of a
/// pending update, in order of version-range relationship.
fn reconcile_pending(cursor_state: &mut CursorState, transaction: &ChangeTransaction) -> ReconcileResult {
    let mut expect_cursor_char_repair = false;
    let mut fold_transaction = transaction.clone();
    let mut skip_fold = false;

    if let Some(pending) = cursor_state.pending.clone() {
        if pending.from_version < transaction.from_version {
            // 1. Stale pending update (superseded by an earlier transaction
            // we apparently never saw); drop it and fold normally.
            cursor_state.pending = None;
        } else if pending.from_version == transaction.from_version && pending.to_version == transaction.to_version {
            // 2. Exact match: the whole transaction *is* our edit landing.
            cursor_state.cursor = pending.cursor;
            cursor_state.at_version = transaction.to_version;
            cursor_state.pending = None;
            skip_fold = true;
        } else if pending.from_version == transaction.from_version {
            if change_startswith_edits(transaction, &pending.text_edits) {
                // 3. Our edit landed as a prefix of a merged transaction;
                // adopt it, then fold whatever trails it.
                let edit_count = pending.text_edits.len();
                cursor_state.cursor = pending.cursor;
                cursor_state.at_version = pending.to_version;
                cursor_state.pending = None;
                if transaction.changes.len() == edit_count {
                    skip_fold = true;
                } else {
                    fold_transaction = ChangeTransaction {
                        from_version: cursor_state.at_version,
                        to_version: transaction.to_version,
                        changes: transaction.changes[edit_count..].to_vec(),
                    };
                }
            } else {
                // 4. Version range matches but content doesn't: the client
                // merged our edit with its own in a way we can't decompose.
                let err = CoreError::CursorDesync(
                    "change transaction merges server and client edits".to_string(),
                );
                tracing::warn!("{err}");
                if !cursor_state.cursor.has_cursor_char && pending.cursor.has_cursor_char {
                    expect_cursor_char_repair = true;
                }
                cursor_state.pending = None;
            }
        } else if pending.from_version >= transaction.from_version && pending.to_version <= transaction.to_version {
            // 5. The transaction spans entirely over our pending edit's
            // version range without matching it: a gap in our version
            // bookkeeping. Drop the pending update and fall back to a
            // brute-force refresh after folding.
            let err = CoreError::CursorDesync(
                "change transaction spans over a pending server edit".to_string(),
            );
            tracing::error!("{err}");
            cursor_state.pending = None;
        }
        // 6. pending.from_version > transaction.from_version: the pending
        // edit targets a future transaction we haven't seen yet. Leave it
        // untouched and fold the full transaction as normal.
    }

    ReconcileResult {
        skip_fold,
        expect_cursor_char_repair,
        fold_transaction,
    }
}

/// True when `transaction`'s leading change events are, element-wise, the
/// same ranged edits as `text_edits` (ported from `change_startswith_edits`).
fn change_startswith_edits(transaction: &ChangeTransaction, text_edits: &[TextEdit]) -> bool {
    if transaction.changes.len() < text_edits.len() {
        return false;
    }
    text_edits.iter().enumerate().all(|(i, edit)| {
        matches!(
            &transaction.changes[i].original,
            ChangeEvent::Ranged { range, text } if range == &edit.range && text == &edit.new_text
        )
    })
}

/// Folds a position `pos` through a sequence of minimal edits, applying the
/// before/same-line/straddle/after cases from `compute_updated_cursor_position`.
fn fold_position(
    initial: Position,
    initial_has_cursor_char: bool,
    mut expect_cursor_char_repair: bool,
    changes: &[crate::change::ChangeDetails],
) -> Position {
    let mut pos = initial;
    let mut have_cursor_char = initial_has_cursor_char;

    for change in changes {
        let TextEdit { range, new_text: text } = &change.minimal;

        if range.end.line < pos.line {
            // Strictly before pos, on an earlier line: shift by line delta only.
            shift_line(&mut pos, range, text);
        } else if range.end.line == pos.line && range.end.character <= pos.character {
            // Ends on pos's line, at or before pos's column.
            if expect_cursor_char_repair
                && range.end.character == pos.character
                && count_cursor_chars(text) == 1
            {
                pos = position_at_glyph(range.start, text);
                have_cursor_char = true;
                expect_cursor_char_repair = false;
            } else {
                shift_line(&mut pos, range, text);
                let carried = pos.character - range.end.character;
                pos.character = if let Some(last_nl) = text.rfind('\n') {
                    PositionCodec::client_units(&text[last_nl + 1..])
                } else {
                    range.start.character + PositionCodec::client_units(text)
                } + carried;
            }
        } else {
            let overlaps = range.start.line < pos.line
                || (range.start.line == pos.line && range.start.character < pos.character);
            if overlaps {
                // Straddle: pos falls inside the edited range. Priority order:
                // 1. deletion loses the glyph, 2. an existing glyph carried in
                // the replacement text wins, 3. a glyph placed to satisfy a
                // pending repair wins, 4. otherwise snap to the edit's start.
                if text.is_empty() {
                    pos = range.start;
                    have_cursor_char = false;
                } else if have_cursor_char && count_cursor_chars(text) == 1 {
                    pos = position_at_glyph(range.start, text);
                } else if expect_cursor_char_repair && count_cursor_chars(text) == 1 {
                    pos = position_at_glyph(range.start, text);
                    have_cursor_char = true;
                    expect_cursor_char_repair = false;
                } else {
                    pos = range.start;
                    have_cursor_char = false;
                }
            }
            // else: edit is strictly after pos; ignore for position purposes.
        }
    }

    pos
}

fn shift_line(pos: &mut Position, range: &async_lsp::lsp_types::Range, text: &str) {
    let old_line_count = range.end.line - range.start.line;
    let new_line_count = text.matches('\n').count() as u32;
    pos.line = (pos.line as i64 + i64::from(new_line_count) - i64::from(old_line_count)) as u32;
}

fn count_cursor_chars(text: &str) -> usize {
    text.matches(CURSOR_CHAR).count()
}

fn position_at_glyph(range_start: Position, text: &str) -> Position {
    let idx = text
        .find(CURSOR_CHAR)
        .expect("caller verified exactly one cursor glyph in text");
    let prefix = &text[..idx];
    let line_count = prefix.matches('\n').count() as u32;
    if line_count == 0 {
        Position {
            line: range_start.line,
            character: range_start.character + PositionCodec::client_units(prefix),
        }
    } else {
        let last_line = prefix.rsplit('\n').next().unwrap_or("");
        Position {
            line: range_start.line + line_count,
            character: PositionCodec::client_units(last_line),
        }
    }
}

/// Brute-force refresh of `has_cursor_char`/`has_eol` by looking at the
/// document text right after `pos`.
fn inspect_document_at(source: &str, pos: Position) -> (bool, bool) {
    let offset = PositionCodec::offset_from_position(source, pos);
    if offset >= source.len() {
        return (false, false);
    }
    let rest = &source[offset..];
    match rest.strip_prefix(CURSOR_CHAR) {
        Some(after) => (true, after.starts_with("\r\n") || after.starts_with('\n')),
        None => (false, false),
    }
}
