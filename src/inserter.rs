//! The insertion driver: races generated text fragments against the
//! client's document, one `workspace/applyEdit` at a time.
//!
//! Ported from `inserter.py::TextInserter` (`try_insert_text`,
//! `try_apply_edits`, `try_remove_cursor_sequence`) and
//! `insert_queued_text`. The lock around `TextInserter` is only ever held
//! across synchronous bookkeeping, never across an `await` on the client —
//! `notify_document_content_change` (via `cursor::update_cursor_states`) has
//! to be able to run from the `didChange` handler while an edit is in
//! flight, and that handler is not async.

use std::sync::Arc;
use std::time::Duration;

use async_lsp::lsp_types::{
    ApplyWorkspaceEditParams, DocumentChanges, OneOf, OptionalVersionedTextDocumentIdentifier,
    Position, Range, TextDocumentEdit, TextEdit, Url, WorkspaceEdit,
};
use async_lsp::{ClientSocket, LanguageClient};
use std::sync::Mutex;

use crate::cursor::{update_cursor_states, CursorDescription, CursorState, CursorUpdate, CURSOR_CHAR};
use crate::change::ChangeTransaction;
use crate::error::CoreError;
use crate::position::PositionCodec;

/// One fragment delivered through the generator-to-driver queue, or a
/// sentinel marking the end of the stream or a cursor-repair request.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Text(String),
    EndOfStream,
    RequestCursorRepair,
}

/// Tracks the live insertion cursor for a single run and mediates every
/// edit the driver submits against it.
pub struct TextInserter {
    cursor_states: Vec<CursorState>,
    eol_sequence: String,
    /// The cursor's position while `cursor_states` has been forked to two
    /// entries mid-`applyEdit`; `get_cursor_position` falls back to this.
    last_known_position: Option<Position>,
}

struct PreparedEdit {
    version: i32,
    text_edits: Vec<TextEdit>,
    cursor_upon_success: CursorDescription,
}

enum InsertAttempt {
    /// An edit is already in flight; try again once it settles.
    Blocked,
    /// Nothing needs to change in the document.
    NoOp,
    Prepared(PreparedEdit),
}

impl TextInserter {
    pub fn new(insertion_pos: Position, at_version: i32, eol_sequence: String) -> Self {
        Self {
            cursor_states: vec![CursorState {
                cursor: CursorDescription {
                    position: insertion_pos,
                    has_cursor_char: false,
                    has_eol: false,
                },
                at_version,
                pending: None,
            }],
            eol_sequence,
            last_known_position: None,
        }
    }

    /// Folds a `didChange` transaction through every tracked cursor. Must be
    /// called synchronously from the notification handler; never awaits.
    pub fn notify_document_content_change(&mut self, transaction: &ChangeTransaction, document_source: &str) -> bool {
        update_cursor_states(&mut self.cursor_states, transaction, document_source)
    }

    pub fn cursor_position(&self) -> Position {
        if self.cursor_states.len() == 1 {
            self.cursor_states[0].cursor.position
        } else {
            self.last_known_position
                .expect("last_known_position is set whenever cursor_states is forked")
        }
    }

    fn begin_insert(&self, text: &str) -> InsertAttempt {
        let [cursor_state] = self.cursor_states.as_slice() else {
            return InsertAttempt::Blocked;
        };
        if cursor_state.pending.is_some() {
            return InsertAttempt::Blocked;
        }
        let cursor = cursor_state.cursor;

        let mut new_position = cursor.position;
        if let Some(idx) = text.rfind('\n') {
            new_position.line += text.matches('\n').count() as u32;
            new_position.character = PositionCodec::client_units(&text[idx + 1..]);
        } else {
            new_position.character += PositionCodec::client_units(text);
        }
        let mut cursor_upon_success = CursorDescription {
            position: new_position,
            has_cursor_char: cursor.has_cursor_char,
            has_eol: cursor.has_eol,
        };

        let mut repair = String::new();
        if !cursor.has_cursor_char {
            repair.push(CURSOR_CHAR);
            cursor_upon_success.has_cursor_char = true;
            if !cursor.has_eol {
                repair.push_str(&self.eol_sequence);
                cursor_upon_success.has_eol = true;
            }
        }

        let new_text = format!("{text}{repair}");
        if new_text.is_empty() {
            return InsertAttempt::NoOp;
        }

        InsertAttempt::Prepared(PreparedEdit {
            version: cursor_state.at_version,
            text_edits: vec![TextEdit {
                range: Range { start: cursor.position, end: cursor.position },
                new_text,
            }],
            cursor_upon_success,
        })
    }

    fn begin_remove_cursor_sequence(&self) -> InsertAttempt {
        let [cursor_state] = self.cursor_states.as_slice() else {
            return InsertAttempt::Blocked;
        };
        if cursor_state.pending.is_some() {
            return InsertAttempt::Blocked;
        }
        let cursor = cursor_state.cursor;
        if !cursor.has_cursor_char {
            return InsertAttempt::NoOp;
        }

        let start = cursor.position;
        let end = if cursor.has_eol {
            Position { line: start.line + 1, character: 0 }
        } else {
            Position {
                line: start.line,
                character: start.character + PositionCodec::client_units(&CURSOR_CHAR.to_string()),
            }
        };

        InsertAttempt::Prepared(PreparedEdit {
            version: cursor_state.at_version,
            text_edits: vec![TextEdit { range: Range { start, end }, new_text: String::new() }],
            cursor_upon_success: CursorDescription {
                position: cursor.position,
                has_cursor_char: false,
                has_eol: false,
            },
        })
    }

    /// Forks the tracked cursor into a success/failure pair while the edit
    /// described by `prepared` is in flight.
    fn fork(&mut self, prepared: &PreparedEdit) {
        debug_assert_eq!(self.cursor_states.len(), 1);
        let failure_path = self.cursor_states[0].clone();
        self.last_known_position = Some(failure_path.cursor.position);
        let success_path = CursorState {
            pending: Some(CursorUpdate {
                from_version: prepared.version,
                to_version: prepared.version + 1,
                text_edits: prepared.text_edits.clone(),
                cursor: prepared.cursor_upon_success,
            }),
            ..failure_path.clone()
        };
        self.cursor_states = vec![success_path, failure_path];
    }

    /// Collapses the forked cursor pair back to one, keeping the success
    /// path if `applied` and the failure path otherwise.
    fn collapse(&mut self, applied: bool) {
        debug_assert_eq!(self.cursor_states.len(), 2);
        let [success_path, failure_path] = <[_; 2]>::try_from(std::mem::take(&mut self.cursor_states))
            .unwrap_or_else(|_| unreachable!("collapse called with a non-forked cursor_states"));
        self.cursor_states = vec![if applied { success_path } else { failure_path }];
        self.last_known_position = None;
    }
}

fn build_workspace_edit(uri: &Url, version: i32, text_edits: Vec<TextEdit>) -> WorkspaceEdit {
    WorkspaceEdit {
        changes: None,
        document_changes: Some(DocumentChanges::Edits(vec![TextDocumentEdit {
            text_document: OptionalVersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version: Some(version),
            },
            edits: text_edits.into_iter().map(OneOf::Left).collect(),
        }])),
        change_annotations: None,
    }
}

async fn apply_prepared_edit(
    inserter: &Mutex<TextInserter>,
    client: &ClientSocket,
    uri: &Url,
    prepared: PreparedEdit,
) -> bool {
    {
        let mut guard = inserter.lock().unwrap();
        guard.fork(&prepared);
    }

    let edit = build_workspace_edit(uri, prepared.version, prepared.text_edits);
    let applied = match client
        .apply_edit(ApplyWorkspaceEditParams { label: Some("Prapti: insert text".into()), edit })
        .await
    {
        Ok(response) => {
            if !response.applied {
                let err = CoreError::TransientEditConflict(
                    response.failure_reason.unwrap_or_else(|| "client declined the edit".to_string()),
                );
                tracing::warn!("{err}");
            }
            response.applied
        }
        Err(err) => {
            let err = CoreError::TransientEditConflict(format!("applyEdit request failed: {err}"));
            tracing::warn!("{err}");
            false
        }
    };

    {
        let mut guard = inserter.lock().unwrap();
        guard.collapse(applied);
    }
    applied
}

/// Attempts to insert `text` at the tracked cursor. Returns `true` if the
/// insertion either succeeded or there was nothing to insert; `false` means
/// the caller should back off and retry with the same `text`.
pub async fn try_insert_text(inserter: &Mutex<TextInserter>, client: &ClientSocket, uri: &Url, text: &str) -> bool {
    let attempt = { inserter.lock().unwrap().begin_insert(text) };
    match attempt {
        InsertAttempt::Blocked => false,
        InsertAttempt::NoOp => true,
        InsertAttempt::Prepared(prepared) => apply_prepared_edit(inserter, client, uri, prepared).await,
    }
}

/// Attempts to remove the trailing cursor-glyph sequence once the stream
/// has ended. Same retry contract as `try_insert_text`.
pub async fn try_remove_cursor_sequence(inserter: &Mutex<TextInserter>, client: &ClientSocket, uri: &Url) -> bool {
    let attempt = { inserter.lock().unwrap().begin_remove_cursor_sequence() };
    match attempt {
        InsertAttempt::Blocked => false,
        InsertAttempt::NoOp => true,
        InsertAttempt::Prepared(prepared) => apply_prepared_edit(inserter, client, uri, prepared).await,
    }
}

/// Drains the fragment queue and drives insertion until end-of-stream, then
/// removes the trailing cursor glyph. Ported from `insert_queued_text`.
pub async fn run_insertion_loop(
    mut queue_rx: tokio::sync::mpsc::UnboundedReceiver<QueueItem>,
    inserter: Arc<Mutex<TextInserter>>,
    client: ClientSocket,
    uri: Url,
) {
    let mut pending = String::new();
    let mut repair_requested = true;
    let mut at_end = false;

    while !at_end || !pending.is_empty() {
        if !at_end {
            // Block for the next item only when we have nothing else to do;
            // otherwise drain whatever's already queued without waiting.
            let should_block = pending.is_empty() && !repair_requested;
            receive_into(&mut queue_rx, &mut pending, &mut repair_requested, &mut at_end, should_block).await;
        }

        if at_end && pending.is_empty() {
            break;
        }

        // The repair signal's only job is to wake the loop up promptly;
        // begin_insert() re-derives the glyph/eol state from cursor_states
        // on every attempt regardless of this flag.
        repair_requested = false;

        if try_insert_text(&inserter, &client, &uri, &pending).await {
            pending.clear();
        } else {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    while !try_remove_cursor_sequence(&inserter, &client, &uri).await {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Pulls one item into `pending`/`repair_requested`/`at_end`: blocks for the
/// next item if `should_block`, otherwise drains non-blockingly until the
/// queue is momentarily empty.
async fn receive_into(
    queue_rx: &mut tokio::sync::mpsc::UnboundedReceiver<QueueItem>,
    pending: &mut String,
    repair_requested: &mut bool,
    at_end: &mut bool,
    should_block: bool,
) {
    if should_block {
        match queue_rx.recv().await {
            Some(item) => apply_item(item, pending, repair_requested, at_end),
            None => *at_end = true,
        }
        return;
    }
    loop {
        match queue_rx.try_recv() {
            Ok(item) => {
                apply_item(item, pending, repair_requested, at_end);
                if *at_end {
                    return;
                }
            }
            Err(tokio::sync::mpsc::error::TryRecvError::Empty) => return,
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                *at_end = true;
                return;
            }
        }
    }
}

fn apply_item(item: QueueItem, pending: &mut String, repair_requested: &mut bool, at_end: &mut bool) {
    match item {
        QueueItem::EndOfStream => *at_end = true,
        QueueItem::RequestCursorRepair => *repair_requested = true,
        QueueItem::Text(s) => pending.push_str(&s),
    }
}
