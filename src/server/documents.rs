//! The server's authoritative view of each open document: exact source text
//! plus the version it's at. Generalizes `lean-tui`'s
//! `DocumentCache { documents: RwLock<HashMap<String, String>> }`, which
//! tracked text only — we additionally need the version so
//! `ChangeNormalizer` can validate monotonicity and the driver can stamp
//! `workspace/applyEdit` requests correctly.

use std::collections::HashMap;

use async_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use crate::change::{ChangeEvent, ChangeNormalizer, ChangeTransaction};
use crate::error::CoreError;

pub struct ServerDocument {
    pub version: i32,
    pub source: String,
}

#[derive(Default)]
pub struct DocumentStore {
    documents: HashMap<Url, ServerDocument>,
}

impl DocumentStore {
    pub fn open(&mut self, uri: Url, version: i32, text: String) {
        self.documents.insert(uri, ServerDocument { version, source: text });
    }

    pub fn close(&mut self, uri: &Url) {
        self.documents.remove(uri);
    }

    pub fn get(&self, uri: &Url) -> Option<&ServerDocument> {
        self.documents.get(uri)
    }

    /// Normalizes a `didChange` notification's raw events against the
    /// stored document, applying them in place and bumping its version.
    pub fn apply_change(
        &mut self,
        uri: &Url,
        to_version: i32,
        raw_events: &[TextDocumentContentChangeEvent],
    ) -> Result<ChangeTransaction, CoreError> {
        let doc = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| CoreError::ProtocolViolation(format!("didChange for unknown document {uri}")))?;

        if to_version <= doc.version {
            return Err(CoreError::ProtocolViolation(format!(
                "non-monotonic version for {uri}: {} -> {to_version}",
                doc.version
            )));
        }

        let events: Vec<ChangeEvent> = raw_events
            .iter()
            .map(|e| match e.range {
                Some(range) => ChangeEvent::Ranged { range, text: e.text.clone() },
                None => ChangeEvent::Full { text: e.text.clone() },
            })
            .collect();

        // Normalize against a scratch copy so a malformed event partway
        // through the batch can't leave `doc.source` half-mutated: either
        // every event validates and we commit, or none of them do.
        let from_version = doc.version;
        let mut scratch = doc.source.clone();
        let transaction = ChangeNormalizer::normalize(&mut scratch, from_version, to_version, &events)?;
        doc.source = scratch;
        doc.version = to_version;
        Ok(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri() -> Url {
        "file:///doc.txt".parse().unwrap()
    }

    #[test]
    fn apply_change_rejects_unknown_document() {
        let mut store = DocumentStore::default();
        let err = store.apply_change(&uri(), 2, &[]).unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));
    }

    #[test]
    fn apply_change_rejects_non_monotonic_version() {
        let mut store = DocumentStore::default();
        store.open(uri(), 5, "hi".into());
        let err = store.apply_change(&uri(), 5, &[]).unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));
    }

    #[test]
    fn apply_change_updates_source_and_version() {
        let mut store = DocumentStore::default();
        store.open(uri(), 1, "hi".into());
        let event = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: "hello".into(),
        };
        store.apply_change(&uri(), 2, std::slice::from_ref(&event)).unwrap();
        let doc = store.get(&uri()).unwrap();
        assert_eq!(doc.source, "hello");
        assert_eq!(doc.version, 2);
    }

    #[test]
    fn apply_change_leaves_document_untouched_when_a_later_event_is_malformed() {
        use async_lsp::lsp_types::{Position, Range};

        let mut store = DocumentStore::default();
        store.open(uri(), 1, "hi".into());
        let events = [
            TextDocumentContentChangeEvent {
                range: Some(Range { start: Position { line: 0, character: 0 }, end: Position { line: 0, character: 0 } }),
                range_length: None,
                text: "well ".into(),
            },
            TextDocumentContentChangeEvent {
                range: Some(Range { start: Position { line: 0, character: 0 }, end: Position { line: 5, character: 0 } }),
                range_length: None,
                text: "bogus".into(),
            },
        ];
        let err = store.apply_change(&uri(), 2, &events).unwrap_err();
        assert!(matches!(err, CoreError::ProtocolViolation(_)));

        let doc = store.get(&uri()).unwrap();
        assert_eq!(doc.source, "hi");
        assert_eq!(doc.version, 1);
    }
}
