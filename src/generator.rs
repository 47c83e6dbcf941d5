//! A minimal concrete text generator used to exercise the driver.
//!
//! Designing an actual generation backend is out of scope here; this stub
//! plays back a fixed token stream with artificial delay, the way
//! `lean-tui` stubs out its RPC collaborators behind concrete types it owns
//! rather than a speculative trait boundary.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::inserter::QueueItem;

const DEMO_FRAGMENTS: &[&str] = &["Hello", ", ", "world", "!\n"];

/// Spawns a task that feeds `DEMO_FRAGMENTS` into `tx`, rewriting each
/// fragment's line endings with `rewrite_eol`, then pushes `EndOfStream`.
/// Stops early (still pushing `EndOfStream`) once `cancel` fires.
pub fn spawn_demo_generator(
    tx: UnboundedSender<QueueItem>,
    cancel: CancellationToken,
    rewrite_eol: fn(&str) -> String,
) {
    tokio::spawn(async move {
        for fragment in DEMO_FRAGMENTS {
            if cancel.is_cancelled() {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(50)) => {}
                () = cancel.cancelled() => break,
            }
            if tx.send(QueueItem::Text(rewrite_eol(fragment))).is_err() {
                let err = CoreError::GeneratorError(
                    "fragment queue closed before the stream ended".to_string(),
                );
                tracing::warn!("{err}");
                return;
            }
        }
        let _ = tx.send(QueueItem::EndOfStream);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_fragments_then_end_of_stream() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        spawn_demo_generator(tx, CancellationToken::new(), crate::eol::rewrite_to_lf);

        let mut texts = Vec::new();
        loop {
            match rx.recv().await.expect("channel closed before EndOfStream") {
                QueueItem::Text(s) => texts.push(s),
                QueueItem::EndOfStream => break,
                QueueItem::RequestCursorRepair => unreachable!(),
            }
        }
        assert_eq!(texts.join(""), "Hello, world!\n");
    }

    #[tokio::test]
    async fn cancellation_still_ends_the_stream() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        spawn_demo_generator(tx, cancel.clone(), crate::eol::rewrite_to_lf);
        cancel.cancel();

        let mut saw_end = false;
        while let Some(item) = rx.recv().await {
            if matches!(item, QueueItem::EndOfStream) {
                saw_end = true;
                break;
            }
        }
        assert!(saw_end);
    }
}
