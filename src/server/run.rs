//! Process-wide run registry: at most one active run per document URI,
//! matching `PraptiLanguageServer._active_prapti_runs` in
//! `original_source/prapti/language_server/__init__.py`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as SyncMutex};

use async_lsp::lsp_types::Url;
use tokio::sync::{mpsc::UnboundedSender, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::inserter::{QueueItem, TextInserter};

struct RunHandle {
    cancel: CancellationToken,
}

#[derive(Clone, Default)]
pub struct RunRegistry(Arc<AsyncMutex<HashMap<Url, RunHandle>>>);

impl RunRegistry {
    /// Registers a run for `uri` and spawns it via `spawn`, unless one is
    /// already running. Returns whether registration succeeded.
    pub async fn start(&self, uri: Url, spawn: impl FnOnce(CancellationToken) -> JoinHandle<()>) -> bool {
        let mut guard = self.0.lock().await;
        if guard.contains_key(&uri) {
            return false;
        }
        let cancel = CancellationToken::new();
        let handle = spawn(cancel.clone());
        guard.insert(uri.clone(), RunHandle { cancel });
        drop(guard);

        let registry = self.clone();
        tokio::spawn(async move {
            let _ = handle.await;
            registry.0.lock().await.remove(&uri);
        });
        true
    }

    /// Cancels the run on `uri`, if any. The run's own task removes itself
    /// from the registry once it observes the cancellation.
    pub async fn stop(&self, uri: &Url) -> bool {
        match self.0.lock().await.get(uri) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self, uri: &Url) -> bool {
        self.0.lock().await.contains_key(uri)
    }
}

/// One run's `TextInserter` plus the sender half of its fragment queue, so
/// the `didChange` handler can both fold a transaction through the cursor
/// and, if that fold asks for a repair, nudge the driver loop awake.
#[derive(Clone)]
pub struct Observer {
    pub inserter: Arc<SyncMutex<TextInserter>>,
    pub queue_tx: UnboundedSender<QueueItem>,
}

/// Registry of in-flight runs per document. Mirrors
/// `ObservableLanguageServerProtocol`'s `_observers` map in
/// `observable_lsp.py`.
#[derive(Clone, Default)]
pub struct ObserverRegistry(Arc<SyncMutex<HashMap<Url, Vec<Observer>>>>);

impl ObserverRegistry {
    pub fn register(&self, uri: Url, observer: Observer) {
        self.0.lock().unwrap().entry(uri).or_default().push(observer);
    }

    pub fn unregister(&self, uri: &Url, inserter: &Arc<SyncMutex<TextInserter>>) {
        if let Some(list) = self.0.lock().unwrap().get_mut(uri) {
            list.retain(|o| !Arc::ptr_eq(&o.inserter, inserter));
        }
    }

    pub fn for_document(&self, uri: &Url) -> Vec<Observer> {
        self.0.lock().unwrap().get(uri).cloned().unwrap_or_default()
    }
}
