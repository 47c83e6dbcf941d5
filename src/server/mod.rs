//! The LSP server surface: router wiring, document/run state, and the
//! `runPrapti`/`stopPrapti` command + code-action surface.
//!
//! `lean-tui` never implements a genuine LSP *server* — it proxies one — so
//! this module is grounded directly on `async_lsp`'s own `Router` API
//! (`Router::new`, `.request::<R, _>`, `.notification::<N>`), the pack's
//! only source for that shape. `main.rs` wraps the router returned by
//! [`new_router`] in the same `tower` layers (`TracingLayer`,
//! `LifecycleLayer`, `CatchUnwindLayer`, `ConcurrencyLayer`)
//! `lean-tui::lake_lsp_proxy::proxy::run` composes around its own service
//! stack.

pub mod documents;
pub mod run;

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex as SyncMutex};

use async_lsp::lsp_types::{
    notification::{
        DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, Initialized,
    },
    request::{CodeActionRequest, ExecuteCommand, Initialize},
    CodeAction, CodeActionKind, CodeActionOrCommand, CodeActionParams, CodeActionProviderCapability,
    Command, DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    ExecuteCommandOptions, ExecuteCommandParams, InitializeParams, InitializeResult,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
};
use async_lsp::router::Router;
use async_lsp::{ClientSocket, ResponseError};
use serde_json::Value;

use self::documents::DocumentStore;
use self::run::{Observer, ObserverRegistry, RunRegistry};
use crate::eol::{detect_eol_sequence, select_eol_rewriter};
use crate::generator::spawn_demo_generator;
use crate::inserter::{run_insertion_loop, TextInserter};

const RUN_COMMAND: &str = "runPrapti";
const STOP_COMMAND: &str = "stopPrapti";

#[derive(Clone)]
pub struct ServerState {
    client: ClientSocket,
    documents: Arc<SyncMutex<DocumentStore>>,
    observers: ObserverRegistry,
    runs: RunRegistry,
}

pub fn new_router(client: ClientSocket) -> Router<ServerState> {
    let state = ServerState {
        client,
        documents: Arc::new(SyncMutex::new(DocumentStore::default())),
        observers: ObserverRegistry::default(),
        runs: RunRegistry::default(),
    };

    let mut router = Router::new(state);
    router
        .request::<Initialize, _>(|_, _: InitializeParams| async move { Ok(initialize_result()) })
        .request::<ExecuteCommand, _>(|state, params| {
            let state = state.clone();
            execute_command(state, params)
        })
        .request::<CodeActionRequest, _>(|state, params| {
            let state = state.clone();
            async move { Ok(Some(code_actions(&state, params).await)) }
        })
        .notification::<Initialized>(|_, _| ControlFlow::Continue(()))
        .notification::<DidOpenTextDocument>(|state, params| {
            handle_did_open(state, params);
            ControlFlow::Continue(())
        })
        .notification::<DidChangeTextDocument>(|state, params| {
            handle_did_change(state, params);
            ControlFlow::Continue(())
        })
        .notification::<DidCloseTextDocument>(|state, params| {
            handle_did_close(state, params);
            ControlFlow::Continue(())
        });
    router
}

fn initialize_result() -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::INCREMENTAL)),
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: vec![RUN_COMMAND.to_string(), STOP_COMMAND.to_string()],
                work_done_progress_options: Default::default(),
            }),
            code_action_provider: Some(CodeActionProviderCapability::Simple(true)),
            ..ServerCapabilities::default()
        },
        server_info: Some(ServerInfo {
            name: "prapti-ls".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
    }
}

fn handle_did_open(state: &mut ServerState, params: DidOpenTextDocumentParams) {
    let doc = params.text_document;
    state.documents.lock().unwrap().open(doc.uri, doc.version, doc.text);
}

fn handle_did_close(state: &mut ServerState, params: DidCloseTextDocumentParams) {
    state.documents.lock().unwrap().close(&params.text_document.uri);
}

/// Must stay synchronous: `notify_document_content_change` is only sound to
/// call from a non-async context while a driver task may be mid-`applyEdit`.
fn handle_did_change(state: &mut ServerState, params: DidChangeTextDocumentParams) {
    let uri = params.text_document.uri;
    let to_version = params.text_document.version;

    let transaction = {
        let mut documents = state.documents.lock().unwrap();
        match documents.apply_change(&uri, to_version, &params.content_changes) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!("didChange for {uri} rejected: {err}");
                return;
            }
        }
    };

    let document_source = match state.documents.lock().unwrap().get(&uri) {
        Some(doc) => doc.source.clone(),
        None => return,
    };

    for observer in state.observers.for_document(&uri) {
        let needs_repair = observer
            .inserter
            .lock()
            .unwrap()
            .notify_document_content_change(&transaction, &document_source);
        if needs_repair {
            let _ = observer.queue_tx.send(crate::inserter::QueueItem::RequestCursorRepair);
        }
    }
}

async fn execute_command(state: ServerState, params: ExecuteCommandParams) -> Result<Option<Value>, ResponseError> {
    let uri = parse_document_uri(params.arguments.first())?;
    match params.command.as_str() {
        RUN_COMMAND => {
            tokio::spawn(start_run(state, uri));
            Ok(None)
        }
        STOP_COMMAND => {
            state.runs.stop(&uri).await;
            Ok(None)
        }
        other => Err(ResponseError::new(
            async_lsp::ErrorCode::METHOD_NOT_FOUND,
            format!("unknown command {other}"),
        )),
    }
}

fn parse_document_uri(arg: Option<&Value>) -> Result<Url, ResponseError> {
    let invalid = || ResponseError::new(async_lsp::ErrorCode::INVALID_PARAMS, "expected a document URI argument");
    let value = arg.ok_or_else(invalid)?;
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Object(map) => map.get("uri").and_then(Value::as_str).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    raw.parse().map_err(|_| invalid())
}

async fn code_actions(state: &ServerState, params: CodeActionParams) -> Vec<CodeActionOrCommand> {
    let uri = params.text_document.uri;
    let arg = Value::String(uri.to_string());
    let running = state.runs.is_running(&uri).await;

    let (title, command) = if running {
        ("Prapti: stop run", STOP_COMMAND)
    } else {
        ("Prapti: run", RUN_COMMAND)
    };

    vec![CodeActionOrCommand::CodeAction(CodeAction {
        title: title.to_string(),
        kind: Some(CodeActionKind::new("source.prapti")),
        command: Some(Command {
            title: title.to_string(),
            command: command.to_string(),
            arguments: Some(vec![arg]),
        }),
        ..CodeAction::default()
    })]
}

async fn start_run(state: ServerState, uri: Url) {
    let registered = state
        .runs
        .start(uri.clone(), |cancel| {
            let state = state.clone();
            let uri = uri.clone();
            tokio::spawn(run_insertion(state, uri, cancel))
        })
        .await;
    if !registered {
        tracing::info!("runPrapti requested for {uri} while a run is already active");
    }
}

async fn run_insertion(state: ServerState, uri: Url, cancel: tokio_util::sync::CancellationToken) {
    let Some((source, version)) = state
        .documents
        .lock()
        .unwrap()
        .get(&uri)
        .map(|doc| (doc.source.clone(), doc.version))
    else {
        tracing::warn!("runPrapti requested for unknown document {uri}");
        return;
    };

    let insertion_pos = crate::end_of_file_position(&source);
    let eol_sequence = detect_eol_sequence(&source);
    let rewrite_eol = select_eol_rewriter(&eol_sequence);

    let inserter = Arc::new(SyncMutex::new(TextInserter::new(insertion_pos, version, eol_sequence)));
    let (queue_tx, queue_rx) = tokio::sync::mpsc::unbounded_channel();
    state.observers.register(
        uri.clone(),
        Observer { inserter: inserter.clone(), queue_tx: queue_tx.clone() },
    );

    spawn_demo_generator(queue_tx, cancel, rewrite_eol);
    run_insertion_loop(queue_rx, inserter.clone(), state.client.clone(), uri.clone()).await;

    state.observers.unregister(&uri, &inserter);
}
