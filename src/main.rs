mod change;
mod cursor;
mod eol;
mod error;
mod generator;
mod inserter;
mod position;
mod server;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::lsp_types::Position;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::server::LifecycleLayer;
use async_lsp::tracing::TracingLayer;
use async_lsp::MainLoop;
use clap::{Parser, Subcommand};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tower::ServiceBuilder;

use crate::position::PositionCodec;

#[derive(Parser)]
#[command(name = "prapti-ls")]
#[command(about = "Language server that streams generated text into a live document")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the language server over stdio
    Serve,
}

/// Position just past the last character of `source`, where a fresh run
/// starts inserting.
pub fn end_of_file_position(source: &str) -> Position {
    PositionCodec::position_from_offset(source, source.len())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .init();

            if let Err(e) = serve().await {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}

async fn serve() -> error::Result<()> {
    let (main_loop, _client_socket) = MainLoop::new_server(|client| {
        ServiceBuilder::new()
            .layer(TracingLayer::default())
            .layer(LifecycleLayer::default())
            .layer(CatchUnwindLayer::default())
            .layer(ConcurrencyLayer::default())
            .service(server::new_router(client))
    });

    let stdin = tokio::io::stdin().compat();
    let stdout = tokio::io::stdout().compat_write();
    main_loop
        .run_buffered(stdin, stdout)
        .await
        .map_err(|e| error::Error::Lsp(error::LspError::InvalidRequest(e.to_string())))
}
