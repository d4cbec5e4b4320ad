use tower_lsp::{LspService, Server};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload};
use x4_lsp::Backend;

#[tokio::main]
async fn main() {
    // stdout carries the protocol, so logs go to stderr.
    let (level, log_level) = reload::Layer::new(LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(level)
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| Backend::new(client, log_level.clone()));
    Server::new(stdin, stdout, socket).serve(service).await;
}
