use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use shardgate_core::{PreparedStatementRegistry, ShardgateError};
use shardgate_protocol::backend::write_sequence;
use shardgate_protocol::frontend::{decode_command, read_frame};
use shardgate_protocol::sequence::build_error_response;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dispatcher::{CommandDispatcher, Dispatch, Session, ER_PARSE_ERROR};
use crate::handshake;

pub async fn run(config: Config) -> anyhow::Result<()> {
    serve_metrics(&config.metrics.listen_addr).await?;

    let registry = Arc::new(PreparedStatementRegistry::new());
    let dispatcher = Arc::new(CommandDispatcher::new(
        registry.clone(),
        config.proxy.logic_schema.clone(),
    ));

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    info!(addr = %config.server.listen_addr, "accepting client connections");

    let next_connection_id = AtomicU32::new(1);
    let active = Arc::new(AtomicUsize::new(0));
    loop {
        let (mut stream, peer) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                return Ok(());
            }
        };
        if active.load(Ordering::Acquire) >= config.server.max_connections {
            warn!(%peer, "connection limit reached, refusing client");
            drop(stream);
            continue;
        }
        active.fetch_add(1, Ordering::AcqRel);

        let connection_id = next_connection_id.fetch_add(1, Ordering::Relaxed);
        let dispatcher = dispatcher.clone();
        let registry = registry.clone();
        let active = active.clone();
        let server_version = config.proxy.server_version.clone();
        tokio::spawn(async move {
            debug!(connection_id, %peer, "client connected");
            handle_client(&mut stream, connection_id, &dispatcher, &registry, &server_version)
                .await;
            active.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

async fn handle_client<S>(
    stream: &mut S,
    connection_id: u32,
    dispatcher: &CommandDispatcher,
    registry: &PreparedStatementRegistry,
    server_version: &str,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(err) = handshake::greet(stream, connection_id, server_version).await {
        warn!(connection_id, error = %err, "handshake failed");
        return;
    }

    let mut session = Session::new();
    match serve_commands(stream, dispatcher, &mut session).await {
        Ok(()) => debug!(connection_id, "client quit"),
        Err(err) if is_clean_disconnect(&err) => {
            debug!(connection_id, "client disconnected");
        }
        Err(err) => warn!(connection_id, error = %err, "connection closed on error"),
    }
    session.close(registry);
}

async fn serve_commands<S>(
    stream: &mut S,
    dispatcher: &CommandDispatcher,
    session: &mut Session,
) -> Result<(), ShardgateError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let (sequence_id, payload) = read_frame(stream).await?;
        let frame = match decode_command(sequence_id, &payload) {
            Ok(frame) => frame,
            Err(err) if err.connection_fatal() => return Err(err),
            Err(err) => {
                let response =
                    build_error_response(sequence_id, ER_PARSE_ERROR, "42000", err.to_string());
                write_sequence(stream, &response).await?;
                continue;
            }
        };
        match dispatcher.handle(session, &frame)? {
            Dispatch::Respond(response) => write_sequence(stream, &response).await?,
            Dispatch::None => {}
            Dispatch::Quit => return Ok(()),
        }
    }
}

/// A client that simply closes its socket surfaces as an unexpected EOF while
/// waiting for the next frame header. That is routine, not an error.
fn is_clean_disconnect(err: &ShardgateError) -> bool {
    matches!(
        err,
        ShardgateError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof
    )
}

async fn serve_metrics(listen_addr: &str) -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        )
        .route("/health", axum::routing::get(|| async { "ok" }))
        .route("/ready", axum::routing::get(|| async { "ok" }));
    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "metrics endpoint up");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "metrics endpoint failed");
        }
    });
    Ok(())
}
