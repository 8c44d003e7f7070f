use crate::app::{App, bare};
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{Request, StatusCode};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Binds `addr` and serves `app` until Ctrl-C. Request bodies over
/// `max_body_bytes` are answered with 413.
pub async fn run(app: Arc<App>, addr: &str, max_body_bytes: usize) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    tracing::info!("trellis listening on http://{}", listener.local_addr()?);

    serve(listener, app, max_body_bytes, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
        }
    })
    .await;
    tracing::info!("shutting down");
    Ok(())
}

/// Accepts connections on `listener` until `shutdown` resolves. Connections
/// already accepted finish on their own.
pub async fn serve(
    listener: TcpListener,
    app: Arc<App>,
    max_body_bytes: usize,
    shutdown: impl Future<Output = ()>,
) {
    tokio::pin!(shutdown);
    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("failed to accept connection: {e}");
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let app = app.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request: Request<hyper::body::Incoming>| {
                let app = app.clone();
                handle_request(app, request, peer, max_body_bytes)
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(socket), service)
                .await
            {
                tracing::debug!(%peer, "connection closed with error: {e}");
            }
        });
    }
}

async fn handle_request(
    app: Arc<App>,
    request: Request<hyper::body::Incoming>,
    peer: std::net::SocketAddr,
    max_body_bytes: usize,
) -> Result<hyper::Response<http_body_util::Full<Bytes>>, BoxError> {
    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(peer);
    let body = match Limited::new(body, max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            tracing::warn!(%peer, limit = max_body_bytes, "request body too large");
            return Ok(bare(StatusCode::PAYLOAD_TOO_LARGE, Bytes::new()));
        }
        Err(e) => return Err(e),
    };
    Ok(app.handle(Request::from_parts(parts, body)).await)
}
