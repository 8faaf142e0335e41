//! Inbound HTTP plumbing: adapts forward-proxy requests to the cache engine
//! and streams stored files back in fixed-size chunks.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use pakio_engine::{CacheProxy, ProxyError, ServedFile};

/// Serve block size; bounds memory per in-flight response.
const CHUNK_SIZE: usize = 4096;

pub fn router(proxy: Arc<CacheProxy>) -> Router {
    Router::new()
        .fallback(serve_object)
        .with_state(proxy)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(listen: SocketAddr, proxy: Arc<CacheProxy>) -> io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "listening");
    axum::serve(listener, router(proxy))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install shutdown signal handler");
    }
}

/// Every request target is the absolute URL of the desired remote object
/// (forward-proxy style), so a single fallback route handles everything.
async fn serve_object(State(proxy): State<Arc<CacheProxy>>, req: Request) -> Response {
    let target = req.uri().to_string();
    match proxy.handle(&target).await {
        Ok(file) => match stream_file(&file).await {
            Ok(response) => response,
            Err(e) => {
                error!(path = %file.path.display(), error = %e, "failed to stream stored file");
                error_response(&ProxyError::IoError(e))
            }
        },
        Err(e) => error_response(&e),
    }
}

async fn stream_file(file: &ServedFile) -> io::Result<Response> {
    let reader = tokio::fs::File::open(&file.path).await?;
    let stream = ReaderStream::with_capacity(reader, CHUNK_SIZE);

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, file.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", file.file_name),
        );
    if let Some(content_type) = &file.content_type {
        response = response.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(encoding) = file.content_encoding {
        response = response.header(header::CONTENT_ENCODING, encoding);
    }

    response
        .body(Body::from_stream(stream))
        .map_err(io::Error::other)
}

fn error_response(error: &ProxyError) -> Response {
    match error {
        ProxyError::DirectoryListing(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Directory listing not supported.\n\
             This is pakio, use a proxy= line in dnf.conf to use it.\n",
        )
            .into_response(),
        ProxyError::PathTraversal(_) => {
            (StatusCode::FORBIDDEN, error.to_string()).into_response()
        }
        ProxyError::UrlError(_) => (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
        // The origin's verdict is passed through to the client.
        ProxyError::FetchFailed(status) => (*status, error.to_string()).into_response(),
        ProxyError::HttpError(_) => (StatusCode::BAD_GATEWAY, error.to_string()).into_response(),
        ProxyError::LockTimeout(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, error.to_string()).into_response()
        }
        ProxyError::IoError(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}
