//! Network service related (listener creation, accept loop)

use super::app_state::AppState;
use super::handler::handle_request;
use super::observability::metrics::ConnectionGuard;
use super::hyper::server::conn::http1;
use super::hyper::service::service_fn;
use super::tokio::net::TcpListener;
use super::{Arc, hyper_util::rt::TokioIo, tokio};
use socket2::{Domain, Socket, Type};
use std::error::Error;
use std::future::Future;
use std::net::{SocketAddr, TcpListener as StdTcpListener};

/// Create TCP listener with address (and, on unix, port) reuse
pub fn create_listener(addr: SocketAddr) -> Result<TcpListener, Box<dyn Error + Send + Sync>> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
        .map_err(|e| format!("Failed to create socket: {}", e))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| format!("Failed to set SO_REUSEADDR: {}", e))?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(|e| format!("Failed to set SO_REUSEPORT: {}", e))?;

    socket
        .bind(&addr.into())
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;
    socket
        .listen(1024)
        .map_err(|e| format!("Failed to listen on socket: {}", e))?;

    // Convert to tokio's non-blocking TcpListener
    let std_listener = StdTcpListener::from(socket);
    std_listener
        .set_nonblocking(true)
        .map_err(|e| format!("Failed to set non-blocking mode: {}", e))?;
    let tokio_listener = TcpListener::from_std(std_listener)
        .map_err(|e| format!("Failed to convert to tokio listener: {}", e))?;

    Ok(tokio_listener)
}

/// Accept connections until `shutdown` resolves; each connection gets its own task
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), Box<dyn Error + Send + Sync>>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // Transient (e.g. EMFILE); keep serving
                    tracing::warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, no longer accepting connections");
                return Ok(());
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let io = TokioIo::new(stream);
        let state_clone = Arc::clone(&state);

        // Handle connection asynchronously
        tokio::task::spawn(async move {
            let _open = ConnectionGuard::open();
            let service = service_fn(move |req| handle_request(req, Arc::clone(&state_clone)));

            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(peer = %peer, error = %err, "Connection handling error");
            }
        });
    }
}
