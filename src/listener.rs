//! Accept loop

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::server::ServerHandle;

/// Accept connections forever, one handler task each
///
/// Accept failures are logged and skipped; a failing connection never
/// affects the others or the actors.
pub async fn serve(listener: TcpListener, server: ServerHandle, config: Arc<Config>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Accepted {}", addr);
                let server = server.clone();
                let config = Arc::clone(&config);

                tokio::spawn(async move {
                    match handle_connection(stream, server, config).await {
                        Ok(()) | Err(AppError::ConnectionClosed) => {}
                        Err(e) => error!("Connection handler error: {}", e),
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
