//! Plain TCP listener kept for old clients that still dial the legacy port.
//!
//! Connections are accepted and dropped immediately; nothing is read or written.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bind the legacy listener. Separate from [`run`] so bind errors surface at startup.
pub async fn bind(host: &str, port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind((host, port)).await
}

/// Accept and drop connections until `token` is cancelled.
pub async fn run(listener: TcpListener, token: CancellationToken) {
    let addr = listener.local_addr().ok();
    info!(addr = ?addr, "legacy listener started");

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "legacy connection dropped");
                    drop(stream);
                }
                Err(e) => warn!(error = %e, "legacy accept failed"),
            },
        }
    }

    info!(addr = ?addr, "legacy listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn accepts_and_closes_connections() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(run(listener, token.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap();
        // EOF or reset: either way the server hung up without sending anything.
        assert!(matches!(read, Ok(0) | Err(_)));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stops_on_cancel_without_connections() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let token = CancellationToken::new();
        let task = tokio::spawn(run(listener, token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
