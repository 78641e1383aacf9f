//! # Embedded HTTP server.
//!
//! A thin axum server bound to the supervised listener. It exists so the
//! listener has a live consumer across handoffs: `GET /hello` answers with the
//! serving process's pid, which is how a handoff is observed from outside
//! (the pid changes, the port does not).
//!
//! ## Stop semantics
//! [`EmbeddedServer::stop`] cancels the accept loop immediately (no new
//! connections), then gives in-flight requests up to the grace period to
//! finish. Exceeding the grace is an error, not a hang.

use std::io;
use std::net::TcpListener;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;

/// Answers with the serving process's identifier; proves which generation
/// accepted the connection.
async fn hello() -> String {
    format!("Hello from {}!\n", std::process::id())
}

/// The running accept/serve loop plus its stop handle.
pub(crate) struct EmbeddedServer {
    token: CancellationToken,
    task: JoinHandle<io::Result<()>>,
}

impl EmbeddedServer {
    /// Starts serving on a duplicate of the supervisor's listener.
    ///
    /// The supervisor keeps its own handle for the next handoff; the server
    /// gets a nonblocking clone registered with the tokio reactor.
    pub(crate) fn start(listener: &TcpListener) -> Result<Self, RuntimeError> {
        Self::start_with_app(listener, Router::new().route("/hello", get(hello)))
    }

    fn start_with_app(listener: &TcpListener, app: Router) -> Result<Self, RuntimeError> {
        let std_listener = listener.try_clone().map_err(RuntimeError::Serve)?;
        std_listener
            .set_nonblocking(true)
            .map_err(RuntimeError::Serve)?;
        let listener =
            tokio::net::TcpListener::from_std(std_listener).map_err(RuntimeError::Serve)?;

        let token = CancellationToken::new();
        let stop = token.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        });

        Ok(Self { token, task })
    }

    /// Stops accepting immediately and drains within `grace`.
    ///
    /// Returns [`RuntimeError::GraceExceeded`] if in-flight work outlives the
    /// grace period, or [`RuntimeError::Shutdown`] if the server itself errors.
    pub(crate) async fn stop(mut self, grace: Duration) -> Result<(), RuntimeError> {
        self.token.cancel();
        match tokio::time::timeout(grace, &mut self.task).await {
            Err(_) => {
                // The serve task must not outlive a failed drain; in-flight
                // connections are torn down, not detached.
                self.task.abort();
                Err(RuntimeError::GraceExceeded { grace })
            }
            Ok(Err(join)) => Err(RuntimeError::Shutdown(io::Error::other(join))),
            Ok(Ok(Err(serve))) => Err(RuntimeError::Shutdown(serve)),
            Ok(Ok(Ok(()))) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get_hello(addr: std::net::SocketAddr) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /hello HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn serves_pid_on_hello() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = EmbeddedServer::start(&listener).unwrap();

        let response = get_hello(addr).await;
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains(&format!("Hello from {}!", std::process::id())));

        server.stop(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_bounded_and_clean_when_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let server = EmbeddedServer::start(&listener).unwrap();
        server.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn grace_timeout_aborts_in_flight_work() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let server = EmbeddedServer::start_with_app(&listener, app).unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        // Let the request reach the handler before the drain starts.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = server.stop(Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, RuntimeError::GraceExceeded { .. }));

        // The aborted serve task tears the connection down instead of letting
        // the handler answer thirty seconds later.
        let mut rest = Vec::new();
        let read =
            tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut rest)).await;
        let read = read.expect("connection must close promptly after abort");
        if read.is_ok() {
            assert!(!String::from_utf8_lossy(&rest).contains("late"));
        }
    }
}
