//! Localhost HTTP server for tests that drive the real reqwest clients.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;

use axum::Router;

/// Serve `router` on an ephemeral port. The server gets its own thread and
/// runtime, so blocking clients can call it from plain `#[test]`s.
pub fn spawn(router: Router) -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("test runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind test server");
            tx.send(listener.local_addr().expect("local addr"))
                .expect("send test server address");
            axum::serve(listener, router).await.expect("test server");
        });
    });
    rx.recv().expect("test server address")
}
