//! Throwaway HTTP server for exercising the blocking clients.
//!
//! The server runs on its own tokio runtime so tests stay synchronous, the
//! same way the clients are used in production.

use axum::Router;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

pub struct MockServer {
    /// e.g. "http://127.0.0.1:12345"
    pub base_url: String,
    _runtime: Runtime,
}

impl MockServer {
    /// Binds `router` to a random local port. The server stops when the
    /// returned value is dropped.
    pub fn spawn(router: Router) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("Failed to build runtime");

        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().expect("Failed to get local address");

        runtime.spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("Mock server failed");
        });

        Self {
            base_url: format!("http://{}", addr),
            _runtime: runtime,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
