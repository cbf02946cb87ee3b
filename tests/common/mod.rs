// Shared helpers for integration tests

use blazerpc::app::BlazeApp;
use blazerpc::client::BlazeClient;
use blazerpc::shutdown::ShutdownCoordinator;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on an ephemeral port for the duration of a test.
pub struct TestServer {
    pub addr: String,
    pub coordinator: ShutdownCoordinator,
    pub handle: JoinHandle<blazerpc::Result<()>>,
}

impl TestServer {
    /// Bind an ephemeral port and serve the app in the background.
    pub async fn spawn(app: BlazeApp) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let coordinator = ShutdownCoordinator::new();

        let handle = tokio::spawn(blazerpc::server::run_with_listener(
            app,
            listener,
            coordinator.clone(),
        ));

        // Give the transport a moment to start accepting.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            coordinator,
            handle,
        }
    }

    pub async fn client(&self) -> BlazeClient {
        BlazeClient::connect(self.addr.clone()).await.unwrap()
    }

    /// Trigger shutdown and wait for a clean exit.
    pub async fn shutdown(self) -> blazerpc::Result<()> {
        self.coordinator.shutdown();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not shut down in time")
            .expect("server task panicked")
    }
}
