//! Mock upstream for exercising the blocking HTTP clients in tests.

use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer, Request};

/// A wiremock server driven from a synchronous test. The server answers on
/// its own thread, so blocking clients can call it from the test thread.
pub(crate) struct MockUpstream {
    // Dropped before the runtime that started it.
    server: MockServer,
    runtime: Runtime,
}

impl MockUpstream {
    pub fn start() -> anyhow::Result<Self> {
        let runtime = Runtime::new()?;
        let server = runtime.block_on(MockServer::start());
        Ok(Self { server, runtime })
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    pub fn received(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}
