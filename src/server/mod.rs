pub mod session;
pub mod websocket;

use session::SessionFactory;
use std::error::Error;
use std::sync::Arc;

pub use session::EditorSession;

pub struct Server {
    addr: String,
    factory: Arc<SessionFactory>,
    api_key: Option<String>,
    max_connections_per_second: u32,
}

impl Server {
    pub fn new(
        addr: String,
        factory: SessionFactory,
        api_key: Option<String>,
        max_connections_per_second: u32
    ) -> Self {
        Self {
            addr,
            factory: Arc::new(factory),
            api_key,
            max_connections_per_second,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            self.factory.clone(),
            self.api_key.clone(),
            self.max_connections_per_second
        ).await
    }
}
