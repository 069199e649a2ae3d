//! Real HTTP server for websocket tests.

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use poker_backend::middleware::request_trace::RequestTrace;
use poker_backend::middleware::structured_logger::StructuredLogger;
use poker_backend::routes;
use poker_backend::state::app_state::AppState;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub handle: ServerHandle,
    pub addr: SocketAddr,
    pub join: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn ws_url(&self, room_code: &str, token: &str) -> String {
        format!("ws://{}/ws/rooms/{room_code}?token={token}", self.addr)
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
        let _ = self.join.await;
    }
}

/// Serve the full route table on a random local port.
pub async fn start_test_server(state: AppState) -> Result<TestServer, Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(StructuredLogger)
            .wrap(RequestTrace)
            .configure(routes::configure)
    })
    .workers(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    let join = tokio::spawn(server);
    Ok(TestServer { handle, addr, join })
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    loop {
        if check().await {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err("condition not reached before timeout".into());
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
