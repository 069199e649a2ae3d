use actix_web::{web, App, HttpServer};
use poker_backend::config::app::AppConfig;
use poker_backend::infra::state::StateBuilder;
use poker_backend::middleware::cors::cors_middleware;
use poker_backend::middleware::request_trace::RequestTrace;
use poker_backend::middleware::structured_logger::StructuredLogger;
use poker_backend::routes;
use tracing::{error, info};

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment
    // (docker env_file, or `set -a; . ./.env; set +a` locally).
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    info!(
        host = %config.host,
        port = config.port,
        db = %config.db.kind,
        tracker = config.tracker.is_some(),
        "starting planning poker backend"
    );

    let app_state = match StateBuilder::from_config(&config) {
        Ok(builder) => builder.build().await,
        Err(e) => Err(e),
    };
    let app_state = match app_state {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to build application state");
            std::process::exit(1);
        }
    };

    info!("store ready");

    let data = web::Data::new(app_state);

    HttpServer::new(move || {
        App::new()
            .wrap(cors_middleware())
            .wrap(StructuredLogger)
            .wrap(RequestTrace)
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
