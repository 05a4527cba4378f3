use std::io;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use crate::config::{ServerMode, ServiceConfig};
use crate::handlers;
use crate::state::AppState;

/// Register the routes for `mode`. Shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig, mode: ServerMode) {
    cfg.route("/health", web::get().to(handlers::health::handler))
        .route("/flows", web::get().to(handlers::list::handler));

    match mode {
        ServerMode::Flows => {
            cfg.route("/flows/{name}", web::post().to(handlers::invoke::handler));
        }
        ServerMode::Bare => {
            cfg.route("/{name}", web::post().to(handlers::invoke::handler));
        }
    }
}

pub async fn run_server(state: AppState, config: &ServiceConfig) -> io::Result<()> {
    let mode = state.mode;
    let state = web::Data::new(state);
    let address = config.bind_address();

    log::info!("Listening on {} ({} mode)", address, mode);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .configure(|cfg| configure(cfg, mode))
    })
    .bind(address)?
    .run()
    .await
}
