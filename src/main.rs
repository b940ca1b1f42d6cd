/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    Extension,
    Router,
    routing::{get, post},
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};

use registrar::config;
use registrar::inter::{self, api};

static DEFAULT_CONFIG: &str = "config.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("registrar")
        .build();
    TermLogger::init(
        registrar::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();
    let addr = glob.addr;

    let app = Router::new()
        .route("/", get(inter::server_running))
        .route("/api/register", post(api::register_students))
        .route("/api/commonstudents", get(api::common_students))
        .route("/api/suspend", post(api::suspend_student))
        .route("/api/unsuspend", post(api::unsuspend_student))
        .route(
            "/api/retrievefornotifications",
            post(api::retrieve_for_notifications)
        )
        .layer(Extension(Arc::new(glob)));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
