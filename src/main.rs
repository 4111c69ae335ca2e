mod config;
mod currency;
mod dialog;
mod engine;
mod error;
mod handlers;
mod leads;
mod prompts;
mod recorder;
mod session;
mod telephony;
mod twilio_types;
mod types;
mod utils;

use crate::config::Config;
use crate::engine::DialogEngine;
use crate::leads::{LeadGateway, MemoryLeadStore, PgLeadStore};
use crate::recorder::LeadRecorder;
use crate::session::SessionStore;
use crate::telephony::TwilioClient;
use crate::types::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const APP_BANNER: &str = "AI Real Estate Lead Matching System";
    pub const START_PATH: &str = "/call/start";
    pub const TURN_PATH: &str = "/call/turn";
    pub const STATUS_PATH: &str = "/call/status";
    pub const INITIATE_PATH: &str = "/call/initiate";
}

fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route(consts::START_PATH, post(handlers::call_start))
        .route(consts::TURN_PATH, post(handlers::call_turn))
        .route(consts::STATUS_PATH, post(handlers::call_status))
        .route(consts::INITIATE_PATH, post(handlers::call_initiate))
        .route("/", get(handlers::index))
        .with_state(app_state)
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("sqlx", tracing_subscriber::filter::LevelFilter::WARN),
            ("lead_intake", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {e}");
    }
    if let Err(e) = dotenvy::dotenv() {
        debug!(error=%e, "no .env file loaded");
    }

    if let Err(e) = run().await {
        error!(error=%e, "lead intake service stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), error::AppError> {
    let config = Config::from_env()?;

    let gateway: Arc<dyn LeadGateway> = match &config.database_url {
        Some(url) => Arc::new(PgLeadStore::connect(url).await?),
        None => {
            warn!("DATABASE_URL not set; leads are kept in memory only");
            Arc::new(MemoryLeadStore::new())
        }
    };

    let telephony = match &config.twilio {
        Some(twilio) => Some(TwilioClient::new(
            reqwest::Client::new(),
            twilio.account_sid.clone(),
            twilio.auth_token.clone(),
            twilio.phone_number.clone(),
        )),
        None => {
            warn!("Twilio credentials not set; outbound calls are disabled");
            None
        }
    };

    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let reaper = sessions.start_reaper(config.reaper_interval);
    let recorder = LeadRecorder::new(gateway, config.persistence_timeout);

    let app_state = Arc::new(AppState {
        engine: DialogEngine::new(sessions, recorder, config.max_retries),
        telephony,
        public_base_url: config.public_base_url.clone(),
    });

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|_| error::AppError::Config(format!("bad BIND_ADDR '{}'", config.bind_addr)))?;
    info!(%addr, max_retries = config.max_retries, ttl=?config.session_ttl, "listening");

    let served = axum::Server::try_bind(&addr)
        .map_err(|e| error::AppError::Server(e.to_string()))?
        .serve(router(app_state).into_make_service())
        .await;
    let _ = reaper.send(true);
    served.map_err(|e| error::AppError::Server(e.to_string()))
}
