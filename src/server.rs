use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{AppEnv, Config};
use crate::crawler::crawl_new_posts;
use crate::db::SqliteStore;
use crate::directory::sync_writers;
use crate::fetch::HttpSource;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

/// JSON body of a failed run, shared by the HTTP trigger and `--json` CLI output.
#[derive(Debug, Serialize)]
pub(crate) struct Failure {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl Failure {
    fn response(status: StatusCode, error: String, details: Option<String>) -> Response {
        let body = Failure {
            success: false,
            error,
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure {
            success: false,
            error: format!("{:#}", err),
            details: Some(format!("{:?}", err)),
        }
    }
}

/// Cron callers must present `Bearer <CRON_SECRET>`; development runs skip the check.
pub fn authorize(headers: &HeaderMap, secret: Option<&str>, env: AppEnv) -> bool {
    if env == AppEnv::Development {
        return true;
    }
    let Some(secret) = secret else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .is_some_and(|token| token.as_bytes().ct_eq(secret.as_bytes()).into())
}

fn router(config: Config) -> Router {
    let state = AppState {
        config: Arc::new(config),
    };
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/scrape-newposts", get(scrape_newposts))
        .route("/api/scrape-writers", get(scrape_writers))
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<()> {
    if config.app_env == AppEnv::Production && config.cron_secret.is_none() {
        warn!("CRON_SECRET is not set; scrape endpoints will refuse every request");
    }

    let addr = config.listen_addr.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(config))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn unauthorized() -> Response {
    Failure::response(StatusCode::UNAUTHORIZED, "Unauthorized".into(), None)
}

fn internal(err: anyhow::Error) -> Response {
    error!("Scrape run failed: {:#}", err);
    let failure = Failure::from(err);
    Failure::response(StatusCode::INTERNAL_SERVER_ERROR, failure.error, failure.details)
}

async fn scrape_newposts(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cfg = &state.config;
    if !authorize(&headers, cfg.cron_secret.as_deref(), cfg.app_env) {
        return unauthorized();
    }

    let run = async {
        let store = SqliteStore::open(&cfg.db_path)?;
        let source = HttpSource::new()?;
        let summary = crawl_new_posts(&store, &source, &cfg.crawl).await?;
        anyhow::Ok(summary)
    };
    match run.await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal(e),
    }
}

async fn scrape_writers(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cfg = &state.config;
    if !authorize(&headers, cfg.cron_secret.as_deref(), cfg.app_env) {
        return unauthorized();
    }

    let run = async {
        let store = SqliteStore::open(&cfg.db_path)?;
        let source = HttpSource::new()?;
        let summary = sync_writers(&store, &source, &cfg.crawl).await?;
        anyhow::Ok(summary)
    };
    match run.await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => internal(e),
    }
}
