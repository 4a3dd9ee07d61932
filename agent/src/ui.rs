//! Minimal settings-UI listener: a loopback-only JSON API for inspecting and hot-swapping the
//! classifier without restarting the agent.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::classifier::{parse_restricted_domains, Classifier, ClassifierSnapshot};

#[derive(Clone)]
struct UiState {
    classifier: Classifier,
    restricted_domains_path: Option<Utf8PathBuf>,
    extra_globs: Arc<Vec<String>>,
}

#[derive(Serialize)]
struct StatusResponse {
    tunnel_all: bool,
}

#[derive(Deserialize)]
struct TunnelAllRequest {
    tunnel_all: bool,
}

pub async fn serve(bind_addr: SocketAddr, classifier: Classifier, restricted_domains_path: Option<Utf8PathBuf>, extra_globs: Vec<String>) -> anyhow::Result<()> {
    let state = UiState {
        classifier,
        restricted_domains_path,
        extra_globs: Arc::new(extra_globs),
    };

    let app = Router::new()
        .route("/status", get(status))
        .route("/reload", post(reload))
        .route("/tunnel-all", post(set_tunnel_all))
        .with_state(state);

    info!(%bind_addr, "Settings UI listening");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn status(State(state): State<UiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        tunnel_all: state.classifier.snapshot().tunnel_all(),
    })
}

/// Re-reads the restricted-domains file from disk and swaps it in atomically.
async fn reload(State(state): State<UiState>) -> Response {
    let tunnel_all = state.classifier.snapshot().tunnel_all();

    let domains = match &state.restricted_domains_path {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(text) => parse_restricted_domains(&text),
            Err(error) => {
                warn!(%error, %path, "Couldn't reload restricted domains file");
                return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response();
            }
        },
        None => Default::default(),
    };

    let globs = match state.extra_globs.iter().map(|pattern| glob::Pattern::new(pattern)).collect::<Result<Vec<_>, _>>() {
        Ok(globs) => globs,
        Err(error) => {
            warn!(%error, "Couldn't reload glob patterns");
            return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response();
        }
    };

    state.classifier.replace(ClassifierSnapshot::new(tunnel_all, domains, globs));
    info!("Classifier reloaded from disk");

    axum::http::StatusCode::NO_CONTENT.into_response()
}

async fn set_tunnel_all(State(state): State<UiState>, Json(request): Json<TunnelAllRequest>) -> Response {
    let snapshot = state.classifier.snapshot();
    state.classifier.replace(ClassifierSnapshot::new(
        request.tunnel_all,
        snapshot.restricted_domains().clone(),
        snapshot.globs().to_vec(),
    ));
    axum::http::StatusCode::NO_CONTENT.into_response()
}
