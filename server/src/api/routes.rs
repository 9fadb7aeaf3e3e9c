//! Route-Definitionen der Control-Plane (/api/...)

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use oct_protocol::transport::WEBSOCKET_PFAD;
use tower_http::cors::{Any, CorsLayer};

use crate::api::{login, raum, ws, AppState};

/// Erstellt den vollstaendigen /api/-Router
pub fn api_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.netzwerk.cors_origins);
    let metriken = state.metriken.clone();

    Router::new()
        // Metadaten
        .route("/api/meta", get(login::meta))
        // Login
        .route("/api/login/initial", post(login::login_initial))
        .route(login::SIMPLE_LOGIN_PFAD, post(login::login_simple))
        .route("/api/login/poll/:token", post(login::login_poll))
        .route("/api/login/validate", post(login::login_validate))
        .route("/api/logout", post(login::logout))
        // Raeume
        .route("/api/session/create", post(raum::raum_erstellen))
        .route("/api/session/join/:room_id", post(raum::raum_beitreten))
        .route("/api/session/poll/:token", post(raum::beitritt_poll))
        // Peer-Verbindung
        .route(WEBSOCKET_PFAD, get(ws::ws_verbinden))
        .layer(axum::middleware::from_fn_with_state(
            metriken,
            oct_observability::timing_middleware,
        ))
        .layer(oct_observability::request_timing_layer())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let basis = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);
    if origins.is_empty() {
        return basis.allow_origin(Any);
    }
    let erlaubt: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(wert) => Some(wert),
            Err(_) => {
                tracing::warn!(origin = %o, "Ungueltiger CORS-Origin ignoriert");
                None
            }
        })
        .collect();
    basis.allow_origin(erlaubt)
}
