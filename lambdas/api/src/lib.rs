//! HTTP surface of the clinic booking backend.

pub mod error;
pub mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use domain::{clinic::Clinic, Settings};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub fn router(clinic: Clinic, settings: &Settings) -> Router {
    Router::new()
        .route("/specialties", get(handlers::list_specialties))
        .route("/slots", get(handlers::list_slots))
        .route("/bookings", post(handlers::book_slot))
        .route("/bookings/specialties", get(handlers::list_booked_specialties))
        .route("/patients", get(handlers::list_patients))
        .route("/patients/:id_number", get(handlers::get_patient))
        .route("/patients/:id_number/notes", post(handlers::save_notes))
        .route(
            "/patients/:id_number/prescription",
            post(handlers::save_prescription),
        )
        .route("/patients/:id_number/checked", post(handlers::mark_checked))
        .route("/maintenance/slot-ids", post(handlers::assign_slot_ids))
        .layer(DefaultBodyLimit::max(settings.max_request_bytes))
        .layer(cors(&settings.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(clinic)
}

/// With no configured origins the request origin is mirrored back.
fn cors(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| tracing::warn!("Ignoring invalid CORS origin {:?}", origin))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
