// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{AgentEvent, ForwardMessageQueued, MessageReceived, ReceivedMessage},
    relay::RelayStats,
    state::AppState,
};

pub mod events;
pub mod health;
pub mod relay_ws;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/events", post(events::publish_event))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/message-relay/{did}", get(relay_ws::message_relay_socket))
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        events::publish_event,
        relay_ws::message_relay_socket
    ),
    components(
        schemas(
            AgentEvent,
            ForwardMessageQueued,
            MessageReceived,
            ReceivedMessage,
            RelayStats,
            events::PublishResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Events", description = "Identity agent event ingress"),
        (name = "Relay", description = "Live message relay channel")
    )
)]
struct ApiDoc;
