// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent event ingress.
//!
//! Lets an identity agent running out of process publish its
//! `DIDCommV2Message-*` events onto the relay's event bus.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::ApiError, models::AgentEvent, state::AppState};

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct PublishResponse {
    /// Number of subscribers the event was handed to.
    pub receivers: usize,
}

#[utoipa::path(
    post,
    path = "/v1/events",
    request_body = AgentEvent,
    tag = "Events",
    responses(
        (status = 202, description = "Event published", body = PublishResponse),
        (status = 503, description = "No event bridge is running")
    )
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Json(event): Json<AgentEvent>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let receivers = state
        .events
        .send(event)
        .map_err(|_| ApiError::unavailable("Event bridge is not running"))?;
    Ok((StatusCode::ACCEPTED, Json(PublishResponse { receivers })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForwardMessageQueued;

    fn event() -> AgentEvent {
        AgentEvent::ForwardMessageQueued(ForwardMessageQueued {
            id: Some("m1".into()),
            to: Some("did:peer:abc#k1".into()),
            raw: Some("{}".into()),
        })
    }

    #[tokio::test]
    async fn publishes_to_subscribers() {
        let state = AppState::default();
        let mut bus = state.events.subscribe();

        let (status, Json(body)) = publish_event(State(state), Json(event()))
            .await
            .expect("event is published");

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, PublishResponse { receivers: 1 });
        assert_eq!(bus.recv().await.unwrap(), event());
    }

    #[tokio::test]
    async fn fails_without_subscribers() {
        let err = publish_event(State(AppState::default()), Json(event()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
