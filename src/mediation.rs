// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mediation grant policy.
//!
//! Whether a DID may open a relay channel is decided by the mediation
//! manager, outside the relay. The WebSocket adapter only asks.

use async_trait::async_trait;

use crate::models::ClientId;

#[derive(Debug, thiserror::Error)]
pub enum MediationError {
    #[error("Mediation lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait MediationPolicy: Send + Sync {
    async fn is_mediation_granted(&self, requester: &ClientId) -> Result<bool, MediationError>;
}

/// Grants mediation to every requester.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAllPolicy;

#[async_trait]
impl MediationPolicy for GrantAllPolicy {
    async fn is_mediation_granted(&self, _requester: &ClientId) -> Result<bool, MediationError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grant_all_grants() {
        let granted = GrantAllPolicy
            .is_mediation_granted(&ClientId::from("did:peer:abc"))
            .await
            .unwrap();
        assert!(granted);
    }
}
