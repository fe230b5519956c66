// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedletError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Failed to parse kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Chart rendering failed: {0}")]
    RenderError(String),

    #[error("Secret sync failed: {0}")]
    SecretSyncError(String),

    #[error("Precondition not met: {0}")]
    Precondition(String),

    #[error("{0}")]
    Downstream(String),

    #[error("Reconciliation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Reconciliation panicked: {0}")]
    Panicked(String),
}

impl SeedletError {
    /// True when the API server answered 404 for the request.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SeedletError::KubeError(kube::Error::Api(e)) if e.code == 404)
    }

    /// True when an optimistic-lock precondition failed (409).
    pub fn is_conflict(&self) -> bool {
        matches!(self, SeedletError::KubeError(kube::Error::Api(e)) if e.code == 409)
    }

    /// Business errors that only a new generation of the object can fix.
    /// They are surfaced on the object and not retried with backoff.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SeedletError::InvalidReference(_)
                | SeedletError::InvalidConfiguration(_)
                | SeedletError::RenderError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SeedletError>;
