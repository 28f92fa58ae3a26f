//! Session store
//!
//! Holds the authenticated identity and its opaque credential. Pure state
//! holder: login and logout transitions, nothing else. Authentication
//! flows (forms, token refresh) live in the embedding application.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::types::User;

/// An authenticated identity plus the credential that proves it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Who is logged in
    pub user: User,
    /// Opaque credential, forwarded to the transport at connect time
    pub credential: String,
}

/// Shared holder for the current session
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<Option<Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session, replacing any existing one
    pub fn login(&self, user: User, credential: impl Into<String>) {
        tracing::info!(user_id = %user.id, role = %user.role, "Session established");
        let mut inner = self.inner.lock().unwrap();
        *inner = Some(Session {
            user,
            credential: credential.into(),
        });
    }

    /// Clear the session
    pub fn logout(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.take() {
            tracing::info!(user_id = %session.user.id, "Session cleared");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    /// The current session, if any
    pub fn current(&self) -> Option<Session> {
        self.inner.lock().unwrap().clone()
    }

    /// The authenticated user, if any
    pub fn user(&self) -> Option<User> {
        self.inner.lock().unwrap().as_ref().map(|s| s.user.clone())
    }

    /// The opaque credential, if authenticated
    pub fn credential(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.credential.clone())
    }
}
