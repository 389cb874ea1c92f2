//! Per-user interaction context

use serde::Serialize;
use uuid::Uuid;

use crate::data::{ChurnError, ChurnResult};
use crate::ml::{ModelKind, PredictionResult};

pub const LOGIN_REQUIRED: &str = "Please login to access this page";

/// Explicit session state handed to every orchestrator call
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub username: Option<String>,
    pub authenticated: bool,
    pub selected_model: ModelKind,
    pub last_prediction: Option<PredictionResult>,
}

impl Session {
    /// Unauthenticated session
    pub fn anonymous(selected_model: ModelKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: None,
            authenticated: false,
            selected_model,
            last_prediction: None,
        }
    }

    /// Session for a user the caller has already authenticated
    pub fn authenticated(username: impl Into<String>, selected_model: ModelKind) -> Self {
        let mut session = Self::anonymous(selected_model);
        session.login(username);
        session
    }

    pub fn login(&mut self, username: impl Into<String>) {
        self.username = Some(username.into());
        self.authenticated = true;
    }

    pub fn logout(&mut self) {
        self.username = None;
        self.authenticated = false;
        self.last_prediction = None;
    }

    pub fn select_model(&mut self, model: ModelKind) {
        self.selected_model = model;
    }

    /// Username of an authenticated session
    pub fn require_authenticated(&self) -> ChurnResult<&str> {
        match (&self.username, self.authenticated) {
            (Some(username), true) => Ok(username.as_str()),
            _ => Err(ChurnError::Unauthenticated(LOGIN_REQUIRED.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_session_is_refused() {
        let session = Session::anonymous(ModelKind::GradientBoosting);
        let err = session.require_authenticated().unwrap_err();
        assert!(err.to_string().contains(LOGIN_REQUIRED));
    }

    #[test]
    fn test_logout_clears_state() {
        let mut session = Session::authenticated("ada", ModelKind::RandomForest);
        assert_eq!(session.require_authenticated().unwrap(), "ada");
        session.last_prediction = Some(PredictionResult {
            label: "No".to_string(),
            probability: 71.0,
        });
        session.logout();
        assert!(session.require_authenticated().is_err());
        assert!(session.last_prediction.is_none());
        assert_eq!(session.selected_model, ModelKind::RandomForest);
    }
}
