use std::fmt::{Debug, Formatter};
use std::str::FromStr;

/// Bearer token used to authenticate against a protected tracking server.
#[derive(Clone)]
pub struct TrackingCredentials {
    token: String,
}

impl TrackingCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub(crate) fn bearer(&self) -> &str {
        &self.token
    }
}

impl Debug for TrackingCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl FromStr for TrackingCredentials {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err("Tracking token cannot be empty".to_string())
        } else {
            Ok(Self::new(s))
        }
    }
}
