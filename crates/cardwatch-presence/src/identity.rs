use serde::{Deserialize, Serialize};

/// The signed-in dashboard user, as returned by the auth backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(alias = "id", alias = "_id", alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

/// Token plus whatever we know about the user it belongs to.
///
/// The presence layer never issues or refreshes tokens; it only observes
/// whether a session is present.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub token: String,
    pub user: Option<Identity>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .finish()
    }
}

impl AuthSession {
    pub fn new(token: impl Into<String>, user: Option<Identity>) -> Self {
        Self {
            token: token.into(),
            user,
        }
    }

    /// Session for a bare token; the user id is learned from the handshake.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self::new(token, None)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user
            .as_ref()
            .map(|u| u.user_id.as_str())
            .filter(|id| !id.is_empty())
    }
}
