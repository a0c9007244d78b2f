//! Token directory: which user a handshake token belongs to.

use std::collections::HashMap;
use std::path::Path;

use cardwatch_common::ConfigError;
use serde::{Deserialize, Serialize};

/// A user as the relay announces it to other clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl DirectoryUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            email: String::new(),
            role: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Maps tokens to users.
///
/// In open mode any non-empty token is accepted and used as the user id,
/// which is convenient for local development.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: HashMap<String, DirectoryUser>,
    open: bool,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        Self {
            users: HashMap::new(),
            open: true,
        }
    }

    pub fn with_user(mut self, token: impl Into<String>, user: DirectoryUser) -> Self {
        self.insert(token, user);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, user: DirectoryUser) {
        self.users.insert(token.into(), user);
    }

    /// Parse `{ "<token>": { "id": ..., "name": ... }, ... }`.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let users: HashMap<String, DirectoryUser> =
            serde_json::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(Self { users, open: false })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn resolve(&self, token: &str) -> Option<DirectoryUser> {
        if token.is_empty() {
            return None;
        }
        match self.users.get(token) {
            Some(user) => Some(user.clone()),
            None if self.open => Some(DirectoryUser::new(token)),
            None => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
