//! User preferences read by the connection core.

use std::sync::RwLock;

/// Source of the locally configured display name.
pub trait Preferences: Send + Sync {
    fn user_name(&self) -> Option<String>;
}

/// Preferences held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    user_name: RwLock<Option<String>>,
}

impl InMemoryPreferences {
    pub fn new(user_name: Option<String>) -> Self {
        Self {
            user_name: RwLock::new(user_name),
        }
    }

    pub fn set_user_name(&self, user_name: Option<String>) {
        *self.user_name.write().unwrap_or_else(|e| e.into_inner()) = user_name;
    }
}

impl Preferences for InMemoryPreferences {
    fn user_name(&self) -> Option<String> {
        self.user_name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|name| !name.trim().is_empty())
    }
}
