//! Persistent key-value storage and the auth token lookup built on it.
//!
//! - Web: `localStorage`
//! - Desktop: one file per key in the platform config directory:
//!   - Linux: `~/.config/counselflow/`
//!   - macOS: `~/Library/Application Support/counselflow/`
//!   - Windows: `%APPDATA%\counselflow\`

/// Storage key holding the socket auth token.
pub const TOKEN_KEY: &str = "access_token";

/// Store a plain string. Returns `true` on success.
pub fn save_string(key: &str, value: &str) -> bool {
    save_raw(key, value)
}

/// Load a plain string stored with [`save_string`] (or by other code on the page).
pub fn load_string(key: &str) -> Option<String> {
    load_raw(key)
}

// =========================================
// Token providers
// =========================================

/// Source of the token appended to the socket URL.
///
/// Queried once per connection attempt, so a token written after startup is
/// picked up by the next reconnect.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Reads the token from persistent storage.
#[derive(Debug, Clone)]
pub struct StorageTokenProvider {
    key: String,
}

impl StorageTokenProvider {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl Default for StorageTokenProvider {
    fn default() -> Self {
        Self::new(TOKEN_KEY)
    }
}

impl TokenProvider for StorageTokenProvider {
    fn token(&self) -> Option<String> {
        non_empty(load_string(&self.key)?)
    }
}

/// A fixed token, for tests and the command-line client.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider(Option<String>);

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self(non_empty(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

fn non_empty(token: String) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =========================================
// Web (WASM) implementation
// =========================================

#[cfg(target_arch = "wasm32")]
fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok()?
}

#[cfg(target_arch = "wasm32")]
fn save_raw(key: &str, value: &str) -> bool {
    local_storage().is_some_and(|storage| storage.set_item(key, value).is_ok())
}

#[cfg(target_arch = "wasm32")]
fn load_raw(key: &str) -> Option<String> {
    local_storage()?.get_item(key).ok()?
}

// =========================================
// Desktop (native) implementation
// =========================================

#[cfg(not(target_arch = "wasm32"))]
fn config_dir() -> Option<std::path::PathBuf> {
    let app_dir = dirs::config_dir()?.join("counselflow");
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir).ok()?;
    }
    Some(app_dir)
}

/// File name for a key, with characters that are not valid in paths replaced.
#[cfg(not(target_arch = "wasm32"))]
fn file_name(key: &str) -> String {
    let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
    format!("{}.json", safe_key)
}

#[cfg(not(target_arch = "wasm32"))]
fn save_raw(key: &str, value: &str) -> bool {
    let Some(dir) = config_dir() else {
        return false;
    };
    std::fs::write(dir.join(file_name(key)), value).is_ok()
}

#[cfg(not(target_arch = "wasm32"))]
fn load_raw(key: &str) -> Option<String> {
    std::fs::read_to_string(config_dir()?.join(file_name(key))).ok()
}
