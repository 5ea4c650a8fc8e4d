//! Persistent key-value store holding the signed-in credential.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::api::{Credential, CredentialProvider};

/// Name the bearer token is stored under unless configured otherwise.
pub const DEFAULT_TOKEN_KEY: &str = "authToken";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed named-value store
pub struct CredentialStore {
  conn: Mutex<Connection>,
}

impl CredentialStore {
  /// Open or create the store at the default location
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create credential directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open credential store at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory credential store: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default store path
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("nilbx").join("credentials.db"))
  }

  pub fn get(&self, name: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row("SELECT value FROM kv WHERE name = ?", params![name], |row| {
        row.get(0)
      })
      .optional()
      .map_err(|e| eyre!("Failed to read '{}': {}", name, e))
  }

  pub fn set(&self, name: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO kv (name, value, updated_at) VALUES (?, ?, datetime('now'))",
        params![name, value],
      )
      .map_err(|e| eyre!("Failed to store '{}': {}", name, e))?;
    Ok(())
  }

  /// Remove an entry. Returns whether anything was deleted.
  pub fn remove(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute("DELETE FROM kv WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to remove '{}': {}", name, e))?;
    Ok(deleted > 0)
  }

  /// Credential accessor reading `name` on every call.
  ///
  /// Read failures are logged and reported as "no credential".
  pub fn provider(self: Arc<Self>, name: &str) -> CredentialProvider {
    let name = name.to_string();
    Arc::new(move || match self.get(&name) {
      Ok(value) => value.as_deref().and_then(Credential::parse),
      Err(err) => {
        warn!(error = %err, "failed to read stored credential");
        None
      }
    })
  }
}

/// Credential accessor preferring an environment override over the store.
pub fn layered_provider(
  env_token: Option<String>,
  store: Option<Arc<CredentialStore>>,
  name: &str,
) -> CredentialProvider {
  let from_env = env_token.as_deref().and_then(Credential::parse);
  let from_store = store.map(|store| store.provider(name));
  Arc::new(move || {
    from_env
      .clone()
      .or_else(|| from_store.as_ref().and_then(|provider| provider()))
  })
}
