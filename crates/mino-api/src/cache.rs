// Credential cache and short-lived response cache.
//
// `CredentialCache` keeps `{sid, device_id}` per account email in a JSON
// file so later runs can skip the password login. Entries never expire.
// `TtlCache` is the in-memory cache for account info and link resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Error;

pub const LOGIN_CACHE_FILE: &str = "login_cache.json";

/// Account info stays cached this long after login.
pub const ACCOUNT_TTL: Duration = Duration::from_secs(12 * 60 * 60);
/// Link resolutions stay cached this long.
pub const LINK_TTL: Duration = Duration::from_secs(6 * 60 * 60);

// ── CredentialCache ──────────────────────────────────────────────────

/// A cached login for one account.
#[derive(Debug, Clone)]
pub struct CachedLogin {
    pub sid: SecretString,
    pub device_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    sid: String,
    device: String,
}

/// File-backed `email -> (sid, device_id)` store.
///
/// Reads and writes go through one mutex so a read-modify-write of the
/// file is never interleaved within the process.
#[derive(Debug)]
pub struct CredentialCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Cache stored as `login_cache.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LOGIN_CACHE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_exists(&self, email: &str) -> bool {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        self.read_all().is_ok_and(|entries| entries.contains_key(email))
    }

    pub fn fetch_cache(&self, email: &str) -> Result<Option<CachedLogin>, Error> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self.read_all()?.remove(email).map(|entry| CachedLogin {
            sid: SecretString::from(entry.sid),
            device_id: entry.device,
        }))
    }

    /// Insert or replace the entry for `email`.
    pub fn cache_login(&self, email: &str, device: &str, sid: &SecretString) -> Result<(), Error> {
        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut entries = self.read_all()?;
        entries.insert(
            email.to_owned(),
            CacheEntry {
                sid: sid.expose_secret().to_owned(),
                device: device.to_owned(),
            },
        );
        self.write_all(&entries)?;
        debug!(email, path = %self.path.display(), "login cached");
        Ok(())
    }

    fn read_all(&self) -> Result<BTreeMap<String, CacheEntry>, Error> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.error(&e)),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_slice(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "login cache unreadable, starting empty");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, CacheEntry>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.error(&e))?;
        }
        let json = serde_json::to_vec_pretty(entries).map_err(|e| self.error(&e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.error(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.error(&e))
    }

    fn error(&self, err: &dyn std::error::Error) -> Error {
        Error::Cache {
            path: self.path.clone(),
            reason: err.to_string(),
        }
    }
}

// ── TtlCache ─────────────────────────────────────────────────────────

/// Concurrent map whose entries expire a fixed time after insertion.
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: DashMap<String, (Instant, V)>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            let (inserted, value) = entry.value();
            if inserted.elapsed() < self.ttl {
                return Some(value.clone());
            }
        }
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
