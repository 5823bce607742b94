//! Device identity and request signing.
//!
//! A device id is `prefix ++ SHA1(random) ++ HMAC(device_key, prefix ++ SHA1(random))`,
//! hex-encoded and uppercased. A request signature is
//! `base64(prefix ++ HMAC(signature_key, body))`. Both MACs are HMAC-SHA1.
//!
//! Key material is resolved in order: explicit configuration, the
//! process-wide override cache (optionally backed by a JSON file), then
//! built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::Error;

type HmacSha1 = Hmac<Sha1>;

pub const DEFAULT_PREFIX: u8 = 0x19;
pub const DEFAULT_DEVICE_KEY: &str = "E7309ECC0953C6FA60005B2765F99DBBC965C8E9";
pub const DEFAULT_SIGNATURE_KEY: &str = "DFA5ED192DDA6E88A12FE12130DC6206B1251E44";

const BLOB_LEN: usize = 20;
const MAC_LEN: usize = 20;
const DEVICE_ID_BYTES: usize = 1 + BLOB_LEN + MAC_LEN;

// ── KeyMaterial ──────────────────────────────────────────────────────

/// Identity keys as configured. Every field is optional so that layers
/// (configuration, override cache, defaults) can be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial {
    #[serde(default)]
    pub prefix: Option<u8>,
    #[serde(default)]
    pub device_key: Option<String>,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub service_key: Option<String>,
}

impl KeyMaterial {
    /// The keys the service shipped with at the time of writing.
    pub fn builtin() -> Self {
        Self {
            prefix: Some(DEFAULT_PREFIX),
            device_key: Some(DEFAULT_DEVICE_KEY.into()),
            signature_key: Some(DEFAULT_SIGNATURE_KEY.into()),
            service_key: None,
        }
    }

    /// Fill any unset field from `fallback`.
    pub fn or(self, fallback: &KeyMaterial) -> Self {
        Self {
            prefix: self.prefix.or(fallback.prefix),
            device_key: self.device_key.or_else(|| fallback.device_key.clone()),
            signature_key: self.signature_key.or_else(|| fallback.signature_key.clone()),
            service_key: self.service_key.or_else(|| fallback.service_key.clone()),
        }
    }

    /// Parse a prefix given as a hex string ("19") as the mobile clients do.
    pub fn parse_prefix(raw: &str) -> Result<u8, Error> {
        let trimmed = raw.trim().trim_start_matches("0x");
        u8::from_str_radix(trimmed, 16).map_err(|e| Error::InvalidIdentityKey {
            key: "prefix",
            reason: e.to_string(),
        })
    }
}

// ── Override cache ───────────────────────────────────────────────────

static OVERRIDES: LazyLock<RwLock<Option<KeyMaterial>>> = LazyLock::new(|| RwLock::new(None));

/// Remember keys for the rest of the process and, when `path` is given,
/// persist them so the next run starts with them.
pub fn install_overrides(keys: &KeyMaterial, path: Option<&Path>) -> Result<(), Error> {
    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| cache_error(path, &e))?;
        }
        let json = serde_json::to_vec_pretty(keys).map_err(|e| cache_error(path, &e))?;
        std::fs::write(path, json).map_err(|e| cache_error(path, &e))?;
    }

    let mut guard = OVERRIDES.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = Some(keys.clone());
    debug!(persisted = path.is_some(), "identity key overrides installed");
    Ok(())
}

/// Drop the in-process overrides. The on-disk file is left alone.
pub fn clear_overrides() {
    let mut guard = OVERRIDES.write().unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = None;
}

fn current_overrides(path: Option<&Path>) -> Result<KeyMaterial, Error> {
    let in_process = OVERRIDES
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    if let Some(keys) = in_process {
        return Ok(keys);
    }

    let Some(path) = path else {
        return Ok(KeyMaterial::default());
    };
    if !path.exists() {
        return Ok(KeyMaterial::default());
    }
    let raw = std::fs::read(path).map_err(|e| cache_error(path, &e))?;
    serde_json::from_slice(&raw).map_err(|e| cache_error(path, &e))
}

fn cache_error(path: &Path, err: &dyn std::error::Error) -> Error {
    Error::Cache {
        path: PathBuf::from(path),
        reason: err.to_string(),
    }
}

// ── Generator ────────────────────────────────────────────────────────

/// Produces device ids and request signatures from validated keys.
///
/// Keys are decoded once; each MAC starts from a pre-keyed state.
#[derive(Clone)]
pub struct Generator {
    prefix: u8,
    device_mac: HmacSha1,
    signature_mac: HmacSha1,
    service_key: Option<Vec<u8>>,
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("prefix", &format_args!("{:#04x}", self.prefix))
            .field("service_key", &self.service_key.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl Generator {
    /// Build from fully specified key material. Fails if the device or
    /// signature key is absent or not valid hex.
    pub fn from_material(keys: &KeyMaterial) -> Result<Self, Error> {
        let prefix = keys.prefix.ok_or(Error::MissingIdentityKey { key: "prefix" })?;
        let device_key = decode_key("device_key", keys.device_key.as_deref())?;
        let signature_key = decode_key("signature_key", keys.signature_key.as_deref())?;
        let service_key = keys
            .service_key
            .as_deref()
            .map(|raw| decode_key("service_key", Some(raw)))
            .transpose()?;

        Ok(Self {
            prefix,
            device_mac: keyed("device_key", &device_key)?,
            signature_mac: keyed("signature_key", &signature_key)?,
            service_key,
        })
    }

    /// Resolve keys from configuration, the override cache at
    /// `cache_path`, and the built-in defaults, in that order.
    pub fn resolve(configured: &KeyMaterial, cache_path: Option<&Path>) -> Result<Self, Error> {
        let cached = current_overrides(cache_path)?;
        let merged = configured.clone().or(&cached).or(&KeyMaterial::builtin());
        Self::from_material(&merged)
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn service_key(&self) -> Option<&[u8]> {
        self.service_key.as_deref()
    }

    /// A fresh device id backed by OS randomness.
    pub fn device_id(&self) -> String {
        let mut seed = [0u8; BLOB_LEN];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        let blob: [u8; BLOB_LEN] = Sha1::digest(seed).into();
        self.device_id_from_blob(&blob)
    }

    /// A device id derived from `seed`. Same seed, same id.
    pub fn device_id_from_seed(&self, seed: &str) -> String {
        let blob: [u8; BLOB_LEN] = Sha1::digest(seed.as_bytes()).into();
        self.device_id_from_blob(&blob)
    }

    /// Re-sign the random blob of `old` with the current prefix and key.
    pub fn update_device(&self, old: &str) -> Result<String, Error> {
        let raw = hex::decode(old.trim()).map_err(|e| Error::InvalidDeviceId(e.to_string()))?;
        if raw.len() != DEVICE_ID_BYTES {
            return Err(Error::InvalidDeviceId(format!(
                "expected {DEVICE_ID_BYTES} bytes, got {}",
                raw.len()
            )));
        }
        let blob = raw
            .get(1..=BLOB_LEN)
            .ok_or_else(|| Error::InvalidDeviceId("truncated blob".into()))?;
        Ok(self.device_id_from_blob(blob))
    }

    /// `base64(prefix ++ HMAC(signature_key, payload))`.
    pub fn signature(&self, payload: impl AsRef<[u8]>) -> String {
        let mut mac = self.signature_mac.clone();
        mac.update(payload.as_ref());
        let digest = mac.finalize().into_bytes();

        let mut out = Vec::with_capacity(1 + MAC_LEN);
        out.push(self.prefix);
        out.extend_from_slice(&digest);
        STANDARD.encode(out)
    }

    fn device_id_from_blob(&self, blob: &[u8]) -> String {
        let mut identifier = Vec::with_capacity(DEVICE_ID_BYTES);
        identifier.push(self.prefix);
        identifier.extend_from_slice(blob);

        let mut mac = self.device_mac.clone();
        mac.update(&identifier);
        let digest = mac.finalize().into_bytes();

        format!(
            "{}{}",
            hex::encode_upper(&identifier),
            hex::encode_upper(digest)
        )
    }
}

fn decode_key(key: &'static str, raw: Option<&str>) -> Result<Vec<u8>, Error> {
    let raw = raw.ok_or(Error::MissingIdentityKey { key })?;
    let bytes = hex::decode(raw.trim()).map_err(|e| Error::InvalidIdentityKey {
        key,
        reason: e.to_string(),
    })?;
    if bytes.is_empty() {
        return Err(Error::InvalidIdentityKey {
            key,
            reason: "empty key".into(),
        });
    }
    Ok(bytes)
}

fn keyed(key: &'static str, bytes: &[u8]) -> Result<HmacSha1, Error> {
    HmacSha1::new_from_slice(bytes).map_err(|e| Error::InvalidIdentityKey {
        key,
        reason: e.to_string(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────
