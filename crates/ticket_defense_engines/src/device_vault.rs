#![forbid(unsafe_code)]

//! Encrypted on-device store for provider credentials.
//!
//! Secrets are sealed with AES-256-GCM under a per-device master key that
//! lives next to the vault file with `0600` permissions. Only ids known to
//! [`ProviderSecretId`] can be written or read.

use std::collections::BTreeMap;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use ticket_defense_contracts::provider_secrets::ProviderSecretId;

pub const VAULT_PATH_ENV: &str = "TICKET_DEFENSE_DEVICE_VAULT_PATH";

const VAULT_FORMAT: u8 = 1;
const MASTER_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug)]
pub enum VaultError {
    UnknownKeyId(String),
    EmptySecret,
    Io(std::io::Error),
    Json(serde_json::Error),
    Decode(base64::DecodeError),
    /// Master key missing, wrong length, or ciphertext failed authentication.
    Sealed,
    UnsupportedFormat(u8),
}

impl std::fmt::Display for VaultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKeyId(key) => write!(
                f,
                "unknown secret id '{key}' (allowed: {})",
                ProviderSecretId::allowed_key_names().join(", ")
            ),
            Self::EmptySecret => write!(f, "secret value must not be blank"),
            Self::Io(err) => write!(f, "vault io error: {err}"),
            Self::Json(err) => write!(f, "vault file is not valid json: {err}"),
            Self::Decode(err) => write!(f, "vault entry is not valid base64: {err}"),
            Self::Sealed => write!(f, "vault entry could not be decrypted with this device key"),
            Self::UnsupportedFormat(v) => write!(f, "unsupported vault format version {v}"),
        }
    }
}

impl std::error::Error for VaultError {}

impl From<std::io::Error> for VaultError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<base64::DecodeError> for VaultError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Decode(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultFile {
    format: u8,
    secrets: BTreeMap<String, SealedSecret>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self {
            format: VAULT_FORMAT,
            secrets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedSecret {
    nonce: String,
    ciphertext: String,
    updated_at: String,
}

/// Read side of a credential store, so callers can swap the on-disk vault
/// for an in-memory one.
pub trait SecretStore: Send + Sync {
    fn lookup(&self, id: ProviderSecretId) -> Result<Option<String>, VaultError>;
}

#[derive(Debug, Clone)]
pub struct DeviceVault {
    vault_path: PathBuf,
    key_path: PathBuf,
}

impl DeviceVault {
    /// Vault at `$TICKET_DEFENSE_DEVICE_VAULT_PATH`, or under the user config dir.
    pub fn default_local() -> Self {
        let vault_path = env::var(VAULT_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_vault_path);
        Self::at(vault_path)
    }

    /// Vault at `vault_path` with its master key alongside (`*.master.key`).
    pub fn at(vault_path: PathBuf) -> Self {
        let mut key_path = vault_path.clone();
        key_path.set_extension("master.key");
        Self::for_paths(vault_path, key_path)
    }

    pub fn for_paths(vault_path: PathBuf, key_path: PathBuf) -> Self {
        Self {
            vault_path,
            key_path,
        }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    pub fn set_secret(&self, key_id: &str, value: &str) -> Result<ProviderSecretId, VaultError> {
        let id = parse_key_id(key_id)?;
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(VaultError::EmptySecret);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.load_or_create_master_key()?)
            .map_err(|_| VaultError::Sealed)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), trimmed.as_bytes())
            .map_err(|_| VaultError::Sealed)?;

        let mut file = self.read_file()?.unwrap_or_default();
        file.secrets.insert(
            id.as_str().to_string(),
            SealedSecret {
                nonce: BASE64.encode(nonce_bytes),
                ciphertext: BASE64.encode(ciphertext),
                updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        );
        self.write_file(&file)?;
        Ok(id)
    }

    pub fn resolve_secret(&self, key_id: &str) -> Result<Option<String>, VaultError> {
        self.lookup(parse_key_id(key_id)?)
    }

    pub fn has_secret(&self, key_id: &str) -> Result<bool, VaultError> {
        Ok(self.resolve_secret(key_id)?.is_some())
    }

    pub fn delete_secret(&self, key_id: &str) -> Result<bool, VaultError> {
        let id = parse_key_id(key_id)?;
        let Some(mut file) = self.read_file()? else {
            return Ok(false);
        };
        let removed = file.secrets.remove(id.as_str()).is_some();
        if removed {
            self.write_file(&file)?;
        }
        Ok(removed)
    }

    /// Stored ids that are still recognized, sorted.
    pub fn list_secret_ids(&self) -> Result<Vec<ProviderSecretId>, VaultError> {
        let Some(file) = self.read_file()? else {
            return Ok(Vec::new());
        };
        let mut ids: Vec<ProviderSecretId> = file
            .secrets
            .keys()
            .filter_map(|key| ProviderSecretId::parse(key))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn open_entry(&self, entry: &SealedSecret) -> Result<String, VaultError> {
        let key = self.load_master_key()?.ok_or(VaultError::Sealed)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| VaultError::Sealed)?;
        let nonce = BASE64.decode(entry.nonce.as_bytes())?;
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Sealed);
        }
        let ciphertext = BASE64.decode(entry.ciphertext.as_bytes())?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| VaultError::Sealed)?;
        String::from_utf8(plaintext).map_err(|_| VaultError::Sealed)
    }

    fn read_file(&self) -> Result<Option<VaultFile>, VaultError> {
        if !self.vault_path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.vault_path)?;
        if raw.trim().is_empty() {
            return Ok(Some(VaultFile::default()));
        }
        let file = serde_json::from_str::<VaultFile>(&raw)?;
        if file.format != VAULT_FORMAT {
            return Err(VaultError::UnsupportedFormat(file.format));
        }
        Ok(Some(file))
    }

    fn write_file(&self, file: &VaultFile) -> Result<(), VaultError> {
        ensure_parent_dir(&self.vault_path)?;
        atomic_write(&self.vault_path, &serde_json::to_vec_pretty(file)?)
    }

    fn load_master_key(&self) -> Result<Option<[u8; MASTER_KEY_LEN]>, VaultError> {
        if !self.key_path.exists() {
            return Ok(None);
        }
        let decoded = BASE64.decode(fs::read_to_string(&self.key_path)?.trim().as_bytes())?;
        let key: [u8; MASTER_KEY_LEN] = decoded.try_into().map_err(|_| VaultError::Sealed)?;
        Ok(Some(key))
    }

    fn load_or_create_master_key(&self) -> Result<[u8; MASTER_KEY_LEN], VaultError> {
        if let Some(key) = self.load_master_key()? {
            return Ok(key);
        }
        ensure_parent_dir(&self.key_path)?;
        let mut key = [0u8; MASTER_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        write_new_file_restricted(&self.key_path, BASE64.encode(key).as_bytes())?;
        Ok(key)
    }
}

impl SecretStore for DeviceVault {
    fn lookup(&self, id: ProviderSecretId) -> Result<Option<String>, VaultError> {
        let Some(file) = self.read_file()? else {
            return Ok(None);
        };
        let Some(entry) = file.secrets.get(id.as_str()) else {
            return Ok(None);
        };
        let secret = self.open_entry(entry)?;
        Ok(Some(secret).filter(|s| !s.trim().is_empty()))
    }
}

/// Environment first (each of the id's env names in order), then the vault.
/// Vault failures are logged and treated as "not configured".
pub fn resolve_provider_secret(
    id: ProviderSecretId,
    env_lookup: &dyn Fn(&str) -> Option<String>,
    vault: Option<&dyn SecretStore>,
) -> Option<String> {
    let from_env = id
        .env_var_names()
        .iter()
        .filter_map(|name| env_lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty());
    if from_env.is_some() {
        return from_env;
    }
    let vault = vault?;
    match vault.lookup(id) {
        Ok(secret) => secret,
        Err(err) => {
            tracing::warn!(secret = id.as_str(), error = %err, "device vault lookup failed");
            None
        }
    }
}

fn parse_key_id(raw: &str) -> Result<ProviderSecretId, VaultError> {
    ProviderSecretId::parse(raw).ok_or_else(|| VaultError::UnknownKeyId(raw.to_string()))
}

fn default_vault_path() -> PathBuf {
    let config_dir = env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| env::var("HOME").ok().map(|home| PathBuf::from(home).join(".config")));
    match config_dir {
        Some(dir) => dir.join("ticket_defense").join("device_vault.json"),
        None => PathBuf::from(".ticket_defense").join("device_vault.json"),
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(())
}

fn write_new_file_restricted(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(data)?;
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
