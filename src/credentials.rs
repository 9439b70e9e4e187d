//! Per-user credential store: the device-code/refresh chain's output,
//! persisted so a restart doesn't force the operator back through the
//! browser flow.
//!
//! Grounded on `original_source/core/cache.py`'s approach to persisting
//! auth state to the platform data directory, adapted to encrypt the
//! record instead of pickling it plain: the stream cipher §4.B already
//! pulls in (AES-128/CFB8) is reused here rather than adding a crypto
//! dependency for one file format.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, DefaultStreamCipher};
use crate::errors::*;

const STALE_AFTER_SECS: u64 = 23 * 60 * 60;

/// A cached Microsoft/Minecraft session, refreshed when stale rather than
/// re-run through the device-code flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub uuid: String,
    pub issued_at: u64,
}

impl Credential {
    pub fn new(access_token: String, refresh_token: String, uuid: String) -> Self {
        Self {
            access_token,
            refresh_token,
            uuid,
            issued_at: now(),
        }
    }

    /// `issued_at` more than 23 hours old (§4.I).
    pub fn is_stale(&self) -> bool {
        now().saturating_sub(self.issued_at) > STALE_AFTER_SECS
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn project_dirs() -> TetsuResult<ProjectDirs> {
    ProjectDirs::from("", "", "vitrum")
        .ok_or_else(|| Error::NotFound("no platform data directory available".to_owned()))
}

fn load_or_create_key(data_dir: &Path) -> TetsuResult<[u8; 16]> {
    let path = data_dir.join("credentials.key");
    if let Ok(bytes) = fs::read(&path) {
        if bytes.len() == 16 {
            let mut key = [0u8; 16];
            key.copy_from_slice(&bytes);
            return Ok(key);
        }
    }
    fs::create_dir_all(data_dir)?;
    let mut key = [0u8; 16];
    crypto::generate_key(&mut key);
    fs::write(&path, key)?;
    Ok(key)
}

/// Encrypted, per-username credential records under `<data_dir>/vitrum/`.
pub struct CredentialStore {
    data_dir: PathBuf,
    key: [u8; 16],
}

impl CredentialStore {
    pub fn open() -> TetsuResult<Self> {
        let dirs = project_dirs()?;
        Self::open_at(dirs.data_dir().to_path_buf())
    }

    /// Opens (or initializes) a store rooted at an arbitrary directory;
    /// `open()` is just this with the platform data dir resolved.
    pub fn open_at(data_dir: PathBuf) -> TetsuResult<Self> {
        let key = load_or_create_key(&data_dir)?;
        Ok(Self { data_dir, key })
    }

    fn record_path(&self, username: &str) -> PathBuf {
        self.data_dir.join(format!("{}.enc", username))
    }

    pub fn load(&self, username: &str) -> TetsuResult<Option<Credential>> {
        let mut ciphertext = match fs::read(self.record_path(username)) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut cipher = DefaultStreamCipher::new(&self.key)?;
        cipher.decrypt(&mut ciphertext);
        let json = String::from_utf8(ciphertext)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn save(&self, username: &str, credential: &Credential) -> TetsuResult<()> {
        fs::create_dir_all(&self.data_dir)?;
        let mut bytes = serde_json::to_string(credential)?.into_bytes();
        let mut cipher = DefaultStreamCipher::new(&self.key)?;
        cipher.encrypt(&mut bytes);
        fs::write(self.record_path(username), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vitrum-credentials-test-{}", name));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn round_trips_through_encrypted_file() {
        let dir = scratch_dir("round-trip");
        let store = CredentialStore::open_at(dir.clone()).unwrap();
        let cred = Credential::new("access".into(), "refresh".into(), "uuid-1".into());
        store.save("alice", &cred).unwrap();

        let reopened = CredentialStore::open_at(dir.clone()).unwrap();
        let loaded = reopened.load("alice").unwrap().unwrap();
        assert_eq!(loaded, cred);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_record_is_not_an_error() {
        let dir = scratch_dir("missing");
        let store = CredentialStore::open_at(dir.clone()).unwrap();
        assert!(store.load("nobody").unwrap().is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn stale_after_23_hours() {
        let mut cred = Credential::new("a".into(), "r".into(), "u".into());
        assert!(!cred.is_stale());
        cred.issued_at = now() - (24 * 60 * 60);
        assert!(cred.is_stale());
    }
}
