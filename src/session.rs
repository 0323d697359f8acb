//! Session record persistence
//!
//! The CLI runs one process per command, so the running session is written
//! to a small JSON file. `status` and `stop` in a later invocation read it
//! back. The record holds the full configuration, passphrase included, so the
//! file is private to its owner.

use crate::error::FantasmaResult;
use crate::interface::SharingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Adapter display name that started the session
    pub platform: String,
    pub config: SharingConfig,
}

impl SessionRecord {
    pub fn new(platform: &str, config: &SharingConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            platform: platform.to_string(),
            config: config.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, record: &SessionRecord) -> FantasmaResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        debug!("Session {} saved to {:?}", record.session_id, self.path);
        Ok(())
    }

    /// `None` when no session file exists
    pub async fn load(&self) -> FantasmaResult<Option<SessionRecord>> {
        match fs::read_to_string(&self.path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the session file; missing is fine
    pub async fn clear(&self) -> FantasmaResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{ConnectionType, NetworkInterface, NetworkMode};

    #[tokio::test]
    async fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("run/session.json"));
        assert_eq!(store.load().await.unwrap(), None);

        let config = SharingConfig::new(
            NetworkMode::Hotspot,
            NetworkInterface::new("eth0", ConnectionType::Ethernet),
            NetworkInterface::new("wlan0", ConnectionType::Wifi),
        )
        .with_credentials("Test", "testpass1");
        let record = SessionRecord::new("Linux", &config);
        store.save(&record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.config, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().await.is_err());
    }
}
