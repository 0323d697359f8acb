//! Saved sharing profiles
//!
//! A profile is a named [`SharingConfig`] kept as one TOML file per profile in
//! the profiles directory, so `start --profile home` can replay it.

use crate::error::{FantasmaError, FantasmaResult};
use crate::interface::SharingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;

const MAX_PROFILE_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub config: SharingConfig,
}

impl Profile {
    pub fn new(name: impl Into<String>, config: SharingConfig) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
            config,
        }
    }
}

/// Profile names double as file names
pub fn validate_profile_name(name: &str) -> FantasmaResult<()> {
    if name.is_empty() || name.len() > MAX_PROFILE_NAME_LEN {
        return Err(FantasmaError::Validation(format!(
            "Profile name must be 1-{} characters",
            MAX_PROFILE_NAME_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(FantasmaError::Validation(format!(
            "Invalid profile name '{}': use letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> FantasmaResult<PathBuf> {
        validate_profile_name(name)?;
        Ok(self.dir.join(format!("{}.toml", name)))
    }

    /// Write (or overwrite) a profile; the file is private to the owner since
    /// it may hold a WiFi passphrase
    pub async fn save(&self, profile: &Profile) -> FantasmaResult<PathBuf> {
        let path = self.path_for(&profile.name)?;
        let content = toml::to_string_pretty(profile)
            .map_err(|e| FantasmaError::Config(format!("Failed to serialize profile: {}", e)))?;

        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        info!("Profile '{}' saved to {:?}", profile.name, path);
        Ok(path)
    }

    pub async fn load(&self, name: &str) -> FantasmaResult<Profile> {
        let path = self.path_for(name)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FantasmaError::NotFound(format!("profile '{}'", name)))
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map_err(|e| FantasmaError::Parse(format!("profile '{}': {}", name, e)))
    }

    /// Profile names, sorted
    pub async fn list(&self) -> FantasmaResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_profile_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn delete(&self, name: &str) -> FantasmaResult<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Profile '{}' deleted", name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FantasmaError::NotFound(format!("profile '{}'", name)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::{ConnectionType, NetworkInterface, NetworkMode};

    fn home() -> Profile {
        let mut config = SharingConfig::new(
            NetworkMode::Hotspot,
            NetworkInterface::new("eth0", ConnectionType::Ethernet),
            NetworkInterface::new("wlan0", ConnectionType::Wifi),
        )
        .with_credentials("Home", "testpass1");
        config.channel = 11;
        Profile::new("home", config)
    }

    #[tokio::test]
    async fn test_profile_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles"));
        assert!(store.list().await.unwrap().is_empty());

        let profile = home();
        store.save(&profile).await.unwrap();
        store.save(&Profile::new("office", profile.config.clone())).await.unwrap();
        std::fs::write(dir.path().join("profiles/notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["home", "office"]);
        assert_eq!(store.load("home").await.unwrap(), profile);

        store.delete("office").await.unwrap();
        assert!(matches!(store.delete("office").await, Err(FantasmaError::NotFound(_))));
        assert!(matches!(store.load("office").await, Err(FantasmaError::NotFound(_))));
    }

    #[test]
    fn test_profile_names() {
        assert!(validate_profile_name("home-wifi_2").is_ok());
        assert!(validate_profile_name("").is_err());
        assert!(validate_profile_name("../etc/passwd").is_err());
        assert!(validate_profile_name("a b").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_profile_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        let path = store.save(&home()).await.unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
