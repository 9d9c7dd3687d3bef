// Saved login for the portal, stored as a plain two-field JSON record
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CREDENTIALS_PATH: &str = "credentials.json";

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),
}

// Stored in clear text
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    // `Ok(None)` when no credentials file exists yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, CredentialsError> {
        let content = match fs::read_to_string(path.as_ref()) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialsError::IoError(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CredentialsError::JsonParseError(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CredentialsError> {
        let json = serde_json::to_string(self)
            .map_err(|e| CredentialsError::JsonParseError(e.to_string()))?;
        fs::write(path.as_ref(), json)?;
        info!("Saved credentials to {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("court_finder_{}_{}.json", std::process::id(), name))
    }

    #[test]
    fn test_save_and_load() {
        let path = scratch_path("save_and_load");
        let creds = Credentials::new("member@example.com", "hunter2");

        creds.save(&path).unwrap();
        let loaded = Credentials::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, Some(creds));
    }

    #[test]
    fn test_file_is_plain_two_field_record() {
        let path = scratch_path("plain_record");
        Credentials::new("member", "pw").save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(raw, serde_json::json!({"username": "member", "password": "pw"}));
    }

    #[test]
    fn test_missing_file_is_none() {
        let path = scratch_path("missing");
        assert!(Credentials::load(&path).unwrap().is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let path = scratch_path("malformed");
        fs::write(&path, "{\"username\": 1}").unwrap();
        let result = Credentials::load(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(CredentialsError::JsonParseError(_))));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("member", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
