use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "ada").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        Self::in_dir(data_dir)
    }

    pub fn in_dir(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("ada.db");

        Ok(Config { db_path, data_dir })
    }

    fn token_path(&self) -> PathBuf {
        self.data_dir.join("token")
    }

    /// The API token saved by `ada login`, if any.
    pub fn load_token(&self) -> Result<Option<String>> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(None);
        }
        let token = std::fs::read_to_string(&path).context("Failed to read token file")?;
        let token = token.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }

    pub fn save_token(&self, token: &str) -> Result<PathBuf> {
        let path = self.token_path();
        std::fs::write(&path, token.trim()).context("Failed to write token file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set token file permissions")?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip_through_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path().join("ada")).unwrap();
        assert!(config.db_path.ends_with("ada.db"));
        assert_eq!(config.load_token().unwrap(), None);

        config.save_token("  secret-token\n").unwrap();
        assert_eq!(config.load_token().unwrap().as_deref(), Some("secret-token"));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf()).unwrap();
        let path = config.save_token("t").unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_blank_token_file_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(dir.path().to_path_buf()).unwrap();
        config.save_token("   ").unwrap();
        assert_eq!(config.load_token().unwrap(), None);
    }
}
