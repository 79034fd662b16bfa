//! Daemon configuration: bind address and mount prefixes, loaded from
//! the environment with an optional TOML file for the same fields.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

const DEFAULT_BIND: &str = "127.0.0.1:8871";
const DEFAULT_ACCEL_PREFIX: &str = "/mnt/wasi1/";
const DEFAULT_IMAGE_PREFIX: &str = "/pack/";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bind: SocketAddr,
    pub accel_prefix: String,
    pub image_prefix: String,
}

/// Mirrors [`DaemonConfig`] field-for-field but with every field
/// optional, so a partial TOML file only overrides what it mentions.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<String>,
    accel_prefix: Option<String>,
    image_prefix: Option<String>,
}

impl DaemonConfig {
    /// Reads `FASTPATHD_CONFIG` for an optional TOML file, then lets
    /// `FASTPATHD_BIND`/`FASTPATHD_ACCEL_PREFIX`/`FASTPATHD_IMAGE_PREFIX`
    /// override whichever fields they set. Anything left unset falls
    /// back to the documented defaults.
    pub fn load() -> anyhow::Result<Self> {
        let file = match std::env::var("FASTPATHD_CONFIG") {
            Ok(path) => Self::read_file(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };

        let bind = std::env::var("FASTPATHD_BIND")
            .ok()
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()?;
        let accel_prefix = std::env::var("FASTPATHD_ACCEL_PREFIX")
            .ok()
            .or(file.accel_prefix)
            .unwrap_or_else(|| DEFAULT_ACCEL_PREFIX.to_string());
        let image_prefix = std::env::var("FASTPATHD_IMAGE_PREFIX")
            .ok()
            .or(file.image_prefix)
            .unwrap_or_else(|| DEFAULT_IMAGE_PREFIX.to_string());

        Ok(DaemonConfig { bind, accel_prefix, image_prefix })
    }

    fn read_file(path: &Path) -> anyhow::Result<FileConfig> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_file_config_leaves_every_field_none() {
        let cfg = FileConfig::default();
        assert!(cfg.bind.is_none());
        assert!(cfg.accel_prefix.is_none());
        assert!(cfg.image_prefix.is_none());
    }

    #[test]
    fn toml_file_parses_partial_overrides() {
        let cfg: FileConfig = toml::from_str("accel_prefix = \"/mnt/custom/\"\n").unwrap();
        assert_eq!(cfg.accel_prefix.as_deref(), Some("/mnt/custom/"));
        assert!(cfg.bind.is_none());
    }

    #[test]
    fn read_file_loads_a_real_toml_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fastpathd.toml");
        std::fs::write(&path, "bind = \"127.0.0.1:9000\"\nimage_prefix = \"/mnt/image/\"\n").unwrap();

        let cfg = DaemonConfig::read_file(&path).unwrap();
        assert_eq!(cfg.bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cfg.image_prefix.as_deref(), Some("/mnt/image/"));
        assert!(cfg.accel_prefix.is_none());
    }
}
