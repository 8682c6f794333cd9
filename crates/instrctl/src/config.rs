//! Runtime configuration consumed from an external key/value source
//!
//! The frontend does not parse configuration files; a loader deserializes
//! whatever source it likes into [`Config`] and hands it over.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path hint for the shared library. Empty means auto-discover through
    /// the injected path provider. May carry a trailing `@<backend>`
    /// selector.
    pub library_path: String,

    /// Extra directories added to the library search at startup, in order.
    pub dll_extra_paths: Vec<PathBuf>,

    /// Backend name override; a `@<backend>` suffix on `library_path`
    /// takes precedence.
    pub backend: Option<String>,

    /// Numeric interface-type value reported for VICP resources. The
    /// canonical enum value is unknown; 400 is used unless overridden.
    pub vicp_interface_type: Option<u16>,
}

impl Config {
    /// Apply process-wide settings carried by the configuration.
    pub fn apply(&self) {
        if let Some(value) = self.vicp_interface_type {
            crate::constants::set_vicp_interface_type(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.library_path.is_empty());
        assert!(config.dll_extra_paths.is_empty());
        assert!(config.backend.is_none());
        assert!(config.vicp_interface_type.is_none());
    }

    #[test]
    fn test_deserialize_from_external_source() {
        let config: Config = serde_json::from_str(
            r#"{"library_path": "/opt/visa/libvisa.so@ivi", "dll_extra_paths": ["/opt/visa"]}"#,
        )
        .unwrap();
        assert_eq!(config.library_path, "/opt/visa/libvisa.so@ivi");
        assert_eq!(config.dll_extra_paths, vec![PathBuf::from("/opt/visa")]);
    }
}
