//! SDK configuration.
//!
//! Values are merged in this order, later sources winning:
//!
//! 1. Built-in defaults ([`SdkConfig::default`])
//! 2. An optional YAML file
//! 3. Environment variables prefixed with `RESOURCE_SDK_` (e.g.
//!    `RESOURCE_SDK_BASE_URL=http://api.example.com`)
//!
//! ```no_run
//! use resource_framework::SdkConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SdkConfig::load(Some("sdk.yaml".as_ref()))?;
//! println!("talking to {}{}", config.base_url, config.rest_api_root);
//! # Ok(())
//! # }
//! ```

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use reqwest::header::HeaderName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Scheme and authority of the backend.
    pub base_url: String,
    /// Path prefix of every REST route.
    pub rest_api_root: String,
    /// Header the access token is sent in.
    pub auth_header: String,
    /// Prefix of the session keys in both storage tiers.
    pub storage_prefix: String,
    /// File backing the durable tier. In-memory when unset.
    pub durable_store_path: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Drop the local credential when the server answers 401.
    pub clear_session_on_unauthorized: bool,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            rest_api_root: "/api".to_string(),
            auth_header: "authorization".to_string(),
            storage_prefix: "$LoopBack$".to_string(),
            durable_store_path: None,
            timeout_secs: 30,
            clear_session_on_unauthorized: true,
        }
    }
}

impl SdkConfig {
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(path).extract()?;
        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed("RESOURCE_SDK_"))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("base_url must not be empty".to_string());
        }
        if !self.rest_api_root.is_empty() && !self.rest_api_root.starts_with('/') {
            return Err(format!(
                "rest_api_root must start with '/': {}",
                self.rest_api_root
            ));
        }
        HeaderName::from_bytes(self.auth_header.as_bytes())
            .map_err(|_| format!("invalid auth_header: {}", self.auth_header))?;
        Ok(())
    }

    /// Base path of a model's collection (`/api/MyModels`).
    pub fn model_path(&self, plural: &str) -> String {
        format!("{}/{}", self.rest_api_root.trim_end_matches('/'), plural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = SdkConfig::load(None)?;
            assert_eq!(config, SdkConfig::default());
            assert_eq!(config.model_path("MyModels"), "/api/MyModels");
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sdk.yaml",
                r#"
base_url: http://backend:8080
rest_api_root: /rest
durable_store_path: session.json
"#,
            )?;
            jail.set_env("RESOURCE_SDK_TIMEOUT_SECS", "5");
            jail.set_env("RESOURCE_SDK_BASE_URL", "http://override:9000");

            let config = SdkConfig::load(Some(Path::new("sdk.yaml")))?;

            assert_eq!(config.base_url, "http://override:9000");
            assert_eq!(config.rest_api_root, "/rest");
            assert_eq!(config.timeout_secs, 5);
            assert_eq!(config.durable_store_path, Some(PathBuf::from("session.json")));
            // Untouched values keep their defaults
            assert_eq!(config.auth_header, "authorization");
            assert!(config.clear_session_on_unauthorized);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_rest_root_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("sdk.yaml", "rest_api_root: api\n")?;
            let result = SdkConfig::load(Some(Path::new("sdk.yaml")));
            assert!(result.is_err());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_auth_header_is_rejected() {
        let config = SdkConfig {
            auth_header: "bad header".to_string(),
            ..SdkConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
