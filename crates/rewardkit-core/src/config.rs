use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::device::DeviceInfo;
use crate::error::ConfigError;

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if !url.cannot_be_a_base() => Ok(()),
        _ => Err(ValidationError::new("base_url")),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoggingConfig {
    pub level: log::LevelFilter,
}

/// Where and as whom a placement talks to the ad server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct PlacementConfig {
    #[validate(custom(function = "validate_base_url"))]
    pub base_url: String,
    #[validate(length(min = 1))]
    pub api_key: String,
    #[validate(length(min = 1))]
    pub placement_id: String,
    /// Fixed install id; a per-process id is generated when absent.
    #[serde(default)]
    pub install_id: Option<String>,
    /// Overrides the device languages for texts.
    #[serde(default)]
    pub locale: Option<String>,
}

impl PlacementConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        placement_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            placement_id: placement_id.into(),
            install_id: None,
            locale: None,
        }
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.base_url)?;
        self.validate()?;
        if self.api_key.trim().is_empty() || self.placement_id.trim().is_empty() {
            let mut errors = validator::ValidationErrors::new();
            errors.add("api_key", ValidationError::new("blank"));
            return Err(errors.into());
        }
        Ok(())
    }

    /// `{base_url}/{api_key}/{install_id}` without a doubled slash.
    pub fn endpoint(&self, install_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            install_id
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RequestConfig {
    #[validate(length(min = 1))]
    pub sdk_version: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub logging: LoggingConfig,
    #[validate(nested)]
    pub placement: PlacementConfig,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    #[validate(nested)]
    pub request: Option<RequestConfig>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        cfg.placement.check()?;
        Ok(cfg)
    }
}
