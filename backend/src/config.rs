use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (256, 256);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackendKind {
    Onnx,
    Torch,
}

impl FromStr for ModelBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onnx" | "tract" => Ok(Self::Onnx),
            "torch" | "torchscript" | "tch" => Ok(Self::Torch),
            other => Err(format!("unknown model backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub backend: ModelBackendKind,
    /// `(height, width)` used when the model does not declare its input size.
    pub default_input_size: (u32, u32),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub database_path: PathBuf,
    pub static_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub model: ModelConfig,
    pub jwt_secret: String,
    pub weather_api_key: Option<String>,
    pub allowed_origin: Option<String>,
}

impl AppConfig {
    /// Reads configuration from the process environment. Call
    /// `dotenv::dotenv()` first to pick up a local `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_address = match get("BIND_ADDRESS") {
            Some(addr) => addr,
            None => format!("0.0.0.0:{}", get("PORT").unwrap_or_else(|| "8081".to_string())),
        };

        let backend = match get("MODEL_BACKEND") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Invalid("MODEL_BACKEND", e))?,
            None => ModelBackendKind::Onnx,
        };

        let default_input_size = match get("DEFAULT_INPUT_SIZE") {
            Some(raw) => parse_size(&raw)
                .ok_or_else(|| ConfigError::Invalid("DEFAULT_INPUT_SIZE", raw.clone()))?,
            None => DEFAULT_INPUT_SIZE,
        };

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Self {
            bind_address,
            database_path: get("DATABASE_PATH")
                .unwrap_or_else(|| "user_data.db".to_string())
                .into(),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "static".to_string()).into(),
            catalog_path: get("CATALOG_PATH")
                .unwrap_or_else(|| "config/catalog.yaml".to_string())
                .into(),
            model: ModelConfig {
                path: get("MODEL_PATH")
                    .unwrap_or_else(|| "models/crop_disease.onnx".to_string())
                    .into(),
                backend,
                default_input_size,
            },
            jwt_secret,
            weather_api_key: get("WEATHER_API_KEY"),
            allowed_origin: get("FRONTEND_ORIGIN"),
        })
    }
}

/// Accepts `"256"` or `"224x224"` (height x width).
fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let raw = raw.trim();
    let (h, w) = match raw.split_once(['x', 'X']) {
        Some((h, w)) => (h.trim().parse().ok()?, w.trim().parse().ok()?),
        None => {
            let side = raw.parse().ok()?;
            (side, side)
        }
    };
    (h > 0 && w > 0).then_some((h, w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8081");
        assert_eq!(config.database_path, PathBuf::from("user_data.db"));
        assert_eq!(config.model.backend, ModelBackendKind::Onnx);
        assert_eq!(config.model.default_input_size, DEFAULT_INPUT_SIZE);
        assert!(config.weather_api_key.is_none());
    }

    #[test]
    fn jwt_secret_is_required() {
        assert!(matches!(
            AppConfig::from_lookup(lookup(&[("JWT_SECRET", "  ")])),
            Err(ConfigError::Missing("JWT_SECRET"))
        ));
    }

    #[test]
    fn overrides_are_read() {
        let config = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "x"),
            ("PORT", "9000"),
            ("MODEL_BACKEND", "torch"),
            ("DEFAULT_INPUT_SIZE", "224x192"),
            ("WEATHER_API_KEY", "abc"),
        ]))
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.model.backend, ModelBackendKind::Torch);
        assert_eq!(config.model.default_input_size, (224, 192));
        assert_eq!(config.weather_api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(AppConfig::from_lookup(lookup(&[("JWT_SECRET", "x"), ("MODEL_BACKEND", "keras")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("JWT_SECRET", "x"), ("DEFAULT_INPUT_SIZE", "0")])).is_err());
    }

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("256"), Some((256, 256)));
        assert_eq!(parse_size(" 224 x 160 "), Some((224, 160)));
        assert_eq!(parse_size("abc"), None);
    }
}
