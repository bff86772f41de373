//! Error types shared by the build pipeline, scene backends and loaders

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderModelError {
    #[error("Model {model} is incomplete: {reason}")]
    ResourceIncomplete { model: String, reason: String },
    #[error("Texture {name} has {actual} bytes, expected {expected} for {width}x{height} RGBA32")]
    TextureDecode {
        name: String,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("Scene backend error: {0}")]
    Scene(String),
}

impl RenderModelError {
    pub fn incomplete(model: &str, reason: impl Into<String>) -> Self {
        Self::ResourceIncomplete {
            model: model.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize TOML: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
