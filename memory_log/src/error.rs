//! Error type for the memory log crate.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum LogError {
    #[error("failed to read settings file {}: {source}", .path.display())]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("extractor reply contains no JSON object")]
    MissingJson,

    #[error("extractor reply is not valid JSON: {0}")]
    ReplyParse(#[from] serde_json::Error),
}
