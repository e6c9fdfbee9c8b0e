use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::codec::PaperCodec;
use crate::config::Config;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub config: Config,
    pub codec: PaperCodec,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, regex::Error> {
        let codec = PaperCodec::new(config.codec())?;
        Ok(Self {
            workspace: None,
            db: None,
            config,
            codec,
        })
    }
}
