use std::env;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid CHATPAD_API_URL {url:?}: {source}")]
    ApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub api_url: String,
    pub model: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub data_dir: PathBuf,
    pub state_path: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let debug = cfg!(debug_assertions);
        let api_url = env::var("CHATPAD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_url = api_url.trim_end_matches('/').to_string();
        Url::parse(&api_url).map_err(|source| ConfigError::ApiUrl {
            url: api_url.clone(),
            source,
        })?;

        let model = env::var("CHATPAD_MODEL")
            .ok()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_key = env::var("CHATPAD_API_KEY")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());

        let data_dir = env::var("CHATPAD_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir(debug));
        let state_path = env::var("CHATPAD_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("state.json"));

        Ok(Self {
            api_url,
            model,
            api_key,
            data_dir,
            state_path,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn default_data_dir(debug: bool) -> PathBuf {
    let base = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let dir_name = if debug { "chatpad-dev" } else { "chatpad" };
    base.join(".local").join("share").join(dir_name)
}
