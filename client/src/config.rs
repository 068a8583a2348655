use {
    anyhow::{Context as _, Result, anyhow},
    byte_unit::Byte,
    derivative::Derivative,
    ktcloud_protocol::{DiskId, credentials::AccessToken},
    ktcloud_sdk::client::{
        ClientConfig, DEFAULT_SERVER_URL, DEFAULT_TIMEOUT, DEFAULT_TRANSFER_TIMEOUT,
    },
    serde::{Deserialize, Serialize},
    std::{io, path::Path, time::Duration},
    url::Url,
};

const CONFIG_FILE_NAME: &str = "ktcloud.json5";

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: Url,
    /// Requests are anonymous without a token.
    #[derivative(Debug = "ignore")]
    #[serde(default)]
    pub access_token: Option<AccessToken>,
    /// Disk used when a command doesn't name one. The first available disk otherwise.
    #[serde(default)]
    pub default_disk: Option<DiskId>,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_transfer_timeout", with = "humantime_serde")]
    pub transfer_timeout: Duration,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_warn_about_files_larger_than")]
    pub warn_about_files_larger_than: Byte,
}

fn default_server_url() -> Url {
    DEFAULT_SERVER_URL.parse().unwrap()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_transfer_timeout() -> Duration {
    DEFAULT_TRANSFER_TIMEOUT
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_warn_about_files_larger_than() -> Byte {
    "1 GB".parse().unwrap()
}

impl Config {
    /// Loads the config from `path`, or from the default location.
    ///
    /// A missing file at the default location means all defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_owned(), true),
            None => (
                dirs::config_dir()
                    .ok_or_else(|| anyhow!("cannot find config dir"))?
                    .join(CONFIG_FILE_NAME),
                false,
            ),
        };
        let text = match fs_err::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if !explicit && err.kind() == io::ErrorKind::NotFound => "{}".into(),
            Err(err) => return Err(err.into()),
        };
        json5::from_str(&text).with_context(|| format!("invalid config file {path:?}"))
    }

    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            server_url: self.server_url.clone(),
            timeout: self.timeout,
            transfer_timeout: self.transfer_timeout,
        }
    }
}
