use {
    anyhow::{Result, anyhow},
    clap::{Parser, Subcommand},
    ktcloud_protocol::{DiskId, FileId, FolderId},
    serde_json::Value,
    std::{path::PathBuf, str::FromStr},
};

#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Config file. Defaults to `ktcloud.json5` in the user config directory.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Passphrase of the disk keys. Visible to other local users; prefer `--ask-password`.
    #[arg(long, global = true, conflicts_with = "ask_password")]
    pub password: Option<String>,
    /// Prompt for the passphrase of the disk keys.
    #[arg(long, global = true)]
    pub ask_password: bool,
    /// Prompt for the access token instead of using the one from the config.
    #[arg(long, global = true)]
    pub ask_token: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Check that the API is alive.
    Ping,
    /// List files of a disk.
    Ls {
        disk: Option<DiskId>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// List available disks.
    Disks,
    Download {
        file: FileId,
        /// Target file, or a directory to save the file under its own name.
        path: PathBuf,
    },
    Upload {
        path: Option<PathBuf>,
        /// Name on the server. Defaults to the local file name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        disk: Option<DiskId>,
        #[arg(long)]
        folder: Option<FolderId>,
        /// Read content from stdin. Requires `--name`.
        #[arg(long, conflicts_with = "path", requires = "name")]
        stdin: bool,
    },
    /// Export the key pair of a disk. The private key is written unlocked.
    Keys {
        disk: Option<DiskId>,
        #[arg(long)]
        public: PathBuf,
        #[arg(long)]
        private: PathBuf,
    },
    /// Call any API method.
    Call {
        method: String,
        /// Parameters as `key=value`. Values that parse as JSON are sent as JSON.
        params: Vec<Param>,
        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: Value,
}

impl FromStr for Param {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let (key, value) = input
            .split_once('=')
            .ok_or_else(|| anyhow!("expected `key=value`, got {input:?}"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("empty parameter name in {input:?}"));
        }
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
        Ok(Self {
            key: key.to_owned(),
            value,
        })
    }
}
