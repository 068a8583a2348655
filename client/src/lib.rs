pub mod cli;
pub mod config;

use {
    anyhow::{Context as _, Result, anyhow, bail},
    byte_unit::{Byte, UnitType},
    cli::{Cli, Command, Param},
    config::Config,
    ktcloud_protocol::{DiskId, FileId, FolderId, credentials::AccessToken},
    ktcloud_sdk::{Client, CryptoInfo, TracingObserver, UploadRequest},
    prettytable::{Table, format::FormatBuilder, row},
    serde_json::Map,
    std::{
        fmt::Display,
        io::{self, Read},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
    tracing::{info, warn},
    tracing_subscriber::{
        EnvFilter, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
    },
    zeroize::Zeroizing,
};

pub struct Ctx {
    pub config: Config,
    pub client: Client,
    password: Zeroizing<String>,
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let token = if cli.ask_token {
        let token = Zeroizing::new(rpassword::prompt_password(
            "Access token (leave empty for anonymous access): ",
        )?);
        AccessToken::new(token.as_str())
    } else {
        config.access_token.clone().unwrap_or_default()
    };
    if token.is_anonymous() {
        info!("no access token, requests are anonymous");
    }

    let password = match &cli.password {
        Some(password) => Zeroizing::new(password.clone()),
        None if cli.ask_password => {
            Zeroizing::new(rpassword::prompt_password("Disk passphrase: ")?)
        }
        None => Zeroizing::default(),
    };

    let ctx = Ctx {
        client: Client::new(&config.client_config(), token)?,
        config,
        password,
    };
    handle_command(cli.command, &ctx).await
}

async fn handle_command(command: Command, ctx: &Ctx) -> Result<()> {
    match command {
        Command::Ping => {
            if !ctx.client.ping().await {
                bail!("API is not alive");
            }
            info!("API is alive");
        }
        Command::Ls { disk, offset } => {
            let disk = resolve_disk(ctx, disk).await?;
            ls(ctx, &disk, offset).await?;
        }
        Command::Disks => disks(ctx).await?,
        Command::Download { file, path } => download(ctx, &file, &path).await?,
        Command::Upload {
            path,
            name,
            disk,
            folder,
            stdin,
        } => {
            let disk = resolve_disk(ctx, disk).await?;
            upload(ctx, path.as_deref(), name, disk, folder.unwrap_or_default(), stdin).await?;
        }
        Command::Keys {
            disk,
            public,
            private,
        } => {
            let disk = resolve_disk(ctx, disk).await?;
            export_keys(ctx, &disk, &public, &private).await?;
        }
        Command::Call {
            method,
            params,
            pretty,
        } => {
            let params: Map<_, _> = params
                .into_iter()
                .map(|Param { key, value }| (key, value))
                .collect();
            let result = ctx.client.call_raw(&method, params).await?;
            let text = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            info!("{text}");
        }
    }
    Ok(())
}

/// Uses the disk given on the command line, the configured one or the first available.
async fn resolve_disk(ctx: &Ctx, disk: Option<DiskId>) -> Result<DiskId> {
    if let Some(disk) = disk.or_else(|| ctx.config.default_disk.clone()) {
        return Ok(disk);
    }
    let disks = ctx.client.disks().await?;
    let disk = disks
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no disks available"))?;
    info!("using disk {} ({})", disk.name, disk.id);
    Ok(disk.id)
}

fn new_table() -> Table {
    let mut table = Table::new();
    table.set_format(FormatBuilder::new().column_separator(' ').build());
    table
}

async fn ls(ctx: &Ctx, disk: &DiskId, offset: u64) -> Result<()> {
    let files = ctx.client.list_files(disk, offset).await?;
    if files.is_empty() {
        info!("file list is empty");
        return Ok(());
    }
    let mut table = new_table();
    table.add_row(row!["ID", "Name", "Type", "Size"]);
    for file in files {
        let name = if file.encrypted {
            format!("{} (encrypted)", file.name)
        } else {
            file.name
        };
        let size = pretty_size(file.size);
        table.add_row(row![file.id, name, file.type_desc, size]);
    }
    info!("\n{table}");
    Ok(())
}

async fn disks(ctx: &Ctx) -> Result<()> {
    let mut table = new_table();
    table.add_row(row!["ID", "Name", "Encrypted"]);
    for disk in ctx.client.disks().await? {
        let encrypted = if disk.requires_encryption() { "yes" } else { "no" };
        table.add_row(row![disk.id, disk.name, encrypted]);
    }
    info!("\n{table}");
    Ok(())
}

/// Downloads into a temporary file next to the target, so a failed download
/// leaves nothing behind.
async fn download(ctx: &Ctx, file: &FileId, path: &Path) -> Result<()> {
    let to_dir = path.is_dir();
    let dir = if to_dir {
        path
    } else {
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {dir:?}"))?;
    let mut crypto_info = CryptoInfo::with_password(ctx.password.as_str());
    let downloaded = ctx
        .client
        .download_file(file, &mut tmp, Some(&mut crypto_info), &TracingObserver)
        .await?;

    let target = if to_dir {
        path.join(safe_file_name(&downloaded.name)?)
    } else {
        path.to_owned()
    };
    tmp.persist(&target)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to save {target:?}"))?;
    info!(
        "saved {} ({}) to {target:?}",
        downloaded.name,
        pretty_size(downloaded.size)
    );
    Ok(())
}

/// Server-side names must not escape the target directory.
fn safe_file_name(name: &str) -> Result<PathBuf> {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("cannot save file with name {name:?}"))
}

async fn upload(
    ctx: &Ctx,
    path: Option<&Path>,
    name: Option<String>,
    disk: DiskId,
    folder: FolderId,
    stdin: bool,
) -> Result<()> {
    let (name, content): (String, Box<dyn Read>) = if stdin {
        let name = name.context("file name is required for stdin upload, use --name")?;
        (name, Box::new(io::stdin()))
    } else {
        let path = path.context("file path is required")?;
        let metadata = fs_err::metadata(path)?;
        if metadata.is_dir() {
            bail!("directory uploading is not supported");
        }
        if metadata.len() > ctx.config.warn_about_files_larger_than.as_u64() {
            warn!(
                "uploading large file {path:?} ({})",
                pretty_size(metadata.len())
            );
        }
        let name = match name {
            Some(name) => name,
            None => path
                .file_name()
                .with_context(|| format!("no file name in {path:?}"))?
                .to_string_lossy()
                .into_owned(),
        };
        (name, Box::new(fs_err::File::open(path)?))
    };

    let request = UploadRequest {
        folder,
        ..UploadRequest::new(name, disk)
    };
    let file = ctx
        .client
        .upload_file(&request, None, content, &TracingObserver)
        .await?;
    info!("uploaded {} as {}", file.name, file.id);
    Ok(())
}

async fn export_keys(ctx: &Ctx, disk: &DiskId, public: &Path, private: &Path) -> Result<()> {
    let crypto_info =
        CryptoInfo::get_crypto_info(&ctx.client, disk, ctx.password.as_str()).await?;
    let raw_crypto_key = crypto_info
        .raw_crypto_key()
        .ok_or_else(|| anyhow!("keys of disk {disk} are not unlocked"))?;
    fs_err::write(public, &crypto_info.public_key)?;
    write_private(private, raw_crypto_key)?;
    info!("keys exported: {public:?}, {private:?}");
    Ok(())
}

#[cfg(target_family = "unix")]
fn write_private(path: &Path, content: &str) -> Result<()> {
    use {fs_err::os::unix::fs::OpenOptionsExt, io::Write};

    let mut file = fs_err::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

#[cfg(not(target_family = "unix"))]
fn write_private(path: &Path, content: &str) -> Result<()> {
    fs_err::write(path, content)?;
    Ok(())
}

pub fn pretty_size(size: u64) -> impl Display {
    let adjusted = Byte::from_u64(size).get_appropriate_unit(UnitType::Binary);
    format!("{adjusted:.1}")
}

pub fn setup_logger(log_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_new(log_filter)?)
        .init();
    Ok(())
}
