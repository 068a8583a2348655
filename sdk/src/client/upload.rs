use {
    super::Client,
    crate::{
        crypto::{CryptoInfo, PublicKeyRing},
        error::{Error, Result},
        observer::{Observer, TransferEvent},
        util::{maybe_block_in_place, mime_from_name},
    },
    ktcloud_protocol::{
        DiskId, FileInfo, FolderId,
        endpoints::{CompleteUpload, RegisterUpload},
    },
    std::io::{self, Read, Seek, SeekFrom},
    tempfile::SpooledTempFile,
    tracing::instrument,
};

/// Content up to this size is prepared in memory, larger content spills to a
/// temporary file.
const MAX_IN_MEMORY: usize = 32 * 1024 * 1024;

/// Where and under which name to store uploaded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub name: String,
    /// Derived from `name` if not set.
    pub mime: Option<String>,
    pub disk: DiskId,
    /// Empty means the disk root.
    pub folder: FolderId,
}

impl UploadRequest {
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, disk: DiskId) -> Self {
        Self {
            name: name.into(),
            mime: None,
            disk,
            folder: FolderId::default(),
        }
    }
}

impl Client {
    /// Uploads `content`, encrypting it first if the target disk requires it.
    ///
    /// The public key is taken from `crypto_info` when it has one, otherwise
    /// from the disk. Content is fully prepared before the upload is
    /// registered, so nothing is registered if encryption fails.
    #[instrument(skip_all, fields(name = %request.name, disk = %request.disk))]
    pub async fn upload_file(
        &self,
        request: &UploadRequest,
        crypto_info: Option<&CryptoInfo>,
        mut content: impl Read,
        observer: &dyn Observer,
    ) -> Result<FileInfo> {
        if request.name.trim().is_empty() {
            return Err(Error::Input("file name is required".to_owned()));
        }
        let disk = self.disk(&request.disk).await?;
        let public_key = if disk.requires_encryption() {
            let armored = crypto_info
                .map(|info| info.public_key.as_str())
                .filter(|key| !key.trim().is_empty())
                .unwrap_or(disk.public_key.as_str());
            if armored.trim().is_empty() {
                return Err(Error::Credential(format!(
                    "missing public key for disk {}",
                    disk.id
                )));
            }
            Some(PublicKeyRing::parse(armored)?)
        } else {
            None
        };

        let mut spooled = SpooledTempFile::new(MAX_IN_MEMORY);
        maybe_block_in_place(|| -> Result<()> {
            match &public_key {
                Some(public_key) => {
                    observer.on_event(&TransferEvent::Encrypting {
                        name: &request.name,
                    });
                    public_key.encrypt(&mut content, &mut spooled)?;
                }
                None => {
                    io::copy(&mut content, &mut spooled)
                        .map_err(|err| Error::io("failed to read upload content", &err))?;
                }
            }
            Ok(())
        })?;
        let size = spooled
            .seek(SeekFrom::End(0))
            .and_then(|size| spooled.rewind().map(|()| size))
            .map_err(|err| Error::io("failed to prepare upload content", &err))?;

        let mime = request
            .mime
            .clone()
            .filter(|mime| !mime.trim().is_empty())
            .unwrap_or_else(|| mime_from_name(&request.name).to_owned());
        observer.on_event(&TransferEvent::Registering {
            name: &request.name,
            size,
        });
        let target = self
            .request(&RegisterUpload {
                name: request.name.clone(),
                mime,
                disk: request.disk.clone(),
                folder: request.folder.clone(),
                size,
                encrypted: public_key.is_some(),
            })
            .await?;

        observer.on_event(&TransferEvent::Transmitting { size });
        self.upload_content(&target.url, spooled, size).await?;
        let file = self
            .request(&CompleteUpload {
                upload: target.upload,
            })
            .await?;
        observer.on_event(&TransferEvent::Uploaded(&file));
        Ok(file)
    }
}
