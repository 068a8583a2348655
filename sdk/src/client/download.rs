use {
    super::Client,
    crate::{
        crypto::CryptoInfo,
        error::{Error, Result},
        observer::{Observer, TransferEvent},
        util::maybe_block_in_place,
    },
    ktcloud_protocol::{FileId, FileInfo, endpoints::GetDownloadUrl},
    reqwest::Response,
    std::io::{self, Write},
    tracing::instrument,
};

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    /// Server-side file name.
    pub name: String,
    /// Number of plaintext bytes written.
    pub size: u64,
}

impl Client {
    /// Downloads a file into `writer`, decrypting it if it's encrypted.
    ///
    /// Stages: lookup, key check, URL resolution, fetch, delivery. A failure at
    /// any stage stops the pipeline. Decrypted content is written only after
    /// the whole ciphertext has been successfully decrypted, so a failed
    /// decryption leaves `writer` untouched.
    #[instrument(skip_all, fields(%file))]
    pub async fn download_file(
        &self,
        file: &FileId,
        mut writer: impl Write,
        crypto_info: Option<&mut CryptoInfo>,
        observer: &dyn Observer,
    ) -> Result<Downloaded> {
        if file.is_empty() {
            return Err(Error::Input("file id is required".to_owned()));
        }
        let info = self.file_info(file).await?;
        observer.on_event(&TransferEvent::Found(&info));

        let crypto_info = if info.encrypted {
            Some(self.authorize(&info, crypto_info).await?)
        } else {
            None
        };

        let url = self
            .request(&GetDownloadUrl { file: file.clone() })
            .await?
            .url;
        let mut response = self.fetch_content(&url).await?;
        observer.on_event(&TransferEvent::Fetching {
            file,
            encrypted: crypto_info.is_some(),
        });

        let size = match crypto_info {
            Some(crypto_info) => {
                let ciphertext = read_all(&mut response).await?;
                observer.on_event(&TransferEvent::Decrypting {
                    ciphertext_size: ciphertext.len().try_into().unwrap_or(u64::MAX),
                });
                let plaintext = maybe_block_in_place(|| {
                    crypto_info.private_key_ring()?.decrypt(&ciphertext)
                })?;
                maybe_block_in_place(|| io::copy(&mut plaintext.as_slice(), &mut writer))
                    .map_err(|err| Error::io("failed to write downloaded file", &err))?
            }
            None => {
                let mut size = 0u64;
                while let Some(chunk) = response
                    .chunk()
                    .await
                    .map_err(|err| Error::network("content download", &err))?
                {
                    let written =
                        maybe_block_in_place(|| io::copy(&mut chunk.as_ref(), &mut writer))
                            .map_err(|err| Error::io("failed to write downloaded file", &err))?;
                    size = size.saturating_add(written);
                }
                size
            }
        };
        writer
            .flush()
            .map_err(|err| Error::io("failed to write downloaded file", &err))?;

        observer.on_event(&TransferEvent::Downloaded {
            name: &info.name,
            size,
        });
        Ok(Downloaded {
            name: info.name,
            size,
        })
    }

    /// Checks that an encrypted file can be decrypted, unlocking keys if needed.
    async fn authorize<'a>(
        &self,
        file: &FileInfo,
        crypto_info: Option<&'a mut CryptoInfo>,
    ) -> Result<&'a CryptoInfo> {
        let Some(crypto_info) = crypto_info else {
            return Err(Error::Credential(format!(
                "file {} is encrypted and no crypto info is provided",
                file.id
            )));
        };
        if crypto_info.is_crypto_ready() {
            return Ok(crypto_info);
        }
        match (
            crypto_info.has_password(),
            crypto_info.raw_crypto_key().is_some(),
        ) {
            (false, false) => Err(Error::Credential(format!(
                "file {} is encrypted and no password or unlocked key is provided",
                file.id
            ))),
            (true, false) => {
                crypto_info.try_get_ready(self, &file.disk).await?;
                Ok(crypto_info)
            }
            (_, true) => Err(Error::Credential(format!(
                "inconsistent crypto info for file {}",
                file.id
            ))),
        }
    }
}

async fn read_all(response: &mut Response) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| Error::network("content download", &err))?
    {
        content.extend_from_slice(&chunk);
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            client::tests::{client_for, mock_rpc},
            crypto::{
                PublicKeyRing, export_unlocked,
                testing::{KeyFixture, PASSPHRASE, password_encrypted},
            },
            observer::{NoopObserver, tests::RecordingObserver},
        },
        serde_json::{Value, json},
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{body_partial_json, method, path},
        },
    };

    fn file_list(id: &str, name: &str, encrypted: bool) -> Value {
        json!({
            "count": 1,
            "list": [{"id": id, "name": name, "encrypted": encrypted, "disk": "d1", "size": 1024}],
        })
    }

    async fn mount_content(server: &MockServer, status: u16, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path("/content/f1"))
            .respond_with(ResponseTemplate::new(status).set_body_bytes(body))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_download_url(server: &MockServer) {
        let url = format!("{}/content/f1", server.uri());
        mock_rpc(server, "files.download", json!({ "url": url }), 1).await;
    }

    async fn mount_disk(server: &MockServer, keys: &KeyFixture, times: u64) {
        mock_rpc(
            server,
            "disks.getById",
            json!({
                "id": "d1",
                "encrypted": true,
                "cryptoKey": password_encrypted(keys.private_key.as_bytes(), PASSPHRASE),
                "publicKey": keys.public_key,
            }),
            times,
        )
        .await;
    }

    fn encrypt(keys: &KeyFixture, plaintext: &[u8]) -> Vec<u8> {
        let mut ciphertext = Vec::new();
        PublicKeyRing::parse(&keys.public_key)
            .unwrap()
            .encrypt(plaintext, &mut ciphertext)
            .unwrap();
        ciphertext
    }

    #[tokio::test]
    async fn plain_file() {
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "report.pdf", false), 1).await;
        mount_download_url(&server).await;
        mount_content(&server, 200, vec![7; 1024]).await;
        let observer = RecordingObserver::default();

        let mut out = Vec::new();
        let downloaded = client_for(&server)
            .download_file(&"f1".into(), &mut out, None, &observer)
            .await
            .unwrap();
        assert_eq!(
            downloaded,
            Downloaded {
                name: "report.pdf".into(),
                size: 1024
            }
        );
        assert_eq!(out, vec![7; 1024]);
        assert_eq!(observer.events(), ["found", "fetching", "downloaded"]);
    }

    #[tokio::test]
    async fn empty_id() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .download_file(&" ".into(), Vec::new(), None, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[tokio::test]
    async fn not_found_stops_pipeline() {
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", json!({"count": 0, "list": []}), 1).await;
        mock_rpc(&server, "files.download", json!({"url": "unused"}), 0).await;

        let err = client_for(&server)
            .download_file(&"X".into(), Vec::new(), None, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn encrypted_without_crypto_info() {
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "secret.txt", true), 2).await;
        mock_rpc(&server, "files.download", json!({"url": "unused"}), 0).await;

        let err = client_for(&server)
            .download_file(&"f1".into(), Vec::new(), None, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Credential(_)), "{err}");

        let mut info = CryptoInfo::default();
        let err = client_for(&server)
            .download_file(&"f1".into(), Vec::new(), Some(&mut info), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Credential(_)), "{err}");
    }

    #[tokio::test]
    async fn encrypted_file() {
        let keys = KeyFixture::generate();
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "secret.txt", true), 1).await;
        mount_disk(&server, &keys, 1).await;
        mount_download_url(&server).await;
        mount_content(&server, 200, encrypt(&keys, b"top secret")).await;
        let observer = RecordingObserver::default();

        let mut info = CryptoInfo::with_password(PASSPHRASE);
        let mut out = Vec::new();
        let downloaded = client_for(&server)
            .download_file(&"f1".into(), &mut out, Some(&mut info), &observer)
            .await
            .unwrap();
        assert_eq!(out, b"top secret");
        assert_eq!(downloaded.size, 10);
        assert!(info.is_crypto_ready());
        assert_eq!(
            observer.events(),
            ["found", "fetching", "decrypting", "downloaded"]
        );
    }

    #[tokio::test]
    async fn ready_crypto_info_skips_key_fetch() {
        let keys = KeyFixture::generate();
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "secret.txt", true), 1).await;
        mount_disk(&server, &keys, 0).await;
        mount_download_url(&server).await;
        mount_content(&server, 200, encrypt(&keys, b"already unlocked")).await;

        let unlocked = export_unlocked(&keys.private_key, PASSPHRASE).unwrap();
        let mut info = CryptoInfo::default().with_raw_crypto_key(unlocked.as_str());
        let mut out = Vec::new();
        client_for(&server)
            .download_file(&"f1".into(), &mut out, Some(&mut info), &NoopObserver)
            .await
            .unwrap();
        assert_eq!(out, b"already unlocked");
    }

    #[tokio::test]
    async fn tampered_ciphertext_writes_nothing() {
        let keys = KeyFixture::generate();
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "secret.txt", true), 1).await;
        mount_download_url(&server).await;
        let mut ciphertext = encrypt(&keys, b"integrity matters");
        if let Some(last) = ciphertext.last_mut() {
            *last ^= 0x01;
        }
        mount_content(&server, 200, ciphertext).await;

        let unlocked = export_unlocked(&keys.private_key, PASSPHRASE).unwrap();
        let mut info = CryptoInfo::default().with_raw_crypto_key(unlocked.as_str());
        let mut out = Vec::new();
        let err = client_for(&server)
            .download_file(&"f1".into(), &mut out, Some(&mut info), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)), "{err}");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn wrong_passphrase_writes_nothing() {
        let keys = KeyFixture::generate();
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "secret.txt", true), 1).await;
        mount_disk(&server, &keys, 1).await;

        let mut info = CryptoInfo::with_password("wrong");
        let mut out = Vec::new();
        let err = client_for(&server)
            .download_file(&"f1".into(), &mut out, Some(&mut info), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)), "{err}");
        assert!(out.is_empty());
        assert!(!info.is_crypto_ready());
    }

    #[tokio::test]
    async fn foreign_ciphertext_writes_nothing() {
        let keys = KeyFixture::generate();
        let other = KeyFixture::generate();
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "secret.txt", true), 1).await;
        mount_disk(&server, &keys, 1).await;
        mount_download_url(&server).await;
        mount_content(&server, 200, encrypt(&other, b"not for you")).await;

        let mut info = CryptoInfo::with_password(PASSPHRASE);
        let mut out = Vec::new();
        let err = client_for(&server)
            .download_file(&"f1".into(), &mut out, Some(&mut info), &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Crypto(_)), "{err}");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn bad_content_status() {
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "report.pdf", false), 1).await;
        mount_download_url(&server).await;
        mount_content(&server, 403, Vec::new()).await;

        let mut out = Vec::new();
        let err = client_for(&server)
            .download_file(&"f1".into(), &mut out, None, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)), "{err}");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn server_error_on_url_resolution() {
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", file_list("f1", "report.pdf", false), 1).await;
        Mock::given(method("POST"))
            .and(path("/json-rpc"))
            .and(body_partial_json(json!({"method": "files.download"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {"code": 403, "message": "access denied"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .download_file(&"f1".into(), Vec::new(), None, &NoopObserver)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Server { code: 403, .. }), "{err}");
    }
}
