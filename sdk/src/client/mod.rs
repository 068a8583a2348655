mod download;
mod upload;

pub use {download::Downloaded, upload::UploadRequest};

use {
    crate::{
        error::{Error, Result},
        util::stream_file,
    },
    futures::StreamExt,
    ktcloud_protocol::{
        Disk, DiskId, FileId, FileInfo,
        credentials::AccessToken,
        endpoints::{GetDisk, GetDisks, GetFileById, GetFiles, RequestToResponse},
        rpc::{ResponseError, RpcRequest, RpcResponse},
    },
    reqwest::{
        Body, Response, StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::{Map, Value},
    std::{
        io::{self, Read},
        time::Duration,
    },
    tracing::{debug, instrument},
    url::Url,
};

pub const DEFAULT_SERVER_URL: &str = "https://resistance.go-kt.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Loading large files may take a long time.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(3600 * 24);

const JSON_RPC_PATH: &str = "json-rpc";
const PING_PATH: &str = "ping";

/// Connection settings. Passed explicitly to every client, nothing is global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: Url,
    /// Limit for a single JSON-RPC call.
    pub timeout: Duration,
    /// Limit for a content download or upload.
    pub transfer_timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    #[inline]
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            timeout: DEFAULT_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

/// Endpoints live under the server URL even when it has a path without a
/// trailing slash: `https://host/api` becomes `https://host/api/`.
fn as_base(url: &Url) -> Url {
    let mut base = url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// JSON-RPC gateway of the ktCloud API.
///
/// Reuse created client or clone it in order to reuse a connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    reqwest: reqwest::Client,
    server_url: Url,
    api_url: Url,
    transfer_timeout: Duration,
    token: AccessToken,
}

impl Client {
    #[inline]
    pub fn new(config: &ClientConfig, token: AccessToken) -> Result<Self> {
        let server_url = as_base(&config.server_url);
        let api_url = server_url.join(JSON_RPC_PATH).map_err(|err| {
            Error::Input(format!("invalid server url {}: {err}", config.server_url))
        })?;
        Ok(Self {
            reqwest: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|err| Error::network("failed to build HTTP client", &err))?,
            server_url,
            api_url,
            transfer_timeout: config.transfer_timeout,
            token,
        })
    }

    #[must_use]
    #[inline]
    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Performs one JSON-RPC call and decodes its result.
    #[instrument(skip_all, fields(method = R::METHOD))]
    #[inline(never)]
    pub async fn request<R>(&self, request: &R) -> Result<R::Response>
    where
        R: RequestToResponse + Serialize + Sync,
        R::Response: DeserializeOwned,
    {
        let result = self
            .send(R::METHOD, &RpcRequest::new(R::METHOD, &self.token, request))
            .await?;
        serde_json::from_value(result).map_err(|err| {
            Error::Protocol(format!("{}: unexpected result shape: {err}", R::METHOD))
        })
    }

    /// Untyped call, for methods without a schema in the protocol crate.
    #[instrument(skip_all, fields(method))]
    #[inline]
    pub async fn call_raw(&self, method: &str, params: Map<String, Value>) -> Result<Value> {
        if method.trim().is_empty() {
            return Err(Error::Input("method name is required".to_owned()));
        }
        self.send(method, &RpcRequest::raw(method, &self.token, params))
            .await
    }

    async fn send(&self, method: &str, body: &(impl Serialize + Sync)) -> Result<Value> {
        let response = self
            .reqwest
            .post(self.api_url.clone())
            .header(CONTENT_TYPE, "application/json-rpc")
            .json(body)
            .send()
            .await
            .map_err(|err| Error::network(method, &err))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| Error::network(method, &err))?;
        let envelope: RpcResponse = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) if !status.is_success() => {
                debug!(?err, "undecodable error response");
                return Err(Error::Network(format!(
                    "{method}: bad response status {status}"
                )));
            }
            Err(err) => {
                return Err(Error::Protocol(format!("{method}: malformed response: {err}")));
            }
        };
        envelope.into_result().map_err(|err| match err {
            ResponseError::Server(err) => Error::from(err),
            ResponseError::MissingResult => {
                Error::Protocol(format!("{method}: response has no result"))
            }
        })
    }

    /// Checks that the API is up.
    #[inline]
    pub async fn ping(&self) -> bool {
        let Ok(url) = self.server_url.join(PING_PATH) else {
            return false;
        };
        match self.reqwest.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                status == StatusCode::OK || text == "Pong!"
            }
            Err(err) => {
                debug!(%err, "ping failed");
                false
            }
        }
    }

    /// Looks up a single file. A zero count or an empty list means not found.
    #[instrument(skip(self))]
    #[inline]
    pub async fn file_info(&self, file: &FileId) -> Result<FileInfo> {
        let list = self
            .request(&GetFileById { file: file.clone() })
            .await?;
        if list.count == 0 {
            return Err(Error::NotFound(format!(
                "file {file} not found or you have no access to it"
            )));
        }
        list.list.into_iter().next().ok_or_else(|| {
            Error::NotFound(format!("file {file} not found or you have no access to it"))
        })
    }

    #[inline]
    pub async fn list_files(&self, disk: &DiskId, offset: u64) -> Result<Vec<FileInfo>> {
        Ok(self
            .request(&GetFiles {
                disk: disk.clone(),
                offset,
            })
            .await?
            .list)
    }

    #[inline]
    pub async fn disk(&self, disk: &DiskId) -> Result<Disk> {
        if disk.is_empty() {
            return Err(Error::Input("disk id is required".to_owned()));
        }
        self.request(&GetDisk { disk: disk.clone() }).await
    }

    #[inline]
    pub async fn disks(&self) -> Result<Vec<Disk>> {
        Ok(self.request(&GetDisks {}).await?.list)
    }

    /// Starts fetching content from a signed URL. The token is not sent there.
    async fn fetch_content(&self, url: &str) -> Result<Response> {
        let url = Url::parse(url)
            .map_err(|err| Error::Protocol(format!("invalid content url: {err}")))?;
        let response = self
            .reqwest
            .get(url)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|err| Error::network("content download", &err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!(
                "content download: bad response status {status}"
            )));
        }
        Ok(response)
    }

    async fn upload_content(
        &self,
        url: &str,
        content: impl Read + Send + 'static,
        size: u64,
    ) -> Result<()> {
        let url = Url::parse(url)
            .map_err(|err| Error::Protocol(format!("invalid upload url: {err}")))?;
        let response = self
            .reqwest
            .put(url)
            .timeout(self.transfer_timeout)
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(
                stream_file(content).map(io::Result::Ok),
            ))
            .send()
            .await
            .map_err(|err| Error::network("content upload", &err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network(format!(
                "content upload: bad response status {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        serde_json::json,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{body_partial_json, method, path},
        },
    };

    pub(crate) fn client_for(server: &MockServer) -> Client {
        let config = ClientConfig::new(server.uri().parse().unwrap());
        Client::new(&config, AccessToken::new("test-token")).unwrap()
    }

    /// Mounts a JSON-RPC result for `rpc_method`, expected to be called `times`.
    pub(crate) async fn mock_rpc(server: &MockServer, rpc_method: &str, result: Value, times: u64) {
        Mock::given(method("POST"))
            .and(path("/json-rpc"))
            .and(body_partial_json(json!({"method": rpc_method})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": 0, "message": ""},
                "result": result,
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn endpoints_keep_server_path() {
        let token = AccessToken::new("t");
        for (server_url, api_url) in [
            ("https://host", "https://host/json-rpc"),
            ("https://host/", "https://host/json-rpc"),
            ("https://host/api", "https://host/api/json-rpc"),
            ("https://host/api/", "https://host/api/json-rpc"),
        ] {
            let config = ClientConfig::new(server_url.parse().unwrap());
            let client = Client::new(&config, token.clone()).unwrap();
            assert_eq!(client.api_url.as_str(), api_url, "{server_url}");
        }
    }

    #[tokio::test]
    async fn server_url_with_path_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/json-rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"list": [{"id": "d1", "name": "main"}]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Pong!"))
            .expect(1)
            .mount(&server)
            .await;
        let config = ClientConfig::new(format!("{}/api", server.uri()).parse().unwrap());
        let client = Client::new(&config, AccessToken::new("t")).unwrap();

        assert!(client.ping().await);
        let disks = client.disks().await.unwrap();
        assert_eq!(disks.len(), 1);
    }

    #[tokio::test]
    async fn request_sends_token_and_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/json-rpc"))
            .and(body_partial_json(json!({
                "method": "disks.getById",
                "params": {"token": "test-token", "disk": "d1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"id": "d1", "name": "main", "cryptoKey": "", "publicKey": ""}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let disk = client_for(&server).disk(&"d1".into()).await.unwrap();
        assert_eq!(disk.name, "main");
        assert!(!disk.requires_encryption());
    }

    #[tokio::test]
    async fn server_error_wins_over_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/json-rpc"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"code": 17, "message": "token expired"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).disks().await.unwrap_err();
        assert!(
            matches!(&err, Error::Server { code: 17, message } if message == "token expired"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn transport_and_shape_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/json-rpc"))
            .and(body_partial_json(json!({"method": "disks.get"})))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/json-rpc"))
            .and(body_partial_json(json!({"method": "files.get"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"list": "not a list"}
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);

        assert!(matches!(client.disks().await, Err(Error::Network(_))));
        assert!(matches!(
            client.list_files(&"d1".into(), 0).await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn file_lookup_not_found() {
        let server = MockServer::start().await;
        mock_rpc(&server, "files.getById", json!({"count": 0, "list": []}), 1).await;

        let err = client_for(&server)
            .file_info(&"X".into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn raw_call() {
        let server = MockServer::start().await;
        mock_rpc(&server, "users.me", json!({"login": "alice"}), 1).await;
        let client = client_for(&server);

        let value = client.call_raw("users.me", Map::new()).await.unwrap();
        assert_eq!(value, json!({"login": "alice"}));
        assert!(matches!(
            client.call_raw(" ", Map::new()).await,
            Err(Error::Input(_))
        ));
    }

    #[tokio::test]
    async fn ping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Pong!"))
            .mount(&server)
            .await;
        assert!(client_for(&server).ping().await);

        let silent = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&silent)
            .await;
        assert!(!client_for(&silent).ping().await);
    }
}
