use {
    crate::{Disk, DiskId, FileId, FileInfo, FolderId, UploadId},
    serde::{Deserialize, Serialize},
};

/// Binds a request's params to the JSON-RPC method name and its result schema.
pub trait RequestToResponse {
    type Response;
    const METHOD: &'static str;
}
macro_rules! response_type {
    ($request:ty, $response:ty, $method:literal) => {
        impl RequestToResponse for $request {
            type Response = $response;
            const METHOD: &'static str = $method;
        }
    };
}

pub type Response<Request> = <Request as RequestToResponse>::Response;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub list: Vec<FileInfo>,
}

/// Returns metadata of a single file. `count` is zero if the file does not exist
/// or the caller has no access to it.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetFileById {
    pub file: FileId,
}
response_type!(GetFileById, FileList, "files.getById");

/// Lists files of a disk, starting from `offset`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetFiles {
    pub disk: DiskId,
    pub offset: u64,
}
response_type!(GetFiles, FileList, "files.get");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadUrl {
    pub url: String,
}

/// Returns a short-lived URL of the file's stored bytes (ciphertext for
/// encrypted files).
#[derive(Debug, Serialize, Deserialize)]
pub struct GetDownloadUrl {
    pub file: FileId,
}
response_type!(GetDownloadUrl, DownloadUrl, "files.download");

/// Returns a disk with its public key and encrypted private key.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetDisk {
    pub disk: DiskId,
}
response_type!(GetDisk, Disk, "disks.getById");

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskList {
    #[serde(default)]
    pub list: Vec<Disk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetDisks {}
response_type!(GetDisks, DiskList, "disks.get");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub upload: UploadId,
    pub url: String,
}

/// Declares a new file. The returned URL accepts the content with a single PUT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterUpload {
    pub name: String,
    pub mime: String,
    pub disk: DiskId,
    pub folder: FolderId,
    pub size: u64,
    pub encrypted: bool,
}
response_type!(RegisterUpload, UploadTarget, "files.upload");

/// Finalizes an upload after its content was transferred.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteUpload {
    pub upload: UploadId,
}
response_type!(CompleteUpload, FileInfo, "files.uploadComplete");
