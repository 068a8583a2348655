pub mod credentials;
pub mod endpoints;
pub mod rpc;

use {
    derive_more::{Display, From, Into},
    serde::{Deserialize, Serialize},
    std::{convert::Infallible, str::FromStr},
};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
            From, Into, Display,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().to_owned()))
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

string_id!(
    /// Server-side identifier of a stored file.
    FileId
);
string_id!(
    /// Identifier of a disk, the server-side encryption domain.
    DiskId
);
string_id!(FolderId);
string_id!(
    /// Handle of a registered, not yet completed upload.
    UploadId
);

/// Snapshot of a file's server-side metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: FileId,
    pub name: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub mime: String,
    pub disk: DiskId,
    #[serde(default)]
    pub size: u64,
    #[serde(default, rename = "typeDesc")]
    pub type_desc: String,
}

/// A disk together with its (optional) key pair.
///
/// `crypto_key` is the private key exactly as the server stores it, i.e. still
/// protected by the owner's passphrase. The server never sees anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub id: DiskId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default, rename = "cryptoKey")]
    pub crypto_key: String,
    #[serde(default, rename = "publicKey")]
    pub public_key: String,
}

impl Disk {
    /// Content stored on this disk must be encrypted client-side.
    #[must_use]
    #[inline]
    pub fn requires_encryption(&self) -> bool {
        self.encrypted || !self.public_key.trim().is_empty()
    }
}
