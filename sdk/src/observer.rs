//! Progress reporting for transfers.
//!
//! Pipelines never print. They report stages to an [`Observer`] and the caller
//! decides what to show.

use {
    ktcloud_protocol::{FileId, FileInfo},
    tracing::{debug, info},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent<'a> {
    /// Metadata of the file to download was found.
    Found(&'a FileInfo),
    /// Content download started.
    Fetching { file: &'a FileId, encrypted: bool },
    Decrypting { ciphertext_size: u64 },
    /// Upload content is being encrypted to the disk's public key.
    Encrypting { name: &'a str },
    Registering { name: &'a str, size: u64 },
    Transmitting { size: u64 },
    Downloaded { name: &'a str, size: u64 },
    Uploaded(&'a FileInfo),
}

pub trait Observer: Send + Sync {
    fn on_event(&self, event: &TransferEvent<'_>);
}

/// Logs every stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &TransferEvent<'_>) {
        match *event {
            TransferEvent::Found(file) => debug!(
                id = %file.id,
                name = %file.name,
                encrypted = file.encrypted,
                "found file"
            ),
            TransferEvent::Fetching { file, encrypted } => {
                debug!(%file, encrypted, "fetching content");
            }
            TransferEvent::Decrypting { ciphertext_size } => debug!(ciphertext_size, "decrypting"),
            TransferEvent::Encrypting { name } => debug!(name, "encrypting"),
            TransferEvent::Registering { name, size } => debug!(name, size, "registering upload"),
            TransferEvent::Transmitting { size } => debug!(size, "sending content"),
            TransferEvent::Downloaded { name, size } => info!(name, size, "downloaded"),
            TransferEvent::Uploaded(file) => {
                info!(id = %file.id, name = %file.name, "uploaded");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    #[inline]
    fn on_event(&self, _event: &TransferEvent<'_>) {}
}
