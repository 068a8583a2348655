//! Client SDK for the ktCloud file storage API.
//!
//! [`Client`] talks JSON-RPC to the API. Downloads and uploads transparently
//! decrypt and encrypt content of disks that require client-side encryption;
//! see [`crypto`] for the key model.

pub mod client;
pub mod crypto;
pub mod error;
pub mod observer;
pub mod util;

pub use {
    client::{Client, ClientConfig, Downloaded, UploadRequest},
    crypto::CryptoInfo,
    error::{Error, Result},
    observer::{NoopObserver, Observer, TracingObserver, TransferEvent},
};
