//! Disk key handling and OpenPGP content encryption.
//!
//! Every encrypted disk owns one OpenPGP key pair. The server stores the public
//! key as is and the private key protected by the owner's passphrase, so it can
//! never read file content. Uploads are encrypted to the public key; downloads
//! are decrypted with the private key after it's unlocked locally.
//!
//! Unlocked private keys live in [`PrivateKeyRing`], which clears its secret
//! material when dropped. Keep rings short-lived and scoped to one operation.

mod info;
mod keyring;
#[cfg(test)]
pub(crate) mod testing;

pub use {
    info::CryptoInfo,
    keyring::{PrivateKeyRing, PublicKeyRing, build_key_rings, export_unlocked, open_key_blob},
};
