use {
    super::keyring::{PrivateKeyRing, build_key_rings, export_unlocked, open_key_blob},
    crate::{
        client::Client,
        error::{Error, Result},
        util::maybe_block_in_place,
    },
    derivative::Derivative,
    ktcloud_protocol::DiskId,
    tracing::{debug, instrument},
    zeroize::Zeroizing,
};

/// Everything needed to encrypt for or decrypt from one disk.
///
/// The crypto info is ready once `raw_crypto_key` holds an unlocked private
/// key. It's never shared implicitly: pass it to each transfer that needs it.
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct CryptoInfo {
    /// Private key blob as stored on the server, passphrase-protected.
    #[derivative(Debug = "ignore")]
    pub encrypted_crypto_key: String,
    pub public_key: String,
    #[derivative(Debug = "ignore")]
    password: Zeroizing<String>,
    #[derivative(Debug = "ignore")]
    raw_crypto_key: Zeroizing<String>,
}

impl CryptoInfo {
    #[must_use]
    #[inline]
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
            ..Self::default()
        }
    }

    /// Supplies key material so that it's not fetched from the server.
    #[must_use]
    #[inline]
    pub fn with_keys(
        mut self,
        encrypted_crypto_key: impl Into<String>,
        public_key: impl Into<String>,
    ) -> Self {
        self.encrypted_crypto_key = encrypted_crypto_key.into();
        self.public_key = public_key.into();
        self
    }

    /// Supplies an already unlocked private key, making the info ready.
    #[must_use]
    #[inline]
    pub fn with_raw_crypto_key(mut self, raw_crypto_key: impl Into<String>) -> Self {
        self.raw_crypto_key = Zeroizing::new(raw_crypto_key.into());
        self
    }

    #[must_use]
    #[inline]
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn raw_crypto_key(&self) -> Option<&str> {
        Some(self.raw_crypto_key.as_str()).filter(|key| !key.trim().is_empty())
    }

    #[must_use]
    #[inline]
    pub fn is_crypto_ready(&self) -> bool {
        self.raw_crypto_key().is_some()
    }

    /// Unlocks the private key of `disk`, fetching missing key material first.
    ///
    /// Does nothing if already ready. On failure the info stays not ready.
    #[instrument(skip(self, client))]
    pub async fn try_get_ready(&mut self, client: &Client, disk: &DiskId) -> Result<()> {
        if self.is_crypto_ready() {
            return Ok(());
        }
        if !self.has_password() {
            return Err(Error::Credential(format!(
                "no password provided to unlock keys of disk {disk}"
            )));
        }
        if self.encrypted_crypto_key.trim().is_empty() || self.public_key.trim().is_empty() {
            debug!("fetching disk keys");
            let fetched = client.disk(disk).await?;
            if self.encrypted_crypto_key.trim().is_empty() {
                self.encrypted_crypto_key = fetched.crypto_key;
            }
            if self.public_key.trim().is_empty() {
                self.public_key = fetched.public_key;
            }
        }
        if self.encrypted_crypto_key.trim().is_empty() {
            return Err(Error::Credential(format!("disk {disk} has no private key")));
        }

        let raw_crypto_key = maybe_block_in_place(|| {
            let private_key = open_key_blob(&self.encrypted_crypto_key, &self.password)?;
            // Both keys must be usable before the info counts as ready.
            let (_public, _private) =
                build_key_rings(&self.public_key, &private_key, &self.password)?;
            export_unlocked(&private_key, &self.password)
        })?;
        self.raw_crypto_key = raw_crypto_key;
        Ok(())
    }

    /// Fetches the keys of `disk` and unlocks them with `password`.
    #[inline]
    pub async fn get_crypto_info(
        client: &Client,
        disk: &DiskId,
        password: impl Into<String>,
    ) -> Result<Self> {
        let mut info = Self::with_password(password);
        info.try_get_ready(client, disk).await?;
        Ok(info)
    }

    /// Opens a private key ring for one operation. Drop it as soon as possible.
    pub(crate) fn private_key_ring(&self) -> Result<PrivateKeyRing> {
        let raw_crypto_key = self
            .raw_crypto_key()
            .ok_or_else(|| Error::Credential("crypto info is not ready".to_owned()))?;
        PrivateKeyRing::unlock(raw_crypto_key, &self.password)
    }
}
