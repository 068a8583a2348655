use {
    crate::error::{Error, Result},
    sequoia_openpgp::{
        self as openpgp, Cert, Fingerprint, KeyHandle, Packet, PacketPile,
        crypto::{Password, SessionKey},
        packet::{
            Key, PKESK, SKESK,
            key::{SecretParts, UnspecifiedRole},
        },
        parse::{
            Parse,
            stream::{DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper},
        },
        policy::StandardPolicy,
        serialize::{
            SerializeInto,
            stream::{Encryptor2, LiteralWriter, Message},
        },
        types::SymmetricAlgorithm,
    },
    std::{
        io::{self, Read, Write},
        str,
    },
    zeroize::Zeroizing,
};

const UNLOCK_FAILED: &str = "failed to decrypt private key";
const MALFORMED_PUBLIC_KEY: &str = "malformed public key";

/// Usable public key of a disk. Encryption never needs anything else.
#[derive(Debug, Clone)]
pub struct PublicKeyRing {
    cert: Cert,
}

impl PublicKeyRing {
    #[inline]
    pub fn parse(armored: &str) -> Result<Self> {
        let cert = Cert::from_bytes(armored.as_bytes())
            .map_err(|err| Error::crypto(MALFORMED_PUBLIC_KEY, &err))?;
        let policy = StandardPolicy::new();
        let usable = cert
            .keys()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_transport_encryption()
            .for_storage_encryption()
            .next()
            .is_some();
        if !usable {
            return Err(Error::Crypto(format!(
                "{MALFORMED_PUBLIC_KEY}: no valid encryption key in {}",
                cert.fingerprint(),
            )));
        }
        Ok(Self { cert })
    }

    #[must_use]
    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.cert.fingerprint()
    }

    /// Writes `plaintext` as a binary OpenPGP message to `ciphertext`.
    /// Returns the number of plaintext bytes consumed.
    #[inline]
    pub fn encrypt(
        &self,
        mut plaintext: impl Read,
        ciphertext: impl Write + Send + Sync,
    ) -> Result<u64> {
        let policy = StandardPolicy::new();
        let recipients: Vec<_> = self
            .cert
            .keys()
            .with_policy(&policy, None)
            .supported()
            .alive()
            .revoked(false)
            .for_transport_encryption()
            .for_storage_encryption()
            .collect();
        let message = Encryptor2::for_recipients(Message::new(ciphertext), recipients)
            .build()
            .map_err(|err| Error::crypto("failed to start encryption", &err))?;
        let mut writer = LiteralWriter::new(message)
            .build()
            .map_err(|err| Error::crypto("failed to start encryption", &err))?;
        let size = io::copy(&mut plaintext, &mut writer)
            .map_err(|err| Error::io("failed to encrypt content", &err))?;
        writer
            .finalize()
            .map_err(|err| Error::crypto("failed to finish encryption", &err))?;
        Ok(size)
    }
}

/// Unlocked secret encryption keys.
///
/// The secret material is cleared when the ring is dropped, on every exit path
/// of the owner.
pub struct PrivateKeyRing {
    keys: Vec<Key<SecretParts, UnspecifiedRole>>,
}

impl PrivateKeyRing {
    /// Parses an armored private key and decrypts the secret material of its
    /// encryption keys. Keys that are not passphrase-protected are taken as is.
    #[inline]
    pub fn unlock(armored: &str, passphrase: &str) -> Result<Self> {
        let cert = Cert::from_bytes(armored.as_bytes())
            .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?;
        let password = Password::from(passphrase);
        let policy = StandardPolicy::new();
        let mut ring = Self { keys: Vec::new() };
        for amalgamation in cert
            .keys()
            .with_policy(&policy, None)
            .supported()
            .for_transport_encryption()
            .for_storage_encryption()
            .secret()
        {
            let key = amalgamation.key().clone();
            let key = if key.secret().is_encrypted() {
                key.decrypt_secret(&password)
                    .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?
            } else {
                key
            };
            ring.keys.push(key);
        }
        if ring.keys.is_empty() {
            return Err(Error::Crypto(format!(
                "{UNLOCK_FAILED}: no secret encryption key in {}",
                cert.fingerprint(),
            )));
        }
        Ok(ring)
    }

    #[must_use]
    #[inline]
    pub fn is_cleared(&self) -> bool {
        self.keys.is_empty()
    }

    /// Decrypts a complete OpenPGP message.
    ///
    /// Nothing is returned unless the whole message decrypted and passed its
    /// integrity check.
    #[inline]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if self.is_cleared() {
            return Err(Error::Crypto(
                "private key ring was already cleared".to_owned(),
            ));
        }
        let policy = StandardPolicy::new();
        let helper = KeyHelper { keys: &self.keys };
        let mut decryptor = DecryptorBuilder::from_bytes(ciphertext)
            .map_err(|err| Error::crypto("malformed message", &err))?
            .with_policy(&policy, None, helper)
            .map_err(|err| Error::crypto("failed to decrypt message", &err))?;
        let mut plaintext = Zeroizing::new(Vec::new());
        decryptor
            .read_to_end(&mut plaintext)
            .map_err(|err| Error::Crypto(format!("failed to decrypt message: {err}")))?;
        Ok(plaintext)
    }

    /// Drops all unlocked keys. Their memory is zeroed by the OpenPGP backend.
    #[inline]
    pub fn clear_private_params(&mut self) {
        self.keys.clear();
    }
}

impl Drop for PrivateKeyRing {
    #[inline]
    fn drop(&mut self) {
        self.clear_private_params();
    }
}

/// Builds both rings from raw key material.
#[inline]
pub fn build_key_rings(
    public_key: &str,
    private_key: &str,
    passphrase: &str,
) -> Result<(PublicKeyRing, PrivateKeyRing)> {
    let public = PublicKeyRing::parse(public_key)?;
    let private = PrivateKeyRing::unlock(private_key, passphrase)?;
    Ok((public, private))
}

/// Opens the server-side key blob.
///
/// The blob is either an armored private key or an OpenPGP message encrypted
/// with the passphrase that contains one. Returns the armored private key; its
/// secret material may still be passphrase-protected.
#[inline]
pub fn open_key_blob(blob: &str, passphrase: &str) -> Result<Zeroizing<String>> {
    if let Ok(cert) = Cert::from_bytes(blob.as_bytes()) {
        if cert.is_tsk() {
            return Ok(Zeroizing::new(blob.to_owned()));
        }
        return Err(Error::Crypto(format!(
            "{UNLOCK_FAILED}: key {} has no secret material",
            cert.fingerprint(),
        )));
    }

    let password = Password::from(passphrase);
    let policy = StandardPolicy::new();
    let mut decryptor = DecryptorBuilder::from_bytes(blob.as_bytes())
        .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?
        .with_policy(&policy, None, PasswordHelper { password: &password })
        .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?;
    let mut key_bytes = Zeroizing::new(Vec::new());
    decryptor
        .read_to_end(&mut key_bytes)
        .map_err(|err| Error::Crypto(format!("{UNLOCK_FAILED}: {err}")))?;
    let cert = Cert::from_bytes(key_bytes.as_slice())
        .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?;
    if !cert.is_tsk() {
        return Err(Error::Crypto(format!(
            "{UNLOCK_FAILED}: key {} has no secret material",
            cert.fingerprint(),
        )));
    }
    armor_tsk(&cert)
}

/// Re-serializes an armored private key with all secret material decrypted.
#[inline]
pub fn export_unlocked(private_key: &str, passphrase: &str) -> Result<Zeroizing<String>> {
    let pile = PacketPile::from_bytes(private_key.as_bytes())
        .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?;
    let password = Password::from(passphrase);
    let packets = pile
        .into_children()
        .map(|packet| match packet {
            Packet::SecretKey(key) if key.secret().is_encrypted() => {
                key.decrypt_secret(&password).map(Packet::SecretKey)
            }
            Packet::SecretSubkey(key) if key.secret().is_encrypted() => {
                key.decrypt_secret(&password).map(Packet::SecretSubkey)
            }
            other => Ok(other),
        })
        .collect::<openpgp::Result<Vec<Packet>>>()
        .map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?;
    let cert =
        Cert::from_packets(packets.into_iter()).map_err(|err| Error::crypto(UNLOCK_FAILED, &err))?;
    if !cert.is_tsk() {
        return Err(Error::Crypto(format!(
            "{UNLOCK_FAILED}: key {} has no secret material",
            cert.fingerprint(),
        )));
    }
    armor_tsk(&cert)
}

/// Serializes into a buffer allocated once, so no unzeroed copy of the
/// unlocked key is left behind by reallocation.
fn armor_tsk(cert: &Cert) -> Result<Zeroizing<String>> {
    let armored = cert.as_tsk().armored();
    let mut bytes = Zeroizing::new(vec![0; armored.serialized_len()]);
    let len = armored
        .serialize_into(&mut bytes[..])
        .map_err(|err| Error::crypto("failed to serialize private key", &err))?;
    bytes.truncate(len);
    str::from_utf8(&bytes)
        .map(|text| Zeroizing::new(text.to_owned()))
        .map_err(|err| Error::Crypto(format!("armored key is not UTF-8: {err}")))
}

struct KeyHelper<'a> {
    keys: &'a [Key<SecretParts, UnspecifiedRole>],
}

impl VerificationHelper for KeyHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for KeyHelper<'_> {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for pkesk in pkesks {
            for key in self.keys {
                if pkesk.recipient() != &key.keyid() && !pkesk.recipient().is_wildcard() {
                    continue;
                }
                let mut keypair = key.clone().into_keypair()?;
                if pkesk
                    .decrypt(&mut keypair, sym_algo)
                    .is_some_and(|(algo, session_key)| decrypt(algo, &session_key))
                {
                    return Ok(Some(key.fingerprint()));
                }
            }
        }
        Err(anyhow::anyhow!("message is not encrypted for this key"))
    }
}

struct PasswordHelper<'a> {
    password: &'a Password,
}

impl VerificationHelper for PasswordHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        Ok(())
    }
}

impl DecryptionHelper for PasswordHelper<'_> {
    fn decrypt<D>(
        &mut self,
        _pkesks: &[PKESK],
        skesks: &[SKESK],
        _sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for skesk in skesks {
            if skesk
                .decrypt(self.password)
                .is_ok_and(|(algo, session_key)| decrypt(algo, &session_key))
            {
                return Ok(None);
            }
        }
        Err(anyhow::anyhow!("wrong passphrase"))
    }
}
