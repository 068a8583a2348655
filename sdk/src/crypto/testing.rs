use sequoia_openpgp::{
    cert::CertBuilder,
    serialize::{
        SerializeInto,
        stream::{Armorer, Encryptor2, LiteralWriter, Message},
    },
};
use std::io::Write;

pub const PASSPHRASE: &str = "correct horse battery staple";

/// Freshly generated disk key pair, armored.
pub struct KeyFixture {
    pub public_key: String,
    /// Secret material protected by [`PASSPHRASE`].
    pub private_key: String,
}

impl KeyFixture {
    pub fn generate() -> Self {
        let (cert, _revocation) = CertBuilder::new()
            .add_userid("disk@ktcloud.test")
            .add_transport_encryption_subkey()
            .set_password(Some(PASSPHRASE.into()))
            .generate()
            .unwrap();
        Self {
            public_key: String::from_utf8(cert.armored().to_vec().unwrap()).unwrap(),
            private_key: String::from_utf8(cert.as_tsk().armored().to_vec().unwrap()).unwrap(),
        }
    }
}

/// Armored message encrypted with `password` only.
pub fn password_encrypted(bytes: &[u8], password: &str) -> String {
    let mut sink = Vec::new();
    let message = Armorer::new(Message::new(&mut sink)).build().unwrap();
    let message = Encryptor2::with_passwords(message, Some(password))
        .build()
        .unwrap();
    let mut writer = LiteralWriter::new(message).build().unwrap();
    writer.write_all(bytes).unwrap();
    writer.finalize().unwrap();
    String::from_utf8(sink).unwrap()
}
