use std::fmt;

use md5::{Digest, Md5};

/// MD5 digest of a protocol's canonical JSON text.
///
/// Peers exchange it during the handshake to tell whether they speak the
/// same protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&Md5::digest(bytes));
        Fingerprint(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Fingerprint {
    fn from(bytes: [u8; 16]) -> Self {
        Fingerprint(bytes)
    }
}

/// Lowercase hex.
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
