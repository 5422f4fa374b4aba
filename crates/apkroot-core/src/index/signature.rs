//! Index signatures (`.SIGN.RSA.<key>` / `.SIGN.RSA256.<key>`).

use std::io::Read;

use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::sign::Verifier;

use crate::keys::Keyring;

const SHA1_PREFIX: &str = ".SIGN.RSA.";
const SHA256_PREFIX: &str = ".SIGN.RSA256.";

/// Digest the signature was computed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureDigest {
    /// `.SIGN.RSA.*`
    Sha1,
    /// `.SIGN.RSA256.*`
    Sha256,
}

impl SignatureDigest {
    fn message_digest(self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
        }
    }
}

/// A detached signature read from the first gzip member.
#[derive(Debug, Clone)]
pub struct IndexSignature {
    /// File name of the key that produced it.
    pub key_name: String,
    /// Digest algorithm.
    pub digest: SignatureDigest,
    /// Raw PKCS#1 v1.5 signature.
    pub bytes: Vec<u8>,
}

/// Parse a signature entry name into its digest and key name.
pub fn parse_entry_name(name: &str) -> Option<(SignatureDigest, &str)> {
    if let Some(key) = name.strip_prefix(SHA256_PREFIX) {
        return Some((SignatureDigest::Sha256, key));
    }
    name.strip_prefix(SHA1_PREFIX)
        .map(|key| (SignatureDigest::Sha1, key))
}

/// Find the signature entry in the decompressed first member.
///
/// # Errors
///
/// Fails if the tar stream is unreadable.
pub fn read_signature(tar_data: &[u8]) -> std::io::Result<Option<IndexSignature>> {
    let mut archive = tar::Archive::new(tar_data);
    archive.set_ignore_zeros(true);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let Some((digest, key_name)) = parse_entry_name(&path) else {
            continue;
        };
        let key_name = key_name.to_string();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        return Ok(Some(IndexSignature {
            key_name,
            digest,
            bytes,
        }));
    }
    Ok(None)
}

/// Verify `signature` over `signed` with the matching key from `keys`.
///
/// # Errors
///
/// A description of the failure: unknown key, unreadable key, or a
/// signature that does not match.
pub fn verify(signature: &IndexSignature, signed: &[u8], keys: &Keyring) -> Result<(), String> {
    let pem = keys
        .get(&signature.key_name)
        .ok_or_else(|| format!("no trusted key named '{}'", signature.key_name))?;
    let key = PKey::public_key_from_pem(pem)
        .map_err(|e| format!("unreadable key '{}': {e}", signature.key_name))?;

    let mut verifier = Verifier::new(signature.digest.message_digest(), &key)
        .map_err(|e| e.to_string())?;
    verifier.update(signed).map_err(|e| e.to_string())?;

    match verifier.verify(&signature.bytes) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(format!(
            "signature by '{}' does not match",
            signature.key_name
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::rsa::Rsa;
    use openssl::sign::Signer;

    #[test]
    fn test_parse_entry_name() {
        assert_eq!(
            parse_entry_name(".SIGN.RSA.alpine-devel@lists.alpinelinux.org-4a6a0840.rsa.pub"),
            Some((
                SignatureDigest::Sha1,
                "alpine-devel@lists.alpinelinux.org-4a6a0840.rsa.pub"
            ))
        );
        assert_eq!(
            parse_entry_name(".SIGN.RSA256.wolfi-signing.rsa.pub"),
            Some((SignatureDigest::Sha256, "wolfi-signing.rsa.pub"))
        );
        assert_eq!(parse_entry_name(".PKGINFO"), None);
    }

    #[test]
    fn test_verify_roundtrip_and_tamper() {
        let rsa = Rsa::generate(2048).unwrap();
        let private = PKey::from_rsa(rsa).unwrap();
        let public_pem = private.public_key_to_pem().unwrap();

        let data = b"gzip bytes of APKINDEX";
        let mut signer = Signer::new(MessageDigest::sha256(), &private).unwrap();
        signer.update(data).unwrap();
        let signature = IndexSignature {
            key_name: "test.rsa.pub".into(),
            digest: SignatureDigest::Sha256,
            bytes: signer.sign_to_vec().unwrap(),
        };

        let mut keys = Keyring::new();
        keys.insert("test.rsa.pub".into(), public_pem);

        assert!(verify(&signature, data, &keys).is_ok());
        assert!(verify(&signature, b"tampered", &keys).is_err());

        let unknown = IndexSignature {
            key_name: "other.rsa.pub".into(),
            ..signature
        };
        assert!(verify(&unknown, data, &keys)
            .unwrap_err()
            .contains("no trusted key"));
    }
}
