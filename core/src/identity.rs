//! PKCS#12 identity loading.
//!
//! Decodes a password-protected PKCS#12 archive directly into a structured
//! certificate chain and private key, without a PEM intermediate. The leaf
//! certificate is located by checking which bundled certificate's public key
//! pairs with the decrypted private key.

use std::sync::Arc;

use p12::PFX;
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::CertifiedKey;
use rustls::InconsistentKeys;
use tracing::debug;

use crate::error::IdentityError;

/// A TLS client identity extracted from a PKCS#12 bundle.
///
/// The leaf certificate is the first entry of the chain. The identity is
/// consumed by the connection attempt that uses it and is not cloneable.
pub struct TlsIdentity {
    pub(crate) chain: Vec<CertificateDer<'static>>,
    pub(crate) key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Decrypts `bundle` with `password` and extracts the certificate chain
    /// and private key.
    ///
    /// Returns [`IdentityError::Decryption`] if the password is wrong or the
    /// archive is malformed, and [`IdentityError::KeyCertMismatch`] if the
    /// extracted key does not pair with any bundled certificate.
    pub fn from_pkcs12(bundle: &[u8], password: &str) -> Result<Self, IdentityError> {
        let pfx = PFX::parse(bundle)
            .map_err(|e| IdentityError::Decryption(format!("malformed PKCS#12 archive: {e}")))?;

        if !pfx.verify_mac(password) {
            return Err(IdentityError::Decryption(
                "MAC verification failed, wrong password?".to_string(),
            ));
        }

        let key_der = pfx
            .key_bags(password)
            .map_err(|e| IdentityError::Decryption(format!("failed to decrypt key bag: {e}")))?
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::Decryption("no private key in archive".to_string()))?;

        let cert_ders = pfx
            .cert_bags(password)
            .map_err(|e| {
                IdentityError::Decryption(format!("failed to decrypt certificate bags: {e}"))
            })?
            .into_iter()
            .map(CertificateDer::from)
            .collect::<Vec<_>>();

        if cert_ders.is_empty() {
            return Err(IdentityError::Decryption(
                "no certificate in archive".to_string(),
            ));
        }

        let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_der));
        let signing_key = any_supported_type(&key)
            .map_err(|e| IdentityError::Decryption(format!("unsupported private key: {e}")))?;

        let mut chain = cert_ders;
        let leaf_index = find_leaf(&chain, &signing_key)?;
        chain.swap(0, leaf_index);
        debug!(
            certificates = chain.len(),
            "extracted TLS identity from PKCS#12 bundle"
        );

        Ok(Self { chain, key })
    }

    /// The leaf certificate of the identity.
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.chain[0]
    }

    /// The full certificate chain, leaf first.
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }
}

/// Index of the certificate whose public key pairs with `signing_key`.
///
/// PKCS#12 bags carry no ordering guarantee, so every certificate is a leaf
/// candidate. If the crypto provider cannot expose the key's public half for
/// comparison, the bundle order is trusted and the first certificate is used.
fn find_leaf(
    chain: &[CertificateDer<'static>],
    signing_key: &Arc<dyn rustls::sign::SigningKey>,
) -> Result<usize, IdentityError> {
    let mut undetermined = false;
    for (index, cert) in chain.iter().enumerate() {
        match CertifiedKey::new(vec![cert.clone()], Arc::clone(signing_key)).keys_match() {
            Ok(()) => return Ok(index),
            Err(rustls::Error::InconsistentKeys(InconsistentKeys::Unknown)) => {
                undetermined = true;
            }
            Err(_) => {}
        }
    }
    if undetermined {
        return Ok(0);
    }
    Err(IdentityError::KeyCertMismatch)
}
