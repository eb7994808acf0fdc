//! Identity loader tests against committed PKCS#12 and DER fixtures.
//!
//! `identity.p12` bundles `cert_a`/`key_a` under the password below. The raw
//! DER files let the tests assemble additional bundles in memory, including
//! one that deliberately pairs a certificate with the wrong key.

use amqpeek_core::{IdentityError, TlsIdentity};
use p12::PFX;

const BUNDLE: &[u8] = include_bytes!("data/identity.p12");
const PASSWORD: &str = "correct-horse";

const CERT_A: &[u8] = include_bytes!("data/cert_a.der");
const KEY_A: &[u8] = include_bytes!("data/key_a.der");
const KEY_B: &[u8] = include_bytes!("data/key_b.der");

#[test]
fn loads_identity_with_correct_password() {
    let identity = TlsIdentity::from_pkcs12(BUNDLE, PASSWORD).expect("loading fixture bundle");
    assert!(!identity.chain().is_empty());
    assert_eq!(identity.leaf().as_ref(), CERT_A);
}

#[test]
fn wrong_password_is_a_decryption_error() {
    assert!(matches!(
        TlsIdentity::from_pkcs12(BUNDLE, "not-the-password"),
        Err(IdentityError::Decryption(_))
    ));
}

#[test]
fn garbage_input_is_a_decryption_error() {
    assert!(matches!(
        TlsIdentity::from_pkcs12(b"not a pkcs12 archive", PASSWORD),
        Err(IdentityError::Decryption(_))
    ));
}

#[test]
fn matching_bundle_built_in_memory_loads() {
    let pfx = PFX::new(CERT_A, KEY_A, None, "pw", "match").expect("building bundle");
    let identity = TlsIdentity::from_pkcs12(&pfx.to_der(), "pw").expect("loading built bundle");
    assert_eq!(identity.leaf().as_ref(), CERT_A);
}

#[test]
fn mismatched_key_and_certificate_are_rejected() {
    let pfx = PFX::new(CERT_A, KEY_B, None, "pw", "mismatch").expect("building bundle");
    assert!(matches!(
        TlsIdentity::from_pkcs12(&pfx.to_der(), "pw"),
        Err(IdentityError::KeyCertMismatch)
    ));
}
