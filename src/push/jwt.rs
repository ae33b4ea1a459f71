//! # push::jwt
//!
//! Hand-assembled JSON Web Tokens for the two providers that demand them:
//! RS256 (FCM OAuth2 jwt-bearer assertion) and ES256 (APNs provider token).
//!
//! ECDSA/SHA-256 over P-256 yields a **DER-encoded** signature; APNs (and
//! JWT in general) requires the fixed 64-byte raw `r‖s` form. [`der_to_raw`]
//! does that reformatting by hand and is kept out of the request path so it
//! can be unit-tested against synthetic encodings.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey as EcdsaSigningKey};
use p256::pkcs8::DecodePrivateKey as _;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::pkcs8::DecodePrivateKey as _;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Private key rejected: {0}")]
    BadKey(String),

    #[error("Malformed DER signature: {0}")]
    MalformedDer(&'static str),
}

// ─── Encoding helpers ─────────────────────────────────────────────────────────

/// Unpadded URL-safe base64 — the only alphabet JWT segments use.
pub fn b64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `base64url(header).base64url(claims)` — the exact byte string that gets
/// signed.
pub fn signing_input(header: &Value, claims: &Value) -> String {
    format!(
        "{}.{}",
        b64url(header.to_string().as_bytes()),
        b64url(claims.to_string().as_bytes())
    )
}

// ─── RS256 (FCM) ──────────────────────────────────────────────────────────────

/// Build a complete RS256 JWT from header + claims, signed with a PKCS#8 PEM
/// RSA private key (the service account's).
pub fn encode_rs256(header: &Value, claims: &Value, pkcs8_pem: &str) -> Result<String, JwtError> {
    let key = RsaPrivateKey::from_pkcs8_pem(pkcs8_pem)
        .map_err(|e| JwtError::BadKey(e.to_string()))?;
    let signer = RsaSigningKey::<Sha256>::new(key);

    let input = signing_input(header, claims);
    let signature = signer.sign(input.as_bytes());

    Ok(format!("{input}.{}", b64url(&signature.to_vec())))
}

// ─── ES256 (APNs) ─────────────────────────────────────────────────────────────

/// Build a complete ES256 JWT, signed with a PKCS#8 PEM P-256 key (.p8).
/// The DER signature from the signer is reformatted to raw `r‖s`.
pub fn encode_es256(header: &Value, claims: &Value, pkcs8_pem: &str) -> Result<String, JwtError> {
    let key = EcdsaSigningKey::from_pkcs8_pem(pkcs8_pem)
        .map_err(|e| JwtError::BadKey(e.to_string()))?;

    let input = signing_input(header, claims);
    let signature: EcdsaSignature = key.sign(input.as_bytes());
    let raw = der_to_raw(signature.to_der().as_bytes())?;

    Ok(format!("{input}.{}", b64url(&raw)))
}

// ─── DER → raw r‖s ───────────────────────────────────────────────────────────

/// Convert a DER-encoded ECDSA P-256 signature into the raw 64-byte `r‖s`
/// concatenation.
///
/// Layout parsed: `SEQUENCE { INTEGER r, INTEGER s }`. Each INTEGER may carry
/// one leading zero byte (sign padding) which is stripped; values shorter
/// than 32 bytes are left-padded back to 32.
pub fn der_to_raw(der: &[u8]) -> Result<[u8; 64], JwtError> {
    if der.first() != Some(&0x30) {
        return Err(JwtError::MalformedDer("missing SEQUENCE tag"));
    }

    let (seq_len, mut cursor) = read_length(der, 1)?;
    if cursor + seq_len != der.len() {
        return Err(JwtError::MalformedDer("SEQUENCE length mismatch"));
    }

    let mut raw = [0u8; 64];

    let r = read_integer(der, &mut cursor)?;
    raw[32 - r.len()..32].copy_from_slice(r);

    let s = read_integer(der, &mut cursor)?;
    raw[64 - s.len()..].copy_from_slice(s);

    if cursor != der.len() {
        return Err(JwtError::MalformedDer("trailing bytes after s"));
    }

    Ok(raw)
}

/// DER length octets. P-256 signatures fit in the short form or a one-byte
/// 0x81 extension; anything longer is rejected.
fn read_length(buf: &[u8], idx: usize) -> Result<(usize, usize), JwtError> {
    match buf.get(idx) {
        Some(&b) if b < 0x80 => Ok((b as usize, idx + 1)),
        Some(&0x81) => {
            let len = *buf
                .get(idx + 1)
                .ok_or(JwtError::MalformedDer("truncated extended length"))?;
            Ok((len as usize, idx + 2))
        }
        Some(_) => Err(JwtError::MalformedDer("unsupported length form")),
        None => Err(JwtError::MalformedDer("truncated length")),
    }
}

/// One INTEGER, returned with sign-padding zeros stripped, at most 32 bytes.
fn read_integer<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], JwtError> {
    if buf.get(*cursor) != Some(&0x02) {
        return Err(JwtError::MalformedDer("missing INTEGER tag"));
    }

    let (len, start) = read_length(buf, *cursor + 1)?;
    let end = start + len;
    let bytes = buf
        .get(start..end)
        .ok_or(JwtError::MalformedDer("truncated INTEGER body"))?;

    // Strip sign-padding zeros; keep one byte for a literal zero value.
    let mut value = bytes;
    while value.len() > 1 && value[0] == 0x00 {
        value = &value[1..];
    }

    if value.len() > 32 {
        return Err(JwtError::MalformedDer("INTEGER wider than 32 bytes"));
    }

    *cursor = end;
    Ok(value)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;
    use serde_json::json;

    // Throwaway keys generated for tests only — never used against a provider.
    const ES256_TEST_KEY: &str = include_str!("../../testdata/es256_test_key.pem");
    const RS256_TEST_KEY: &str = include_str!("../../testdata/rs256_test_key.pem");

    /// Build a synthetic DER signature from raw integer bodies
    /// (bodies given exactly as they would appear after the INTEGER header).
    fn synthetic_der(r_body: &[u8], s_body: &[u8]) -> Vec<u8> {
        let mut der = vec![0x30, (4 + r_body.len() + s_body.len()) as u8];
        der.push(0x02);
        der.push(r_body.len() as u8);
        der.extend_from_slice(r_body);
        der.push(0x02);
        der.push(s_body.len() as u8);
        der.extend_from_slice(s_body);
        der
    }

    #[test]
    fn test_der_to_raw_strips_leading_zero_pad() {
        // r: 33-byte body = 0x00 pad + 32 bytes with high bit set
        let mut r_body = vec![0x00];
        r_body.extend_from_slice(&[0xAB; 32]);
        // s: 31-byte body → left-padded to 32 in the raw form
        let s_body = vec![0x01; 31];

        let raw = der_to_raw(&synthetic_der(&r_body, &s_body)).unwrap();

        assert_eq!(raw.len(), 64);
        assert_eq!(&raw[..32], &[0xAB; 32][..]);
        assert_eq!(raw[32], 0x00);
        assert_eq!(&raw[33..], &[0x01; 31][..]);
    }

    #[test]
    fn test_der_to_raw_handles_extended_length() {
        // Same content, SEQUENCE length written in the 0x81 extended form.
        let mut r_body = vec![0x00];
        r_body.extend_from_slice(&[0xCD; 32]);
        let s_body = vec![0x02; 32];

        let short = synthetic_der(&r_body, &s_body);
        let mut extended = vec![0x30, 0x81, short[1]];
        extended.extend_from_slice(&short[2..]);

        let raw = der_to_raw(&extended).unwrap();
        assert_eq!(&raw[..32], &[0xCD; 32][..]);
        assert_eq!(&raw[32..], &[0x02; 32][..]);
    }

    #[test]
    fn test_der_to_raw_rejects_garbage() {
        assert!(der_to_raw(&[]).is_err());
        assert!(der_to_raw(&[0x31, 0x02, 0x02, 0x00]).is_err()); // wrong tag
        assert!(der_to_raw(&[0x30, 0x05, 0x02, 0x01, 0x01]).is_err()); // bad length
        // INTEGER wider than a P-256 scalar
        let wide = vec![0x03; 40];
        assert!(der_to_raw(&synthetic_der(&wide, &[0x01])).is_err());
    }

    #[test]
    fn test_es256_jwt_shape_and_signature_verifies() {
        let header = json!({"alg": "ES256", "kid": "TESTKEY123"});
        let claims = json!({"iss": "TEAM123456", "iat": 1_700_000_000});

        let jwt = encode_es256(&header, &claims, ES256_TEST_KEY).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        // Header round-trips through base64url.
        let decoded = URL_SAFE_NO_PAD.decode(parts[0]).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(parsed["alg"], "ES256");
        assert_eq!(parsed["kid"], "TESTKEY123");

        // Raw signature is exactly 64 bytes and verifies against the key.
        let raw_sig = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        assert_eq!(raw_sig.len(), 64);

        let key = EcdsaSigningKey::from_pkcs8_pem(ES256_TEST_KEY).unwrap();
        let verifier = VerifyingKey::from(&key);
        let signature = EcdsaSignature::from_slice(&raw_sig).unwrap();
        verifier
            .verify(format!("{}.{}", parts[0], parts[1]).as_bytes(), &signature)
            .expect("raw r‖s signature must verify");
    }

    #[test]
    fn test_rs256_jwt_signature_verifies() {
        use rsa::pkcs1v15::{Signature, VerifyingKey};
        use rsa::signature::Verifier as _;

        let header = json!({"alg": "RS256", "typ": "JWT"});
        let claims = json!({
            "iss":   "svc@example.iam.gserviceaccount.com",
            "scope": "https://www.googleapis.com/auth/firebase.messaging",
            "aud":   "https://oauth2.googleapis.com/token",
            "iat":   1_700_000_000,
            "exp":   1_700_003_600,
        });

        let jwt = encode_rs256(&header, &claims, RS256_TEST_KEY).unwrap();
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let key = RsaPrivateKey::from_pkcs8_pem(RS256_TEST_KEY).unwrap();
        let verifier = VerifyingKey::<Sha256>::new(key.to_public_key());
        let sig_bytes = URL_SAFE_NO_PAD.decode(parts[2]).unwrap();
        let signature = Signature::try_from(sig_bytes.as_slice()).unwrap();
        verifier
            .verify(
                format!("{}.{}", parts[0], parts[1]).as_bytes(),
                &signature,
            )
            .expect("RS256 signature must verify");
    }

    #[test]
    fn test_bad_pem_is_rejected() {
        let header = json!({"alg": "ES256"});
        let claims = json!({"iss": "x"});
        assert!(matches!(
            encode_es256(&header, &claims, "not a pem"),
            Err(JwtError::BadKey(_))
        ));
    }
}
