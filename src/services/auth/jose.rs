//! Compact JWS/JWE serialization over the process key set.
//!
//! Nested tokens are signed first and the resulting JWS is encrypted
//! (`cty: JWT`), so only this service can read them and only its signing key
//! can have produced them.
use std::time::SystemTime;

use josekit::JoseError;
use josekit::jwe::{self, JweHeader};
use josekit::jws::JwsHeader;
use josekit::jwt::{self, JwtPayload, JwtPayloadValidator};

use crate::services::keys::KeyManager;

pub const CONTENT_ENCRYPTION: &str = "A256GCM";

pub fn sign(keys: &KeyManager, payload: &JwtPayload) -> Result<String, JoseError> {
    let mut header = JwsHeader::new();
    header.set_token_type("JWT");
    header.set_key_id(keys.signing_kid());
    jwt::encode_with_signer(payload, &header, keys.signer())
}

pub fn seal(keys: &KeyManager, payload: &JwtPayload) -> Result<String, JoseError> {
    let signed = sign(keys, payload)?;

    let mut header = JweHeader::new();
    header.set_content_encryption(CONTENT_ENCRYPTION);
    header.set_content_type("JWT");
    header.set_key_id(keys.encryption_kid());
    jwe::serialize_compact(signed.as_bytes(), &header, keys.encrypter())
}

/// Verify a compact JWS against our public signing key.
pub fn verify(keys: &KeyManager, token: &str) -> Result<JwtPayload, JoseError> {
    let (payload, _header) = jwt::decode_with_verifier(token, keys.verifier())?;
    Ok(payload)
}

/// Decrypt, then verify the inner JWS.
pub fn open(keys: &KeyManager, token: &str) -> Result<JwtPayload, JoseError> {
    let (signed, _header) = jwe::deserialize_compact(token, keys.decrypter())?;
    let (payload, _header) = jwt::decode_with_verifier(&signed, keys.verifier())?;
    Ok(payload)
}

/// Issuer must match; `exp`/`nbf` are checked against `now` when present.
pub fn validate(
    payload: &JwtPayload,
    issuer: &str,
    audience: Option<&str>,
    now: SystemTime,
) -> Result<(), JoseError> {
    let mut validator = JwtPayloadValidator::new();
    validator.set_issuer(issuer);
    validator.set_base_time(now);
    if let Some(audience) = audience {
        validator.set_audience(audience);
    }
    validator.validate(payload)
}
