use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// `len` bytes of OS entropy -> URL-safe base64 without padding.
pub fn random_token(len: usize) -> Result<String, getrandom::Error> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
