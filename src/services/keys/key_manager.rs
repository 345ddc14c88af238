//! Process-wide ES256 signing key and ECDH-ES encryption key.
//!
//! Both private keys live as PEM files on a path shared by every replica.
//! When the files are missing the first replica to win the generation lease
//! creates them; everybody else waits for the lease to clear and reads what
//! the winner wrote.
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use josekit::JoseError;
use josekit::jwe::{ECDH_ES, JweDecrypter, JweEncrypter};
use josekit::jwk::Jwk;
use josekit::jwk::alg::ec::{EcCurve, EcKeyPair};
use josekit::jws::{ES256, JwsSigner, JwsVerifier};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use super::lease::{LeaseError, LeaseLock};

/// Cache key arbitrating key generation across replicas.
pub const GENERATION_LEASE_KEY: &str = "ums-is-generating-jwk";

const MAX_LOAD_ATTEMPTS: usize = 3;

pub const SIGNING_ALG: &str = "ES256";
pub const ENCRYPTION_ALG: &str = "ECDH-ES";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key file i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed key material: {0}")]
    Malformed(String),

    #[error("jose error: {0}")]
    Jose(#[from] JoseError),

    #[error("generation lease: {0}")]
    Lease(#[from] LeaseError),

    #[error("key files still missing after {0} attempts")]
    Exhausted(usize),

    #[error("key id on disk ({on_disk}) differs from the one just generated ({generated})")]
    Diverged { generated: String, on_disk: String },

    #[error("key generation task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl KeyError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == ErrorKind::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub signing: PathBuf,
    pub encryption: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// This process won the lease and wrote fresh keys.
    Generated,
    /// Lease won, but the files were already there.
    AlreadyPresent,
    /// Another replica held the lease; we waited for it to finish.
    Waited,
}

struct SigningKey {
    kid: String,
    signer: Box<dyn JwsSigner>,
    verifier: Box<dyn JwsVerifier>,
    public_jwk: Jwk,
}

struct EncryptionKey {
    kid: String,
    encrypter: Box<dyn JweEncrypter>,
    decrypter: Box<dyn JweDecrypter>,
    public_jwk: Jwk,
}

pub struct KeyManager {
    signing: SigningKey,
    encryption: EncryptionKey,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("signing_kid", &self.signing.kid)
            .field("encryption_kid", &self.encryption.kid)
            .finish()
    }
}

/// Public half of the key set, as served on the JWKS endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PublicKeySet {
    pub keys: Vec<Map<String, Value>>,
}

impl KeyManager {
    /// Read both keys, generating them first when absent. Bounded retries.
    pub async fn load(paths: &KeyPaths, lease: &LeaseLock) -> Result<Self, KeyError> {
        for attempt in 1..=MAX_LOAD_ATTEMPTS {
            let owned = paths.clone();
            match tokio::task::spawn_blocking(move || read_pair(&owned)).await? {
                Ok((signing_pem, encryption_pem)) => {
                    let keys = Self::from_pem(&signing_pem, &encryption_pem)?;
                    info!(
                        signing_kid = %keys.signing.kid,
                        encryption_kid = %keys.encryption.kid,
                        "key material loaded"
                    );
                    return Ok(keys);
                }
                Err(e) if e.is_not_found() && attempt < MAX_LOAD_ATTEMPTS => {
                    info!(attempt, error = %e, "key material missing, generating");
                    generate(paths, lease).await?;
                }
                Err(e) if e.is_not_found() => return Err(KeyError::Exhausted(attempt)),
                Err(e) => return Err(e),
            }
        }
        Err(KeyError::Exhausted(MAX_LOAD_ATTEMPTS))
    }

    pub fn from_pem(signing_pem: &[u8], encryption_pem: &[u8]) -> Result<Self, KeyError> {
        let signing_pair = parse_pem(signing_pem, "signing")?;
        let encryption_pair = parse_pem(encryption_pem, "encryption")?;

        let signing_public = tagged(signing_pair.to_jwk_public_key(), "sig", SIGNING_ALG)?;
        let signing_private = tagged(signing_pair.to_jwk_key_pair(), "sig", SIGNING_ALG)?;
        let signing_kid = thumbprint(&signing_public)?;

        let encryption_public =
            tagged(encryption_pair.to_jwk_public_key(), "enc", ENCRYPTION_ALG)?;
        let encryption_private =
            tagged(encryption_pair.to_jwk_key_pair(), "enc", ENCRYPTION_ALG)?;
        let encryption_kid = thumbprint(&encryption_public)?;

        let signing = SigningKey {
            signer: Box::new(ES256.signer_from_jwk(&signing_private)?),
            verifier: Box::new(ES256.verifier_from_jwk(&signing_public)?),
            kid: signing_kid,
            public_jwk: signing_public,
        };
        let encryption = EncryptionKey {
            encrypter: Box::new(ECDH_ES.encrypter_from_jwk(&encryption_public)?),
            decrypter: Box::new(ECDH_ES.decrypter_from_jwk(&encryption_private)?),
            kid: encryption_kid,
            public_jwk: encryption_public,
        };

        Ok(Self {
            signing,
            encryption,
        })
    }

    pub fn signing_kid(&self) -> &str {
        &self.signing.kid
    }

    pub fn encryption_kid(&self) -> &str {
        &self.encryption.kid
    }

    pub fn signer(&self) -> &dyn JwsSigner {
        self.signing.signer.as_ref()
    }

    pub fn verifier(&self) -> &dyn JwsVerifier {
        self.signing.verifier.as_ref()
    }

    pub fn encrypter(&self) -> &dyn JweEncrypter {
        self.encryption.encrypter.as_ref()
    }

    pub fn decrypter(&self) -> &dyn JweDecrypter {
        self.encryption.decrypter.as_ref()
    }

    /// Public parameters only; never `d`.
    pub fn public_set(&self) -> PublicKeySet {
        let keys = [&self.signing.public_jwk, &self.encryption.public_jwk]
            .into_iter()
            .map(|jwk| {
                let mut members: Map<String, Value> = jwk.as_ref().clone();
                members.remove("d");
                members
            })
            .collect();
        PublicKeySet { keys }
    }
}

/// Generate both keys unless another replica is already doing so.
pub async fn generate(paths: &KeyPaths, lease: &LeaseLock) -> Result<GenerateOutcome, KeyError> {
    let Some(held) = lease.try_acquire().await? else {
        info!(lease = lease.key(), "key generation in progress elsewhere, waiting");
        lease.wait_released().await?;
        return Ok(GenerateOutcome::Waited);
    };

    let owned = paths.clone();
    let result = tokio::task::spawn_blocking(move || generate_locked(&owned))
        .await
        .map_err(KeyError::from)
        .and_then(|r| r);

    match lease.release(held).await {
        Ok(true) => {}
        Ok(false) => warn!(lease = lease.key(), "generation lease expired before release"),
        Err(e) => {
            result?;
            return Err(e.into());
        }
    }

    if let Ok(GenerateOutcome::Generated) = result {
        info!(
            signing = %paths.signing.display(),
            encryption = %paths.encryption.display(),
            "generated new key material"
        );
    }
    result
}

fn generate_locked(paths: &KeyPaths) -> Result<GenerateOutcome, KeyError> {
    if paths.signing.exists() && paths.encryption.exists() {
        return Ok(GenerateOutcome::AlreadyPresent);
    }

    let signing = EcKeyPair::generate(EcCurve::P256)?;
    let encryption = EcKeyPair::generate(EcCurve::P256)?;
    let generated_kid = thumbprint(&signing.to_jwk_public_key())?;

    write_private_key(&paths.signing, &signing.to_traditional_pem_private_key())?;
    write_private_key(&paths.encryption, &encryption.to_traditional_pem_private_key())?;

    // Read back: anything other than what we just wrote means a second writer.
    let (signing_pem, _) = read_pair(paths)?;
    let on_disk = thumbprint(&parse_pem(&signing_pem, "signing")?.to_jwk_public_key())?;
    if on_disk != generated_kid {
        return Err(KeyError::Diverged {
            generated: generated_kid,
            on_disk,
        });
    }

    Ok(GenerateOutcome::Generated)
}

/// RFC 7638 thumbprint of an EC public key.
pub fn thumbprint(jwk: &Jwk) -> Result<String, KeyError> {
    let member = |name: &str| {
        jwk.parameter(name)
            .and_then(Value::as_str)
            .ok_or_else(|| KeyError::Malformed(format!("jwk has no `{name}` member")))
    };
    let canonical = format!(
        r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
        member("crv")?,
        member("x")?,
        member("y")?
    );
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes())))
}

fn tagged(mut jwk: Jwk, key_use: &str, alg: &str) -> Result<Jwk, KeyError> {
    let kid = thumbprint(&jwk)?;
    jwk.set_key_id(kid);
    jwk.set_key_use(key_use);
    jwk.set_algorithm(alg);
    Ok(jwk)
}

fn parse_pem(pem: &[u8], which: &str) -> Result<EcKeyPair, KeyError> {
    EcKeyPair::from_pem(pem, Some(EcCurve::P256))
        .map_err(|e| KeyError::Malformed(format!("{which} key is not a P-256 private key: {e}")))
}

fn read_pair(paths: &KeyPaths) -> Result<(Vec<u8>, Vec<u8>), KeyError> {
    let signing = fs::read(&paths.signing).map_err(|e| KeyError::io(&paths.signing, e))?;
    let encryption = fs::read(&paths.encryption).map_err(|e| KeyError::io(&paths.encryption, e))?;
    Ok((signing, encryption))
}

// Temp file + rename so readers never observe a half-written key.
fn write_private_key(path: &Path, pem: &[u8]) -> Result<(), KeyError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| KeyError::io(dir, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp = PathBuf::from(tmp_name);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp).map_err(|e| KeyError::io(&tmp, e))?;
    file.write_all(pem).map_err(|e| KeyError::io(&tmp, e))?;
    file.sync_all().map_err(|e| KeyError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| KeyError::io(path, e))
}
