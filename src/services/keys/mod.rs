pub mod key_manager;
pub mod lease;

pub use key_manager::{GENERATION_LEASE_KEY, KeyManager, KeyPaths, PublicKeySet};
pub use lease::LeaseLock;
