pub mod provider;

pub use provider::{ExternalProvider, UserInfo};
