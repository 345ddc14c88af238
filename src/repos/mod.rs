pub mod client_repo;
pub mod error;
pub mod refresh_token_repo;
pub mod service_repo;
pub mod user_repo;
