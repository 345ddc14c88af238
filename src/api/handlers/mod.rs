pub mod clients;
pub mod config;
pub mod health;
pub mod login;
pub mod permissions;
pub mod revoke;
pub mod token;
pub mod users;
pub mod well_known;
