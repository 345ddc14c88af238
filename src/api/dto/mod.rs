pub mod clients;
pub mod login;
pub mod permissions;
pub mod revoke;
pub mod token_request;
pub mod token_response;
pub mod users;
