pub mod auth;
pub mod config;
pub mod error;
pub mod metadata;
pub mod request_meta;
pub mod routes;
pub mod state;
pub mod worlds;
