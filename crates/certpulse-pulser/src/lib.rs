pub mod cert;
pub mod config;
