pub mod config;
pub mod connection;
pub mod error;
pub mod file_stream;
pub mod handler;
pub mod message;
pub mod mime;
pub mod router;
pub mod server;
pub mod uri;
