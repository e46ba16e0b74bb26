pub mod cache;
pub mod codec;
pub mod db;
pub mod handler;
pub mod server;
pub mod telemetry;
