//! Convert proxy subscription URLs into normalized `vless://` links.

pub mod config;
pub mod export;
pub mod subscription;

pub use subscription::convert;
