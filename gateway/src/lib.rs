pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod providers;
pub mod sdk;
