pub mod client_context;
pub mod handlers;
pub mod server;
pub mod state;
pub mod tls;
