mod server;

pub use server::{ServerConfig, ServerOverrides};
