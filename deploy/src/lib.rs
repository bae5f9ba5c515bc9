pub mod client;
pub mod command_line;
pub mod config;
pub mod contracts;
pub mod deploy;
pub mod progress;
pub mod rpc;
pub mod signer;
pub mod utils;
