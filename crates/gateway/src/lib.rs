pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod maintenance;
pub mod registry;
pub mod resolver;
pub mod rpc;
pub mod stdio;
pub mod tools;

#[cfg(test)]
pub(crate) mod testutil;
