pub mod cache;
mod diag;
pub mod remote;
pub mod session;
pub mod store;

#[cfg(target_arch = "wasm32")]
pub mod web;
