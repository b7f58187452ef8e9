pub mod cache;
pub mod client;
pub mod contracts;
pub mod fees;
pub mod nonce;

pub use client::{ChainClient, Slot0};
