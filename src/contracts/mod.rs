//! Contract bindings

pub mod bridge;
pub mod relay;

pub use bridge::{Bridge, Erc4626Vault, L1Bridge, L2Bridge, MessengerWrapper};
