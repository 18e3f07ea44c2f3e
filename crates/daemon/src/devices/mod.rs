//! Device management module.
//!
//! This module keeps the paired-device records and the adapter's friendly
//! name across restarts, and hands PINs to the pairing agent.

pub mod pin;
pub mod store;

pub use pin::PinStore;
pub use store::{DeviceStore, PairedDevice};
