//! Control-plane client for the bluez bluetooth daemon, built to drive hardware
//! validation scenarios: adapter power and naming, device pairing, profile negotiation
//! and media transport acquisition.

pub mod adapter;
pub mod config;
pub mod device;
pub mod errors;
pub mod interfaces;
pub mod objects;
pub mod pairing;
pub mod profiles;
pub mod properties;
pub mod proxies;
pub mod service;
pub mod transport;

pub use errors::BluezError;
pub use service::BluetoothService;
