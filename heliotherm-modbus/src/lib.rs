//! Modbus/TCP gateway for Heliotherm heat pumps based on
//! [tokio-modbus](https://github.com/slowtec/tokio-modbus).

//! ## Register table
//!
//! The device is described by a static [`register::RegisterTable`]. Each
//! [`register::RegisterEntry`] maps one entity key to
//! - a register class, coil, discrete input, holding register or input register,
//! - a start address and a data width, `Bit`, `Int16`, `UInt16`, `Int32` or `UInt32`
//!   (two big-endian words),
//! - a scale factor; multiply the stored value by it to get the actual value,
//! - optional bounds, step and unit,
//! - an optional switch map (`off` and optionally `on` raw value) or select map
//!   (raw index to label),
//! - an optional hand-override companion that is set to `1` whenever the entry is written.
//!
//! The table is validated and classified once when it is built, see [`classify`] for the rules.
//! [`register::RegisterTable::heliotherm`] returns the built-in table of the Heliotherm RCG
//! controller.
//!
//! ## Hub
//!
//! [`hub::Hub`] owns the single connection to the device. Every poll cycle issues one bulk read
//! per register class and decodes all entities with [`codec`]. Polling runs while at least one
//! subscriber is registered, [`hub::Hub::refresh`] runs a cycle on demand and
//! [`hub::Hub::write`] encodes, writes and re-polls.
//!
//! See [examples/](https://github.com/vladimirvrabely/heliotherm-modbus/tree/main/heliotherm-modbus/examples) for simple usage.

/// Entity kinds and descriptions derived from table metadata
pub mod classify;
/// Utilities for encoding from and decoding to Modbus registers
pub mod codec;
/// Gateway configuration
pub mod config;
/// Transport traits and the tokio-modbus TCP client
pub mod core;
pub mod error;
/// Register map of Heliotherm heat pumps
pub mod heliotherm;
/// Polling hub
pub mod hub;
/// Static register table and address span computation
pub mod register;
mod write;

/// In-memory device to run the hub without hardware
#[cfg(any(test, feature = "simulator"))]
pub mod simulator;

pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use hub::{CycleReport, Hub};
pub use register::RegisterTable;
pub use write::WriteReceipt;
