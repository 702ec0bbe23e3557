//! Client for the RS-485 bus of Hayward/Goldline AquaLogic and ProLogic
//! pool controllers.
//!
//! The bus is shared with the physical keypads. [`AquaLogic::process`] decodes
//! the controller's frames into a [`DeviceState`], and key presses requested
//! through [`AquaLogic::send_key`] or [`AquaLogic::request_state`] are queued
//! and written one at a time, right after a keep-alive frame.

pub mod protocol {
    pub mod codec;
    pub mod frames;
    pub mod table;
}

pub mod config;
pub mod controller;
pub mod queue;
pub mod state;

pub use controller::{AquaLogic, Disconnect, Error};
pub use protocol::table::{ControllerTable, Key, State, AQUALOGIC};
pub use state::DeviceState;
