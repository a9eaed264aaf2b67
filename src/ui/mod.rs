// UI module - GUI logic and event loop bridge
//
// This module contains:
// - UiBridge: Marshals work between the tokio runtime and the Slint event loop
// - GuiController: Main controller that wires the UI to the export, zoning and
//   capture workflows

pub mod bridge;
pub mod controller;

pub use bridge::{UiBridge, UiHandle};
pub use controller::GuiController;
