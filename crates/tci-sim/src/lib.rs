//! Simulation layer for testing the bridge without a physical radio
//!
//! Provides a protocol-accurate simulated device that records the commands
//! it receives, echoes parameter writes the way real hardware acknowledges
//! them, and injects IQ sample blocks on request. Connect it to the bridge
//! through `tokio::io::duplex()` and the bridge runs its production client
//! code end to end.

pub mod radio;

pub use radio::{
    run_sim_radio, sim_radio_channel, SimRadio, SimRadioHandle, SimRadioIo, SIM_RECEIVERS,
};
