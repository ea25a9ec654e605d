//! Mackie Control strip controller for a multi-unit surface chain
//!
//! This crate provides:
//! - Addressing for a chain of units (centre plus left/right extensions)
//! - The assignment-mode state machine (VolumePan, Sends, Plugins, IO,
//!   MultiCombined) with paging, flip and returns view
//! - Parameter binding from a host capability surface ([`HostModel`])
//! - Display rendering, LED/ring feedback and strip colours
//! - MIDI transport via midir, with raw input bridged through flume
//!
//! # Architecture
//!
//! ```text
//! Units → midir callback → flume channel → tick → StripController → SurfaceOutput → Units
//!                                                        ↕
//!                                                    HostModel
//! ```
//!
//! Everything runs on the caller's thread. The midir callback only forwards
//! bytes; the owner drains them on its refresh tick (about every 100 ms) and
//! hands host notifications to [`StripController::handle_host_event`].

mod addressing;
mod binding;
mod config;
mod controller;
mod display;
mod feedback;
mod host;
mod output;
mod protocol;
mod state;
mod transport;

#[cfg(test)]
mod test_support;

pub use addressing::{Chain, ChainError, Strip, Unit, UnitSpec};
pub use binding::{order_parameters, OrderedParameter, StripBinding, Target};
pub use config::{
    default_device_banks, default_surface_config_path, load_surface_config, normalize_port_name,
    port_matches, save_surface_config, DeviceBanks, SurfaceConfig, UnitConfig,
};
pub use controller::StripController;
pub use display::{compact_label, Row};
pub use feedback::{FeedbackChangeTracker, LedAddress, SelectedPosition};
pub use host::{
    DeviceId, DeviceInfo, HostError, HostEvent, HostModel, MixerInfo, ParameterId, ParameterInfo,
    RoutingInfo, RoutingKind, Subscription, Topic, TrackId, TrackInfo,
};
pub use output::{send_logged, OutputError, SurfaceOutput};
pub use protocol::SurfaceEvent;
pub use state::{
    clamp_offset, AssignmentMode, CombinedLayout, CombinedRegion, ControllerState, IoSubMode,
    ModeKind, PluginPaging, PluginSubMode,
};
pub use transport::{
    connect_surface, list_input_ports, list_output_ports, ConnectionError, MidiSurfaceOutput,
    SurfaceInput,
};

/// Error type for surface setup
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("MIDI connection error: {0}")]
    ConnectionError(#[from] ConnectionError),

    #[error("Surface output error: {0}")]
    OutputError(#[from] OutputError),
}

/// A controller wired to real MIDI ports
pub type MidiStripController<H> = StripController<H, MidiSurfaceOutput>;

/// Connect the configured chain and build a controller on top of it
///
/// Fails only if an input port is missing; outputs that cannot be opened are
/// left disconnected and their writes are dropped.
pub fn connect<H: HostModel>(
    host: H,
    config: &SurfaceConfig,
) -> Result<(SurfaceInput, MidiStripController<H>), SurfaceError> {
    let (input, output) = connect_surface(config)?;
    log::info!(
        "Surface: connected {} unit(s) for '{}'",
        config.port_patterns().len(),
        config.port_match
    );
    Ok((input, StripController::new(host, output, config)))
}

/// Feed pending input to the controller, then run its refresh tick
///
/// Call this from the host's periodic timer.
pub fn poll<H: HostModel, O: SurfaceOutput>(
    input: &SurfaceInput,
    controller: &mut StripController<H, O>,
) {
    for (unit, event) in input.drain() {
        controller.handle_event(unit, event);
    }
    controller.tick();
}
