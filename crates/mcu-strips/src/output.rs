//! Outbound message sink
//!
//! The controller writes finished protocol messages to a [`SurfaceOutput`],
//! addressed by chain position. The MIDI implementation lives in
//! [`crate::transport`]; tests use an in-memory recorder.

/// Error type for a single outbound write
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("Unit {0} is not connected")]
    Disconnected(usize),

    #[error("Failed to send to unit {unit}: {reason}")]
    SendFailed { unit: usize, reason: String },
}

/// Destination for raw protocol messages
pub trait SurfaceOutput {
    /// Send one complete message to the unit at `unit` (chain position)
    fn send(&mut self, unit: usize, message: &[u8]) -> Result<(), OutputError>;
}

/// Send and log; failures are reported and dropped
///
/// Returns whether the message went out.
pub fn send_logged(out: &mut dyn SurfaceOutput, unit: usize, message: &[u8]) -> bool {
    log::debug!("[MIDI OUT] unit={} {:02X?}", unit, message);
    match out.send(unit, message) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("Surface output: dropping message: {}", e);
            false
        }
    }
}
