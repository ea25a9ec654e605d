//! MIDI transport for the unit chain
//!
//! Uses midir for cross-platform MIDI I/O. Each unit gets its own input and
//! output connection, found by matching its configured port pattern.
//!
//! ```text
//! Unit → midir callback → flume channel → drain() on tick → StripController
//! ```
//!
//! The midir callback runs on a driver thread and only forwards bytes; all
//! parsing and state changes happen on the caller's thread when it drains.

use crate::config::{port_matches, SurfaceConfig};
use crate::output::{OutputError, SurfaceOutput};
use crate::protocol::SurfaceEvent;
use flume::{Receiver, Sender};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

/// Raw bytes from one unit, tagged with its chain position
pub type RawMessage = (usize, Vec<u8>);

const CHANNEL_CAPACITY: usize = 256;

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to initialize MIDI input: {0}")]
    InputInitError(String),

    #[error("Failed to initialize MIDI output: {0}")]
    OutputInitError(String),

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),
}

/// Index of the first port whose normalised name matches `pattern`
pub fn find_port(names: &[String], pattern: &str) -> Option<usize> {
    names.iter().position(|name| port_matches(name, pattern))
}

/// Data moved into each midir input callback
struct CallbackData {
    unit: usize,
    tx: Sender<RawMessage>,
}

/// Input side of the chain: one midir connection per unit feeding a channel
pub struct SurfaceInput {
    /// Kept alive for the duration; dropping closes the ports
    _connections: Vec<MidiInputConnection<CallbackData>>,
    rx: Receiver<RawMessage>,
}

impl SurfaceInput {
    /// Connect an input for every pattern, in chain order
    ///
    /// Fails if any unit's port cannot be found.
    pub fn connect(patterns: &[&str]) -> Result<Self, ConnectionError> {
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        let mut connections = Vec::with_capacity(patterns.len());

        for (unit, pattern) in patterns.iter().enumerate() {
            let midi_in = MidiInput::new("mcu-strips-in")
                .map_err(|e| ConnectionError::InputInitError(e.to_string()))?;

            let ports = midi_in.ports();
            let names: Vec<String> = ports
                .iter()
                .map(|p| midi_in.port_name(p).unwrap_or_default())
                .collect();
            let index = find_port(&names, pattern)
                .ok_or_else(|| ConnectionError::PortNotFound(pattern.to_string()))?;
            log::info!("MIDI: unit {} input port: {}", unit, names[index]);

            let callback_data = CallbackData {
                unit,
                tx: tx.clone(),
            };
            let connection = midi_in
                .connect(
                    &ports[index],
                    "mcu-strips-input",
                    Self::midi_callback,
                    callback_data,
                )
                .map_err(|e| ConnectionError::ConnectionError(e.to_string()))?;
            connections.push(connection);
        }

        Ok(Self {
            _connections: connections,
            rx,
        })
    }

    /// The midir callback function
    fn midi_callback(_timestamp: u64, data: &[u8], callback_data: &mut CallbackData) {
        log::trace!("[MIDI IN] unit={} {:02X?}", callback_data.unit, data);
        if callback_data
            .tx
            .try_send((callback_data.unit, data.to_vec()))
            .is_err()
        {
            log::warn!(
                "[MIDI IN] unit={} channel full, dropping {:02X?}",
                callback_data.unit,
                data
            );
        }
    }

    /// Input with no ports attached, fed through the returned sender
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, Sender<RawMessage>) {
        let (tx, rx) = flume::bounded(CHANNEL_CAPACITY);
        (
            Self {
                _connections: Vec::new(),
                rx,
            },
            tx,
        )
    }

    /// Try to receive one pending raw message (non-blocking)
    pub fn try_recv(&self) -> Option<RawMessage> {
        self.rx.try_recv().ok()
    }

    /// Drain every pending message, parsed into surface events
    ///
    /// Call this from the refresh tick and feed the events to the controller.
    pub fn drain(&self) -> impl Iterator<Item = (usize, SurfaceEvent)> + '_ {
        std::iter::from_fn(|| self.try_recv())
            .filter_map(|(unit, bytes)| SurfaceEvent::parse(&bytes).map(|e| (unit, e)))
    }
}

/// Output side of the chain, one optional midir connection per unit
pub struct MidiSurfaceOutput {
    connections: Vec<Option<MidiOutputConnection>>,
}

impl MidiSurfaceOutput {
    /// Connect an output for every pattern; units without a port stay
    /// disconnected and their writes fail with [`OutputError::Disconnected`]
    pub fn connect(patterns: &[&str]) -> Self {
        let connections = patterns
            .iter()
            .enumerate()
            .map(|(unit, pattern)| Self::try_connect(unit, pattern))
            .collect();
        Self { connections }
    }

    fn try_connect(unit: usize, pattern: &str) -> Option<MidiOutputConnection> {
        let midi_out = match MidiOutput::new("mcu-strips-out") {
            Ok(out) => out,
            Err(e) => {
                log::warn!("MIDI: Failed to initialize output: {}", e);
                return None;
            }
        };

        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_default())
            .collect();
        let Some(index) = find_port(&names, pattern) else {
            log::warn!("MIDI: no output port for unit {} matching '{}'", unit, pattern);
            return None;
        };

        match midi_out.connect(&ports[index], "mcu-strips-output") {
            Ok(conn) => {
                log::info!("MIDI: unit {} output port: {}", unit, names[index]);
                Some(conn)
            }
            Err(e) => {
                log::warn!("MIDI: Failed to connect to output: {}", e);
                None
            }
        }
    }

    pub fn is_connected(&self, unit: usize) -> bool {
        matches!(self.connections.get(unit), Some(Some(_)))
    }

    /// Close one unit's output; later writes to it are dropped
    pub fn disconnect(&mut self, unit: usize) {
        if let Some(slot) = self.connections.get_mut(unit) {
            if let Some(conn) = slot.take() {
                conn.close();
                log::info!("MIDI: unit {} output closed", unit);
            }
        }
    }
}

impl SurfaceOutput for MidiSurfaceOutput {
    fn send(&mut self, unit: usize, message: &[u8]) -> Result<(), OutputError> {
        match self.connections.get_mut(unit) {
            Some(Some(conn)) => conn.send(message).map_err(|e| OutputError::SendFailed {
                unit,
                reason: e.to_string(),
            }),
            _ => Err(OutputError::Disconnected(unit)),
        }
    }
}

/// Connect inputs and outputs for the whole chain described by `config`
pub fn connect_surface(
    config: &SurfaceConfig,
) -> Result<(SurfaceInput, MidiSurfaceOutput), ConnectionError> {
    let patterns = config.port_patterns();
    let input = SurfaceInput::connect(&patterns)?;
    let output = MidiSurfaceOutput::connect(&patterns);
    Ok((input, output))
}

/// List all available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>, ConnectionError> {
    let midi_in = MidiInput::new("mcu-strips-list")
        .map_err(|e| ConnectionError::InputInitError(e.to_string()))?;

    let ports: Vec<String> = midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect();

    Ok(ports)
}

/// List all available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>, ConnectionError> {
    let midi_out = MidiOutput::new("mcu-strips-list")
        .map_err(|e| ConnectionError::OutputInitError(e.to_string()))?;

    let ports: Vec<String> = midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect();

    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_port_uses_normalised_names() {
        let names = vec![
            "Midi Through Port-0 14:0".to_string(),
            "MCU Pro:MCU Pro MIDI 1 24:0".to_string(),
            "MCU XT Port 1 [hw:3,0,0]".to_string(),
        ];
        assert_eq!(find_port(&names, "mcu pro"), Some(1));
        assert_eq!(find_port(&names, "XT"), Some(2));
        assert_eq!(find_port(&names, "hw:3"), None);
    }

    #[test]
    fn test_callback_tags_unit_and_drain_parses() {
        let (input, tx) = SurfaceInput::detached();
        let mut data = CallbackData { unit: 1, tx };

        SurfaceInput::midi_callback(0, &[0x90, 0x32, 0x7F], &mut data);
        SurfaceInput::midi_callback(0, &[0xE0, 0x00, 0x40], &mut data);
        SurfaceInput::midi_callback(0, &[0xB0, 0x12, 0x41], &mut data);

        let events: Vec<_> = input.drain().collect();
        assert_eq!(
            events,
            vec![
                (1, SurfaceEvent::Switch { id: 0x32, pressed: true }),
                (1, SurfaceEvent::RotaryTurn { strip: 2, value: 0x41 }),
            ]
        );
        assert!(input.try_recv().is_none());
    }

    #[test]
    fn test_disconnected_unit_write_fails() {
        let mut out = MidiSurfaceOutput {
            connections: vec![None],
        };
        assert!(!out.is_connected(0));
        assert_eq!(out.send(0, &[0x90, 0x28, 0x7F]), Err(OutputError::Disconnected(0)));
        assert_eq!(out.send(5, &[0x90, 0x28, 0x7F]), Err(OutputError::Disconnected(5)));
    }

    #[test]
    fn test_list_ports() {
        // Port availability depends on the system; this only checks enumeration
        let _input_ports = list_input_ports();
        let _output_ports = list_output_ports();
    }
}
