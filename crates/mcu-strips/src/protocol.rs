//! Mackie Control wire protocol
//!
//! Static switch/encoder ID tables, inbound event parsing (via midly) and
//! outbound message encoding. Everything in here is stateless; the
//! controller decides *what* to send, this module only knows *how*.
//!
//! # Message layout
//!
//! ```text
//! Indicator LED      90 <switch id> <00|7F>
//! Rotary LED ring    B0 <30 + strip> <ring value>
//! 7-segment char     B0 <4A|4B> <segment code>
//! Display row        F0 00 00 66 <dt> 12 <offset> <chars...> F7
//! Aux display row    F0 00 00 66 <dt> 13 <offset> <chars...> F7
//! Strip colours      F0 00 02 4E 16 14 <r g b>... F7
//! Channel meter      F0 00 00 66 <dt> 20 <strip> <mode> F7
//! ```

use midly::live::LiveEvent;
use midly::MidiMessage;

pub const NOTE_ON_STATUS: u8 = 0x90;
pub const CC_STATUS: u8 = 0xB0;

pub const BUTTON_STATE_ON: u8 = 127;
pub const BUTTON_STATE_OFF: u8 = 0;

// Assignment section
pub const SID_ASSIGNMENT_IO: u8 = 0x28;
pub const SID_ASSIGNMENT_SENDS: u8 = 0x29;
pub const SID_ASSIGNMENT_PAN: u8 = 0x2A;
pub const SID_ASSIGNMENT_PLUG_INS: u8 = 0x2B;
/// EQ switch, used as "previous page"
pub const SID_ASSIGNMENT_EQ: u8 = 0x2C;
/// Dynamics switch, used as "next page"
pub const SID_ASSIGNMENT_DYNAMIC: u8 = 0x2D;

// Fader bank section
pub const SID_FADERBANK_PREV_BANK: u8 = 0x2E;
pub const SID_FADERBANK_NEXT_BANK: u8 = 0x2F;
pub const SID_FADERBANK_PREV_CH: u8 = 0x30;
pub const SID_FADERBANK_NEXT_CH: u8 = 0x31;
pub const SID_FADERBANK_FLIP: u8 = 0x32;
/// Global view / edit switch, used to toggle return-track viewing
pub const SID_FADERBANK_EDIT: u8 = 0x33;

/// Name/Value switch, used to toggle meter display
pub const SID_DISPLAY_NAME_VALUE: u8 = 0x34;
/// F1 soft key, selects (and indicates) the combined mode
pub const SID_SOFTWARE_F1: u8 = 0x36;
pub const SID_MOD_SHIFT: u8 = 0x46;
pub const SELECT_RUDE_SOLO: u8 = 0x73;

/// First rotary-press note; strip N presses `SID_VPOD_PUSH_BASE + N`
pub const SID_VPOD_PUSH_BASE: u8 = 0x20;
/// First fader-touch note
pub const SID_FADER_TOUCH_BASE: u8 = 0x68;
/// First rotary-rotation CC
pub const CC_VPOT_ROTATION_BASE: u8 = 0x10;
/// First rotary LED ring CC
pub const CC_VPOT_RING_BASE: u8 = 0x30;

/// Per-unit strip IDs are laid out in blocks of eight
pub const MAX_STRIPS_PER_UNIT: u8 = 8;

/// Ring value with every LED of the ring lit
pub const VPOT_RING_FULL: u8 = (VPOT_DISPLAY_WRAP << 4) | 0x0B;
/// Ring value with the ring dark
pub const VPOT_RING_UNLIT: u8 = VPOT_DISPLAY_WRAP << 4;

pub const VPOT_DISPLAY_SINGLE_DOT: u8 = 0;
pub const VPOT_DISPLAY_BOOST_CUT: u8 = 1;
pub const VPOT_DISPLAY_WRAP: u8 = 2;
pub const VPOT_DISPLAY_SPREAD: u8 = 3;

/// CCs of the two-character assignment display (left, right)
pub const CC_ASSIGNMENT_DISPLAY: [u8; 2] = [0x4B, 0x4A];

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;
pub const SYSEX_DEVICE_TYPE: u8 = 0x14;
pub const SYSEX_DEVICE_TYPE_XT: u8 = 0x15;
const SYSEX_MACKIE_HEADER: [u8; 4] = [0xF0, 0x00, 0x00, 0x66];
const SYSEX_COLOR_HEADER: [u8; 6] = [0xF0, 0x00, 0x02, 0x4E, 0x16, 0x14];
const SYSEX_CMD_DISPLAY: u8 = 0x12;
const SYSEX_CMD_AUX_DISPLAY: u8 = 0x13;
const SYSEX_CMD_METER_MODE: u8 = 0x20;

/// Characters per display row (8 strips x 7 characters)
pub const NUM_CHARS_PER_DISPLAY_LINE: usize = 56;
pub const METER_MODE_ON: u8 = 0x07;
pub const METER_MODE_OFF: u8 = 0x00;

/// Assignment switches, in the order their indicators are driven
pub const ASSIGNMENT_SWITCH_IDS: [u8; 5] = [
    SID_ASSIGNMENT_IO,
    SID_ASSIGNMENT_SENDS,
    SID_ASSIGNMENT_PAN,
    SID_ASSIGNMENT_PLUG_INS,
    SID_SOFTWARE_F1,
];

/// Control-section switches whose indicators the strip controller owns
pub const CONTROL_SWITCH_IDS: [u8; 4] = [
    SID_ASSIGNMENT_EQ,
    SID_ASSIGNMENT_DYNAMIC,
    SID_FADERBANK_FLIP,
    SID_FADERBANK_EDIT,
];

/// Logical event from one hardware unit
///
/// Strip-scoped events carry the strip's *local* index; the controller turns
/// that into a global strip index through the unit chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A switch changed state
    Switch { id: u8, pressed: bool },
    /// Rotary encoder moved, raw relative value (>= 64 means negative)
    RotaryTurn { strip: usize, value: u8 },
    /// Rotary encoder pushed
    RotaryPress { strip: usize },
    /// Fader touch sensor changed
    FaderTouch { strip: usize, touched: bool },
}

impl SurfaceEvent {
    /// Parse raw MIDI bytes from a unit into a surface event
    ///
    /// Returns `None` for anything the strip controller does not consume
    /// (fader positions, transport keys handled elsewhere, SysEx replies).
    pub fn parse(data: &[u8]) -> Option<Self> {
        let event = LiveEvent::parse(data).ok()?;
        let LiveEvent::Midi { message, .. } = event else {
            return None;
        };

        match message {
            MidiMessage::NoteOn { key, vel } => Self::from_note(key.as_int(), vel.as_int() > 0),
            MidiMessage::NoteOff { key, .. } => Self::from_note(key.as_int(), false),
            MidiMessage::Controller { controller, value } => {
                let cc = controller.as_int();
                if (CC_VPOT_ROTATION_BASE..CC_VPOT_ROTATION_BASE + MAX_STRIPS_PER_UNIT)
                    .contains(&cc)
                {
                    Some(Self::RotaryTurn {
                        strip: (cc - CC_VPOT_ROTATION_BASE) as usize,
                        value: value.as_int(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn from_note(note: u8, pressed: bool) -> Option<Self> {
        if (SID_VPOD_PUSH_BASE..SID_VPOD_PUSH_BASE + MAX_STRIPS_PER_UNIT).contains(&note) {
            // Rotary releases carry no meaning
            return pressed.then(|| Self::RotaryPress {
                strip: (note - SID_VPOD_PUSH_BASE) as usize,
            });
        }
        if (SID_FADER_TOUCH_BASE..SID_FADER_TOUCH_BASE + MAX_STRIPS_PER_UNIT).contains(&note) {
            return Some(Self::FaderTouch {
                strip: (note - SID_FADER_TOUCH_BASE) as usize,
                touched: pressed,
            });
        }
        Some(Self::Switch { id: note, pressed })
    }
}

/// Decode a relative rotary value into a single detent direction
pub fn rotary_direction(value: u8) -> i32 {
    if value >= 64 {
        -1
    } else {
        1
    }
}

/// Indicator LED message
pub fn indicator_message(switch_id: u8, on: bool) -> Vec<u8> {
    let value = if on { BUTTON_STATE_ON } else { BUTTON_STATE_OFF };
    vec![NOTE_ON_STATUS, switch_id, value]
}

/// Rotary LED ring message for a unit-local strip
pub fn ring_message(local_strip: usize, ring_value: u8) -> Vec<u8> {
    vec![CC_STATUS, CC_VPOT_RING_BASE + local_strip as u8, ring_value & 0x7F]
}

/// Map a character to the Mackie 7-segment character table
///
/// `@`..`_` occupy codes 0x00-0x1F, space..`?` keep their ASCII code.
/// Lowercase letters are shown as uppercase; anything else is blank.
pub fn seven_segment_code(c: char) -> u8 {
    let c = c.to_ascii_uppercase();
    if !c.is_ascii() {
        return 0x20;
    }
    let code = c as u8;
    match code {
        0x40..=0x5F => code - 0x40,
        0x20..=0x3F => code,
        _ => 0x20,
    }
}

/// SysEx display row update
///
/// `aux` selects the auxiliary (lower) display pair of a four-row unit.
/// Bytes are expected to be display-safe already (see `crate::display`).
pub fn display_message(device_type: u8, aux: bool, offset: u8, chars: &[u8]) -> Vec<u8> {
    let command = if aux {
        SYSEX_CMD_AUX_DISPLAY
    } else {
        SYSEX_CMD_DISPLAY
    };
    let mut message = Vec::with_capacity(chars.len() + 8);
    message.extend_from_slice(&SYSEX_MACKIE_HEADER);
    message.push(device_type);
    message.push(command);
    message.push(offset & 0x7F);
    message.extend(chars.iter().map(|b| b & 0x7F));
    message.push(SYSEX_END);
    message
}

/// SysEx strip colour update, one 7-bit RGB triple per strip
pub fn color_message(colors: &[[u8; 3]]) -> Vec<u8> {
    let mut message = Vec::with_capacity(colors.len() * 3 + 7);
    message.extend_from_slice(&SYSEX_COLOR_HEADER);
    for rgb in colors {
        message.extend(rgb.iter().map(|c| c & 0x7F));
    }
    message.push(SYSEX_END);
    message
}

/// SysEx channel meter mode for a unit-local strip
pub fn meter_mode_message(device_type: u8, local_strip: usize, enabled: bool) -> Vec<u8> {
    let mode = if enabled { METER_MODE_ON } else { METER_MODE_OFF };
    let mut message = Vec::with_capacity(9);
    message.extend_from_slice(&SYSEX_MACKIE_HEADER);
    message.extend_from_slice(&[
        device_type,
        SYSEX_CMD_METER_MODE,
        local_strip as u8 & 0x7F,
        mode,
        SYSEX_END,
    ]);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch_press_and_release() {
        assert_eq!(
            SurfaceEvent::parse(&[0x90, SID_ASSIGNMENT_SENDS, 0x7F]),
            Some(SurfaceEvent::Switch {
                id: SID_ASSIGNMENT_SENDS,
                pressed: true
            })
        );
        // Note On with velocity 0 is a release
        assert_eq!(
            SurfaceEvent::parse(&[0x90, SID_FADERBANK_FLIP, 0x00]),
            Some(SurfaceEvent::Switch {
                id: SID_FADERBANK_FLIP,
                pressed: false
            })
        );
    }

    #[test]
    fn test_parse_strip_events() {
        assert_eq!(
            SurfaceEvent::parse(&[0x90, 0x22, 0x7F]),
            Some(SurfaceEvent::RotaryPress { strip: 2 })
        );
        assert_eq!(
            SurfaceEvent::parse(&[0x90, 0x6F, 0x7F]),
            Some(SurfaceEvent::FaderTouch {
                strip: 7,
                touched: true
            })
        );
        assert_eq!(
            SurfaceEvent::parse(&[0xB0, 0x13, 0x41]),
            Some(SurfaceEvent::RotaryTurn { strip: 3, value: 0x41 })
        );
    }

    #[test]
    fn test_parse_ignores_unrelated_messages() {
        // Fader position (pitch bend)
        assert_eq!(SurfaceEvent::parse(&[0xE0, 0x00, 0x40]), None);
        // Unmapped CC
        assert_eq!(SurfaceEvent::parse(&[0xB0, 0x40, 0x01]), None);
        assert_eq!(SurfaceEvent::parse(&[]), None);
        // Rotary release
        assert_eq!(SurfaceEvent::parse(&[0x90, 0x22, 0x00]), None);
    }

    #[test]
    fn test_rotary_direction() {
        assert_eq!(rotary_direction(1), 1);
        assert_eq!(rotary_direction(63), 1);
        assert_eq!(rotary_direction(64), -1);
        assert_eq!(rotary_direction(65), -1);
    }

    #[test]
    fn test_seven_segment_table() {
        assert_eq!(seven_segment_code('A'), 0x01);
        assert_eq!(seven_segment_code('p'), 0x10);
        assert_eq!(seven_segment_code('0'), 0x30);
        assert_eq!(seven_segment_code(' '), 0x20);
        assert_eq!(seven_segment_code('\''), 0x27);
        assert_eq!(seven_segment_code('é'), 0x20);
    }

    #[test]
    fn test_display_message_layout() {
        let msg = display_message(SYSEX_DEVICE_TYPE_XT, false, 56, b"Volume ");
        assert_eq!(&msg[..7], &[0xF0, 0x00, 0x00, 0x66, 0x15, 0x12, 56]);
        assert_eq!(&msg[7..14], b"Volume ");
        assert_eq!(*msg.last().unwrap(), SYSEX_END);
    }

    #[test]
    fn test_ring_values() {
        assert_eq!(VPOT_RING_FULL, 0x2B);
        assert_eq!(VPOT_RING_UNLIT, 0x20);
        assert_eq!(ring_message(3, VPOT_RING_FULL), vec![0xB0, 0x33, 0x2B]);
    }
}
