//! Indicator LED and assignment display feedback
//!
//! Derives the state of every LED the strip controller owns from
//! [`ControllerState`], and de-duplicates outbound values so only changes go
//! over the wire.

use crate::protocol::{
    indicator_message, seven_segment_code, ASSIGNMENT_SWITCH_IDS, BUTTON_STATE_OFF,
    BUTTON_STATE_ON, CC_ASSIGNMENT_DISPLAY, CC_STATUS, SELECT_RUDE_SOLO, SID_ASSIGNMENT_DYNAMIC,
    SID_ASSIGNMENT_EQ, SID_ASSIGNMENT_IO, SID_ASSIGNMENT_PAN, SID_ASSIGNMENT_PLUG_INS,
    SID_ASSIGNMENT_SENDS, SID_FADERBANK_EDIT, SID_FADERBANK_FLIP, SID_SOFTWARE_F1,
};
use crate::state::{ControllerState, IoSubMode, ModeKind, PagingContext};
use std::collections::HashMap;

/// Switch whose LED marks the active assignment mode
pub fn mode_switch_id(mode: ModeKind) -> u8 {
    match mode {
        ModeKind::VolumePan => SID_ASSIGNMENT_PAN,
        ModeKind::Sends => SID_ASSIGNMENT_SENDS,
        ModeKind::Plugins => SID_ASSIGNMENT_PLUG_INS,
        ModeKind::InputOutput => SID_ASSIGNMENT_IO,
        ModeKind::MultiCombined => SID_SOFTWARE_F1,
    }
}

/// On/off state of every indicator the controller owns
///
/// Exactly one assignment LED is lit. Page LEDs show whether a page move in
/// that direction would do anything.
pub fn indicator_states(
    state: &ControllerState,
    paging: &PagingContext,
    any_solo: bool,
) -> Vec<(u8, bool)> {
    let active = mode_switch_id(state.kind());
    let mut leds: Vec<(u8, bool)> = ASSIGNMENT_SWITCH_IDS
        .iter()
        .map(|id| (*id, *id == active))
        .collect();

    leds.extend([
        (SID_ASSIGNMENT_EQ, state.can_page_prev(paging)),
        (SID_ASSIGNMENT_DYNAMIC, state.can_page_next(paging)),
        (SID_FADERBANK_FLIP, state.flip_active()),
        (SID_FADERBANK_EDIT, state.view_returns()),
        (SELECT_RUDE_SOLO, any_solo),
    ]);
    leds
}

/// Where the selected track sits in the host's track collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedPosition {
    Visible(usize),
    Return(usize),
    Master,
    Unknown,
}

/// Two characters for the 7-segment assignment display
pub fn assignment_chars(state: &ControllerState, selected: SelectedPosition) -> [char; 2] {
    match state.kind() {
        ModeKind::VolumePan => ['P', 'N'],
        ModeKind::MultiCombined => ['M', 'C'],
        ModeKind::Sends | ModeKind::Plugins => match selected {
            SelectedPosition::Visible(i) => {
                let number = (i + 1).min(99);
                let digit = |d: usize| char::from(b'0' + d as u8);
                [digit(number / 10), digit(number % 10)]
            }
            SelectedPosition::Return(i) => ['R', char::from(b'A' + (i % 26) as u8)],
            SelectedPosition::Master => ['M', 'A'],
            SelectedPosition::Unknown => [' ', ' '],
        },
        ModeKind::InputOutput => match state.io_sub().unwrap_or_default() {
            IoSubMode::InputMain => ['I', '\''],
            IoSubMode::InputSub => ['I', ','],
            IoSubMode::OutputMain => ['0', '\''],
            IoSubMode::OutputSub => ['0', ','],
        },
    }
}

/// Outbound LED/display value address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedAddress {
    /// Note-addressed indicator
    Switch(u8),
    /// CC-addressed output (assignment display digits)
    Cc(u8),
}

impl LedAddress {
    /// Message setting this address to `value`
    pub fn message(self, value: u8) -> Vec<u8> {
        match self {
            LedAddress::Switch(id) => indicator_message(id, value != BUTTON_STATE_OFF),
            LedAddress::Cc(cc) => vec![CC_STATUS, cc, value],
        }
    }
}

/// Messages for the assignment display
pub fn assignment_display_updates(chars: [char; 2]) -> [(LedAddress, u8); 2] {
    [
        (LedAddress::Cc(CC_ASSIGNMENT_DISPLAY[0]), seven_segment_code(chars[0])),
        (LedAddress::Cc(CC_ASSIGNMENT_DISPLAY[1]), seven_segment_code(chars[1])),
    ]
}

/// Indicator updates as (address, value) pairs
pub fn indicator_updates(leds: &[(u8, bool)]) -> Vec<(LedAddress, u8)> {
    leds.iter()
        .map(|(id, on)| {
            let value = if *on { BUTTON_STATE_ON } else { BUTTON_STATE_OFF };
            (LedAddress::Switch(*id), value)
        })
        .collect()
}

/// Tracks last sent values to avoid redundant messages
#[derive(Debug, Default)]
pub struct FeedbackChangeTracker {
    last_values: HashMap<LedAddress, u8>,
}

impl FeedbackChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(value)` if the value changed (should send), `None` if unchanged
    pub fn update(&mut self, address: LedAddress, value: u8) -> Option<u8> {
        if self.last_values.get(&address) == Some(&value) {
            None
        } else {
            self.last_values.insert(address, value);
            Some(value)
        }
    }

    /// Forget a value, e.g. after a send failed
    pub fn forget(&mut self, address: LedAddress) {
        self.last_values.remove(&address);
    }

    pub fn clear(&mut self) {
        self.last_values.clear();
    }

    #[cfg(test)]
    pub fn tracked_addresses(&self) -> impl Iterator<Item = &LedAddress> {
        self.last_values.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CONTROL_SWITCH_IDS;

    fn paging() -> PagingContext {
        PagingContext {
            strip_count: 8,
            device_count: 12,
            ..Default::default()
        }
    }

    fn lit(leds: &[(u8, bool)], id: u8) -> bool {
        leds.iter().find(|(i, _)| *i == id).map(|(_, on)| *on).unwrap()
    }

    #[test]
    fn test_feedback_change_tracker() {
        let mut tracker = FeedbackChangeTracker::new();
        let addr = LedAddress::Switch(SID_FADERBANK_FLIP);

        assert_eq!(tracker.update(addr, 127), Some(127));
        assert_eq!(tracker.update(addr, 127), None);
        assert_eq!(tracker.update(addr, 0), Some(0));
        tracker.forget(addr);
        assert_eq!(tracker.update(addr, 0), Some(0));
        assert_eq!(tracker.tracked_addresses().count(), 1);
    }

    #[test]
    fn test_exactly_one_mode_led() {
        for kind in [
            ModeKind::VolumePan,
            ModeKind::Sends,
            ModeKind::Plugins,
            ModeKind::InputOutput,
            ModeKind::MultiCombined,
        ] {
            let state = ControllerState::new(kind);
            let leds = indicator_states(&state, &paging(), false);
            let on: Vec<_> = leds
                .iter()
                .filter(|(id, on)| *on && ASSIGNMENT_SWITCH_IDS.contains(id))
                .collect();
            assert_eq!(on.len(), 1);
            assert_eq!(on[0].0, mode_switch_id(kind));
        }
    }

    #[test]
    fn test_every_owned_indicator_is_driven() {
        let leds = indicator_states(&ControllerState::default(), &paging(), false);
        for id in ASSIGNMENT_SWITCH_IDS.iter().chain(CONTROL_SWITCH_IDS.iter()) {
            assert!(leds.iter().any(|(i, _)| i == id));
        }
        assert!(!lit(&leds, SELECT_RUDE_SOLO));
    }

    #[test]
    fn test_page_and_solo_leds() {
        let state = ControllerState::new(ModeKind::Plugins);
        let leds = indicator_states(&state, &paging(), true);
        assert!(!lit(&leds, SID_ASSIGNMENT_EQ));
        assert!(lit(&leds, SID_ASSIGNMENT_DYNAMIC));
        assert!(lit(&leds, SELECT_RUDE_SOLO));
        // Flip is forbidden while choosing a device
        assert!(!lit(&leds, SID_FADERBANK_FLIP));
    }

    #[test]
    fn test_assignment_chars() {
        let sends = ControllerState::new(ModeKind::Sends);
        assert_eq!(assignment_chars(&sends, SelectedPosition::Visible(0)), ['0', '1']);
        assert_eq!(assignment_chars(&sends, SelectedPosition::Visible(150)), ['9', '9']);
        assert_eq!(assignment_chars(&sends, SelectedPosition::Return(1)), ['R', 'B']);
        assert_eq!(assignment_chars(&sends, SelectedPosition::Master), ['M', 'A']);

        let mut io = ControllerState::new(ModeKind::InputOutput);
        assert_eq!(assignment_chars(&io, SelectedPosition::Unknown), ['I', '\'']);
        io.enter_mode(ModeKind::InputOutput);
        io.enter_mode(ModeKind::InputOutput);
        assert_eq!(assignment_chars(&io, SelectedPosition::Unknown), ['0', '\'']);

        let pan = ControllerState::default();
        assert_eq!(assignment_chars(&pan, SelectedPosition::Master), ['P', 'N']);
    }

    #[test]
    fn test_led_address_messages() {
        assert_eq!(LedAddress::Switch(0x32).message(127), vec![0x90, 0x32, 0x7F]);
        assert_eq!(LedAddress::Cc(0x4A).message(0x10), vec![0xB0, 0x4A, 0x10]);
        let updates = assignment_display_updates(['P', 'N']);
        assert_eq!(updates[0], (LedAddress::Cc(0x4B), 0x10));
        assert_eq!(updates[1], (LedAddress::Cc(0x4A), 0x0E));
    }
}
