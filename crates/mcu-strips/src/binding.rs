//! Parameter binding resolution
//!
//! For every global strip index and the current mode this decides which host
//! parameter the rotary drives and which the fader drives. Resolution is a
//! pure function of [`ControllerState`] plus a read-only host view, so it is
//! rerun from scratch after every state change.

use crate::config::DeviceBanks;
use crate::host::{DeviceId, HostModel, ParameterId, TrackId};
use crate::protocol::{VPOT_DISPLAY_BOOST_CUT, VPOT_DISPLAY_SINGLE_DOT, VPOT_DISPLAY_WRAP};
use crate::state::{
    AssignmentMode, CombinedLayout, CombinedRegion, ControllerState, PluginPaging, PluginSubMode,
};

/// A bound host parameter and the label shown for it
///
/// `parameter` may be `None` for label-only targets (a track without audio
/// output in the combined pan strip, a bank slot naming a missing parameter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub parameter: Option<ParameterId>,
    pub label: String,
    /// Rotary ring display style used when this target sits on the rotary
    pub ring_mode: u8,
}

impl Target {
    fn new(parameter: Option<ParameterId>, label: impl Into<String>, ring_mode: u8) -> Self {
        Self {
            parameter,
            label: label.into(),
            ring_mode,
        }
    }
}

/// Rotary and fader targets of one strip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripBinding {
    pub rotary: Option<Target>,
    pub fader: Option<Target>,
}

impl StripBinding {
    /// Rotary and fader exchanged
    pub fn swapped(&self) -> Self {
        Self {
            rotary: self.fader.clone(),
            fader: self.rotary.clone(),
        }
    }

    /// Binding actually applied to the controls
    pub fn effective(&self, flip_active: bool) -> Self {
        if flip_active {
            self.swapped()
        } else {
            self.clone()
        }
    }

    /// Target whose label/value the display shows
    ///
    /// The rotary-bound target normally; the fader-bound one while any fader
    /// is touched.
    pub fn display_target(&self, flip_active: bool, any_touched: bool) -> Option<&Target> {
        match (flip_active, any_touched) {
            (false, false) | (true, true) => self.rotary.as_ref(),
            (false, true) | (true, false) => self.fader.as_ref(),
        }
    }

    /// Target on the other control, shown on auxiliary display rows
    pub fn aux_target(&self, flip_active: bool, any_touched: bool) -> Option<&Target> {
        self.display_target(flip_active, !any_touched)
    }
}

/// One entry of a device's ordered parameter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedParameter {
    pub parameter: Option<ParameterId>,
    pub name: String,
}

/// Build the ordered parameter list of a device
///
/// Devices with a bank layout get their parameters in bank order, looked up
/// by name (names not found become empty slots). Others get every parameter
/// but the first, which is the device on/off switch.
pub fn order_parameters(
    host: &dyn HostModel,
    device: DeviceId,
    banks: &DeviceBanks,
) -> Vec<OrderedParameter> {
    let Some(info) = host.device(device) else {
        return Vec::new();
    };

    let named: Vec<_> = info
        .parameters
        .iter()
        .filter_map(|id| host.parameter(*id).map(|p| (*id, p.name)))
        .collect();

    match banks.get(&info.class_name) {
        Some(layout) => {
            log::debug!(
                "Binding: using {} bank(s) for device class '{}'",
                layout.len(),
                info.class_name
            );
            layout
                .iter()
                .flatten()
                .map(|wanted| match named.iter().find(|(_, name)| name == wanted) {
                    Some((id, name)) => OrderedParameter {
                        parameter: Some(*id),
                        name: name.clone(),
                    },
                    None => OrderedParameter {
                        parameter: None,
                        name: String::new(),
                    },
                })
                .collect()
        }
        None => named
            .into_iter()
            .skip(1)
            .map(|(id, name)| OrderedParameter {
                parameter: Some(id),
                name,
            })
            .collect(),
    }
}

/// Inputs to binding resolution that come from outside the state machine
pub struct BindingInputs<'a> {
    pub state: &'a ControllerState,
    pub strip_count: usize,
    /// Track assigned to each global strip (bank offset already applied)
    pub strip_tracks: &'a [Option<TrackId>],
    pub selected_track: Option<TrackId>,
    pub ordered_parameters: &'a [OrderedParameter],
}

/// Resolve the bindings of every strip, indexed by global strip index
pub fn resolve_all(host: &dyn HostModel, inputs: &BindingInputs<'_>) -> Vec<StripBinding> {
    let selected_sends = inputs
        .selected_track
        .and_then(|t| host.mixer(t))
        .map(|m| m.sends)
        .unwrap_or_default();
    let layout = CombinedLayout::new(inputs.strip_count, selected_sends.len());

    (0..inputs.strip_count)
        .map(|g| resolve_strip(host, inputs, &selected_sends, layout, g))
        .collect()
}

fn resolve_strip(
    host: &dyn HostModel,
    inputs: &BindingInputs<'_>,
    selected_sends: &[ParameterId],
    layout: CombinedLayout,
    global_index: usize,
) -> StripBinding {
    let strip_track = inputs.strip_tracks.get(global_index).copied().flatten();
    let state = inputs.state;

    match state.mode() {
        AssignmentMode::VolumePan => {
            let Some(track) = strip_track else {
                return StripBinding::default();
            };
            let audio = has_audio_output(host, track);
            let mixer = host.mixer(track).unwrap_or_default();
            StripBinding {
                rotary: audio.then(|| Target::new(mixer.panning, "Pan", VPOT_DISPLAY_BOOST_CUT)),
                fader: Some(Target::new(mixer.volume, "Volume", VPOT_DISPLAY_WRAP)),
            }
        }
        AssignmentMode::Sends => StripBinding {
            rotary: send_target(host, selected_sends, global_index + state.send_offset()),
            fader: strip_track.and_then(|t| volume_target(host, t, VPOT_DISPLAY_WRAP)),
        },
        AssignmentMode::Plugins(PluginPaging {
            sub: PluginSubMode::ChoosingDevice,
            ..
        }) => StripBinding::default(),
        AssignmentMode::Plugins(paging) => StripBinding {
            rotary: plugin_target(inputs.ordered_parameters, global_index + paging.parameter_offset),
            fader: strip_track.and_then(|t| volume_target(host, t, VPOT_DISPLAY_WRAP)),
        },
        AssignmentMode::InputOutput(_) => StripBinding {
            rotary: None,
            fader: strip_track.and_then(|t| volume_target(host, t, VPOT_DISPLAY_SINGLE_DOT)),
        },
        AssignmentMode::MultiCombined(paging) => {
            let Some(track) = inputs.selected_track else {
                return StripBinding::default();
            };
            let fader = volume_target(host, track, VPOT_DISPLAY_WRAP);
            match layout.region(global_index) {
                CombinedRegion::Pan => {
                    let name = host.track(track).map(|t| t.name).unwrap_or_default();
                    if has_audio_output(host, track) {
                        let panning = host.mixer(track).and_then(|m| m.panning);
                        StripBinding {
                            rotary: Some(Target::new(panning, name, VPOT_DISPLAY_BOOST_CUT)),
                            fader,
                        }
                    } else {
                        StripBinding {
                            rotary: Some(Target::new(None, name, VPOT_DISPLAY_SINGLE_DOT)),
                            fader: None,
                        }
                    }
                }
                CombinedRegion::Sends(i) => StripBinding {
                    rotary: send_target(host, selected_sends, i + state.send_offset()),
                    fader,
                },
                CombinedRegion::Plugins(i) => StripBinding {
                    rotary: match paging.sub {
                        PluginSubMode::ChoosingDevice => None,
                        PluginSubMode::ControllingParameters => plugin_target(
                            inputs.ordered_parameters,
                            i + paging.parameter_offset,
                        ),
                    },
                    fader,
                },
            }
        }
    }
}

fn has_audio_output(host: &dyn HostModel, track: TrackId) -> bool {
    host.track(track).map(|t| t.has_audio_output).unwrap_or(false)
}

/// Volume of a track with audio output
fn volume_target(host: &dyn HostModel, track: TrackId, ring_mode: u8) -> Option<Target> {
    if !has_audio_output(host, track) {
        return None;
    }
    let volume = host.mixer(track)?.volume;
    Some(Target::new(volume, "Volume", ring_mode))
}

fn send_target(host: &dyn HostModel, sends: &[ParameterId], index: usize) -> Option<Target> {
    let id = *sends.get(index)?;
    let name = host.parameter(id).map(|p| p.name).unwrap_or_default();
    Some(Target::new(Some(id), name, VPOT_DISPLAY_WRAP))
}

fn plugin_target(ordered: &[OrderedParameter], index: usize) -> Option<Target> {
    ordered
        .get(index)
        .map(|p| Target::new(p.parameter, p.name.clone(), VPOT_DISPLAY_WRAP))
}
