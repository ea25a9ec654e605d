//! Host application capability surface
//!
//! The strip controller never owns the host's object graph. It reads tracks,
//! devices and parameters through [`HostModel`] by id, writes parameter values
//! and routings back, and listens for structural changes through
//! [`Subscription`] guards.
//!
//! Ids are opaque handles. A lookup for an id that no longer exists returns
//! `None`, which is how stale references (a deleted device, a removed track)
//! are detected.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterId(pub u64);

/// Error type for host writes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Parameter {0:?} does not exist")]
    UnknownParameter(ParameterId),

    #[error("Track {0:?} does not exist")]
    UnknownTrack(TrackId),

    #[error("Routing target '{0}' is not available")]
    UnknownRoutingTarget(String),

    #[error("Parameter {0:?} is disabled")]
    ParameterDisabled(ParameterId),
}

/// Per-track properties the controller displays or reacts to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub name: String,
    /// Colour as 0xRRGGBB
    pub color: u32,
    pub solo: bool,
    pub has_audio_output: bool,
}

impl TrackInfo {
    /// Colour split into 7-bit components for the colour SysEx
    pub fn midi_rgb(&self) -> [u8; 3] {
        [
            ((self.color >> 16) & 0xFF) as u8 >> 1,
            ((self.color >> 8) & 0xFF) as u8 >> 1,
            (self.color & 0xFF) as u8 >> 1,
        ]
    }
}

/// Mixer section of a track
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixerInfo {
    pub volume: Option<ParameterId>,
    pub panning: Option<ParameterId>,
    /// One send per return track, in return-track order
    pub sends: Vec<ParameterId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    /// Device class, used to look up a parameter bank layout
    pub class_name: String,
    /// Parameters in declaration order; the first is conventionally on/off
    pub parameters: Vec<ParameterId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterInfo {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub default_value: f64,
    pub is_quantized: bool,
    pub is_enabled: bool,
    /// Host-formatted value, e.g. "-6.0 dB"
    pub display_value: String,
}

/// Which routing of a track an IO sub-mode edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKind {
    InputType,
    InputChannel,
    OutputType,
    OutputChannel,
}

/// Current routing plus the targets it may be set to, by display name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingInfo {
    pub current: Option<String>,
    pub available: Vec<String>,
}

/// A change notification the controller can listen for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Visible or return tracks added, removed or moved
    Tracks,
    SelectedTrack,
    TrackSolo(TrackId),
    TrackAudioOutput(TrackId),
    /// Device chain of a track changed
    TrackDevices(TrackId),
    DeviceParameters(DeviceId),
    DeviceName(DeviceId),
}

/// Notification delivered by the host for a subscribed [`Topic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    TracksChanged,
    SelectedTrackChanged,
    SoloChanged(TrackId),
    AudioOutputChanged(TrackId),
    DevicesChanged(TrackId),
    DeviceParametersChanged(DeviceId),
    DeviceNameChanged(DeviceId),
}

impl HostEvent {
    /// The topic a listener must hold to receive this event
    pub fn topic(&self) -> Topic {
        match *self {
            HostEvent::TracksChanged => Topic::Tracks,
            HostEvent::SelectedTrackChanged => Topic::SelectedTrack,
            HostEvent::SoloChanged(t) => Topic::TrackSolo(t),
            HostEvent::AudioOutputChanged(t) => Topic::TrackAudioOutput(t),
            HostEvent::DevicesChanged(t) => Topic::TrackDevices(t),
            HostEvent::DeviceParametersChanged(d) => Topic::DeviceParameters(d),
            HostEvent::DeviceNameChanged(d) => Topic::DeviceName(d),
        }
    }
}

/// Guard for one host listener registration
///
/// The listener is detached when the guard is dropped or [`release`]d,
/// whichever comes first.
///
/// [`release`]: Subscription::release
pub struct Subscription {
    topic: Topic,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(topic: Topic, release: impl FnOnce() + 'static) -> Self {
        Self {
            topic,
            release: Some(Box::new(release)),
        }
    }

    /// A subscription the host does not need to be told about dropping
    pub fn detached(topic: Topic) -> Self {
        Self {
            topic,
            release: None,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Detach now
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(release) = self.release.take() {
            log::trace!("Host: releasing subscription {:?}", self.topic);
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Read/write view of the host's mixing model
///
/// Implemented by the embedding application. All reads are by id and return
/// `None` for ids that have gone stale.
pub trait HostModel {
    /// Visible normal tracks, in mixer order
    fn visible_tracks(&self) -> Vec<TrackId>;

    fn return_tracks(&self) -> Vec<TrackId>;

    fn master_track(&self) -> Option<TrackId>;

    fn selected_track(&self) -> Option<TrackId>;

    fn track(&self, id: TrackId) -> Option<TrackInfo>;

    fn mixer(&self, id: TrackId) -> Option<MixerInfo>;

    /// Top-level devices of a track, in chain order
    fn devices(&self, track: TrackId) -> Vec<DeviceId>;

    fn device(&self, id: DeviceId) -> Option<DeviceInfo>;

    fn parameter(&self, id: ParameterId) -> Option<ParameterInfo>;

    fn routing(&self, track: TrackId, kind: RoutingKind) -> Option<RoutingInfo>;

    fn set_parameter_value(&mut self, id: ParameterId, value: f64) -> Result<(), HostError>;

    /// Set a routing by display name
    fn set_routing(&mut self, track: TrackId, kind: RoutingKind, target: &str)
        -> Result<(), HostError>;

    /// Start listening for a topic; the returned guard detaches on drop
    fn subscribe(&mut self, topic: Topic) -> Subscription;

    /// Ask the host to re-read the current control bindings
    fn request_control_remap(&mut self);
}
