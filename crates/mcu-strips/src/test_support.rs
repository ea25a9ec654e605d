//! In-memory host and output used by the unit tests
//!
//! Both types are cheap handles around shared state, so a test can hand one
//! clone to the controller and keep another to mutate the host or inspect
//! what was sent.

use crate::host::{
    DeviceId, DeviceInfo, HostError, HostModel, MixerInfo, ParameterId, ParameterInfo,
    RoutingInfo, RoutingKind, Subscription, Topic, TrackId, TrackInfo,
};
use crate::output::{OutputError, SurfaceOutput};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
struct HostState {
    next_id: u64,
    visible: Vec<TrackId>,
    returns: Vec<TrackId>,
    master: Option<TrackId>,
    selected: Option<TrackId>,
    tracks: HashMap<TrackId, TrackInfo>,
    mixers: HashMap<TrackId, MixerInfo>,
    devices: HashMap<TrackId, Vec<DeviceId>>,
    device_info: HashMap<DeviceId, DeviceInfo>,
    parameters: HashMap<ParameterId, ParameterInfo>,
    routings: HashMap<(TrackId, RoutingKind), RoutingInfo>,
    subscriptions: HashMap<Topic, usize>,
    remap_requests: usize,
}

impl HostState {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn add_parameter(&mut self, info: ParameterInfo) -> ParameterId {
        let id = ParameterId(self.id());
        self.parameters.insert(id, info);
        id
    }

    fn continuous(&mut self, name: &str, default_value: f64) -> ParameterId {
        self.add_parameter(ParameterInfo {
            name: name.to_string(),
            value: default_value,
            min: 0.0,
            max: 1.0,
            default_value,
            is_quantized: false,
            is_enabled: true,
            display_value: format!("{:.2}", default_value),
        })
    }

    fn add_track_inner(&mut self, name: &str, has_audio_output: bool) -> TrackId {
        let id = TrackId(self.id());
        let volume = self.continuous("Track Volume", 0.85);
        let panning = self.continuous("Track Panning", 0.5);
        let return_names: Vec<String> = self
            .returns
            .iter()
            .filter_map(|r| self.tracks.get(r).map(|t| t.name.clone()))
            .collect();
        let sends = return_names
            .iter()
            .map(|n| self.continuous(n, 0.0))
            .collect();
        self.tracks.insert(
            id,
            TrackInfo {
                name: name.to_string(),
                color: 0x00FF00,
                solo: false,
                has_audio_output,
            },
        );
        self.mixers.insert(
            id,
            MixerInfo {
                volume: Some(volume),
                panning: Some(panning),
                sends,
            },
        );
        id
    }
}

/// Scriptable [`HostModel`]
#[derive(Clone, Default)]
pub struct FakeHost {
    inner: Rc<RefCell<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        let host = Self::default();
        {
            let mut s = host.inner.borrow_mut();
            let master = s.add_track_inner("Master", true);
            s.master = Some(master);
        }
        host
    }

    /// Add a visible track with one send per existing return track
    pub fn add_track(&self, name: &str, has_audio_output: bool) -> TrackId {
        let mut s = self.inner.borrow_mut();
        let id = s.add_track_inner(name, has_audio_output);
        s.visible.push(id);
        id
    }

    pub fn add_tracks(&self, count: usize) -> Vec<TrackId> {
        (0..count)
            .map(|i| self.add_track(&format!("Track {}", i + 1), true))
            .collect()
    }

    /// Add a return track and a matching send on every existing track
    pub fn add_return(&self, name: &str) -> TrackId {
        let mut s = self.inner.borrow_mut();
        let id = s.add_track_inner(name, true);
        let existing: Vec<TrackId> = s.tracks.keys().copied().filter(|t| *t != id).collect();
        for track in existing {
            let send = s.continuous(name, 0.0);
            if let Some(mixer) = s.mixers.get_mut(&track) {
                mixer.sends.push(send);
            }
        }
        s.returns.push(id);
        id
    }

    pub fn remove_track(&self, id: TrackId) {
        let mut s = self.inner.borrow_mut();
        s.visible.retain(|t| *t != id);
        s.returns.retain(|t| *t != id);
        s.tracks.remove(&id);
        s.mixers.remove(&id);
        if s.selected == Some(id) {
            s.selected = None;
        }
    }

    pub fn select(&self, id: TrackId) {
        self.inner.borrow_mut().selected = Some(id);
    }

    pub fn set_solo(&self, id: TrackId, solo: bool) {
        if let Some(t) = self.inner.borrow_mut().tracks.get_mut(&id) {
            t.solo = solo;
        }
    }

    pub fn set_has_audio_output(&self, id: TrackId, has_audio_output: bool) {
        if let Some(t) = self.inner.borrow_mut().tracks.get_mut(&id) {
            t.has_audio_output = has_audio_output;
        }
    }

    /// Append a device; parameter names are in declaration order
    pub fn add_device(&self, track: TrackId, name: &str, class: &str, params: &[&str]) -> DeviceId {
        let mut s = self.inner.borrow_mut();
        let id = DeviceId(s.id());
        let parameters = params.iter().map(|p| s.continuous(p, 0.5)).collect();
        s.device_info.insert(
            id,
            DeviceInfo {
                name: name.to_string(),
                class_name: class.to_string(),
                parameters,
            },
        );
        s.devices.entry(track).or_default().push(id);
        id
    }

    pub fn add_devices(&self, track: TrackId, count: usize) -> Vec<DeviceId> {
        (0..count)
            .map(|i| self.add_device(track, &format!("Device {}", i + 1), "Plugin", &["On", "A", "B"]))
            .collect()
    }

    pub fn remove_device(&self, track: TrackId, device: DeviceId) {
        let mut s = self.inner.borrow_mut();
        if let Some(list) = s.devices.get_mut(&track) {
            list.retain(|d| *d != device);
        }
        s.device_info.remove(&device);
    }

    pub fn rename_device(&self, device: DeviceId, name: &str) {
        if let Some(d) = self.inner.borrow_mut().device_info.get_mut(&device) {
            d.name = name.to_string();
        }
    }

    pub fn set_parameter(&self, id: ParameterId, f: impl FnOnce(&mut ParameterInfo)) {
        if let Some(p) = self.inner.borrow_mut().parameters.get_mut(&id) {
            f(p);
        }
    }

    pub fn set_routing_options(&self, track: TrackId, kind: RoutingKind, current: Option<&str>, available: &[&str]) {
        self.inner.borrow_mut().routings.insert(
            (track, kind),
            RoutingInfo {
                current: current.map(str::to_string),
                available: available.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.inner
            .borrow()
            .subscriptions
            .get(&topic)
            .copied()
            .unwrap_or(0)
            > 0
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.borrow().subscriptions.values().sum()
    }

    pub fn remap_requests(&self) -> usize {
        self.inner.borrow().remap_requests
    }
}

impl HostModel for FakeHost {
    fn visible_tracks(&self) -> Vec<TrackId> {
        self.inner.borrow().visible.clone()
    }

    fn return_tracks(&self) -> Vec<TrackId> {
        self.inner.borrow().returns.clone()
    }

    fn master_track(&self) -> Option<TrackId> {
        self.inner.borrow().master
    }

    fn selected_track(&self) -> Option<TrackId> {
        self.inner.borrow().selected
    }

    fn track(&self, id: TrackId) -> Option<TrackInfo> {
        self.inner.borrow().tracks.get(&id).cloned()
    }

    fn mixer(&self, id: TrackId) -> Option<MixerInfo> {
        self.inner.borrow().mixers.get(&id).cloned()
    }

    fn devices(&self, track: TrackId) -> Vec<DeviceId> {
        self.inner
            .borrow()
            .devices
            .get(&track)
            .cloned()
            .unwrap_or_default()
    }

    fn device(&self, id: DeviceId) -> Option<DeviceInfo> {
        self.inner.borrow().device_info.get(&id).cloned()
    }

    fn parameter(&self, id: ParameterId) -> Option<ParameterInfo> {
        self.inner.borrow().parameters.get(&id).cloned()
    }

    fn routing(&self, track: TrackId, kind: RoutingKind) -> Option<RoutingInfo> {
        self.inner.borrow().routings.get(&(track, kind)).cloned()
    }

    fn set_parameter_value(&mut self, id: ParameterId, value: f64) -> Result<(), HostError> {
        let mut s = self.inner.borrow_mut();
        let p = s
            .parameters
            .get_mut(&id)
            .ok_or(HostError::UnknownParameter(id))?;
        p.value = value;
        p.display_value = format!("{:.2}", value);
        Ok(())
    }

    fn set_routing(&mut self, track: TrackId, kind: RoutingKind, target: &str) -> Result<(), HostError> {
        let mut s = self.inner.borrow_mut();
        let routing = s
            .routings
            .get_mut(&(track, kind))
            .ok_or(HostError::UnknownTrack(track))?;
        if !routing.available.iter().any(|t| t == target) {
            return Err(HostError::UnknownRoutingTarget(target.to_string()));
        }
        routing.current = Some(target.to_string());
        Ok(())
    }

    fn subscribe(&mut self, topic: Topic) -> Subscription {
        *self.inner.borrow_mut().subscriptions.entry(topic).or_default() += 1;
        let inner = Rc::clone(&self.inner);
        Subscription::new(topic, move || {
            if let Some(count) = inner.borrow_mut().subscriptions.get_mut(&topic) {
                *count = count.saturating_sub(1);
            }
        })
    }

    fn request_control_remap(&mut self) {
        self.inner.borrow_mut().remap_requests += 1;
    }
}

/// [`SurfaceOutput`] that records every message with its unit
#[derive(Clone, Default)]
pub struct RecordingOutput {
    messages: Rc<RefCell<Vec<(usize, Vec<u8>)>>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(usize, Vec<u8>)> {
        self.messages.borrow().clone()
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }

    /// Last value sent for a note-addressed indicator
    pub fn last_indicator(&self, switch_id: u8) -> Option<u8> {
        self.messages
            .borrow()
            .iter()
            .rev()
            .find(|(_, m)| m.len() == 3 && m[0] == 0x90 && m[1] == switch_id)
            .map(|(_, m)| m[2])
    }

    /// Last CC value sent on a unit
    pub fn last_cc(&self, unit: usize, cc: u8) -> Option<u8> {
        self.messages
            .borrow()
            .iter()
            .rev()
            .find(|(u, m)| *u == unit && m.len() == 3 && m[0] == 0xB0 && m[1] == cc)
            .map(|(_, m)| m[2])
    }

    /// SysEx display messages (row and aux commands)
    pub fn display_messages(&self) -> Vec<(usize, Vec<u8>)> {
        self.messages
            .borrow()
            .iter()
            .filter(|(_, m)| m.len() > 6 && m[0] == 0xF0 && m[3] == 0x66 && (m[5] == 0x12 || m[5] == 0x13))
            .cloned()
            .collect()
    }
}

impl SurfaceOutput for RecordingOutput {
    fn send(&mut self, unit: usize, message: &[u8]) -> Result<(), OutputError> {
        self.messages.borrow_mut().push((unit, message.to_vec()));
        Ok(())
    }
}
