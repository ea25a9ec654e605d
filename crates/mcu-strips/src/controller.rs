//! Strip controller
//!
//! Owns the [`ControllerState`] and drives everything derived from it. Surface
//! events and host notifications enter through [`StripController::handle_event`]
//! and [`StripController::handle_host_event`]; each handler recomputes bindings,
//! display content and LEDs and emits the changes before it returns.

use crate::addressing::Chain;
use crate::binding::{
    order_parameters, resolve_all, BindingInputs, OrderedParameter, StripBinding, Target,
};
use crate::config::{DeviceBanks, SurfaceConfig};
use crate::display::{DisplayFrame, DisplayParameter, DisplayPipeline};
use crate::feedback::{
    assignment_chars, assignment_display_updates, indicator_states, indicator_updates,
    FeedbackChangeTracker, LedAddress, SelectedPosition,
};
use crate::host::{DeviceId, HostEvent, HostModel, ParameterId, Subscription, Topic, TrackId};
use crate::output::{send_logged, SurfaceOutput};
use crate::protocol::{
    indicator_message, meter_mode_message, ring_message, rotary_direction, SurfaceEvent,
    ASSIGNMENT_SWITCH_IDS, CONTROL_SWITCH_IDS, SELECT_RUDE_SOLO, SID_ASSIGNMENT_DYNAMIC,
    SID_ASSIGNMENT_EQ, SID_ASSIGNMENT_IO, SID_ASSIGNMENT_PAN, SID_ASSIGNMENT_PLUG_INS,
    SID_ASSIGNMENT_SENDS, SID_DISPLAY_NAME_VALUE, SID_FADERBANK_EDIT, SID_FADERBANK_FLIP,
    SID_FADERBANK_NEXT_BANK, SID_FADERBANK_NEXT_CH, SID_FADERBANK_PREV_BANK,
    SID_FADERBANK_PREV_CH, SID_MOD_SHIFT, SID_SOFTWARE_F1, VPOT_RING_FULL, VPOT_RING_UNLIT,
};
use crate::state::{
    AssignmentMode, CombinedLayout, CombinedRegion, ControllerState, ModeKind, PagingContext,
    PluginSubMode,
};

/// Host listeners held by the controller, one slot per concern
#[derive(Default)]
struct HostSubscriptions {
    tracks: Option<Subscription>,
    selected_track: Option<Subscription>,
    /// Solo and audio-output listeners of every normal and return track
    per_track: Vec<Subscription>,
    /// Device chain of the selected track
    selected_devices: Option<Subscription>,
    chosen_parameters: Option<Subscription>,
    /// Names of the devices currently on the display
    device_names: Vec<Subscription>,
}

impl HostSubscriptions {
    fn holds(&self, topic: Topic) -> bool {
        self.tracks
            .iter()
            .chain(&self.selected_track)
            .chain(&self.per_track)
            .chain(&self.selected_devices)
            .chain(&self.chosen_parameters)
            .chain(&self.device_names)
            .any(|s| s.topic() == topic)
    }

    fn count(&self) -> usize {
        self.tracks.iter().count()
            + self.selected_track.iter().count()
            + self.per_track.len()
            + self.selected_devices.iter().count()
            + self.chosen_parameters.iter().count()
            + self.device_names.len()
    }
}

/// Maps a chain of Mackie Control units onto a host mixing model
pub struct StripController<H: HostModel, O: SurfaceOutput> {
    host: H,
    out: O,
    chain: Chain,
    state: ControllerState,
    display: DisplayPipeline,
    feedback: FeedbackChangeTracker,
    device_banks: DeviceBanks,
    follow_selection: bool,
    subs: HostSubscriptions,
    /// Track whose device chain `subs.selected_devices` listens to
    attached_track: Option<TrackId>,
    chosen_plugin: Option<DeviceId>,
    ordered_parameters: Vec<OrderedParameter>,
    bindings: Vec<StripBinding>,
    /// Other control's target per strip, for auxiliary display rows
    aux: Vec<Option<DisplayParameter>>,
    /// Device shown on each strip while choosing a device
    displayed_devices: Vec<Option<DeviceId>>,
    /// Meter state last sent to the strips
    meters_sent: Option<bool>,
    torn_down: bool,
}

impl<H: HostModel, O: SurfaceOutput> StripController<H, O> {
    /// Attach to the host and send the complete initial surface state
    pub fn new(host: H, out: O, config: &SurfaceConfig) -> Self {
        let chain = config.chain();
        let display = DisplayPipeline::new(&chain);

        let mut controller = Self {
            host,
            out,
            chain,
            state: ControllerState::new(config.initial_mode),
            display,
            feedback: FeedbackChangeTracker::new(),
            device_banks: config.effective_device_banks(),
            follow_selection: config.follow_selection,
            subs: HostSubscriptions::default(),
            attached_track: None,
            chosen_plugin: None,
            ordered_parameters: Vec::new(),
            bindings: Vec::new(),
            aux: Vec::new(),
            displayed_devices: Vec::new(),
            meters_sent: None,
            torn_down: false,
        };

        controller.subs.tracks = Some(controller.host.subscribe(Topic::Tracks));
        controller.subs.selected_track = Some(controller.host.subscribe(Topic::SelectedTrack));
        controller.sync_track_subscriptions();
        controller.attach_selected_track();
        controller.follow_selected_track();
        controller.apply_mode();
        controller.render();

        log::info!(
            "Surface: controller started with {} unit(s), {} strip(s), mode {:?}",
            controller.chain.units().len(),
            controller.chain.strip_count(),
            controller.state.kind()
        );
        controller
    }

    /// Release every host listener, switch off owned LEDs and show the
    /// offline banner. Later writes are dropped.
    pub fn shutdown(&mut self) {
        if self.torn_down {
            return;
        }
        self.subs = HostSubscriptions::default();
        self.chosen_plugin = None;

        let center = self.chain.center_position();
        for id in ASSIGNMENT_SWITCH_IDS
            .iter()
            .chain(CONTROL_SWITCH_IDS.iter())
            .chain(std::iter::once(&SELECT_RUDE_SOLO))
        {
            send_logged(&mut self.out, center, &indicator_message(*id, false));
        }
        for (address, value) in assignment_display_updates([' ', ' ']) {
            send_logged(&mut self.out, center, &address.message(value));
        }
        self.display.show_offline(&self.chain, &mut self.out);
        self.feedback.clear();
        self.torn_down = true;
        log::info!("Surface: controller shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.torn_down
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    /// Resolved bindings per global strip, before flip
    pub fn bindings(&self) -> &[StripBinding] {
        &self.bindings
    }

    /// Bindings as applied to the physical controls
    pub fn effective_bindings(&self) -> Vec<StripBinding> {
        let flip = self.state.flip_active();
        self.bindings.iter().map(|b| b.effective(flip)).collect()
    }

    pub fn chosen_plugin(&self) -> Option<DeviceId> {
        self.chosen_plugin
    }

    pub fn ordered_parameters(&self) -> &[OrderedParameter] {
        &self.ordered_parameters
    }

    /// Number of host listeners currently held
    pub fn subscription_count(&self) -> usize {
        self.subs.count()
    }

    /// Dispatch one event from the unit at chain position `unit`
    pub fn handle_event(&mut self, unit: usize, event: SurfaceEvent) {
        if self.torn_down {
            log::trace!("Surface: ignoring {:?} after shutdown", event);
            return;
        }
        log::trace!("Surface: unit {} event {:?}", unit, event);
        match event {
            SurfaceEvent::Switch { id, pressed } => self.handle_switch(id, pressed),
            SurfaceEvent::RotaryTurn { strip, value } => match self.chain.global_index(unit, strip) {
                Ok(g) => self.handle_rotary_turn(g, value),
                Err(e) => log::debug!("Surface: ignoring rotary turn: {}", e),
            },
            SurfaceEvent::RotaryPress { strip } => match self.chain.global_index(unit, strip) {
                Ok(g) => self.handle_rotary_press(g),
                Err(e) => log::debug!("Surface: ignoring rotary press: {}", e),
            },
            SurfaceEvent::FaderTouch { strip, touched } => {
                match self.chain.global_index(unit, strip) {
                    Ok(g) => self.handle_fader_touch(g, touched),
                    Err(e) => log::debug!("Surface: ignoring fader touch: {}", e),
                }
            }
        }
        self.render();
    }

    /// React to a host notification; events for topics not held are ignored
    pub fn handle_host_event(&mut self, event: HostEvent) {
        if self.torn_down || !self.subs.holds(event.topic()) {
            log::trace!("Surface: ignoring unsubscribed host event {:?}", event);
            return;
        }
        log::debug!("Surface: host event {:?}", event);

        match event {
            HostEvent::TracksChanged => self.on_tracks_changed(),
            HostEvent::SelectedTrackChanged => self.on_selected_track_changed(),
            HostEvent::SoloChanged(_) => self.update_leds(),
            HostEvent::AudioOutputChanged(_) => {
                self.rebind();
                self.request_remap();
            }
            HostEvent::DevicesChanged(_) => self.on_devices_changed(),
            HostEvent::DeviceParametersChanged(device) => {
                if self.chosen_plugin == Some(device) {
                    self.ordered_parameters =
                        order_parameters(&self.host, device, &self.device_banks);
                    self.rebind();
                    self.update_leds();
                    self.request_remap();
                }
            }
            HostEvent::DeviceNameChanged(_) => self.update_strip_strings(),
        }
        self.render();
    }

    /// Periodic refresh: pick up routing/name changes and flush the displays
    pub fn tick(&mut self) {
        if self.torn_down {
            return;
        }
        self.update_strip_strings();
        self.render();
    }

    /// Switch assignment mode; pressing IO again cycles the IO sub-mode
    pub fn set_mode(&mut self, kind: ModeKind) {
        let entry = self.state.enter_mode(kind);
        if entry.io_advanced {
            log::debug!("Surface: IO sub-mode now {:?}", self.state.io_sub());
        } else {
            log::debug!("Surface: mode {:?} -> {:?}", entry.previous, kind);
        }
        self.apply_mode();
        self.render();
    }

    pub fn toggle_flip(&mut self) {
        if !self.state.toggle_flip() {
            log::debug!("Surface: flip not available in {:?}", self.state.mode());
            return;
        }
        self.rebind();
        self.update_leds();
        self.request_remap();
        self.render();
    }

    pub fn toggle_view_returns(&mut self) {
        self.state.toggle_view_returns();
        self.display.invalidate();
        // Re-clamp the newly active offset; the collection may have shrunk
        self.set_channel_offset(self.state.channel_offset() as i64);
        self.update_leds();
        self.render();
    }

    /// Set the bank offset of the controlled track collection, clamped
    pub fn set_channel_offset(&mut self, requested: i64) -> usize {
        let count = self.controlled_tracks().len();
        let strips = self.chain.strip_count();
        let offset = self.state.set_channel_offset(requested, count, strips);
        log::debug!(
            "Surface: channel offset {} (requested {}, {} tracks)",
            offset,
            requested,
            count
        );
        self.display.set_channel_offset(offset);
        self.rebind();
        self.update_strip_strings();
        self.request_remap();
        self.render();
        offset
    }

    pub fn bank_left(&mut self) {
        let strips = self.chain.strip_count() as i64;
        let offset = self.state.channel_offset() as i64;
        if self.state.shift_held() {
            self.set_channel_offset(0);
        } else {
            self.set_channel_offset(offset - strips);
        }
    }

    pub fn bank_right(&mut self) {
        let strips = self.chain.strip_count() as i64;
        let offset = self.state.channel_offset() as i64;
        let count = self.controlled_tracks().len() as i64;
        if strips == 0 {
            return;
        }
        if self.state.shift_held() {
            let mut last = ((count - offset) / strips) * strips + offset;
            if last == count {
                last -= strips;
            }
            self.set_channel_offset(last);
        } else if offset < count - strips {
            self.set_channel_offset(offset + strips);
        }
    }

    pub fn channel_left(&mut self) {
        let offset = self.state.channel_offset() as i64;
        if self.state.shift_held() {
            self.set_channel_offset(0);
        } else {
            self.set_channel_offset(offset - 1);
        }
    }

    pub fn channel_right(&mut self) {
        let strips = self.chain.strip_count() as i64;
        let offset = self.state.channel_offset() as i64;
        let count = self.controlled_tracks().len() as i64;
        if self.state.shift_held() {
            self.set_channel_offset(count - strips);
        } else if offset < count - strips {
            self.set_channel_offset(offset + 1);
        }
    }

    pub fn page_prev(&mut self) {
        let ctx = self.paging_context();
        if self.state.page_prev(&ctx) {
            self.after_page_change();
        }
    }

    pub fn page_next(&mut self) {
        let ctx = self.paging_context();
        if self.state.page_next(&ctx) {
            self.after_page_change();
        }
    }

    pub fn toggle_meter_mode(&mut self) {
        self.state.toggle_meters();
        log::debug!("Surface: meters enabled = {}", self.state.meters_enabled());
        self.apply_meter_mode();
        self.render();
    }

    fn after_page_change(&mut self) {
        log::debug!(
            "Surface: page moved, plugin paging {:?}, send offset {}",
            self.state.plugin_paging(),
            self.state.send_offset()
        );
        self.rebind();
        self.update_strip_strings();
        self.update_leds();
        self.update_rings();
        self.request_remap();
        self.render();
    }

    fn handle_switch(&mut self, id: u8, pressed: bool) {
        if id == SID_MOD_SHIFT {
            self.state.set_shift_held(pressed);
            return;
        }
        if !pressed {
            return;
        }
        match id {
            SID_ASSIGNMENT_IO => self.set_mode(ModeKind::InputOutput),
            SID_ASSIGNMENT_SENDS => self.set_mode(ModeKind::Sends),
            SID_ASSIGNMENT_PAN => self.set_mode(ModeKind::VolumePan),
            SID_ASSIGNMENT_PLUG_INS => self.set_mode(ModeKind::Plugins),
            SID_SOFTWARE_F1 => self.set_mode(ModeKind::MultiCombined),
            SID_ASSIGNMENT_EQ => self.page_prev(),
            SID_ASSIGNMENT_DYNAMIC => self.page_next(),
            SID_FADERBANK_PREV_BANK => self.bank_left(),
            SID_FADERBANK_NEXT_BANK => self.bank_right(),
            SID_FADERBANK_PREV_CH => self.channel_left(),
            SID_FADERBANK_NEXT_CH => self.channel_right(),
            SID_FADERBANK_FLIP => self.toggle_flip(),
            SID_FADERBANK_EDIT => self.toggle_view_returns(),
            SID_DISPLAY_NAME_VALUE => self.toggle_meter_mode(),
            _ => log::trace!("Surface: switch 0x{:02X} not handled here", id),
        }
    }

    /// Only IO mode handles turns itself; every other binding is applied by
    /// the host after a remap
    fn handle_rotary_turn(&mut self, global_index: usize, value: u8) {
        let AssignmentMode::InputOutput(io) = self.state.mode() else {
            return;
        };
        let Some(track) = self.strip_track(global_index) else {
            return;
        };
        let kind = io.routing_kind();
        let Some(routing) = self.host.routing(track, kind) else {
            return;
        };

        let mut available: Vec<String> = Vec::with_capacity(routing.available.len());
        for target in routing.available {
            if !available.contains(&target) {
                available.push(target);
            }
        }
        if available.is_empty() {
            return;
        }

        let position = routing
            .current
            .as_ref()
            .and_then(|c| available.iter().position(|a| a == c));
        let index = match position {
            Some(i) if rotary_direction(value) > 0 => (i + 1).min(available.len() - 1),
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        if position == Some(index) {
            return;
        }

        let target = &available[index];
        log::debug!("Surface: routing {:?} of {:?} -> '{}'", kind, track, target);
        if let Err(e) = self.host.set_routing(track, kind, target) {
            log::warn!("Surface: failed to set routing: {}", e);
        }
        self.update_strip_strings();
    }

    fn handle_rotary_press(&mut self, global_index: usize) {
        match self.state.mode() {
            AssignmentMode::VolumePan | AssignmentMode::Sends => {
                self.reset_bound_parameter(global_index)
            }
            AssignmentMode::Plugins(paging) => match paging.sub {
                PluginSubMode::ChoosingDevice => {
                    self.choose_device(global_index + paging.device_offset)
                }
                PluginSubMode::ControllingParameters => self.reset_bound_parameter(global_index),
            },
            AssignmentMode::MultiCombined(paging) => {
                match self.combined_layout().region(global_index) {
                    CombinedRegion::Pan | CombinedRegion::Sends(_) => {
                        self.reset_bound_parameter(global_index)
                    }
                    CombinedRegion::Plugins(i) => match paging.sub {
                        PluginSubMode::ChoosingDevice => self.choose_device(i + paging.device_offset),
                        PluginSubMode::ControllingParameters => {
                            self.reset_bound_parameter(global_index)
                        }
                    },
                }
            }
            AssignmentMode::InputOutput(_) => {}
        }
    }

    fn handle_fader_touch(&mut self, global_index: usize, touched: bool) {
        if self.chain.set_touched(global_index, touched) {
            self.update_display_parameters();
        }
    }

    /// Quantized parameters step up and wrap, continuous ones go to default
    fn reset_bound_parameter(&mut self, global_index: usize) {
        let flip = self.state.flip_active();
        let Some(id) = self
            .bindings
            .get(global_index)
            .and_then(|b| b.effective(flip).rotary)
            .and_then(|t| t.parameter)
        else {
            return;
        };
        let Some(info) = self.host.parameter(id) else {
            return;
        };
        if !info.is_enabled {
            log::debug!("Surface: '{}' is disabled, not resetting", info.name);
            return;
        }

        let value = if info.is_quantized {
            if info.value + 1.0 > info.max {
                info.min
            } else {
                info.value + 1.0
            }
        } else {
            info.default_value
        };
        if let Err(e) = self.host.set_parameter_value(id, value) {
            log::warn!("Surface: failed to reset '{}': {}", info.name, e);
        }
    }

    fn choose_device(&mut self, device_index: usize) {
        let devices = self.selected_devices();
        let Some(&device) = devices.get(device_index) else {
            log::debug!(
                "Surface: no device at index {} ({} on track)",
                device_index,
                devices.len()
            );
            return;
        };

        self.chosen_plugin = Some(device);
        self.subs.chosen_parameters = self.subscribe(Topic::DeviceParameters(device));
        self.ordered_parameters = order_parameters(&self.host, device, &self.device_banks);
        self.state.start_parameter_control();
        self.subs.device_names.clear();
        self.displayed_devices.clear();
        log::debug!(
            "Surface: controlling {:?} ({} parameters)",
            device,
            self.ordered_parameters.len()
        );

        self.rebind();
        self.update_leds();
        self.request_remap();
    }

    fn drop_chosen_plugin(&mut self) {
        self.chosen_plugin = None;
        self.subs.chosen_parameters = None;
        self.ordered_parameters.clear();
    }

    fn on_tracks_changed(&mut self) {
        self.sync_track_subscriptions();
        let returns = self.host.return_tracks().len();
        if self.state.revalidate_send_offset(returns) {
            log::debug!("Surface: send page reset, {} return track(s)", returns);
        }

        let normal = self.host.visible_tracks().len();
        if self.state.reclamp(normal, returns, self.chain.strip_count()) {
            log::debug!(
                "Surface: channel offsets re-clamped to {} ({} tracks, {} returns)",
                self.state.channel_offset(),
                normal,
                returns
            );
        }

        self.attach_selected_track();
        self.rebind();
        self.update_strip_strings();
        self.display.invalidate();
        self.update_leds();
        self.update_rings();
        self.request_remap();
    }

    fn on_selected_track_changed(&mut self) {
        self.attach_selected_track();
        self.follow_selected_track();

        if self.state.plugin_paging().is_some() {
            self.state.reset_plugin_offsets();
            self.drop_chosen_plugin();
            self.state.set_plugin_sub(PluginSubMode::ChoosingDevice);
        }

        self.rebind();
        self.update_strip_strings();
        self.update_leds();
        self.update_rings();
        self.request_remap();
    }

    fn on_devices_changed(&mut self) {
        match self.state.plugin_sub() {
            Some(PluginSubMode::ChoosingDevice) => {
                self.update_strip_strings();
                self.update_leds();
                self.update_rings();
            }
            Some(PluginSubMode::ControllingParameters) => {
                let present = self
                    .chosen_plugin
                    .map(|d| self.selected_devices().contains(&d))
                    .unwrap_or(false);
                if !present {
                    log::debug!("Surface: chosen device is gone, back to device choice");
                    self.drop_chosen_plugin();
                    self.state.set_plugin_sub(PluginSubMode::ChoosingDevice);
                    self.rebind();
                    self.update_strip_strings();
                    self.update_leds();
                    self.update_rings();
                    self.request_remap();
                }
            }
            None => {}
        }
    }

    /// Everything that follows a mode change
    fn apply_mode(&mut self) {
        self.subs.device_names.clear();
        self.displayed_devices.clear();

        let show = matches!(
            self.state.kind(),
            ModeKind::Plugins | ModeKind::Sends | ModeKind::MultiCombined
        );
        self.display.set_show_parameter_names(show);
        self.display.set_show_current_track_colors(show);

        self.apply_meter_mode();
        self.rebind();
        self.update_strip_strings();
        self.update_leds();
        self.update_rings();
        self.request_remap();
    }

    fn apply_meter_mode(&mut self) {
        let active = self.state.meters_active();
        if self.meters_sent != Some(active) {
            let messages: Vec<(usize, Vec<u8>)> = self
                .chain
                .units()
                .iter()
                .enumerate()
                .flat_map(|(position, unit)| {
                    (0..unit.strip_count()).map(move |local| {
                        (position, meter_mode_message(unit.device_type(), local, active))
                    })
                })
                .collect();
            for (unit, message) in messages {
                self.send(unit, &message);
            }
            self.meters_sent = Some(active);
        }
        self.display.enable_meters(active);
    }

    fn rebind(&mut self) {
        let strip_tracks: Vec<_> = (0..self.chain.strip_count())
            .map(|g| self.strip_track(g))
            .collect();
        let selected_track = self.host.selected_track();
        self.bindings = resolve_all(
            &self.host,
            &BindingInputs {
                state: &self.state,
                strip_count: self.chain.strip_count(),
                strip_tracks: &strip_tracks,
                selected_track,
                ordered_parameters: &self.ordered_parameters,
            },
        );
        self.display.set_channel_offset(self.state.channel_offset());
        self.update_display_parameters();
    }

    /// Push label/parameter pairs to the display, honouring flip and touch
    fn update_display_parameters(&mut self) {
        let flip = self.state.flip_active();
        let touched = self.chain.any_touched();
        let to_display = |t: &Target| DisplayParameter {
            parameter: t.parameter,
            label: t.label.clone(),
        };

        let mut parameters: Vec<Option<DisplayParameter>> = self
            .bindings
            .iter()
            .map(|b| b.display_target(flip, touched).map(to_display))
            .collect();
        self.aux = self
            .bindings
            .iter()
            .map(|b| b.aux_target(flip, touched).map(to_display))
            .collect();

        // Combined mode shows device names in the plugin region while choosing
        if self.state.kind() == ModeKind::MultiCombined {
            for (slot, device) in parameters.iter_mut().zip(&self.displayed_devices) {
                if let Some(info) = device.and_then(|d| self.host.device(d)) {
                    *slot = Some(DisplayParameter {
                        parameter: None,
                        label: info.name,
                    });
                }
            }
        }
        self.display.set_parameters(parameters);
    }

    /// Routing names in IO mode, device names while choosing a device
    fn update_strip_strings(&mut self) {
        if self.chain.any_touched() {
            return;
        }
        let strips = self.chain.strip_count();

        match self.state.mode() {
            AssignmentMode::InputOutput(io) => {
                let kind = io.routing_kind();
                let strings = (0..strips)
                    .map(|g| {
                        self.strip_track(g)
                            .and_then(|t| self.host.routing(t, kind))
                            .and_then(|r| r.current)
                            .unwrap_or_default()
                    })
                    .collect();
                self.display.set_strip_strings(strings);
            }
            AssignmentMode::Plugins(paging) if paging.sub == PluginSubMode::ChoosingDevice => {
                let devices = self.selected_devices();
                let shown = (0..strips)
                    .map(|g| devices.get(paging.device_offset + g).copied())
                    .collect();
                self.watch_device_names(shown);
                let names = self
                    .displayed_devices
                    .iter()
                    .map(|d| {
                        d.and_then(|d| self.host.device(d))
                            .map(|info| info.name)
                            .unwrap_or_default()
                    })
                    .collect();
                self.display.set_strip_strings(names);
            }
            AssignmentMode::MultiCombined(paging)
                if paging.sub == PluginSubMode::ChoosingDevice =>
            {
                let devices = self.selected_devices();
                let layout = self.combined_layout();
                let shown = (0..strips)
                    .map(|g| match layout.region(g) {
                        CombinedRegion::Plugins(i) => devices.get(paging.device_offset + i).copied(),
                        _ => None,
                    })
                    .collect();
                self.watch_device_names(shown);
                self.update_display_parameters();
            }
            _ => {}
        }
    }

    /// Hold one name listener per displayed device
    fn watch_device_names(&mut self, shown: Vec<Option<DeviceId>>) {
        if shown == self.displayed_devices && !self.subs.device_names.is_empty() {
            return;
        }
        self.subs.device_names.clear();
        for device in shown.iter().flatten() {
            if let Some(sub) = self.subscribe(Topic::DeviceName(*device)) {
                self.subs.device_names.push(sub);
            }
        }
        self.displayed_devices = shown;
    }

    fn update_leds(&mut self) {
        let ctx = self.paging_context();
        let any_solo = self.any_solo();
        let mut updates = indicator_updates(&indicator_states(&self.state, &ctx, any_solo));
        updates.extend(assignment_display_updates(assignment_chars(
            &self.state,
            self.selected_position(),
        )));

        let center = self.chain.center_position();
        for (address, value) in updates {
            self.send_feedback(center, address, value);
        }
    }

    fn send_feedback(&mut self, unit: usize, address: LedAddress, value: u8) {
        if let Some(value) = self.feedback.update(address, value) {
            if !self.send(unit, &address.message(value)) {
                self.feedback.forget(address);
            }
        }
    }

    /// Full rings on strips that can choose a device, unlit elsewhere
    fn update_rings(&mut self) {
        let strips = self.chain.strip_count();
        let rings: Vec<u8> = match self.state.mode() {
            AssignmentMode::Plugins(paging) if paging.sub == PluginSubMode::ChoosingDevice => {
                let count = self.selected_devices().len();
                (0..strips)
                    .map(|g| ring_value(paging.device_offset + g < count))
                    .collect()
            }
            AssignmentMode::MultiCombined(paging)
                if paging.sub == PluginSubMode::ChoosingDevice =>
            {
                let count = self.selected_devices().len();
                let layout = self.combined_layout();
                (0..strips)
                    .map(|g| match layout.region(g) {
                        CombinedRegion::Plugins(i) => ring_value(paging.device_offset + i < count),
                        _ => VPOT_RING_UNLIT,
                    })
                    .collect()
            }
            AssignmentMode::InputOutput(_) => vec![VPOT_RING_UNLIT; strips],
            _ => return,
        };

        for (g, value) in rings.into_iter().enumerate() {
            if let Ok((unit, local)) = self.chain.locate(g) {
                self.send(unit, &ring_message(local, value));
            }
        }
    }

    fn render(&mut self) {
        if self.torn_down {
            return;
        }
        let tracks = self.controlled_tracks();
        let infos: Vec<_> = tracks.iter().map(|t| self.host.track(*t).unwrap_or_default()).collect();
        let names: Vec<String> = infos.iter().map(|t| t.name.clone()).collect();
        let colors: Vec<[u8; 3]> = infos.iter().map(|t| t.midi_rgb()).collect();
        let selected_color = self
            .host
            .selected_track()
            .and_then(|t| self.host.track(t))
            .map(|t| t.midi_rgb());

        let host = &self.host;
        let value_of = |id: ParameterId| host.parameter(id).map(|p| p.display_value);
        let frame = DisplayFrame {
            track_names: &names,
            track_colors: &colors,
            selected_color,
            aux: &self.aux,
        };
        self.display.render(&self.chain, &frame, &value_of, &mut self.out);
    }

    fn send(&mut self, unit: usize, message: &[u8]) -> bool {
        if self.torn_down {
            log::warn!(
                "Surface: dropping write to unit {} after shutdown: {:02X?}",
                unit,
                message
            );
            return false;
        }
        send_logged(&mut self.out, unit, message)
    }

    /// Listen for a topic unless the controller is shut down
    fn subscribe(&mut self, topic: Topic) -> Option<Subscription> {
        if self.torn_down {
            return None;
        }
        Some(self.host.subscribe(topic))
    }

    fn request_remap(&mut self) {
        if self.torn_down {
            return;
        }
        log::trace!("Surface: requesting control remap");
        self.host.request_control_remap();
    }

    fn sync_track_subscriptions(&mut self) {
        let tracks: Vec<_> = self
            .host
            .visible_tracks()
            .into_iter()
            .chain(self.host.return_tracks())
            .collect();
        let mut subs = Vec::with_capacity(tracks.len() * 2);
        for track in tracks {
            subs.extend(self.subscribe(Topic::TrackSolo(track)));
            subs.extend(self.subscribe(Topic::TrackAudioOutput(track)));
        }
        self.subs.per_track = subs;
    }

    /// Move the device-chain listener to the currently selected track
    fn attach_selected_track(&mut self) {
        let selected = self.host.selected_track();
        if selected == self.attached_track && self.subs.selected_devices.is_some() == selected.is_some() {
            return;
        }
        self.subs.selected_devices = None;
        self.subs.selected_devices = selected.and_then(|t| self.subscribe(Topic::TrackDevices(t)));
        self.attached_track = selected;
    }

    fn follow_selected_track(&mut self) {
        if !self.follow_selection || self.state.view_returns() {
            return;
        }
        let Some(selected) = self.host.selected_track() else {
            return;
        };
        if let Some(index) = self.host.visible_tracks().iter().position(|t| *t == selected) {
            self.set_channel_offset(index as i64);
        }
    }

    fn controlled_tracks(&self) -> Vec<TrackId> {
        if self.state.view_returns() {
            self.host.return_tracks()
        } else {
            self.host.visible_tracks()
        }
    }

    fn strip_track(&self, global_index: usize) -> Option<TrackId> {
        self.controlled_tracks()
            .get(self.state.channel_offset() + global_index)
            .copied()
    }

    fn selected_devices(&self) -> Vec<DeviceId> {
        self.host
            .selected_track()
            .map(|t| self.host.devices(t))
            .unwrap_or_default()
    }

    fn selected_send_count(&self) -> usize {
        self.host
            .selected_track()
            .and_then(|t| self.host.mixer(t))
            .map(|m| m.sends.len())
            .unwrap_or(0)
    }

    fn combined_layout(&self) -> CombinedLayout {
        CombinedLayout::new(self.chain.strip_count(), self.selected_send_count())
    }

    fn paging_context(&self) -> PagingContext {
        PagingContext {
            strip_count: self.chain.strip_count(),
            send_count: self.selected_send_count(),
            device_count: self.selected_devices().len(),
            parameter_count: self.ordered_parameters.len(),
            return_count: self.host.return_tracks().len(),
        }
    }

    fn any_solo(&self) -> bool {
        self.host
            .visible_tracks()
            .into_iter()
            .chain(self.host.return_tracks())
            .any(|t| self.host.track(t).map(|i| i.solo).unwrap_or(false))
    }

    fn selected_position(&self) -> SelectedPosition {
        let Some(selected) = self.host.selected_track() else {
            return SelectedPosition::Unknown;
        };
        if let Some(i) = self.host.visible_tracks().iter().position(|t| *t == selected) {
            SelectedPosition::Visible(i)
        } else if let Some(i) = self.host.return_tracks().iter().position(|t| *t == selected) {
            SelectedPosition::Return(i)
        } else if self.host.master_track() == Some(selected) {
            SelectedPosition::Master
        } else {
            SelectedPosition::Unknown
        }
    }
}

fn ring_value(lit: bool) -> u8 {
    if lit {
        VPOT_RING_FULL
    } else {
        VPOT_RING_UNLIT
    }
}
