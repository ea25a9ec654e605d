//! Assignment-mode state machine
//!
//! All controller state lives in one [`ControllerState`] value. The mode and
//! its nested sub-mode are a single tagged enum, so sub-mode data only exists
//! while its mode is active:
//!
//! ```text
//! VolumePan
//! Sends
//! Plugins(PluginPaging)        ChoosingDevice <-> ControllingParameters
//! InputOutput(IoSubMode)       InputMain -> InputSub -> OutputMain -> OutputSub -> ...
//! MultiCombined(PluginPaging)  [pan | sends region | plugins region]
//! ```
//!
//! Everything here is pure arithmetic over counts supplied by the caller;
//! nothing in this module talks to the host or the hardware.

use crate::host::RoutingKind;
use serde::{Deserialize, Serialize};

/// Routing edited by the rotaries in IO mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoSubMode {
    #[default]
    InputMain,
    InputSub,
    OutputMain,
    OutputSub,
}

impl IoSubMode {
    /// Next sub-mode in the fixed ring
    pub fn next(self) -> Self {
        match self {
            Self::InputMain => Self::InputSub,
            Self::InputSub => Self::OutputMain,
            Self::OutputMain => Self::OutputSub,
            Self::OutputSub => Self::InputMain,
        }
    }

    pub fn routing_kind(self) -> RoutingKind {
        match self {
            Self::InputMain => RoutingKind::InputType,
            Self::InputSub => RoutingKind::InputChannel,
            Self::OutputMain => RoutingKind::OutputType,
            Self::OutputSub => RoutingKind::OutputChannel,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PluginSubMode {
    #[default]
    ChoosingDevice,
    ControllingParameters,
}

/// Plugin sub-mode plus one page offset per sub-mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PluginPaging {
    pub sub: PluginSubMode,
    pub device_offset: usize,
    pub parameter_offset: usize,
}

impl PluginPaging {
    /// Page offset of the active sub-mode
    pub fn offset(&self) -> usize {
        match self.sub {
            PluginSubMode::ChoosingDevice => self.device_offset,
            PluginSubMode::ControllingParameters => self.parameter_offset,
        }
    }

    fn offset_mut(&mut self) -> &mut usize {
        match self.sub {
            PluginSubMode::ChoosingDevice => &mut self.device_offset,
            PluginSubMode::ControllingParameters => &mut self.parameter_offset,
        }
    }
}

/// Mode discriminant, used for switch handling and configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    #[default]
    VolumePan,
    Sends,
    Plugins,
    InputOutput,
    MultiCombined,
}

/// The active assignment mode with its sub-mode payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentMode {
    #[default]
    VolumePan,
    Sends,
    Plugins(PluginPaging),
    InputOutput(IoSubMode),
    MultiCombined(PluginPaging),
}

impl AssignmentMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Self::VolumePan => ModeKind::VolumePan,
            Self::Sends => ModeKind::Sends,
            Self::Plugins(_) => ModeKind::Plugins,
            Self::InputOutput(_) => ModeKind::InputOutput,
            Self::MultiCombined(_) => ModeKind::MultiCombined,
        }
    }
}

/// Split of the strip band in `MultiCombined` mode
///
/// Global strip 0 is the pan/volume strip of the selected track, followed by
/// one strip per send (at most `strips - 1`), and the remaining strips show
/// plugin parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombinedLayout {
    pub sends_slots: usize,
    pub plugin_slots: usize,
}

/// Region of a strip in `MultiCombined` mode, with the region-relative index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinedRegion {
    Pan,
    Sends(usize),
    Plugins(usize),
}

impl CombinedLayout {
    pub fn new(strip_count: usize, send_count: usize) -> Self {
        let usable = strip_count.saturating_sub(1);
        let sends_slots = usable.min(send_count);
        Self {
            sends_slots,
            plugin_slots: usable - sends_slots,
        }
    }

    pub fn region(&self, global_index: usize) -> CombinedRegion {
        if global_index == 0 {
            CombinedRegion::Pan
        } else if global_index <= self.sends_slots {
            CombinedRegion::Sends(global_index - 1)
        } else {
            CombinedRegion::Plugins(global_index - 1 - self.sends_slots)
        }
    }
}

/// Live counts the paging rules depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagingContext {
    pub strip_count: usize,
    /// Sends of the selected track
    pub send_count: usize,
    /// Devices on the selected track
    pub device_count: usize,
    /// Entries in the ordered parameter list of the chosen device
    pub parameter_count: usize,
    pub return_count: usize,
}

/// Which offset a page operation moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageTarget {
    Plugin { page: usize, total: usize },
    Sends { page: usize, total: usize },
}

impl PageTarget {
    /// (page size, addressable item count)
    fn bounds(self) -> (usize, usize) {
        match self {
            Self::Plugin { page, total } | Self::Sends { page, total } => (page, total),
        }
    }
}

/// Outcome of [`ControllerState::enter_mode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeEntry {
    pub previous: ModeKind,
    /// A repeated IO press advanced the sub-mode instead of switching mode
    pub io_advanced: bool,
}

/// Clamp a requested offset into `[0, max(0, count - strips)]`
pub fn clamp_offset(requested: i64, controlled_count: usize, strip_count: usize) -> usize {
    let max = controlled_count.saturating_sub(strip_count) as i64;
    requested.clamp(0, max) as usize
}

/// Process-wide controller state
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    mode: AssignmentMode,
    /// IO sub-mode resumed on the next entry into IO
    last_io: IoSubMode,
    send_offset: usize,
    flip: bool,
    view_returns: bool,
    bank_offset: usize,
    bank_offset_returns: usize,
    meters_enabled: bool,
    shift_held: bool,
}

impl ControllerState {
    pub fn new(initial: ModeKind) -> Self {
        let mut state = Self::default();
        state.enter_mode(initial);
        state
    }

    pub fn mode(&self) -> AssignmentMode {
        self.mode
    }

    pub fn kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn plugin_paging(&self) -> Option<&PluginPaging> {
        match &self.mode {
            AssignmentMode::Plugins(p) | AssignmentMode::MultiCombined(p) => Some(p),
            _ => None,
        }
    }

    fn plugin_paging_mut(&mut self) -> Option<&mut PluginPaging> {
        match &mut self.mode {
            AssignmentMode::Plugins(p) | AssignmentMode::MultiCombined(p) => Some(p),
            _ => None,
        }
    }

    pub fn plugin_sub(&self) -> Option<PluginSubMode> {
        self.plugin_paging().map(|p| p.sub)
    }

    /// True in `Plugins` or `MultiCombined` while choosing a device
    pub fn is_choosing_device(&self) -> bool {
        self.plugin_sub() == Some(PluginSubMode::ChoosingDevice)
    }

    pub fn io_sub(&self) -> Option<IoSubMode> {
        match self.mode {
            AssignmentMode::InputOutput(io) => Some(io),
            _ => None,
        }
    }

    /// Switch mode
    ///
    /// Re-entering `InputOutput` advances the IO sub-mode ring. `Plugins` and
    /// `MultiCombined` always start in `ChoosingDevice`; their page offsets carry
    /// over when switching between the two and start at zero otherwise.
    pub fn enter_mode(&mut self, kind: ModeKind) -> ModeEntry {
        let previous = self.kind();
        let carried = self.plugin_paging().copied().unwrap_or_default();
        let mut io_advanced = false;

        self.mode = match kind {
            ModeKind::VolumePan => AssignmentMode::VolumePan,
            ModeKind::Sends => AssignmentMode::Sends,
            ModeKind::Plugins => AssignmentMode::Plugins(PluginPaging {
                sub: PluginSubMode::ChoosingDevice,
                ..carried
            }),
            ModeKind::MultiCombined => AssignmentMode::MultiCombined(PluginPaging {
                sub: PluginSubMode::ChoosingDevice,
                ..carried
            }),
            ModeKind::InputOutput => {
                if previous == ModeKind::InputOutput {
                    self.last_io = self.last_io.next();
                    io_advanced = true;
                }
                AssignmentMode::InputOutput(self.last_io)
            }
        };

        ModeEntry {
            previous,
            io_advanced,
        }
    }

    /// Change the plugin sub-mode; returns false outside the plugin modes or
    /// when already in `sub`
    pub fn set_plugin_sub(&mut self, sub: PluginSubMode) -> bool {
        match self.plugin_paging_mut() {
            Some(p) if p.sub != sub => {
                p.sub = sub;
                true
            }
            _ => false,
        }
    }

    /// Enter `ControllingParameters` on page zero after a device was chosen
    pub fn start_parameter_control(&mut self) -> bool {
        match self.plugin_paging_mut() {
            Some(p) => {
                p.parameter_offset = 0;
                p.sub = PluginSubMode::ControllingParameters;
                true
            }
            None => false,
        }
    }

    /// Zero both plugin page offsets
    pub fn reset_plugin_offsets(&mut self) {
        if let Some(p) = self.plugin_paging_mut() {
            p.device_offset = 0;
            p.parameter_offset = 0;
        }
    }

    /// Flipping is forbidden while choosing a device in `Plugins` and in IO
    pub fn can_flip(&self) -> bool {
        !matches!(
            self.mode,
            AssignmentMode::Plugins(PluginPaging {
                sub: PluginSubMode::ChoosingDevice,
                ..
            }) | AssignmentMode::InputOutput(_)
        )
    }

    pub fn flip(&self) -> bool {
        self.flip
    }

    /// Flip takes effect for bindings
    pub fn flip_active(&self) -> bool {
        self.flip && self.can_flip()
    }

    /// Toggle flip; no-op (returns false) when the mode forbids it
    pub fn toggle_flip(&mut self) -> bool {
        if !self.can_flip() {
            return false;
        }
        self.flip = !self.flip;
        true
    }

    pub fn view_returns(&self) -> bool {
        self.view_returns
    }

    pub fn toggle_view_returns(&mut self) {
        self.view_returns = !self.view_returns;
    }

    /// Bank offset of the active track collection
    pub fn channel_offset(&self) -> usize {
        if self.view_returns {
            self.bank_offset_returns
        } else {
            self.bank_offset
        }
    }

    /// Store a clamped offset into the active offset; returns the stored value
    pub fn set_channel_offset(
        &mut self,
        requested: i64,
        controlled_count: usize,
        strip_count: usize,
    ) -> usize {
        let offset = clamp_offset(requested, controlled_count, strip_count);
        if self.view_returns {
            self.bank_offset_returns = offset;
        } else {
            self.bank_offset = offset;
        }
        offset
    }

    /// Clamp both offsets against their own collection sizes
    ///
    /// Returns true if either offset moved.
    pub fn reclamp(
        &mut self,
        normal_count: usize,
        return_count: usize,
        strip_count: usize,
    ) -> bool {
        let normal = clamp_offset(self.bank_offset as i64, normal_count, strip_count);
        let returns = clamp_offset(self.bank_offset_returns as i64, return_count, strip_count);
        let moved = normal != self.bank_offset || returns != self.bank_offset_returns;
        self.bank_offset = normal;
        self.bank_offset_returns = returns;
        moved
    }

    pub fn send_offset(&self) -> usize {
        self.send_offset
    }

    /// Drop the sends page when it points past the last return track
    pub fn revalidate_send_offset(&mut self, return_count: usize) -> bool {
        if self.send_offset > 0 && self.send_offset >= return_count {
            self.send_offset = 0;
            return true;
        }
        false
    }

    pub fn meters_enabled(&self) -> bool {
        self.meters_enabled
    }

    pub fn toggle_meters(&mut self) {
        self.meters_enabled = !self.meters_enabled;
    }

    /// Meters are only shown in `VolumePan`
    pub fn meters_active(&self) -> bool {
        self.meters_enabled && self.kind() == ModeKind::VolumePan
    }

    pub fn shift_held(&self) -> bool {
        self.shift_held
    }

    pub fn set_shift_held(&mut self, held: bool) {
        self.shift_held = held;
    }

    fn page_target(&self, ctx: &PagingContext) -> Option<PageTarget> {
        let plugin_total = |p: &PluginPaging| match p.sub {
            PluginSubMode::ChoosingDevice => ctx.device_count,
            PluginSubMode::ControllingParameters => ctx.parameter_count,
        };

        match &self.mode {
            AssignmentMode::Plugins(p) => Some(PageTarget::Plugin {
                page: ctx.strip_count,
                total: plugin_total(p),
            }),
            AssignmentMode::Sends => Some(PageTarget::Sends {
                page: ctx.strip_count,
                total: ctx.return_count,
            }),
            AssignmentMode::MultiCombined(p) => {
                let layout = CombinedLayout::new(ctx.strip_count, ctx.send_count);
                if layout.plugin_slots > 0 {
                    Some(PageTarget::Plugin {
                        page: layout.plugin_slots,
                        total: plugin_total(p),
                    })
                } else if layout.sends_slots > 0 {
                    Some(PageTarget::Sends {
                        page: layout.sends_slots,
                        total: ctx.return_count,
                    })
                } else {
                    None
                }
            }
            AssignmentMode::VolumePan | AssignmentMode::InputOutput(_) => None,
        }
    }

    fn page_offset(&self, target: PageTarget) -> usize {
        match target {
            PageTarget::Plugin { .. } => self.plugin_paging().map(|p| p.offset()).unwrap_or(0),
            PageTarget::Sends { .. } => self.send_offset,
        }
    }

    pub fn can_page_prev(&self, ctx: &PagingContext) -> bool {
        self.page_target(ctx)
            .map(|t| self.page_offset(t) > 0)
            .unwrap_or(false)
    }

    pub fn can_page_next(&self, ctx: &PagingContext) -> bool {
        let Some(target) = self.page_target(ctx) else {
            return false;
        };
        let (page, total) = target.bounds();
        page > 0 && self.page_offset(target) + page < total
    }

    /// Move one page back; returns false when nothing changed
    pub fn page_prev(&mut self, ctx: &PagingContext) -> bool {
        if !self.can_page_prev(ctx) {
            return false;
        }
        match self.page_target(ctx) {
            Some(PageTarget::Plugin { page, .. }) => {
                if let Some(p) = self.plugin_paging_mut() {
                    let offset = p.offset_mut();
                    *offset = offset.saturating_sub(page);
                }
            }
            Some(PageTarget::Sends { page, .. }) => {
                self.send_offset = self.send_offset.saturating_sub(page);
            }
            None => return false,
        }
        true
    }

    /// Move one page forward; returns false when nothing changed
    pub fn page_next(&mut self, ctx: &PagingContext) -> bool {
        if !self.can_page_next(ctx) {
            return false;
        }
        match self.page_target(ctx) {
            Some(PageTarget::Plugin { page, .. }) => {
                if let Some(p) = self.plugin_paging_mut() {
                    *p.offset_mut() += page;
                }
            }
            Some(PageTarget::Sends { page, .. }) => self.send_offset += page,
            None => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PagingContext {
        PagingContext {
            strip_count: 8,
            send_count: 2,
            device_count: 5,
            parameter_count: 20,
            return_count: 2,
        }
    }

    #[test]
    fn test_io_ring_advances_on_repeated_entry() {
        let mut state = ControllerState::new(ModeKind::VolumePan);
        let entry = state.enter_mode(ModeKind::InputOutput);
        assert!(!entry.io_advanced);
        assert_eq!(state.io_sub(), Some(IoSubMode::InputMain));

        state.enter_mode(ModeKind::InputOutput);
        assert_eq!(state.io_sub(), Some(IoSubMode::InputSub));
        state.enter_mode(ModeKind::InputOutput);
        state.enter_mode(ModeKind::InputOutput);
        assert_eq!(state.io_sub(), Some(IoSubMode::OutputSub));
        let entry = state.enter_mode(ModeKind::InputOutput);
        assert!(entry.io_advanced);
        assert_eq!(state.io_sub(), Some(IoSubMode::InputMain));
    }

    #[test]
    fn test_io_sub_mode_resumes() {
        let mut state = ControllerState::new(ModeKind::InputOutput);
        state.enter_mode(ModeKind::InputOutput);
        state.enter_mode(ModeKind::Sends);
        state.enter_mode(ModeKind::InputOutput);
        assert_eq!(state.io_sub(), Some(IoSubMode::InputSub));
    }

    #[test]
    fn test_repeated_non_io_press_does_not_toggle() {
        let mut state = ControllerState::new(ModeKind::Sends);
        let entry = state.enter_mode(ModeKind::Sends);
        assert!(!entry.io_advanced);
        assert_eq!(state.mode(), AssignmentMode::Sends);
    }

    #[test]
    fn test_plugins_enters_choosing_device() {
        let mut state = ControllerState::new(ModeKind::Plugins);
        assert!(state.start_parameter_control());
        assert_eq!(state.plugin_sub(), Some(PluginSubMode::ControllingParameters));

        state.enter_mode(ModeKind::Plugins);
        assert!(state.is_choosing_device());
    }

    #[test]
    fn test_plugin_paging_carries_between_plugin_modes_only() {
        let mut state = ControllerState::new(ModeKind::Plugins);
        let ctx = PagingContext {
            device_count: 20,
            ..ctx()
        };
        assert!(state.page_next(&ctx));
        state.enter_mode(ModeKind::MultiCombined);
        assert_eq!(state.plugin_paging().unwrap().device_offset, 8);

        state.enter_mode(ModeKind::VolumePan);
        state.enter_mode(ModeKind::Plugins);
        assert_eq!(state.plugin_paging().unwrap().device_offset, 0);
    }

    #[test]
    fn test_can_flip() {
        let mut state = ControllerState::new(ModeKind::Plugins);
        assert!(!state.can_flip());
        assert!(!state.toggle_flip());
        assert!(!state.flip());

        state.start_parameter_control();
        assert!(state.can_flip());

        state.enter_mode(ModeKind::InputOutput);
        assert!(!state.can_flip());

        state.enter_mode(ModeKind::MultiCombined);
        assert!(state.can_flip());
    }

    #[test]
    fn test_flip_involution() {
        let mut state = ControllerState::new(ModeKind::VolumePan);
        assert!(state.toggle_flip());
        assert!(state.flip_active());
        assert!(state.toggle_flip());
        assert!(!state.flip_active());
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(-5, 10, 8), 0);
        assert_eq!(clamp_offset(1, 10, 8), 1);
        assert_eq!(clamp_offset(100, 10, 8), 2);
        assert_eq!(clamp_offset(3, 4, 8), 0);
        assert_eq!(clamp_offset(i64::MAX, 0, 8), 0);

        for count in 0..40usize {
            for requested in -20i64..60 {
                let offset = clamp_offset(requested, count, 8);
                assert!(offset <= count.saturating_sub(8));
            }
        }
    }

    #[test]
    fn test_channel_offsets_are_independent() {
        let mut state = ControllerState::default();
        assert_eq!(state.set_channel_offset(5, 20, 8), 5);
        state.toggle_view_returns();
        assert_eq!(state.channel_offset(), 0);
        assert_eq!(state.set_channel_offset(5, 4, 8), 0);
        state.toggle_view_returns();
        assert_eq!(state.channel_offset(), 5);
    }

    #[test]
    fn test_reclamp_covers_inactive_offset() {
        let mut state = ControllerState::default();
        state.set_channel_offset(12, 20, 8);
        state.toggle_view_returns();
        state.set_channel_offset(3, 12, 8);

        assert!(state.reclamp(5, 10, 8));
        assert_eq!(state.channel_offset(), 2);
        state.toggle_view_returns();
        assert_eq!(state.channel_offset(), 0);
        assert!(!state.reclamp(5, 10, 8));
    }

    #[test]
    fn test_combined_layout() {
        let layout = CombinedLayout::new(8, 2);
        assert_eq!(layout.sends_slots, 2);
        assert_eq!(layout.plugin_slots, 5);
        assert_eq!(layout.region(0), CombinedRegion::Pan);
        assert_eq!(layout.region(1), CombinedRegion::Sends(0));
        assert_eq!(layout.region(2), CombinedRegion::Sends(1));
        assert_eq!(layout.region(3), CombinedRegion::Plugins(0));
        assert_eq!(layout.region(7), CombinedRegion::Plugins(4));

        let full = CombinedLayout::new(8, 12);
        assert_eq!(full.sends_slots, 7);
        assert_eq!(full.plugin_slots, 0);
        assert_eq!(full.sends_slots + full.plugin_slots + 1, 8);
    }

    #[test]
    fn test_paging_converges_at_bounds() {
        let mut state = ControllerState::new(ModeKind::Plugins);
        state.start_parameter_control();
        let ctx = ctx();

        while state.page_next(&ctx) {}
        let max = state.plugin_paging().unwrap().parameter_offset;
        assert_eq!(max, 16);
        assert!(!state.page_next(&ctx));
        assert_eq!(state.plugin_paging().unwrap().parameter_offset, max);

        while state.page_prev(&ctx) {}
        assert_eq!(state.plugin_paging().unwrap().parameter_offset, 0);
        assert!(!state.page_prev(&ctx));
    }

    #[test]
    fn test_plugin_page_offsets_are_per_sub_mode() {
        let mut state = ControllerState::new(ModeKind::Plugins);
        let ctx = PagingContext {
            device_count: 12,
            ..ctx()
        };
        assert!(state.page_next(&ctx));
        state.start_parameter_control();
        assert!(state.page_next(&ctx));
        let paging = state.plugin_paging().unwrap();
        assert_eq!(paging.device_offset, 8);
        assert_eq!(paging.parameter_offset, 8);
    }

    #[test]
    fn test_sends_paging() {
        let mut state = ControllerState::new(ModeKind::Sends);
        let ctx = PagingContext {
            return_count: 10,
            ..ctx()
        };
        assert!(!state.can_page_prev(&ctx));
        assert!(state.can_page_next(&ctx));
        assert!(state.page_next(&ctx));
        assert_eq!(state.send_offset(), 8);
        assert!(!state.page_next(&ctx));

        assert!(state.revalidate_send_offset(4));
        assert_eq!(state.send_offset(), 0);
    }

    #[test]
    fn test_combined_paging_uses_region_width() {
        let mut state = ControllerState::new(ModeKind::MultiCombined);
        state.start_parameter_control();
        let ctx = ctx();
        // 2 sends -> 5 plugin slots
        assert!(state.page_next(&ctx));
        assert_eq!(state.plugin_paging().unwrap().parameter_offset, 5);

        // No plugin slots left: sends region pages instead
        let sends_only = PagingContext {
            send_count: 7,
            return_count: 12,
            ..ctx
        };
        assert!(state.page_next(&sends_only));
        assert_eq!(state.send_offset(), 7);
        assert_eq!(state.plugin_paging().unwrap().parameter_offset, 5);
    }

    #[test]
    fn test_no_paging_in_volume_pan_or_io() {
        let mut state = ControllerState::new(ModeKind::VolumePan);
        assert!(!state.page_next(&ctx()));
        state.enter_mode(ModeKind::InputOutput);
        assert!(!state.can_page_prev(&ctx()));
        assert!(!state.can_page_next(&ctx()));
    }

    #[test]
    fn test_meters_only_in_volume_pan() {
        let mut state = ControllerState::new(ModeKind::VolumePan);
        state.toggle_meters();
        assert!(state.meters_active());
        state.enter_mode(ModeKind::Sends);
        assert!(state.meters_enabled());
        assert!(!state.meters_active());
    }
}
