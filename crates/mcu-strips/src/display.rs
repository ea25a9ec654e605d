//! Display rendering
//!
//! Each unit has a 2-row, 56-character display (7 characters per strip); units
//! with a second display add two auxiliary rows. Rows are rebuilt on every
//! refresh tick and only transmitted when their bytes differ from what was
//! last sent to that row.
//!
//! ```text
//! row 1 (offset 56)   names:   "  Pan    Pan  Volume ..."
//! row 0 (offset 0)    values:  "  -6dB   C    ..."
//! aux rows                     other control's name / value
//! ```

use crate::addressing::Chain;
use crate::host::ParameterId;
use crate::output::{send_logged, SurfaceOutput};
use crate::protocol::{color_message, display_message, NUM_CHARS_PER_DISPLAY_LINE};

/// Characters per strip cell
pub const CELL_WIDTH: usize = 7;

/// Removed first-to-last when a label is too long
const DROP_ORDER: [char; 6] = [' ', 'i', 'o', 'u', 'e', 'a'];

/// Squeeze a label into exactly 7 characters
///
/// Short labels are centred (odd padding goes left). Long labels lose a
/// trailing "dB" if they look like a decimal level, then drop their rightmost
/// spaces and vowels (never the first character) until they fit, and are cut
/// at 7 characters as a last resort.
pub fn compact_label(label: &str) -> String {
    if label.is_empty() {
        return " ".repeat(CELL_WIDTH);
    }

    let mut chars: Vec<char> = label.chars().collect();

    if label.trim().chars().count() > CELL_WIDTH && label.ends_with("dB") && label.contains('.') {
        chars.truncate(chars.len() - 2);
    }

    if chars.len() > CELL_WIDTH {
        for drop in DROP_ORDER {
            while chars.len() > CELL_WIDTH {
                match chars.iter().skip(1).rposition(|c| *c == drop) {
                    Some(pos) => {
                        chars.remove(pos + 1);
                    }
                    None => break,
                }
            }
        }
    } else {
        let margin = CELL_WIDTH - chars.len();
        let left = margin / 2 + (margin & 1);
        let right = margin - left;
        chars = std::iter::repeat(' ')
            .take(left)
            .chain(chars)
            .chain(std::iter::repeat(' ').take(right))
            .collect();
    }

    chars.into_iter().take(CELL_WIDTH).collect()
}

/// Centre `text` in a field of `width`, same rule as the cell padding
pub fn center(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        return text.to_string();
    }
    let margin = width - len;
    let left = margin / 2 + (margin & width & 1);
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(margin - left))
}

/// Display bytes; characters the display cannot show become '?'
pub fn encode_row(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// A parameter shown in a strip cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayParameter {
    pub parameter: Option<ParameterId>,
    pub label: String,
}

/// Per-refresh data supplied by the controller
#[derive(Debug, Clone, Copy)]
pub struct DisplayFrame<'a> {
    /// Names of the controlled track collection (normal or return tracks)
    pub track_names: &'a [String],
    /// 7-bit colours of the controlled track collection
    pub track_colors: &'a [[u8; 3]],
    pub selected_color: Option<[u8; 3]>,
    /// Other control's target per global strip, for auxiliary rows
    pub aux: &'a [Option<DisplayParameter>],
}

/// Which row of a unit's display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Values,
    Names,
    AuxValues,
    AuxNames,
}

impl Row {
    fn index(self) -> usize {
        match self {
            Row::Values => 0,
            Row::Names => 1,
            Row::AuxValues => 2,
            Row::AuxNames => 3,
        }
    }

    fn is_aux(self) -> bool {
        matches!(self, Row::AuxValues | Row::AuxNames)
    }

    fn offset(self) -> u8 {
        match self {
            Row::Values | Row::AuxValues => 0,
            Row::Names | Row::AuxNames => NUM_CHARS_PER_DISPLAY_LINE as u8,
        }
    }
}

/// Last bytes sent per row and the last colour set, for one unit
#[derive(Debug, Clone, Default)]
struct UnitCache {
    rows: [Option<Vec<u8>>; 4],
    colors: Option<Vec<[u8; 3]>>,
}

/// Display content state plus the per-unit transmission cache
#[derive(Debug, Clone)]
pub struct DisplayPipeline {
    /// Per global strip; `None` when strip strings are in use
    parameters: Option<Vec<Option<DisplayParameter>>>,
    /// Per global strip; `None` when parameters are in use
    strip_strings: Option<Vec<String>>,
    show_parameter_names: bool,
    show_current_track_colors: bool,
    channel_offset: usize,
    meters_enabled: bool,
    units: Vec<UnitCache>,
}

impl DisplayPipeline {
    pub fn new(chain: &Chain) -> Self {
        Self {
            parameters: None,
            strip_strings: None,
            show_parameter_names: false,
            show_current_track_colors: false,
            channel_offset: 0,
            meters_enabled: false,
            units: vec![UnitCache::default(); chain.units().len()],
        }
    }

    /// Show parameter labels/values; clears strip strings
    pub fn set_parameters(&mut self, parameters: Vec<Option<DisplayParameter>>) {
        self.strip_strings = None;
        self.parameters = Some(parameters);
    }

    /// Show free-form strings on the value row; clears parameters
    pub fn set_strip_strings(&mut self, strings: Vec<String>) {
        self.parameters = None;
        self.strip_strings = Some(strings);
    }

    #[cfg(test)]
    pub fn strip_strings(&self) -> Option<&[String]> {
        self.strip_strings.as_deref()
    }

    #[cfg(test)]
    pub fn parameters(&self) -> Option<&[Option<DisplayParameter>]> {
        self.parameters.as_deref()
    }

    pub fn set_show_parameter_names(&mut self, show: bool) {
        self.show_parameter_names = show;
    }

    pub fn set_show_current_track_colors(&mut self, show: bool) {
        self.show_current_track_colors = show;
    }

    pub fn set_channel_offset(&mut self, offset: usize) {
        self.channel_offset = offset;
    }

    /// Toggling meters changes which rows are owned by text, so resend all
    pub fn enable_meters(&mut self, enabled: bool) {
        if self.meters_enabled != enabled {
            self.meters_enabled = enabled;
            self.invalidate();
        }
    }

    /// Forget what was sent; the next render retransmits every row
    pub fn invalidate(&mut self) {
        for unit in &mut self.units {
            *unit = UnitCache::default();
        }
    }

    fn name_cell(&self, global_index: usize, frame: &DisplayFrame<'_>) -> String {
        if self.show_parameter_names {
            if let Some(params) = self.parameters.as_ref().filter(|p| !p.is_empty()) {
                return match params.get(global_index).and_then(Option::as_ref) {
                    Some(p) => compact_label(&p.label),
                    None => compact_label(""),
                };
            }
        }
        match frame.track_names.get(self.channel_offset + global_index) {
            Some(name) if !self.show_current_track_colors => compact_label(name),
            _ => compact_label(""),
        }
    }

    fn value_cell(
        &self,
        global_index: usize,
        value_of: &dyn Fn(ParameterId) -> Option<String>,
    ) -> String {
        if let Some(s) = self
            .strip_strings
            .as_ref()
            .and_then(|s| s.get(global_index))
            .filter(|s| !s.is_empty())
        {
            return compact_label(s);
        }
        let value = self
            .parameters
            .as_ref()
            .and_then(|p| p.get(global_index))
            .and_then(Option::as_ref)
            .and_then(|p| p.parameter)
            .and_then(value_of)
            .unwrap_or_default();
        compact_label(&value)
    }

    fn aux_cells(
        &self,
        global_index: usize,
        frame: &DisplayFrame<'_>,
        value_of: &dyn Fn(ParameterId) -> Option<String>,
    ) -> (String, String) {
        match frame.aux.get(global_index).and_then(Option::as_ref) {
            Some(p) if self.parameters.is_some() => {
                let value = p.parameter.and_then(value_of).unwrap_or_default();
                (compact_label(&p.label), compact_label(&value))
            }
            _ => (compact_label(""), compact_label("")),
        }
    }

    /// Build every row and send the ones that changed
    ///
    /// Returns the number of messages sent.
    pub fn render(
        &mut self,
        chain: &Chain,
        frame: &DisplayFrame<'_>,
        value_of: &dyn Fn(ParameterId) -> Option<String>,
        out: &mut dyn SurfaceOutput,
    ) -> usize {
        let mut sent = 0;

        for (position, unit) in chain.units().iter().enumerate() {
            let strips = unit.stack_offset()..unit.stack_offset() + unit.strip_count();

            let mut names = String::new();
            let mut values = String::new();
            let mut aux_names = String::new();
            let mut aux_values = String::new();
            for g in strips.clone() {
                names.push_str(&self.name_cell(g, frame));
                values.push_str(&self.value_cell(g, value_of));
                if unit.display_rows() >= 4 {
                    let (label, value) = self.aux_cells(g, frame, value_of);
                    aux_names.push_str(&label);
                    aux_values.push_str(&value);
                }
            }

            let dt = unit.device_type();
            sent += self.send_row(out, position, dt, Row::Values, &values) as usize;
            if !self.meters_enabled {
                sent += self.send_row(out, position, dt, Row::Names, &names) as usize;
            }
            if unit.display_rows() >= 4 {
                sent += self.send_row(out, position, dt, Row::AuxValues, &aux_values) as usize;
                sent += self.send_row(out, position, dt, Row::AuxNames, &aux_names) as usize;
            }

            let colors: Vec<[u8; 3]> = if self.show_current_track_colors {
                vec![frame.selected_color.unwrap_or_default(); unit.strip_count()]
            } else {
                strips
                    .map(|g| {
                        frame
                            .track_colors
                            .get(self.channel_offset + g)
                            .copied()
                            .unwrap_or_default()
                    })
                    .collect()
            };
            sent += self.send_colors(out, position, colors) as usize;
        }

        if sent > 0 {
            log::trace!("Display: {} message(s) sent", sent);
        }
        sent
    }

    fn send_row(
        &mut self,
        out: &mut dyn SurfaceOutput,
        unit: usize,
        device_type: u8,
        row: Row,
        text: &str,
    ) -> bool {
        let bytes = encode_row(text);
        let Some(cache) = self.units.get_mut(unit) else {
            return false;
        };
        if cache.rows[row.index()].as_deref() == Some(bytes.as_slice()) {
            return false;
        }
        let message = display_message(device_type, row.is_aux(), row.offset(), &bytes);
        if !send_logged(out, unit, &message) {
            return false;
        }
        cache.rows[row.index()] = Some(bytes);
        true
    }

    fn send_colors(&mut self, out: &mut dyn SurfaceOutput, unit: usize, colors: Vec<[u8; 3]>) -> bool {
        let Some(cache) = self.units.get_mut(unit) else {
            return false;
        };
        if cache.colors.as_ref() == Some(&colors) {
            return false;
        }
        if !send_logged(out, unit, &color_message(&colors)) {
            return false;
        }
        cache.colors = Some(colors);
        true
    }

    /// Overwrite every display with the offline banner
    pub fn show_offline(&mut self, chain: &Chain, out: &mut dyn SurfaceOutput) {
        for (position, unit) in chain.units().iter().enumerate() {
            let width = unit.strip_count() * CELL_WIDTH;
            let dt = unit.device_type();
            let upper = encode_row(&center("mcu-strips", width));
            let lower = encode_row(&center("Device is offline", width));
            send_logged(out, position, &display_message(dt, false, 0, &upper));
            send_logged(
                out,
                position,
                &display_message(dt, false, NUM_CHARS_PER_DISPLAY_LINE as u8, &lower),
            );
        }
        self.invalidate();
    }
}
