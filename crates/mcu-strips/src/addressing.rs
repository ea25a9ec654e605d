//! Unit chain addressing
//!
//! A surface is a left-to-right chain of hardware units: zero or more
//! extensions on the left, exactly one centre unit, zero or more extensions on
//! the right. Every unit owns a fixed number of strips.
//!
//! ```text
//!   [ XT left ]   [ centre ]   [ XT right ]
//!   strips 0-7    strips 0-7   strips 0-7      <- local index
//!   offset 0      offset 8     offset 16       <- stack offset
//!   global 0-7    global 8-15  global 16-23    <- global strip index
//! ```
//!
//! The global strip index is the only addressing currency used by the rest of
//! the crate. It is *not* a track index: the bank offset is added on top of it
//! when a strip is assigned to a track.

use crate::protocol::{MAX_STRIPS_PER_UNIT, SYSEX_DEVICE_TYPE, SYSEX_DEVICE_TYPE_XT};

/// Error type for chain addressing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Strip index {index} out of range (chain has {total} strips)")]
    OutOfRange { index: usize, total: usize },

    #[error("No unit at chain position {0}")]
    UnknownUnit(usize),
}

/// Position of a unit relative to the centre unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRole {
    Left,
    Center,
    Right,
}

/// Static description of one hardware unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitSpec {
    /// Number of strips on the unit
    pub strips: usize,
    /// Display rows the unit can show (2, or 4 for units with a second display)
    pub display_rows: usize,
}

impl Default for UnitSpec {
    fn default() -> Self {
        Self {
            strips: 8,
            display_rows: 2,
        }
    }
}

/// One physical fader + rotary + display cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strip {
    local_index: usize,
    stack_offset: usize,
    touched: bool,
}

impl Strip {
    /// Index within the owning unit
    pub fn local_index(&self) -> usize {
        self.local_index
    }

    /// Number of strips on all units left of the owning unit
    pub fn stack_offset(&self) -> usize {
        self.stack_offset
    }

    pub fn global_index(&self) -> usize {
        self.stack_offset + self.local_index
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }
}

/// A hardware unit and its strips
#[derive(Debug, Clone)]
pub struct Unit {
    role: UnitRole,
    spec: UnitSpec,
    stack_offset: usize,
    strips: Vec<Strip>,
}

impl Unit {
    #[cfg(test)]
    pub fn role(&self) -> UnitRole {
        self.role
    }

    pub fn stack_offset(&self) -> usize {
        self.stack_offset
    }

    pub fn strip_count(&self) -> usize {
        self.strips.len()
    }

    pub fn display_rows(&self) -> usize {
        self.spec.display_rows
    }

    /// SysEx device type byte the unit answers to
    pub fn device_type(&self) -> u8 {
        match self.role {
            UnitRole::Center => SYSEX_DEVICE_TYPE,
            UnitRole::Left | UnitRole::Right => SYSEX_DEVICE_TYPE_XT,
        }
    }
}

/// The ordered chain of units plus the global strip lookup table
#[derive(Debug, Clone)]
pub struct Chain {
    units: Vec<Unit>,
    /// Global strip index -> (unit position, local index)
    lookup: Vec<(usize, usize)>,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(&[], UnitSpec::default(), &[])
    }
}

impl Chain {
    /// Build a chain from left extensions, the centre unit and right extensions
    pub fn new(left: &[UnitSpec], center: UnitSpec, right: &[UnitSpec]) -> Self {
        let specs = left
            .iter()
            .map(|s| (UnitRole::Left, *s))
            .chain(std::iter::once((UnitRole::Center, center)))
            .chain(right.iter().map(|s| (UnitRole::Right, *s)));

        let mut units = Vec::new();
        let mut lookup = Vec::new();
        let mut stack_offset = 0;

        for (position, (role, mut spec)) in specs.enumerate() {
            let max = MAX_STRIPS_PER_UNIT as usize;
            if spec.strips > max {
                log::warn!(
                    "Chain: unit {} declares {} strips, limiting to {}",
                    position,
                    spec.strips,
                    max
                );
                spec.strips = max;
            }
            let strips = (0..spec.strips)
                .map(|local_index| Strip {
                    local_index,
                    stack_offset,
                    touched: false,
                })
                .collect();
            lookup.extend((0..spec.strips).map(|local| (position, local)));
            units.push(Unit {
                role,
                spec,
                stack_offset,
                strips,
            });
            stack_offset += spec.strips;
        }

        log::debug!(
            "Chain: {} unit(s), {} strip(s) total",
            units.len(),
            lookup.len()
        );

        Self { units, lookup }
    }

    /// Total number of strips across all units
    pub fn strip_count(&self) -> usize {
        self.lookup.len()
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, position: usize) -> Option<&Unit> {
        self.units.get(position)
    }

    /// Chain position of the centre unit
    pub fn center_position(&self) -> usize {
        self.units
            .iter()
            .position(|u| u.role == UnitRole::Center)
            .unwrap_or(0)
    }

    /// Convert (unit position, local strip index) to a global strip index
    pub fn global_index(&self, unit: usize, local_index: usize) -> Result<usize, ChainError> {
        let u = self.units.get(unit).ok_or(ChainError::UnknownUnit(unit))?;
        if local_index >= u.strips.len() {
            return Err(ChainError::OutOfRange {
                index: u.stack_offset + local_index,
                total: self.strip_count(),
            });
        }
        Ok(u.stack_offset + local_index)
    }

    /// Strip at a global index
    pub fn strip_at(&self, global_index: usize) -> Result<&Strip, ChainError> {
        let (unit, local) = self.locate(global_index)?;
        Ok(&self.units[unit].strips[local])
    }

    /// (unit position, local index) of a global strip index
    pub fn locate(&self, global_index: usize) -> Result<(usize, usize), ChainError> {
        self.lookup
            .get(global_index)
            .copied()
            .ok_or(ChainError::OutOfRange {
                index: global_index,
                total: self.strip_count(),
            })
    }

    /// Record a fader touch; returns false for an unknown strip
    pub fn set_touched(&mut self, global_index: usize, touched: bool) -> bool {
        match self.locate(global_index) {
            Ok((unit, local)) => {
                self.units[unit].strips[local].touched = touched;
                true
            }
            Err(_) => false,
        }
    }

    pub fn any_touched(&self) -> bool {
        self.units
            .iter()
            .flat_map(|u| u.strips.iter())
            .any(|s| s.touched)
    }
}
