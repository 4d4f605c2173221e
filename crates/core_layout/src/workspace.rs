//! Per-monitor workspace state: an ordered slot map plus the applied preset.

use crate::backend::{PlacementError, WindowBackend};
use crate::layout::{compute_slots, LayoutPreset, LayoutSettings};
use crate::{LayoutError, Rect, WindowId};
use std::collections::BTreeSet;
use tracing::debug;

/// A window sitting in a slot, with the assignment stamp used to resolve
/// duplicate entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub window: WindowId,
    pub stamp: u64,
}

/// Outcome of showing or hiding every window of a workspace.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    /// Windows the backend reported dead.
    pub stale: Vec<WindowId>,
    /// Windows whose placement the OS refused, with the reason.
    pub rejected: Vec<(WindowId, String)>,
    /// Windows successfully shown (activation only).
    pub shown: Vec<WindowId>,
}

impl ActivationReport {
    fn absorb(&mut self, error: PlacementError) {
        match error {
            PlacementError::Stale(window) => self.stale.push(window),
            PlacementError::Rejected { window, reason } => self.rejected.push((window, reason)),
        }
    }
}

/// One of the three workspaces owned by a monitor.
///
/// The slot map always holds `preset.capacity()` slots, so a partially
/// filled grid has trailing empty slots. Rectangles are kept alongside the
/// slots and survive deactivation untouched.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    slots: Vec<Option<Occupant>>,
    rects: Vec<Rect>,
    preset: Option<LayoutPreset>,
    active: bool,
    pending: BTreeSet<WindowId>,
}

impl Workspace {
    /// Create an empty workspace.
    pub fn new(active: bool) -> Self {
        Self {
            active,
            ..Default::default()
        }
    }

    /// Currently applied preset, `None` while empty.
    pub fn preset(&self) -> Option<LayoutPreset> {
        self.preset
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of slots (occupied or not).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Window in slot `index`, if any.
    pub fn slot_at(&self, index: usize) -> Option<WindowId> {
        self.slots.get(index).copied().flatten().map(|o| o.window)
    }

    /// Recorded rectangle of slot `index`.
    pub fn slot_rect(&self, index: usize) -> Option<Rect> {
        self.rects.get(index).copied()
    }

    /// All slot rectangles in slot order.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Slot index holding `window`.
    pub fn window_slot(&self, window: WindowId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.is_some_and(|o| o.window == window))
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.window_slot(window).is_some()
    }

    /// Occupied windows in slot order.
    pub fn windows(&self) -> Vec<WindowId> {
        self.slots.iter().flatten().map(|o| o.window).collect()
    }

    /// Occupied slots with their index, in slot order.
    pub fn occupants(&self) -> impl Iterator<Item = (usize, Occupant)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|o| (i, o)))
    }

    /// First empty slot.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Slot a newly added window goes to without changing the preset: the
    /// one after the last occupied slot, or the first hole when the tail
    /// is full.
    pub fn append_slot(&self) -> Option<usize> {
        let after_last = self.occupants().last().map_or(0, |(i, _)| i + 1);
        if after_last < self.slots.len() {
            Some(after_last)
        } else {
            self.first_free_slot()
        }
    }

    /// Put `window` into slot `index`.
    ///
    /// Re-assigning a window to the slot it already holds only refreshes
    /// its stamp.
    pub fn assign(&mut self, window: WindowId, index: usize, stamp: u64) -> Result<(), LayoutError> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(LayoutError::SlotOutOfBounds(index, capacity))?;
        match slot {
            Some(occupant) if occupant.window != window => {
                Err(LayoutError::SlotOccupied(index, occupant.window))
            }
            _ => {
                *slot = Some(Occupant { window, stamp });
                Ok(())
            }
        }
    }

    /// Remove `window` from every slot it occupies. Returns the first slot
    /// it was found in.
    pub fn unassign(&mut self, window: WindowId) -> Option<usize> {
        let mut found = None;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some_and(|o| o.window == window) {
                *slot = None;
                found.get_or_insert(index);
            }
        }
        self.pending.remove(&window);
        found
    }

    /// Empty slot `index` and return what it held.
    pub(crate) fn clear_slot(&mut self, index: usize) -> Option<Occupant> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Exchange the contents of two slots.
    pub fn swap_slots(&mut self, a: usize, b: usize) -> Result<(), LayoutError> {
        let capacity = self.slots.len();
        for index in [a, b] {
            if index >= capacity {
                return Err(LayoutError::SlotOutOfBounds(index, capacity));
            }
        }
        self.slots.swap(a, b);
        Ok(())
    }

    /// Close the hole at `index`: every later slot moves down by one.
    ///
    /// Returns the windows that changed slot with their new index.
    pub(crate) fn shift_down_from(&mut self, index: usize) -> Vec<(WindowId, usize)> {
        if index >= self.slots.len() {
            return Vec::new();
        }
        self.slots.remove(index);
        self.slots.push(None);
        self.slots
            .iter()
            .enumerate()
            .skip(index)
            .filter_map(|(i, s)| s.map(|o| (o.window, i)))
            .collect()
    }

    /// Replace the slot map: apply `preset` and fill slots with `order`.
    ///
    /// Windows past the preset capacity are dropped from the map and
    /// returned to the caller.
    pub fn apply_layout(
        &mut self,
        preset: Option<LayoutPreset>,
        order: &[WindowId],
        area: Rect,
        settings: &LayoutSettings,
        stamp: u64,
    ) -> Vec<WindowId> {
        let Some(preset) = preset else {
            self.clear();
            return order.to_vec();
        };
        self.preset = Some(preset);

        let capacity = preset.capacity();
        self.rects = compute_slots(capacity, area, preset, settings);
        self.slots = vec![None; capacity];
        for (slot, &window) in self.slots.iter_mut().zip(order) {
            *slot = Some(Occupant { window, stamp });
        }
        self.pending.retain(|w| order.contains(w));

        debug!(
            "Applied {} layout to {} windows",
            preset.label(),
            order.len().min(capacity)
        );
        order.iter().skip(capacity).copied().collect()
    }

    /// Replace the slot map with explicit assignments of `(slot, window)`.
    ///
    /// Slots without an assignment stay free. The caller validates that
    /// every slot is within the preset capacity.
    pub fn assign_layout(
        &mut self,
        preset: LayoutPreset,
        assignments: &[(usize, WindowId)],
        area: Rect,
        settings: &LayoutSettings,
        stamp: u64,
    ) {
        let capacity = preset.capacity();
        self.preset = Some(preset);
        self.rects = compute_slots(capacity, area, preset, settings);
        self.slots = vec![None; capacity];
        for &(slot, window) in assignments {
            if let Some(entry) = self.slots.get_mut(slot) {
                *entry = Some(Occupant { window, stamp });
            }
        }
        self.pending.clear();
        debug!(
            "Applied manual {} layout to {} windows",
            preset.label(),
            assignments.len()
        );
    }

    /// Drop every assignment and the preset.
    pub fn clear(&mut self) {
        self.preset = None;
        self.slots.clear();
        self.rects.clear();
        self.pending.clear();
    }

    /// Recompute slot rectangles for a new area or settings, keeping every
    /// assignment.
    pub fn relayout(&mut self, area: Rect, settings: &LayoutSettings) {
        if let Some(preset) = self.preset {
            self.rects = compute_slots(preset.capacity(), area, preset, settings);
        }
    }

    /// Remember that `window` missed a placement and needs one later.
    pub(crate) fn defer(&mut self, window: WindowId) {
        self.pending.insert(window);
    }

    /// Drain windows whose placement was deferred.
    pub(crate) fn take_pending(&mut self) -> Vec<WindowId> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Show every window at its recorded rectangle.
    ///
    /// Dead windows are skipped and reported. Windows for which
    /// `keep_geometry` returns true are shown without being moved.
    pub fn activate<B: WindowBackend>(
        &mut self,
        backend: &mut B,
        keep_geometry: impl Fn(WindowId) -> bool,
    ) -> ActivationReport {
        self.active = true;
        let mut report = ActivationReport::default();

        for (index, occupant) in self.occupants().collect::<Vec<_>>() {
            let window = occupant.window;
            if !backend.is_alive(window) {
                report.stale.push(window);
                continue;
            }
            if let Err(e) = backend.show(window) {
                report.absorb(e);
                continue;
            }
            if !keep_geometry(window) {
                if let Some(rect) = self.rects.get(index).copied() {
                    if let Err(e) = backend.move_resize(window, rect) {
                        report.absorb(e);
                        continue;
                    }
                }
            }
            report.shown.push(window);
        }
        report
    }

    /// Hide every window. Slot geometry is left as recorded.
    pub fn deactivate<B: WindowBackend>(&mut self, backend: &mut B) -> ActivationReport {
        self.active = false;
        let mut report = ActivationReport::default();
        for window in self.windows() {
            if let Err(e) = backend.hide(window) {
                report.absorb(e);
            }
        }
        report
    }
}
