//! Layout presets and slot geometry.
//!
//! [`compute_slots`] is a pure function: the same count, area, preset and
//! settings always produce the same ordered rectangles. Slots are ordered
//! left-to-right, top-to-bottom, and the slots for `n` windows are always a
//! prefix of the preset's full cell set. Swap-mode adjacency and drag
//! hit-testing both rely on that ordering.

use crate::{LayoutError, Rect};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Hard ceiling on tiled windows per workspace. Windows past it float.
pub const MAX_SLOTS: usize = 15;

/// Maximum number of grid columns.
pub const MAX_COLUMNS: usize = 5;

/// Maximum number of grid rows.
pub const MAX_ROWS: usize = 3;

/// Geometry parameters shared by every preset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSettings {
    /// Gap between adjacent slots in pixels.
    pub gap: i32,
    /// Padding between the work-area edge and the outermost slots.
    pub outer_padding: i32,
    /// Share of the usable width given to the master slot (0.0..1.0).
    pub master_ratio: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            gap: 8,
            outer_padding: 8,
            master_ratio: 0.5,
        }
    }
}

/// A layout preset: a pure mapping from window count and area to slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayoutPreset {
    /// One slot covering the padded work area.
    Full,
    /// Two equal columns.
    Split,
    /// One master column plus two stacked slots on the other side.
    MasterStack,
    /// Regular grid, filled row by row.
    Grid { rows: usize, cols: usize },
}

impl LayoutPreset {
    /// Default preset for a window count. `None` for an empty workspace.
    ///
    /// Counts above [`MAX_SLOTS`] map to the largest grid.
    pub fn for_count(count: usize) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(Self::Full),
            2 => Some(Self::Split),
            3 => Some(Self::MasterStack),
            n => {
                let n = n.min(MAX_SLOTS);
                let mut cols = ceil_sqrt(n).min(MAX_COLUMNS);
                let mut rows = n.div_ceil(cols);
                if rows > MAX_ROWS {
                    rows = MAX_ROWS;
                    cols = n.div_ceil(MAX_ROWS).min(MAX_COLUMNS);
                }
                Some(Self::Grid { rows, cols })
            }
        }
    }

    /// Number of slots (cells) the preset provides.
    pub fn capacity(&self) -> usize {
        match *self {
            Self::Full => 1,
            Self::Split => 2,
            Self::MasterStack => 3,
            Self::Grid { rows, cols } => rows * cols,
        }
    }

    /// Smallest window count for which this preset is the default.
    ///
    /// Dropping below it means the workspace needs a different preset.
    pub fn min_count(&self) -> usize {
        match *self {
            Self::Full => 1,
            Self::Split => 2,
            Self::MasterStack => 3,
            Self::Grid { rows, cols } => (1..=MAX_SLOTS)
                .find(|&n| Self::for_count(n) == Some(*self))
                .unwrap_or_else(|| (rows.saturating_sub(1) * cols + 1).max(1)),
        }
    }

    /// Grid coordinates `(col, row)` of a slot index.
    pub fn cell_of(&self, index: usize) -> Option<(usize, usize)> {
        if index >= self.capacity() {
            return None;
        }
        Some(match *self {
            Self::Full => (0, 0),
            Self::Split => (index, 0),
            Self::MasterStack => match index {
                0 => (0, 0),
                i => (1, i - 1),
            },
            Self::Grid { cols, .. } => (index % cols, index / cols),
        })
    }

    /// Slot index occupying grid cell `(col, row)`.
    ///
    /// The master slot spans both rows of the left column.
    pub fn slot_at_cell(&self, col: usize, row: usize) -> Option<usize> {
        match *self {
            Self::Full => (col == 0 && row == 0).then_some(0),
            Self::Split => (row == 0 && col < 2).then_some(col),
            Self::MasterStack => match (col, row) {
                (0, 0 | 1) => Some(0),
                (1, r @ (0 | 1)) => Some(1 + r),
                _ => None,
            },
            Self::Grid { rows, cols } => (col < cols && row < rows).then_some(row * cols + col),
        }
    }

    /// Short human-readable name, used in logs and IPC state.
    pub fn label(&self) -> String {
        match *self {
            Self::Full => "full".to_string(),
            Self::Split => "split".to_string(),
            Self::MasterStack => "master_stack".to_string(),
            Self::Grid { rows, cols } => format!("grid {}x{}", cols, rows),
        }
    }
}

impl FromStr for LayoutPreset {
    type Err = LayoutError;

    /// Parse a preset name as produced by [`LayoutPreset::label`].
    ///
    /// `side_by_side` is accepted for [`LayoutPreset::Split`] and dashes
    /// may stand in for underscores. Grids are written `grid CxR` with at
    /// most [`MAX_COLUMNS`] columns and [`MAX_ROWS`] rows.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase().replace('-', "_");
        match name.as_str() {
            "full" => return Ok(Self::Full),
            "split" | "side_by_side" => return Ok(Self::Split),
            "master_stack" => return Ok(Self::MasterStack),
            _ => {}
        }

        let unknown = || LayoutError::UnknownPreset(s.trim().to_string());
        let shape = name
            .strip_prefix("grid")
            .ok_or_else(unknown)?
            .trim_start_matches([' ', ':', '_']);
        let (cols, rows) = shape.split_once('x').ok_or_else(unknown)?;
        let cols: usize = cols.parse().map_err(|_| unknown())?;
        let rows: usize = rows.parse().map_err(|_| unknown())?;
        if !(1..=MAX_COLUMNS).contains(&cols) || !(1..=MAX_ROWS).contains(&rows) {
            return Err(unknown());
        }
        Ok(Self::Grid { rows, cols })
    }
}

/// Compute the ordered slot rectangles for `n` windows.
///
/// Returns `min(n, preset.capacity())` rectangles. The result for `n` is a
/// prefix of the result for `preset.capacity()`.
pub fn compute_slots(
    n: usize,
    area: Rect,
    preset: LayoutPreset,
    settings: &LayoutSettings,
) -> Vec<Rect> {
    let n = n.min(preset.capacity());
    if n == 0 {
        return Vec::new();
    }

    let inner = area.inset(settings.outer_padding);
    let gap = settings.gap.max(0);

    let mut cells = match preset {
        LayoutPreset::Full => vec![inner],
        LayoutPreset::Split => split_span(inner.x, inner.width, 2, gap)
            .into_iter()
            .map(|(x, w)| Rect::new(x, inner.y, w, inner.height))
            .collect(),
        LayoutPreset::MasterStack => {
            let usable = (inner.width - gap).max(0);
            let ratio = settings.master_ratio.clamp(0.1, 0.9);
            let master_width = ((f64::from(usable) * ratio).round() as i32).clamp(0, usable);
            let stack_x = inner.x + master_width + gap;
            let stack_width = usable - master_width;

            let mut cells = vec![Rect::new(inner.x, inner.y, master_width, inner.height)];
            cells.extend(
                split_span(inner.y, inner.height, 2, gap)
                    .into_iter()
                    .map(|(y, h)| Rect::new(stack_x, y, stack_width, h)),
            );
            cells
        }
        LayoutPreset::Grid { rows, cols } => {
            let columns = split_span(inner.x, inner.width, cols, gap);
            let row_spans = split_span(inner.y, inner.height, rows, gap);
            row_spans
                .iter()
                .flat_map(|&(y, h)| columns.iter().map(move |&(x, w)| Rect::new(x, y, w, h)))
                .collect()
        }
    };

    cells.truncate(n);
    cells
}

/// Split `length` pixels starting at `start` into `parts` spans separated
/// by `gap`. The last span absorbs the integer-division remainder.
fn split_span(start: i32, length: i32, parts: usize, gap: i32) -> Vec<(i32, i32)> {
    let parts = parts.max(1);
    let count = parts as i32;
    let usable = (length - gap * (count - 1)).max(0);
    let base = usable / count;

    let mut spans = Vec::with_capacity(parts);
    let mut pos = start;
    for i in 0..parts {
        let size = if i + 1 == parts {
            usable - base * (count - 1)
        } else {
            base
        };
        spans.push((pos, size));
        pos += size + gap;
    }
    spans
}

/// Smallest `c` with `c * c >= n`.
fn ceil_sqrt(n: usize) -> usize {
    let mut c = 0;
    while c * c < n {
        c += 1;
    }
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas() -> Vec<Rect> {
        vec![
            Rect::new(0, 0, 1920, 1040),
            Rect::new(1920, 0, 2560, 1400),
            Rect::new(-1280, 200, 1280, 984),
            Rect::new(0, 0, 1001, 777),
        ]
    }

    fn assert_disjoint(rects: &[Rect]) {
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                assert!(!a.intersects(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_preset_for_count() {
        assert_eq!(LayoutPreset::for_count(0), None);
        assert_eq!(LayoutPreset::for_count(1), Some(LayoutPreset::Full));
        assert_eq!(LayoutPreset::for_count(2), Some(LayoutPreset::Split));
        assert_eq!(LayoutPreset::for_count(3), Some(LayoutPreset::MasterStack));

        let grid = |cols, rows| Some(LayoutPreset::Grid { rows, cols });
        assert_eq!(LayoutPreset::for_count(4), grid(2, 2));
        assert_eq!(LayoutPreset::for_count(5), grid(3, 2));
        assert_eq!(LayoutPreset::for_count(6), grid(3, 2));
        assert_eq!(LayoutPreset::for_count(7), grid(3, 3));
        assert_eq!(LayoutPreset::for_count(9), grid(3, 3));
        assert_eq!(LayoutPreset::for_count(10), grid(4, 3));
        assert_eq!(LayoutPreset::for_count(12), grid(4, 3));
        assert_eq!(LayoutPreset::for_count(13), grid(5, 3));
        assert_eq!(LayoutPreset::for_count(15), grid(5, 3));
        // Past the cap the largest grid is reused
        assert_eq!(LayoutPreset::for_count(40), grid(5, 3));
    }

    #[test]
    fn test_capacity_always_fits_count() {
        for n in 1..=MAX_SLOTS {
            let preset = LayoutPreset::for_count(n).unwrap();
            assert!(preset.capacity() >= n, "preset {:?} too small for {}", preset, n);
            assert!(preset.min_count() <= n);
        }
    }

    #[test]
    fn test_min_count() {
        assert_eq!(LayoutPreset::Full.min_count(), 1);
        assert_eq!(LayoutPreset::MasterStack.min_count(), 3);
        assert_eq!(LayoutPreset::Grid { rows: 2, cols: 2 }.min_count(), 4);
        assert_eq!(LayoutPreset::Grid { rows: 2, cols: 3 }.min_count(), 5);
        assert_eq!(LayoutPreset::Grid { rows: 3, cols: 3 }.min_count(), 7);
        assert_eq!(LayoutPreset::Grid { rows: 3, cols: 5 }.min_count(), 13);
    }

    #[test]
    fn test_exactly_n_disjoint_slots_inside_work_area() {
        let settings = LayoutSettings::default();
        for area in areas() {
            let inner = area.inset(settings.outer_padding);
            for n in 1..=MAX_SLOTS {
                let preset = LayoutPreset::for_count(n).unwrap();
                let slots = compute_slots(n, area, preset, &settings);
                assert_eq!(slots.len(), n);
                assert_disjoint(&slots);
                for slot in &slots {
                    assert!(slot.x >= inner.x && slot.right() <= inner.right());
                    assert!(slot.y >= inner.y && slot.bottom() <= inner.bottom());
                }
            }
        }
    }

    #[test]
    fn test_full_cell_set_covers_work_area_minus_gaps() {
        let settings = LayoutSettings::default();
        let gap = i64::from(settings.gap);
        for area in areas() {
            let inner = area.inset(settings.outer_padding);
            let (w, h) = (i64::from(inner.width), i64::from(inner.height));
            for n in 1..=MAX_SLOTS {
                let preset = LayoutPreset::for_count(n).unwrap();
                let cells = compute_slots(preset.capacity(), area, preset, &settings);
                let covered: i64 = cells.iter().map(Rect::area).sum();
                let expected = match preset {
                    LayoutPreset::Full => w * h,
                    LayoutPreset::Split => (w - gap) * h,
                    LayoutPreset::MasterStack => {
                        let stack_width = i64::from(cells[1].width);
                        (w - gap) * h - stack_width * gap
                    }
                    LayoutPreset::Grid { rows, cols } => {
                        (w - gap * (cols as i64 - 1)) * (h - gap * (rows as i64 - 1))
                    }
                };
                assert_eq!(covered, expected, "coverage mismatch for {:?}", preset);
            }
        }
    }

    #[test]
    fn test_compute_slots_is_deterministic() {
        let settings = LayoutSettings::default();
        let area = Rect::new(0, 0, 1920, 1040);
        for n in 1..=MAX_SLOTS {
            let preset = LayoutPreset::for_count(n).unwrap();
            let first = compute_slots(n, area, preset, &settings);
            let second = compute_slots(n, area, preset, &settings);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_adding_window_keeps_existing_order_within_preset() {
        let settings = LayoutSettings::default();
        let area = Rect::new(0, 0, 1920, 1040);
        for n in 1..MAX_SLOTS {
            let preset = LayoutPreset::for_count(n).unwrap();
            if LayoutPreset::for_count(n + 1) != Some(preset) {
                continue;
            }
            let before = compute_slots(n, area, preset, &settings);
            let after = compute_slots(n + 1, area, preset, &settings);
            assert_eq!(&after[..n], &before[..]);
        }
    }

    #[test]
    fn test_full_layout_matches_padded_area() {
        let settings = LayoutSettings::default();
        let slots = compute_slots(1, Rect::new(0, 0, 1920, 1040), LayoutPreset::Full, &settings);
        assert_eq!(slots, vec![Rect::new(8, 8, 1904, 1024)]);
    }

    #[test]
    fn test_split_has_equal_columns() {
        let settings = LayoutSettings::default();
        let slots = compute_slots(2, Rect::new(0, 0, 1920, 1040), LayoutPreset::Split, &settings);
        assert_eq!(slots[0], Rect::new(8, 8, 948, 1024));
        assert_eq!(slots[1], Rect::new(964, 8, 948, 1024));
    }

    #[test]
    fn test_master_stack_geometry() {
        let settings = LayoutSettings::default();
        let area = Rect::new(0, 0, 1920, 1040);
        let slots = compute_slots(3, area, LayoutPreset::MasterStack, &settings);
        let split = compute_slots(2, area, LayoutPreset::Split, &settings);

        // Half-width master lines up with the left split column
        assert_eq!(slots[0], split[0]);
        assert_eq!(slots[1].x, slots[2].x);
        assert_eq!(slots[1].y, 8);
        assert_eq!(slots[2].y, slots[1].bottom() + settings.gap);
        assert_eq!(slots[2].bottom(), 1032);
    }

    #[test]
    fn test_grid_row_major_order() {
        let settings = LayoutSettings::default();
        let preset = LayoutPreset::Grid { rows: 2, cols: 3 };
        let slots = compute_slots(6, Rect::new(0, 0, 1920, 1040), preset, &settings);
        assert!(slots[0].x < slots[1].x && slots[1].x < slots[2].x);
        assert_eq!(slots[0].y, slots[2].y);
        assert!(slots[3].y > slots[0].y);
        assert_eq!(slots[3].x, slots[0].x);
    }

    #[test]
    fn test_count_beyond_capacity_is_clamped() {
        let settings = LayoutSettings::default();
        let slots = compute_slots(5, Rect::new(0, 0, 1920, 1040), LayoutPreset::Split, &settings);
        assert_eq!(slots.len(), 2);
        assert!(compute_slots(0, Rect::new(0, 0, 1920, 1040), LayoutPreset::Full, &settings).is_empty());
    }

    #[test]
    fn test_cell_and_slot_mapping_roundtrip() {
        for n in 1..=MAX_SLOTS {
            let preset = LayoutPreset::for_count(n).unwrap();
            for index in 0..preset.capacity() {
                let (col, row) = preset.cell_of(index).unwrap();
                assert_eq!(preset.slot_at_cell(col, row), Some(index));
            }
            assert_eq!(preset.cell_of(preset.capacity()), None);
        }
    }

    #[test]
    fn test_master_spans_both_rows() {
        let preset = LayoutPreset::MasterStack;
        assert_eq!(preset.slot_at_cell(0, 1), Some(0));
        assert_eq!(preset.slot_at_cell(1, 1), Some(2));
        assert_eq!(preset.slot_at_cell(2, 0), None);
    }

    #[test]
    fn test_gap_change_moves_slots() {
        let area = Rect::new(0, 0, 1920, 1040);
        let narrow = LayoutSettings { gap: 4, ..Default::default() };
        let wide = LayoutSettings { gap: 20, ..Default::default() };
        let a = compute_slots(2, area, LayoutPreset::Split, &narrow);
        let b = compute_slots(2, area, LayoutPreset::Split, &wide);
        assert_ne!(a, b);
        assert_eq!(b[1].x - a[0].right(), 20 + (b[0].width - a[0].width));
    }

    #[test]
    fn test_preset_parses_labels() {
        for count in 1..=MAX_SLOTS {
            let preset = LayoutPreset::for_count(count).unwrap();
            assert_eq!(preset.label().parse::<LayoutPreset>(), Ok(preset));
        }
        assert_eq!("Side-by-side".parse(), Ok(LayoutPreset::Split));
        assert_eq!("master-stack".parse(), Ok(LayoutPreset::MasterStack));
        assert_eq!(
            "grid:4x3".parse(),
            Ok(LayoutPreset::Grid { rows: 3, cols: 4 })
        );
    }

    #[test]
    fn test_preset_rejects_unknown_names() {
        for name in ["", "spiral", "grid", "grid 6x2", "grid 2x4", "grid 0x1", "grid axb"] {
            assert_eq!(
                name.parse::<LayoutPreset>(),
                Err(LayoutError::UnknownPreset(name.to_string())),
                "{:?}",
                name
            );
        }
    }
}
