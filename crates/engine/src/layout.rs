//! Grid sizing for a step and expansion of its repeat band.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stepform_types::{GridPlacement, Step};
use stepform_util::interpolation_tokens;

use crate::fields::FieldValues;

/// Viewports at least this wide use the declared column sizes verbatim.
pub const DESKTOP_BREAKPOINT: u32 = 768;

/// Size given to columns no element occupies on narrow viewports.
pub const COLLAPSED_COLUMN: &str = "10px";

/// Width of the viewport the step is laid out for, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
}

impl Viewport {
    pub fn new(width: u32) -> Self {
        Self { width }
    }

    pub fn is_desktop(&self) -> bool {
        self.width >= DESKTOP_BREAKPOINT
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1024 }
    }
}

/// Computed grid geometry of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dimensions {
    /// Fixed container width in pixels on narrow viewports; `None` means fluid.
    pub width: Option<f64>,
    pub columns: Vec<String>,
    pub rows: Vec<String>,
}

/// Computes the row and column templates for `step` on `viewport`.
///
/// Rows become `minmax(<declared>,min-content)`, with the repeat band duplicated as a
/// block once per repetition (at least once). On narrow viewports, columns that no
/// element references collapse to [`COLLAPSED_COLUMN`] and the width is the sum of the
/// pixel-sized columns. An element references every column it spans.
pub fn calculate_dimensions(step: &Step, viewport: Viewport, values: &FieldValues) -> Dimensions {
    let rows = expand_rows(step, calculate_repeated_row_count(step, values))
        .into_iter()
        .map(|size| format!("minmax({size},min-content)"))
        .collect();

    if viewport.is_desktop() {
        return Dimensions {
            width: None,
            columns: step.grid_columns.clone(),
            rows,
        };
    }

    let referenced = referenced_columns(step);
    let columns: Vec<String> = step
        .grid_columns
        .iter()
        .enumerate()
        .map(|(index, size)| if referenced.contains(&index) { size.clone() } else { COLLAPSED_COLUMN.to_string() })
        .collect();
    let width = columns.iter().filter_map(|size| pixel_size(size)).sum();

    Dimensions {
        width: Some(width),
        columns,
        rows,
    }
}

/// Number of times the repeat band of `step` is materialized.
///
/// The count is the longest array among the values referenced by `{{token}}`
/// interpolations in text fields that overlap the band, and the values of servars
/// flagged `repeated`. Missing or non-array values count as zero.
pub fn calculate_repeated_row_count(step: &Step, values: &FieldValues) -> usize {
    let array_len = |key: &str| match values.get(key) {
        Some(Value::Array(items)) => items.len(),
        _ => 0,
    };

    let from_text = step.repeat_band().into_iter().flat_map(move |band| {
        step.text_fields
            .iter()
            .filter(move |field| band.intersects(field.placement.row_index, field.placement.row_end()))
            .flat_map(|field| interpolation_tokens(&field.text))
    });
    let text_max = from_text.map(|token| array_len(&token)).max().unwrap_or(0);

    let servar_max = step
        .servars()
        .filter(|servar| servar.repeated)
        .map(|servar| array_len(&servar.key))
        .max()
        .unwrap_or(0);

    text_max.max(servar_max)
}

fn expand_rows(step: &Step, repetitions: usize) -> Vec<&str> {
    let rows: Vec<&str> = step.grid_rows.iter().map(String::as_str).collect();
    let Some(band) = step.repeat_band().filter(|band| band.start < rows.len()) else {
        return rows;
    };
    let end = band.end.min(rows.len() - 1);

    let mut expanded = Vec::with_capacity(rows.len() + (end - band.start + 1) * repetitions.saturating_sub(1));
    expanded.extend_from_slice(&rows[..band.start]);
    for _ in 0..repetitions.max(1) {
        expanded.extend_from_slice(&rows[band.start..=end]);
    }
    expanded.extend_from_slice(&rows[end + 1..]);
    expanded
}

// Every column an element spans counts as referenced, not only its starting column, so
// a wide element keeps all of its columns on narrow viewports.
fn referenced_columns(step: &Step) -> BTreeSet<usize> {
    let placements = step
        .progress_bar
        .iter()
        .map(|bar| &bar.placement)
        .chain(step.text_fields.iter().map(|field| &field.placement))
        .chain(step.servar_fields.iter().map(|field| &field.placement));
    placements.flat_map(|placement: &GridPlacement| placement.column_index..=placement.column_end()).collect()
}

fn pixel_size(size: &str) -> Option<f64> {
    size.trim().strip_suffix("px")?.trim().parse().ok()
}
