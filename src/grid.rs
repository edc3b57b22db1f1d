//! ==============================================================================
//! grid.rs - detail panel placement in the wrapping card grid
//! ==============================================================================
//!
//! purpose:
//!     cards wrap into rows of `columns_per_row`. the full-width detail panel
//!     must sit right after the last card of the row holding the clicked card,
//!     otherwise it would split that row in two:
//!
//!         row 0:  [0] [1] [2] [3]
//!         row 1:  [4] [5] [6] [7]      click on 5 -> panel after 7
//!                 [ detail panel  ]
//!         row 2:  [8] [9]              click on 9 -> panel after 9
//!
//!     column count comes from live widths on every open since it depends on
//!     the viewport.
//!
//! ==============================================================================

use crate::card::CardKey;
use serde::{Deserialize, Serialize};

/// widths measured by the browser when the card was clicked
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct LayoutMetrics {
    pub container_width: f64,
    pub card_width: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GridPlacement {
    pub container_width_px: f64,
    pub card_width_px: f64,
    pub columns_per_row: usize,
    pub card_index_in_flow: usize,
    pub column_offset_in_row: usize,
}

impl GridPlacement {
    pub fn measure(metrics: LayoutMetrics, card_index: usize) -> Self {
        let columns_per_row = columns_per_row(metrics.container_width, metrics.card_width);
        Self {
            container_width_px: metrics.container_width,
            card_width_px: metrics.card_width,
            columns_per_row,
            card_index_in_flow: card_index,
            column_offset_in_row: card_index % columns_per_row,
        }
    }

    /// cards to the right of the clicked one in the same row
    pub fn remaining_in_row(&self) -> usize {
        self.columns_per_row - self.column_offset_in_row - 1
    }

    /// slot after which the panel goes, never past `sibling_count - 1`
    pub fn anchor_index(&self, sibling_count: usize) -> usize {
        let following = sibling_count.saturating_sub(self.card_index_in_flow + 1);
        self.card_index_in_flow + self.remaining_in_row().min(following)
    }
}

/// floor(container / card), one column whenever the widths are unusable
pub fn columns_per_row(container_width: f64, card_width: f64) -> usize {
    if !(container_width.is_finite() && card_width.is_finite()) || container_width <= 0.0 || card_width <= 0.0 {
        return 1;
    }
    let columns = (container_width / card_width).floor();
    if columns < 1.0 {
        1
    } else {
        columns as usize
    }
}

// ==============================================================================
// grid contents
// ==============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GridSlot {
    Card(CardKey),
    Detail,
}

/// flow order of the grid; holds at most one detail slot
#[derive(Clone, Debug, Default)]
pub struct CardGrid {
    slots: Vec<GridSlot>,
}

impl CardGrid {
    pub fn new<I: IntoIterator<Item = CardKey>>(keys: I) -> Self {
        Self { slots: keys.into_iter().map(GridSlot::Card).collect() }
    }

    pub fn slots(&self) -> &[GridSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn position_of(&self, key: &CardKey) -> Option<usize> {
        self.slots.iter().position(|s| matches!(s, GridSlot::Card(k) if k == key))
    }

    pub fn detail_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| *s == GridSlot::Detail)
    }

    pub fn remove_detail(&mut self) -> bool {
        let before = self.slots.len();
        self.slots.retain(|s| *s != GridSlot::Detail);
        before != self.slots.len()
    }

    /// place the detail slot for a click on `key`, returns its slot index
    pub fn open_detail_for(&mut self, key: &CardKey, metrics: LayoutMetrics) -> Option<(GridPlacement, usize)> {
        self.remove_detail();
        let index = self.position_of(key)?;
        let placement = GridPlacement::measure(metrics, index);
        let slot = placement.anchor_index(self.len()) + 1;
        self.slots.insert(slot, GridSlot::Detail);
        Some((placement, slot))
    }
}
