//! Context bundle assembly.
//!
//! Routed items are packed, in order, into a tagged text block for a code
//! editing agent:
//!
//! ```text
//! <context_aware_context>
//!   <item id='class:orders.py:OrderProcessor' layer='SEMANTIC'>
//!     class OrderProcessor
//!   </item>
//! </context_aware_context>
//! ```
//!
//! The bundle is bounded by a character budget. Items that no longer fit
//! are dropped from the tail and the bundle is marked truncated; a first
//! item larger than the whole budget is cut to fit rather than dropped.

use std::fmt;

use serde::Serialize;

use crate::context::budget::{truncate_to_fit, CharBudget};
use crate::types::Item;

const OPEN_TAG: &str = "<context_aware_context>";
const CLOSE_TAG: &str = "</context_aware_context>";
const EMPTY_MARKER: &str = "  <!-- No context found -->";

/// Items selected for one query, ready to render.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    pub items: Vec<Item>,
    /// True when items were dropped or cut to respect the budget.
    pub truncated: bool,
    /// Number of routed items left out.
    pub omitted: usize,
}

impl ContextBundle {
    /// Pack `items` in order until `max_chars` of rendered output is used.
    pub fn assemble(items: Vec<Item>, max_chars: usize) -> Self {
        let frame = OPEN_TAG.len() + CLOSE_TAG.len() + 2;
        let mut budget = CharBudget::new(max_chars.saturating_sub(frame));
        let mut bundle = ContextBundle::default();
        let total = items.len();

        for mut item in items {
            if budget.try_take(block_cost(&item, &item.content)) {
                bundle.items.push(item);
                continue;
            }
            if bundle.items.is_empty() {
                let mut room = budget.remaining();
                while room > 0 {
                    let cut = truncate_to_fit(&item.content, room);
                    let cost = block_cost(&item, &cut);
                    if budget.try_take(cost) {
                        item.content = cut;
                        bundle.items.push(item);
                        break;
                    }
                    room = room.saturating_sub((cost - budget.remaining()).max(1));
                }
            }
            bundle.truncated = true;
            break;
        }

        bundle.omitted = total - bundle.items.len();
        bundle
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = vec![OPEN_TAG.to_string()];
        if self.items.is_empty() {
            out.push(EMPTY_MARKER.to_string());
        }
        for item in &self.items {
            out.push(render_item(item));
        }
        if self.omitted > 0 {
            out.push(format!("  <!-- {} more items omitted -->", self.omitted));
        }
        out.push(CLOSE_TAG.to_string());
        out.join("\n")
    }
}

impl fmt::Display for ContextBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One `<item>` block with content indented four spaces.
fn render_item(item: &Item) -> String {
    render_block(item, &item.content)
}

/// Rendered size of `item` carrying `content`, plus its line break.
fn block_cost(item: &Item, content: &str) -> usize {
    render_block(item, content).chars().count() + 1
}

fn render_block(item: &Item, content: &str) -> String {
    let mut block = format!("  <item id='{}' layer='{}'>", item.id, item.layer);
    for line in content.split('\n') {
        block.push_str("\n    ");
        block.push_str(line);
    }
    block.push_str("\n  </item>");
    block
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
