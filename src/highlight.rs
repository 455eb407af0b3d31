//! Highlight tokens marking which endpoints have a panel open.
//!
//! The pool is small and fixed; every tracked address holds exactly one
//! token and a token is never shared.

use std::collections::{BTreeSet, HashMap};

use ratatui::style::{Color, Style};

use crate::config::Address;

const PALETTE: [(&str, Color); 8] = [
    ("member-1", Color::Green),
    ("member-2", Color::Cyan),
    ("member-3", Color::Blue),
    ("member-4", Color::LightMagenta),
    ("member-5", Color::Magenta),
    ("member-6", Color::Red),
    ("member-7", Color::LightRed),
    ("member-8", Color::Yellow),
];

/// Largest pool the palette supports.
pub const MAX_HIGHLIGHTS: usize = PALETTE.len();

/// One token of the palette. Orders like its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Highlight(usize);

impl Highlight {
    /// `member-1` .. `member-8`.
    pub fn name(&self) -> &'static str {
        PALETTE[self.0].0
    }

    pub fn color(&self) -> Color {
        PALETTE[self.0].1
    }

    /// Marker style: the token colour as background.
    pub fn style(&self) -> Style {
        Style::default().bg(self.color()).fg(Color::Black)
    }
}

#[derive(Debug, Clone)]
pub struct HighlightAllocator {
    assigned: HashMap<Address, Highlight>,
    free: BTreeSet<Highlight>,
    capacity: usize,
}

impl HighlightAllocator {
    /// Pool of `capacity` tokens, capped at [`MAX_HIGHLIGHTS`].
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_HIGHLIGHTS);
        Self {
            assigned: HashMap::new(),
            free: (0..capacity).map(Highlight).collect(),
            capacity,
        }
    }

    /// Token of `address`, assigning the first free one if it has none.
    /// `None` when the pool is exhausted.
    pub fn assign(&mut self, address: &Address) -> Option<Highlight> {
        if let Some(&token) = self.assigned.get(address) {
            return Some(token);
        }
        let token = self.free.pop_first()?;
        self.assigned.insert(address.clone(), token);
        Some(token)
    }

    /// Returns `address`'s token to the pool.
    pub fn unassign(&mut self, address: &Address) -> Option<Highlight> {
        let token = self.assigned.remove(address)?;
        self.free.insert(token);
        Some(token)
    }

    pub fn get(&self, address: &Address) -> Option<Highlight> {
        self.assigned.get(address).copied()
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HighlightAllocator {
    fn default() -> Self {
        Self::new(MAX_HIGHLIGHTS)
    }
}
