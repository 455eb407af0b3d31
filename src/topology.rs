//! Topology navigator.
//!
//! Keeps the last known membership of the monitored deployment, grouped by
//! role, and a cursor over it. A standalone server shows up as a single
//! entry in the leader slot.

use crate::config::Address;
use crate::highlight::{Highlight, HighlightAllocator};
use crate::model::{Role, Snapshot};

const ROLES: [Role; 3] = [Role::Leader, Role::Follower, Role::ReadReplica];

#[derive(Debug, Clone)]
pub struct Navigator {
    home: Address,
    scheme: String,
    /// Flattened in role order: leaders, followers, read replicas.
    entries: Vec<(Role, Address)>,
    cluster: bool,
    cursor: Option<usize>,
}

impl Navigator {
    pub fn new(home: Address) -> Self {
        Self {
            home,
            scheme: "http".to_string(),
            entries: Vec::new(),
            cluster: false,
            cursor: None,
        }
    }

    /// Scheme of the advertised member address to use.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn home_address(&self) -> &Address {
        &self.home
    }

    /// Replaces the topology with the one `snapshot` describes. `None`
    /// keeps the last known topology. Returns whether anything changed.
    ///
    /// The cursor follows the focused address; without one it starts on the
    /// home address, or the first entry.
    pub fn rebuild(&mut self, snapshot: Option<&Snapshot>) -> bool {
        let Some(snapshot) = snapshot else {
            return false;
        };

        let (entries, cluster) = match &snapshot.cluster {
            Some(overview) => {
                let mut entries = Vec::new();
                for role in ROLES {
                    for member in overview.with_role(role) {
                        if let Some(address) = member.address_for(&self.scheme) {
                            entries.push((role, address));
                        }
                    }
                }
                (entries, true)
            }
            None => (vec![(Role::Leader, snapshot.address.clone())], false),
        };
        if entries == self.entries && cluster == self.cluster {
            return false;
        }

        let focused = self.focused_address().cloned();
        self.entries = entries;
        self.cluster = cluster;
        self.cursor = match focused {
            Some(address) => self.index_of(&address).or(Some(0)),
            None => self.index_of(&self.home).or(Some(0)),
        }
        .filter(|_| !self.entries.is_empty());
        true
    }

    fn index_of(&self, address: &Address) -> Option<usize> {
        self.entries.iter().position(|(_, a)| a == address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_cluster(&self) -> bool {
        self.cluster
    }

    pub fn entries(&self) -> &[(Role, Address)] {
        &self.entries
    }

    /// Non-empty role groups with their display labels.
    pub fn sections(&self) -> Vec<(&'static str, Vec<&Address>)> {
        ROLES
            .iter()
            .filter_map(|&role| {
                let addresses: Vec<&Address> = self
                    .entries
                    .iter()
                    .filter(|(r, _)| *r == role)
                    .map(|(_, a)| a)
                    .collect();
                if addresses.is_empty() {
                    return None;
                }
                let label = match role {
                    Role::Leader if self.cluster => "Leader",
                    Role::Leader => "Server",
                    Role::Follower => "Followers",
                    Role::ReadReplica => "Read replicas",
                };
                Some((label, addresses))
            })
            .collect()
    }

    /// Cursor as (role, index within that role).
    pub fn focused(&self) -> Option<(Role, usize)> {
        let i = self.cursor?;
        let (role, _) = self.entries.get(i)?;
        let within = self.entries[..i].iter().filter(|(r, _)| r == role).count();
        Some((*role, within))
    }

    pub fn focused_address(&self) -> Option<&Address> {
        self.cursor
            .and_then(|i| self.entries.get(i))
            .map(|(_, a)| a)
    }

    /// Moves the cursor to `address` if it is part of the topology.
    pub fn focus(&mut self, address: &Address) -> bool {
        match self.index_of(address) {
            Some(i) => {
                self.cursor = Some(i);
                true
            }
            None => false,
        }
    }

    fn move_to(&mut self, target: usize) -> bool {
        if self.entries.len() <= 1 || self.cursor == Some(target) {
            return false;
        }
        self.cursor = Some(target);
        true
    }

    pub fn home(&mut self) -> bool {
        self.move_to(0)
    }

    pub fn end(&mut self) -> bool {
        self.move_to(self.entries.len().saturating_sub(1))
    }

    /// Previous entry, wrapping from the first to the last.
    pub fn page_up(&mut self) -> bool {
        let n = self.entries.len();
        match self.cursor {
            Some(i) if n > 1 => self.move_to((i + n - 1) % n),
            _ => false,
        }
    }

    /// Next entry, wrapping from the last to the first.
    pub fn page_down(&mut self) -> bool {
        let n = self.entries.len();
        match self.cursor {
            Some(i) if n > 1 => self.move_to((i + 1) % n),
            _ => false,
        }
    }

    /// Addresses holding a highlight, in topology order.
    pub fn tracked(&self, allocator: &HighlightAllocator) -> Vec<(Address, Highlight)> {
        self.entries
            .iter()
            .filter_map(|(_, a)| allocator.get(a).map(|h| (a.clone(), h)))
            .collect()
    }
}
