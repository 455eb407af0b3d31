//! Causal cluster membership.

use serde::{Deserialize, Serialize};

use crate::config::Address;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Leader,
    Follower,
    ReadReplica,
}

impl Role {
    /// Parses the `role` column of `dbms.cluster.overview()`.
    pub fn from_overview(s: &str) -> Option<Self> {
        match s {
            "LEADER" => Some(Role::Leader),
            "FOLLOWER" => Some(Role::Follower),
            "READ_REPLICA" => Some(Role::ReadReplica),
            _ => None,
        }
    }
}

/// One row of `dbms.cluster.overview()`.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct ClusterMember {
    pub id: String,
    pub role: Role,
    /// Advertised URIs, e.g. `bolt://core1:7687`.
    pub addresses: Vec<String>,
    pub groups: Vec<String>,
}

impl ClusterMember {
    /// Advertised address for `scheme`, falling back to the first one.
    pub fn address_for(&self, scheme: &str) -> Option<Address> {
        let prefix = format!("{}://", scheme);
        self.addresses
            .iter()
            .find(|uri| uri.starts_with(&prefix))
            .or_else(|| self.addresses.first())
            .and_then(|uri| uri.parse().ok())
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct ClusterOverview {
    pub members: Vec<ClusterMember>,
}

impl ClusterOverview {
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &ClusterMember> {
        self.members.iter().filter(move |m| m.role == role)
    }

    pub fn leader(&self) -> Option<&ClusterMember> {
        self.with_role(Role::Leader).next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(addresses: &[&str]) -> ClusterMember {
        ClusterMember {
            id: "a".to_string(),
            role: Role::Follower,
            addresses: addresses.iter().map(|s| s.to_string()).collect(),
            groups: Vec::new(),
        }
    }

    #[test]
    fn address_for_prefers_matching_scheme() {
        let m = member(&["bolt://core2:7687", "http://core2:7474", "https://core2:7473"]);
        assert_eq!(m.address_for("http"), Some(Address::new("core2", 7474)));
        assert_eq!(m.address_for("bolt"), Some(Address::new("core2", 7687)));
        assert_eq!(m.address_for("ftp"), Some(Address::new("core2", 7687)));
        assert_eq!(member(&[]).address_for("http"), None);
    }
}
