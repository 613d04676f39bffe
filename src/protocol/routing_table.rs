use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fmt::Write;
use log::debug;

use super::messages::{saturating_cost, Cost, DvrPacket, RouterId, INFINITY};
use crate::error::TableError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingEntry {
    pub min_cost: Cost,
    /// Only set while `min_cost < INFINITY`.
    pub next_hop: Option<RouterId>,
}

impl ForwardingEntry {
    pub fn unreachable() -> Self {
        Self {
            min_cost: INFINITY,
            next_hop: None,
        }
    }

    pub fn via(min_cost: Cost, next_hop: RouterId) -> Self {
        if min_cost >= INFINITY {
            return Self::unreachable();
        }
        Self {
            min_cost,
            next_hop: Some(next_hop),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.min_cost < INFINITY
    }
}

/// Minimum cost and next hop per destination, as seen from `self_id`.
///
/// The entry for `self_id` is always `(0, self_id)`; nothing in here can
/// overwrite it. Destinations are kept ordered so rendering and the
/// advertised cost vector are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingTable {
    self_id: RouterId,
    entries: BTreeMap<RouterId, ForwardingEntry>,
}

impl ForwardingTable {
    pub fn new(self_id: RouterId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(self_id, ForwardingEntry::via(0, self_id));
        Self { self_id, entries }
    }

    pub fn self_id(&self) -> RouterId {
        self.self_id
    }

    /// Indices of `vector` that look like direct links: finite, non-zero
    /// cost and not ourselves.
    pub fn direct_neighbors(self_id: RouterId, vector: &[Cost]) -> Vec<RouterId> {
        vector
            .iter()
            .enumerate()
            .filter(|&(i, &cost)| i as RouterId != self_id && cost > 0 && cost < INFINITY)
            .map(|(i, _)| i as RouterId)
            .collect()
    }

    /// Replaces every entry from a relay topology snapshot.
    pub fn initialize(&mut self, initial_vector: &[Cost], direct_neighbors: &[RouterId]) {
        let neighbors: BTreeSet<RouterId> = direct_neighbors.iter().copied().collect();

        self.entries.clear();
        for (i, &cost) in initial_vector.iter().enumerate() {
            let dest = i as RouterId;
            if dest == self.self_id {
                continue;
            }

            let entry = if neighbors.contains(&dest) {
                ForwardingEntry::via(cost, dest)
            } else {
                ForwardingEntry {
                    min_cost: cost.min(INFINITY),
                    next_hop: None,
                }
            };
            self.entries.insert(dest, entry);
        }
        self.entries
            .insert(self.self_id, ForwardingEntry::via(0, self.self_id));

        debug!(
            "Table of router {} initialized with {} destinations ({} direct)",
            self.self_id,
            self.entries.len(),
            neighbors.len()
        );
    }

    /// Bellman-Ford relaxation against one neighbor's advertised vector.
    ///
    /// A cheaper path always wins. A route already going through
    /// `from_neighbor` follows whatever that neighbor now reports, even when
    /// it got worse. Returns whether any entry changed.
    pub fn update(
        &mut self,
        from_neighbor: RouterId,
        neighbor_cost_to_self: Cost,
        neighbor_vector: &[Cost],
    ) -> bool {
        if from_neighbor == self.self_id {
            return false;
        }

        let mut changed = false;
        for (i, &advertised) in neighbor_vector.iter().enumerate() {
            let dest = i as RouterId;
            if dest == self.self_id {
                continue;
            }

            let candidate = saturating_cost(neighbor_cost_to_self, advertised);
            // Unknown destinations only get a row once a finite route exists.
            let entry = match self.entries.entry(dest) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(_) if candidate >= INFINITY => continue,
                Entry::Vacant(slot) => slot.insert(ForwardingEntry::unreachable()),
            };

            if candidate < entry.min_cost {
                debug!(
                    "Route to {} improved {} -> {} via {}",
                    dest, entry.min_cost, candidate, from_neighbor
                );
                *entry = ForwardingEntry::via(candidate, from_neighbor);
                changed = true;
            } else if entry.next_hop == Some(from_neighbor) && candidate != entry.min_cost {
                debug!(
                    "Route to {} via {} now costs {} (was {})",
                    dest, from_neighbor, candidate, entry.min_cost
                );
                *entry = ForwardingEntry::via(candidate, from_neighbor);
                changed = true;
            }
        }

        changed
    }

    pub fn entry(&self, dest: RouterId) -> Option<&ForwardingEntry> {
        self.entries.get(&dest)
    }

    pub fn cost_to(&self, dest: RouterId) -> Result<Cost, TableError> {
        self.entry(dest)
            .map(|entry| entry.min_cost)
            .ok_or(TableError::NotFound(dest))
    }

    pub fn next_hop_for(&self, dest: RouterId) -> Result<Option<RouterId>, TableError> {
        self.entry(dest)
            .map(|entry| entry.next_hop)
            .ok_or(TableError::NotFound(dest))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RouterId, &ForwardingEntry)> {
        self.entries.iter()
    }

    /// Dense cost vector indexed by destination, gaps filled with `INFINITY`.
    pub fn min_costs(&self) -> Vec<Cost> {
        let size = self
            .entries
            .keys()
            .next_back()
            .map_or(0, |&last| last as usize + 1);

        let mut costs = vec![INFINITY; size];
        for (&dest, entry) in &self.entries {
            costs[dest as usize] = entry.min_cost;
        }
        costs
    }

    /// ROUTE packets for one advertisement round: one per reachable,
    /// non-self destination, addressed to its next hop and carrying the
    /// full cost vector.
    pub fn advertisements(&self) -> Vec<DvrPacket> {
        let costs = self.min_costs();

        self.entries
            .values()
            .filter(|entry| entry.min_cost > 0 && entry.is_reachable())
            .filter_map(|entry| entry.next_hop)
            .map(|hop| DvrPacket::route(self.self_id, hop, costs.clone()))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut output = String::new();
        for (dest, entry) in &self.entries {
            let next_hop = match entry.next_hop {
                Some(hop) => hop.to_string(),
                None => "none".to_string(),
            };
            let _ = writeln!(output, "{:<8} {:<8} {}", dest, entry.min_cost, next_hop);
        }
        output
    }
}

impl fmt::Display for ForwardingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
