//! Node state: identity, capacity, and the block-ownership bookkeeping the
//! transfer scheduler reads and mutates.

mod transfer;

pub use transfer::{Transfer, TransferId, TransferKind};

use crate::config::NodeClassConfig;
use crate::error::{Result, SimError};
use std::fmt;

/// Stable index identifying a node, used everywhere in place of a direct
/// reference (see SPEC_FULL.md §9: nodes live in an arena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Insertion-ordered `owner -> block_id` map with at most one entry per
/// owner. Backed by a `Vec` rather than a hash map: node counts in these
/// simulations are small, and the upload scheduler needs stable insertion
/// order (§4.3, step 1 of upload selection).
#[derive(Debug, Default, Clone)]
pub struct RemoteHeld {
    entries: Vec<(NodeId, usize)>,
}

impl RemoteHeld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner: NodeId) -> Option<usize> {
        self.entries
            .iter()
            .find(|(o, _)| *o == owner)
            .map(|(_, block_id)| *block_id)
    }

    pub fn contains(&self, owner: NodeId) -> bool {
        self.get(owner).is_some()
    }

    pub fn insert(&mut self, owner: NodeId, block_id: usize) {
        debug_assert!(
            !self.contains(owner),
            "a node can hold at most one block per distinct owner"
        );
        self.entries.push((owner, block_id));
    }

    pub fn remove(&mut self, owner: NodeId) -> Option<usize> {
        let pos = self.entries.iter().position(|(o, _)| *o == owner)?;
        Some(self.entries.remove(pos).1)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry, in insertion order. Used when a node
    /// fails: every block it held for other owners is lost at once.
    pub fn take_all(&mut self) -> Vec<(NodeId, usize)> {
        self.entries.drain(..).collect()
    }
}

/// A peer in the backup network.
///
/// Configuration fields are fixed at creation; everything else mutates as
/// the simulation runs. See SPEC_FULL.md §3 for the full invariant list.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,

    pub n: usize,
    pub k: usize,
    pub data_size: u64,
    pub storage_size: u64,
    pub upload_speed: f64,
    pub download_speed: f64,
    pub average_uptime: f64,
    pub average_downtime: f64,
    pub average_lifetime: f64,
    pub average_recover_time: f64,
    pub arrival_time: f64,

    /// `data_size / k`, floored. Reserved space for the node's own `n`
    /// blocks is `block_size * n`, taken out of `storage_size` unconditionally.
    pub block_size: u64,

    pub online: bool,
    pub failed: bool,

    /// `local_blocks[i]` is true iff block `i` is present on this node.
    pub local_blocks: Vec<bool>,
    /// `backed_up_blocks[i]` is the peer storing block `i` remotely, if any.
    pub backed_up_blocks: Vec<Option<NodeId>>,
    /// Blocks this node stores on other nodes' behalf.
    pub remote_blocks_held: RemoteHeld,

    pub current_upload: Option<TransferId>,
    pub current_download: Option<TransferId>,

    /// Bytes free for storing *other* nodes' blocks.
    pub free_space: u64,

    pub data_loss_events: u64,
    pub data_recovered: u64,
    pub backups_made: u64,
    pub restores_made: u64,
}

impl Node {
    /// Build a node from its class configuration, validating the
    /// constraints that must hold before the simulation can start.
    pub fn new(id: NodeId, name: String, cfg: &NodeClassConfig) -> Result<Self> {
        if cfg.k == 0 {
            return Err(SimError::Config(format!("{name}: k must be greater than 0")));
        }
        if cfg.k > cfg.n {
            return Err(SimError::Config(format!(
                "{name}: k ({}) cannot exceed n ({})",
                cfg.k, cfg.n
            )));
        }

        let block_size = cfg.data_size / cfg.k as u64;
        let reserved = block_size * cfg.n as u64;
        let free_space = cfg.storage_size.checked_sub(reserved).ok_or_else(|| {
            SimError::Config(format!(
                "{name}: storage_size ({}) is smaller than the {} bytes reserved for its own {} blocks",
                cfg.storage_size, reserved, cfg.n
            ))
        })?;

        Ok(Self {
            id,
            name,
            n: cfg.n,
            k: cfg.k,
            data_size: cfg.data_size,
            storage_size: cfg.storage_size,
            upload_speed: cfg.upload_speed,
            download_speed: cfg.download_speed,
            average_uptime: cfg.average_uptime,
            average_downtime: cfg.average_downtime,
            average_lifetime: cfg.average_lifetime,
            average_recover_time: cfg.average_recover_time,
            arrival_time: cfg.arrival_time,
            block_size,
            online: false,
            failed: false,
            local_blocks: vec![true; cfg.n],
            backed_up_blocks: vec![None; cfg.n],
            remote_blocks_held: RemoteHeld::new(),
            current_upload: None,
            current_download: None,
            free_space,
            data_loss_events: 0,
            data_recovered: 0,
            backups_made: 0,
            restores_made: 0,
        })
    }

    /// Number of blocks currently present locally.
    pub fn local_block_count(&self) -> usize {
        self.local_blocks.iter().filter(|held| **held).count()
    }

    /// First block held locally but not yet backed up anywhere, if any.
    pub fn find_block_to_back_up(&self) -> Option<usize> {
        self.local_blocks
            .iter()
            .zip(self.backed_up_blocks.iter())
            .position(|(held, peer)| *held && peer.is_none())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(n: usize, k: usize, data_size: u64, storage_size: u64) -> NodeClassConfig {
        NodeClassConfig {
            class_name: "test".into(),
            number: 1,
            n,
            k,
            data_size,
            storage_size,
            upload_speed: 1024.0,
            download_speed: 1024.0,
            average_uptime: 3600.0,
            average_downtime: 3600.0,
            average_lifetime: 86_400.0,
            average_recover_time: 60.0,
            arrival_time: 0.0,
        }
    }

    #[test]
    fn rejects_k_greater_than_n() {
        let cfg = class(4, 5, 4096, 100_000);
        let err = Node::new(NodeId(0), "n0".into(), &cfg).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn rejects_k_zero() {
        let cfg = class(4, 0, 4096, 100_000);
        assert!(Node::new(NodeId(0), "n0".into(), &cfg).is_err());
    }

    #[test]
    fn free_space_matches_invariant() {
        let cfg = class(4, 2, 4096, 12 * 1024);
        let node = Node::new(NodeId(0), "n0".into(), &cfg).unwrap();
        assert_eq!(node.block_size, 1024);
        assert_eq!(node.free_space, 12 * 1024 - 1024 * 4);
        assert_eq!(node.local_block_count(), 4);
    }

    #[test]
    fn rejects_insufficient_storage_for_own_blocks() {
        let cfg = class(4, 2, 4096, 100);
        assert!(Node::new(NodeId(0), "n0".into(), &cfg).is_err());
    }

    #[test]
    fn remote_held_preserves_insertion_order_and_uniqueness() {
        let mut held = RemoteHeld::new();
        held.insert(NodeId(2), 0);
        held.insert(NodeId(1), 3);
        held.insert(NodeId(5), 1);
        let order: Vec<_> = held.iter().collect();
        assert_eq!(order, vec![(NodeId(2), 0), (NodeId(1), 3), (NodeId(5), 1)]);
        assert_eq!(held.remove(NodeId(1)), Some(3));
        assert!(!held.contains(NodeId(1)));
        assert_eq!(held.len(), 2);
    }
}
