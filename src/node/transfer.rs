//! In-flight transfers between two nodes.

use crate::node::NodeId;

/// Whether a transfer is placing a new copy of a block on a peer, or
/// returning a previously backed-up block to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// The uploader is placing one of its own blocks on the downloader.
    Backup,
    /// The uploader is returning a block it holds on the downloader's
    /// behalf back to the downloader (its owner).
    Restore,
}

/// A stable index into the simulation's transfer arena, used instead of a
/// direct reference so cancellation and completion can't race on lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransferId(pub usize);

/// A single block transfer, in flight or completed.
///
/// The same `TransferId` is held by both endpoints (`Node::current_upload`
/// on the uploader, `Node::current_download` on the downloader) for the
/// duration of the transfer.
#[derive(Debug)]
pub struct Transfer {
    pub uploader: NodeId,
    pub downloader: NodeId,
    pub block_id: usize,
    pub kind: TransferKind,
    /// Set when either endpoint disconnects mid-transfer. The completion
    /// event stays queued but becomes a no-op when popped.
    pub canceled: bool,
}
