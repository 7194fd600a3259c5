//! SBT Chain Mirror
//!
//! Keeps the local SBT cache consistent with the CivicSBT contract. Every
//! write is keyed by a tx hash (mint/update events) or guarded by the block
//! number of the last applied write (chain syncs), so replays and
//! out-of-order delivery are absorbed without coordination.
//!
//! Ordering is "last higher block wins". A chain reorg that rewinds a
//! wallet's history is not reverted here.

mod mirror;
mod models;

pub use mirror::{ChainMirror, MirrorConfig};
pub use models::{
    LeaderboardEntry, SbtExportRecord, SbtMintEvent, SbtRecord, SbtStats, SbtStatus,
    SbtUpdateEvent,
};
