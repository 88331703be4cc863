//! The sync engine: record lifecycle, server contract, ordering, merging and
//! the background poller.
//!
//! Records are written locally first and pushed on the next cycle. A cycle
//! pushes pending lists, then items, then shares, and afterwards pulls the
//! user's lists with their items and shares, merging them by timestamp.

pub(crate) mod entity;
pub mod events;
pub mod ordering;
pub mod permissions;
pub mod poller;
pub mod reconcile;
pub mod remote;
pub mod state;

pub use events::{ChangeBatch, ChangeEvent, Changes, EventBus};
pub use ordering::{resolve, Repair, Resolution};
pub use poller::{PollIntervals, PollRate};
pub use remote::{FetchGate, MemoryRemote, RemoteClient};
pub use state::PushKind;
