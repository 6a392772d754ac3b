pub mod tree;

pub use tree::{sync_tree, SyncObserver, SyncTotals};
