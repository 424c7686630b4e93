mod deferred;
mod instant;
mod store;

pub use deferred::DeferredLeaderboard;
pub use instant::InstantLeaderboard;
pub use store::{DocumentStore, StoreError};
