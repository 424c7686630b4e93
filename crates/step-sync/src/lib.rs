mod pending;
mod sequence;

pub use pending::PendingRegistry;
pub use sequence::CallIdAllocator;
