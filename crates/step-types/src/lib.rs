mod rank_item;
mod topology;

pub use rank_item::{RankItem, RankItemInstant};
pub use topology::{RegionDb, RegionDescriptor, TopologyDescriptor};
