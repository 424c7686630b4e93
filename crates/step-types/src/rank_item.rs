//! Leaderboard item shapes. Field set mirrors `rk.RankItem` /
//! `rk_instant.RankItem`; the two boards use distinct rank fields (`rank`
//! here is a coarse 1..N band recomputed on a cadence, `rank_index` there is
//! the item's exact slice position maintained incrementally), so they stay
//! as two small types rather than one shared struct with an unused field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankItem {
    pub key: String,
    pub player_uid: String,
    pub region_id: i32,
    pub player_name: String,
    pub decoration: String,
    pub value: i64,
    pub param1: i32,
    pub param2: i64,
    pub param3: i32,
    pub extra_data: Vec<u8>,
    pub update_time: i64,
    #[serde(skip)]
    pub rank: i32,
}

impl RankItem {
    pub fn sort_key(&self) -> (i64, i64) {
        (self.value, self.update_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankItemInstant {
    pub key: String,
    pub player_uid: String,
    pub region_id: i32,
    pub player_name: String,
    pub decoration: String,
    pub value: i64,
    pub param1: i32,
    pub param2: i64,
    pub param3: i32,
    pub extra_data: Vec<u8>,
    pub update_time: i64,
    #[serde(skip)]
    pub rank_index: usize,
}

impl RankItemInstant {
    /// Total order key: value descending, update_time ascending. Negating
    /// update_time lets callers compare tuples directly in descending order
    /// alongside value.
    pub fn order_key(&self) -> (i64, i64) {
        (self.value, -self.update_time)
    }
}
