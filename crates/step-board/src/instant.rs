//! Strictly-ordered in-memory leaderboard with bubble/sink updates and
//! image-diff write-behind persistence. Grounded on `rk_instant/rank.go`
//! (Update/KickByKey/KickByPlayerUid/Load), `rk_instant/rank_update.go`
//! (bubble/sink), and `rk_instant/rank_save.go` /
//! `rk_instant/rank_item_image.go` (image map diffing).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use step_types::RankItemInstant;
use tracing::{debug, error};

use crate::store::DocumentStore;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ImageFlag {
    NoChange,
    Upsert,
    Remove,
}

struct ImageEntry {
    item: RankItemInstant,
    flag: ImageFlag,
}

struct InstantState {
    item_map: HashMap<String, RankItemInstant>,
    sorted: Vec<RankItemInstant>,
    image_map: HashMap<String, ImageEntry>,
}

pub struct InstantLeaderboard<S> {
    name: String,
    capacity: usize,
    store: S,
    state: RwLock<InstantState>,
}

impl<S: DocumentStore<RankItemInstant>> InstantLeaderboard<S> {
    pub fn new(name: impl Into<String>, capacity: usize, store: S) -> Self {
        Self {
            name: name.into(),
            capacity,
            store,
            state: RwLock::new(InstantState {
                item_map: HashMap::new(),
                sorted: Vec::new(),
                image_map: HashMap::new(),
            }),
        }
    }

    /// Loads the board pre-sorted (value desc, update_time asc) from the
    /// store. Blacklisted owners are excluded from the in-memory view but
    /// still seeded into the image map so the next persistence cycle
    /// deletes their row; rows sharing an owner id are deduplicated keeping
    /// the first (highest-ranked) occurrence.
    pub fn load(&self, black_lv: impl Fn(&str) -> i32) -> Result<(), crate::store::StoreError> {
        let rows = self.store.find_sorted_all()?;

        let mut image_map = HashMap::with_capacity(rows.len());
        let mut item_map = HashMap::with_capacity(rows.len());
        let mut sorted = Vec::with_capacity(rows.len());
        let mut seen_owners: HashMap<String, ()> = HashMap::new();

        for mut row in rows {
            image_map.insert(row.key.clone(), ImageEntry { item: row.clone(), flag: ImageFlag::NoChange });

            if black_lv(&row.player_uid) > 0 {
                continue;
            }
            row.key = row.player_uid.clone();
            if seen_owners.contains_key(&row.key) {
                continue;
            }
            seen_owners.insert(row.key.clone(), ());
            row.rank_index = sorted.len();
            item_map.insert(row.key.clone(), row.clone());
            sorted.push(row);
        }

        let mut state = self.state.write();
        state.item_map = item_map;
        state.sorted = sorted;
        state.image_map = image_map;
        Ok(())
    }

    pub fn rank(&self, key: &str) -> i32 {
        match self.state.read().item_map.get(key) {
            Some(item) => item.rank_index as i32 + 1,
            None => 0,
        }
    }

    pub fn item(&self, rank_index: usize) -> Option<RankItemInstant> {
        self.state.read().sorted.get(rank_index).cloned()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        key: &str,
        player_uid: &str,
        region_id: i32,
        player_name: &str,
        decoration: &str,
        value: i64,
        param1: i32,
        param2: i64,
        param3: i32,
        extra_data: Vec<u8>,
    ) {
        let mut state = self.state.write();

        if let Some(existing_idx) = state.item_map.get(key).map(|i| i.rank_index) {
            let update_time = if state.sorted[existing_idx].value != value { now_millis() } else { state.sorted[existing_idx].update_time };
            {
                let item = &mut state.sorted[existing_idx];
                item.player_uid = player_uid.to_string();
                item.region_id = region_id;
                item.player_name = player_name.to_string();
                item.decoration = decoration.to_string();
                item.value = value;
                item.param1 = param1;
                item.param2 = param2;
                item.param3 = param3;
                item.extra_data = extra_data;
                item.update_time = update_time;
            }
            self.bubble(&mut state, existing_idx);
            let idx_after_bubble = state.item_map.get(key).map(|i| i.rank_index).unwrap_or(existing_idx);
            self.sink(&mut state, idx_after_bubble);
            self.sync_item_map(&mut state, key);
            return;
        }

        let n = state.sorted.len();
        if n < self.capacity {
            let new_item = RankItemInstant {
                key: key.to_string(),
                player_uid: player_uid.to_string(),
                region_id,
                player_name: player_name.to_string(),
                decoration: decoration.to_string(),
                value,
                param1,
                param2,
                param3,
                extra_data,
                update_time: now_millis(),
                rank_index: n,
            };
            state.item_map.insert(new_item.key.clone(), new_item.clone());
            state.sorted.push(new_item);
            self.bubble(&mut state, n);
            self.sync_item_map(&mut state, key);
        } else {
            let tail_value = state.sorted[n - 1].value;
            if value > tail_value {
                let tail_key = state.sorted[n - 1].key.clone();
                state.item_map.remove(&tail_key);
                let new_item = RankItemInstant {
                    key: key.to_string(),
                    player_uid: player_uid.to_string(),
                    region_id,
                    player_name: player_name.to_string(),
                    decoration: decoration.to_string(),
                    value,
                    param1,
                    param2,
                    param3,
                    extra_data,
                    update_time: now_millis(),
                    rank_index: n - 1,
                };
                state.item_map.insert(new_item.key.clone(), new_item.clone());
                state.sorted[n - 1] = new_item;
                self.bubble(&mut state, n - 1);
                self.sync_item_map(&mut state, key);
            }
        }
    }

    fn sync_item_map(&self, state: &mut InstantState, key: &str) {
        if let Some(idx) = state.sorted.iter().position(|i| i.key == key) {
            let item = state.sorted[idx].clone();
            state.item_map.insert(key.to_string(), item);
        }
    }

    fn bubble(&self, state: &mut InstantState, mut idx: usize) {
        loop {
            if idx == 0 {
                break;
            }
            if state.sorted[idx].value <= state.sorted[idx - 1].value {
                break;
            }
            state.sorted.swap(idx, idx - 1);
            state.sorted[idx].rank_index = idx;
            state.sorted[idx - 1].rank_index = idx - 1;
            idx -= 1;
        }
    }

    fn sink(&self, state: &mut InstantState, mut idx: usize) {
        let n = state.sorted.len();
        loop {
            if idx >= n - 1 {
                break;
            }
            if state.sorted[idx].value > state.sorted[idx + 1].value {
                break;
            }
            state.sorted.swap(idx, idx + 1);
            state.sorted[idx].rank_index = idx;
            state.sorted[idx + 1].rank_index = idx + 1;
            idx += 1;
        }
    }

    pub fn kick_by_key(&self, key: &str) {
        let mut state = self.state.write();
        if !state.item_map.contains_key(key) {
            return;
        }
        state.item_map.remove(key);
        let remaining: Vec<RankItemInstant> = state.sorted.drain(..).filter(|i| i.key != key).collect();
        state.sorted = remaining;
        for (idx, item) in state.sorted.iter_mut().enumerate() {
            item.rank_index = idx;
            state.item_map.insert(item.key.clone(), item.clone());
        }
    }

    pub fn kick_by_player_uid(&self, player_uid: &str) {
        let mut state = self.state.write();
        let remaining: Vec<RankItemInstant> =
            state.sorted.drain(..).filter(|i| i.player_uid != player_uid).collect();
        state.item_map.retain(|_, v| v.player_uid != player_uid);
        state.sorted = remaining;
        for (idx, item) in state.sorted.iter_mut().enumerate() {
            item.rank_index = idx;
            state.item_map.insert(item.key.clone(), item.clone());
        }
    }

    pub fn update_player_info_by_key(&self, key: &str, player_name: &str, decoration: &str) {
        let mut state = self.state.write();
        if let Some(idx) = state.item_map.get(key).map(|i| i.rank_index) {
            state.sorted[idx].player_name = player_name.to_string();
            state.sorted[idx].decoration = decoration.to_string();
            self.sync_item_map(&mut state, key);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.sorted.clear();
        state.item_map.clear();
    }

    /// Diffs the current map against the image map and writes the result.
    /// Disk writes happen after the in-memory lock is released so `update`
    /// can proceed concurrently with persistence.
    pub fn save(&self) {
        let upserts;
        let removes;
        {
            let mut state = self.state.write();
            let present: std::collections::HashSet<String> = state.item_map.keys().cloned().collect();

            let stale: Vec<String> = state
                .image_map
                .keys()
                .filter(|k| !present.contains(*k))
                .cloned()
                .collect();
            for key in &stale {
                if let Some(entry) = state.image_map.get_mut(key) {
                    entry.flag = ImageFlag::Remove;
                }
            }

            let current: Vec<RankItemInstant> = state.item_map.values().cloned().collect();
            for item in &current {
                let changed = match state.image_map.get(&item.key) {
                    Some(entry) => entry.item != *item,
                    None => true,
                };
                if changed {
                    state.image_map.insert(
                        item.key.clone(),
                        ImageEntry { item: item.clone(), flag: ImageFlag::Upsert },
                    );
                }
            }

            upserts = state
                .image_map
                .values()
                .filter(|e| e.flag == ImageFlag::Upsert)
                .map(|e| e.item.clone())
                .collect::<Vec<_>>();
            removes = state
                .image_map
                .iter()
                .filter(|(_, e)| e.flag == ImageFlag::Remove)
                .map(|(k, _)| k.clone())
                .collect::<Vec<_>>();

            for entry in state.image_map.values_mut() {
                if entry.flag == ImageFlag::Upsert {
                    entry.flag = ImageFlag::NoChange;
                }
            }
            for key in &removes {
                state.image_map.remove(key);
            }
        }

        for item in &upserts {
            if let Err(e) = self.store.upsert(item) {
                error!(board = %self.name, key = %item.key, error = %e, "leaderboard image upsert failed");
            }
        }
        for key in &removes {
            if let Err(e) = self.store.remove_id(key) {
                error!(board = %self.name, key = %key, error = %e, "leaderboard image remove failed");
            }
        }
        debug!(board = %self.name, upserts = upserts.len(), removes = removes.len(), "leaderboard image synced");
    }
}
