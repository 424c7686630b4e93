//! Eventual-persistence leaderboard: `itemMap` is authoritative, the sorted
//! view and top-3 gating are recomputed on a cadence. Grounded on
//! `rk/rank.go` (Update/Load/KickByKey/UpdatePlayerInfoByKey/Clear) and
//! `rk/rank_sort.go` (sort + rank assignment).
//!
//! The rank-assignment loop here differs from the original in one respect:
//! the original re-scans the same cursor position against each successive
//! top-3 threshold on a miss, which lets a later, looser threshold award a
//! rank to an item a stricter one already rejected. Concrete walkthroughs of
//! the gating rule (threshold miss permanently excludes an item from top-3,
//! not just from the threshold that rejected it) show the intended behavior
//! stops considering top-3 entirely on the first miss; this implementation
//! follows that reading.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde_json::Value;
use step_types::RankItem;
use tracing::{debug, error, info};

use crate::store::DocumentStore;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

struct DeferredState {
    item_map: HashMap<String, RankItem>,
    sorted: Vec<RankItem>,
    key_to_index: HashMap<String, usize>,
    dirty: bool,
}

pub struct DeferredLeaderboard<S> {
    name: String,
    max_rank: i32,
    top3: [i64; 3],
    store: S,
    state: RwLock<DeferredState>,
}

impl<S: DocumentStore<RankItem>> DeferredLeaderboard<S> {
    pub fn new(name: impl Into<String>, max_rank: i32, top3: [i64; 3], store: S) -> Self {
        Self {
            name: name.into(),
            max_rank,
            top3,
            store,
            state: RwLock::new(DeferredState {
                item_map: HashMap::new(),
                sorted: Vec::new(),
                key_to_index: HashMap::new(),
                dirty: false,
            }),
        }
    }

    /// Loads from the store, dropping blacklisted rows (by owner level
    /// lookup `black_lv`) both from memory and from the store itself.
    pub fn load(&self, black_lv: impl Fn(&str) -> i32) -> Result<(), crate::store::StoreError> {
        let rows = self.store.find_all()?;
        let mut item_map = HashMap::with_capacity(rows.len());
        for item in rows {
            if black_lv(&item.player_uid) > 0 {
                if let Err(e) = self.store.remove_id(&item.key) {
                    error!(board = %self.name, key = %item.key, error = %e, "failed to drop blacklisted item on load");
                }
            } else {
                item_map.insert(item.key.clone(), item);
            }
        }
        let mut state = self.state.write();
        state.item_map = item_map;
        state.dirty = true;
        drop(state);
        self.sort();
        Ok(())
    }

    pub fn rank(&self, key: &str) -> i32 {
        let state = self.state.read();
        match state.key_to_index.get(key) {
            Some(&idx) => state.sorted.get(idx).map(|i| i.rank).unwrap_or(0),
            None => 0,
        }
    }

    pub fn item_by_index(&self, index: usize) -> Option<RankItem> {
        self.state.read().sorted.get(index).cloned()
    }

    pub fn item_by_key(&self, key: &str) -> Option<RankItem> {
        let state = self.state.read();
        let idx = *state.key_to_index.get(key)?;
        state.sorted.get(idx).cloned()
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

        if let Some(existing) = state.item_map.get(key).cloned() {
            if existing.value == value {
                return;
            }
            let update_time = now_millis();
            let mut fields: HashMap<String, Value> = HashMap::new();
            if existing.player_uid != player_uid {
                fields.insert("playeruid".into(), Value::String(player_uid.to_string()));
            }
            if existing.region_id != region_id {
                fields.insert("regionid".into(), Value::from(region_id));
            }
            if existing.player_name != player_name {
                fields.insert("playername".into(), Value::String(player_name.to_string()));
            }
            if existing.decoration != decoration {
                fields.insert("decoration".into(), Value::String(decoration.to_string()));
            }
            if existing.param1 != param1 {
                fields.insert("param1".into(), Value::from(param1));
            }
            if existing.param2 != param2 {
                fields.insert("param2".into(), Value::from(param2));
            }
            if existing.param3 != param3 {
                fields.insert("param3".into(), Value::from(param3));
            }
            fields.insert("value".into(), Value::from(value));
            fields.insert("updatetime".into(), Value::from(update_time));

            if let Err(e) = self.store.update_fields(key, &fields) {
                error!(board = %self.name, key = %key, error = %e, "leaderboard update failed");
                return;
            }
            info!(board = %self.name, key = %key, "leaderboard updated");
            let item = state.item_map.get_mut(key).unwrap();
            item.player_uid = player_uid.to_string();
            item.region_id = region_id;
            item.player_name = player_name.to_string();
            item.decoration = decoration.to_string();
            item.param1 = param1;
            item.param2 = param2;
            item.param3 = param3;
            item.value = value;
            item.extra_data = extra_data;
            item.update_time = update_time;
            state.dirty = true;
        } else {
            let tail_rank = state.sorted.last().map(|i| i.rank);
            let tail_value = state.sorted.last().map(|i| i.value);
            let should_insert = match (tail_rank, tail_value) {
                (None, _) => true,
                (Some(rank), Some(tail_value)) => rank < self.max_rank || value > tail_value,
                _ => true,
            };
            if !should_insert {
                return;
            }
            let new_item = RankItem {
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
                rank: 0,
            };
            if let Err(e) = self.store.insert(&new_item) {
                error!(board = %self.name, key = %key, error = %e, "leaderboard insert failed");
                return;
            }
            info!(board = %self.name, key = %key, "leaderboard item added");
            state.item_map.insert(new_item.key.clone(), new_item);
            state.dirty = true;
        }
    }

    pub fn kick_by_key(&self, key: &str) {
        let mut state = self.state.write();
        if !state.item_map.contains_key(key) {
            return;
        }
        match self.store.remove_id(key) {
            Ok(()) => {
                state.item_map.remove(key);
                state.dirty = true;
            }
            Err(e) => error!(board = %self.name, key = %key, error = %e, "leaderboard kick failed"),
        }
    }

    pub fn update_player_info_by_key(&self, key: &str, player_name: &str, decoration: &str) {
        let mut state = self.state.write();
        let Some(existing) = state.item_map.get(key).cloned() else { return };
        if existing.player_name == player_name && existing.decoration == decoration {
            return;
        }
        let mut fields = HashMap::new();
        if existing.player_name != player_name {
            fields.insert("playername".to_string(), Value::String(player_name.to_string()));
        }
        if existing.decoration != decoration {
            fields.insert("decoration".to_string(), Value::String(decoration.to_string()));
        }
        if let Err(e) = self.store.update_fields(key, &fields) {
            error!(board = %self.name, key = %key, error = %e, "leaderboard player info update failed");
            return;
        }
        if let Some(item) = state.item_map.get_mut(key) {
            item.player_name = player_name.to_string();
            item.decoration = decoration.to_string();
        }
        if let Some(&idx) = state.key_to_index.get(key) {
            if let Some(sorted_item) = state.sorted.get_mut(idx) {
                sorted_item.player_name = player_name.to_string();
                sorted_item.decoration = decoration.to_string();
            }
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        if let Err(e) = self.store.remove_all() {
            error!(board = %self.name, error = %e, "leaderboard clear failed");
            return;
        }
        state.item_map.clear();
        state.dirty = true;
    }

    /// Recomputes `sorted`/`key_to_index` if dirty. Intended to be called on
    /// a fixed cadence by an owning task; also called synchronously by
    /// `load`.
    pub fn sort(&self) {
        let mut state = self.state.write();
        if !state.dirty {
            return;
        }
        state.dirty = false;

        let n = state.item_map.len();
        let mut items: Vec<RankItem> = state.item_map.values().cloned().collect();
        items.sort_by(|a, b| b.value.cmp(&a.value).then(a.update_time.cmp(&b.update_time)));

        let mut cursor = 0usize;
        for (i, threshold) in self.top3.iter().enumerate() {
            if cursor < items.len() && items[cursor].value >= *threshold {
                items[cursor].rank = (i + 1) as i32;
                cursor += 1;
            } else {
                break;
            }
        }
        let mut next_rank = 4i32;
        for item in items[cursor..].iter_mut() {
            item.rank = next_rank;
            next_rank += 1;
        }

        let mut removed = 0usize;
        for item in items.iter().rev() {
            if item.rank <= self.max_rank {
                break;
            }
            match self.store.remove_id(&item.key) {
                Ok(()) => {
                    state.item_map.remove(&item.key);
                    removed += 1;
                }
                Err(e) => {
                    error!(board = %self.name, key = %item.key, error = %e, "leaderboard overflow removal failed");
                    break;
                }
            }
        }
        let keep = items.len() - removed;
        items.truncate(keep);

        let mut key_to_index = HashMap::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            key_to_index.insert(item.key.clone(), idx);
        }

        debug!(board = %self.name, before = n, after = items.len(), "leaderboard sorted");
        state.sorted = items;
        state.key_to_index = key_to_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemStore {
        rows: Mutex<HashMap<String, RankItem>>,
    }

    impl DocumentStore<RankItem> for MemStore {
        fn find_all(&self) -> Result<Vec<RankItem>, crate::store::StoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
        fn find_sorted_all(&self) -> Result<Vec<RankItem>, crate::store::StoreError> {
            self.find_all()
        }
        fn insert(&self, item: &RankItem) -> Result<(), crate::store::StoreError> {
            self.rows.lock().unwrap().insert(item.key.clone(), item.clone());
            Ok(())
        }
        fn update_fields(
            &self,
            key: &str,
            fields: &HashMap<String, Value>,
        ) -> Result<(), crate::store::StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(item) = rows.get_mut(key) {
                if let Some(Value::Number(v)) = fields.get("value") {
                    item.value = v.as_i64().unwrap();
                }
            }
            Ok(())
        }
        fn upsert(&self, item: &RankItem) -> Result<(), crate::store::StoreError> {
            self.rows.lock().unwrap().insert(item.key.clone(), item.clone());
            Ok(())
        }
        fn remove_id(&self, key: &str) -> Result<(), crate::store::StoreError> {
            self.rows.lock().unwrap().remove(key);
            Ok(())
        }
        fn remove_all(&self) -> Result<(), crate::store::StoreError> {
            self.rows.lock().unwrap().clear();
            Ok(())
        }
    }

    fn item(value: i64, update_time: i64, suffix: &str) -> (String, String, i64, i64, String) {
        (format!("k{suffix}"), format!("p{suffix}"), value, update_time, suffix.to_string())
    }

    #[test]
    fn s6_top3_gating_literal_scenario() {
        let board = DeferredLeaderboard::new("arena", 5, [100, 50, 10], MemStore::default());
        for (i, value) in [200, 40, 5, 5, 5].into_iter().enumerate() {
            let (key, puid, ..) = item(value, i as i64, &i.to_string());
            board.update(&key, &puid, 1, "name", "", value, 0, 0, 0, vec![]);
        }
        board.sort();

        assert_eq!(board.rank("k0"), 1);
        assert_eq!(board.rank("k1"), 4);
        assert_eq!(board.rank("k2"), 5);
        // values at k3/k4 tie at rank 6/7, which exceed max_rank=5 and are removed.
        assert_eq!(board.item_by_key("k3"), None);
        assert_eq!(board.item_by_key("k4"), None);
    }

    #[test]
    fn update_absent_item_inserts_when_room() {
        let board = DeferredLeaderboard::new("arena", 3, [0, 0, 0], MemStore::default());
        board.update("a", "pa", 1, "A", "", 10, 0, 0, 0, vec![]);
        board.sort();
        assert_eq!(board.rank("a"), 1);
    }

    #[test]
    fn update_value_unchanged_is_a_no_op() {
        let board = DeferredLeaderboard::new("arena", 3, [0, 0, 0], MemStore::default());
        board.update("a", "pa", 1, "A", "", 10, 0, 0, 0, vec![]);
        board.sort();
        board.update("a", "pa", 1, "A", "", 10, 0, 0, 0, vec![]);
        assert_eq!(board.item_by_key("a").unwrap().value, 10);
    }

    #[test]
    fn kick_by_key_removes_item() {
        let board = DeferredLeaderboard::new("arena", 3, [0, 0, 0], MemStore::default());
        board.update("a", "pa", 1, "A", "", 10, 0, 0, 0, vec![]);
        board.sort();
        board.kick_by_key("a");
        board.sort();
        assert_eq!(board.rank("a"), 0);
    }
}
