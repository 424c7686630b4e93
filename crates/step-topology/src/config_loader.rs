//! JSON config validation and normalization, plus the side effects that
//! follow a successful load. Grounded on `app/conf.go`'s `LoadConf` and
//! `checkAndFillConfig`: the loader parses, fills defaults, validates the
//! co-required fields, builds the region map, then drives logger/stats/DB/KV
//! reconfiguration — here through trait objects instead of concrete drivers.

use std::sync::Arc;

use chrono::NaiveDate;
use step_types::TopologyDescriptor;
use tracing::{error, info};

use crate::collaborators::{DbPool, KvPool, LoggerSink, StatsSink};
use crate::error::ConfigError;

pub const NODE_TYPE_GAME: &str = "game";
pub const NODE_TYPE_ZONE: &str = "zone";

pub struct ConfigLoader {
    logger: Arc<dyn LoggerSink>,
    stats: Arc<dyn StatsSink>,
    db_pool: Arc<dyn DbPool>,
    kv_pool: Arc<dyn KvPool>,
}

impl ConfigLoader {
    pub fn new(
        logger: Arc<dyn LoggerSink>,
        stats: Arc<dyn StatsSink>,
        db_pool: Arc<dyn DbPool>,
        kv_pool: Arc<dyn KvPool>,
    ) -> Self {
        Self { logger, stats, db_pool, kv_pool }
    }

    /// Parses and validates a config document, filling in the derived
    /// `region_map`. Does not apply side effects; call [`apply`] with the
    /// result once the caller has decided to swap the active descriptor.
    pub fn validate(&self, document: &[u8]) -> Result<TopologyDescriptor, ConfigError> {
        let mut desc: TopologyDescriptor = serde_json::from_slice(document)
            .map_err(|e| ConfigError::ConfigInvalid(format!("malformed config json: {e}")))?;
        check_and_fill(&mut desc)?;
        Ok(desc)
    }

    /// Applies the logger/stats side effects and refreshes the default DB
    /// and KV connections, matching `refreshDefaultDbConn`/
    /// `refreshDefaultRedisPool`. Idempotent: no-ops if the relevant field
    /// is unchanged from `previous`.
    pub fn apply(&self, desc: &TopologyDescriptor, previous: Option<&TopologyDescriptor>) {
        self.logger.reconfigure(&desc.app_name, desc.own_region_id, &desc.log_level, true, &desc.log_dir);
        self.stats.reconfigure(&desc.default_db_name);

        let db_changed = previous.map(|p| p.default_db_addr != desc.default_db_addr).unwrap_or(true);
        if db_changed && !desc.default_db_addr.is_empty() {
            match self.db_pool.dial(&desc.default_db_addr) {
                Ok(_) => info!(addr = %desc.default_db_addr, "connected default db"),
                Err(e) => error!(addr = %desc.default_db_addr, error = %e, "failed to connect default db"),
            }
        }

        let kv_changed = previous.map(|p| p.default_kv_addr != desc.default_kv_addr).unwrap_or(true);
        if kv_changed && !desc.default_kv_addr.is_empty() {
            let pass = if desc.default_kv_pass.is_empty() { None } else { Some(desc.default_kv_pass.as_str()) };
            match self.kv_pool.connect(&desc.default_kv_addr, pass) {
                Ok(()) => info!(addr = %desc.default_kv_addr, "connected default kv"),
                Err(e) => error!(addr = %desc.default_kv_addr, error = %e, "failed to connect default kv"),
            }
        }
    }
}

/// Validates co-required fields and builds the normalized region map,
/// mirroring `checkAndFillConfig` field-by-field.
fn check_and_fill(desc: &mut TopologyDescriptor) -> Result<(), ConfigError> {
    if desc.default_db_addr.is_empty() != desc.default_db_name.is_empty() {
        return Err(ConfigError::ConfigInvalid("default_db_addr and default_db_name are co-required".into()));
    }

    if desc.log_level.is_empty() {
        desc.log_level = "DEBUG".into();
    }

    let create_time_stamp = parse_calendar_day(&desc.create_time, "create_time")?;
    let season_time_stamp = parse_calendar_day(&desc.season_time, "season_time")?;

    if desc.node_type == NODE_TYPE_GAME || desc.node_type == NODE_TYPE_ZONE {
        if create_time_stamp.unwrap_or(0) == 0 {
            return Err(ConfigError::ConfigInvalid(format!("{} node requires a valid create_time", desc.node_type)));
        }
    }

    if desc.node_type == NODE_TYPE_GAME {
        if season_time_stamp.unwrap_or(0) == 0 {
            return Err(ConfigError::ConfigInvalid("game node requires a valid season_time".into()));
        }
        if desc.season <= 0 {
            return Err(ConfigError::ConfigInvalid("game node requires season > 0".into()));
        }
    }

    let mut region_map = std::collections::BTreeMap::new();
    for region in &mut desc.region_list {
        if region.merge_id == 0 {
            region.merge_id = region.id;
        }
        if let Some(db) = &region.db {
            if db.addr.is_empty() || db.name.is_empty() {
                return Err(ConfigError::ConfigInvalid("region db block requires both addr and name".into()));
            }
        }
        region_map.insert(region.id, region.clone());
    }

    if desc.node_type == NODE_TYPE_GAME && !region_map.contains_key(&desc.own_region_id) {
        return Err(ConfigError::ConfigInvalid(format!(
            "game node's own region id {} is not present in region_list",
            desc.own_region_id
        )));
    }

    desc.region_map = region_map;
    Ok(())
}

/// Parses a `YYYY-MM-DD` date at calendar-day granularity in the local time
/// zone, rejecting a negative resulting Unix timestamp. An empty string is
/// not an error — it simply yields `None`, matching the original's
/// `if config.CreateTime != ""` guard.
fn parse_calendar_day(value: &str, field: &str) -> Result<Option<i64>, ConfigError> {
    if value.is_empty() {
        return Ok(None);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ConfigError::ConfigInvalid(format!("{field} '{value}' is not a valid YYYY-MM-DD date")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ConfigError::ConfigInvalid(format!("{field} '{value}' has no valid midnight")))?;
    let stamp = midnight.and_utc().timestamp();
    if stamp < 0 {
        return Err(ConfigError::ConfigInvalid(format!("{field} '{value}' resolves to a negative timestamp")));
    }
    Ok(Some(stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::DbSession;
    use std::sync::Mutex;

    struct NullLogger;
    impl LoggerSink for NullLogger {
        fn reconfigure(&self, _: &str, _: i32, _: &str, _: bool, _: &str) {}
    }

    struct NullStats;
    impl StatsSink for NullStats {
        fn reconfigure(&self, _: &str) {}
    }

    struct FakeSession(String);
    impl DbSession for FakeSession {
        fn addr(&self) -> &str {
            &self.0
        }
        fn close(&self) {}
    }

    struct RecordingDbPool {
        dialed: Mutex<Vec<String>>,
    }
    impl DbPool for RecordingDbPool {
        fn dial(&self, addr: &str) -> Result<Arc<dyn DbSession>, ConfigError> {
            self.dialed.lock().unwrap().push(addr.to_string());
            Ok(Arc::new(FakeSession(addr.to_string())))
        }
    }

    struct NullKvPool;
    impl KvPool for NullKvPool {
        fn connect(&self, _: &str, _: Option<&str>) -> Result<(), ConfigError> {
            Ok(())
        }
        fn close(&self) {}
    }

    fn loader(db_pool: Arc<RecordingDbPool>) -> ConfigLoader {
        ConfigLoader::new(Arc::new(NullLogger), Arc::new(NullStats), db_pool, Arc::new(NullKvPool))
    }

    #[test]
    fn db_addr_without_name_is_invalid() {
        let db_pool = Arc::new(RecordingDbPool { dialed: Mutex::new(vec![]) });
        let loader = loader(db_pool);
        let doc = br#"{"default_db_addr":"127.0.0.1:27017"}"#;
        assert!(matches!(loader.validate(doc), Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn game_node_requires_create_time_and_own_region() {
        let db_pool = Arc::new(RecordingDbPool { dialed: Mutex::new(vec![]) });
        let loader = loader(db_pool);
        let doc = br#"{"node_type":"game","own_region_id":1,"season":1,
                        "create_time":"2024-01-01","season_time":"2024-01-01"}"#;
        assert!(matches!(loader.validate(doc), Err(ConfigError::ConfigInvalid(_))));

        let doc_ok = br#"{"node_type":"game","own_region_id":1,"season":1,
                           "create_time":"2024-01-01","season_time":"2024-01-01",
                           "region_list":[{"id":1,"name":"r1"}]}"#;
        let desc = loader.validate(doc_ok).unwrap();
        assert_eq!(desc.region_map.len(), 1);
        assert!(desc.region_map.contains_key(&1));
    }

    #[test]
    fn merge_id_defaults_to_own_id() {
        let db_pool = Arc::new(RecordingDbPool { dialed: Mutex::new(vec![]) });
        let loader = loader(db_pool);
        let doc = br#"{"region_list":[{"id":7,"name":"r7"}]}"#;
        let desc = loader.validate(doc).unwrap();
        assert_eq!(desc.region_map[&7].merge_id, 7);
    }

    #[test]
    fn region_db_requires_both_addr_and_name() {
        let db_pool = Arc::new(RecordingDbPool { dialed: Mutex::new(vec![]) });
        let loader = loader(db_pool);
        let doc = br#"{"region_list":[{"id":1,"db":{"addr":"x","name":""}}]}"#;
        assert!(matches!(loader.validate(doc), Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn apply_dials_default_db_only_on_address_change() {
        let db_pool = Arc::new(RecordingDbPool { dialed: Mutex::new(vec![]) });
        let loader = loader(db_pool.clone());
        let doc = br#"{"default_db_addr":"127.0.0.1:27017","default_db_name":"n"}"#;
        let desc = loader.validate(doc).unwrap();

        loader.apply(&desc, None);
        loader.apply(&desc, Some(&desc));
        assert_eq!(db_pool.dialed.lock().unwrap().as_slice(), ["127.0.0.1:27017"]);
    }

    #[test]
    fn invalid_date_rejected() {
        let db_pool = Arc::new(RecordingDbPool { dialed: Mutex::new(vec![]) });
        let loader = loader(db_pool);
        let doc = br#"{"create_time":"not-a-date"}"#;
        assert!(matches!(loader.validate(doc), Err(ConfigError::ConfigInvalid(_))));
    }
}
