//! Topology descriptor, deserialized straight from the JSON config document.
//! Field names and the co-required DB address/name rule mirror `app/conf.go`'s
//! `Config`/`RegionConfig`/`RegionConfigDB` triple; validation itself lives in
//! `step-topology`, this module only holds the shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyDescriptor {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub own_region_id: i32,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub log_level: String,
    #[serde(default)]
    pub log_dir: String,
    #[serde(default)]
    pub default_db_addr: String,
    #[serde(default)]
    pub default_db_name: String,
    #[serde(default)]
    pub default_kv_addr: String,
    #[serde(default)]
    pub default_kv_pass: String,
    #[serde(default)]
    pub create_time: String,
    #[serde(default)]
    pub season: i32,
    #[serde(default)]
    pub season_time: String,
    #[serde(default)]
    pub region_list: Vec<RegionDescriptor>,

    /// Populated after load; not part of the wire document.
    #[serde(skip)]
    pub region_map: BTreeMap<i32, RegionDescriptor>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub merge_id: i32,
    #[serde(default)]
    pub rpc_addr: String,
    #[serde(default)]
    pub db: Option<RegionDb>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionDb {
    pub addr: String,
    pub name: String,
}
