//! Narrow trait objects the `ConfigLoader` drives its side effects through.
//! These stand in for the teacher's concrete logger/stat/DB/Redis bindings
//! (`log.Init`, `stat.Config`, `mgo.Dial`, `redis.Pool` in `app/conf.go`),
//! which are external collaborators per the document-store/KV-store
//! non-goal: this crate only needs to know how to ask for one.

use crate::error::ConfigError;

/// Reconfigures the process-wide structured logger. Grounded on
/// `log.Init(WithAppName, WithRegionId, WithLevel, WithStdout, WithFileOut)`.
pub trait LoggerSink: Send + Sync {
    fn reconfigure(&self, app_name: &str, region_id: i32, level: &str, console: bool, log_dir: &str);
}

/// Reconfigures the stats sink's output path. Grounded on `stat.Config`.
pub trait StatsSink: Send + Sync {
    fn reconfigure(&self, path: &str);
}

/// A live document-database session, keyed by address. Grounded on
/// `app/conf.go`'s `DbConn{addr, session}`.
pub trait DbSession: Send + Sync {
    fn addr(&self) -> &str;
    fn close(&self);
}

/// Dials document-database sessions by address. Grounded on `mgo.Dial` at
/// the call sites in `refreshDefaultDbConn`/`refreshRegionDbConnMap`.
pub trait DbPool: Send + Sync {
    fn dial(&self, addr: &str) -> Result<std::sync::Arc<dyn DbSession>, ConfigError>;
}

/// A single authenticated KV connection, refreshed wholesale rather than
/// pooled per region. Grounded on `refreshDefaultRedisPool`'s single
/// `redis.Pool` with `MaxIdle: 1, MaxActive: 1`.
pub trait KvPool: Send + Sync {
    fn connect(&self, addr: &str, password: Option<&str>) -> Result<(), ConfigError>;
    fn close(&self);
}
