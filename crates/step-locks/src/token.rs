//! Server-wide auto-increment token persisted to `<env>_<type>_<id>.token`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::error;

pub struct ServerToken {
    path: PathBuf,
    value: AtomicU32,
}

impl ServerToken {
    pub fn file_name(env: &str, node_type: &str, id: i32) -> String {
        format!("{env}_{node_type}_{id}.token")
    }

    /// Loads the token from `path`. A missing file is not an error: the
    /// token simply starts at 0.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let value = match std::fs::read_to_string(&path) {
            Ok(contents) => contents.trim().parse::<u32>().map_err(|e| {
                io::Error::new(io::ErrorKind::InvalidData, format!("corrupt token file: {e}"))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e),
        };
        Ok(Self { path, value: AtomicU32::new(value) })
    }

    pub fn get(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u32) {
        self.value.store(value, Ordering::SeqCst);
    }

    /// Increments the token and rewrites the file. A write failure is
    /// logged, not raised — the in-memory value remains authoritative for
    /// the rest of the process's lifetime.
    pub fn increment(&self) -> u32 {
        let next = self.value.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(e) = std::fs::write(&self.path, next.to_string()) {
            error!(path = %self.path.display(), error = %e, "failed to persist server token");
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_token_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("step-locks-token-test-{name}-{}.token", std::process::id()))
    }

    #[test]
    fn file_name_matches_env_type_id_convention() {
        assert_eq!(ServerToken::file_name("prod", "game", 7), "prod_game_7.token");
    }

    #[test]
    fn missing_file_loads_as_zero() {
        let path = temp_token_path("missing");
        let _ = std::fs::remove_file(&path);
        let token = ServerToken::load(&path).unwrap();
        assert_eq!(token.get(), 0);
    }

    #[test]
    fn increment_persists_across_reload() {
        let path = temp_token_path("persist");
        let _ = std::fs::remove_file(&path);
        {
            let token = ServerToken::load(&path).unwrap();
            token.increment();
            token.increment();
            token.increment();
        }
        let reloaded = ServerToken::load(&path).unwrap();
        assert_eq!(reloaded.get(), 3);
        let _ = std::fs::remove_file(&path);
    }
}
