//! Parses the process identity out of the executable's own file name.
//! Grounded on `app/app.go`'s `parseExeName`: the name must split into
//! exactly three `_`-separated parts, `<env>_<type>_<id>`, with a
//! non-underscore type and a signed 32-bit id. A malformed name is a fatal
//! startup error in the original (`panic`); here it is a plain `Result` the
//! caller propagates before any listener binds.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub env: String,
    pub node_type: String,
    pub id: i32,
}

#[derive(Debug)]
pub struct IdentityError(String);

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed executable name: {}", self.0)
    }
}

impl std::error::Error for IdentityError {}

/// Parses `<env>_<type>_<id>` out of an executable base name (extension
/// already stripped by the caller).
pub fn parse_exe_name(exe_name: &str) -> Result<ProcessIdentity, IdentityError> {
    let parts: Vec<&str> = exe_name.split('_').collect();
    if parts.len() != 3 {
        return Err(IdentityError(format!("expected 3 underscore-separated parts, got {}", parts.len())));
    }

    let env = parts[0].trim().to_string();
    if env.is_empty() {
        return Err(IdentityError("env part is empty".into()));
    }

    let node_type = parts[1].trim().to_string();
    if node_type.is_empty() {
        return Err(IdentityError("type part is empty".into()));
    }

    let id: i32 = parts[2]
        .trim()
        .parse()
        .map_err(|_| IdentityError(format!("id part {:?} is not a signed 32-bit integer", parts[2])))?;

    Ok(ProcessIdentity { env, node_type, id })
}

/// Reads `std::env::current_exe()` and parses its base name.
pub fn parse_current_exe() -> Result<ProcessIdentity, IdentityError> {
    let exe = std::env::current_exe().map_err(|e| IdentityError(format!("cannot read current exe path: {e}")))?;
    let stem = exe
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| IdentityError("executable path has no valid file name".into()))?;
    parse_exe_name(stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_name() {
        let id = parse_exe_name("prod_game_7").unwrap();
        assert_eq!(id, ProcessIdentity { env: "prod".into(), node_type: "game".into(), id: 7 });
    }

    #[test]
    fn negative_id_is_accepted() {
        let id = parse_exe_name("dev_zone_-1").unwrap();
        assert_eq!(id.id, -1);
    }

    #[test]
    fn wrong_part_count_is_rejected() {
        assert!(parse_exe_name("prod_game").is_err());
        assert!(parse_exe_name("prod_game_7_extra").is_err());
    }

    #[test]
    fn empty_env_or_type_is_rejected() {
        assert!(parse_exe_name("_game_7").is_err());
        assert!(parse_exe_name("prod__7").is_err());
    }

    #[test]
    fn underscore_in_type_is_rejected_by_part_count() {
        // "prod_my_service_7" splits into 4 parts, which the 3-part rule rejects —
        // matching the source comment that service names must not contain underscores.
        assert!(parse_exe_name("prod_my_service_7").is_err());
    }

    #[test]
    fn non_numeric_id_is_rejected() {
        assert!(parse_exe_name("prod_game_notanumber").is_err());
    }
}
