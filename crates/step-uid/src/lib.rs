mod base36;
mod generator;
mod ruid;

pub use base36::{decode as base36_decode, encode as base36_encode};
pub use generator::{gen as uid_gen, prefix as uid_prefix};
pub use ruid::{make_ruid, parse_ruid};
