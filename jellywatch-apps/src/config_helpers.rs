//! Small deserialization helpers shared by the app configuration structs.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

/// Deserializes an optional path, treating an empty string as absent.
///
/// TOML has no `null`, so configs express "no path" either by omitting the
/// key or by setting it to `""`. Both map to `None` here.
pub fn opt_path_from_toml<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(PathBuf::from))
}
