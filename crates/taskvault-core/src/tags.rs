//! Tag normalization.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;

/// Normalize raw tag input into a sorted set of lowercase tags.
///
/// Every item may itself be a comma-separated list. Blank entries are dropped.
pub fn normalize_tags<I, T>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    raw.into_iter()
        .flat_map(|item| {
            item.as_ref()
                .split(',')
                .map(|part| part.trim().to_lowercase())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

pub(crate) fn deserialize<'de, D>(d: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<String>>::deserialize(d)?.unwrap_or_default();
    Ok(normalize_tags(raw))
}
