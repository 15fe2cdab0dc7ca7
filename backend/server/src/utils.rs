use serde::{Deserialize, Deserializer, de::Error};

use crate::models::{DEFAULT_TAG_COLOR, TagRef};

/// Separates a tag name from its color inside the aggregated tag column.
pub const TAG_COLOR_SEPARATOR: char = ':';

/// Marks a key as present even when its value is `null`.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

/// Accepts `true`/`false` as well as the `1`/`0` older clients send.
pub fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(value)) => Ok(Some(value)),
        Some(Flag::Int(0)) => Ok(Some(false)),
        Some(Flag::Int(1)) => Ok(Some(true)),
        Some(Flag::Int(other)) => Err(D::Error::custom(format!(
            "expected a boolean, got {other}"
        ))),
    }
}

/// Splits a comma separated query value, dropping blanks.
pub fn split_param(value: Option<&str>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Decodes a `json_group_array` column into sorted names. The outer join contributes a `null`
/// for a restaurant without links, which is dropped.
pub fn decode_aggregate(value: Option<String>) -> Result<Vec<String>, serde_json::Error> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };

    let mut names: Vec<String> = serde_json::from_str::<Vec<Option<String>>>(&raw)?
        .into_iter()
        .flatten()
        .collect();

    names.sort();
    Ok(names)
}

pub fn decode_tags(value: Option<String>) -> Result<Vec<TagRef>, serde_json::Error> {
    Ok(decode_aggregate(value)?
        .into_iter()
        .map(|entry| match entry.rsplit_once(TAG_COLOR_SEPARATOR) {
            Some((name, color)) if !color.is_empty() => TagRef {
                name: name.to_string(),
                color: color.to_string(),
            },
            Some((name, _)) => TagRef {
                name: name.to_string(),
                color: DEFAULT_TAG_COLOR.to_string(),
            },
            None => TagRef {
                name: entry,
                color: DEFAULT_TAG_COLOR.to_string(),
            },
        })
        .collect())
}

/// Escapes `LIKE` wildcards so a search term only ever matches literally.
pub fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '!' | '%' | '_' => {
                out.push('!');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

pub fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}
