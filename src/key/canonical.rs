//! Key Canonicalization
//!
//! Turns a [`QueryKey`] into a stable string: JSON for primitives, lists kept
//! positional, object members sorted by name. Shared nodes are tracked on a
//! push/pop stack of identities so a real cycle renders as `"[Circular]"`
//! while the same node in two sibling positions renders twice.

use std::fmt::Write as _;

use thiserror::Error;
use tracing::warn;

use super::part::{KeyPart, QueryKey};
use super::MAX_KEY_DEPTH;

/// Marker written in place of a node that refers back to an ancestor.
pub const CIRCULAR_MARKER: &str = "[Circular]";

// == Key Error ==
/// Reasons canonicalization can fail. Never escapes this module's callers;
/// failures degrade to [`QueryKey::fallback_string`].
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("key nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("shared key node is poisoned")]
    Poisoned,

    #[error("failed to encode key segment: {0}")]
    Encode(String),
}

// == Canonicalize ==
/// Returns the canonical form of `key`.
///
/// Falls back to the key's plain string form, with a warning, if the key
/// cannot be canonicalized.
pub fn canonicalize(key: &QueryKey) -> String {
    match try_canonicalize(key) {
        Ok(canonical) => canonical,
        Err(err) => {
            let fallback = key.fallback_string();
            warn!(error = %err, fallback = %fallback, "Query key canonicalization failed");
            fallback
        }
    }
}

/// Canonicalizes `key`, surfacing the failure instead of falling back.
pub fn try_canonicalize(key: &QueryKey) -> Result<String, KeyError> {
    let mut out = String::new();
    let mut seen = Vec::new();

    if key.root().is_undefined() {
        return Ok("undefined".to_string());
    }
    write_part(key.root(), &mut seen, 0, &mut out)?;
    Ok(out)
}

fn write_part(
    part: &KeyPart,
    seen: &mut Vec<usize>,
    depth: usize,
    out: &mut String,
) -> Result<(), KeyError> {
    if depth > MAX_KEY_DEPTH {
        return Err(KeyError::TooDeep(MAX_KEY_DEPTH));
    }

    match part {
        KeyPart::Undefined | KeyPart::Null => out.push_str("null"),
        KeyPart::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        KeyPart::Number(n) => write_display(out, n)?,
        KeyPart::String(s) => write_json_str(out, s)?,
        KeyPart::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_part(item, seen, depth + 1, out)?;
            }
            out.push(']');
        }
        KeyPart::Object(fields) => {
            let mut members: Vec<&(String, KeyPart)> =
                fields.iter().filter(|(_, v)| !v.is_undefined()).collect();
            // Stable sort, then keep the last write for repeated names
            members.sort_by(|a, b| a.0.cmp(&b.0));
            let mut deduped: Vec<&(String, KeyPart)> = Vec::with_capacity(members.len());
            for member in members {
                match deduped.last_mut() {
                    Some(last) if last.0 == member.0 => *last = member,
                    _ => deduped.push(member),
                }
            }

            out.push('{');
            for (i, (name, value)) in deduped.into_iter().map(|m| (&m.0, &m.1)).enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_str(out, name)?;
                out.push(':');
                write_part(value, seen, depth + 1, out)?;
            }
            out.push('}');
        }
        KeyPart::Shared(node) => {
            let id = node.id();
            if seen.contains(&id) {
                return write_json_str(out, CIRCULAR_MARKER);
            }

            seen.push(id);
            let result = match node.inner().read() {
                Ok(inner) => write_part(&inner, seen, depth + 1, out),
                Err(_) => Err(KeyError::Poisoned),
            };
            seen.pop();
            result?;
        }
    }

    Ok(())
}

fn write_json_str(out: &mut String, s: &str) -> Result<(), KeyError> {
    let encoded = serde_json::to_string(s).map_err(|e| KeyError::Encode(e.to_string()))?;
    out.push_str(&encoded);
    Ok(())
}

fn write_display(out: &mut String, value: impl std::fmt::Display) -> Result<(), KeyError> {
    write!(out, "{}", value).map_err(|e| KeyError::Encode(e.to_string()))
}

// == Matching ==
/// Returns the substring that [`matches_target`] looks for when `key` is
/// used as an invalidation target.
///
/// Plain strings match by their raw text. Lists drop their closing bracket
/// so a shorter list matches every key that starts with the same segments.
/// Any other key matches by its full canonical form.
pub fn match_target(key: &QueryKey) -> String {
    if let Some(raw) = key.as_plain_str() {
        return raw.to_string();
    }

    let canonical = canonicalize(key);
    match key.root() {
        KeyPart::List(_) => canonical
            .strip_suffix(']')
            .map(str::to_string)
            .unwrap_or(canonical),
        _ => canonical,
    }
}

/// Loose substring match of a canonical key against a target.
pub fn matches_target(canonical: &str, target: &str) -> bool {
    canonical.contains(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SharedKey;
    use crate::query_key;
    use serde_json::json;

    #[test]
    fn test_primitives_are_json() {
        assert_eq!(canonicalize(&QueryKey::from("cases")), r#""cases""#);
        assert_eq!(canonicalize(&QueryKey::from(42i64)), "42");
        assert_eq!(canonicalize(&QueryKey::from(true)), "true");
        assert_eq!(canonicalize(&QueryKey::from(KeyPart::Null)), "null");
    }

    #[test]
    fn test_list_is_positional() {
        let a = canonicalize(&query_key!["cases", "list"]);
        let b = canonicalize(&query_key!["list", "cases"]);
        assert_eq!(a, r#"["cases","list"]"#);
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_order_independent() {
        let a = QueryKey::from(json!({"page": 1, "filter": "open"}));
        let b = QueryKey::new(KeyPart::object([
            ("filter", KeyPart::from("open")),
            ("page", KeyPart::from(1i64)),
        ]));
        assert_eq!(canonicalize(&a), canonicalize(&b));
        assert_eq!(canonicalize(&b), r#"{"filter":"open","page":1}"#);
    }

    #[test]
    fn test_undefined_omitted_from_objects() {
        let key = QueryKey::new(KeyPart::object([
            ("a", KeyPart::from(1i64)),
            ("skip", KeyPart::Undefined),
        ]));
        assert_eq!(canonicalize(&key), r#"{"a":1}"#);
    }

    #[test]
    fn test_undefined_in_list_is_null() {
        let key = QueryKey::new(KeyPart::List(vec!["a".into(), KeyPart::Undefined]));
        assert_eq!(canonicalize(&key), r#"["a",null]"#);
    }

    #[test]
    fn test_cycle_renders_marker() {
        let node = SharedKey::new(KeyPart::Null);
        node.set(KeyPart::object([
            ("name", KeyPart::from("root")),
            ("me", KeyPart::Shared(node.clone())),
        ]));
        let key = QueryKey::from(node);
        assert_eq!(canonicalize(&key), r#"{"me":"[Circular]","name":"root"}"#);
    }

    #[test]
    fn test_sibling_reuse_is_not_a_cycle() {
        let shared = SharedKey::new(KeyPart::from("x"));
        let key = QueryKey::new(KeyPart::List(vec![
            KeyPart::Shared(shared.clone()),
            KeyPart::Shared(shared),
        ]));
        assert_eq!(canonicalize(&key), r#"["x","x"]"#);
    }

    #[test]
    fn test_too_deep_falls_back() {
        let mut part = KeyPart::from("leaf");
        for _ in 0..(MAX_KEY_DEPTH + 5) {
            part = KeyPart::List(vec![part]);
        }
        let key = QueryKey::new(part);
        assert!(matches!(try_canonicalize(&key), Err(KeyError::TooDeep(_))));
        assert_eq!(canonicalize(&key), "[object]");
    }

    #[test]
    fn test_match_target_plain_string_is_raw() {
        let target = match_target(&QueryKey::from("case"));
        assert_eq!(target, "case");
        assert!(matches_target(r#"["cases-2024"]"#, &target));
    }

    #[test]
    fn test_match_target_list_prefix() {
        let target = match_target(&query_key!["cases"]);
        assert!(matches_target(r#"["cases","list"]"#, &target));
        assert!(matches_target(r#"["cases"]"#, &target));
        assert!(!matches_target(r#"["cases2","list"]"#, &target));
        assert!(!matches_target(r#"["billing","list"]"#, &target));
    }
}
