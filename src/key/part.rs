//! Query Key Types
//!
//! A query key is a small tree of JSON-like parts. Shared nodes carry an
//! identity so that keys built as graphs (including cycles) can be detected
//! while canonicalizing.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::{Number, Value};

use super::canonical::canonicalize;

// == Key Part ==
/// One node of a query key.
#[derive(Debug, Clone)]
pub enum KeyPart {
    /// Absent value; omitted from objects, rendered `null` inside lists
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Positional segments
    List(Vec<KeyPart>),
    /// Named segments in insertion order; order does not affect the canonical form
    Object(Vec<(String, KeyPart)>),
    /// Identity-carrying node, may participate in cycles
    Shared(SharedKey),
}

impl KeyPart {
    /// Builds an object part from `(name, part)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, KeyPart)>,
        K: Into<String>,
    {
        KeyPart::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, KeyPart::Undefined)
    }
}

// == Shared Key ==
/// A key node with identity and interior mutability.
///
/// Cloning a `SharedKey` clones the handle, not the node: both handles are
/// the same node for cycle detection. Use [`SharedKey::set`] to wire a node
/// back into itself.
///
/// Nodes are reference counted, so a cycle keeps itself alive and is never
/// freed. Cyclic keys leak; build them only for long-lived keys.
#[derive(Clone)]
pub struct SharedKey(Arc<RwLock<KeyPart>>);

impl SharedKey {
    /// Creates a new shared node holding `part`.
    pub fn new(part: KeyPart) -> Self {
        Self(Arc::new(RwLock::new(part)))
    }

    /// Replaces the node's content.
    pub fn set(&self, part: KeyPart) {
        match self.0.write() {
            Ok(mut guard) => *guard = part,
            Err(poisoned) => *poisoned.into_inner() = part,
        }
    }

    /// Stable identity of the node for the lifetime of any handle to it.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn inner(&self) -> &RwLock<KeyPart> {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    // The content is not printed; it may refer back to this node.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey({:#x})", self.id())
    }
}

// == Query Key ==
/// An opaque identifier for a cached query.
///
/// Keys compare by canonical form; see [`canonicalize`].
#[derive(Debug, Clone)]
pub struct QueryKey {
    root: KeyPart,
}

impl QueryKey {
    /// Wraps a key part as a query key.
    pub fn new(root: KeyPart) -> Self {
        Self { root }
    }

    /// Returns the root part.
    pub fn root(&self) -> &KeyPart {
        &self.root
    }

    /// Returns the canonical string form of this key.
    pub fn canonical(&self) -> String {
        canonicalize(self)
    }

    /// Returns the raw text if the key is a plain string.
    pub fn as_plain_str(&self) -> Option<&str> {
        match &self.root {
            KeyPart::String(s) => Some(s),
            _ => None,
        }
    }

    /// Non-recursive string form used when canonicalization fails.
    pub fn fallback_string(&self) -> String {
        match &self.root {
            KeyPart::Undefined => "undefined".to_string(),
            KeyPart::Null => "null".to_string(),
            KeyPart::Bool(b) => b.to_string(),
            KeyPart::Number(n) => n.to_string(),
            KeyPart::String(s) => s.clone(),
            KeyPart::List(_) | KeyPart::Object(_) | KeyPart::Shared(_) => "[object]".to_string(),
        }
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

// == Conversions ==
impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Number(n.into())
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        KeyPart::Number(n.into())
    }
}

impl From<u64> for KeyPart {
    fn from(n: u64) -> Self {
        KeyPart::Number(n.into())
    }
}

impl From<SharedKey> for KeyPart {
    fn from(node: SharedKey) -> Self {
        KeyPart::Shared(node)
    }
}

impl From<Vec<KeyPart>> for KeyPart {
    fn from(parts: Vec<KeyPart>) -> Self {
        KeyPart::List(parts)
    }
}

impl From<Value> for KeyPart {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(b),
            Value::Number(n) => KeyPart::Number(n),
            Value::String(s) => KeyPart::String(s),
            Value::Array(items) => KeyPart::List(items.into_iter().map(KeyPart::from).collect()),
            Value::Object(map) => {
                KeyPart::Object(map.into_iter().map(|(k, v)| (k, KeyPart::from(v))).collect())
            }
        }
    }
}

macro_rules! impl_query_key_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for QueryKey {
                fn from(part: $ty) -> Self {
                    QueryKey::new(KeyPart::from(part))
                }
            }
        )*
    };
}

impl_query_key_from!(&str, String, bool, i64, i32, u64, SharedKey, Vec<KeyPart>, Value);

impl From<KeyPart> for QueryKey {
    fn from(part: KeyPart) -> Self {
        QueryKey::new(part)
    }
}

/// Builds a list-shaped [`QueryKey`] from segments.
///
/// ```
/// use query_cache::query_key;
///
/// let key = query_key!["cases", "list", 7];
/// assert_eq!(key.canonical(), r#"["cases","list",7]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::key::QueryKey::new($crate::key::KeyPart::List(vec![
            $($crate::key::KeyPart::from($part)),*
        ]))
    };
}
