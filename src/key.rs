//! Cache key derivation.
//!
//! A [`CacheKey`] is rendered from three sections joined with `:`:
//!
//! ```text
//! {prefix}:{schema}:{name}={value}&{name}={value}...
//! ```
//!
//! Every component is percent-escaped (anything outside `[A-Za-z0-9._~-]`
//! becomes `%XX`), so the separators `:`, `=` and `&` only ever appear as
//! separators and two different inputs cannot render to the same key.
//! Argument pairs are emitted in name order, which makes the key independent
//! of the order a call site or invalidation declares its argument names in.
//!
//! Values are canonicalized before escaping so that the same logical value
//! produces the same key whatever Rust type it was bound from: `7u8`, `7i64`,
//! `7.0f64` and `"7"` all render as `7`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Number, Value};

use crate::{CacheError, Result};

/// Stable identity of the shape of a cached (or invalidated) value.
///
/// Two call sites caching different representations of the same resource
/// must use different schema identities; a read and an invalidation that
/// should meet on the same entry must use the same one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(String);

impl SchemaId {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SchemaId {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl From<String> for SchemaId {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named argument values bound from a single call.
///
/// ```rust
/// # use rescache::Arguments;
/// let args = Arguments::new().with("id", 7).with("name", "A");
/// assert_eq!(args.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any earlier binding.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Bound argument names, in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Arguments
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A derived cache key. Opaque apart from its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive a key from the arguments listed in `names`.
///
/// Arguments not listed never affect the key. Fails with
/// [`CacheError::MissingArgument`] if a listed name is not bound.
pub fn build_key<S: AsRef<str>>(
    prefix: &str,
    schema: &SchemaId,
    names: &[S],
    arguments: &Arguments,
) -> Result<CacheKey> {
    let mut selected = BTreeMap::new();
    for name in names {
        let name = name.as_ref();
        let value = arguments
            .get(name)
            .ok_or_else(|| CacheError::MissingArgument {
                argument: name.to_string(),
                schema: schema.to_string(),
            })?;
        selected.insert(name, value);
    }
    Ok(render(prefix, schema, selected))
}

/// Derive a key from every bound argument.
pub fn build_full_key(prefix: &str, schema: &SchemaId, arguments: &Arguments) -> CacheKey {
    render(
        prefix,
        schema,
        arguments.values.iter().map(|(name, value)| (name.as_str(), value)),
    )
}

fn render<'a>(
    prefix: &str,
    schema: &SchemaId,
    pairs: impl IntoIterator<Item = (&'a str, &'a Value)>,
) -> CacheKey {
    let mut key = String::new();
    escape_into(&mut key, prefix);
    key.push(':');
    escape_into(&mut key, schema.as_str());
    key.push(':');
    for (i, (name, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            key.push('&');
        }
        escape_into(&mut key, name);
        key.push('=');
        escape_into(&mut key, &canonicalize(value));
    }
    CacheKey(key)
}

/// Stable string form of an argument value.
pub fn canonicalize(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Number(n) => Cow::Owned(canonical_number(n)),
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        Value::Null => Cow::Borrowed("null"),
        Value::Array(_) | Value::Object(_) => {
            let mut out = String::new();
            write_canonical_json(&mut out, value);
            Cow::Owned(out)
        }
    }
}

// Floats holding an integral value render like integers; beyond 2^53 a float
// no longer identifies a single integer, so it keeps its float form.
fn canonical_number(n: &Number) -> String {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() <= MAX_EXACT {
                return format!("{}", f as i64);
            }
        }
    }
    n.to_string()
}

// Compact JSON with object keys sorted, independent of serde_json's map
// ordering features.
fn write_canonical_json(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, inner)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::from(name.as_str()).to_string());
                out.push(':');
                write_canonical_json(out, inner);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, inner) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(out, inner);
            }
            out.push(']');
        }
        Value::Number(n) => out.push_str(&canonical_number(n)),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '~' | '-') {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
}
