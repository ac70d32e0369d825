use std::borrow::Cow;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Largest list index a write may pad up to.
pub const MAX_LIST_INDEX: usize = u16::MAX as usize;

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Address of a field inside the nested state documents.
///
/// Parses dotted and bracket notation, so `"friends[1].name"` becomes
/// `friends`, `1`, `name`. The empty path addresses the document root.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        for part in raw.split('.') {
            let mut rest = part;
            if let Some(open) = rest.find('[') {
                let key = &rest[..open];
                if !key.is_empty() {
                    segments.push(PathSegment::Key(key.to_string()));
                }
                rest = &rest[open..];
                while let Some(stripped) = rest.strip_prefix('[') {
                    let Some(close) = stripped.find(']') else {
                        segments.push(PathSegment::Key(rest.to_string()));
                        rest = "";
                        break;
                    };
                    let inner = &stripped[..close];
                    segments.push(match inner.parse::<usize>() {
                        Ok(index) => PathSegment::Index(index),
                        Err(_) => PathSegment::Key(inner.to_string()),
                    });
                    rest = &stripped[close + 1..];
                }
                if !rest.is_empty() {
                    segments.push(PathSegment::Key(rest.to_string()));
                }
            } else if !rest.is_empty() {
                segments.push(PathSegment::Key(rest.to_string()));
            }
        }
        Self(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, child: &FieldPath) -> FieldPath {
        let mut segments = self.0.clone();
        segments.extend(child.0.iter().cloned());
        FieldPath(segments)
    }

    pub fn index(&self, index: usize) -> FieldPath {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        FieldPath(segments)
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if position > 0 => write!(f, ".{key}")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for FieldPath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for FieldPath {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&FieldPath> for FieldPath {
    fn from(value: &FieldPath) -> Self {
        value.clone()
    }
}

impl From<Vec<PathSegment>> for FieldPath {
    fn from(value: Vec<PathSegment>) -> Self {
        Self(value)
    }
}

impl FromIterator<PathSegment> for FieldPath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Live state of a form. Owned by the store; the controller only reads
/// snapshots of it and describes changes through intents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormState {
    pub values: Value,
    pub touched: Value,
    pub errors: Value,
    pub warnings: Value,
    pub successes: Value,
    pub async_errors: Value,
    pub async_warnings: Value,
    pub async_successes: Value,
    pub validating: Value,
    pub async_validations: u32,
    pub submits: u32,
    pub submitting: bool,
    pub submitted: bool,
}

impl Default for FormState {
    fn default() -> Self {
        Self::with_values(empty_object())
    }
}

impl FormState {
    pub fn with_values(values: Value) -> Self {
        Self {
            values,
            touched: empty_object(),
            errors: empty_object(),
            warnings: empty_object(),
            successes: empty_object(),
            async_errors: empty_object(),
            async_warnings: empty_object(),
            async_successes: empty_object(),
            validating: empty_object(),
            async_validations: 0,
            submits: 0,
            submitting: false,
            submitted: false,
        }
    }

    pub fn value(&self, path: &FieldPath) -> Option<&Value> {
        get(&self.values, path)
    }

    pub fn touched(&self, path: &FieldPath) -> Option<&Value> {
        get(&self.touched, path)
    }

    pub fn error(&self, path: &FieldPath) -> Option<&Value> {
        get(&self.errors, path)
    }

    pub fn warning(&self, path: &FieldPath) -> Option<&Value> {
        get(&self.warnings, path)
    }

    pub fn success(&self, path: &FieldPath) -> Option<&Value> {
        get(&self.successes, path)
    }

    pub fn async_error(&self, path: &FieldPath) -> Option<&Value> {
        get(&self.async_errors, path)
    }

    pub fn is_validating(&self, path: &FieldPath) -> bool {
        get(&self.validating, path).is_some_and(is_truthy)
    }
}

pub fn empty_object() -> Value {
    Value::Object(Map::new())
}

pub fn get<'a>(document: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(document, |current, segment| {
            match (slot_for(current, segment), current) {
                (Slot::Index(index), Value::Array(items)) => items.get(index),
                (Slot::Key(key), Value::Object(map)) => map.get(&*key),
                _ => None,
            }
        })
}

/// Writes `value` at `path`, creating intermediate objects for keys and
/// arrays (padded with `null`) for indices. Containers of the wrong shape
/// along the way are replaced. A write whose index exceeds
/// [`MAX_LIST_INDEX`] is skipped and leaves `document` untouched.
pub(crate) fn set(document: &mut Value, path: &FieldPath, value: Value) {
    if exceeds_list_limit(path) {
        warn!(%path, limit = MAX_LIST_INDEX, "list index out of bounds, write skipped");
        return;
    }

    let mut current = document;
    for segment in path.segments() {
        let Some(next) = child_mut(current, segment) else {
            return;
        };
        current = next;
    }
    *current = value;
}

pub(crate) fn remove(document: &mut Value, path: &FieldPath) -> Option<Value> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Some(std::mem::replace(document, empty_object()));
    };

    let mut current = document;
    for segment in parents {
        current = match (slot_for(current, segment), current) {
            (Slot::Index(index), Value::Array(items)) => items.get_mut(index)?,
            (Slot::Key(key), Value::Object(map)) => map.get_mut(&*key)?,
            _ => return None,
        };
    }

    match (slot_for(current, last), current) {
        (Slot::Index(index), Value::Array(items)) => items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, Value::Null)),
        (Slot::Key(key), Value::Object(map)) => map.remove(&*key),
        _ => None,
    }
}

/// How a segment addresses `container`. Digit keys index into an existing
/// array and indices name a key of an existing object, so neither shape is
/// replaced by the other.
enum Slot<'a> {
    Index(usize),
    Key(Cow<'a, str>),
}

fn slot_for<'a>(container: &Value, segment: &'a PathSegment) -> Slot<'a> {
    match (segment, container) {
        (PathSegment::Key(key), Value::Array(_)) => match key.parse::<usize>() {
            Ok(index) => Slot::Index(index),
            Err(_) => Slot::Key(Cow::Borrowed(key)),
        },
        (PathSegment::Key(key), _) => Slot::Key(Cow::Borrowed(key)),
        (PathSegment::Index(index), Value::Object(_)) => Slot::Key(Cow::Owned(index.to_string())),
        (PathSegment::Index(index), _) => Slot::Index(*index),
    }
}

fn exceeds_list_limit(path: &FieldPath) -> bool {
    path.segments().iter().any(|segment| match segment {
        PathSegment::Index(index) => *index > MAX_LIST_INDEX,
        PathSegment::Key(_) => false,
    })
}

fn child_mut<'a>(current: &'a mut Value, segment: &PathSegment) -> Option<&'a mut Value> {
    match slot_for(current, segment) {
        Slot::Index(index) => {
            if index > MAX_LIST_INDEX {
                warn!(index, limit = MAX_LIST_INDEX, "list index out of bounds, write skipped");
                return None;
            }
            if !current.is_array() {
                *current = Value::Array(Vec::new());
            }
            let Value::Array(items) = current else {
                return None;
            };
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        Slot::Key(key) => {
            if !current.is_object() {
                *current = empty_object();
            }
            let Value::Object(map) = current else {
                return None;
            };
            Some(map.entry(key.into_owned()).or_insert(Value::Null))
        }
    }
}

/// `null`, `false`, `0` and `""` are falsy; every other value, including
/// empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Structural equality. Object keys compare order-insensitively, a missing
/// key never equals an explicit `null`, and numbers compare by value, so
/// `1` equals `1.0`.
pub fn deep_equal(a: &FormState, b: &FormState) -> bool {
    let FormState {
        values,
        touched,
        errors,
        warnings,
        successes,
        async_errors,
        async_warnings,
        async_successes,
        validating,
        async_validations,
        submits,
        submitting,
        submitted,
    } = a;
    *async_validations == b.async_validations
        && *submits == b.submits
        && *submitting == b.submitting
        && *submitted == b.submitted
        && [
            (values, &b.values),
            (touched, &b.touched),
            (errors, &b.errors),
            (warnings, &b.warnings),
            (successes, &b.successes),
            (async_errors, &b.async_errors),
            (async_warnings, &b.async_warnings),
            (async_successes, &b.async_successes),
            (validating, &b.validating),
        ]
        .into_iter()
        .all(|(left, right)| values_equal(left, right))
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| values_equal(value, other)))
        }
        _ => a == b,
    }
}

pub fn snapshot(state: &FormState) -> FormState {
    state.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dotted_and_bracket_paths() {
        let path = FieldPath::parse("friends[1].name");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("friends".into()),
                PathSegment::Index(1),
                PathSegment::Key("name".into()),
            ]
        );
        assert_eq!(path.to_string(), "friends[1].name");
        assert!(FieldPath::parse("").is_root());
    }

    #[test]
    fn set_creates_intermediate_containers() {
        let mut document = json!({});
        set(&mut document, &"a.b[2].c".into(), json!("x"));
        assert_eq!(document, json!({"a": {"b": [null, null, {"c": "x"}]}}));
        assert_eq!(get(&document, &"a.b[2].c".into()), Some(&json!("x")));
        assert_eq!(get(&document, &"a.b[5]".into()), None);
    }

    #[test]
    fn remove_drops_keys_and_nulls_indices() {
        let mut document = json!({"a": {"b": 1, "c": [1, 2]}});
        assert_eq!(remove(&mut document, &"a.b".into()), Some(json!(1)));
        assert_eq!(remove(&mut document, &"a.c[0]".into()), Some(json!(1)));
        assert_eq!(remove(&mut document, &"missing.key".into()), None);
        assert_eq!(document, json!({"a": {"c": [null, 2]}}));
    }

    #[test]
    fn dotted_digit_keys_index_existing_lists() {
        let mut document = json!({"friends": ["a", "b", "c"], "scores": {"1": 10}});
        let second = FieldPath::parse("friends.1");
        assert_eq!(get(&document, &second), Some(&json!("b")));

        set(&mut document, &second, json!("z"));
        set(&mut document, &"scores[1]".into(), json!(11));
        assert_eq!(
            document,
            json!({"friends": ["a", "z", "c"], "scores": {"1": 11}})
        );
        assert_eq!(remove(&mut document, &"friends.0".into()), Some(json!("a")));
        assert_eq!(document["friends"], json!([null, "z", "c"]));
    }

    #[test]
    fn oversized_list_index_leaves_document_untouched() {
        let mut document = json!({"a": [1]});
        set(&mut document, &"a[4000000000]".into(), json!(2));
        set(&mut document, &"a.4000000000".into(), json!(2));
        set(&mut document, &"b[4000000000].c".into(), json!(2));
        assert_eq!(document, json!({"a": [1]}));

        set(&mut document, &FieldPath::from("a").index(3), json!(4));
        assert_eq!(document, json!({"a": [1, null, null, 4]}));
    }

    #[test]
    fn numbers_compare_by_value() {
        let integer = FormState::with_values(json!({"age": 1, "tags": [2]}));
        let float = FormState::with_values(json!({"age": 1.0, "tags": [2.0]}));
        assert!(deep_equal(&integer, &float));
        assert!(!deep_equal(
            &integer,
            &FormState::with_values(json!({"age": 1.5, "tags": [2]}))
        ));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": null})));
    }

    #[test]
    fn missing_key_is_not_equal_to_null() {
        let mut with_null = FormState::default();
        set(&mut with_null.errors, &"email".into(), Value::Null);
        assert!(!deep_equal(&with_null, &FormState::default()));
        assert!(deep_equal(&snapshot(&with_null), &with_null));
    }

    #[test]
    fn truthiness_follows_scalar_rules() {
        for falsy in [json!(null), json!(false), json!(0), json!(""), json!(0.0)] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("x"), json!([]), json!({})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }
}
