use std::cmp::Ordering;
use std::fmt;

/// Scalar value stored in a record field.
///
/// The engine only knows integers and text. Literals are detected by numeric
/// parse: `"42"` becomes `Int(42)`, everything else stays `Text`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl Value {
    /// Parse a raw literal the way the query grammar and CSV loader do:
    /// a full `i64` parse wins, anything else is text.
    pub fn from_literal(raw: &str) -> Value {
        match raw.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => Value::Text(raw.to_string()),
        }
    }

    /// Normalized comparison key. `Text("3")` and `Int(3)` map to the same key.
    pub fn key(&self) -> IndexKey {
        IndexKey::from(self)
    }

    /// Loose equality across scalar kinds: `"3"` equals `3`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.key() == other.key()
    }

    /// Loose ordering across scalar kinds, via the normalized key.
    pub fn loose_cmp(&self, other: &Value) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Normalized form of a [`Value`] used as a hash-index key and for every
/// predicate comparison.
///
/// Text that parses as an integer collapses into the integer, which is what
/// makes `"3" = 3` hold. Ordering is numeric for integers and lexicographic
/// for text; integers sort before text so `>` scans over a homogeneous
/// column behave like the underlying scalar comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexKey {
    Int(i64),
    Text(String),
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(n) => IndexKey::Int(*n),
            Value::Text(s) => match s.parse::<i64>() {
                Ok(n) => IndexKey::Int(n),
                Err(_) => IndexKey::Text(s.clone()),
            },
        }
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        IndexKey::from(&value)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(n) => write!(f, "{n}"),
            IndexKey::Text(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering::{Equal, Greater, Less};

    #[test]
    fn literal_detection_prefers_integers() {
        assert_eq!(Value::from_literal("42"), Value::Int(42));
        assert_eq!(Value::from_literal("-7"), Value::Int(-7));
        assert_eq!(Value::from_literal("4.2"), Value::Text("4.2".into()));
        assert_eq!(Value::from_literal("abc"), Value::Text("abc".into()));
        assert_eq!(Value::from_literal(""), Value::Text("".into()));
    }

    #[test]
    fn numeric_text_collides_with_int() {
        assert!(Value::Text("3".into()).loose_eq(&Value::Int(3)));
        assert!(Value::Int(3).loose_eq(&Value::Text("3".into())));
        assert!(!Value::Text("3x".into()).loose_eq(&Value::Int(3)));
    }

    #[test]
    fn loose_ordering_is_scalar_ordering() {
        assert_eq!(Value::Int(2).loose_cmp(&Value::Int(10)), Less);
        assert_eq!(
            Value::Text("2".into()).loose_cmp(&Value::Text("10".into())),
            Less
        );
        assert_eq!(
            Value::Text("b".into()).loose_cmp(&Value::Text("a".into())),
            Greater
        );
        assert_eq!(Value::Text("5".into()).loose_cmp(&Value::Int(5)), Equal);
    }

    #[test]
    fn json_form_is_untagged() {
        assert_eq!(serde_json::to_string(&Value::Int(1)).unwrap(), "1");
        assert_eq!(
            serde_json::to_string(&Value::Text("x".into())).unwrap(),
            "\"x\""
        );
    }

    proptest! {
        #[test]
        fn key_order_is_antisymmetric(i in any::<i64>(), j in any::<i64>()) {
            let a = Value::Int(i);
            let b = Value::Int(j);
            prop_assert_eq!(a.loose_cmp(&b), b.loose_cmp(&a).reverse());
        }

        #[test]
        fn int_and_its_text_form_share_a_key(i in any::<i64>()) {
            let as_text = Value::Text(i.to_string());
            prop_assert!(as_text.loose_eq(&Value::Int(i)));
        }

        #[test]
        fn non_numeric_text_keys_match_string_order(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            let va = Value::Text(a.clone());
            let vb = Value::Text(b.clone());
            prop_assert_eq!(va.loose_cmp(&vb), a.cmp(&b));
        }
    }
}
