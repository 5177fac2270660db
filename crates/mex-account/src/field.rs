//! Tri-state merge-patch field.
//!
//! Venue account tables are merge patches: a field the record does not
//! mention stays as it was, an explicit `null` clears it, and a value
//! overwrites it. Plain `Option<T>` cannot tell the first two apart, so
//! patch structs use [`Field<T>`] with `#[serde(default)]`.

use serde::{Deserialize, Deserializer};

/// A patch field that distinguishes absent, explicit null, and a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Field<T> {
    /// Not mentioned by the record; leave the stored value alone.
    #[default]
    Absent,
    /// Explicit `null`; clear the stored value.
    Null,
    /// Overwrite the stored value.
    Value(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Merge into a zero-defaulted slot: absent leaves it, null resets it,
    /// a value replaces it.
    pub fn merge_into(self, slot: &mut T)
    where
        T: Default,
    {
        match self {
            Self::Absent => {}
            Self::Null => *slot = T::default(),
            Self::Value(v) => *slot = v,
        }
    }

    /// Merge into an optional slot: null clears it to `None`.
    pub fn merge_opt(self, slot: &mut Option<T>) {
        match self {
            Self::Absent => {}
            Self::Null => *slot = None,
            Self::Value(v) => *slot = Some(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Absent => Field::Absent,
            Self::Null => Field::Null,
            Self::Value(v) => Field::Value(f(v)),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the key is present; `#[serde(default)]` covers
        // the absent case.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Self::Value(v),
            None => Self::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(default)]
        qty: Field<i64>,
    }

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        let absent: Row = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(absent.qty, Field::Absent);

        let null: Row = serde_json::from_str(r#"{"qty":null}"#).unwrap();
        assert_eq!(null.qty, Field::Null);

        let value: Row = serde_json::from_str(r#"{"qty":64}"#).unwrap();
        assert_eq!(value.qty, Field::Value(64));
    }

    #[test]
    fn test_merge_into_zero_default() {
        let mut slot = 10i64;
        Field::Absent.merge_into(&mut slot);
        assert_eq!(slot, 10);
        Field::Value(7).merge_into(&mut slot);
        assert_eq!(slot, 7);
        Field::Null.merge_into(&mut slot);
        assert_eq!(slot, 0);
    }

    #[test]
    fn test_merge_opt() {
        let mut slot = Some("Liquidation".to_string());
        Field::<String>::Null.merge_opt(&mut slot);
        assert_eq!(slot, None);
    }
}
