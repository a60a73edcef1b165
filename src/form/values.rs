use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::controller::{FormError, FormResult};

/// Current value of every tracked control, keyed by control name.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormValues(BTreeMap<String, String>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Like [`FormValues::get`], but a Rust-style `snake_case` name also
    /// matches a `kebab-case` control name.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).or_else(|| {
            name.contains('_')
                .then(|| name.replace('_', "-"))
                .and_then(|kebab| self.get(&kebab))
        })
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FormValues
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// `{values}` payload handed to the validation hook and to every event.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FormPayload {
    pub values: FormValues,
}

impl FormPayload {
    pub fn new(values: FormValues) -> Self {
        Self { values }
    }

    pub fn decode<T>(&self) -> FormResult<T>
    where
        T: FromFormValues,
    {
        T::from_form_values(&self.values)
    }
}

/// Typed view over a value map, usually produced by `#[derive(FormValues)]`.
pub trait FromFormValues: Sized {
    fn from_form_values(values: &FormValues) -> FormResult<Self>;
}

/// A single field type that can be read from a raw control value.
pub trait FormValue: Sized {
    fn from_form_value(field: &str, raw: Option<&str>) -> FormResult<Self>;
}

impl<T> FormValue for Option<T>
where
    T: FormValue,
{
    fn from_form_value(field: &str, raw: Option<&str>) -> FormResult<Self> {
        match raw {
            None | Some("") => Ok(None),
            Some(raw) => T::from_form_value(field, Some(raw)).map(Some),
        }
    }
}

impl FormValue for bool {
    /// Checkbox semantics: a present value is `true` unless it spells false.
    fn from_form_value(_field: &str, raw: Option<&str>) -> FormResult<Self> {
        Ok(match raw {
            None => false,
            Some(raw) => !matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "" | "false" | "off" | "0"
            ),
        })
    }
}

macro_rules! impl_form_value_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FormValue for $ty {
                fn from_form_value(field: &str, raw: Option<&str>) -> FormResult<Self> {
                    parse_required(field, raw)
                }
            }
        )*
    };
}

impl_form_value_from_str!(
    String, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    Decimal,
);

fn parse_required<T>(field: &str, raw: Option<&str>) -> FormResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw.ok_or_else(|| FormError::MissingValue(field.to_string()))?;
    raw.parse::<T>().map_err(|error| FormError::Decode {
        field: field.to_string(),
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_accepts_snake_case_for_kebab_names() {
        let values: FormValues = [("some-name", "value")].into_iter().collect();
        assert_eq!(values.lookup("some_name"), Some("value"));
        assert_eq!(values.lookup("some-name"), Some("value"));
        assert_eq!(values.lookup("other"), None);
    }

    #[test]
    fn payload_serializes_as_plain_values_object() {
        let payload = FormPayload::new([("some-name", "something")].into_iter().collect());
        assert_eq!(
            serde_json::to_value(&payload).expect("serialize payload"),
            serde_json::json!({ "values": { "some-name": "something" } })
        );
    }

    #[test]
    fn field_values_decode_with_clear_errors() {
        assert_eq!(u32::from_form_value("age", Some("42")).expect("decode"), 42);
        assert_eq!(
            u32::from_form_value("age", None),
            Err(FormError::MissingValue("age".into()))
        );
        assert!(matches!(
            u32::from_form_value("age", Some("old")),
            Err(FormError::Decode { field, .. }) if field == "age"
        ));
        assert_eq!(Option::<u32>::from_form_value("age", Some("")), Ok(None));
        assert!(bool::from_form_value("terms", Some("on")).expect("decode"));
        assert!(!bool::from_form_value("terms", None).expect("decode"));
    }
}
