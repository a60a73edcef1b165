use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::control::{FieldKey, RuleKind, ValiditySnapshot};

/// Per-field message overrides, one per native rule plus a fallback.
///
/// Keys match the attribute names, so the struct deserializes straight from
/// `value-missing = ".."` style configuration. Empty strings count as unset.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct FieldErrorConfig {
    pub value_missing: Option<String>,
    pub type_mismatch: Option<String>,
    pub pattern_mismatch: Option<String>,
    pub too_long: Option<String>,
    pub too_short: Option<String>,
    pub range_underflow: Option<String>,
    pub range_overflow: Option<String>,
    pub step_mismatch: Option<String>,
    pub bad_input: Option<String>,
    pub custom_error: Option<String>,
    pub default_error: Option<String>,
}

pub const DEFAULT_ERROR_ATTRIBUTE: &str = "default-error";

impl FieldErrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the recognised attributes and ignores everything else.
    pub fn from_attributes<'a>(attributes: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut config = Self::default();
        for (name, value) in attributes {
            config.set_attribute(name, Some(value));
        }
        config
    }

    pub fn with_message(mut self, rule: RuleKind, message: impl Into<String>) -> Self {
        *self.slot_mut(rule) = Some(message.into());
        self
    }

    pub fn with_default_error(mut self, message: impl Into<String>) -> Self {
        self.default_error = Some(message.into());
        self
    }

    pub fn message_for(&self, rule: RuleKind) -> Option<&str> {
        let slot = match rule {
            RuleKind::ValueMissing => &self.value_missing,
            RuleKind::TypeMismatch => &self.type_mismatch,
            RuleKind::PatternMismatch => &self.pattern_mismatch,
            RuleKind::TooLong => &self.too_long,
            RuleKind::TooShort => &self.too_short,
            RuleKind::RangeUnderflow => &self.range_underflow,
            RuleKind::RangeOverflow => &self.range_overflow,
            RuleKind::StepMismatch => &self.step_mismatch,
            RuleKind::BadInput => &self.bad_input,
            RuleKind::CustomError => &self.custom_error,
        };
        non_empty(slot.as_deref())
    }

    pub fn default_error(&self) -> Option<&str> {
        non_empty(self.default_error.as_deref())
    }

    /// Sets or removes (`None`) an override by attribute name. Returns whether
    /// the attribute is one this config understands.
    pub fn set_attribute(&mut self, name: &str, value: Option<&str>) -> bool {
        let value = value.map(str::to_string);
        if name.trim().eq_ignore_ascii_case(DEFAULT_ERROR_ATTRIBUTE) {
            self.default_error = value;
            return true;
        }
        match RuleKind::from_attribute(name) {
            Some(rule) => {
                *self.slot_mut(rule) = value;
                true
            }
            None => false,
        }
    }

    fn slot_mut(&mut self, rule: RuleKind) -> &mut Option<String> {
        match rule {
            RuleKind::ValueMissing => &mut self.value_missing,
            RuleKind::TypeMismatch => &mut self.type_mismatch,
            RuleKind::PatternMismatch => &mut self.pattern_mismatch,
            RuleKind::TooLong => &mut self.too_long,
            RuleKind::TooShort => &mut self.too_short,
            RuleKind::RangeUnderflow => &mut self.range_underflow,
            RuleKind::RangeOverflow => &mut self.range_overflow,
            RuleKind::StepMismatch => &mut self.step_mismatch,
            RuleKind::BadInput => &mut self.bad_input,
            RuleKind::CustomError => &mut self.custom_error,
        }
    }
}

/// Field name → message returned by the validation hook for one pass.
///
/// An absent key and an empty message both mean "no error"; only a
/// non-empty message invalidates the field.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalOverrides(BTreeMap<String, String>);

impl ExternalOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, message: impl Into<String>) {
        self.0.insert(name.into(), message.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        non_empty(self.0.get(name).map(String::as_str))
    }

    /// Number of entries that actually carry an error.
    pub fn error_count(&self) -> usize {
        self.0.values().filter(|message| !message.is_empty()).count()
    }
}

impl<K, V> FromIterator<(K, V)> for ExternalOverrides
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, message)| (name.into(), message.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, String>> for ExternalOverrides {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self(value)
    }
}

/// Which precedence tier produced a field's message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorSource {
    Hook,
    RuleOverride(RuleKind),
    DefaultOverride(RuleKind),
    Native(RuleKind),
}

/// The single winning error for a field, or none.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvedError {
    error: Option<(String, ErrorSource)>,
}

impl ResolvedError {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(&self) -> Option<&str> {
        self.error.as_ref().map(|(message, _)| message.as_str())
    }

    pub fn source(&self) -> Option<ErrorSource> {
        self.error.as_ref().map(|(_, source)| *source)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn found(message: &str, source: ErrorSource) -> Self {
        Self {
            error: Some((message.to_string(), source)),
        }
    }
}

/// Picks the effective error for one field.
///
/// Hook message, then the override for the first failing rule, then the
/// default-error override, then the control's own message.
pub fn resolve(
    snapshot: &ValiditySnapshot,
    config: &FieldErrorConfig,
    external: Option<&str>,
) -> ResolvedError {
    if let Some(message) = non_empty(external) {
        return ResolvedError::found(message, ErrorSource::Hook);
    }

    let Some(rule) = snapshot.first_failing() else {
        return ResolvedError::none();
    };

    if let Some(message) = config.message_for(rule) {
        return ResolvedError::found(message, ErrorSource::RuleOverride(rule));
    }
    if let Some(message) = config.default_error() {
        return ResolvedError::found(message, ErrorSource::DefaultOverride(rule));
    }

    // A failing control must never resolve to "no error".
    let native = non_empty(Some(snapshot.native_message())).unwrap_or(rule.attribute());
    ResolvedError::found(native, ErrorSource::Native(rule))
}

/// Convenience for [`resolve`] looking the field up in a hook result.
pub fn resolve_field(
    key: &FieldKey,
    snapshot: &ValiditySnapshot,
    config: &FieldErrorConfig,
    overrides: &ExternalOverrides,
) -> ResolvedError {
    let resolved = resolve(snapshot, config, overrides.get(key.as_str()));
    tracing::trace!(field = %key, source = ?resolved.source(), "resolved field error");
    resolved
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_mismatch() -> ValiditySnapshot {
        ValiditySnapshot::invalid([RuleKind::TypeMismatch], "Please enter an email address.")
    }

    fn full_config() -> FieldErrorConfig {
        FieldErrorConfig::new()
            .with_message(RuleKind::TypeMismatch, "Type mismatch!")
            .with_default_error("This field is invalid!")
    }

    #[test]
    fn hook_message_beats_every_other_tier() {
        let resolved = resolve(&type_mismatch(), &full_config(), Some("custom"));
        assert_eq!(resolved.message(), Some("custom"));
        assert_eq!(resolved.source(), Some(ErrorSource::Hook));
    }

    #[test]
    fn hook_message_invalidates_a_valid_field() {
        let resolved = resolve(&ValiditySnapshot::valid(), &FieldErrorConfig::new(), Some("taken"));
        assert_eq!(resolved.message(), Some("taken"));
    }

    #[test]
    fn empty_hook_message_means_no_hook_error() {
        let valid = resolve(&ValiditySnapshot::valid(), &full_config(), Some(""));
        assert!(!valid.is_error());
        let native = resolve(&type_mismatch(), &full_config(), Some(""));
        assert_eq!(native.message(), Some("Type mismatch!"));
    }

    #[test]
    fn rule_override_then_default_then_native() {
        let rule = resolve(&type_mismatch(), &full_config(), None);
        assert_eq!(rule.message(), Some("Type mismatch!"));
        assert_eq!(
            rule.source(),
            Some(ErrorSource::RuleOverride(RuleKind::TypeMismatch))
        );

        let missing = ValiditySnapshot::invalid([RuleKind::ValueMissing], "Please fill out this field.");
        let fallback = resolve(&missing, &full_config(), None);
        assert_eq!(fallback.message(), Some("This field is invalid!"));

        let mut config = full_config();
        config.set_attribute(DEFAULT_ERROR_ATTRIBUTE, None);
        let native = resolve(&missing, &config, None);
        assert_eq!(native.message(), Some("Please fill out this field."));
        assert_eq!(native.source(), Some(ErrorSource::Native(RuleKind::ValueMissing)));
    }

    #[test]
    fn only_the_first_failing_rule_is_looked_up() {
        let snapshot = ValiditySnapshot::invalid(
            [RuleKind::PatternMismatch, RuleKind::TooShort],
            "Please match the requested format.",
        );
        let config = FieldErrorConfig::new().with_message(RuleKind::TooShort, "too short");
        assert_eq!(
            resolve(&snapshot, &config, None).message(),
            Some("Please match the requested format.")
        );
    }

    #[test]
    fn empty_overrides_fall_through() {
        let config = FieldErrorConfig::from_attributes([("type-mismatch", ""), ("default-error", "")]);
        assert_eq!(
            resolve(&type_mismatch(), &config, None).message(),
            Some("Please enter an email address.")
        );
    }

    #[test]
    fn failing_control_without_message_still_errors() {
        let snapshot = ValiditySnapshot::invalid([RuleKind::BadInput], "");
        assert_eq!(
            resolve(&snapshot, &FieldErrorConfig::new(), None).message(),
            Some("bad-input")
        );
    }

    #[test]
    fn valid_field_without_hook_has_no_error() {
        assert_eq!(
            resolve(&ValiditySnapshot::valid(), &full_config(), None),
            ResolvedError::none()
        );
    }

    #[test]
    fn config_reads_attributes_and_ignores_unknown_ones() {
        let mut config = FieldErrorConfig::from_attributes([
            ("type-mismatch", "Type mismatch!"),
            ("default-error", "Invalid"),
            ("class", "wide"),
        ]);
        assert_eq!(config.message_for(RuleKind::TypeMismatch), Some("Type mismatch!"));
        assert_eq!(config.default_error(), Some("Invalid"));
        assert!(!config.set_attribute("class", Some("narrow")));
        assert!(config.set_attribute("VALUE-MISSING", Some("Required")));
        assert_eq!(config.message_for(RuleKind::ValueMissing), Some("Required"));
    }

    #[test]
    fn config_deserializes_from_kebab_case_toml() {
        let config: FieldErrorConfig = toml::from_str(
            r#"
                type-mismatch = "Type mismatch!"
                default-error = "This field is invalid!"
            "#,
        )
        .expect("config parses");
        assert_eq!(config, full_config());
    }

    #[test]
    fn overrides_count_only_real_errors() {
        let overrides: ExternalOverrides = [("a", "bad"), ("b", "")].into_iter().collect();
        assert_eq!(overrides.error_count(), 1);
        assert_eq!(overrides.get("a"), Some("bad"));
        assert_eq!(overrides.get("b"), None);
        assert_eq!(overrides.get("c"), None);
    }
}
