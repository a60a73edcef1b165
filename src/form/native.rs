use std::str::FromStr;
use std::sync::RwLock;

use regex::Regex;
use rust_decimal::Decimal;
use url::Url;

use super::control::{FieldKey, NativeControl, RuleKind, ValiditySnapshot};
use crate::i18n::I18nManager;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InputKind {
    #[default]
    Text,
    Search,
    Tel,
    Password,
    Email,
    Url,
    Number,
    Range,
    Textarea,
}

impl InputKind {
    /// Parses a `type` attribute. Unknown types behave as text, like browsers.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "search" => Self::Search,
            "tel" => Self::Tel,
            "password" => Self::Password,
            "email" => Self::Email,
            "url" => Self::Url,
            "number" => Self::Number,
            "range" => Self::Range,
            "textarea" => Self::Textarea,
            _ => Self::Text,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Range)
    }

    fn supports_pattern(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Search | Self::Tel | Self::Password | Self::Email | Self::Url
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Step {
    #[default]
    Default,
    Any,
    Value(Decimal),
}

impl Step {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("any") {
            return Self::Any;
        }
        match parse_decimal(trimmed) {
            Some(step) if step > Decimal::ZERO => Self::Value(step),
            _ => Self::Default,
        }
    }

    fn size(self) -> Option<Decimal> {
        match self {
            Step::Default => Some(Decimal::ONE),
            Step::Any => None,
            Step::Value(step) => Some(step),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Constraints {
    required: bool,
    pattern: Option<Regex>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min: Option<Decimal>,
    max: Option<Decimal>,
    step: Step,
}

#[derive(Debug, Default)]
struct InputState {
    value: String,
    default_value: String,
    custom_validity: String,
}

/// Text-like form control that evaluates the standard constraint set.
#[derive(Debug)]
pub struct InputControl {
    name: FieldKey,
    kind: InputKind,
    constraints: Constraints,
    messages: I18nManager,
    state: RwLock<InputState>,
}

impl InputControl {
    pub fn new(name: impl Into<FieldKey>) -> Self {
        Self {
            name: name.into(),
            kind: InputKind::Text,
            constraints: Constraints::default(),
            messages: I18nManager::new(),
            state: RwLock::new(InputState::default()),
        }
    }

    pub fn kind(mut self, kind: InputKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn required(mut self, value: bool) -> Self {
        self.constraints.required = value;
        self
    }

    /// Sets the `pattern` attribute. The whole value must match; a pattern
    /// that fails to compile is ignored.
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.constraints.pattern = if pattern.is_empty() {
            None
        } else {
            match Regex::new(&format!("^(?:{pattern})$")) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    tracing::debug!(name = %self.name, %error, "ignoring invalid pattern");
                    None
                }
            }
        };
        self
    }

    pub fn min_length(mut self, value: usize) -> Self {
        self.constraints.min_length = Some(value);
        self
    }

    pub fn max_length(mut self, value: usize) -> Self {
        self.constraints.max_length = Some(value);
        self
    }

    pub fn min(mut self, value: Decimal) -> Self {
        self.constraints.min = Some(value);
        self
    }

    pub fn max(mut self, value: Decimal) -> Self {
        self.constraints.max = Some(value);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.constraints.step = step;
        self
    }

    /// Initial value; also what a form reset restores.
    pub fn default_value(self, value: impl Into<String>) -> Self {
        {
            let mut state = self.lock_state_mut();
            let value = value.into();
            state.default_value = value.clone();
            state.value = value;
        }
        self
    }

    pub fn messages(mut self, messages: I18nManager) -> Self {
        self.messages = messages;
        self
    }

    /// Builds a control from HTML-style attributes. Unknown attributes and
    /// unparsable numbers are ignored.
    pub fn from_attributes<'a>(
        name: impl Into<FieldKey>,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut control = Self::new(name);
        for (attribute, value) in attributes {
            control = match attribute.trim().to_ascii_lowercase().as_str() {
                "type" => control.kind(InputKind::parse(value)),
                "required" => control.required(true),
                "pattern" => control.pattern(value),
                "minlength" => match value.trim().parse() {
                    Ok(length) => control.min_length(length),
                    Err(_) => control,
                },
                "maxlength" => match value.trim().parse() {
                    Ok(length) => control.max_length(length),
                    Err(_) => control,
                },
                "min" => match parse_decimal(value) {
                    Some(min) => control.min(min),
                    None => control,
                },
                "max" => match parse_decimal(value) {
                    Some(max) => control.max(max),
                    None => control,
                },
                "step" => control.step(Step::parse(value)),
                "value" => control.default_value(value),
                _ => control,
            };
        }
        control
    }

    pub fn input_kind(&self) -> InputKind {
        self.kind
    }

    /// Application-level custom error; an empty message clears it.
    pub fn set_custom_validity(&self, message: impl Into<String>) {
        self.lock_state_mut().custom_validity = message.into();
    }

    fn lock_state(&self) -> std::sync::RwLockReadGuard<'_, InputState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_state_mut(&self) -> std::sync::RwLockWriteGuard<'_, InputState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn failing_rules(&self, value: &str, custom_validity: &str) -> Vec<(RuleKind, String)> {
        let mut failing = Vec::new();
        let constraints = &self.constraints;

        if constraints.required && value.is_empty() {
            failing.push((RuleKind::ValueMissing, self.messages.t("validity.value-missing")));
        }

        if !value.is_empty() {
            match self.kind {
                InputKind::Email if !is_simple_email(value) => failing.push((
                    RuleKind::TypeMismatch,
                    self.messages.t("validity.type-mismatch.email"),
                )),
                InputKind::Url if Url::parse(value).is_err() => failing.push((
                    RuleKind::TypeMismatch,
                    self.messages.t("validity.type-mismatch.url"),
                )),
                _ => {}
            }

            if self.kind.supports_pattern()
                && constraints
                    .pattern
                    .as_ref()
                    .is_some_and(|pattern| !pattern.is_match(value))
            {
                failing.push((
                    RuleKind::PatternMismatch,
                    self.messages.t("validity.pattern-mismatch"),
                ));
            }

            if !self.kind.is_numeric() {
                let length = value.chars().count();
                let current = length.to_string();
                if let Some(max) = constraints.max_length.filter(|max| length > *max) {
                    failing.push((
                        RuleKind::TooLong,
                        self.messages.t_with(
                            "validity.too-long",
                            &[("max", &max.to_string()), ("length", &current)],
                        ),
                    ));
                }
                if let Some(min) = constraints.min_length.filter(|min| length < *min) {
                    failing.push((
                        RuleKind::TooShort,
                        self.messages.t_with(
                            "validity.too-short",
                            &[("min", &min.to_string()), ("length", &current)],
                        ),
                    ));
                }
            } else {
                match parse_decimal(value) {
                    Some(number) => failing.extend(self.numeric_failures(number)),
                    None => {
                        failing.push((RuleKind::BadInput, self.messages.t("validity.bad-input")))
                    }
                }
            }
        }

        if !custom_validity.is_empty() {
            failing.push((RuleKind::CustomError, custom_validity.to_string()));
        }

        failing.sort_by_key(|(rule, _)| *rule);
        failing
    }

    fn numeric_failures(&self, number: Decimal) -> Vec<(RuleKind, String)> {
        let mut failing = Vec::new();
        let constraints = &self.constraints;

        if let Some(min) = constraints.min.filter(|min| number < *min) {
            failing.push((
                RuleKind::RangeUnderflow,
                self.messages
                    .t_with("validity.range-underflow", &[("min", &format_decimal(min))]),
            ));
        }
        if let Some(max) = constraints.max.filter(|max| number > *max) {
            failing.push((
                RuleKind::RangeOverflow,
                self.messages
                    .t_with("validity.range-overflow", &[("max", &format_decimal(max))]),
            ));
        }

        if let Some(step) = constraints.step.size() {
            let base = constraints.min.unwrap_or(Decimal::ZERO);
            if let Some((low, high)) = step_neighbours(number, base, step) {
                failing.push((
                    RuleKind::StepMismatch,
                    self.messages.t_with(
                        "validity.step-mismatch",
                        &[
                            ("low", &format_decimal(low)),
                            ("high", &format_decimal(high)),
                        ],
                    ),
                ));
            }
        }

        failing
    }
}

impl NativeControl for InputControl {
    fn name(&self) -> FieldKey {
        self.name.clone()
    }

    fn value(&self) -> String {
        self.lock_state().value.clone()
    }

    fn set_value(&self, value: &str) {
        self.lock_state_mut().value = value.to_string();
    }

    fn reset_value(&self) {
        let mut state = self.lock_state_mut();
        state.value = state.default_value.clone();
    }

    fn validity(&self) -> ValiditySnapshot {
        let (value, custom_validity) = {
            let state = self.lock_state();
            (state.value.clone(), state.custom_validity.clone())
        };
        let failing = self.failing_rules(&value, &custom_validity);
        let message = failing
            .first()
            .map(|(_, message)| message.clone())
            .unwrap_or_default();
        ValiditySnapshot::invalid(failing.into_iter().map(|(rule, _)| rule), message)
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Nearest valid values around a misaligned `number`, or `None` when it is
/// aligned. Arithmetic that leaves the decimal range counts as aligned.
fn step_neighbours(number: Decimal, base: Decimal, step: Decimal) -> Option<(Decimal, Decimal)> {
    let offset = number.checked_sub(base)?;
    if offset.checked_rem(step)?.is_zero() {
        return None;
    }
    let low = offset
        .checked_div(step)?
        .floor()
        .checked_mul(step)?
        .checked_add(base)?;
    let high = low.checked_add(step)?;
    Some((low, high))
}

fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

fn is_ascii_email_local_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '.' | '!'
                | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
                | '-'
        )
}

fn is_valid_email_domain_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let first_last_ok = label.starts_with(|ch: char| ch.is_ascii_alphanumeric())
        && label.ends_with(|ch: char| ch.is_ascii_alphanumeric());
    first_last_ok
        && label
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
}

fn is_simple_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && local.chars().all(is_ascii_email_local_char)
        && !domain.is_empty()
        && domain.split('.').all(is_valid_email_domain_label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_optional_value_is_valid() {
        let control = InputControl::new("name").pattern("^.{20,}$").min_length(3);
        assert!(control.validity().is_valid());
    }

    #[test]
    fn required_empty_value_is_missing() {
        let control = InputControl::new("name").required(true);
        let snapshot = control.validity();
        assert_eq!(snapshot.first_failing(), Some(RuleKind::ValueMissing));
        assert_eq!(snapshot.native_message(), "Please fill out this field.");
    }

    #[test]
    fn pattern_must_match_the_whole_value() {
        let control = InputControl::new("name").pattern("^ab|ef$");
        control.set_value("a");
        assert!(control.validity().fails(RuleKind::PatternMismatch));
        control.set_value("ab");
        assert!(control.validity().is_valid());
        control.set_value("ef");
        assert!(control.validity().is_valid());
        control.set_value("abef");
        assert!(control.validity().fails(RuleKind::PatternMismatch));
    }

    #[test]
    fn invalid_pattern_is_ignored() {
        let control = InputControl::new("name").pattern("(unclosed");
        control.set_value("anything");
        assert!(control.validity().is_valid());
    }

    #[test]
    fn email_type_mismatch() {
        let control = InputControl::new("mail").kind(InputKind::Email);
        control.set_value("a");
        let snapshot = control.validity();
        assert_eq!(snapshot.first_failing(), Some(RuleKind::TypeMismatch));
        assert_eq!(snapshot.native_message(), "Please enter an email address.");
        control.set_value("some@else");
        assert!(control.validity().is_valid());
    }

    #[test]
    fn url_type_mismatch() {
        let control = InputControl::new("site").kind(InputKind::Url);
        control.set_value("not a url");
        assert!(control.validity().fails(RuleKind::TypeMismatch));
        control.set_value("https://example.com/path");
        assert!(control.validity().is_valid());
    }

    #[test]
    fn length_limits_count_characters() {
        let control = InputControl::new("bio").min_length(3).max_length(5);
        control.set_value("éé");
        let snapshot = control.validity();
        assert_eq!(snapshot.first_failing(), Some(RuleKind::TooShort));
        assert_eq!(
            snapshot.native_message(),
            "Please lengthen this text to 3 characters or more (you are currently using 2 characters)."
        );
        control.set_value("éééééé");
        assert_eq!(control.validity().first_failing(), Some(RuleKind::TooLong));
    }

    #[test]
    fn numeric_range_and_step() {
        let control = InputControl::from_attributes(
            "qty",
            [("type", "number"), ("min", "1"), ("max", "10"), ("step", "0.5")],
        );
        control.set_value("0");
        let snapshot = control.validity();
        assert_eq!(snapshot.first_failing(), Some(RuleKind::RangeUnderflow));
        assert_eq!(
            snapshot.native_message(),
            "Value must be greater than or equal to 1."
        );

        control.set_value("11");
        assert_eq!(control.validity().first_failing(), Some(RuleKind::RangeOverflow));

        control.set_value("2.25");
        let snapshot = control.validity();
        assert_eq!(snapshot.first_failing(), Some(RuleKind::StepMismatch));
        assert_eq!(
            snapshot.native_message(),
            "Please enter a valid value. The two nearest valid values are 2 and 2.5."
        );

        control.set_value("2.5");
        assert!(control.validity().is_valid());

        control.set_value("abc");
        assert_eq!(control.validity().first_failing(), Some(RuleKind::BadInput));
    }

    #[test]
    fn step_check_near_decimal_limits_does_not_overflow() {
        let control =
            InputControl::from_attributes("qty", [("type", "number"), ("min", "-1")]);
        control.set_value("79228162514264337593543950335");
        assert!(control.validity().is_valid());

        control.set_value("-79228162514264337593543950335");
        assert_eq!(control.validity().first_failing(), Some(RuleKind::RangeUnderflow));

        let control = InputControl::from_attributes(
            "qty",
            [
                ("type", "number"),
                ("min", "1"),
                ("step", "79228162514264337593543950335"),
            ],
        );
        control.set_value("79228162514264337593543950335");
        assert!(control.validity().is_valid());
    }

    #[test]
    fn step_any_disables_step_checks() {
        let control = InputControl::new("ratio")
            .kind(InputKind::Number)
            .step(Step::parse("any"));
        control.set_value("0.333");
        assert!(control.validity().is_valid());
    }

    #[test]
    fn multiple_failures_report_in_fixed_order() {
        let control = InputControl::new("code")
            .kind(InputKind::Email)
            .pattern("^x+$")
            .min_length(10);
        control.set_value("abc");
        assert_eq!(
            control.validity().failing_rules(),
            &[
                RuleKind::TypeMismatch,
                RuleKind::PatternMismatch,
                RuleKind::TooShort
            ]
        );
    }

    #[test]
    fn custom_validity_fails_until_cleared() {
        let control = InputControl::new("name");
        control.set_custom_validity("taken");
        let snapshot = control.validity();
        assert_eq!(snapshot.first_failing(), Some(RuleKind::CustomError));
        assert_eq!(snapshot.native_message(), "taken");
        control.set_custom_validity("");
        assert!(control.validity().is_valid());
    }

    #[test]
    fn reset_restores_initial_value() {
        let control = InputControl::new("name").default_value("initial");
        control.set_value("changed");
        control.reset_value();
        assert_eq!(control.value(), "initial");
    }

    #[test]
    fn messages_follow_locale() {
        let control = InputControl::new("name")
            .required(true)
            .messages(I18nManager::with_locale("fr"));
        assert_eq!(
            control.validity().native_message(),
            "Veuillez renseigner ce champ."
        );
    }
}
