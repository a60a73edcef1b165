use std::borrow::Borrow;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of a tracked control: the control's `name`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Arc<str>);

impl FieldKey {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Native constraint that a control can fail.
///
/// The declaration order is the order in which a control reports failures,
/// and therefore the order that decides which rule keys the message lookup
/// when several fail at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    ValueMissing,
    TypeMismatch,
    PatternMismatch,
    TooLong,
    TooShort,
    RangeUnderflow,
    RangeOverflow,
    StepMismatch,
    BadInput,
    CustomError,
}

impl RuleKind {
    pub const ALL: [RuleKind; 10] = [
        RuleKind::ValueMissing,
        RuleKind::TypeMismatch,
        RuleKind::PatternMismatch,
        RuleKind::TooLong,
        RuleKind::TooShort,
        RuleKind::RangeUnderflow,
        RuleKind::RangeOverflow,
        RuleKind::StepMismatch,
        RuleKind::BadInput,
        RuleKind::CustomError,
    ];

    /// Attribute name carrying the override message for this rule.
    pub const fn attribute(self) -> &'static str {
        match self {
            RuleKind::ValueMissing => "value-missing",
            RuleKind::TypeMismatch => "type-mismatch",
            RuleKind::PatternMismatch => "pattern-mismatch",
            RuleKind::TooLong => "too-long",
            RuleKind::TooShort => "too-short",
            RuleKind::RangeUnderflow => "range-underflow",
            RuleKind::RangeOverflow => "range-overflow",
            RuleKind::StepMismatch => "step-mismatch",
            RuleKind::BadInput => "bad-input",
            RuleKind::CustomError => "custom-error",
        }
    }

    pub fn from_attribute(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.attribute().eq_ignore_ascii_case(name.trim()))
    }
}

impl Display for RuleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.attribute())
    }
}

/// Immutable read of a control's pass/fail state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValiditySnapshot {
    failing: Vec<RuleKind>,
    native_message: String,
}

impl ValiditySnapshot {
    pub fn valid() -> Self {
        Self::default()
    }

    /// Builds a failing snapshot. Rules keep the order given, duplicates dropped.
    pub fn invalid(
        failing: impl IntoIterator<Item = RuleKind>,
        native_message: impl Into<String>,
    ) -> Self {
        let mut rules = Vec::new();
        for rule in failing {
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        if rules.is_empty() {
            return Self::valid();
        }
        Self {
            failing: rules,
            native_message: native_message.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failing.is_empty()
    }

    pub fn failing_rules(&self) -> &[RuleKind] {
        &self.failing
    }

    pub fn first_failing(&self) -> Option<RuleKind> {
        self.failing.first().copied()
    }

    pub fn fails(&self, rule: RuleKind) -> bool {
        self.failing.contains(&rule)
    }

    pub fn native_message(&self) -> &str {
        &self.native_message
    }
}

/// A form control whose value and constraint state can be observed.
pub trait NativeControl: Send + Sync {
    fn name(&self) -> FieldKey;

    fn value(&self) -> String;

    fn set_value(&self, value: &str);

    /// Restores the value the control had before any user edit.
    fn reset_value(&self);

    fn validity(&self) -> ValiditySnapshot;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interaction {
    /// Every value change while typing.
    Input,
    /// The user finished editing (blur/change).
    Commit,
}

impl Interaction {
    pub const fn touches(self) -> bool {
        matches!(self, Interaction::Commit)
    }
}

/// Watches one control: fresh validity on demand, plus the touched flag.
#[derive(Clone)]
pub struct ControlObserver {
    control: Arc<dyn NativeControl>,
    touched: bool,
}

impl std::fmt::Debug for ControlObserver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlObserver")
            .field("name", &self.control.name())
            .field("touched", &self.touched)
            .finish()
    }
}

impl ControlObserver {
    pub fn new(control: Arc<dyn NativeControl>) -> Self {
        Self {
            control,
            touched: false,
        }
    }

    pub fn key(&self) -> FieldKey {
        self.control.name()
    }

    pub fn control(&self) -> &Arc<dyn NativeControl> {
        &self.control
    }

    pub fn value(&self) -> String {
        self.control.value()
    }

    pub fn snapshot(&self) -> ValiditySnapshot {
        self.control.validity()
    }

    pub fn is_touched(&self) -> bool {
        self.touched
    }

    /// Records an interaction. Returns `true` when the touched flag flipped.
    pub fn observe(&mut self, interaction: Interaction) -> bool {
        if interaction.touches() {
            self.touch()
        } else {
            false
        }
    }

    pub fn touch(&mut self) -> bool {
        let changed = !self.touched;
        self.touched = true;
        changed
    }

    pub fn reset(&mut self) {
        self.control.reset_value();
        self.touched = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;

    struct StubControl {
        value: RwLock<String>,
    }

    impl NativeControl for StubControl {
        fn name(&self) -> FieldKey {
            FieldKey::new("stub")
        }

        fn value(&self) -> String {
            self.value.read().expect("stub lock").clone()
        }

        fn set_value(&self, value: &str) {
            *self.value.write().expect("stub lock") = value.to_string();
        }

        fn reset_value(&self) {
            self.set_value("");
        }

        fn validity(&self) -> ValiditySnapshot {
            if self.value().is_empty() {
                ValiditySnapshot::invalid([RuleKind::ValueMissing], "required")
            } else {
                ValiditySnapshot::valid()
            }
        }
    }

    fn observer() -> (Arc<StubControl>, ControlObserver) {
        let control = Arc::new(StubControl {
            value: RwLock::new(String::new()),
        });
        let observer = ControlObserver::new(control.clone());
        (control, observer)
    }

    #[test]
    fn only_commit_interactions_touch() {
        let (_, mut observer) = observer();
        assert!(!observer.observe(Interaction::Input));
        assert!(!observer.is_touched());
        assert!(observer.observe(Interaction::Commit));
        assert!(observer.is_touched());
        assert!(!observer.observe(Interaction::Commit));
        assert!(!observer.observe(Interaction::Input));
        assert!(observer.is_touched());
    }

    #[test]
    fn snapshots_are_read_live_from_the_control() {
        let (control, observer) = observer();
        assert!(observer.snapshot().fails(RuleKind::ValueMissing));
        control.set_value("filled");
        assert!(observer.snapshot().is_valid());
        assert_eq!(observer.value(), "filled");
    }

    #[test]
    fn reset_restores_value_and_clears_touch() {
        let (control, mut observer) = observer();
        control.set_value("typed");
        observer.touch();
        observer.reset();
        assert!(!observer.is_touched());
        assert_eq!(control.value(), "");
    }

    #[test]
    fn invalid_snapshot_keeps_first_reported_rule() {
        let snapshot = ValiditySnapshot::invalid(
            [
                RuleKind::PatternMismatch,
                RuleKind::TooShort,
                RuleKind::PatternMismatch,
            ],
            "format",
        );
        assert_eq!(snapshot.first_failing(), Some(RuleKind::PatternMismatch));
        assert_eq!(snapshot.failing_rules().len(), 2);
        assert!(ValiditySnapshot::invalid([], "ignored").is_valid());
    }

    #[test]
    fn rule_attributes_round_trip() {
        for rule in RuleKind::ALL {
            assert_eq!(RuleKind::from_attribute(rule.attribute()), Some(rule));
        }
        assert_eq!(RuleKind::from_attribute("default-error"), None);
    }
}
