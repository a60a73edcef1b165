//! Keeps the rendered view in step with the tracked controls.
//!
//! Structural changes (controls, wrappers, slots, attributes, the hook) are
//! queued as mutations and applied in one batch at the next flush, so a
//! reader never sees a half-applied batch. Rendering pushes derived state
//! outward only: nothing here is read back by the aggregation pass.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::control::{ControlObserver, FieldKey, NativeControl};
use super::controller::{FormInner, ValidationHook};
use super::resolver::FieldErrorConfig;

pub const ALERT_ROLE: &str = "alert";

/// Externally supplied element that receives a field's error text in place
/// of the default alert. Clones share the same element.
#[derive(Clone, Debug, Default)]
pub struct ErrorSlot {
    text: Arc<RwLock<String>>,
}

impl ErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> String {
        match self.text.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn same_element(&self, other: &ErrorSlot) -> bool {
        Arc::ptr_eq(&self.text, &other.text)
    }

    fn write(&self, text: &str) {
        let mut guard = match self.text.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != text {
            *guard = text.to_string();
        }
    }
}

/// The default error element rendered when no slot is attached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AlertElement {
    role: &'static str,
    text: String,
}

impl AlertElement {
    fn new(text: String) -> Self {
        Self {
            role: ALERT_ROLE,
            text,
        }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Rendered state of one field wrapper.
///
/// `error` is the reflected attribute and always follows true validity;
/// `alert` and the slot text are gated on visibility.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldView {
    pub touched: bool,
    pub error: Option<String>,
    pub alert: Option<AlertElement>,
    pub slotted: bool,
}

impl FieldView {
    pub fn alert_text(&self) -> Option<&str> {
        self.alert.as_ref().map(AlertElement::text)
    }
}

/// Rendered state of the container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormView {
    /// The `invalid` marker class.
    pub invalid: bool,
    pub submit_disabled: bool,
    /// Native popups are always suppressed; errors render through the view.
    pub novalidate: bool,
    pub fields: BTreeMap<FieldKey, FieldView>,
}

impl Default for FormView {
    fn default() -> Self {
        Self {
            invalid: false,
            submit_disabled: false,
            novalidate: true,
            fields: BTreeMap::new(),
        }
    }
}

impl FormView {
    pub fn field(&self, name: &str) -> Option<&FieldView> {
        self.fields.get(name)
    }

    pub fn touched_fields(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields
            .iter()
            .filter_map(|(key, view)| view.touched.then_some(key))
    }
}

pub(super) struct FieldBinding {
    config: FieldErrorConfig,
    slot: Option<ErrorSlot>,
    rendered: bool,
    eager: bool,
}

impl FieldBinding {
    pub(super) fn new(config: FieldErrorConfig) -> Self {
        Self {
            config,
            slot: None,
            rendered: false,
            eager: false,
        }
    }

    pub(super) fn config(&self) -> &FieldErrorConfig {
        &self.config
    }

    pub(super) fn reset(&mut self) {
        self.eager = false;
    }

    /// Errors present on a field's very first render show without a touch
    /// until the field first resolves clean (or the form resets).
    fn visible_error(&mut self, touched: bool, error: Option<&str>) -> Option<String> {
        if !self.rendered {
            self.rendered = true;
            self.eager = error.is_some();
        } else if error.is_none() {
            self.eager = false;
        }
        error
            .filter(|_| touched || self.eager)
            .map(str::to_string)
    }
}

pub(super) enum Mutation {
    Attach {
        control: Arc<dyn NativeControl>,
        config: Option<FieldErrorConfig>,
    },
    Detach(FieldKey),
    AttachSlot(FieldKey, ErrorSlot),
    DetachSlot(FieldKey),
    ReplaceConfig(FieldKey, FieldErrorConfig),
    SetAttribute {
        field: FieldKey,
        attribute: String,
        value: Option<String>,
    },
    NoErrorDisable(bool),
    Hook(Option<ValidationHook>),
}

/// Drains the mutation queue. Returns how many mutations were applied.
pub(super) fn apply_pending(inner: &mut FormInner) -> usize {
    let batch = std::mem::take(&mut inner.pending);
    let count = batch.len();
    for mutation in batch {
        apply(inner, mutation);
    }
    if count > 0 {
        tracing::debug!(mutations = count, "applied mutation batch");
    }
    count
}

fn apply(inner: &mut FormInner, mutation: Mutation) {
    match mutation {
        Mutation::Attach { control, config } => {
            let key = control.name();
            // Same name replaces the previous control and starts it untouched.
            inner
                .controls
                .insert(key.clone(), ControlObserver::new(control));
            match config {
                Some(config) => {
                    inner.fields.insert(key, FieldBinding::new(config));
                }
                None => {
                    inner.fields.remove(&key);
                }
            }
        }
        Mutation::Detach(key) => {
            inner.controls.remove(&key);
            inner.fields.remove(&key);
        }
        Mutation::AttachSlot(key, slot) => match inner.fields.get_mut(&key) {
            Some(binding) => binding.slot = Some(slot),
            None => tracing::debug!(field = %key, "error slot has no field wrapper, ignored"),
        },
        Mutation::DetachSlot(key) => {
            if let Some(binding) = inner.fields.get_mut(&key) {
                binding.slot = None;
            }
        }
        Mutation::ReplaceConfig(key, config) => match inner.fields.get_mut(&key) {
            Some(binding) => binding.config = config,
            None => tracing::debug!(field = %key, "config has no field wrapper, ignored"),
        },
        Mutation::SetAttribute {
            field,
            attribute,
            value,
        } => {
            let recognised = inner
                .fields
                .get_mut(&field)
                .is_some_and(|binding| binding.config.set_attribute(&attribute, value.as_deref()));
            if !recognised {
                tracing::trace!(field = %field, attribute = %attribute, "attribute does not affect errors");
            }
        }
        Mutation::NoErrorDisable(value) => inner.options.no_error_disable = value,
        Mutation::Hook(hook) => inner.hook = hook,
    }
}

/// Renders the published state into the view, alerts and slots.
pub(super) fn render(inner: &mut FormInner) {
    let FormInner {
        options,
        controls,
        fields,
        state,
        view,
        render_count,
        ..
    } = inner;

    let mut field_views = BTreeMap::new();
    for (key, binding) in fields.iter_mut() {
        // Attached after the published pass captured its controls.
        let Some(resolved) = state.errors.get(key) else {
            continue;
        };
        let touched = controls.get(key).is_some_and(ControlObserver::is_touched);
        let error = resolved.message();
        let visible = binding.visible_error(touched, error);

        let (alert, slotted) = match &binding.slot {
            Some(slot) => {
                slot.write(visible.as_deref().unwrap_or_default());
                (None, true)
            }
            None => (visible.map(AlertElement::new), false),
        };

        field_views.insert(
            key.clone(),
            FieldView {
                touched,
                error: error.map(str::to_string),
                alert,
                slotted,
            },
        );
    }

    *view = FormView {
        invalid: !state.is_valid,
        submit_disabled: !state.is_valid && !options.no_error_disable,
        novalidate: true,
        fields: field_views,
    };
    *render_count += 1;
    tracing::debug!(
        render = *render_count,
        invalid = view.invalid,
        submit_disabled = view.submit_disabled,
        "rendered form view"
    );
}
