use std::collections::{BTreeMap, BTreeSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_timer::Delay;

use super::binding::{
    ErrorSlot, FieldBinding, FieldView, FormView, Mutation, apply_pending, render,
};
use super::control::{ControlObserver, FieldKey, Interaction, NativeControl, ValiditySnapshot};
use super::resolver::{ExternalOverrides, FieldErrorConfig, ResolvedError, resolve_field};
use super::values::{FormPayload, FormValues};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FormOptions {
    /// Keep the submit affordance enabled while the form is invalid.
    pub no_error_disable: bool,
    /// How long [`FormController::next_frame`] waits before flushing.
    pub frame_interval: Duration,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            no_error_disable: false,
            frame_interval: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("no control named `{0}` is tracked by this form")]
    UnknownField(String),
    #[error("field `{0}` has no value")]
    MissingValue(String),
    #[error("field `{field}` could not be decoded: {reason}")]
    Decode { field: String, reason: String },
}

pub type FormResult<T> = Result<T, FormError>;

/// Failure reported by a validation hook. It never leaves the form: the hook
/// is ignored for the pass in which it failed.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct HookError(String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type ValidationHook =
    Arc<dyn Fn(&FormPayload) -> Result<ExternalOverrides, HookError> + Send + Sync>;
pub type FormEventListener = Arc<dyn Fn(&FormPayload) + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FormEvent {
    Input,
    Change,
    Submit,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListenerId(u64);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    Submitted(FormPayload),
    /// The form was invalid. Every control is now touched.
    Blocked,
}

/// Derived form-level state published by each aggregation pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FormState {
    pub is_valid: bool,
    pub touched_fields: BTreeSet<FieldKey>,
    pub values: FormValues,
    pub errors: BTreeMap<FieldKey, ResolvedError>,
}

impl Default for FormState {
    fn default() -> Self {
        Self {
            is_valid: true,
            touched_fields: BTreeSet::new(),
            values: FormValues::new(),
            errors: BTreeMap::new(),
        }
    }
}

impl FormState {
    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).and_then(ResolvedError::message)
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched_fields.contains(name)
    }

    pub fn payload(&self) -> FormPayload {
        FormPayload::new(self.values.clone())
    }
}

pub(super) struct FormInner {
    pub(super) options: FormOptions,
    pub(super) controls: BTreeMap<FieldKey, ControlObserver>,
    pub(super) fields: BTreeMap<FieldKey, FieldBinding>,
    pub(super) hook: Option<ValidationHook>,
    pub(super) state: FormState,
    pub(super) view: FormView,
    pub(super) pending: Vec<Mutation>,
    pub(super) render_count: u64,
    pub(super) submit_count: u32,
    pub(super) pass_ticket: u64,
    pub(super) published_ticket: u64,
}

#[derive(Default)]
pub(super) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, FormEvent, FormEventListener)>,
}

/// Owns the tracked controls of one form and keeps its derived state current.
#[derive(Clone)]
pub struct FormController {
    pub(super) inner: Arc<RwLock<FormInner>>,
    pub(super) listeners: Arc<RwLock<Listeners>>,
}

impl Default for FormController {
    fn default() -> Self {
        Self::new(FormOptions::default())
    }
}

impl FormController {
    pub fn new(options: FormOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(FormInner {
                options,
                controls: BTreeMap::new(),
                fields: BTreeMap::new(),
                hook: None,
                state: FormState::default(),
                view: FormView::default(),
                pending: Vec::new(),
                render_count: 0,
                submit_count: 0,
                pass_ticket: 0,
                published_ticket: 0,
            })),
            listeners: Arc::new(RwLock::new(Listeners::default())),
        }
    }

    pub fn options(&self) -> FormResult<FormOptions> {
        Ok(read_lock(&self.inner, "reading form options")?.options)
    }

    /// Tracks a bare control (no field wrapper, so nothing is rendered for it).
    pub fn attach_control(&self, control: Arc<dyn NativeControl>) -> FormResult<()> {
        self.enqueue(Mutation::Attach {
            control,
            config: None,
        })
    }

    /// Tracks a control wrapped in a field that renders its error.
    pub fn attach_field(
        &self,
        control: Arc<dyn NativeControl>,
        config: FieldErrorConfig,
    ) -> FormResult<()> {
        self.enqueue(Mutation::Attach {
            control,
            config: Some(config),
        })
    }

    pub fn detach(&self, name: &str) -> FormResult<()> {
        self.enqueue(Mutation::Detach(FieldKey::new(name)))
    }

    pub fn attach_error_slot(&self, name: &str, slot: ErrorSlot) -> FormResult<()> {
        self.enqueue(Mutation::AttachSlot(FieldKey::new(name), slot))
    }

    pub fn detach_error_slot(&self, name: &str) -> FormResult<()> {
        self.enqueue(Mutation::DetachSlot(FieldKey::new(name)))
    }

    pub fn set_field_config(&self, name: &str, config: FieldErrorConfig) -> FormResult<()> {
        self.enqueue(Mutation::ReplaceConfig(FieldKey::new(name), config))
    }

    /// Sets (`Some`) or removes (`None`) one override attribute on a field.
    pub fn set_field_attribute(
        &self,
        name: &str,
        attribute: &str,
        value: Option<&str>,
    ) -> FormResult<()> {
        self.enqueue(Mutation::SetAttribute {
            field: FieldKey::new(name),
            attribute: attribute.to_string(),
            value: value.map(str::to_string),
        })
    }

    pub fn set_no_error_disable(&self, value: bool) -> FormResult<()> {
        self.enqueue(Mutation::NoErrorDisable(value))
    }

    pub fn set_validation_hook<F>(&self, hook: F) -> FormResult<()>
    where
        F: Fn(&FormPayload) -> Result<ExternalOverrides, HookError> + Send + Sync + 'static,
    {
        self.enqueue(Mutation::Hook(Some(Arc::new(hook))))
    }

    pub fn clear_validation_hook(&self) -> FormResult<()> {
        self.enqueue(Mutation::Hook(None))
    }

    /// Applies every queued mutation with a single recompute and render.
    /// Returns `false` when nothing was pending.
    pub fn flush(&self) -> FormResult<bool> {
        let applied = {
            let mut inner = write_lock(&self.inner, "flushing pending mutations")?;
            apply_pending(&mut inner)
        };
        if applied == 0 {
            return Ok(false);
        }
        self.run_pass("flush")?;
        Ok(true)
    }

    /// Waits one frame, then flushes.
    pub async fn next_frame(&self) -> FormResult<bool> {
        let interval = self.options()?.frame_interval;
        Delay::new(interval).await;
        self.flush()
    }

    /// Applies pending mutations and reruns aggregation and rendering.
    pub fn recompute(&self) -> FormResult<FormState> {
        {
            let mut inner = write_lock(&self.inner, "applying mutations before recompute")?;
            apply_pending(&mut inner);
        }
        self.run_pass("recompute")
    }

    /// Live-typing channel: writes the value, then recomputes and emits `input`.
    pub fn input(&self, name: &str, value: &str) -> FormResult<FormState> {
        let control = {
            let mut inner = write_lock(&self.inner, "looking up control for input")?;
            apply_pending(&mut inner);
            inner
                .controls
                .get(name)
                .map(|observer| observer.control().clone())
                .ok_or_else(|| FormError::UnknownField(name.to_string()))?
        };
        control.set_value(value);
        self.dispatch(name, Interaction::Input)
    }

    /// Commit channel: marks the control touched and emits `change`.
    pub fn commit(&self, name: &str) -> FormResult<FormState> {
        self.dispatch(name, Interaction::Commit)
    }

    /// Reports an interaction on a control whose value was changed elsewhere.
    pub fn dispatch(&self, name: &str, interaction: Interaction) -> FormResult<FormState> {
        {
            let mut inner = write_lock(&self.inner, "recording interaction")?;
            apply_pending(&mut inner);
            let observer = inner
                .controls
                .get_mut(name)
                .ok_or_else(|| FormError::UnknownField(name.to_string()))?;
            observer.observe(interaction);
        }

        let state = self.run_pass(match interaction {
            Interaction::Input => "input",
            Interaction::Commit => "commit",
        })?;
        let event = match interaction {
            Interaction::Input => FormEvent::Input,
            Interaction::Commit => FormEvent::Change,
        };
        self.emit(event, &state.payload())?;
        Ok(state)
    }

    pub fn submit(&self) -> FormResult<SubmitOutcome> {
        {
            let mut inner = write_lock(&self.inner, "preparing submit")?;
            apply_pending(&mut inner);
            inner.submit_count = inner.submit_count.saturating_add(1);
        }

        let state = self.run_pass("submit")?;
        if state.is_valid {
            let payload = state.payload();
            self.emit(FormEvent::Submit, &payload)?;
            return Ok(SubmitOutcome::Submitted(payload));
        }

        let mut inner = write_lock(&self.inner, "touching controls after blocked submit")?;
        let inner = &mut *inner;
        for observer in inner.controls.values_mut() {
            observer.touch();
        }
        inner.state.touched_fields = inner.controls.keys().cloned().collect();
        render(inner);
        tracing::debug!(
            submit_count = inner.submit_count,
            "submit blocked by invalid form"
        );
        Ok(SubmitOutcome::Blocked)
    }

    /// Form reset: restores default values and clears every touched flag.
    pub fn reset(&self) -> FormResult<FormState> {
        {
            let mut inner = write_lock(&self.inner, "resetting form")?;
            let inner = &mut *inner;
            apply_pending(inner);
            for observer in inner.controls.values_mut() {
                observer.reset();
            }
            for binding in inner.fields.values_mut() {
                binding.reset();
            }
        }
        self.run_pass("reset")
    }

    /// The state published by the last pass; pending mutations are not
    /// reflected until the next flush.
    pub fn state(&self) -> FormResult<FormState> {
        Ok(read_lock(&self.inner, "reading form state")?.state.clone())
    }

    pub fn check_validity(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner, "checking form validity")?
            .state
            .is_valid)
    }

    pub fn view(&self) -> FormResult<FormView> {
        Ok(read_lock(&self.inner, "reading form view")?.view.clone())
    }

    pub fn field_view(&self, name: &str) -> FormResult<Option<FieldView>> {
        Ok(read_lock(&self.inner, "reading field view")?
            .view
            .fields
            .get(name)
            .cloned())
    }

    pub fn submit_disabled(&self) -> FormResult<bool> {
        Ok(read_lock(&self.inner, "reading submit affordance")?
            .view
            .submit_disabled)
    }

    pub fn field_names(&self) -> FormResult<Vec<FieldKey>> {
        Ok(read_lock(&self.inner, "listing tracked controls")?
            .controls
            .keys()
            .cloned()
            .collect())
    }

    pub fn has_pending(&self) -> FormResult<bool> {
        Ok(!read_lock(&self.inner, "checking pending mutations")?
            .pending
            .is_empty())
    }

    pub fn render_count(&self) -> FormResult<u64> {
        Ok(read_lock(&self.inner, "reading render count")?.render_count)
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.inner, "reading submit count")?.submit_count)
    }

    pub fn on_input(&self, listener: impl Fn(&FormPayload) + Send + Sync + 'static) -> FormResult<ListenerId> {
        self.add_listener(FormEvent::Input, Arc::new(listener))
    }

    pub fn on_change(&self, listener: impl Fn(&FormPayload) + Send + Sync + 'static) -> FormResult<ListenerId> {
        self.add_listener(FormEvent::Change, Arc::new(listener))
    }

    pub fn on_submit(&self, listener: impl Fn(&FormPayload) + Send + Sync + 'static) -> FormResult<ListenerId> {
        self.add_listener(FormEvent::Submit, Arc::new(listener))
    }

    pub fn add_listener(
        &self,
        event: FormEvent,
        listener: FormEventListener,
    ) -> FormResult<ListenerId> {
        let mut listeners = write_lock(&self.listeners, "registering event listener")?;
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        listeners.entries.push((id, event, listener));
        Ok(id)
    }

    pub fn remove_listener(&self, id: ListenerId) -> FormResult<bool> {
        let mut listeners = write_lock(&self.listeners, "removing event listener")?;
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry, _, _)| *entry != id);
        Ok(listeners.entries.len() != before)
    }

    fn enqueue(&self, mutation: Mutation) -> FormResult<()> {
        let mut inner = write_lock(&self.inner, "queueing mutation")?;
        inner.pending.push(mutation);
        Ok(())
    }

    /// One aggregation pass followed by one render. The hook runs without the
    /// state lock held so it may read from the controller.
    ///
    /// Values and validity are captured together under one lock. Only the
    /// latest pass publishes: a pass that finishes after a newer one has
    /// already published returns the newer state instead.
    fn run_pass(&self, reason: &'static str) -> FormResult<FormState> {
        let (ticket, payload, captured, hook) = {
            let mut inner = write_lock(&self.inner, "capturing controls for recompute")?;
            inner.pass_ticket += 1;
            let (values, captured) = capture(&inner.controls, &inner.fields);
            (
                inner.pass_ticket,
                FormPayload::new(values),
                captured,
                inner.hook.clone(),
            )
        };
        let overrides = run_hook(hook.as_ref(), &payload);

        let mut inner = write_lock(&self.inner, "publishing recompute result")?;
        let inner = &mut *inner;
        if ticket < inner.published_ticket {
            tracing::debug!(reason, ticket, "recompute superseded by a newer pass");
            return Ok(inner.state.clone());
        }
        let state = aggregate(captured, payload.values, &overrides);
        tracing::debug!(
            reason,
            ticket,
            is_valid = state.is_valid,
            controls = state.errors.len(),
            "recomputed form state"
        );
        inner.published_ticket = ticket;
        inner.state = state.clone();
        render(inner);
        Ok(state)
    }

    fn emit(&self, event: FormEvent, payload: &FormPayload) -> FormResult<()> {
        let targets = read_lock(&self.listeners, "reading event listeners")?
            .entries
            .iter()
            .filter(|(_, kind, _)| *kind == event)
            .map(|(_, _, listener)| listener.clone())
            .collect::<Vec<_>>();
        tracing::debug!(?event, listeners = targets.len(), "dispatching form event");
        for listener in targets {
            listener(payload);
        }
        Ok(())
    }
}

/// One control as seen by a pass.
pub(super) struct CapturedControl {
    key: FieldKey,
    snapshot: ValiditySnapshot,
    touched: bool,
    config: Option<FieldErrorConfig>,
}

pub(super) fn capture(
    controls: &BTreeMap<FieldKey, ControlObserver>,
    fields: &BTreeMap<FieldKey, FieldBinding>,
) -> (FormValues, Vec<CapturedControl>) {
    let mut values = FormValues::new();
    let mut captured = Vec::with_capacity(controls.len());
    for (key, observer) in controls {
        values.insert(key.as_str(), observer.value());
        captured.push(CapturedControl {
            key: key.clone(),
            snapshot: observer.snapshot(),
            touched: observer.is_touched(),
            config: fields.get(key).map(|binding| binding.config().clone()),
        });
    }
    (values, captured)
}

/// Resolves every captured control against the hook result. A hook entry for
/// a name that is not tracked has nothing to attach to and is dropped.
pub(super) fn aggregate(
    captured: Vec<CapturedControl>,
    values: FormValues,
    overrides: &ExternalOverrides,
) -> FormState {
    let unwrapped = FieldErrorConfig::default();
    let mut errors = BTreeMap::new();
    let mut touched_fields = BTreeSet::new();

    for control in captured {
        let config = control.config.as_ref().unwrap_or(&unwrapped);
        let resolved = resolve_field(&control.key, &control.snapshot, config, overrides);
        if control.touched {
            touched_fields.insert(control.key.clone());
        }
        errors.insert(control.key, resolved);
    }

    FormState {
        is_valid: errors.values().all(|error| !error.is_error()),
        touched_fields,
        values,
        errors,
    }
}

/// Calls the hook once. A returned error or a panic counts as "no overrides".
pub(super) fn run_hook(hook: Option<&ValidationHook>, payload: &FormPayload) -> ExternalOverrides {
    let Some(hook) = hook else {
        return ExternalOverrides::default();
    };
    match catch_unwind(AssertUnwindSafe(|| hook(payload))) {
        Ok(Ok(overrides)) => overrides,
        Ok(Err(error)) => {
            tracing::warn!(%error, "validation hook failed, ignoring it for this pass");
            ExternalOverrides::default()
        }
        Err(_) => {
            tracing::warn!("validation hook panicked, ignoring it for this pass");
            ExternalOverrides::default()
        }
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
