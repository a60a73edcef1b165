mod binding;
mod control;
mod controller;
mod native;
mod resolver;
mod values;


pub use binding::{ALERT_ROLE, AlertElement, ErrorSlot, FieldView, FormView};
pub use control::{ControlObserver, FieldKey, Interaction, NativeControl, RuleKind, ValiditySnapshot};
pub use controller::{
    FormController, FormError, FormEvent, FormEventListener, FormOptions, FormResult, FormState,
    HookError, ListenerId, SubmitOutcome, ValidationHook,
};
pub use inform_derive::FormValues;
pub use native::{InputControl, InputKind, Step};
pub use resolver::{
    DEFAULT_ERROR_ATTRIBUTE, ErrorSource, ExternalOverrides, FieldErrorConfig, ResolvedError,
    resolve, resolve_field,
};
pub use values::{FormPayload, FormValue, FormValues, FromFormValues};
