pub use crate::form::{
    ErrorSlot, FieldErrorConfig, FormController, FormOptions, FormPayload, FormResult, FormValues,
    FromFormValues, InputControl, InputKind, Interaction, RuleKind, SubmitOutcome,
};
pub use crate::{I18nManager, Locale};
