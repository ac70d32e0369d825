use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::controller::{FormResult, read_lock, write_lock};
use super::state::{self, FieldPath, FormState, empty_object};
use super::validation::{FormatFn, PreValidateFn, ValidateFn, ValidationOutcome};

/// A pure description of one state transition. Stores apply intents in the
/// order they are dispatched.
#[derive(Clone)]
pub enum FormIntent {
    SetValue { path: FieldPath, value: Value },
    SetTouched { path: FieldPath, touched: Value },
    SetError { path: FieldPath, error: Value },
    SetWarning { path: FieldPath, warning: Value },
    SetSuccess { path: FieldPath, success: Value },
    SetFormState(FormState),
    ResetAll,
    ClearAll,
    Reset(FieldPath),
    Submitting(bool),
    Submits,
    Submitted,
    SetAllValues(Value),
    PreValidate { path: FieldPath, validator: PreValidateFn },
    Validate { path: FieldPath, validator: ValidateFn },
    AsyncValidationStarted(FieldPath),
    AsyncValidationSettled { path: FieldPath, outcome: ValidationOutcome },
    AsyncValidationFailed(FieldPath),
    Format { path: FieldPath, formatter: FormatFn },
}

impl FormIntent {
    pub fn name(&self) -> &'static str {
        match self {
            FormIntent::SetValue { .. } => "set_value",
            FormIntent::SetTouched { .. } => "set_touched",
            FormIntent::SetError { .. } => "set_error",
            FormIntent::SetWarning { .. } => "set_warning",
            FormIntent::SetSuccess { .. } => "set_success",
            FormIntent::SetFormState(_) => "set_form_state",
            FormIntent::ResetAll => "reset_all",
            FormIntent::ClearAll => "clear_all",
            FormIntent::Reset(_) => "reset",
            FormIntent::Submitting(_) => "submitting",
            FormIntent::Submits => "submits",
            FormIntent::Submitted => "submitted",
            FormIntent::SetAllValues(_) => "set_all_values",
            FormIntent::PreValidate { .. } => "pre_validate",
            FormIntent::Validate { .. } => "validate",
            FormIntent::AsyncValidationStarted(_) => "async_validation_started",
            FormIntent::AsyncValidationSettled { .. } => "async_validation_settled",
            FormIntent::AsyncValidationFailed(_) => "async_validation_failed",
            FormIntent::Format { .. } => "format",
        }
    }
}

impl Debug for FormIntent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormIntent::SetValue { path, value } => write!(f, "SetValue({path}, {value})"),
            FormIntent::SetTouched { path, touched } => write!(f, "SetTouched({path}, {touched})"),
            FormIntent::SetError { path, error } => write!(f, "SetError({path}, {error})"),
            FormIntent::SetWarning { path, warning } => write!(f, "SetWarning({path}, {warning})"),
            FormIntent::SetSuccess { path, success } => write!(f, "SetSuccess({path}, {success})"),
            FormIntent::SetFormState(_) => f.write_str("SetFormState"),
            FormIntent::Reset(path) => write!(f, "Reset({path})"),
            FormIntent::Submitting(flag) => write!(f, "Submitting({flag})"),
            FormIntent::SetAllValues(values) => write!(f, "SetAllValues({values})"),
            FormIntent::PreValidate { path, .. } => write!(f, "PreValidate({path})"),
            FormIntent::Validate { path, .. } => write!(f, "Validate({path})"),
            FormIntent::AsyncValidationStarted(path) => write!(f, "AsyncValidationStarted({path})"),
            FormIntent::AsyncValidationSettled { path, outcome } => {
                write!(f, "AsyncValidationSettled({path}, {outcome:?})")
            }
            FormIntent::AsyncValidationFailed(path) => write!(f, "AsyncValidationFailed({path})"),
            FormIntent::Format { path, .. } => write!(f, "Format({path})"),
            FormIntent::ResetAll | FormIntent::ClearAll | FormIntent::Submits | FormIntent::Submitted => {
                f.write_str(self.name())
            }
        }
    }
}

/// The state container a controller talks to.
///
/// `state` must reflect every intent previously accepted by `dispatch`.
/// Snapshots are shared immutably; a store replaces its snapshot rather
/// than mutating one it has handed out.
pub trait FormStore: Send + Sync + 'static {
    fn state(&self) -> FormResult<Arc<FormState>>;
    fn dispatch(&self, intent: FormIntent) -> FormResult<()>;
}

/// Reducer-backed store keeping the whole form state in memory.
///
/// Validator and formatter intents run their callables while the store is
/// locked; those callables receive the values they need as arguments and
/// must not call back into the store.
#[derive(Clone)]
pub struct MemoryStore {
    defaults: Arc<Value>,
    state: Arc<RwLock<Arc<FormState>>>,
}

impl MemoryStore {
    pub fn new(default_values: Value) -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(FormState::with_values(
                default_values.clone(),
            )))),
            defaults: Arc::new(default_values),
        }
    }

    pub fn default_values(&self) -> &Value {
        &self.defaults
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(empty_object())
    }
}

impl FormStore for MemoryStore {
    fn state(&self) -> FormResult<Arc<FormState>> {
        Ok(read_lock(&self.state, "reading store state")?.clone())
    }

    fn dispatch(&self, intent: FormIntent) -> FormResult<()> {
        let mut current = write_lock(&self.state, "applying intent")?;
        reduce(Arc::make_mut(&mut *current), intent, &self.defaults);
        Ok(())
    }
}

pub(crate) fn reduce(form: &mut FormState, intent: FormIntent, defaults: &Value) {
    match intent {
        FormIntent::SetValue { path, value } => state::set(&mut form.values, &path, value),
        FormIntent::SetTouched { path, touched } => state::set(&mut form.touched, &path, touched),
        FormIntent::SetError { path, error } => state::set(&mut form.errors, &path, error),
        FormIntent::SetWarning { path, warning } => state::set(&mut form.warnings, &path, warning),
        FormIntent::SetSuccess { path, success } => {
            state::set(&mut form.successes, &path, success);
        }
        FormIntent::SetFormState(next) => *form = next,
        FormIntent::ResetAll => *form = FormState::with_values(defaults.clone()),
        FormIntent::ClearAll => *form = FormState::default(),
        FormIntent::Reset(path) => {
            match state::get(defaults, &path) {
                Some(initial) => state::set(&mut form.values, &path, initial.clone()),
                None => {
                    state::remove(&mut form.values, &path);
                }
            }
            for bucket in [
                &mut form.touched,
                &mut form.errors,
                &mut form.warnings,
                &mut form.successes,
                &mut form.async_errors,
                &mut form.async_warnings,
                &mut form.async_successes,
            ] {
                state::remove(bucket, &path);
            }
        }
        FormIntent::Submitting(flag) => form.submitting = flag,
        FormIntent::Submits => form.submits = form.submits.saturating_add(1),
        FormIntent::Submitted => form.submitted = true,
        FormIntent::SetAllValues(values) => form.values = values,
        FormIntent::PreValidate { path, validator } => {
            let current = field_value(form, &path);
            let next = validator(&current, &form.values);
            state::set(&mut form.values, &path, next);
        }
        FormIntent::Validate { path, validator } => {
            let current = field_value(form, &path);
            let outcome = validator(&current, &form.values);
            state::set(&mut form.errors, &path, outcome.error);
            state::set(&mut form.warnings, &path, outcome.warning);
            state::set(&mut form.successes, &path, outcome.success);
        }
        FormIntent::AsyncValidationStarted(path) => {
            form.async_validations = form.async_validations.saturating_add(1);
            state::set(&mut form.validating, &path, Value::Bool(true));
        }
        FormIntent::AsyncValidationSettled { path, outcome } => {
            form.async_validations = form.async_validations.saturating_sub(1);
            state::set(&mut form.validating, &path, Value::Bool(false));
            state::set(&mut form.async_errors, &path, outcome.error);
            state::set(&mut form.async_warnings, &path, outcome.warning);
            state::set(&mut form.async_successes, &path, outcome.success);
        }
        FormIntent::AsyncValidationFailed(path) => {
            form.async_validations = form.async_validations.saturating_sub(1);
            state::set(&mut form.validating, &path, Value::Bool(false));
        }
        FormIntent::Format { path, formatter } => {
            let current = field_value(form, &path);
            state::set(&mut form.values, &path, formatter(&current));
        }
    }
}

fn field_value(form: &FormState, path: &FieldPath) -> Value {
    form.value(path).cloned().unwrap_or(Value::Null)
}
