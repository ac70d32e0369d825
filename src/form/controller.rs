use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::state::{self, FieldPath, FormState};
use super::store::{FormIntent, FormStore};
use super::tree::{FieldApi, FieldTree};
use super::validation::{BoxError, FormatFn};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

impl Display for FormId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "form-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Submitting,
    Succeeded,
    Rejected,
    Suppressed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub validate_on_mount: bool,
    pub validate_on_submit: bool,
    pub prevent_default: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            validate_on_mount: false,
            validate_on_submit: false,
            prevent_default: true,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    AsyncValidation { path: FieldPath, message: String },
    NotAGroup(FieldPath),
    Store(String),
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "form state lock poisoned while {context}")
            }
            FormError::InvalidStateTransition { from, to } => {
                write!(f, "invalid submit state transition: {from:?} -> {to:?}")
            }
            FormError::AsyncValidation { path, message } => {
                write!(f, "async validation of `{path}` failed: {message}")
            }
            FormError::NotAGroup(path) => {
                write!(f, "field `{path}` is not a group and cannot own child fields")
            }
            FormError::Store(error) => write!(f, "form store rejected intent: {error}"),
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

/// Capability handed to the submit workflow by whatever triggered it.
pub trait SubmitTrigger: Send + Sync {
    fn prevent_default(&self);
}

pub(super) type OnSubmitFn = Arc<
    dyn Fn(Value, Option<Arc<dyn SubmitTrigger>>) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;
pub(super) type OnSubmitFailureFn = Arc<dyn Fn(&Value, Option<&BoxError>) + Send + Sync>;
pub(super) type PreSubmitFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub(super) type OnChangeFn = Arc<dyn Fn(FormState) + Send + Sync>;

#[derive(Clone, Default)]
pub(super) struct FormHandlers {
    pub(super) on_submit: Option<OnSubmitFn>,
    pub(super) on_submit_failure: Option<OnSubmitFailureFn>,
    pub(super) pre_submit: Option<PreSubmitFn>,
    pub(super) on_change: Option<OnChangeFn>,
}

/// Handle over one form: its store, its root field registry, its options
/// and handlers. Cloning is cheap and every clone drives the same form.
#[derive(Clone)]
pub struct FormController {
    pub(super) id: FormId,
    pub(super) options: FormOptions,
    pub(super) store: Arc<dyn FormStore>,
    pub(super) fields: FieldTree,
    pub(super) handlers: FormHandlers,
    pub(super) submit_state: Arc<RwLock<SubmitState>>,
}

impl FormController {
    pub fn new(store: impl FormStore, options: FormOptions) -> Self {
        Self::with_store(Arc::new(store), options)
    }

    pub fn with_store(store: Arc<dyn FormStore>, options: FormOptions) -> Self {
        Self {
            id: FormId::next(),
            options,
            store,
            fields: FieldTree::new(),
            handlers: FormHandlers::default(),
            submit_state: Arc::new(RwLock::new(SubmitState::Idle)),
        }
    }

    pub fn on_submit<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value, Option<Arc<dyn SubmitTrigger>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.handlers.on_submit = Some(Arc::new(move |values, trigger| {
            handler(values, trigger).boxed()
        }));
        self
    }

    pub fn on_submit_failure(
        mut self,
        handler: impl Fn(&Value, Option<&BoxError>) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.on_submit_failure = Some(Arc::new(handler));
        self
    }

    pub fn pre_submit(mut self, transform: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.handlers.pre_submit = Some(Arc::new(transform));
        self
    }

    pub fn on_change(mut self, handler: impl Fn(FormState) + Send + Sync + 'static) -> Self {
        self.handlers.on_change = Some(Arc::new(handler));
        self
    }

    pub fn id(&self) -> FormId {
        self.id
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn fields(&self) -> &FieldTree {
        &self.fields
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        Ok(*read_lock(&self.submit_state, "reading submit state")?)
    }

    pub(super) fn state(&self) -> FormResult<Arc<FormState>> {
        self.store.state()
    }

    /// Forwards `intent` to the store and reports the resulting state to
    /// the `on_change` handler when it differs from the previous one.
    pub(super) fn dispatch(&self, intent: FormIntent) -> FormResult<()> {
        trace!(form = %self.id, intent = ?intent, "dispatching intent");
        let Some(on_change) = self.handlers.on_change.as_ref() else {
            return self.store.dispatch(intent);
        };

        let previous = self.store.state()?;
        self.store.dispatch(intent)?;
        let next = self.store.state()?;
        if !Arc::ptr_eq(&previous, &next) && !state::deep_equal(&previous, &next) {
            on_change(state::snapshot(&next));
        }
        Ok(())
    }

    pub fn register(
        &self,
        path: impl Into<FieldPath>,
        api: Arc<dyn FieldApi>,
        children: Option<FieldTree>,
    ) -> FormResult<()> {
        self.fields.register(path.into(), api, children)
    }

    pub fn deregister(&self, path: impl Into<FieldPath>) -> FormResult<()> {
        self.fields.deregister(&path.into())
    }

    pub fn get_form_state(&self) -> FormResult<FormState> {
        Ok(state::snapshot(&*self.state()?))
    }

    pub fn set_form_state(&self, next: FormState) -> FormResult<()> {
        self.dispatch(FormIntent::SetFormState(next))
    }

    pub fn get_value(&self, path: impl Into<FieldPath>) -> FormResult<Option<Value>> {
        Ok(self.state()?.value(&path.into()).cloned())
    }

    pub fn get_touched(&self, path: impl Into<FieldPath>) -> FormResult<Option<Value>> {
        Ok(self.state()?.touched(&path.into()).cloned())
    }

    pub fn get_error(&self, path: impl Into<FieldPath>) -> FormResult<Option<Value>> {
        Ok(self.state()?.error(&path.into()).cloned())
    }

    pub fn get_warning(&self, path: impl Into<FieldPath>) -> FormResult<Option<Value>> {
        Ok(self.state()?.warning(&path.into()).cloned())
    }

    pub fn get_success(&self, path: impl Into<FieldPath>) -> FormResult<Option<Value>> {
        Ok(self.state()?.success(&path.into()).cloned())
    }

    pub fn get_async_error(&self, path: impl Into<FieldPath>) -> FormResult<Option<Value>> {
        Ok(self.state()?.async_error(&path.into()).cloned())
    }

    pub fn is_validating(&self, path: impl Into<FieldPath>) -> FormResult<bool> {
        Ok(self.state()?.is_validating(&path.into()))
    }

    pub fn set_value(&self, path: impl Into<FieldPath>, value: impl Into<Value>) -> FormResult<()> {
        self.dispatch(FormIntent::SetValue {
            path: path.into(),
            value: value.into(),
        })
    }

    pub fn set_touched(
        &self,
        path: impl Into<FieldPath>,
        touched: impl Into<Value>,
    ) -> FormResult<()> {
        self.dispatch(FormIntent::SetTouched {
            path: path.into(),
            touched: touched.into(),
        })
    }

    pub fn set_error(&self, path: impl Into<FieldPath>, error: impl Into<Value>) -> FormResult<()> {
        self.dispatch(FormIntent::SetError {
            path: path.into(),
            error: error.into(),
        })
    }

    pub fn set_warning(
        &self,
        path: impl Into<FieldPath>,
        warning: impl Into<Value>,
    ) -> FormResult<()> {
        self.dispatch(FormIntent::SetWarning {
            path: path.into(),
            warning: warning.into(),
        })
    }

    pub fn set_success(
        &self,
        path: impl Into<FieldPath>,
        success: impl Into<Value>,
    ) -> FormResult<()> {
        self.dispatch(FormIntent::SetSuccess {
            path: path.into(),
            success: success.into(),
        })
    }

    pub fn add_value(&self, path: impl Into<FieldPath>, value: impl Into<Value>) -> FormResult<()> {
        let path = path.into();
        let mut items = self.list_at(&path, ListBucket::Values)?;
        items.push(value.into());
        self.dispatch(FormIntent::SetValue {
            path,
            value: Value::Array(items),
        })
    }

    /// Removes entry `index` from the list at `path`, keeping the touched
    /// list aligned with the values.
    pub fn remove_value(&self, path: impl Into<FieldPath>, index: usize) -> FormResult<()> {
        let path = path.into();
        let mut values = self.list_at(&path, ListBucket::Values)?;
        if index < values.len() {
            values.remove(index);
        }
        self.dispatch(FormIntent::SetValue {
            path: path.clone(),
            value: Value::Array(values),
        })?;

        let mut touched = self.list_at(&path, ListBucket::Touched)?;
        if index < touched.len() {
            touched.remove(index);
        }
        self.dispatch(FormIntent::SetTouched {
            path,
            touched: Value::Array(touched),
        })
    }

    pub fn swap_values(
        &self,
        path: impl Into<FieldPath>,
        index: usize,
        dest_index: usize,
    ) -> FormResult<()> {
        let path = path.into();
        let mut values = self.list_at(&path, ListBucket::Values)?;
        if index.max(dest_index) >= values.len() {
            debug!(form = %self.id, %path, index, dest_index, "swap index out of range");
            return Ok(());
        }
        values.swap(index, dest_index);
        self.dispatch(FormIntent::SetValue {
            path,
            value: Value::Array(values),
        })
    }

    pub fn format(
        &self,
        path: impl Into<FieldPath>,
        formatter: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> FormResult<()> {
        let formatter: FormatFn = Arc::new(formatter);
        self.dispatch(FormIntent::Format {
            path: path.into(),
            formatter,
        })
    }

    pub fn reset(&self, path: impl Into<FieldPath>) -> FormResult<()> {
        self.dispatch(FormIntent::Reset(path.into()))
    }

    pub fn reset_all(&self) -> FormResult<()> {
        self.dispatch(FormIntent::ResetAll)?;
        let mut submit_state = write_lock(&self.submit_state, "resetting submit state")?;
        transition_submit_state(&mut submit_state, SubmitState::Idle)
    }

    pub fn clear_all(&self) -> FormResult<()> {
        self.dispatch(FormIntent::ClearAll)
    }

    pub fn set_all_values(&self, values: Value) -> FormResult<()> {
        self.dispatch(FormIntent::SetAllValues(values))
    }

    /// Marks every leaf field touched. Groups have no touchable value of
    /// their own and are skipped.
    pub async fn set_all_touched(&self) -> FormResult<()> {
        let form = self.clone();
        self.fields
            .visit_post_order(move |node, parent| {
                let form = form.clone();
                async move {
                    if node.api.is_group() {
                        return Ok(());
                    }
                    form.set_touched(parent.join(&node.path), true)
                }
                .boxed()
            })
            .await
    }

    fn list_at(&self, path: &FieldPath, bucket: ListBucket) -> FormResult<Vec<Value>> {
        let current = self.state()?;
        let document = match bucket {
            ListBucket::Values => &current.values,
            ListBucket::Touched => &current.touched,
        };
        Ok(match state::get(document, path) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        })
    }
}

#[derive(Clone, Copy)]
enum ListBucket {
    Values,
    Touched,
}

pub(super) fn transition_submit_state(
    current: &mut SubmitState,
    next: SubmitState,
) -> FormResult<()> {
    if *current == next {
        return Ok(());
    }

    let allowed = matches!(
        (*current, next),
        (SubmitState::Idle, SubmitState::Submitting)
            | (SubmitState::Submitting, SubmitState::Succeeded)
            | (SubmitState::Submitting, SubmitState::Rejected)
            | (SubmitState::Submitting, SubmitState::Suppressed)
            | (SubmitState::Succeeded, SubmitState::Submitting)
            | (SubmitState::Rejected, SubmitState::Submitting)
            | (SubmitState::Suppressed, SubmitState::Submitting)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: *current,
            to: next,
        });
    }
    *current = next;
    Ok(())
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
