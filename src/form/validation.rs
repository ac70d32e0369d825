use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, ready};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use super::controller::{FormController, FormError, FormResult};
use super::state::{FieldPath, is_truthy};
use super::store::FormIntent;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type PreValidateFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
pub type ValidateFn = Arc<dyn Fn(&Value, &Value) -> ValidationOutcome + Send + Sync>;
pub type AsyncValidateFn = Arc<
    dyn Fn(Value, Value) -> BoxFuture<'static, Result<ValidationOutcome, BoxError>> + Send + Sync,
>;
pub type FormatFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// What one validator reports for one field. `null` in a bucket means
/// nothing to report; any truthy leaf in `error` marks the field invalid.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationOutcome {
    pub error: Value,
    pub warning: Value,
    pub success: Value,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn error(error: impl Into<Value>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    pub fn with_warning(mut self, warning: impl Into<Value>) -> Self {
        self.warning = warning.into();
        self
    }

    pub fn with_success(mut self, success: impl Into<Value>) -> Self {
        self.success = success.into();
        self
    }
}

impl From<Option<&str>> for ValidationOutcome {
    fn from(error: Option<&str>) -> Self {
        match error {
            Some(message) => Self::error(message),
            None => Self::valid(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ValidateOptions {
    pub submitting: bool,
}

impl ValidateOptions {
    pub const fn ad_hoc() -> Self {
        Self { submitting: false }
    }

    pub const fn submitting() -> Self {
        Self { submitting: true }
    }
}

/// The validators bound to one field, one optional slot per pass.
#[derive(Clone, Default)]
pub struct FieldValidators {
    pub(super) pre_validate: Option<PreValidateFn>,
    pub(super) validate: Option<ValidateFn>,
    pub(super) async_validate: Option<AsyncValidateFn>,
}

impl FieldValidators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_validate(
        mut self,
        validator: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.pre_validate = Some(Arc::new(validator));
        self
    }

    pub fn validate(
        mut self,
        validator: impl Fn(&Value, &Value) -> ValidationOutcome + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(validator));
        self
    }

    pub fn async_validate<F, Fut>(mut self, validator: F) -> Self
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ValidationOutcome, BoxError>> + Send + 'static,
    {
        self.async_validate = Some(Arc::new(move |value, values| {
            validator(value, values).boxed()
        }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pre_validate.is_none() && self.validate.is_none() && self.async_validate.is_none()
    }
}

/// Aggregate validity of a nested error structure: a sequence or mapping is
/// invalid when any element is, a scalar when it is truthy.
pub fn is_invalid(errors: &Value) -> bool {
    match errors {
        Value::Array(items) => items.iter().any(is_invalid),
        Value::Object(map) => map.values().any(is_invalid),
        scalar => is_truthy(scalar),
    }
}

/// Overlays `async_errors` onto `errors`. Where both hold a mapping or both
/// hold a sequence the merge recurses; otherwise a truthy sync error wins
/// and the async error fills in when the sync one is falsy or missing.
pub fn merge_errors(errors: &Value, async_errors: &Value) -> Value {
    match (errors, async_errors) {
        (Value::Object(sync), Value::Object(pending)) => {
            let mut merged = Map::new();
            for (key, value) in sync {
                let next = match pending.get(key) {
                    Some(other) => merge_errors(value, other),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            for (key, value) in pending {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Object(merged)
        }
        (Value::Array(sync), Value::Array(pending)) => {
            let len = sync.len().max(pending.len());
            Value::Array(
                (0..len)
                    .map(|index| match (sync.get(index), pending.get(index)) {
                        (Some(a), Some(b)) => merge_errors(a, b),
                        (Some(a), None) => a.clone(),
                        (None, Some(b)) => b.clone(),
                        (None, None) => Value::Null,
                    })
                    .collect(),
            )
        }
        (sync, pending) if is_invalid(sync) || !is_invalid(pending) => sync.clone(),
        (_, pending) => pending.clone(),
    }
}

impl FormController {
    fn should_run(&self, opts: ValidateOptions) -> bool {
        opts.submitting || !self.options.validate_on_submit
    }

    pub fn pre_validate(
        &self,
        path: &FieldPath,
        validator: Option<&PreValidateFn>,
        opts: ValidateOptions,
    ) -> FormResult<()> {
        let Some(validator) = validator.filter(|_| self.should_run(opts)) else {
            return Ok(());
        };
        trace!(form = %self.id, %path, submitting = opts.submitting, "pre-validating field");
        self.dispatch(FormIntent::PreValidate {
            path: path.clone(),
            validator: validator.clone(),
        })
    }

    pub fn validate(
        &self,
        path: &FieldPath,
        validator: Option<&ValidateFn>,
        opts: ValidateOptions,
    ) -> FormResult<()> {
        let Some(validator) = validator.filter(|_| self.should_run(opts)) else {
            return Ok(());
        };
        trace!(form = %self.id, %path, submitting = opts.submitting, "validating field");
        self.dispatch(FormIntent::Validate {
            path: path.clone(),
            validator: validator.clone(),
        })
    }

    /// Runs the async validator for `path` and records its outcome.
    ///
    /// In-flight validations are counted in `async_validations`. Nothing
    /// cancels a running validator: a result that arrives after its field
    /// was deregistered is still written.
    pub fn async_validate(
        &self,
        path: &FieldPath,
        validator: Option<&AsyncValidateFn>,
        opts: ValidateOptions,
    ) -> BoxFuture<'static, FormResult<()>> {
        let Some(validator) = validator.filter(|_| self.should_run(opts)).cloned() else {
            return ready(Ok(())).boxed();
        };
        let form = self.clone();
        let path = path.clone();

        async move {
            let current = form.state()?;
            let value = current.value(&path).cloned().unwrap_or(Value::Null);
            let values = current.values.clone();

            trace!(form = %form.id, %path, submitting = opts.submitting, "async validating field");
            form.dispatch(FormIntent::AsyncValidationStarted(path.clone()))?;
            match validator(value, values).await {
                Ok(outcome) => form.dispatch(FormIntent::AsyncValidationSettled { path, outcome }),
                Err(error) => {
                    warn!(form = %form.id, %path, %error, "async validator failed");
                    form.dispatch(FormIntent::AsyncValidationFailed(path.clone()))?;
                    Err(FormError::AsyncValidation {
                        path,
                        message: error.to_string(),
                    })
                }
            }
        }
        .boxed()
    }

    pub async fn pre_validate_all(&self, opts: ValidateOptions) -> FormResult<()> {
        let form = self.clone();
        self.fields
            .visit_post_order(move |node, _parent| {
                ready(node.api.pre_validate(&form, opts)).boxed()
            })
            .await
    }

    pub async fn validate_all(&self, opts: ValidateOptions) -> FormResult<()> {
        let form = self.clone();
        self.fields
            .visit_post_order(move |node, _parent| ready(node.api.validate(&form, opts)).boxed())
            .await
    }

    pub async fn async_validate_all(&self, opts: ValidateOptions) -> FormResult<()> {
        let form = self.clone();
        self.fields
            .visit_post_order(move |node, _parent| node.api.async_validate(&form, opts))
            .await
    }

    /// Runs all three passes when the form validates on mount.
    pub async fn mount(&self) -> FormResult<()> {
        if !self.options.validate_on_mount {
            return Ok(());
        }
        debug!(form = %self.id, "validating on mount");
        let opts = ValidateOptions::submitting();
        self.pre_validate_all(opts).await?;
        self.validate_all(opts).await?;
        self.async_validate_all(opts).await
    }
}
