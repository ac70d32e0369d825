use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::controller::{FormController, FormError, FormResult};
use super::state::FieldPath;
use super::tree::{FieldApi, FieldTree};
use super::validation::{FieldValidators, ValidateOptions};

/// What a mounted field registers: its full path and its validators.
#[derive(Clone)]
pub struct FieldBinding {
    path: FieldPath,
    validators: FieldValidators,
    group: bool,
}

impl FieldBinding {
    pub fn new(path: FieldPath, validators: FieldValidators, group: bool) -> Self {
        Self {
            path,
            validators,
            group,
        }
    }

    pub fn path(&self) -> &FieldPath {
        &self.path
    }
}

impl FieldApi for FieldBinding {
    fn is_group(&self) -> bool {
        self.group
    }

    fn pre_validate(&self, form: &FormController, opts: ValidateOptions) -> FormResult<()> {
        form.pre_validate(&self.path, self.validators.pre_validate.as_ref(), opts)
    }

    fn validate(&self, form: &FormController, opts: ValidateOptions) -> FormResult<()> {
        form.validate(&self.path, self.validators.validate.as_ref(), opts)
    }

    fn async_validate(
        &self,
        form: &FormController,
        opts: ValidateOptions,
    ) -> BoxFuture<'static, FormResult<()>> {
        form.async_validate(&self.path, self.validators.async_validate.as_ref(), opts)
    }
}

/// Handle held by a mounted field widget.
///
/// The handle is not part of the registry; dropping it leaves the field
/// registered until `unmount` is called.
#[derive(Clone)]
pub struct Field {
    form: FormController,
    name: FieldPath,
    binding: Arc<FieldBinding>,
    children: Option<FieldTree>,
    registry: FieldTree,
}

impl FormController {
    pub fn field(
        &self,
        name: impl Into<FieldPath>,
        validators: FieldValidators,
    ) -> FormResult<Field> {
        mount(self, &self.fields, &FieldPath::root(), name.into(), validators, false)
    }

    pub fn group(
        &self,
        name: impl Into<FieldPath>,
        validators: FieldValidators,
    ) -> FormResult<Field> {
        mount(self, &self.fields, &FieldPath::root(), name.into(), validators, true)
    }
}

impl Field {
    pub fn path(&self) -> &FieldPath {
        self.binding.path()
    }

    pub fn name(&self) -> &FieldPath {
        &self.name
    }

    pub fn is_group(&self) -> bool {
        self.children.is_some()
    }

    pub fn field(
        &self,
        name: impl Into<FieldPath>,
        validators: FieldValidators,
    ) -> FormResult<Field> {
        let children = self.children_or_err()?;
        mount(&self.form, children, self.path(), name.into(), validators, false)
    }

    pub fn group(
        &self,
        name: impl Into<FieldPath>,
        validators: FieldValidators,
    ) -> FormResult<Field> {
        let children = self.children_or_err()?;
        mount(&self.form, children, self.path(), name.into(), validators, true)
    }

    pub fn unmount(&self) -> FormResult<()> {
        self.registry.deregister(&self.name)
    }

    pub fn value(&self) -> FormResult<Option<Value>> {
        self.form.get_value(self.path())
    }

    pub fn touched(&self) -> FormResult<bool> {
        Ok(self
            .form
            .get_touched(self.path())?
            .is_some_and(|touched| touched == Value::Bool(true)))
    }

    pub fn error(&self) -> FormResult<Option<Value>> {
        self.form.get_error(self.path())
    }

    pub fn async_error(&self) -> FormResult<Option<Value>> {
        self.form.get_async_error(self.path())
    }

    pub fn warning(&self) -> FormResult<Option<Value>> {
        self.form.get_warning(self.path())
    }

    pub fn success(&self) -> FormResult<Option<Value>> {
        self.form.get_success(self.path())
    }

    pub fn is_validating(&self) -> FormResult<bool> {
        self.form.is_validating(self.path())
    }

    pub fn set_value(&self, value: impl Into<Value>) -> FormResult<()> {
        self.form.set_value(self.path(), value)
    }

    pub fn set_touched(&self, touched: impl Into<Value>) -> FormResult<()> {
        self.form.set_touched(self.path(), touched)
    }

    pub fn set_error(&self, error: impl Into<Value>) -> FormResult<()> {
        self.form.set_error(self.path(), error)
    }

    pub fn set_warning(&self, warning: impl Into<Value>) -> FormResult<()> {
        self.form.set_warning(self.path(), warning)
    }

    pub fn set_success(&self, success: impl Into<Value>) -> FormResult<()> {
        self.form.set_success(self.path(), success)
    }

    /// Writes a new value and runs this field's own passes in ad-hoc mode,
    /// so nothing runs while the form only validates on submit.
    pub async fn change(&self, value: impl Into<Value>) -> FormResult<()> {
        self.set_value(value)?;
        self.run_ad_hoc().await
    }

    pub async fn blur(&self) -> FormResult<()> {
        if !self.is_group() {
            self.set_touched(true)?;
        }
        self.run_ad_hoc().await
    }

    pub fn add_value(&self, value: impl Into<Value>) -> FormResult<()> {
        self.form.add_value(self.path(), value)
    }

    pub fn remove_value(&self, index: usize) -> FormResult<()> {
        self.form.remove_value(self.path(), index)
    }

    pub fn swap_values(&self, index: usize, dest_index: usize) -> FormResult<()> {
        self.form.swap_values(self.path(), index, dest_index)
    }

    pub fn format(&self, formatter: impl Fn(&Value) -> Value + Send + Sync + 'static) -> FormResult<()> {
        self.form.format(self.path(), formatter)
    }

    pub fn reset(&self) -> FormResult<()> {
        self.form.reset(self.path())
    }

    async fn run_ad_hoc(&self) -> FormResult<()> {
        let opts = ValidateOptions::ad_hoc();
        self.binding.pre_validate(&self.form, opts)?;
        self.binding.validate(&self.form, opts)?;
        self.binding.async_validate(&self.form, opts).await
    }

    fn children_or_err(&self) -> FormResult<&FieldTree> {
        self.children
            .as_ref()
            .ok_or_else(|| FormError::NotAGroup(self.path().clone()))
    }
}

fn mount(
    form: &FormController,
    registry: &FieldTree,
    parent: &FieldPath,
    name: FieldPath,
    validators: FieldValidators,
    group: bool,
) -> FormResult<Field> {
    let binding = Arc::new(FieldBinding::new(parent.join(&name), validators, group));
    let children = group.then(FieldTree::new);
    registry.register(name.clone(), binding.clone(), children.clone())?;
    Ok(Field {
        form: form.clone(),
        name,
        binding,
        children,
        registry: registry.clone(),
    })
}
