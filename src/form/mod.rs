mod binding;
mod controller;
mod state;
mod store;
mod submit;
mod tree;
mod validation;


pub use binding::{Field, FieldBinding};
pub use controller::{
    FormController, FormError, FormId, FormOptions, FormResult, SubmitState, SubmitTrigger,
};
pub use state::{
    FieldPath, FormState, MAX_LIST_INDEX, PathSegment, deep_equal, empty_object, get, is_truthy,
    snapshot, values_equal,
};
pub use store::{FormIntent, FormStore, MemoryStore};
pub use submit::SubmitOutcome;
pub use tree::{FieldApi, FieldNode, FieldTree};
pub use validation::{
    AsyncValidateFn, BoxError, FieldValidators, FormatFn, PreValidateFn, ValidateFn,
    ValidateOptions, ValidationOutcome, is_invalid, merge_errors,
};
