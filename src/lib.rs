//! Form-state controller: a registry of mounted fields, three validation
//! passes run children-first over that registry, and the submit workflow
//! built on top of them. State lives in a [`form::FormStore`]; the
//! controller only reads snapshots and dispatches intents.

pub mod form;

pub use form::{Field, FieldPath, FieldValidators, FormController, FormOptions, MemoryStore};
