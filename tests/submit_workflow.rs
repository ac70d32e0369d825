use std::sync::{Arc, Mutex};

use calmform::form::{BoxError, FormState, SubmitOutcome, SubmitState, ValidationOutcome};
use calmform::{FieldValidators, FormController, FormOptions, MemoryStore};
use futures::executor::block_on;
use serde_json::{Value, json};

fn not_blank(value: &Value, _values: &Value) -> ValidationOutcome {
    match value.as_str() {
        Some(text) if !text.trim().is_empty() => ValidationOutcome::valid(),
        _ => ValidationOutcome::error("must not be blank"),
    }
}

#[test]
fn signup_form_round_trip() {
    let store = MemoryStore::new(json!({
        "username": "",
        "emails": ["ada@calm.ui"],
    }));
    let submissions: Arc<Mutex<Vec<Value>>> = Arc::default();
    let failures: Arc<Mutex<Vec<Value>>> = Arc::default();
    let form = {
        let submissions = submissions.clone();
        let failures = failures.clone();
        FormController::new(store.clone(), FormOptions::default())
            .on_submit(move |values, _trigger| {
                submissions.lock().expect("submissions lock").push(values);
                async { Ok::<(), BoxError>(()) }
            })
            .on_submit_failure(move |errors, _secondary| {
                failures.lock().expect("failures lock").push(errors.clone());
            })
    };

    let username = form
        .field(
            "username",
            FieldValidators::new()
                .validate(not_blank)
                .async_validate(|value, _values| async move {
                    let outcome = if value == json!("admin") {
                        ValidationOutcome::error("reserved")
                    } else {
                        ValidationOutcome::valid()
                    };
                    Ok::<_, BoxError>(outcome)
                }),
        )
        .expect("mount username");
    let emails = form
        .group("emails", FieldValidators::new())
        .expect("mount emails");
    emails
        .field("[0]", FieldValidators::new().validate(not_blank))
        .expect("mount first email");

    let outcome = block_on(form.submit(None)).expect("first submit");
    assert_eq!(outcome, SubmitOutcome::Invalid);
    assert_eq!(
        failures.lock().expect("failures lock").clone(),
        vec![json!({"username": "must not be blank", "emails": [null]})]
    );
    let state: FormState = form.get_form_state().expect("form state");
    assert_eq!(state.touched, json!({"username": true, "emails": [true]}));

    block_on(username.change("admin")).expect("change username");
    assert_eq!(username.async_error().expect("async error"), Some(json!("reserved")));
    assert_eq!(
        block_on(form.submit(None)).expect("second submit"),
        SubmitOutcome::Invalid
    );

    block_on(username.change("ada")).expect("change username again");
    assert_eq!(
        block_on(form.submit(None)).expect("third submit"),
        SubmitOutcome::Submitted
    );
    assert_eq!(
        submissions.lock().expect("submissions lock").clone(),
        vec![json!({"username": "ada", "emails": ["ada@calm.ui"]})]
    );
    assert_eq!(form.submit_state().expect("submit state"), SubmitState::Succeeded);

    let state = form.get_form_state().expect("form state");
    assert_eq!(state.submits, 3);
    assert!(state.submitted);
    assert!(!state.submitting);
}
