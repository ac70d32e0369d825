use std::sync::Arc;

use tracing::{debug, warn};

use super::controller::{
    FormController, FormResult, SubmitState, SubmitTrigger, transition_submit_state, write_lock,
};
use super::state::empty_object;
use super::store::FormIntent;
use super::validation::{ValidateOptions, is_invalid, merge_errors};

/// How a submit attempt that did not fail ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// Values were handed to `on_submit`, or there was no handler.
    Submitted,
    /// Values were handed to `on_submit` and it failed; the failure went to
    /// `on_submit_failure`.
    CallbackFailed,
    Invalid,
    /// Valid, but an async validation started after the async pass and is
    /// still running.
    AsyncPending,
}

impl SubmitOutcome {
    pub fn terminal_state(self) -> SubmitState {
        match self {
            SubmitOutcome::Submitted | SubmitOutcome::CallbackFailed => SubmitState::Succeeded,
            SubmitOutcome::Invalid | SubmitOutcome::AsyncPending => SubmitState::Suppressed,
        }
    }
}

impl FormController {
    /// Touches, validates and, when everything passes, submits the form.
    ///
    /// Invalid forms resolve to `Ok(SubmitOutcome::Invalid)`. Only a failing
    /// async validator (or a failing store) yields `Err`, after
    /// `submitting` has been cleared. `submitting` stays true for the whole
    /// attempt otherwise.
    pub async fn submit(&self, trigger: Option<Arc<dyn SubmitTrigger>>) -> FormResult<SubmitOutcome> {
        self.transition(SubmitState::Submitting)?;
        if let Err(error) = self.dispatch(FormIntent::Submitting(true)) {
            warn!(form = %self.id, %error, "submit aborted");
            self.transition(SubmitState::Rejected)?;
            return Err(error);
        }
        debug!(form = %self.id, "submit started");

        let result = self.run_submit(trigger).await;
        let cleared = self.dispatch(FormIntent::Submitting(false));
        let terminal = match (&result, &cleared) {
            (Ok(outcome), Ok(())) => outcome.terminal_state(),
            _ => SubmitState::Rejected,
        };
        self.transition(terminal)?;

        match result {
            Ok(outcome) => {
                cleared?;
                debug!(form = %self.id, ?outcome, "submit finished");
                Ok(outcome)
            }
            Err(error) => {
                warn!(form = %self.id, %error, "submit aborted");
                Err(error)
            }
        }
    }

    async fn run_submit(&self, trigger: Option<Arc<dyn SubmitTrigger>>) -> FormResult<SubmitOutcome> {
        self.dispatch(FormIntent::Submits)?;

        let opts = ValidateOptions::submitting();
        self.set_all_touched().await?;
        self.pre_validate_all(opts).await?;
        self.validate_all(opts).await?;

        if let Some(trigger) = trigger.as_deref() {
            if self.options.prevent_default {
                trigger.prevent_default();
            } else {
                let current = self.state()?;
                if is_invalid(&current.errors) || is_invalid(&current.async_errors) {
                    debug!(form = %self.id, "preventing default for invalid form");
                    trigger.prevent_default();
                }
            }
        }

        self.async_validate_all(opts).await?;

        let current = self.state()?;
        let invalid = is_invalid(&current.errors);
        let async_invalid = is_invalid(&current.async_errors);
        if invalid || async_invalid {
            debug!(form = %self.id, invalid, async_invalid, "submit blocked by errors");
            if let Some(on_failure) = self.handlers.on_submit_failure.as_ref() {
                on_failure(&merge_errors(&current.errors, &current.async_errors), None);
            }
            return Ok(SubmitOutcome::Invalid);
        }

        if current.async_validations != 0 {
            debug!(
                form = %self.id,
                in_flight = current.async_validations,
                "submit suppressed by running async validations"
            );
            return Ok(SubmitOutcome::AsyncPending);
        }

        let mut values = current.values.clone();
        if let Some(pre_submit) = self.handlers.pre_submit.as_ref() {
            values = pre_submit(values);
        }
        self.dispatch(FormIntent::Submitted)?;

        let Some(on_submit) = self.handlers.on_submit.as_ref() else {
            return Ok(SubmitOutcome::Submitted);
        };
        match on_submit(values, trigger).await {
            Ok(()) => Ok(SubmitOutcome::Submitted),
            Err(error) => {
                warn!(form = %self.id, %error, "submit handler failed");
                if let Some(on_failure) = self.handlers.on_submit_failure.as_ref() {
                    on_failure(&empty_object(), Some(&error));
                }
                Ok(SubmitOutcome::CallbackFailed)
            }
        }
    }

    fn transition(&self, next: SubmitState) -> FormResult<()> {
        let mut current = write_lock(&self.submit_state, "transitioning submit state")?;
        transition_submit_state(&mut current, next)
    }
}
