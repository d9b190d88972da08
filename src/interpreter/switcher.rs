//! Interpreter Switcher
//!
//! Legacy init functions always run with the main interpreter active. The
//! switch is a scoped value: [`InterpreterSwitcher::switch_to_main`] binds a
//! temporary thread state to the main interpreter and returns an
//! [`ActiveInterpreter`] token naming the interpreter that is now active.
//! Handing the token back to [`InterpreterSwitcher::switch_back`] tears the
//! thread state down.
//!
//! Errors still pending when switching back cannot be propagated into the
//! requesting interpreter as-is: resource exhaustion is cleared (the caller
//! will hit it again), anything else goes to the runtime's unraisable hook.

use std::sync::Arc;

use tracing::{debug, trace};

use super::Interpreter;
use crate::error::{ImportResult, RaisedError};
use crate::runtime::Runtime;

/// A thread's binding to an interpreter
pub struct ThreadState {
    interp: Arc<Interpreter>,
}

impl ThreadState {
    pub(crate) fn bind(interp: &Arc<Interpreter>) -> Self {
        interp.attach_thread_state();
        Self {
            interp: Arc::clone(interp),
        }
    }

    pub fn interpreter(&self) -> &Arc<Interpreter> {
        &self.interp
    }
}

impl Drop for ThreadState {
    fn drop(&mut self) {
        self.interp.detach_thread_state();
    }
}

/// Proof of which interpreter is active for the current call
pub struct ActiveInterpreter<'a> {
    requester: &'a Arc<Interpreter>,
    /// Present only when the switch actually happened
    main: Option<ThreadState>,
}

impl<'a> ActiveInterpreter<'a> {
    /// The interpreter code should run under right now
    pub fn interpreter(&self) -> &Arc<Interpreter> {
        match &self.main {
            Some(tstate) => tstate.interpreter(),
            None => self.requester,
        }
    }

    /// The interpreter that asked for the switch
    pub fn requester(&self) -> &'a Arc<Interpreter> {
        self.requester
    }

    pub fn switched(&self) -> bool {
        self.main.is_some()
    }
}

/// Runs callbacks under the main interpreter
pub struct InterpreterSwitcher<'r> {
    runtime: &'r Runtime,
}

impl<'r> InterpreterSwitcher<'r> {
    pub fn new(runtime: &'r Runtime) -> Self {
        Self { runtime }
    }

    /// Make the main interpreter active for the calling thread
    pub fn switch_to_main<'a>(&self, requester: &'a Arc<Interpreter>) -> ActiveInterpreter<'a> {
        if requester.is_main() {
            return ActiveInterpreter {
                requester,
                main: None,
            };
        }

        debug!(from = requester.id(), "switching to main interpreter");
        ActiveInterpreter {
            requester,
            main: Some(ThreadState::bind(self.runtime.main_interpreter())),
        }
    }

    /// Restore the requester's context, handling an error produced while
    /// the main interpreter was active.
    ///
    /// The outcome is handed back unchanged so the caller can still report
    /// the failure in its own interpreter.
    pub fn switch_back<T>(
        &self,
        active: ActiveInterpreter<'_>,
        outcome: ImportResult<T>,
    ) -> ImportResult<T> {
        if active.switched() {
            if let Err(err) = &outcome {
                if err.is_memory_error() {
                    trace!(error = %err, "cleared memory error while switching back");
                } else {
                    self.runtime.report_unraisable(
                        RaisedError::from(err.clone()),
                        "while loading an extension under the main interpreter",
                    );
                }
            }
            let to = active.requester().id();
            debug!(to, "switching back from main interpreter");
        }
        drop(active);
        outcome
    }

    /// Run `f` under the main interpreter and switch back
    pub fn run_on_main<T>(
        &self,
        requester: &Arc<Interpreter>,
        f: impl FnOnce(&ActiveInterpreter<'_>) -> ImportResult<T>,
    ) -> ImportResult<T> {
        let active = self.switch_to_main(requester);
        let outcome = f(&active);
        self.switch_back(active, outcome)
    }
}
