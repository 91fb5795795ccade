//! The memoizing result cell that everything else is built from.
//!
//! A [`Deferred`] represents work that may not have happened yet: forcing it
//! runs the captured computation (at most once) and caches the outcome, so
//! every later force returns the same `Result` without repeating the work.
//! This is an explicit cell rather than an async primitive so that the
//! relationship between a per-key result and the round that will satisfy it
//! is an inspectable piece of state, not a hidden closure capture.

use std::cell::RefCell;
use std::fmt::{self, Debug, Formatter};
use std::mem;
use std::rc::Rc;

use crate::error::LoadError;

type Thunk<T> = Box<dyn FnOnce() -> Result<T, LoadError>>;

enum State<T> {
    /// Not yet forced; holds the computation.
    Pending(Thunk<T>),
    /// Currently being forced. Observing this state from inside the
    /// computation means the forcing re-entered itself: a load cycle.
    InFlight,
    /// Forced; the memoized outcome, success or failure.
    Ready(Result<T, LoadError>),
}

/// A shared, memoizing deferred result. Cheap to clone; all clones observe
/// the same cell, so forcing any one of them settles them all.
pub struct Deferred<T> {
    cell: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// Create a cell whose value is produced by `thunk` on first force.
    pub fn new(thunk: impl FnOnce() -> Result<T, LoadError> + 'static) -> Self {
        Self {
            cell: Rc::new(RefCell::new(State::Pending(Box::new(thunk)))),
        }
    }

    /// Create an already-settled cell. Forcing never runs any work.
    pub fn ready(value: T) -> Self {
        Self {
            cell: Rc::new(RefCell::new(State::Ready(Ok(value)))),
        }
    }

    /// Create an already-failed cell. The error is observed on every force.
    pub fn failed(error: LoadError) -> Self {
        Self {
            cell: Rc::new(RefCell::new(State::Ready(Err(error)))),
        }
    }

    /// Force the cell: run the computation if it has not run yet, then
    /// return the memoized outcome. Re-entrant forcing (the computation
    /// transitively forcing its own cell) reports [`LoadError::Cycle`]
    /// instead of recursing forever.
    pub fn force(&self) -> Result<T, LoadError> {
        let taken = mem::replace(&mut *self.cell.borrow_mut(), State::InFlight);
        match taken {
            State::Ready(result) => {
                *self.cell.borrow_mut() = State::Ready(result.clone());
                result
            }
            // Leave the cell InFlight; the outer force that owns the thunk
            // will overwrite it with the real outcome when it unwinds.
            State::InFlight => Err(LoadError::Cycle),
            State::Pending(thunk) => {
                let result = thunk();
                *self.cell.borrow_mut() = State::Ready(result.clone());
                result
            }
        }
    }

    /// True once the cell has settled (successfully or not).
    pub fn is_forced(&self) -> bool {
        matches!(*self.cell.borrow(), State::Ready(_))
    }
}

impl<T> Debug for Deferred<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match *self.cell.borrow() {
            State::Pending(_) => "pending",
            State::InFlight => "in-flight",
            State::Ready(Ok(_)) => "ready",
            State::Ready(Err(_)) => "failed",
        };
        f.debug_tuple("Deferred").field(&state).finish()
    }
}
