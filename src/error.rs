//! Error types and the injected error/warning handler.
//!
//! Recoverable conditions are reported as [`SimError`] values. Structural
//! misuse (mismatched dimensions, broken sparsity invariants) is fatal and
//! goes through [`ErrorHandler::fatal`], which never returns.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Recoverable errors surfaced by the sparse core and the model builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// An output buffer is smaller than the number of entries to write.
    #[error("buffer too small: {required} entries required, {available} available")]
    Capacity { required: usize, available: usize },

    /// The model description is inconsistent.
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Two operands disagree on a dimension.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Result type for fallible kinetree operations.
pub type SimResult<T> = std::result::Result<T, SimError>;

/// Warning kinds recorded during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Warning {
    /// A mass-matrix pivot fell below the floor or was non-positive.
    Inertia,
    /// A constraint-system pivot was non-positive.
    ConstraintPivot,
    /// The computed acceleration contained non-finite values.
    BadQacc,
}

impl Warning {
    pub const COUNT: usize = 3;

    pub fn index(self) -> usize {
        match self {
            Warning::Inertia => 0,
            Warning::ConstraintPivot => 1,
            Warning::BadQacc => 2,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Inertia => write!(f, "mass matrix is not positive definite"),
            Warning::ConstraintPivot => write!(f, "constraint system pivot is not positive"),
            Warning::BadQacc => write!(f, "non-finite acceleration"),
        }
    }
}

/// Number of times a warning fired and the info attached to the last one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarningStat {
    pub last_info: usize,
    pub count: usize,
}

type MessageHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Error and warning sink configured on the simulation state.
///
/// Shared between island workers through an `Arc`; warning counters are
/// guarded by a mutex so concurrent island solves can record into them.
pub struct ErrorHandler {
    on_error: Option<MessageHook>,
    on_warning: Option<MessageHook>,
    stats: Mutex<[WarningStat; Warning::COUNT]>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("on_error", &self.on_error.is_some())
            .field("on_warning", &self.on_warning.is_some())
            .field("stats", &*self.stats.lock())
            .finish()
    }
}

impl ErrorHandler {
    pub fn new() -> Self {
        Self {
            on_error: None,
            on_warning: None,
            stats: Mutex::new([WarningStat::default(); Warning::COUNT]),
        }
    }

    /// Installs a hook invoked with the message before a fatal error panics.
    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Installs a hook invoked with every warning message.
    pub fn with_warning_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_warning = Some(Arc::new(hook));
        self
    }

    /// Reports a structural invariant violation and aborts the step.
    #[track_caller]
    pub fn fatal(&self, msg: &str) -> ! {
        log::error!("{msg}");
        if let Some(hook) = &self.on_error {
            hook(msg);
        }
        panic!("kinetree fatal error: {msg}");
    }

    /// Records a warning and forwards it to the log and the warning hook.
    pub fn warn(&self, warning: Warning, info: usize) {
        {
            let mut stats = self.stats.lock();
            let stat = &mut stats[warning.index()];
            stat.count += 1;
            stat.last_info = info;
        }
        let msg = format!("{warning} (info = {info})");
        log::warn!("{msg}");
        if let Some(hook) = &self.on_warning {
            hook(&msg);
        }
    }

    pub fn stat(&self, warning: Warning) -> WarningStat {
        self.stats.lock()[warning.index()]
    }

    pub fn clear_warnings(&self) {
        *self.stats.lock() = [WarningStat::default(); Warning::COUNT];
    }
}
