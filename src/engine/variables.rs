use crate::EvalError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Read/write store of named values the evaluator resolves variables against.
///
/// The evaluator never iterates or persists the store; it only calls `get`
/// for reads and `set` for `=` assignments.
pub trait Variables {
    fn get(&self, name: &str) -> Result<f64, EvalError>;

    /// Creates or overwrites `name`.
    fn set(&mut self, name: &str, value: f64);
}

impl Variables for HashMap<String, f64> {
    fn get(&self, name: &str) -> Result<f64, EvalError> {
        HashMap::get(self, name)
            .copied()
            .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))
    }

    fn set(&mut self, name: &str, value: f64) {
        self.insert(name.to_string(), value);
    }
}

impl<V: Variables + ?Sized> Variables for &mut V {
    fn get(&self, name: &str) -> Result<f64, EvalError> {
        (**self).get(name)
    }

    fn set(&mut self, name: &str, value: f64) {
        (**self).set(name, value)
    }
}

/// Cloneable handle to one store shared between evaluators, possibly on
/// different threads. Writers are serialized by the lock.
#[derive(Debug, Clone, Default)]
pub struct SharedVariables {
    inner: Arc<RwLock<HashMap<String, f64>>>,
}

impl SharedVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.inner.read().clone()
    }
}

impl From<HashMap<String, f64>> for SharedVariables {
    fn from(values: HashMap<String, f64>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(values)),
        }
    }
}

impl Variables for SharedVariables {
    fn get(&self, name: &str) -> Result<f64, EvalError> {
        Variables::get(&*self.inner.read(), name)
    }

    fn set(&mut self, name: &str, value: f64) {
        Variables::set(&mut *self.inner.write(), name, value);
    }
}
