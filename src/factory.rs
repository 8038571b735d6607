//! The proc factory: a name-keyed registry of constructors, so that a
//! container can instantiate a proc from its class name alone (e.g. when
//! rebuilding a graph from a saved description).
//!
//! Concrete DSP proc classes (oscillators, filters, delays) are an external
//! collaborator per spec.md §1 and are not registered here; callers that
//! ship such procs register them with [`ProcFactory::register`] before
//! constructing a graph.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{GraphError, GraphResult};
use crate::proc::Proc;

type Constructor = Box<dyn Fn(&str) -> Box<dyn Proc> + Send + Sync>;

/// A registry mapping class names to constructors. Registration happens on
/// the construction/compilation thread, never inside `process`.
pub struct ProcFactory {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl ProcFactory {
    pub fn new() -> Self {
        ProcFactory {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a constructor under `class_name`, overwriting any prior
    /// registration for the same name.
    pub fn register<F>(&self, class_name: impl Into<String>, ctor: F)
    where
        F: Fn(&str) -> Box<dyn Proc> + Send + Sync + 'static,
    {
        self.constructors
            .write()
            .insert(class_name.into(), Box::new(ctor));
    }

    pub fn is_registered(&self, class_name: &str) -> bool {
        self.constructors.read().contains_key(class_name)
    }

    /// Instantiates a new proc of the named class. Fails with
    /// [`GraphError::NewProcErr`] if no constructor is registered for that
    /// class name.
    pub fn create(&self, class_name: &str, instance_name: &str) -> GraphResult<Box<dyn Proc>> {
        let guard = self.constructors.read();
        let ctor = guard
            .get(class_name)
            .ok_or_else(|| GraphError::NewProcErr {
                class_name: class_name.to_string(),
            })?;
        Ok(ctor(instance_name))
    }
}

impl Default for ProcFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers this crate's own built-in proc classes. There are none beyond
/// test fixtures today; this function exists as the single place a future
/// built-in would be added, mirroring the explicit-registration style used
/// throughout the rest of this crate rather than link-time inventory magic.
pub fn register_builtin_procs(_factory: &ProcFactory) {}
