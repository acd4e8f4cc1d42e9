use std::{cell::RefCell, fmt::Debug, rc::Rc};

use rustc_hash::FxHashMap;

use super::Value;

/// Shared handle to a scope. Closures, call frames and bound methods may all
/// hold the same scope; mutation through one handle is seen by every other.
pub type ScopeRef = Rc<RefCell<Scope>>;

pub struct Scope {
    values: FxHashMap<String, Value>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub fn boxed(parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Self::new(parent)))
    }

    pub fn new(parent: Option<ScopeRef>) -> Self {
        Self {
            values: FxHashMap::default(),
            parent,
        }
    }

    /// Binds `name` in this scope, replacing any previous binding here.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn parent(&self) -> Option<&ScopeRef> {
        self.parent.as_ref()
    }

    // Each hop clones the parent handle out before releasing the borrow, so
    // no borrow is ever held while moving along the chain.
    fn climb_scopes(scope: &ScopeRef, distance: usize) -> Option<ScopeRef> {
        let mut scope = scope.clone();
        for _ in 0..distance {
            let parent = scope.borrow().parent().cloned()?;
            scope = parent;
        }
        Some(scope)
    }

    /// Reads `name` from exactly `distance` scopes out.
    pub fn get_at(scope: &ScopeRef, distance: usize, name: &str) -> Option<Value> {
        let scope = Self::climb_scopes(scope, distance)?;
        let scope = scope.borrow();
        scope.values.get(name).cloned()
    }

    /// Writes `name` exactly `distance` scopes out. Returns false when the
    /// binding does not exist there.
    pub fn assign_at(scope: &ScopeRef, distance: usize, name: &str, value: &Value) -> bool {
        let Some(scope) = Self::climb_scopes(scope, distance) else {
            return false;
        };
        let mut scope = scope.borrow_mut();
        match scope.values.get_mut(name) {
            Some(slot) => {
                *slot = value.clone();
                true
            }
            None => false,
        }
    }

    /// Reads `name` from the nearest scope on the chain that defines it.
    pub fn get(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut scope = scope.clone();
        loop {
            let parent = {
                let current = scope.borrow();
                if let Some(value) = current.values.get(name) {
                    return Some(value.clone());
                }
                current.parent().cloned()
            };
            scope = parent?;
        }
    }

    /// Writes `name` in the nearest scope on the chain that defines it.
    pub fn assign(scope: &ScopeRef, name: &str, value: &Value) -> bool {
        let mut scope = scope.clone();
        loop {
            let parent = {
                let mut current = scope.borrow_mut();
                if let Some(slot) = current.values.get_mut(name) {
                    *slot = value.clone();
                    return true;
                }
                current.parent().cloned()
            };
            match parent {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.values.keys().collect();
        names.sort();
        f.debug_struct(format!("Scope<{:?}>", self as *const Self).as_str())
            .field("names", &names)
            .field("parent", &self.parent.as_ref().map(|p| p.as_ptr()))
            .finish()
    }
}
