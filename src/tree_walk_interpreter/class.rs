use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use super::{
    callable::{Callable, CallableFunction},
    Value,
};

pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: FxHashMap<String, CallableFunction>,
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field(
                "superclass",
                &self.superclass.as_ref().map(|c| c.name.clone()),
            )
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Class {
    /// Looks in this class first, then up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<&CallableFunction> {
        self.methods.get(name).or_else(|| {
            self.superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name))
        })
    }

    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, CallableFunction::arity)
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    pub fields: FxHashMap<String, Value>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Field values may point back at this instance, so only names are shown.
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: FxHashMap::default(),
        }
    }

    /// Fields shadow methods; a method found on the class is bound to
    /// `instance` before it is returned.
    pub fn get(instance: &Rc<RefCell<Instance>>, name: &str) -> Option<Value> {
        let this = instance.borrow();
        if let Some(value) = this.fields.get(name) {
            return Some(value.clone());
        }

        let method = this.class.find_method(name)?;
        Some(Value::Callable(Rc::new(Callable::Function(
            method.bind(instance),
        ))))
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}
