use std::{cell::RefCell, fmt::Display, rc::Rc};

use crate::ast::FunctionDecl;

use super::{
    class::{Class, Instance},
    scope::{Scope, ScopeRef},
    ExecutionError, ExecutionErrorKind, Flow, Interpreter, Value,
};

pub type BuiltinFn = fn(&[Value]) -> Result<Value, ExecutionErrorKind>;

#[derive(Clone)]
pub struct CallableFunction {
    pub scope: ScopeRef,
    pub decl: Rc<FunctionDecl>,
    pub is_initializer: bool,
}

impl std::fmt::Debug for CallableFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableFunction")
            .field("scope", &self.scope.as_ptr())
            .field("name", &self.decl.name.lexeme)
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

impl CallableFunction {
    pub fn new(scope: ScopeRef, decl: Rc<FunctionDecl>, is_initializer: bool) -> Self {
        Self {
            scope,
            decl,
            is_initializer,
        }
    }

    /// A copy of this function whose closure has `this` bound to `instance`.
    pub fn bind(&self, instance: &Rc<RefCell<Instance>>) -> Self {
        let scope = Scope::boxed(Some(self.scope.clone()));
        scope
            .borrow_mut()
            .define("this", Value::Instance(instance.clone()));
        Self {
            scope,
            decl: self.decl.clone(),
            is_initializer: self.is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.decl.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value, ExecutionError> {
        tracing::trace!(function = %self.decl.name.lexeme, args = args.len(), "call");

        let scope = Scope::boxed(Some(self.scope.clone()));
        {
            let mut scope = scope.borrow_mut();
            for (param, arg) in self.decl.params.iter().zip(args) {
                scope.define(param.lexeme.clone(), arg);
            }
        }

        let flow = interpreter.call_frame(line, |interpreter| {
            interpreter.execute_block(&self.decl.body, scope)
        })?;

        if self.is_initializer {
            return Ok(Scope::get_at(&self.scope, 0, "this")
                .unwrap_or_else(|| unreachable!("initializers are only called once bound")));
        }

        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        })
    }
}

#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub function: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Callable {
    Function(CallableFunction),
    Builtin(Builtin),
    ClassConstructor(Rc<Class>),
}

impl Callable {
    /// Invokes the callable. Arity has already been checked by the caller;
    /// `line` locates errors raised by builtins and call nesting.
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        line: usize,
    ) -> Result<Value, ExecutionError> {
        match self {
            Callable::Function(callable_function) => {
                callable_function.call(interpreter, args, line)
            }
            Callable::Builtin(builtin) => (builtin.function)(&args).map_err(|kind| kind.at(line)),
            Callable::ClassConstructor(class) => {
                let instance = Rc::new(RefCell::new(Instance::new(class.clone())));
                if let Some(init) = class.find_method("init") {
                    init.bind(&instance).call(interpreter, args, line)?;
                }
                Ok(Value::Instance(instance))
            }
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Callable::Function(callable_function) => callable_function.arity(),
            Callable::Builtin(builtin) => builtin.arity,
            Callable::ClassConstructor(class) => class.arity(),
        }
    }

    pub fn as_class(&self) -> Option<&Rc<Class>> {
        match self {
            Callable::ClassConstructor(class) => Some(class),
            _ => None,
        }
    }
}

impl Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(callable_function) => {
                write!(f, "<fn {}>", callable_function.decl.name.lexeme)
            }
            Callable::Builtin(_) => write!(f, "<native fn>"),
            Callable::ClassConstructor(class) => write!(f, "{}", class.name),
        }
    }
}

/// Seconds since the Unix epoch.
pub fn clock(_: &[Value]) -> Result<Value, ExecutionErrorKind> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default();
    Ok(Value::Number(now))
}

pub const BUILTINS: &[Builtin] = &[Builtin {
    name: "clock",
    arity: 0,
    function: clock,
}];
