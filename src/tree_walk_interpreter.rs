mod callable;
mod class;
mod scope;

use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    io::Write,
    rc::Rc,
};

use crate::{
    ast::{
        ExprId, Expression, InfixOperator, Literal, LogicalOperator, Program, Statement,
        UnaryOperator,
    },
    resolver::Locals,
    tokenizer::Token,
};

use self::{
    callable::{Callable, CallableFunction, BUILTINS},
    class::{Class, Instance},
    scope::{Scope, ScopeRef},
};

#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(Rc<str>),
    Boolean(bool),
    Callable(Rc<Callable>),
    Instance(Rc<RefCell<Instance>>),
    Nil,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            _ => true,
        }
    }

    fn as_class(&self) -> Option<Rc<Class>> {
        match self {
            Value::Callable(callable) => callable.as_class().cloned(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // NaN is equal to itself here, unlike IEEE-754.
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) if n.is_infinite() => {
                write!(f, "{}", if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Callable(c) => write!(f, "{}", c),
            Value::Instance(instance) => {
                write!(f, "{} instance", instance.borrow().class.name)
            }
            Value::Nil => write!(f, "nil"),
        }
    }
}

/// How control left a statement. `Return` unwinds to the innermost call.
#[derive(Debug)]
enum Flow {
    Normal,
    Return(Value),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("Operand must be a number.")]
    OperandNotNumber(UnaryOperator),
    #[error("Operands must be numbers.")]
    OperandsNotNumbers(InfixOperator),
    #[error("Operands must be two numbers or two strings.")]
    InvalidAddOperands,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Can only call functions and classes.")]
    NotCallable,
    #[error("Expected {expected} arguments but got {got}.")]
    ArityMismatch { expected: usize, got: usize },
    #[error("Only instances have properties.")]
    PropertyOnNonInstance,
    #[error("Only instances have fields.")]
    FieldOnNonInstance,
    #[error("Undefined property '{0}'.")]
    UndefinedProperty(String),
    #[error("Superclass must be a class.")]
    SuperclassNotClass,
    #[error("Stack overflow.")]
    StackOverflow,
}

impl ExecutionErrorKind {
    pub fn at(self, line: usize) -> ExecutionError {
        ExecutionError::Runtime { kind: self, line }
    }

    /// The operator whose operands had the wrong type, if that is what failed.
    pub fn operator(&self) -> Option<String> {
        match self {
            ExecutionErrorKind::OperandNotNumber(op) => Some(op.to_string()),
            ExecutionErrorKind::OperandsNotNumbers(op) => Some(op.to_string()),
            ExecutionErrorKind::InvalidAddOperands => Some(InfixOperator::Plus.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("{kind}\n[line {line}]")]
    Runtime {
        kind: ExecutionErrorKind,
        line: usize,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Nesting limit for Lox calls.
pub const MAX_CALL_DEPTH: usize = 4096;

/// Remaining native stack below which a call grows the stack.
const RED_ZONE: usize = 100 * 1024;

/// Stack allocated per growth.
const STACK_PER_RECURSION: usize = 1024 * 1024;

pub struct Interpreter {
    globals: ScopeRef,
    scope: ScopeRef,
    locals: Locals,
    depth: usize,
    stdout: Rc<RefCell<dyn Write>>,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("scope", &self.scope)
            .field("locals", &self.locals.len())
            .field("depth", &self.depth)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>) -> Self {
        let globals = Scope::boxed(None);
        for builtin in BUILTINS {
            globals.borrow_mut().define(
                builtin.name,
                Value::Callable(Rc::new(Callable::Builtin(builtin.clone()))),
            );
        }

        Self {
            scope: globals.clone(),
            globals,
            locals: Locals::default(),
            depth: 0,
            stdout,
        }
    }

    /// Adds resolved scope distances. Entries from earlier runs are kept so
    /// closures created by them still find their variables.
    pub fn resolve(&mut self, locals: Locals) {
        self.locals.extend(locals);
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), ExecutionError> {
        tracing::debug!(statements = program.0.len(), "interpret");
        for statement in program.0.iter() {
            self.execute(statement)?;
        }
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<Flow, ExecutionError> {
        match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression)?;
            }
            Statement::Print(expression) => {
                let value = self.evaluate(expression)?;
                writeln!(self.stdout.borrow_mut(), "{}", value)?;
            }
            Statement::Var(name, initializer) => {
                let value = match initializer {
                    Some(initializer) => self.evaluate(initializer)?,
                    None => Value::Nil,
                };
                self.scope.borrow_mut().define(name.lexeme.clone(), value);
            }
            Statement::Block(statements) => {
                let scope = Scope::boxed(Some(self.scope.clone()));
                return self.execute_block(statements, scope);
            }
            Statement::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_branch) = else_branch {
                    return self.execute(else_branch);
                }
            }
            Statement::While(condition, body) => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }
            Statement::Function(decl) => {
                let function = CallableFunction::new(self.scope.clone(), decl.clone(), false);
                self.scope.borrow_mut().define(
                    decl.name.lexeme.clone(),
                    Value::Callable(Rc::new(Callable::Function(function))),
                );
            }
            Statement::Return(_, expression) => {
                let value = match expression {
                    Some(expression) => self.evaluate(expression)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Class(class_decl) => {
                let superclass = match &class_decl.superclass {
                    Some(expression) => {
                        let line = match expression {
                            Expression::Variable { name, .. } => name.line,
                            _ => class_decl.name.line,
                        };
                        let superclass = self
                            .evaluate(expression)?
                            .as_class()
                            .ok_or_else(|| ExecutionErrorKind::SuperclassNotClass.at(line))?;
                        Some(superclass)
                    }
                    None => None,
                };

                let name = class_decl.name.lexeme.clone();
                self.scope.borrow_mut().define(name.clone(), Value::Nil);

                let scope = match &superclass {
                    Some(superclass) => {
                        let scope = Scope::boxed(Some(self.scope.clone()));
                        scope.borrow_mut().define(
                            "super",
                            Value::Callable(Rc::new(Callable::ClassConstructor(
                                superclass.clone(),
                            ))),
                        );
                        scope
                    }
                    None => self.scope.clone(),
                };

                let methods = class_decl
                    .methods
                    .iter()
                    .map(|method| {
                        let is_initializer = method.name.lexeme == "init";
                        (
                            method.name.lexeme.clone(),
                            CallableFunction::new(scope.clone(), method.clone(), is_initializer),
                        )
                    })
                    .collect();

                let class = Class {
                    name: name.clone(),
                    superclass,
                    methods,
                };
                self.scope.borrow_mut().define(
                    name,
                    Value::Callable(Rc::new(Callable::ClassConstructor(Rc::new(class)))),
                );
            }
        }

        Ok(Flow::Normal)
    }

    /// Runs one Lox call frame. Fails with `StackOverflow` at `line` once
    /// calls nest past [`MAX_CALL_DEPTH`].
    fn call_frame<T>(
        &mut self,
        line: usize,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<T, ExecutionError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ExecutionErrorKind::StackOverflow.at(line));
        }

        self.depth += 1;
        let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || f(self));
        self.depth -= 1;
        result
    }

    fn execute_block(
        &mut self,
        statements: &[Statement],
        scope: ScopeRef,
    ) -> Result<Flow, ExecutionError> {
        self.execute_in_scope(scope, |interpreter| {
            for statement in statements {
                if let Flow::Return(value) = interpreter.execute(statement)? {
                    return Ok(Flow::Return(value));
                }
            }
            Ok(Flow::Normal)
        })
    }

    /// Runs `f` with `scope` current, restoring the previous scope however
    /// `f` exits.
    fn execute_in_scope<T>(
        &mut self,
        scope: ScopeRef,
        f: impl FnOnce(&mut Self) -> Result<T, ExecutionError>,
    ) -> Result<T, ExecutionError> {
        let prev = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = prev;
        result
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value, ExecutionError> {
        let value = match self.locals.get(&id) {
            Some(&distance) => Scope::get_at(&self.scope, distance, &name.lexeme),
            None => Scope::get(&self.globals, &name.lexeme),
        };
        value.ok_or_else(|| {
            ExecutionErrorKind::UndefinedVariable(name.lexeme.clone()).at(name.line)
        })
    }

    fn evaluate(&mut self, expression: &Expression) -> Result<Value, ExecutionError> {
        match expression {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(Rc::from(s.as_str())),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Nil => Value::Nil,
            }),
            Expression::Grouping(expression) => self.evaluate(expression),
            Expression::Unary(op, right) => {
                let right = self.evaluate(right)?;
                match op.kind {
                    UnaryOperator::Negate => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(ExecutionErrorKind::OperandNotNumber(op.kind).at(op.line)),
                    },
                    UnaryOperator::Not => Ok(Value::Boolean(!right.is_truthy())),
                }
            }
            Expression::Binary(left, op, right) => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                binary(op.kind, left, right).map_err(|kind| kind.at(op.line))
            }
            Expression::Logical(left, op, right) => {
                let left = self.evaluate(left)?;
                match op {
                    LogicalOperator::Or if left.is_truthy() => Ok(left),
                    LogicalOperator::And if !left.is_truthy() => Ok(left),
                    _ => self.evaluate(right),
                }
            }
            Expression::Variable { id, name } => self.look_up_variable(*id, name),
            Expression::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                let assigned = match self.locals.get(id) {
                    Some(&distance) => {
                        Scope::assign_at(&self.scope, distance, &name.lexeme, &value)
                    }
                    None => Scope::assign(&self.globals, &name.lexeme, &value),
                };
                if !assigned {
                    return Err(
                        ExecutionErrorKind::UndefinedVariable(name.lexeme.clone()).at(name.line)
                    );
                }
                Ok(value)
            }
            Expression::Call {
                callee,
                paren,
                args,
            } => {
                let callee = self.evaluate(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                let Value::Callable(callable) = callee else {
                    return Err(ExecutionErrorKind::NotCallable.at(paren.line));
                };

                if args.len() != callable.arity() {
                    return Err(ExecutionErrorKind::ArityMismatch {
                        expected: callable.arity(),
                        got: args.len(),
                    }
                    .at(paren.line));
                }

                callable.call(self, args, paren.line)
            }
            Expression::Get { object, name } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(ExecutionErrorKind::PropertyOnNonInstance.at(name.line));
                };
                Instance::get(&instance, &name.lexeme).ok_or_else(|| {
                    ExecutionErrorKind::UndefinedProperty(name.lexeme.clone()).at(name.line)
                })
            }
            Expression::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(ExecutionErrorKind::FieldOnNonInstance.at(name.line));
                };
                let value = self.evaluate(value)?;
                instance.borrow_mut().set(&name.lexeme, value.clone());
                Ok(value)
            }
            Expression::This { id, keyword } => self.look_up_variable(*id, keyword),
            Expression::Super {
                id,
                keyword,
                method,
            } => {
                let distance = self.locals.get(id).copied().unwrap_or_else(|| {
                    unreachable!("'super' at line {} was not resolved", keyword.line)
                });
                let superclass = Scope::get_at(&self.scope, distance, "super")
                    .and_then(|value| value.as_class())
                    .unwrap_or_else(|| unreachable!("'super' is always bound to a class"));
                let Some(Value::Instance(this)) =
                    Scope::get_at(&self.scope, distance - 1, "this")
                else {
                    unreachable!("'this' is bound one scope inside 'super'");
                };

                let method = superclass.find_method(&method.lexeme).ok_or_else(|| {
                    ExecutionErrorKind::UndefinedProperty(method.lexeme.clone()).at(method.line)
                })?;
                Ok(Value::Callable(Rc::new(Callable::Function(
                    method.bind(&this),
                ))))
            }
        }
    }
}

fn binary(op: InfixOperator, left: Value, right: Value) -> Result<Value, ExecutionErrorKind> {
    let value = match (op, left, right) {
        (InfixOperator::Equal, a, b) => Value::Boolean(a == b),
        (InfixOperator::NotEqual, a, b) => Value::Boolean(a != b),
        (InfixOperator::Plus, Value::Number(a), Value::Number(b)) => Value::Number(a + b),
        (InfixOperator::Plus, Value::String(a), Value::String(b)) => {
            Value::String(Rc::from(format!("{}{}", a, b)))
        }
        (InfixOperator::Plus, _, _) => return Err(ExecutionErrorKind::InvalidAddOperands),
        (op, Value::Number(a), Value::Number(b)) => match op {
            InfixOperator::Minus => Value::Number(a - b),
            InfixOperator::Multiply => Value::Number(a * b),
            InfixOperator::Divide => Value::Number(a / b),
            InfixOperator::LessThan => Value::Boolean(a < b),
            InfixOperator::LessThanOrEqual => Value::Boolean(a <= b),
            InfixOperator::GreaterThan => Value::Boolean(a > b),
            InfixOperator::GreaterThanOrEqual => Value::Boolean(a >= b),
            InfixOperator::Equal | InfixOperator::NotEqual | InfixOperator::Plus => {
                unreachable!("handled above")
            }
        },
        (op, _, _) => return Err(ExecutionErrorKind::OperandsNotNumbers(op)),
    };
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{diagnostic::Diagnostics, parser, resolver::Resolver, tokenizer};

    fn run(source: &str) -> (String, Result<(), ExecutionError>) {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokenizer::tokens(source, &mut diagnostics);
        let program = parser::program(&tokens, &mut Default::default(), &mut diagnostics);
        let locals = Resolver::new(&mut diagnostics).resolve(&program);
        assert!(diagnostics.is_empty(), "{}", diagnostics);

        let stdout = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut interpreter = Interpreter::new(stdout.clone());
        interpreter.resolve(locals);
        let result = interpreter.interpret(&program);
        let output = String::from_utf8(stdout.borrow().clone()).unwrap();
        (output, result)
    }

    fn runtime_error(source: &str) -> (ExecutionErrorKind, usize) {
        match run(source).1 {
            Err(ExecutionError::Runtime { kind, line }) => (kind, line),
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Number(-0.0).to_string(), "-0");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
        assert_eq!(Value::Number(f64::NAN).to_string(), "NaN");
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::Boolean(false));
        assert_eq!(Value::Number(f64::NAN), Value::Number(f64::NAN));
        assert_ne!(Value::Number(1.0), Value::String(Rc::from("1")));
        assert_eq!(Value::String(Rc::from("a")), Value::String(Rc::from("a")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(Rc::from("")).is_truthy());
    }

    #[test]
    fn test_logical_operators_return_operands() {
        let (output, result) = run("print nil or \"x\"; print 1 and 2; print false and 1;");
        assert!(result.is_ok());
        assert_eq!(output, "x\n2\nfalse\n");
    }

    #[test]
    fn test_callable_display() {
        let (output, result) = run(
            "fun f() {} class C { m() {} } print f; print clock; print C; print C(); print C().m;",
        );
        assert!(result.is_ok());
        assert_eq!(output, "<fn f>\n<native fn>\nC\nC instance\n<fn m>\n");
    }

    #[test]
    fn test_identity_equality() {
        let (output, result) = run(
            "class C {} var a = C(); var b = a; print a == b; print a == C(); print C == C;",
        );
        assert!(result.is_ok());
        assert_eq!(output, "true\nfalse\ntrue\n");
    }

    #[test]
    fn test_runtime_errors() {
        assert_eq!(
            runtime_error("print -\"a\";"),
            (ExecutionErrorKind::OperandNotNumber(UnaryOperator::Negate), 1)
        );
        assert_eq!(
            runtime_error("print 1 < \"a\";"),
            (
                ExecutionErrorKind::OperandsNotNumbers(InfixOperator::LessThan),
                1
            )
        );
        assert_eq!(
            runtime_error("\nprint 1 + nil;"),
            (ExecutionErrorKind::InvalidAddOperands, 2)
        );
        assert_eq!(
            runtime_error("print missing;"),
            (ExecutionErrorKind::UndefinedVariable("missing".into()), 1)
        );
        assert_eq!(
            runtime_error("missing = 1;"),
            (ExecutionErrorKind::UndefinedVariable("missing".into()), 1)
        );
        assert_eq!(
            runtime_error("\"x\"();"),
            (ExecutionErrorKind::NotCallable, 1)
        );
        assert_eq!(
            runtime_error("fun f(a) {} f();"),
            (
                ExecutionErrorKind::ArityMismatch {
                    expected: 1,
                    got: 0
                },
                1
            )
        );
        assert_eq!(
            runtime_error("print 1.x;"),
            (ExecutionErrorKind::PropertyOnNonInstance, 1)
        );
        assert_eq!(
            runtime_error("1.x = 2;"),
            (ExecutionErrorKind::FieldOnNonInstance, 1)
        );
        assert_eq!(
            runtime_error("class C {} print C().nope;"),
            (ExecutionErrorKind::UndefinedProperty("nope".into()), 1)
        );
        assert_eq!(
            runtime_error("var x = 1; class C < x {}"),
            (ExecutionErrorKind::SuperclassNotClass, 1)
        );
    }

    #[test]
    fn test_runtime_error_display() {
        let error = ExecutionErrorKind::UndefinedVariable("x".into()).at(3);
        assert_eq!(error.to_string(), "Undefined variable 'x'.\n[line 3]");
    }

    #[test]
    fn test_operand_errors_carry_operator() {
        let (kind, line) = runtime_error("var a = 1;\nprint a * \"b\";");
        assert_eq!(kind.operator().as_deref(), Some("*"));
        assert_eq!(
            kind.at(line).to_string(),
            "Operands must be numbers.\n[line 2]"
        );

        let (kind, _) = runtime_error("print -nil;");
        assert_eq!(kind.operator().as_deref(), Some("-"));
        let (kind, _) = runtime_error("print nil + 1;");
        assert_eq!(kind.operator().as_deref(), Some("+"));
        let (kind, _) = runtime_error("print x;");
        assert_eq!(kind.operator(), None);
    }

    #[test]
    fn test_call_depth_is_limited() {
        let (kind, line) = runtime_error("fun f() {\n  f();\n}\nf();");
        assert_eq!(kind, ExecutionErrorKind::StackOverflow);
        assert_eq!(line, 2);
    }

    #[test]
    fn test_deep_recursion_below_limit() {
        let (output, result) = run(
            "fun f(n) { if (n <= 0) return 0; return f(n - 1) + 1; } print f(1000);",
        );
        assert!(result.is_ok());
        assert_eq!(output, "1000
");
    }

    #[test]
    fn test_scope_restored_after_error_in_block() {
        let stdout = Rc::new(RefCell::new(Vec::<u8>::new()));
        let mut interpreter = Interpreter::new(stdout);
        let globals = interpreter.scope.clone();

        let mut diagnostics = Diagnostics::default();
        let tokens = tokenizer::tokens("{ var a = 1; a(); }", &mut diagnostics);
        let program = parser::program(&tokens, &mut Default::default(), &mut diagnostics);
        let locals = Resolver::new(&mut diagnostics).resolve(&program);
        interpreter.resolve(locals);

        assert!(interpreter.interpret(&program).is_err());
        assert!(Rc::ptr_eq(&interpreter.scope, &globals));
    }

    #[test]
    fn test_fields_shadow_methods() {
        let (output, result) = run(
            "class C { m() { return \"method\"; } } var c = C(); print c.m(); c.m = \"field\"; print c.m;",
        );
        assert!(result.is_ok());
        assert_eq!(output, "method\nfield\n");
    }
}
