use rustc_hash::FxHashMap;

use crate::{
    ast::{ClassDecl, ExprId, Expression, FunctionDecl, Program, Statement},
    diagnostic::{Diagnostic, Diagnostics},
    tokenizer::Token,
};

/// Scope distance of every name reference that resolved to a local. Names
/// missing from the table are globals.
pub type Locals = FxHashMap<ExprId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingState {
    Declared,
    Defined,
}

#[derive(Debug, Clone, Copy)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Debug, Clone, Copy)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolverError {
    #[error("Already a variable with this name in this scope.")]
    AlreadyDeclared,
    #[error("Can't read local variable in its own initializer.")]
    ReadInOwnInitializer,
    #[error("Can't return from top-level code.")]
    ReturnFromTopLevel,
    #[error("Can't return a value from an initializer.")]
    ReturnFromInitializer,
    #[error("Can't use 'this' outside of a class.")]
    ThisOutsideClass,
    #[error("Can't use 'super' outside of a class.")]
    SuperOutsideClass,
    #[error("Can't use 'super' in a class with no superclass.")]
    SuperWithoutSuperclass,
    #[error("A class can't inherit from itself.")]
    InheritsFromItself,
}

pub struct Resolver<'d> {
    scopes: Vec<FxHashMap<String, BindingState>>,
    function_type: FunctionType,
    class_type: ClassType,
    locals: Locals,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Resolver<'d> {
    pub fn new(diagnostics: &'d mut Diagnostics) -> Self {
        Resolver {
            scopes: Vec::new(),
            function_type: FunctionType::None,
            class_type: ClassType::None,
            locals: Locals::default(),
            diagnostics,
        }
    }

    /// Resolves the whole program. Every error is reported; resolution keeps
    /// going so one pass finds them all.
    pub fn resolve(mut self, program: &Program) -> Locals {
        self.resolve_statements(&program.0);
        tracing::debug!(count = self.locals.len(), "resolved locals");
        self.locals
    }

    fn error(&mut self, token: &Token, error: ResolverError) {
        self.diagnostics.push(Diagnostic::at(token, error));
    }

    fn resolve_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Block(statements) => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Statement::Expression(expression) => self.resolve_expression(expression),
            Statement::Var(name, initializer) => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expression(initializer);
                }
                self.define(name);
            }
            Statement::Function(decl) => {
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(decl, FunctionType::Function);
            }
            Statement::Print(expression) => self.resolve_expression(expression),
            Statement::If(condition, then_branch, else_branch) => {
                self.resolve_expression(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Statement::While(condition, body) => {
                self.resolve_expression(condition);
                self.resolve_statement(body);
            }
            Statement::Return(keyword, value) => {
                match self.function_type {
                    FunctionType::None => self.error(keyword, ResolverError::ReturnFromTopLevel),
                    FunctionType::Initializer if value.is_some() => {
                        self.error(keyword, ResolverError::ReturnFromInitializer)
                    }
                    _ => {}
                }

                if let Some(value) = value {
                    self.resolve_expression(value);
                }
            }
            Statement::Class(class) => self.resolve_class(class),
        }
    }

    fn resolve_class(&mut self, class: &ClassDecl) {
        let enclosing_class = self.class_type;
        self.class_type = ClassType::Class;

        self.declare(&class.name);
        self.define(&class.name);

        if let Some(superclass) = &class.superclass {
            if let Expression::Variable { name, .. } = superclass {
                if name.lexeme == class.name.lexeme {
                    self.error(name, ResolverError::InheritsFromItself);
                }
            }
            self.class_type = ClassType::Subclass;
            self.resolve_expression(superclass);

            self.begin_scope();
            self.define_keyword("super");
        }

        self.begin_scope();
        self.define_keyword("this");

        for method in &class.methods {
            let function_type = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, function_type);
        }

        self.end_scope();
        if class.superclass.is_some() {
            self.end_scope();
        }

        self.class_type = enclosing_class;
    }

    fn resolve_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Variable { id, name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&BindingState::Declared) {
                        self.error(name, ResolverError::ReadInOwnInitializer);
                    }
                }
                self.resolve_local(*id, &name.lexeme);
            }
            Expression::Assign { id, name, value } => {
                self.resolve_expression(value);
                self.resolve_local(*id, &name.lexeme);
            }
            Expression::Literal(_) => {}
            Expression::Grouping(expression) => self.resolve_expression(expression),
            Expression::Binary(left, _, right) | Expression::Logical(left, _, right) => {
                self.resolve_expression(left);
                self.resolve_expression(right);
            }
            Expression::Unary(_, right) => self.resolve_expression(right),
            Expression::Call { callee, args, .. } => {
                self.resolve_expression(callee);
                for arg in args {
                    self.resolve_expression(arg);
                }
            }
            Expression::Get { object, .. } => self.resolve_expression(object),
            Expression::Set { object, value, .. } => {
                self.resolve_expression(value);
                self.resolve_expression(object);
            }
            Expression::This { id, keyword } => {
                if matches!(self.class_type, ClassType::None) {
                    self.error(keyword, ResolverError::ThisOutsideClass);
                    return;
                }
                self.resolve_local(*id, "this");
            }
            Expression::Super { id, keyword, .. } => {
                match self.class_type {
                    ClassType::None => self.error(keyword, ResolverError::SuperOutsideClass),
                    ClassType::Class => self.error(keyword, ResolverError::SuperWithoutSuperclass),
                    ClassType::Subclass => {}
                }
                self.resolve_local(*id, "super");
            }
        }
    }

    fn resolve_local(&mut self, id: ExprId, name: &str) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name) {
                self.locals.insert(id, depth);
                return;
            }
        }
    }

    fn resolve_function(&mut self, decl: &FunctionDecl, function_type: FunctionType) {
        let enclosing_function = self.function_type;
        self.function_type = function_type;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_statements(&decl.body);
        self.end_scope();

        self.function_type = enclosing_function;
    }

    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            self.error(name, ResolverError::AlreadyDeclared);
            return;
        }
        scope.insert(name.lexeme.clone(), BindingState::Declared);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), BindingState::Defined);
        }
    }

    fn define_keyword(&mut self, keyword: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(keyword.to_string(), BindingState::Defined);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ast::ExprIds, parser, tokenizer};

    fn resolve(source: &str) -> (Program, Locals, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokenizer::tokens(source, &mut diagnostics);
        let program = parser::program(&tokens, &mut ExprIds::default(), &mut diagnostics);
        assert!(!diagnostics.has_errors(), "{diagnostics}");
        let locals = Resolver::new(&mut diagnostics).resolve(&program);
        (program, locals, diagnostics)
    }

    fn errors(source: &str) -> Vec<String> {
        resolve(source).2.messages()
    }

    #[test]
    fn test_globals_stay_unresolved() {
        let (_, locals, diagnostics) = resolve("var a = 1; print a;");
        assert!(!diagnostics.has_errors());
        assert!(locals.is_empty());
    }

    #[test]
    fn test_hop_counts() {
        let (program, locals, _) = resolve("{ var a = 1; { { print a; } } }");
        let Statement::Block(outer) = &program.0[0] else {
            panic!("expected block");
        };
        let Statement::Block(middle) = &outer[1] else {
            panic!("expected block");
        };
        let Statement::Block(inner) = &middle[0] else {
            panic!("expected block");
        };
        let Statement::Print(Expression::Variable { id, .. }) = &inner[0] else {
            panic!("expected print");
        };
        assert_eq!(locals.get(id), Some(&2));
    }

    #[test]
    fn test_identical_references_resolve_independently() {
        let (program, locals, _) = resolve("var a; { print a; var a; print a; }");
        let Statement::Block(statements) = &program.0[1] else {
            panic!("expected block");
        };
        let ids: Vec<_> = statements
            .iter()
            .filter_map(|statement| match statement {
                Statement::Print(Expression::Variable { id, .. }) => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(locals.get(&ids[0]), None);
        assert_eq!(locals.get(&ids[1]), Some(&0));
    }

    #[test]
    fn test_own_initializer() {
        assert_eq!(
            errors("{ var a = a; }"),
            vec!["[line 1] Error at 'a': Can't read local variable in its own initializer."]
        );
        assert!(errors("var a = a;").is_empty());
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        assert_eq!(
            errors("{ var a; var a; }"),
            vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
        );
        assert!(errors("{ var a; { var a; } } var b; var b;").is_empty());
        assert_eq!(
            errors("fun f(a, a) {}"),
            vec!["[line 1] Error at 'a': Already a variable with this name in this scope."]
        );
    }

    #[test]
    fn test_return_rules() {
        assert_eq!(
            errors("return 1;"),
            vec!["[line 1] Error at 'return': Can't return from top-level code."]
        );
        assert_eq!(
            errors("class A { init() { return 1; } }"),
            vec!["[line 1] Error at 'return': Can't return a value from an initializer."]
        );
        assert!(errors("class A { init() { return; } }").is_empty());
    }

    #[test]
    fn test_this_and_super_rules() {
        assert_eq!(
            errors("print this;"),
            vec!["[line 1] Error at 'this': Can't use 'this' outside of a class."]
        );
        assert_eq!(
            errors("fun f() { super.m(); }"),
            vec!["[line 1] Error at 'super': Can't use 'super' outside of a class."]
        );
        assert_eq!(
            errors("class A { m() { super.m(); } }"),
            vec!["[line 1] Error at 'super': Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn test_class_cannot_inherit_from_itself() {
        assert_eq!(
            errors("class A < A {}"),
            vec!["[line 1] Error at 'A': A class can't inherit from itself."]
        );
    }

    #[test]
    fn test_reports_every_error() {
        assert_eq!(
            errors("return;\nprint this;\n{ var x; var x; }"),
            vec![
                "[line 1] Error at 'return': Can't return from top-level code.",
                "[line 2] Error at 'this': Can't use 'this' outside of a class.",
                "[line 3] Error at 'x': Already a variable with this name in this scope.",
            ]
        );
    }
}
