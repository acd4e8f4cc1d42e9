use std::{fmt::Display, rc::Rc};

use crate::tokenizer::Token;

/// Identity of a name-referencing expression node. The resolver keys its
/// scope-distance table by this, never by structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

/// Allocator for [`ExprId`]s. A session keeps one for its whole lifetime so
/// that nodes parsed from different REPL lines never share an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprIds {
    next: u32,
}

impl ExprIds {
    pub fn fresh(&mut self) -> ExprId {
        let id = ExprId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Default)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug, Clone)]
pub enum Statement {
    Expression(Expression),
    Print(Expression),
    Var(Token, Option<Expression>),
    Block(Vec<Statement>),
    If(Expression, Box<Statement>, Option<Box<Statement>>),
    While(Expression, Box<Statement>),
    Function(Rc<FunctionDecl>),
    Return(Token, Option<Expression>),
    Class(ClassDecl),
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: Token,
    /// Always an [`Expression::Variable`] when present.
    pub superclass: Option<Expression>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Literal),
    Grouping(Box<Expression>),
    Unary(Operator<UnaryOperator>, Box<Expression>),
    Binary(Box<Expression>, Operator<InfixOperator>, Box<Expression>),
    Logical(Box<Expression>, LogicalOperator, Box<Expression>),
    Variable {
        id: ExprId,
        name: Token,
    },
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        paren: Token,
        args: Vec<Expression>,
    },
    Get {
        object: Box<Expression>,
        name: Token,
    },
    Set {
        object: Box<Expression>,
        name: Token,
        value: Box<Expression>,
    },
    This {
        id: ExprId,
        keyword: Token,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Nil,
}

/// An operator together with the line it was written on, for runtime errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator<T> {
    pub kind: T,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.0 {
            writeln!(f, "{}", statement)?;
        }
        Ok(())
    }
}

fn write_statements(f: &mut std::fmt::Formatter<'_>, statements: &[Statement]) -> std::fmt::Result {
    for statement in statements {
        write!(f, " {}", statement)?;
    }
    Ok(())
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Expression(expr) => write!(f, "(; {})", expr),
            Statement::Print(expr) => write!(f, "(print {})", expr),
            Statement::Var(name, None) => write!(f, "(var {})", name.lexeme),
            Statement::Var(name, Some(expr)) => write!(f, "(var {} = {})", name.lexeme, expr),
            Statement::Block(statements) => {
                write!(f, "(block")?;
                write_statements(f, statements)?;
                write!(f, ")")
            }
            Statement::If(condition, then_branch, else_branch) => {
                write!(f, "(if {} {}", condition, then_branch)?;
                if let Some(else_branch) = else_branch {
                    write!(f, " {}", else_branch)?;
                }
                write!(f, ")")
            }
            Statement::While(condition, body) => write!(f, "(while {} {})", condition, body),
            Statement::Function(decl) => write!(f, "{}", decl),
            Statement::Return(_, None) => write!(f, "(return)"),
            Statement::Return(_, Some(expr)) => write!(f, "(return {})", expr),
            Statement::Class(class) => {
                write!(f, "(class {}", class.name.lexeme)?;
                if let Some(superclass) = &class.superclass {
                    write!(f, " < {}", superclass)?;
                }
                for method in &class.methods {
                    write!(f, " {}", method)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Display for FunctionDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(fun {}(", self.name.lexeme)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", param.lexeme)?;
        }
        write!(f, ")")?;
        write_statements(f, &self.body)?;
        write!(f, ")")
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{}", literal),
            Expression::Grouping(expr) => write!(f, "(group {})", expr),
            Expression::Unary(op, right) => write!(f, "({} {})", op.kind, right),
            Expression::Binary(left, op, right) => write!(f, "({} {} {})", op.kind, left, right),
            Expression::Logical(left, op, right) => write!(f, "({} {} {})", op, left, right),
            Expression::Variable { name, .. } => write!(f, "{}", name.lexeme),
            Expression::Assign { name, value, .. } => write!(f, "(= {} {})", name.lexeme, value),
            Expression::Call { callee, args, .. } => {
                write!(f, "(call {}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Get { object, name } => write!(f, "(. {} {})", object, name.lexeme),
            Expression::Set {
                object,
                name,
                value,
            } => write!(f, "(= (. {} {}) {})", object, name.lexeme, value),
            Expression::This { .. } => write!(f, "this"),
            Expression::Super { method, .. } => write!(f, "(super {})", method.lexeme),
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

impl Display for InfixOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InfixOperator::Equal => write!(f, "=="),
            InfixOperator::NotEqual => write!(f, "!="),
            InfixOperator::LessThan => write!(f, "<"),
            InfixOperator::LessThanOrEqual => write!(f, "<="),
            InfixOperator::GreaterThan => write!(f, ">"),
            InfixOperator::GreaterThanOrEqual => write!(f, ">="),
            InfixOperator::Plus => write!(f, "+"),
            InfixOperator::Minus => write!(f, "-"),
            InfixOperator::Multiply => write!(f, "*"),
            InfixOperator::Divide => write!(f, "/"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "!"),
        }
    }
}

impl Display for LogicalOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "and"),
            LogicalOperator::Or => write!(f, "or"),
        }
    }
}
