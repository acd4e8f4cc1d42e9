use std::{
    cell::{Cell, RefCell},
    fmt::Display,
    rc::Rc,
};

use crate::{
    ast::{
        ClassDecl, ExprId, ExprIds, Expression, FunctionDecl, InfixOperator, Literal,
        LogicalOperator, Operator, Program, Statement, UnaryOperator,
    },
    diagnostic::{Diagnostic, Diagnostics, Location},
    tokenizer::{Token, TokenType},
};

/// Upper bound on parameters in a declaration and arguments in a call.
pub const MAX_ARITY: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Function,
    Method,
}

impl Display for FunctionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionKind::Function => write!(f, "function"),
            FunctionKind::Method => write!(f, "method"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Expect expression.")]
    ExpectedExpression,
    #[error("Expect {0}.")]
    Expected(&'static str),
    #[error("Expect {0} name.")]
    ExpectedName(FunctionKind),
    #[error("Expect '(' after {0} name.")]
    ExpectedParameters(FunctionKind),
    #[error("Expect '{{' before {0} body.")]
    ExpectedBody(FunctionKind),
    #[error("Invalid assignment target.")]
    InvalidAssignmentTarget,
    #[error("Can't have more than 255 {0}.")]
    TooMany(&'static str),
}

/// A parse failure that abandons the current declaration. `tokens` starts at
/// the offending token so recovery can resume from there.
#[derive(Debug)]
struct ParseErrorWithContext<'a> {
    error: ParseError,
    rules: String,
    tokens: &'a [Token],
}

type ParseResult<'a, T> = Result<(T, &'a [Token]), ParseErrorWithContext<'a>>;

#[derive(Debug)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
    ids: Cell<ExprIds>,
    errors: RefCell<Vec<Diagnostic>>,
    end_line: usize,
}

impl ParseContext {
    fn new(ids: ExprIds, end_line: usize) -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
            ids: Cell::new(ids),
            errors: RefCell::new(Vec::new()),
            end_line,
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard<'_> {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn fresh_id(&self) -> ExprId {
        let mut ids = self.ids.get();
        let id = ids.fresh();
        self.ids.set(ids);
        id
    }

    fn fail<'a>(&self, tokens: &'a [Token], error: ParseError) -> ParseErrorWithContext<'a> {
        ParseErrorWithContext {
            error,
            rules: self.stack.borrow().join(" > "),
            tokens,
        }
    }

    /// Records an error that does not abandon the current declaration.
    fn error(&self, tokens: &[Token], error: ParseError) {
        let diagnostic = self.diagnostic(tokens, error);
        self.errors.borrow_mut().push(diagnostic);
    }

    fn report(&self, error: ParseErrorWithContext) {
        tracing::debug!(rules = %error.rules, error = %error.error, "abandoning declaration");
        let diagnostic = self.diagnostic(error.tokens, error.error);
        self.errors.borrow_mut().push(diagnostic);
    }

    fn diagnostic(&self, tokens: &[Token], error: ParseError) -> Diagnostic {
        match tokens.first() {
            Some(token) => Diagnostic::at(token, error),
            None => Diagnostic::new(self.end_line, Location::End, error),
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

/// Parses a whole token stream. Declarations that fail to parse are reported
/// to `diagnostics` and left out of the returned program.
pub fn program(tokens: &[Token], ids: &mut ExprIds, diagnostics: &mut Diagnostics) -> Program {
    let end_line = tokens.last().map_or(1, |token| token.line);
    let context = ParseContext::new(*ids, end_line);
    let mut statements = Vec::new();
    let mut tokens = tokens;

    while !is_at_end(tokens) {
        let (statement, rest) = declaration(&context, tokens);
        statements.extend(statement);
        tokens = rest;
    }

    *ids = context.ids.get();
    for error in context.errors.into_inner() {
        diagnostics.push(error);
    }

    tracing::debug!(count = statements.len(), "parsed program");
    Program(statements)
}

fn is_at_end(tokens: &[Token]) -> bool {
    matches!(tokens.first().map(Token::token_type), None | Some(TokenType::Eof))
}

fn check(tokens: &[Token], token_type: &TokenType) -> bool {
    tokens.first().map(Token::token_type) == Some(token_type)
}

/// Skips past the offending token to the next likely statement boundary.
fn synchronize(tokens: &[Token]) -> &[Token] {
    let mut tokens = tokens;
    loop {
        let Some(token) = tokens.first() else {
            return tokens;
        };
        if token.token_type == TokenType::Eof {
            return tokens;
        }
        tokens = &tokens[1..];
        if token.token_type == TokenType::Semicolon {
            return tokens;
        }
        if matches!(
            tokens.first().map(Token::token_type),
            Some(
                TokenType::Class
                    | TokenType::Fun
                    | TokenType::Var
                    | TokenType::For
                    | TokenType::If
                    | TokenType::While
                    | TokenType::Print
                    | TokenType::Return
            )
        ) {
            return tokens;
        }
    }
}

fn declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> (Option<Statement>, &'a [Token]) {
    let _guard = context.push("declaration");
    let result = match tokens.first().map(Token::token_type) {
        Some(TokenType::Class) => class_declaration(context, &tokens[1..]),
        Some(TokenType::Fun) => function(context, &tokens[1..], FunctionKind::Function)
            .map(|(decl, rest)| (Statement::Function(Rc::new(decl)), rest)),
        Some(TokenType::Var) => var_declaration(context, &tokens[1..]),
        _ => statement(context, tokens),
    };

    match result {
        Ok((statement, rest)) => (Some(statement), rest),
        Err(error) => {
            let rest = synchronize(error.tokens);
            context.report(error);
            (None, rest)
        }
    }
}

fn class_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("class_declaration");
    let (name, tokens) = match_identifier(context, tokens, ParseError::Expected("class name"))?;

    let (superclass, tokens) = if check(tokens, &TokenType::Less) {
        let (superclass, rest) =
            match_identifier(context, &tokens[1..], ParseError::Expected("superclass name"))?;
        let superclass = Expression::Variable {
            id: context.fresh_id(),
            name: superclass,
        };
        (Some(superclass), rest)
    } else {
        (None, tokens)
    };

    let mut tokens = consume(
        context,
        tokens,
        TokenType::LeftBrace,
        ParseError::Expected("'{' before class body"),
    )?;

    let mut methods = Vec::new();
    while !check(tokens, &TokenType::RightBrace) && !is_at_end(tokens) {
        let (method, rest) = function(context, tokens, FunctionKind::Method)?;
        methods.push(Rc::new(method));
        tokens = rest;
    }

    let tokens = consume(
        context,
        tokens,
        TokenType::RightBrace,
        ParseError::Expected("'}' after class body"),
    )?;

    Ok((
        Statement::Class(ClassDecl {
            name,
            superclass,
            methods,
        }),
        tokens,
    ))
}

fn function<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    kind: FunctionKind,
) -> ParseResult<'a, FunctionDecl> {
    let _guard = context.push("function");
    let (name, tokens) = match_identifier(context, tokens, ParseError::ExpectedName(kind))?;
    let mut tokens = consume(
        context,
        tokens,
        TokenType::LeftParen,
        ParseError::ExpectedParameters(kind),
    )?;

    let mut params = Vec::new();
    if !check(tokens, &TokenType::RightParen) {
        loop {
            if params.len() >= MAX_ARITY {
                context.error(tokens, ParseError::TooMany("parameters"));
            }
            let (param, rest) =
                match_identifier(context, tokens, ParseError::Expected("parameter name"))?;
            params.push(param);
            tokens = rest;

            if !check(tokens, &TokenType::Comma) {
                break;
            }
            tokens = &tokens[1..];
        }
    }

    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        ParseError::Expected("')' after parameters"),
    )?;
    let tokens = consume(
        context,
        tokens,
        TokenType::LeftBrace,
        ParseError::ExpectedBody(kind),
    )?;
    let (body, tokens) = block(context, tokens)?;

    Ok((FunctionDecl { name, params, body }, tokens))
}

fn var_declaration<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("var_declaration");
    let (name, tokens) = match_identifier(context, tokens, ParseError::Expected("variable name"))?;
    let (initializer, tokens) = if check(tokens, &TokenType::Equal) {
        let (expr, rest) = expression(context, &tokens[1..])?;
        (Some(expr), rest)
    } else {
        (None, tokens)
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        ParseError::Expected("';' after variable declaration"),
    )?;
    Ok((Statement::Var(name, initializer), tokens))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("statement");
    match tokens.first().map(Token::token_type) {
        Some(TokenType::Print) => print_statement(context, &tokens[1..]),
        Some(TokenType::LeftBrace) => {
            let (statements, rest) = block(context, &tokens[1..])?;
            Ok((Statement::Block(statements), rest))
        }
        Some(TokenType::If) => if_statement(context, &tokens[1..]),
        Some(TokenType::While) => while_statement(context, &tokens[1..]),
        Some(TokenType::For) => for_statement(context, &tokens[1..]),
        Some(TokenType::Return) => return_statement(context, tokens),
        _ => expression_statement(context, tokens),
    }
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("while_statement");
    let tokens = consume(
        context,
        tokens,
        TokenType::LeftParen,
        ParseError::Expected("'(' after 'while'"),
    )?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        ParseError::Expected("')' after condition"),
    )?;
    let (body, tokens) = statement(context, tokens)?;
    Ok((Statement::While(condition, Box::new(body)), tokens))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("if_statement");
    let tokens = consume(
        context,
        tokens,
        TokenType::LeftParen,
        ParseError::Expected("'(' after 'if'"),
    )?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        ParseError::Expected("')' after if condition"),
    )?;
    let (then_branch, tokens) = statement(context, tokens)?;
    if check(tokens, &TokenType::Else) {
        let (else_branch, tokens) = statement(context, &tokens[1..])?;
        Ok((
            Statement::If(
                condition,
                Box::new(then_branch),
                Some(Box::new(else_branch)),
            ),
            tokens,
        ))
    } else {
        Ok((
            Statement::If(condition, Box::new(then_branch), None),
            tokens,
        ))
    }
}

/// `for` has no node of its own: it becomes an initializer followed by a
/// `while` whose body runs the increment last.
fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("for_statement");
    let tokens = consume(
        context,
        tokens,
        TokenType::LeftParen,
        ParseError::Expected("'(' after 'for'"),
    )?;

    let (initializer, tokens) = match tokens.first().map(Token::token_type) {
        Some(TokenType::Semicolon) => (None, &tokens[1..]),
        Some(TokenType::Var) => {
            let (declaration, rest) = var_declaration(context, &tokens[1..])?;
            (Some(declaration), rest)
        }
        _ => {
            let (statement, rest) = expression_statement(context, tokens)?;
            (Some(statement), rest)
        }
    };

    let (condition, tokens) = if check(tokens, &TokenType::Semicolon) {
        (Expression::Literal(Literal::Boolean(true)), tokens)
    } else {
        expression(context, tokens)?
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        ParseError::Expected("';' after loop condition"),
    )?;

    let (increment, tokens) = if check(tokens, &TokenType::RightParen) {
        (None, tokens)
    } else {
        let (increment, rest) = expression(context, tokens)?;
        (Some(increment), rest)
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::RightParen,
        ParseError::Expected("')' after for clauses"),
    )?;

    let (mut body, tokens) = statement(context, tokens)?;

    if let Some(increment) = increment {
        body = Statement::Block(vec![body, Statement::Expression(increment)]);
    }
    body = Statement::While(condition, Box::new(body));
    if let Some(initializer) = initializer {
        body = Statement::Block(vec![initializer, body]);
    }

    Ok((body, tokens))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("return_statement");
    let keyword = tokens[0].clone();
    let tokens = &tokens[1..];
    let (value, tokens) = if check(tokens, &TokenType::Semicolon) {
        (None, tokens)
    } else {
        let (value, rest) = expression(context, tokens)?;
        (Some(value), rest)
    };
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        ParseError::Expected("';' after return value"),
    )?;
    Ok((Statement::Return(keyword, value), tokens))
}

fn block<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Vec<Statement>> {
    let _guard = context.push("block");
    let mut statements = Vec::new();
    let mut tokens = tokens;

    while !check(tokens, &TokenType::RightBrace) && !is_at_end(tokens) {
        let (statement, rest) = declaration(context, tokens);
        statements.extend(statement);
        tokens = rest;
    }

    let tokens = consume(
        context,
        tokens,
        TokenType::RightBrace,
        ParseError::Expected("'}' after block"),
    )?;
    Ok((statements, tokens))
}

fn expression_statement<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("expression_statement");
    let (expr, tokens) = expression(context, tokens)?;
    let tokens = consume(
        context,
        tokens,
        TokenType::Semicolon,
        ParseError::Expected("';' after expression"),
    )?;
    Ok((Statement::Expression(expr), tokens))
}

fn print_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("print_statement");
    let (expr, rest) = expression(context, tokens)?;
    let tokens = consume(
        context,
        rest,
        TokenType::Semicolon,
        ParseError::Expected("';' after value"),
    )?;
    Ok((Statement::Print(expr), tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("expression");
    assignment(context, tokens)
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("assignment");
    let (expr, rest) = logical_or(context, tokens)?;

    if !check(rest, &TokenType::Equal) {
        return Ok((expr, rest));
    }

    let equals = rest;
    let (value, rest) = assignment(context, &rest[1..])?;
    match expr {
        Expression::Variable { id, name } => Ok((
            Expression::Assign {
                id,
                name,
                value: Box::new(value),
            },
            rest,
        )),
        Expression::Get { object, name } => Ok((
            Expression::Set {
                object,
                name,
                value: Box::new(value),
            },
            rest,
        )),
        expr => {
            context.error(equals, ParseError::InvalidAssignmentTarget);
            Ok((expr, rest))
        }
    }
}

fn logical<'a>(
    context: &ParseContext,
    operand: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    token_type: TokenType,
    operator: LogicalOperator,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = operand(context, tokens)?;

    while check(tokens, &token_type) {
        let (right, rest) = operand(context, &tokens[1..])?;
        expr = Expression::Logical(Box::new(expr), operator, Box::new(right));
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    operator: impl Fn(&Token) -> Option<InfixOperator>,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let op = match operator(token) {
            Some(op) => Operator {
                kind: op,
                line: token.line,
            },
            None => break,
        };
        tokens = &tokens[1..];
        let (right, rest) = precedence(context, tokens)?;
        expr = Expression::Binary(Box::new(expr), op, Box::new(right));
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_or");
    logical(context, logical_and, TokenType::Or, LogicalOperator::Or, tokens)
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("logical_and");
    logical(context, equality, TokenType::And, LogicalOperator::And, tokens)
}

fn equality<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("equality");
    binary(
        context,
        comparison,
        |token| match token.token_type() {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::BangEqual => Some(InfixOperator::NotEqual),
            _ => None,
        },
        tokens,
    )
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |token| match token.token_type() {
            TokenType::Less => Some(InfixOperator::LessThan),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            TokenType::Greater => Some(InfixOperator::GreaterThan),
            TokenType::GreaterEqual => Some(InfixOperator::GreaterThanOrEqual),
            _ => None,
        },
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |token| match token.token_type() {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        unary,
        |token| match token.token_type() {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            _ => None,
        },
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("unary");

    let Some(token) = tokens.first() else {
        return call(context, tokens);
    };
    let kind = match token.token_type() {
        TokenType::Minus => UnaryOperator::Negate,
        TokenType::Bang => UnaryOperator::Not,
        _ => return call(context, tokens),
    };

    let (right, rest) = unary(context, &tokens[1..])?;
    Ok((
        Expression::Unary(
            Operator {
                kind,
                line: token.line,
            },
            Box::new(right),
        ),
        rest,
    ))
}

fn call<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("call");
    let (mut expr, mut tokens) = primary(context, tokens)?;

    loop {
        match tokens.first().map(Token::token_type) {
            Some(TokenType::LeftParen) => {
                let (call, rest) = finish_call(context, expr, &tokens[1..])?;
                expr = call;
                tokens = rest;
            }
            Some(TokenType::Dot) => {
                let (name, rest) = match_identifier(
                    context,
                    &tokens[1..],
                    ParseError::Expected("property name after '.'"),
                )?;
                expr = Expression::Get {
                    object: Box::new(expr),
                    name,
                };
                tokens = rest;
            }
            _ => break,
        }
    }

    Ok((expr, tokens))
}

fn finish_call<'a>(
    context: &ParseContext,
    callee: Expression,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let mut tokens = tokens;
    let mut args = Vec::new();

    if !check(tokens, &TokenType::RightParen) {
        loop {
            if args.len() >= MAX_ARITY {
                context.error(tokens, ParseError::TooMany("arguments"));
            }
            let (arg, rest) = expression(context, tokens)?;
            args.push(arg);
            tokens = rest;

            if !check(tokens, &TokenType::Comma) {
                break;
            }
            tokens = &tokens[1..];
        }
    }

    let (paren, tokens) = match_token(
        context,
        tokens,
        TokenType::RightParen,
        ParseError::Expected("')' after arguments"),
    )?;

    Ok((
        Expression::Call {
            callee: Box::new(callee),
            paren,
            args,
        },
        tokens,
    ))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.fail(tokens, ParseError::ExpectedExpression));
    };

    match token.token_type() {
        TokenType::Number(n) => Ok((Expression::Literal(Literal::Number(*n)), &tokens[1..])),
        TokenType::String(s) => Ok((
            Expression::Literal(Literal::String(s.clone())),
            &tokens[1..],
        )),
        TokenType::True => Ok((Expression::Literal(Literal::Boolean(true)), &tokens[1..])),
        TokenType::False => Ok((Expression::Literal(Literal::Boolean(false)), &tokens[1..])),
        TokenType::Nil => Ok((Expression::Literal(Literal::Nil), &tokens[1..])),
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(
                context,
                rest,
                TokenType::RightParen,
                ParseError::Expected("')' after expression"),
            )?;
            Ok((Expression::Grouping(Box::new(expr)), tokens))
        }
        TokenType::Identifier => Ok((
            Expression::Variable {
                id: context.fresh_id(),
                name: token.clone(),
            },
            &tokens[1..],
        )),
        TokenType::This => Ok((
            Expression::This {
                id: context.fresh_id(),
                keyword: token.clone(),
            },
            &tokens[1..],
        )),
        TokenType::Super => {
            let tokens = consume(
                context,
                &tokens[1..],
                TokenType::Dot,
                ParseError::Expected("'.' after 'super'"),
            )?;
            let (method, tokens) = match_identifier(
                context,
                tokens,
                ParseError::Expected("superclass method name"),
            )?;
            Ok((
                Expression::Super {
                    id: context.fresh_id(),
                    keyword: token.clone(),
                    method,
                },
                tokens,
            ))
        }
        _ => Err(context.fail(tokens, ParseError::ExpectedExpression)),
    }
}

fn match_token<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
    error: ParseError,
) -> ParseResult<'a, Token> {
    match tokens.first() {
        Some(token) if token.token_type == token_type => Ok((token.clone(), &tokens[1..])),
        _ => Err(context.fail(tokens, error)),
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
    error: ParseError,
) -> Result<&'a [Token], ParseErrorWithContext<'a>> {
    match_token(context, tokens, token_type, error).map(|(_, rest)| rest)
}

fn match_identifier<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    error: ParseError,
) -> ParseResult<'a, Token> {
    match_token(context, tokens, TokenType::Identifier, error)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> (Program, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let tokens = tokens(source, &mut diagnostics);
        let program = program(&tokens, &mut ExprIds::default(), &mut diagnostics);
        (program, diagnostics)
    }

    fn parse_ok(source: &str) -> String {
        let (program, diagnostics) = parse(source);
        assert!(!diagnostics.has_errors(), "{diagnostics}");
        program.to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(
            parse_ok("print 1 + 2 * 3 - -4 / (5);"),
            "(print (- (+ 1 (* 2 3)) (/ (- 4) (group 5))))\n"
        );
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(parse_ok("1 - 2 - 3;"), "(; (- (- 1 2) 3))\n");
    }

    #[test]
    fn test_logical_binds_looser_than_equality() {
        assert_eq!(
            parse_ok("a or b and c == d;"),
            "(; (or a (and b (== c d))))\n"
        );
    }

    #[test]
    fn test_assignment_is_right_associative() {
        assert_eq!(parse_ok("a = b = 1;"), "(; (= a (= b 1)))\n");
    }

    #[test]
    fn test_call_and_property_chain() {
        assert_eq!(
            parse_ok("a.b(1).c = 2;"),
            "(; (= (. (call (. a b) 1) c) 2))\n"
        );
    }

    #[test]
    fn test_for_desugars_to_while() {
        assert_eq!(
            parse_ok("for (var i = 0; i < 3; i = i + 1) print i;"),
            "(block (var i = 0) (while (< i 3) (block (print i) (; (= i (+ i 1))))))\n"
        );
    }

    #[test]
    fn test_for_without_clauses() {
        assert_eq!(parse_ok("for (;;) print 1;"), "(while true (print 1))\n");
    }

    #[test]
    fn test_class_with_superclass() {
        assert_eq!(
            parse_ok("class B < A { init(x) { this.x = x; } go() { return super.go(); } }"),
            "(class B < A (fun init(x) (; (= (. this x) x))) (fun go() (return (call (super go)))))\n"
        );
    }

    #[test]
    fn test_invalid_assignment_target_does_not_abort() {
        let (program, diagnostics) = parse("1 + 2 = 3; print 4;");
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 1] Error at '=': Invalid assignment target."]
        );
        assert_eq!(program.0.len(), 2);
    }

    #[test]
    fn test_recovers_once_per_broken_statement() {
        let (program, diagnostics) = parse("var = 1;\nprint (1 + ;\nprint 3;");
        assert_eq!(
            diagnostics.messages(),
            vec![
                "[line 1] Error at '=': Expect variable name.",
                "[line 2] Error at ';': Expect expression.",
            ]
        );
        assert_eq!(program.to_string(), "(print 3)\n");
    }

    #[test]
    fn test_recovers_inside_block() {
        let (program, diagnostics) = parse("{ print ; print 2; }");
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 1] Error at ';': Expect expression."]
        );
        assert_eq!(program.to_string(), "(block (print 2))\n");
    }

    #[test]
    fn test_error_at_end() {
        let (_, diagnostics) = parse("print 1");
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 1] Error at end: Expect ';' after value."]
        );
    }

    #[test]
    fn test_too_many_arguments_is_reported() {
        let args = vec!["1"; 256].join(", ");
        let (program, diagnostics) = parse(&format!("f({args});"));
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 1] Error at '1': Can't have more than 255 arguments."]
        );
        assert_eq!(program.0.len(), 1);
    }

    #[test]
    fn test_too_many_parameters_is_reported() {
        let params = (0..=MAX_ARITY)
            .map(|i| format!("p{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let (program, diagnostics) = parse(&format!("fun f({params}) {{}}"));
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 1] Error at 'p255': Can't have more than 255 parameters."]
        );
        assert_eq!(program.0.len(), 1);
        let Statement::Function(decl) = &program.0[0] else {
            panic!("expected a function declaration, got {}", program.0[0]);
        };
        assert_eq!(decl.params.len(), MAX_ARITY + 1);
    }

    #[test]
    fn test_method_error_names_kind() {
        let (_, diagnostics) = parse("class A { 1 }");
        assert_eq!(
            diagnostics.messages(),
            vec!["[line 1] Error at '1': Expect method name."]
        );
    }

    #[test]
    fn test_ids_continue_across_programs() {
        let mut diagnostics = Diagnostics::default();
        let mut ids = ExprIds::default();
        let first = tokens("a;", &mut diagnostics);
        let second = tokens("b;", &mut diagnostics);
        let first = program(&first, &mut ids, &mut diagnostics);
        let second = program(&second, &mut ids, &mut diagnostics);
        let id = |program: &Program| match &program.0[0] {
            Statement::Expression(Expression::Variable { id, .. }) => *id,
            other => panic!("unexpected statement {other}"),
        };
        assert_ne!(id(&first), id(&second));
    }
}
