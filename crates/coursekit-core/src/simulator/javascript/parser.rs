//! Recursive-descent parser with precedence climbing for binary operators.

use std::rc::Rc;

use super::ast::{
    BinaryOp, DeclKind, Expr, Function, FunctionBody, LogicalOp, Param, PropKey, Property, Stmt,
    SwitchCase, Target, TemplatePiece, UnaryOp,
};
use super::lexer::{tokenize, SyntaxError, TemplateChunk, Token, TokenKind};

/// Nesting limit for expressions and statements.
const MAX_NESTING: usize = 200;

/// Keywords the subset deliberately rejects.
const UNSUPPORTED: [&str; 8] = [
    "class", "async", "await", "yield", "import", "export", "with", "debugger",
];

type ParseResult<T> = Result<T, SyntaxError>;

/// Parses a whole program.
pub fn parse_program(source: &str) -> ParseResult<Vec<Stmt>> {
    let mut parser = Parser::new(tokenize(source, 1)?);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

enum Binary {
    Arithmetic(BinaryOp),
    Logical(LogicalOp),
}

fn binary_operator(punct: &str) -> Option<(u8, Binary)> {
    use BinaryOp as B;
    let entry = match punct {
        "??" => (1, Binary::Logical(LogicalOp::Nullish)),
        "||" => (2, Binary::Logical(LogicalOp::Or)),
        "&&" => (3, Binary::Logical(LogicalOp::And)),
        "==" => (6, Binary::Arithmetic(B::Eq)),
        "!=" => (6, Binary::Arithmetic(B::NotEq)),
        "===" => (6, Binary::Arithmetic(B::StrictEq)),
        "!==" => (6, Binary::Arithmetic(B::StrictNotEq)),
        "<" => (7, Binary::Arithmetic(B::Lt)),
        "<=" => (7, Binary::Arithmetic(B::LtEq)),
        ">" => (7, Binary::Arithmetic(B::Gt)),
        ">=" => (7, Binary::Arithmetic(B::GtEq)),
        "in" => (7, Binary::Arithmetic(B::In)),
        "instanceof" => (7, Binary::Arithmetic(B::InstanceOf)),
        "+" => (9, Binary::Arithmetic(B::Add)),
        "-" => (9, Binary::Arithmetic(B::Sub)),
        "*" => (10, Binary::Arithmetic(B::Mul)),
        "/" => (10, Binary::Arithmetic(B::Div)),
        "%" => (10, Binary::Arithmetic(B::Rem)),
        "**" => (11, Binary::Arithmetic(B::Pow)),
        _ => return None,
    };
    Some(entry)
}

fn assignment_operator(punct: &str) -> Option<Option<BinaryOp>> {
    match punct {
        "=" => Some(None),
        "+=" => Some(Some(BinaryOp::Add)),
        "-=" => Some(Some(BinaryOp::Sub)),
        "*=" => Some(Some(BinaryOp::Mul)),
        "/=" => Some(Some(BinaryOp::Div)),
        "%=" => Some(Some(BinaryOp::Rem)),
        "**=" => Some(Some(BinaryOp::Pow)),
        _ => None,
    }
}

/// Converts an already parsed expression into an assignment target.
fn to_target(expr: Expr, line: u32) -> ParseResult<Target> {
    match expr {
        Expr::Ident(name) => Ok(Target::Ident(name)),
        Expr::Member {
            object,
            property,
            optional: false,
        } => Ok(Target::Member { object, property }),
        Expr::Index { object, index } => Ok(Target::Index { object, index }),
        Expr::Array(items) => items
            .into_iter()
            .map(|item| to_target(item, line).map(Some))
            .collect::<ParseResult<_>>()
            .map(Target::Array),
        Expr::Object(props) => props
            .into_iter()
            .map(|prop| match prop {
                Property::KeyValue(PropKey::Static(key), value) => {
                    Ok((key, to_target(value, line)?))
                }
                _ => Err(SyntaxError::new("Invalid destructuring pattern", line)),
            })
            .collect::<ParseResult<_>>()
            .map(Target::Object),
        _ => Err(SyntaxError::new("Invalid left-hand side in assignment", line)),
    }
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------------

    fn current(&self) -> &Token {
        // the lexer always ends with Eof, and `advance` never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn line(&self) -> u32 {
        self.current().line
    }

    fn at_eof(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn is_punct(&self, punct: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Punct(p) if *p == punct)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Ident(name) if name == word)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> SyntaxError {
        let token = self.current();
        let message = match &token.kind {
            TokenKind::Eof => "Unexpected end of input".to_string(),
            kind => format!("Unexpected token '{kind}'"),
        };
        SyntaxError::new(message, token.line)
    }

    fn expect_punct(&mut self, punct: &str) -> ParseResult<()> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn identifier(&mut self) -> ParseResult<String> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Automatic semicolon insertion, simplified.
    fn end_statement(&mut self) -> ParseResult<()> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.current().newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn nest(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(SyntaxError::new("Code is nested too deeply", self.line()));
        }
        Ok(())
    }

    fn unnest(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.nest()?;
        let result = self.statement_inner();
        self.unnest();
        result
    }

    fn statement_inner(&mut self) -> ParseResult<Stmt> {
        if let TokenKind::Ident(word) = &self.current().kind {
            if UNSUPPORTED.contains(&word.as_str()) {
                return Err(SyntaxError::new(
                    format!("'{word}' is not supported in this simulator"),
                    self.line(),
                ));
            }
        }

        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }

        let keyword = match &self.current().kind {
            TokenKind::Ident(word) => word.clone(),
            _ => String::new(),
        };
        match keyword.as_str() {
            "let" | "const" | "var" => {
                let declaration = self.declaration()?;
                self.end_statement()?;
                Ok(declaration)
            }
            "function" => {
                self.advance();
                let function = self.function_rest(true)?;
                Ok(Stmt::Function(Rc::new(function)))
            }
            "return" => {
                self.advance();
                let value = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.at_eof()
                    || self.current().newline_before
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            "if" => self.if_statement(),
            "for" => self.for_statement(),
            "while" => {
                self.advance();
                let test = self.parenthesized()?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { test, body })
            }
            "do" => {
                self.advance();
                let body = Box::new(self.statement()?);
                if !self.eat_keyword("while") {
                    return Err(self.unexpected());
                }
                let test = self.parenthesized()?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, test })
            }
            "break" => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt::Break)
            }
            "continue" => {
                self.advance();
                self.end_statement()?;
                Ok(Stmt::Continue)
            }
            "switch" => self.switch_statement(),
            "throw" => {
                self.advance();
                if self.current().newline_before {
                    return Err(SyntaxError::new("Illegal newline after throw", self.line()));
                }
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.try_statement(),
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parenthesized(&mut self) -> ParseResult<Expr> {
        self.expect_punct("(")?;
        let expr = self.expression()?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn decl_kind(&mut self) -> Option<DeclKind> {
        let kind = match &self.current().kind {
            TokenKind::Ident(word) if word == "let" => DeclKind::Let,
            TokenKind::Ident(word) if word == "const" => DeclKind::Const,
            TokenKind::Ident(word) if word == "var" => DeclKind::Var,
            _ => return None,
        };
        self.advance();
        Some(kind)
    }

    fn binding_target(&mut self) -> ParseResult<Target> {
        let line = self.line();
        if self.is_punct("[") || self.is_punct("{") {
            let pattern = self.primary()?;
            return to_target(pattern, line);
        }
        Ok(Target::Ident(self.identifier()?))
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        let kind = self.decl_kind().ok_or_else(|| self.unexpected())?;
        let mut decls = Vec::new();
        loop {
            let line = self.line();
            let target = self.binding_target()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() {
                return Err(SyntaxError::new("Missing initializer in const declaration", line));
            }
            decls.push((target, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare { kind, decls })
    }

    fn if_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let test = self.parenthesized()?;
        let then = Box::new(self.statement()?);
        let otherwise = if self.eat_keyword("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            then,
            otherwise,
        })
    }

    fn for_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        self.expect_punct("(")?;

        // for (let x of xs) / for (x in obj)
        let start = self.pos;
        let kind = self.decl_kind();
        if matches!(self.current().kind, TokenKind::Ident(_)) || self.is_punct("[") || self.is_punct("{") {
            if let Ok(target) = self.binding_target() {
                let of = self.is_keyword("of");
                if of || self.is_keyword("in") {
                    self.advance();
                    let iterable = self.expression()?;
                    self.expect_punct(")")?;
                    let body = Box::new(self.statement()?);
                    return Ok(Stmt::ForEach {
                        kind,
                        target,
                        iterable,
                        of,
                        body,
                    });
                }
            }
        }
        self.pos = start;

        let init = if self.is_punct(";") {
            None
        } else if matches!(&self.current().kind, TokenKind::Ident(w) if w == "let" || w == "const" || w == "var") {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn switch_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let discriminant = self.parenthesized()?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.eat_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.expression()?)
            } else if self.eat_keyword("default") {
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(":")?;
            let mut body = Vec::new();
            while !self.is_keyword("case") && !self.is_keyword("default") && !self.is_punct("}") {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    fn try_statement(&mut self) -> ParseResult<Stmt> {
        self.advance();
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_keyword("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_target()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_keyword("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(SyntaxError::new("Missing catch or finally after try", self.line()));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    // ------------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------------

    /// Parses after the `function` keyword.
    fn function_rest(&mut self, require_name: bool) -> ParseResult<Function> {
        let name = if matches!(self.current().kind, TokenKind::Ident(_)) {
            Some(self.identifier()?)
        } else if require_name {
            return Err(SyntaxError::new("Function statements require a function name", self.line()));
        } else {
            None
        };
        self.expect_punct("(")?;
        let (params, rest) = self.parameters()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(Function {
            name,
            params,
            rest,
            body,
            is_arrow: false,
        })
    }

    /// Parses a parameter list after `(`, consuming `)`.
    fn parameters(&mut self) -> ParseResult<(Vec<Param>, Option<String>)> {
        let mut params = Vec::new();
        let mut rest = None;
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                rest = Some(self.identifier()?);
                self.expect_punct(")")?;
                break;
            }
            let target = self.binding_target()?;
            let default = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param { target, default });
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok((params, rest))
    }

    /// Looks ahead from `(` to see whether an arrow function follows.
    fn is_arrow_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut index = self.pos;
        while let Some(token) = self.tokens.get(index) {
            match &token.kind {
                TokenKind::Punct("(" | "[" | "{") => depth += 1,
                TokenKind::Punct(")" | "]" | "}") => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(index + 1).map(|t| &t.kind),
                            Some(TokenKind::Punct("=>"))
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    fn arrow_body(&mut self, params: Vec<Param>, rest: Option<String>) -> ParseResult<Expr> {
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Expr::Function(Rc::new(Function {
            name: None,
            params,
            rest,
            body,
            is_arrow: true,
        })))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> ParseResult<Expr> {
        self.nest()?;
        let result = self.assignment_inner();
        self.unnest();
        result
    }

    fn assignment_inner(&mut self) -> ParseResult<Expr> {
        // x => ...
        if let TokenKind::Ident(name) = &self.current().kind {
            if matches!(self.peek_kind(1), TokenKind::Punct("=>")) {
                let param = Param {
                    target: Target::Ident(name.clone()),
                    default: None,
                };
                self.advance();
                return self.arrow_body(vec![param], None);
            }
        }
        // (a, b) => ...
        if self.is_punct("(") && self.is_arrow_ahead() {
            self.advance();
            let (params, rest) = self.parameters()?;
            return self.arrow_body(params, rest);
        }

        let line = self.line();
        let left = self.conditional()?;
        let op = match &self.current().kind {
            TokenKind::Punct(p) => assignment_operator(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(left);
        };
        self.advance();
        let target = to_target(left, line)?;
        if op.is_some() && matches!(target, Target::Array(_) | Target::Object(_)) {
            return Err(SyntaxError::new("Invalid left-hand side in assignment", line));
        }
        let value = self.assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let test = self.binary(0)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary(&mut self, min_power: u8) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match &self.current().kind {
                TokenKind::Punct(p) => binary_operator(p),
                TokenKind::Ident(word) if word == "in" || word == "instanceof" => binary_operator(word),
                _ => None,
            };
            let Some((power, op)) = op else {
                break;
            };
            if power < min_power {
                break;
            }
            self.advance();
            // `**` is right-associative
            let next_min = if power == 11 { power } else { power + 1 };
            let right = self.binary(next_min)?;
            left = match op {
                Binary::Arithmetic(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                Binary::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        self.nest()?;
        let result = self.unary_inner();
        self.unnest();
        result
    }

    fn unary_inner(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        let op = match &self.current().kind {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Ident(word) if word == "typeof" => Some(UnaryOp::TypeOf),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Unary(op, Box::new(operand)));
        }

        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.advance();
            let operand = self.unary()?;
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(to_target(operand, line)?),
            });
        }

        let expr = self.call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.current().newline_before {
            let increment = self.is_punct("++");
            self.advance();
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(to_target(expr, line)?),
            });
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat_punct(")") {
            if self.eat_punct("...") {
                args.push(Expr::Spread(Box::new(self.assignment()?)));
            } else {
                args.push(self.assignment()?);
            }
            if !self.eat_punct(",") {
                self.expect_punct(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn property_name(&mut self) -> ParseResult<String> {
        // keywords are valid property names
        self.identifier()
    }

    fn call_member(&mut self) -> ParseResult<Expr> {
        let mut expr = if self.eat_keyword("new") {
            let mut callee = self.primary()?;
            while self.eat_punct(".") {
                let property = self.property_name()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                };
            }
            let args = if self.eat_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New {
                callee: Box::new(callee),
                args,
            }
        } else {
            self.primary()?
        };

        loop {
            if self.eat_punct(".") {
                let property = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                let property = self.property_name()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: true,
                };
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.is_punct("(") {
                self.advance();
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        if self.at_eof() {
            return Err(self.unexpected());
        }
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Template(chunks) => self.template(chunks, token.line),
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "this" => Ok(Expr::This),
                "function" => Ok(Expr::Function(Rc::new(self.function_rest(false)?))),
                word if UNSUPPORTED.contains(&word) => Err(SyntaxError::new(
                    format!("'{word}' is not supported in this simulator"),
                    token.line,
                )),
                _ => Ok(Expr::Ident(name)),
            },
            TokenKind::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => {
                let mut items = Vec::new();
                while !self.eat_punct("]") {
                    if self.eat_punct("...") {
                        items.push(Expr::Spread(Box::new(self.assignment()?)));
                    } else {
                        items.push(self.assignment()?);
                    }
                    if !self.eat_punct(",") {
                        self.expect_punct("]")?;
                        break;
                    }
                }
                Ok(Expr::Array(items))
            }
            TokenKind::Punct("{") => self.object_literal(),
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    fn object_literal(&mut self) -> ParseResult<Expr> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(Property::Spread(self.assignment()?));
            } else {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                let key = match self.advance().kind {
                    TokenKind::Ident(name) => PropKey::Static(name),
                    TokenKind::Str(s) => PropKey::Static(s),
                    TokenKind::Number(n) => PropKey::Static(super::value::format_number(n)),
                    TokenKind::Punct("[") => {
                        let key = self.expression()?;
                        self.expect_punct("]")?;
                        PropKey::Computed(key)
                    }
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.unexpected());
                    }
                };

                if self.eat_punct(":") {
                    props.push(Property::KeyValue(key, self.assignment()?));
                } else if self.is_punct("(") {
                    // method shorthand
                    self.advance();
                    let (params, rest) = self.parameters()?;
                    let body = FunctionBody::Block(self.block()?);
                    let name = match &key {
                        PropKey::Static(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    let function = Function {
                        name,
                        params,
                        rest,
                        body,
                        is_arrow: false,
                    };
                    props.push(Property::KeyValue(key, Expr::Function(Rc::new(function))));
                } else {
                    let PropKey::Static(name) = key else {
                        return Err(self.unexpected());
                    };
                    props.push(Property::KeyValue(
                        PropKey::Static(name.clone()),
                        Expr::Ident(name),
                    ));
                }
            }
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    fn template(&mut self, chunks: Vec<TemplateChunk>, line: u32) -> ParseResult<Expr> {
        let mut pieces = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk {
                TemplateChunk::Text(text) => pieces.push(TemplatePiece::Text(text)),
                TemplateChunk::Code(code) => {
                    let mut inner = Self::new(tokenize(&code, line)?);
                    inner.depth = self.depth;
                    let expr = inner.expression()?;
                    if !inner.at_eof() {
                        return Err(inner.unexpected());
                    }
                    pieces.push(TemplatePiece::Expr(expr));
                }
            }
        }
        Ok(Expr::Template(pieces))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        match parse_program(source).unwrap().remove(0) {
            Stmt::Expr(expr) => expr,
            other => unreachable!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let Expr::Binary(BinaryOp::Add, _, right) = expr("1 + 2 * 3") else {
            unreachable!("expected addition at the root");
        };
        assert!(matches!(*right, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_left_associative_subtraction() {
        let Expr::Binary(BinaryOp::Sub, left, _) = expr("10 - 4 - 3") else {
            unreachable!("expected subtraction at the root");
        };
        assert!(matches!(*left, Expr::Binary(BinaryOp::Sub, _, _)));
    }

    #[test]
    fn test_power_is_right_associative() {
        let Expr::Binary(BinaryOp::Pow, _, right) = expr("2 ** 3 ** 2") else {
            unreachable!("expected power at the root");
        };
        assert!(matches!(*right, Expr::Binary(BinaryOp::Pow, _, _)));
    }

    #[test]
    fn test_arrow_functions() {
        assert!(matches!(expr("x => x * 2"), Expr::Function(f) if f.is_arrow && f.params.len() == 1));
        assert!(matches!(expr("(a, b = 1) => { return a + b; }"), Expr::Function(f) if f.params.len() == 2));
        assert!(matches!(expr("(1 + 2)"), Expr::Binary(..)));
    }

    #[test]
    fn test_destructuring_swap() {
        let Expr::Assign { target, op: None, .. } = expr("[arr[j], arr[j + 1]] = [arr[j + 1], arr[j]]") else {
            unreachable!("expected assignment");
        };
        assert!(matches!(*target, Target::Array(ref items) if items.len() == 2));
    }

    #[test]
    fn test_asi_and_return() {
        let program = parse_program("let a = 1\nlet b = 2\nfunction f() { return\n 5 }").unwrap();
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn test_for_of_and_classic_for() {
        let program = parse_program("for (const n of [1, 2]) {}\nfor (let i = 0; i < 3; i++) {}").unwrap();
        assert!(matches!(program[0], Stmt::ForEach { of: true, .. }));
        assert!(matches!(program[1], Stmt::For { .. }));
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_program("let x = ;").unwrap_err();
        assert_eq!(err.message, "Unexpected token ';'");

        let err = parse_program("function () {}").unwrap_err();
        assert!(err.message.contains("require a function name"));

        let err = parse_program("class A {}").unwrap_err();
        assert!(err.message.contains("not supported"));

        let err = parse_program("1 = 2").unwrap_err();
        assert_eq!(err.message, "Invalid left-hand side in assignment");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(500), ")".repeat(500));
        let err = parse_program(&source).unwrap_err();
        assert_eq!(err.message, "Code is nested too deeply");
    }
}
