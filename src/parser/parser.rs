use std::collections::HashMap;
use std::sync::Arc;

use super::lexer::{tokenize, Token, TokenType};
use super::types::{CallResolver, Callee, NoCalls, MAX_PARSER_DEPTH};
use crate::ast::*;
use crate::error::{JsltError, Location, Result};
use crate::functions::{describe_arity, Callable};
use crate::value::Value;

/// Parses a unit with no imports whose calls resolve through `calls`.
pub fn parse(input: &str, calls: impl CallResolver + 'static) -> Result<Program> {
    let mut parser = Parser::new(input, None)?;
    let imports = parser.parse_imports()?;
    if let Some(import) = imports.first() {
        return Err(JsltError::compile(
            "Imports need a module resolver",
            Some(import.location.clone()),
        ));
    }
    parser.set_call_resolver(Box::new(calls));
    parser.parse_unit()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: Option<Arc<str>>,
    depth: usize,
    calls: Box<dyn CallResolver>,
    /// Local functions declared so far: index and parameter count.
    declared: HashMap<String, (usize, usize)>,
}

impl Parser {
    pub fn new(input: &str, source: Option<Arc<str>>) -> Result<Self> {
        let tokens = tokenize(input, source.clone())?;
        Ok(Parser {
            tokens,
            pos: 0,
            source,
            depth: 0,
            calls: Box::new(NoCalls),
            declared: HashMap::new(),
        })
    }

    /// Names known before the unit body is parsed; set once the imports
    /// have been loaded.
    pub fn set_call_resolver(&mut self, calls: Box<dyn CallResolver>) {
        self.calls = calls;
    }

    // ---- token access ----

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    /// End offset of the last consumed token.
    fn previous_end(&self) -> usize {
        match self.pos {
            0 => 0,
            n => self.tokens[n - 1].end,
        }
    }

    fn check(&self, tt: &TokenType) -> bool {
        self.peek().token_type == *tt
    }

    fn match_exact(&mut self, tt: &TokenType) -> bool {
        if self.check(tt) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tt: &TokenType, msg: &str) -> Result<Token> {
        if !self.check(tt) {
            return Err(self.error_at(
                self.peek(),
                format!("{}, got {:?}", msg, self.peek().token_type),
            ));
        }
        Ok(self.advance())
    }

    fn expect_ident(&mut self, msg: &str) -> Result<String> {
        match &self.peek().token_type {
            TokenType::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error_at(self.peek(), format!("{}, got {:?}", msg, other))),
        }
    }

    fn location(&self, tok: &Token) -> Location {
        Location::new(self.source.clone(), tok.line, tok.column)
    }

    fn error_at(&self, tok: &Token, message: impl Into<String>) -> JsltError {
        JsltError::parse(message, self.location(tok))
    }

    // ---- unit structure ----

    pub fn parse_imports(&mut self) -> Result<Vec<ImportDecl>> {
        let mut imports = Vec::new();
        while self.check(&TokenType::Import) {
            let tok = self.advance();
            let path = match self.advance().token_type {
                TokenType::String(path) => path,
                other => {
                    return Err(self.error_at(&tok, format!("Expected import path string, got {:?}", other)))
                }
            };
            self.expect(&TokenType::As, "Expected 'as' after import path")?;
            let prefix = self.expect_ident("Expected module prefix after 'as'")?;
            imports.push(ImportDecl { path, prefix, location: self.location(&tok) });
        }
        Ok(imports)
    }

    /// Top-level lets and defs in any order, then an optional body.
    pub fn parse_unit(&mut self) -> Result<Program> {
        let mut lets = Vec::new();
        let mut functions = Vec::new();

        loop {
            match self.peek().token_type {
                TokenType::Let => lets.push(self.parse_let()?),
                TokenType::Def => {
                    let decl = self.parse_def(functions.len())?;
                    functions.push(decl);
                }
                TokenType::Import => {
                    return Err(self.error_at(self.peek(), "Imports must come before let and def"))
                }
                _ => break,
            }
        }

        let body = if self.check(&TokenType::Eof) { None } else { Some(self.parse_expr()?) };
        if !self.check(&TokenType::Eof) {
            return Err(self.error_at(
                self.peek(),
                format!("Unexpected token {:?}", self.peek().token_type),
            ));
        }

        Ok(Program {
            source: self.source.clone(),
            lets,
            functions,
            body,
            global_frame_size: 0,
            parameters: Vec::new(),
        })
    }

    fn parse_let(&mut self) -> Result<LetBinding> {
        let tok = self.advance();
        let name = self.expect_ident("Expected variable name after 'let'")?;
        self.expect(&TokenType::Assign, "Expected '=' after variable name")?;
        let value = self.parse_expr()?;
        Ok(LetBinding { name, slot: None, value, location: self.location(&tok) })
    }

    fn parse_lets(&mut self) -> Result<Vec<LetBinding>> {
        let mut lets = Vec::new();
        while self.check(&TokenType::Let) {
            lets.push(self.parse_let()?);
        }
        Ok(lets)
    }

    fn parse_def(&mut self, index: usize) -> Result<FunctionDecl> {
        let tok = self.advance();
        let location = self.location(&tok);
        let name = self.expect_ident("Expected function name after 'def'")?;

        if self.calls.resolve(&name).is_some() {
            return Err(JsltError::compile(
                format!("Function '{}' is already defined as a built-in or import", name),
                Some(location),
            ));
        }
        if self.declared.contains_key(&name) {
            return Err(JsltError::compile(
                format!("Function '{}' is declared twice", name),
                Some(location),
            ));
        }

        self.expect(&TokenType::LParen, "Expected '(' after function name")?;
        let mut params = Vec::new();
        if !self.check(&TokenType::RParen) {
            loop {
                params.push(self.expect_ident("Expected parameter name")?);
                if !self.match_exact(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenType::RParen, "Expected ')' after parameters")?;

        // visible to its own body for recursion
        self.declared.insert(name.clone(), (index, params.len()));

        let lets = self.parse_lets()?;
        let body = self.parse_expr()?;
        Ok(FunctionDecl {
            name,
            params,
            param_slots: Vec::new(),
            body: wrap_lets(lets, body),
            frame_size: 0,
            location,
        })
    }

    // ---- expressions, loosest binding first ----

    fn parse_expr(&mut self) -> Result<Expr> {
        if self.depth >= MAX_PARSER_DEPTH {
            return Err(self.error_at(self.peek(), "Expression nested too deeply"));
        }
        self.depth += 1;
        let result = self.parse_pipe();
        self.depth -= 1;
        result
    }

    fn parse_pipe(&mut self) -> Result<Expr> {
        let mut left = self.parse_or()?;
        while self.check(&TokenType::Pipe) {
            let tok = self.advance();
            let right = self.parse_or()?;
            left = Expr::new(
                ExprKind::Pipe { left: Box::new(left), right: Box::new(right) },
                self.location(&tok),
            );
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.check(&TokenType::Or) {
            let tok = self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right, self.location(&tok));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while self.check(&TokenType::And) {
            let tok = self.advance();
            let right = self.parse_comparison()?;
            left = binary(BinaryOp::And, left, right, self.location(&tok));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek().token_type {
            TokenType::Eq => BinaryOp::Equal,
            TokenType::Ne => BinaryOp::NotEqual,
            TokenType::Lt => BinaryOp::Less,
            TokenType::Le => BinaryOp::LessOrEqual,
            TokenType::Gt => BinaryOp::Greater,
            TokenType::Ge => BinaryOp::GreaterOrEqual,
            _ => return Ok(left),
        };
        let tok = self.advance();
        let right = self.parse_additive()?;
        Ok(binary(op, left, right, self.location(&tok)))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Plus => BinaryOp::Plus,
                TokenType::Minus => BinaryOp::Minus,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right, self.location(&tok));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_postfix()?;
        loop {
            let op = match self.peek().token_type {
                TokenType::Star => BinaryOp::Multiply,
                TokenType::Slash => BinaryOp::Divide,
                TokenType::Percent => BinaryOp::Modulo,
                _ => break,
            };
            let tok = self.advance();
            let right = self.parse_postfix()?;
            left = binary(op, left, right, self.location(&tok));
        }
        Ok(left)
    }

    /// `.key` and `[...]` chained onto a primary without intervening space.
    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let tok = self.peek().clone();
            if tok.start != self.previous_end() {
                break;
            }
            match tok.token_type {
                TokenType::Dot => {
                    self.advance();
                    let key = self.parse_dot_key(&tok)?.ok_or_else(|| {
                        self.error_at(&tok, "Expected key after '.'")
                    })?;
                    expr = Expr::new(
                        ExprKind::DotKey { base: Some(Box::new(expr)), key },
                        self.location(&tok),
                    );
                }
                TokenType::LBracket => {
                    self.advance();
                    expr = self.parse_index_suffix(Some(expr), &tok)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// The key directly after a consumed `.`, if there is one.
    fn parse_dot_key(&mut self, dot: &Token) -> Result<Option<String>> {
        let next = self.peek();
        if next.start != dot.end {
            return Ok(None);
        }
        let key = match &next.token_type {
            TokenType::String(s) => Some(s.clone()),
            other => other.key_name(),
        };
        if key.is_some() {
            self.advance();
        }
        Ok(key)
    }

    /// After `[`: either `index]` or `start? : end?]`.
    fn parse_index_suffix(&mut self, base: Option<Expr>, open: &Token) -> Result<Expr> {
        let location = self.location(open);
        let base = base.map(Box::new);

        let start = if self.check(&TokenType::Colon) { None } else { Some(self.parse_expr()?) };
        if self.match_exact(&TokenType::Colon) {
            let end = if self.check(&TokenType::RBracket) { None } else { Some(self.parse_expr()?) };
            self.expect(&TokenType::RBracket, "Expected ']' after slice")?;
            return Ok(Expr::new(
                ExprKind::Slice { base, start: start.map(Box::new), end: end.map(Box::new) },
                location,
            ));
        }

        self.expect(&TokenType::RBracket, "Expected ']' after index")?;
        match start {
            Some(index) => Ok(Expr::new(ExprKind::Index { base, index: Box::new(index) }, location)),
            None => Err(self.error_at(open, "Expected index expression")),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.advance();
        let location = self.location(&tok);

        let expr = match tok.token_type.clone() {
            TokenType::Integer(n) => Expr::literal(integer_literal(n as i128), location),
            TokenType::Decimal(n) => Expr::literal(Value::Decimal(n), location),
            TokenType::String(s) => Expr::literal(Value::String(s), location),
            TokenType::True => Expr::literal(Value::Bool(true), location),
            TokenType::False => Expr::literal(Value::Bool(false), location),
            TokenType::Null => Expr::literal(Value::Null, location),

            TokenType::Minus => {
                let next = self.peek().clone();
                let value = match next.token_type {
                    TokenType::Integer(n) if next.start == tok.end => integer_literal(-(n as i128)),
                    TokenType::Decimal(n) if next.start == tok.end => Value::Decimal(-n),
                    _ => return Err(self.error_at(&tok, "Unexpected '-'")),
                };
                self.advance();
                Expr::literal(value, location)
            }

            TokenType::Dot => {
                if let Some(key) = self.parse_dot_key(&tok)? {
                    Expr::new(ExprKind::DotKey { base: None, key }, location)
                } else if self.check(&TokenType::LBracket) && self.peek().start == tok.end {
                    let open = self.advance();
                    self.parse_index_suffix(None, &open)?
                } else {
                    Expr::new(ExprKind::Dot, location)
                }
            }

            TokenType::Variable(name) => {
                Expr::new(ExprKind::Variable { name, slot: None }, location)
            }

            TokenType::Ident(name) | TokenType::PrefixedIdent(name) => {
                if !self.check(&TokenType::LParen) {
                    return Err(self.error_at(&tok, format!("Unexpected identifier '{}'", name)));
                }
                self.parse_call(name, location)?
            }

            TokenType::LParen => {
                let inner = self.parse_expr()?;
                self.expect(&TokenType::RParen, "Expected ')'")?;
                inner
            }

            TokenType::If => self.parse_if(location)?,

            TokenType::LBracket => {
                if self.check(&TokenType::For) {
                    self.parse_array_for(location)?
                } else {
                    self.parse_array(location)?
                }
            }

            TokenType::LBrace => {
                if self.check(&TokenType::For) {
                    self.parse_object_for(location)?
                } else {
                    self.parse_object(location)?
                }
            }

            other => {
                return Err(self.error_at(&tok, format!("Unexpected token {:?}", other)));
            }
        };
        Ok(expr)
    }

    fn parse_call(&mut self, name: String, location: Location) -> Result<Expr> {
        self.expect(&TokenType::LParen, "Expected '('")?;
        let mut args = Vec::new();
        if !self.check(&TokenType::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.match_exact(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenType::RParen, "Expected ')' after arguments")?;

        if let Some(&(index, count)) = self.declared.get(&name) {
            if args.len() != count {
                return Err(JsltError::compile(
                    format!("Function '{}' takes {} arguments, got {}", name, count, args.len()),
                    Some(location),
                ));
            }
            let target = FunctionTarget::Declared(index);
            return Ok(Expr::new(ExprKind::FunctionCall { name, target, args }, location));
        }

        let kind = match self.calls.resolve(&name) {
            Some(Callee::Function(function)) => {
                check_arity(function.as_ref(), &name, args.len(), &location)?;
                ExprKind::FunctionCall { name, target: FunctionTarget::Callable(function), args }
            }
            Some(Callee::Macro(mac)) => {
                check_arity(mac.as_ref(), &name, args.len(), &location)?;
                ExprKind::MacroCall { name, target: MacroRef(mac), args }
            }
            // a function declared further down, checked after the unit is parsed
            None => ExprKind::FunctionCall { name, target: FunctionTarget::Unresolved, args },
        };
        Ok(Expr::new(kind, location))
    }

    fn parse_if(&mut self, location: Location) -> Result<Expr> {
        self.expect(&TokenType::LParen, "Expected '(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenType::RParen, "Expected ')' after condition")?;
        let lets = self.parse_lets()?;
        let then = wrap_lets(lets, self.parse_expr()?);

        let otherwise = if self.match_exact(&TokenType::Else) {
            let lets = self.parse_lets()?;
            Some(Box::new(wrap_lets(lets, self.parse_expr()?)))
        } else {
            None
        };

        Ok(Expr::new(
            ExprKind::If { cond: Box::new(cond), then: Box::new(then), otherwise },
            location,
        ))
    }

    /// `(seq)` after `for`.
    fn parse_for_head(&mut self) -> Result<Expr> {
        self.expect(&TokenType::For, "Expected 'for'")?;
        self.expect(&TokenType::LParen, "Expected '(' after 'for'")?;
        let seq = self.parse_expr()?;
        self.expect(&TokenType::RParen, "Expected ')' after for sequence")?;
        Ok(seq)
    }

    /// Optional trailing `if (cond)` of a comprehension.
    fn parse_for_filter(&mut self) -> Result<Option<Box<Expr>>> {
        if !self.match_exact(&TokenType::If) {
            return Ok(None);
        }
        self.expect(&TokenType::LParen, "Expected '(' after 'if'")?;
        let cond = self.parse_expr()?;
        self.expect(&TokenType::RParen, "Expected ')' after condition")?;
        Ok(Some(Box::new(cond)))
    }

    fn parse_array_for(&mut self, location: Location) -> Result<Expr> {
        let seq = self.parse_for_head()?;
        let lets = self.parse_lets()?;
        let body = self.parse_expr()?;
        let filter = self.parse_for_filter()?;
        self.expect(&TokenType::RBracket, "Expected ']' after for expression")?;
        Ok(Expr::new(
            ExprKind::For { seq: Box::new(seq), lets, body: Box::new(body), filter },
            location,
        ))
    }

    fn parse_array(&mut self, location: Location) -> Result<Expr> {
        let mut items = Vec::new();
        while !self.check(&TokenType::RBracket) {
            items.push(self.parse_expr()?);
            if !self.match_exact(&TokenType::Comma) {
                break;
            }
        }
        self.expect(&TokenType::RBracket, "Expected ']' after array elements")?;
        Ok(Expr::new(ExprKind::Array(items), location))
    }

    fn parse_object_for(&mut self, location: Location) -> Result<Expr> {
        let seq = self.parse_for_head()?;
        let lets = self.parse_lets()?;
        let key = self.parse_expr()?;
        self.expect(&TokenType::Colon, "Expected ':' after key in object comprehension")?;
        let value = self.parse_expr()?;
        let filter = self.parse_for_filter()?;
        self.expect(&TokenType::RBrace, "Expected '}' after object comprehension")?;
        Ok(Expr::new(
            ExprKind::ObjectFor {
                seq: Box::new(seq),
                lets,
                key: Box::new(key),
                value: Box::new(value),
                filter,
            },
            location,
        ))
    }

    fn parse_object(&mut self, location: Location) -> Result<Expr> {
        let lets = self.parse_lets()?;
        let mut entries = Vec::new();
        let mut matcher = None;

        loop {
            if self.match_exact(&TokenType::RBrace) {
                break;
            }
            if self.check(&TokenType::Star) {
                matcher = Some(self.parse_matcher()?);
                self.match_exact(&TokenType::Comma);
                self.expect(&TokenType::RBrace, "Object matcher must be the last entry")?;
                break;
            }

            let key_tok = self.advance();
            let key = match key_tok.token_type.clone() {
                TokenType::String(s) => ObjectKey::Static(s),
                TokenType::LParen => {
                    let key = self.parse_expr()?;
                    self.expect(&TokenType::RParen, "Expected ')' after key expression")?;
                    ObjectKey::Dynamic(key)
                }
                TokenType::Variable(name) => ObjectKey::Dynamic(Expr::new(
                    ExprKind::Variable { name, slot: None },
                    self.location(&key_tok),
                )),
                other => match other.key_name() {
                    Some(name) => ObjectKey::Static(name),
                    None => {
                        return Err(self.error_at(&key_tok, format!("Expected object key, got {:?}", other)))
                    }
                },
            };
            self.expect(&TokenType::Colon, "Expected ':' after object key")?;
            let value = self.parse_expr()?;
            entries.push(ObjectEntry { key, value, location: self.location(&key_tok) });

            if !self.match_exact(&TokenType::Comma) {
                self.expect(&TokenType::RBrace, "Expected ',' or '}' in object")?;
                break;
            }
        }

        Ok(Expr::new(ExprKind::Object(ObjectTemplate { lets, entries, matcher }), location))
    }

    fn parse_matcher(&mut self) -> Result<Matcher> {
        let star = self.advance();
        let mut exclusions = Vec::new();
        if self.match_exact(&TokenType::Minus) {
            loop {
                let tok = self.advance();
                let key = match &tok.token_type {
                    TokenType::String(s) => Some(s.clone()),
                    other => other.key_name(),
                };
                match key {
                    Some(key) => exclusions.push(key),
                    None => return Err(self.error_at(&tok, "Expected key to exclude after '-'")),
                }
                if !self.match_exact(&TokenType::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenType::Colon, "Expected ':' after object matcher")?;
        let value = self.parse_expr()?;
        Ok(Matcher {
            exclusions,
            value: Box::new(value),
            context: None,
            location: self.location(&star),
        })
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, location: Location) -> Expr {
    Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, location)
}

/// Integral literal, falling back to decimal outside the `i64` range.
fn integer_literal(n: i128) -> Value {
    match i64::try_from(n) {
        Ok(n) => Value::Integer(n),
        Err(_) => Value::Decimal(n as f64),
    }
}

fn wrap_lets(lets: Vec<LetBinding>, body: Expr) -> Expr {
    if lets.is_empty() {
        return body;
    }
    let location = lets[0].location.clone();
    Expr::new(ExprKind::Let { bindings: lets, body: Box::new(body) }, location)
}

fn check_arity(callable: &dyn Callable, name: &str, count: usize, location: &Location) -> Result<()> {
    if callable.accepts(count) {
        return Ok(());
    }
    Err(JsltError::compile(
        format!(
            "Function '{}' takes {} arguments, got {}",
            name,
            describe_arity(callable),
            count
        ),
        Some(location.clone()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::FunctionRegistry;
    use pretty_assertions::assert_eq;

    struct Registry(FunctionRegistry);

    impl CallResolver for Registry {
        fn resolve(&self, name: &str) -> Option<Callee> {
            if let Some(f) = self.0.function(name) {
                return Some(Callee::Function(f.clone()));
            }
            self.0.macro_named(name).map(|m| Callee::Macro(m.clone()))
        }
    }

    fn parse_body(input: &str) -> Expr {
        parse(input, Registry(FunctionRegistry::default())).unwrap().body.unwrap()
    }

    fn parse_err(input: &str) -> JsltError {
        parse(input, Registry(FunctionRegistry::default())).unwrap_err()
    }

    #[test]
    fn test_precedence() {
        let body = parse_body("1 + 2 * 3 == 7 and true | .");
        let ExprKind::Pipe { left, .. } = body.kind else { panic!("expected pipe") };
        let ExprKind::Binary { op: BinaryOp::And, left, .. } = left.kind else { panic!("expected and") };
        let ExprKind::Binary { op: BinaryOp::Equal, left, .. } = left.kind else { panic!("expected ==") };
        let ExprKind::Binary { op: BinaryOp::Plus, right, .. } = left.kind else { panic!("expected +") };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Multiply, .. }));
    }

    #[test]
    fn test_dot_chains_need_adjacency() {
        let body = parse_body(".a.b[0]");
        let ExprKind::Index { base: Some(base), .. } = body.kind else { panic!("expected index") };
        let ExprKind::DotKey { base: Some(inner), key } = base.kind else { panic!("expected .b") };
        assert_eq!(key, "b");
        assert_eq!(inner.kind, ExprKind::DotKey { base: None, key: "a".into() });
        assert!(parse(".a .b", NoCalls).is_err());
    }

    #[test]
    fn test_slices() {
        assert!(matches!(parse_body(".[1:]").kind, ExprKind::Slice { start: Some(_), end: None, .. }));
        assert!(matches!(parse_body(".[:2]").kind, ExprKind::Slice { start: None, end: Some(_), .. }));
        assert!(matches!(parse_body(".[-1]").kind, ExprKind::Index { .. }));
    }

    #[test]
    fn test_negative_literals() {
        assert_eq!(parse_body("-5").kind, ExprKind::Literal(Value::Integer(-5)));
        assert_eq!(parse_body("-2.5").kind, ExprKind::Literal(Value::Decimal(-2.5)));
        assert!(matches!(parse_body("3 -1").kind, ExprKind::Binary { op: BinaryOp::Minus, .. }));
    }

    #[test]
    fn test_integer_literal_range() {
        assert_eq!(
            parse_body("-9223372036854775808").kind,
            ExprKind::Literal(Value::Integer(i64::MIN))
        );
        assert_eq!(
            parse_body("9223372036854775807").kind,
            ExprKind::Literal(Value::Integer(i64::MAX))
        );
        assert_eq!(
            parse_body("9223372036854775808").kind,
            ExprKind::Literal(Value::Decimal(9223372036854775808.0))
        );
    }

    #[test]
    fn test_object_template() {
        let body = parse_body(r#"{let x = 1 "a": $x, (.k): 2, b: 3, * - c, "d" : .,}"#);
        let ExprKind::Object(template) = body.kind else { panic!("expected object") };
        assert_eq!(template.lets.len(), 1);
        assert_eq!(template.entries.len(), 3);
        assert!(matches!(template.entries[1].key, ObjectKey::Dynamic(_)));
        assert_eq!(template.entries[2].key, ObjectKey::Static("b".into()));
        let matcher = template.matcher.unwrap();
        assert_eq!(matcher.exclusions, vec!["c".to_string(), "d".to_string()]);
    }

    #[test]
    fn test_matcher_must_be_last() {
        let err = parse_err(r#"{* : ., "a": 1}"#);
        assert!(err.message().contains("last entry"));
    }

    #[test]
    fn test_comprehensions() {
        assert!(matches!(
            parse_body("[for (.xs) let y = . $y if ($y > 1)]").kind,
            ExprKind::For { filter: Some(_), .. }
        ));
        assert!(matches!(
            parse_body("{for (.) .k : .v}").kind,
            ExprKind::ObjectFor { filter: None, .. }
        ));
    }

    #[test]
    fn test_if_else_chain() {
        let body = parse_body("if (.a) 1 else if (.b) 2 else let z = 3 $z");
        let ExprKind::If { otherwise: Some(otherwise), .. } = body.kind else { panic!("expected if") };
        assert!(matches!(otherwise.kind, ExprKind::If { .. }));
    }

    #[test]
    fn test_unit_structure() {
        let program = parse(
            "let a = 1 def f(x) $x let b = 2 f($a)",
            NoCalls,
        )
        .unwrap();
        assert_eq!(program.lets.len(), 2);
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].params, vec!["x".to_string()]);
        assert!(matches!(
            program.body.unwrap().kind,
            ExprKind::FunctionCall { target: FunctionTarget::Declared(0), .. }
        ));
    }

    #[test]
    fn test_function_only_unit_has_no_body() {
        let program = parse("def f() 1", NoCalls).unwrap();
        assert!(program.body.is_none());
    }

    #[test]
    fn test_builtin_calls_resolve_immediately() {
        let body = parse_body("size(.)");
        assert!(matches!(body.kind, ExprKind::FunctionCall { target: FunctionTarget::Callable(_), .. }));
        let body = parse_body("fallback(.a, 1)");
        assert!(matches!(body.kind, ExprKind::MacroCall { .. }));
    }

    #[test]
    fn test_forward_reference_left_unresolved() {
        let program = parse("def f() g() def g() 1 f()", NoCalls).unwrap();
        assert!(matches!(
            program.functions[0].body.kind,
            ExprKind::FunctionCall { target: FunctionTarget::Unresolved, .. }
        ));
    }

    #[test]
    fn test_arity_errors_are_compile_errors() {
        let err = parse_err("size(1, 2)");
        assert!(err.is_compile_error());
        assert!(err.message().contains("takes 1 arguments, got 2"));
        let err = parse_err("def f(a) $a f(1, 2)");
        assert!(err.is_compile_error());
    }

    #[test]
    fn test_def_cannot_shadow_builtin() {
        let err = parse_err("def size(x) 1 size(1)");
        assert!(err.message().contains("already defined"));
    }

    #[test]
    fn test_parse_errors_have_locations() {
        let err = parse_err("{\"a\": 1\n \"b\": 2}");
        assert!(!err.is_compile_error());
        assert_eq!(err.location().unwrap().line, 2);
        assert!(parse_err("[1, 2").message().contains("Expected ']'"));
        assert!(parse_err("foo").message().contains("Unexpected identifier"));
    }

    #[test]
    fn test_imports_parsed_first() {
        let mut parser = Parser::new("import \"lib.jslt\" as lib lib:f(1)", None).unwrap();
        let imports = parser.parse_imports().unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].path, "lib.jslt");
        assert_eq!(imports[0].prefix, "lib");
        let program = parser.parse_unit().unwrap();
        assert!(matches!(
            program.body.unwrap().kind,
            ExprKind::FunctionCall { target: FunctionTarget::Unresolved, .. }
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "[".repeat(300), "]".repeat(300));
        assert!(parse_err(&deep).message().contains("nested too deeply"));
    }
}
