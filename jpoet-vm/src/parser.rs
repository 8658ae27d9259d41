//! Expression parser
//!
//! Recursive descent over the token stream, with precedence climbing for
//! binary operators. Nesting is bounded so that hostile input fails with an
//! error instead of exhausting the stack.

use crate::ast::{
    Arg, Assert, BinOp, Bind, CompSpec, Expr, ExprKind, Field, FieldKey, Member, ObjectComp, Param, Pos, Slice,
    UnaryOp, Visibility,
};
use crate::lexer::{tokenize, Keyword, Spanned, Token};
use jpoet_core::{EvalError, Location};
use std::sync::Arc;

/// Deepest tree the parser builds
pub const MAX_NESTING: usize = 1000;

/// Parse a whole program
pub fn parse(file: &str, source: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(file, source)?;
    let mut parser = Parser { file, tokens, idx: 0, depth: 0 };
    let expr = parser.parse_expr()?;
    parser.expect(Token::Eof, "end of input")?;
    Ok(expr)
}

struct Parser<'a> {
    file: &'a str,
    tokens: Vec<Spanned>,
    idx: usize,
    depth: usize,
}

impl Parser<'_> {
    // ========== Token helpers ==========

    fn peek(&self) -> &Token {
        &self.tokens[self.idx].token
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.idx + 1).map(|s| &s.token)
    }

    fn pos(&self) -> Pos {
        self.tokens[self.idx].pos
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.idx].token.clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), EvalError> {
        if *self.peek() == token {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn error_at(&self, message: impl Into<String>, pos: Pos) -> EvalError {
        EvalError::parse(
            message,
            Location { file: self.file.to_string(), line: pos.line, column: pos.column },
        )
    }

    fn unexpected(&self, what: &str) -> EvalError {
        self.error_at(format!("expected {}, got {}", what, describe(self.peek())), self.pos())
    }

    fn ident(&mut self, what: &str) -> Result<String, EvalError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn string_literal(&mut self, what: &str) -> Result<String, EvalError> {
        match self.peek() {
            Token::Str(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// One level deeper into the tree
    fn nest(&mut self) -> Result<(), EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_at(
                format!("expression nested deeper than {} levels", MAX_NESTING),
                self.pos(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn unnest(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // ========== Expressions ==========

    fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        let mut chained = 0;
        while let Some(op) = binary_op(self.peek()) {
            if op.precedence() <= min_precedence {
                break;
            }
            let pos = self.pos();
            self.advance();
            self.nest()?;
            chained += 1;
            if op == BinOp::In && self.eat(&Token::Keyword(Keyword::Super)) {
                left = Expr::new(ExprKind::InSuper(Box::new(left)), pos);
                continue;
            }
            // Left-associative: the right operand only takes tighter operators.
            let right = self.parse_binary(op.precedence())?;
            left = Expr::new(ExprKind::Binary(Box::new(left), op, Box::new(right)), pos);
        }
        self.unnest(chained);
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let pos = self.pos();
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Plus,
            Token::Bang => UnaryOp::Not,
            Token::Tilde => UnaryOp::BitNot,
            _ => {
                self.nest()?;
                let expr = self.parse_postfix();
                self.unnest(1);
                return expr;
            }
        };
        self.advance();
        self.nest()?;
        let operand = self.parse_unary();
        self.unnest(1);
        Ok(Expr::new(ExprKind::Unary(op, Box::new(operand?)), pos))
    }

    fn parse_postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = self.parse_primary()?;
        let mut chained = 0;
        let result = loop {
            let pos = self.pos();
            if matches!(self.peek(), Token::Dot | Token::LBracket | Token::LParen | Token::LBrace) {
                self.nest()?;
                chained += 1;
            }
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    let field = self.ident("field name")?;
                    let key = Expr::new(ExprKind::Str(field), pos);
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(key)), pos);
                }
                Token::LBracket => {
                    self.advance();
                    expr = self.parse_index(expr, pos)?;
                }
                Token::LParen => {
                    self.advance();
                    let args = self.parse_args()?;
                    expr = Expr::new(ExprKind::Apply(Box::new(expr), args), pos);
                }
                Token::LBrace => {
                    // `a { ... }` is sugar for `a + { ... }`
                    let object = self.parse_primary()?;
                    expr = Expr::new(ExprKind::Binary(Box::new(expr), BinOp::Add, Box::new(object)), pos);
                }
                _ => break expr,
            }
        };
        self.unnest(chained);
        Ok(result)
    }

    /// After `target[`: an index or a slice
    fn parse_index(&mut self, target: Expr, pos: Pos) -> Result<Expr, EvalError> {
        let start = match self.peek() {
            Token::Colon | Token::DoubleColon => None,
            _ => Some(self.parse_expr()?),
        };
        if start.is_some() && *self.peek() == Token::RBracket {
            self.advance();
            let index = start.map(Box::new).ok_or_else(|| self.unexpected("index"))?;
            return Ok(Expr::new(ExprKind::Index(Box::new(target), index), pos));
        }
        let (end, step) = if self.eat(&Token::DoubleColon) {
            (None, self.optional_slice_part()?)
        } else {
            self.expect(Token::Colon, ":")?;
            let end = self.optional_slice_part()?;
            let step = if self.eat(&Token::Colon) { self.optional_slice_part()? } else { None };
            (end, step)
        };
        self.expect(Token::RBracket, "]")?;
        Ok(Expr::new(ExprKind::Slice(Box::new(Slice { target, start, end, step })), pos))
    }

    fn optional_slice_part(&mut self) -> Result<Option<Expr>, EvalError> {
        match self.peek() {
            Token::Colon | Token::RBracket => Ok(None),
            _ => self.parse_expr().map(Some),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let pos = self.pos();
        let kind = match self.peek().clone() {
            Token::Keyword(Keyword::Null) => {
                self.advance();
                ExprKind::Null
            }
            Token::Keyword(Keyword::True) => {
                self.advance();
                ExprKind::Bool(true)
            }
            Token::Keyword(Keyword::False) => {
                self.advance();
                ExprKind::Bool(false)
            }
            Token::Keyword(Keyword::SelfKw) => {
                self.advance();
                ExprKind::SelfRef
            }
            Token::Dollar => {
                self.advance();
                ExprKind::Dollar
            }
            Token::Keyword(Keyword::Super) => {
                self.advance();
                let key = match self.advance() {
                    Token::Dot => {
                        let key_pos = self.pos();
                        Expr::new(ExprKind::Str(self.ident("field name")?), key_pos)
                    }
                    Token::LBracket => {
                        let key = self.parse_expr()?;
                        self.expect(Token::RBracket, "]")?;
                        key
                    }
                    _ => return Err(self.error_at("super must be followed by . or [", pos)),
                };
                ExprKind::SuperIndex(Box::new(key))
            }
            Token::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            Token::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Token::Ident(name) => {
                self.advance();
                ExprKind::Var(name)
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen, ")")?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                self.parse_array()?
            }
            Token::LBrace => {
                self.advance();
                self.parse_object()?
            }
            Token::Keyword(Keyword::Local) => {
                self.advance();
                let mut binds = vec![self.parse_bind()?];
                while self.eat(&Token::Comma) {
                    binds.push(self.parse_bind()?);
                }
                self.expect(Token::Semicolon, ";")?;
                let body = self.parse_expr()?;
                ExprKind::Local(binds, Box::new(body))
            }
            Token::Keyword(Keyword::Function) => {
                self.advance();
                self.expect(Token::LParen, "(")?;
                let params = self.parse_params()?;
                let body = self.parse_expr()?;
                ExprKind::Function(params, Arc::new(body))
            }
            Token::Keyword(Keyword::If) => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(Token::Keyword(Keyword::Then), "then")?;
                let then = self.parse_expr()?;
                let otherwise = if self.eat(&Token::Keyword(Keyword::Else)) {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                ExprKind::If(Box::new(cond), Box::new(then), otherwise)
            }
            Token::Keyword(Keyword::Assert) => {
                self.advance();
                let assert = self.parse_assert()?;
                self.expect(Token::Semicolon, ";")?;
                let body = self.parse_expr()?;
                ExprKind::Assert(Box::new(assert), Box::new(body))
            }
            Token::Keyword(Keyword::Error) => {
                self.advance();
                ExprKind::Error(Box::new(self.parse_expr()?))
            }
            Token::Keyword(Keyword::Import) => {
                self.advance();
                ExprKind::Import(self.string_literal("import path string")?)
            }
            Token::Keyword(Keyword::ImportStr) => {
                self.advance();
                ExprKind::ImportStr(self.string_literal("importstr path string")?)
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok(Expr::new(kind, pos))
    }

    /// After `assert`: the condition and optional `: message`
    fn parse_assert(&mut self) -> Result<Assert, EvalError> {
        let cond = Arc::new(self.parse_expr()?);
        let message = if self.eat(&Token::Colon) { Some(Arc::new(self.parse_expr()?)) } else { None };
        Ok(Assert { cond, message })
    }

    /// After `[`: an array literal or an array comprehension
    fn parse_array(&mut self) -> Result<ExprKind, EvalError> {
        let mut items = Vec::new();
        loop {
            if self.eat(&Token::RBracket) {
                return Ok(ExprKind::Array(items));
            }
            items.push(self.parse_expr()?);
            let comma = self.eat(&Token::Comma);
            if *self.peek() == Token::Keyword(Keyword::For) {
                if items.len() != 1 {
                    return Err(self.error_at("array comprehension must have exactly one element", self.pos()));
                }
                let specs = self.parse_comp_specs()?;
                self.expect(Token::RBracket, "]")?;
                let body = items.pop().ok_or_else(|| self.unexpected("expression"))?;
                return Ok(ExprKind::ArrayComp(Box::new(body), specs));
            }
            if !comma {
                self.expect(Token::RBracket, ", or ]")?;
                return Ok(ExprKind::Array(items));
            }
        }
    }

    /// `for x in e` followed by any mix of `for` and `if` clauses
    fn parse_comp_specs(&mut self) -> Result<Vec<CompSpec>, EvalError> {
        let mut specs = Vec::new();
        loop {
            if self.eat(&Token::Keyword(Keyword::For)) {
                let name = self.ident("loop variable")?;
                self.expect(Token::Keyword(Keyword::In), "in")?;
                specs.push(CompSpec::For(name, self.parse_expr()?));
            } else if self.eat(&Token::Keyword(Keyword::If)) {
                specs.push(CompSpec::If(self.parse_expr()?));
            } else {
                return Ok(specs);
            }
        }
    }

    /// After `{`: an object literal or an object comprehension
    fn parse_object(&mut self) -> Result<ExprKind, EvalError> {
        let mut members = Vec::new();
        loop {
            if self.eat(&Token::RBrace) {
                return Ok(ExprKind::Object(members));
            }
            let pos = self.pos();
            members.push(self.parse_member()?);
            let comma = self.eat(&Token::Comma);
            if *self.peek() == Token::Keyword(Keyword::For) {
                let comp = self.object_comp(members, pos)?;
                self.expect(Token::RBrace, "}")?;
                return Ok(ExprKind::ObjectComp(Box::new(comp)));
            }
            if !comma {
                self.expect(Token::RBrace, ", or }")?;
                return Ok(ExprKind::Object(members));
            }
        }
    }

    fn object_comp(&mut self, members: Vec<Member>, pos: Pos) -> Result<ObjectComp, EvalError> {
        let mut locals = Vec::new();
        let mut field = None;
        for member in members {
            match member {
                Member::Local(bind) => locals.push(bind),
                Member::Field(f) if field.is_none() => field = Some(f),
                Member::Field(_) => {
                    return Err(self.error_at("object comprehension can only have one field", pos));
                }
                Member::Assert(_) => {
                    return Err(self.error_at("object comprehension cannot have asserts", pos));
                }
            }
        }
        let field = field.ok_or_else(|| self.error_at("object comprehension must have a field", pos))?;
        let key = match field.key {
            FieldKey::Computed(key) => key,
            FieldKey::Fixed(_) => {
                return Err(self.error_at("object comprehension field name must be computed with [...]", pos));
            }
        };
        let specs = self.parse_comp_specs()?;
        Ok(ObjectComp {
            locals,
            key,
            plus: field.plus,
            visibility: field.visibility,
            value: field.value,
            specs,
        })
    }

    fn parse_member(&mut self) -> Result<Member, EvalError> {
        if self.eat(&Token::Keyword(Keyword::Local)) {
            return Ok(Member::Local(self.parse_bind()?));
        }
        if self.eat(&Token::Keyword(Keyword::Assert)) {
            return Ok(Member::Assert(self.parse_assert()?));
        }
        let pos = self.pos();
        let key = match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                FieldKey::Fixed(name)
            }
            Token::Str(s) => {
                self.advance();
                FieldKey::Fixed(s)
            }
            Token::LBracket => {
                self.advance();
                let key = self.parse_expr()?;
                self.expect(Token::RBracket, "]")?;
                FieldKey::Computed(key)
            }
            _ => return Err(self.unexpected("field name")),
        };
        let params = if self.eat(&Token::LParen) { Some(self.parse_params()?) } else { None };
        let plus = self.eat(&Token::Plus);
        let visibility = match self.advance() {
            Token::Colon => Visibility::Inherit,
            Token::DoubleColon => Visibility::Hidden,
            Token::TripleColon => Visibility::Visible,
            other => {
                return Err(self.error_at(format!("expected :, got {}", describe(&other)), pos));
            }
        };
        let body = self.parse_expr()?;
        let value = match params {
            Some(params) => Expr::new(ExprKind::Function(params, Arc::new(body)), pos),
            None => body,
        };
        Ok(Member::Field(Field { key, visibility, plus, value: Arc::new(value) }))
    }

    fn parse_bind(&mut self) -> Result<Bind, EvalError> {
        let pos = self.pos();
        let name = self.ident("local name")?;
        let params = if self.eat(&Token::LParen) { Some(self.parse_params()?) } else { None };
        self.expect(Token::Assign, "=")?;
        let body = self.parse_expr()?;
        let body = match params {
            Some(params) => Expr::new(ExprKind::Function(params, Arc::new(body)), pos),
            None => body,
        };
        Ok(Bind { name, body: Arc::new(body) })
    }

    /// Parameters after the opening parenthesis, through the closing one
    fn parse_params(&mut self) -> Result<Vec<Param>, EvalError> {
        let mut params = Vec::new();
        loop {
            if self.eat(&Token::RParen) {
                return Ok(params);
            }
            let name = self.ident("parameter name")?;
            let default = if self.eat(&Token::Assign) {
                Some(Arc::new(self.parse_expr()?))
            } else {
                None
            };
            params.push(Param { name, default });
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen, ", or )")?;
                return Ok(params);
            }
        }
    }

    /// Call arguments after the opening parenthesis, through the closing one
    fn parse_args(&mut self) -> Result<Vec<Arg>, EvalError> {
        let mut args: Vec<Arg> = Vec::new();
        loop {
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            let pos = self.pos();
            let named = match (self.peek(), self.peek_next()) {
                (Token::Ident(name), Some(Token::Assign)) => Some(name.clone()),
                _ => None,
            };
            let arg = match named {
                Some(name) => {
                    self.advance();
                    self.advance();
                    Arg { name: Some(name), value: self.parse_expr()? }
                }
                None => {
                    if args.iter().any(|a| a.name.is_some()) {
                        return Err(self.error_at("positional argument after a named argument", pos));
                    }
                    Arg { name: None, value: self.parse_expr()? }
                }
            };
            args.push(arg);
            if !self.eat(&Token::Comma) {
                self.expect(Token::RParen, ", or )")?;
                return Ok(args);
            }
        }
    }
}

fn binary_op(token: &Token) -> Option<BinOp> {
    Some(match token {
        Token::Star => BinOp::Mul,
        Token::Slash => BinOp::Div,
        Token::Percent => BinOp::Mod,
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Sub,
        Token::ShiftLeft => BinOp::Shl,
        Token::ShiftRight => BinOp::Shr,
        Token::Lt => BinOp::Lt,
        Token::Le => BinOp::Le,
        Token::Gt => BinOp::Gt,
        Token::Ge => BinOp::Ge,
        Token::Keyword(Keyword::In) => BinOp::In,
        Token::EqEq => BinOp::Eq,
        Token::NotEq => BinOp::Ne,
        Token::Amp => BinOp::BitAnd,
        Token::Caret => BinOp::BitXor,
        Token::Pipe => BinOp::BitOr,
        Token::AndAnd => BinOp::And,
        Token::OrOr => BinOp::Or,
        _ => return None,
    })
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("identifier {}", name),
        Token::Number(n) => format!("number {}", n),
        Token::Str(s) => format!("string {:?}", s),
        Token::Keyword(kw) => format!("keyword {}", kw.as_str()),
        Token::Eof => "end of input".to_string(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        parse("test.jsonnet", source).unwrap()
    }

    #[test]
    fn test_precedence() {
        let expr = parse_ok("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary(_, BinOp::Add, right) => {
                assert!(matches!(right.kind, ExprKind::Binary(_, BinOp::Mul, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = parse_ok("10 - 4 - 3");
        match expr.kind {
            ExprKind::Binary(left, BinOp::Sub, _) => {
                assert!(matches!(left.kind, ExprKind::Binary(_, BinOp::Sub, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_native_call_chain() {
        let expr = parse_ok(r#"std.native("invoke:math")("add", [1, 2])"#);
        match expr.kind {
            ExprKind::Apply(callee, args) => {
                assert_eq!(args.len(), 2);
                assert!(matches!(callee.kind, ExprKind::Apply(_, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_object_members() {
        let expr = parse_ok("{ local x = 1, a: x, b:: 2, 'c d'::: 3, [\"e\"]: 4, f(y): y, }");
        match expr.kind {
            ExprKind::Object(members) => {
                assert_eq!(members.len(), 6);
                assert!(matches!(members[0], Member::Local(_)));
                match &members[2] {
                    Member::Field(f) => assert_eq!(f.visibility, Visibility::Hidden),
                    other => panic!("unexpected member: {:?}", other),
                }
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_named_arguments() {
        let expr = parse_ok("f(1, b=2)");
        match expr.kind {
            ExprKind::Apply(_, args) => {
                assert_eq!(args[0].name, None);
                assert_eq!(args[1].name.as_deref(), Some("b"));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_positional_after_named_is_error() {
        let err = parse("test.jsonnet", "f(a=1, 2)").unwrap_err();
        assert!(err.message.contains("positional argument after a named argument"));
    }

    #[test]
    fn test_unexpected_token_reports_location() {
        let err = parse("test.jsonnet", "local x = ; x").unwrap_err();
        let location = err.location.unwrap();
        assert_eq!((location.line, location.column), (1, 11));
        assert!(err.message.contains("expected expression"));
    }

    #[test]
    fn test_trailing_garbage_is_error() {
        assert!(parse("test.jsonnet", "1 2").is_err());
    }

    #[test]
    fn test_comprehensions() {
        match parse_ok("[x * 2 for x in [1, 2] if x > 1]").kind {
            ExprKind::ArrayComp(_, specs) => {
                assert!(matches!(specs[..], [CompSpec::For(ref name, _), CompSpec::If(_)] if name == "x"));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
        match parse_ok("{ local y = 1, [k]: y for k in ['a'] }").kind {
            ExprKind::ObjectComp(comp) => {
                assert_eq!(comp.locals.len(), 1);
                assert_eq!(comp.specs.len(), 1);
            }
            other => panic!("unexpected tree: {:?}", other),
        }
        let err = parse("test.jsonnet", "{ a: 1 for k in [] }").unwrap_err();
        assert!(err.message.contains("computed"));
    }

    #[test]
    fn test_self_super_and_plus_fields() {
        match parse_ok("{ a+: super.a, b: self.a, c: 'a' in super, d: $.b }").kind {
            ExprKind::Object(members) => {
                match &members[0] {
                    Member::Field(a) => {
                        assert!(a.plus);
                        assert!(matches!(a.value.kind, ExprKind::SuperIndex(_)));
                    }
                    other => panic!("unexpected member: {:?}", other),
                }
                match &members[2] {
                    Member::Field(c) => assert!(matches!(c.value.kind, ExprKind::InSuper(_))),
                    other => panic!("unexpected member: {:?}", other),
                }
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_slices() {
        for source in ["a[1:2]", "a[:2]", "a[1:]", "a[::2]", "a[1::2]", "a[:]"] {
            assert!(matches!(parse_ok(source).kind, ExprKind::Slice(_)), "{}", source);
        }
        assert!(matches!(parse_ok("a[1]").kind, ExprKind::Index(_, _)));
    }

    #[test]
    fn test_bitwise_precedence() {
        match parse_ok("1 | 2 & 3").kind {
            ExprKind::Binary(_, BinOp::BitOr, right) => {
                assert!(matches!(right.kind, ExprKind::Binary(_, BinOp::BitAnd, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_nesting_limit() {
        let results = crate::worker::run(None, |_| {
            let deep = format!("{}1{}", "[".repeat(MAX_NESTING + 10), "]".repeat(MAX_NESTING + 10));
            let chain = vec!["1"; MAX_NESTING + 10].join(" + ");
            let shallow = format!("{}1{}", "[".repeat(50), "]".repeat(50));
            Ok([deep, chain, shallow].map(|source| parse("test.jsonnet", &source)))
        })
        .unwrap();
        let [deep, chain, shallow] = results;
        assert!(deep.unwrap_err().message.contains("nested deeper"));
        assert!(chain.unwrap_err().message.contains("nested deeper"));
        assert!(shallow.is_ok());
    }
}
