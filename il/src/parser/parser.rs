//! Recursive-descent parser for the instruction language

use super::ast::{Atom, Binding, Expr, Metadata, Program};
use crate::lexer::{Lexer, Span, Token, TokenKind};
use mnemo_core::ParseError;

/// Input larger than this is rejected before tokenizing.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;

type PResult<T> = Result<T, ParseError>;

/// Parse a complete instruction-language program from source text.
pub fn parse_program(source: &str) -> PResult<Program> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(ParseError::new(
            1,
            1,
            format!(
                "source exceeds the {}-byte limit ({} bytes)",
                MAX_SOURCE_BYTES,
                source.len()
            ),
        ));
    }

    let tokens = Lexer::new(source).tokenize();
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(Program { expr })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let span = self.current().span;
        ParseError::new(span.line, span.column, message.into())
    }

    fn expect_eof(&mut self) -> PResult<()> {
        if self.current().kind == TokenKind::Eof {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input after the top-level expression"))
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if &self.current().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", kind, self.current().kind)))
        }
    }

    /// `expression := atom | form`
    fn parse_expr(&mut self) -> PResult<Expr> {
        match &self.current().kind {
            TokenKind::LParen => self.parse_form(),
            TokenKind::String(_)
            | TokenKind::Number(_)
            | TokenKind::Boolean(_)
            | TokenKind::Identifier(_)
            | TokenKind::Variable(_) => self.parse_atom(),
            TokenKind::Error(msg) => Err(self.error(msg.clone())),
            other => Err(self.error(format!("expected an expression, found {:?}", other))),
        }
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let span = self.current().span;
        let value = match self.advance().kind {
            TokenKind::String(s) => Atom::String(s),
            TokenKind::Number(n) => Atom::Number(n),
            TokenKind::Boolean(b) => Atom::Boolean(b),
            TokenKind::Identifier(id) => Atom::Identifier(id),
            TokenKind::Variable(v) => Atom::Variable(v),
            other => return Err(self.error(format!("expected an atom, found {:?}", other))),
        };
        Ok(Expr::Atom { value, span })
    }

    /// `form := "(" operator operand* ")"`
    fn parse_form(&mut self) -> PResult<Expr> {
        let open = self.expect(&TokenKind::LParen)?;

        let operator = match &self.current().kind {
            TokenKind::Identifier(name) => name.clone(),
            other => return Err(self.error(format!("expected an operator name, found {:?}", other))),
        };
        self.advance();

        let expr = match operator.as_str() {
            "QUERY" => self.parse_query(open.span),
            "EXECUTE" => self.parse_execute(open.span),
            "PLAN" => self.parse_plan(open.span),
            "COMMUNICATE" => self.parse_communicate(open.span),
            "LET" => self.parse_let(open.span),
            "TRY" => self.parse_try(open.span),
            "AWAIT" => self.parse_await(open.span),
            "SANDBOXED-EXECUTE" => self.parse_sandboxed_execute(open.span),
            "CLARIFY" => self.parse_clarify(open.span),
            "EVENT" => self.parse_event(open.span),
            other => Err(ParseError::new(
                open.span.line,
                open.span.column,
                format!("unknown operator: {}", other),
            )),
        }?;

        self.expect(&TokenKind::RParen)?;
        Ok(expr)
    }

    fn parse_query(&mut self, span: Span) -> PResult<Expr> {
        let intent = Box::new(self.parse_expr()?);
        let meta = self.parse_optional_metadata()?;
        if !self.at_rparen() {
            return Err(self.error("QUERY takes an intent and an optional metadata block"));
        }
        Ok(Expr::Query { intent, meta, span })
    }

    fn parse_execute(&mut self, span: Span) -> PResult<Expr> {
        let tool = self.expect_tool_name()?;
        let (args, meta) = self.parse_args_and_optional_metadata()?;
        Ok(Expr::Execute { tool, args, meta, span })
    }

    fn parse_sandboxed_execute(&mut self, span: Span) -> PResult<Expr> {
        let tool = self.expect_tool_name()?;
        let (args, limits) = self.parse_args_and_optional_metadata()?;
        Ok(Expr::SandboxedExecute { tool, args, limits, span })
    }

    fn parse_plan(&mut self, span: Span) -> PResult<Expr> {
        let mut steps = Vec::new();
        while !self.at_rparen() {
            steps.push(self.parse_expr()?);
        }
        if steps.is_empty() {
            return Err(ParseError::new(
                span.line,
                span.column,
                "PLAN requires at least one expression",
            ));
        }
        Ok(Expr::Plan { steps, span })
    }

    fn parse_communicate(&mut self, span: Span) -> PResult<Expr> {
        let recipient = Box::new(self.parse_expr()?);
        let message = Box::new(self.parse_expr()?);
        Ok(Expr::Communicate { recipient, message, span })
    }

    fn parse_let(&mut self, span: Span) -> PResult<Expr> {
        self.expect(&TokenKind::LParen)?;
        let mut bindings = Vec::new();
        let mut seen = std::collections::HashSet::new();

        while !self.check(&TokenKind::RParen) {
            self.expect(&TokenKind::LParen)?;
            let name = match &self.current().kind {
                TokenKind::Identifier(name) => name.clone(),
                other => return Err(self.error(format!("expected a binding name, found {:?}", other))),
            };
            self.advance();
            if !seen.insert(name.clone()) {
                return Err(self.error(format!("duplicate LET binding name: {}", name)));
            }
            let value = Box::new(self.parse_expr()?);
            self.expect(&TokenKind::RParen)?;
            bindings.push(Binding { name, value });
        }
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.parse_expr()?);
        Ok(Expr::Let { bindings, body, span })
    }

    fn parse_try(&mut self, span: Span) -> PResult<Expr> {
        let body = Box::new(self.parse_expr()?);

        match &self.current().kind {
            TokenKind::Identifier(name) if name == "ON-FAIL" => {
                self.advance();
            }
            other => return Err(self.error(format!("TRY requires an ON-FAIL clause, found {:?}", other))),
        }

        let fail_body = Box::new(self.parse_expr()?);

        if !self.at_rparen() {
            return Err(self.error("TRY takes exactly one ON-FAIL clause"));
        }

        Ok(Expr::Try { body, fail_body, span })
    }

    fn parse_await(&mut self, span: Span) -> PResult<Expr> {
        let event = Box::new(self.parse_expr()?);
        let meta = self.parse_optional_metadata()?;
        if !self.at_rparen() {
            return Err(self.error("AWAIT takes an event expression and an optional timeout metadata block"));
        }
        Ok(Expr::Await { event, meta, span })
    }

    fn parse_clarify(&mut self, span: Span) -> PResult<Expr> {
        let question = Box::new(self.parse_expr()?);
        let mut options = Vec::new();
        while !self.at_rparen() {
            options.push(self.parse_expr()?);
        }
        Ok(Expr::Clarify { question, options, span })
    }

    fn parse_event(&mut self, span: Span) -> PResult<Expr> {
        let meta = self
            .parse_optional_metadata()?
            .ok_or_else(|| self.error("EVENT requires a metadata block describing the selector"))?;
        Ok(Expr::Event { meta, span })
    }

    /// Shared shape for `EXECUTE`/`SANDBOXED-EXECUTE`: zero or more operand
    /// expressions followed by an optional trailing metadata block.
    fn parse_args_and_optional_metadata(&mut self) -> PResult<(Vec<Expr>, Option<Metadata>)> {
        let mut args = Vec::new();
        while !self.at_rparen() && !self.check(&TokenKind::LBrace) {
            args.push(self.parse_expr()?);
        }
        let meta = self.parse_optional_metadata()?;
        Ok((args, meta))
    }

    fn parse_optional_metadata(&mut self) -> PResult<Option<Metadata>> {
        if self.check(&TokenKind::LBrace) {
            Ok(Some(self.parse_metadata()?))
        } else {
            Ok(None)
        }
    }

    /// `metadata := "{" key "=" value ("," key "=" value)* "}"`
    fn parse_metadata(&mut self) -> PResult<Metadata> {
        self.expect(&TokenKind::LBrace)?;
        let mut meta = Metadata::default();

        while !self.check(&TokenKind::RBrace) {
            let key = match &self.current().kind {
                TokenKind::Identifier(name) => name.clone(),
                other => return Err(self.error(format!("expected a metadata key, found {:?}", other))),
            };
            self.advance();
            self.expect(&TokenKind::Eq)?;

            let value = match self.advance().kind {
                TokenKind::String(s) => Atom::String(s),
                TokenKind::Number(n) => Atom::Number(n),
                TokenKind::Boolean(b) => Atom::Boolean(b),
                TokenKind::Identifier(id) => Atom::Identifier(id),
                TokenKind::Variable(v) => Atom::Variable(v),
                other => return Err(self.error(format!("expected a metadata value, found {:?}", other))),
            };

            meta.entries.insert(key, value);

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(meta)
    }

    fn expect_tool_name(&mut self) -> PResult<String> {
        match &self.current().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::String(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected a tool name, found {:?}", other))),
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn at_rparen(&self) -> bool {
        self.check(&TokenKind::RParen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_query_form() {
        let program = parse_program(r#"(QUERY "find the onboarding checklist")"#).unwrap();
        assert!(matches!(program.expr, Expr::Query { .. }));
    }

    #[test]
    fn parses_nested_plan_and_execute() {
        let program = parse_program(
            r#"(PLAN (EXECUTE search "east" {timeout=5}) (QUERY "result"))"#,
        )
        .unwrap();
        match program.expr {
            Expr::Plan { steps, .. } => assert_eq!(steps.len(), 2),
            _ => panic!("expected PLAN"),
        }
    }

    #[test]
    fn let_rejects_duplicate_binding_names() {
        let err = parse_program(r#"(LET ((x 1) (x 2)) $x)"#).unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn let_binds_and_resolves_variable_reference() {
        let program = parse_program(r#"(LET ((x 1)) $x)"#).unwrap();
        match program.expr {
            Expr::Let { bindings, body, .. } => {
                assert_eq!(bindings.len(), 1);
                assert!(matches!(*body, Expr::Atom { value: Atom::Variable(ref v), .. } if v == "x"));
            }
            _ => panic!("expected LET"),
        }
    }

    #[test]
    fn try_requires_exactly_one_on_fail_clause() {
        let err = parse_program(r#"(TRY (QUERY "x"))"#).unwrap_err();
        assert!(err.message.contains("ON-FAIL"));
    }

    #[test]
    fn try_with_on_fail_parses() {
        let program = parse_program(r#"(TRY (QUERY "x") ON-FAIL (QUERY "y"))"#).unwrap();
        assert!(matches!(program.expr, Expr::Try { .. }));
    }

    #[test]
    fn await_parses_event_and_timeout_metadata() {
        let program =
            parse_program(r#"(AWAIT (EVENT {type="reply", source="agent-1"}) {timeout=5000})"#)
                .unwrap();
        assert!(matches!(program.expr, Expr::Await { .. }));
    }

    #[test]
    fn sandboxed_execute_requires_tool_name() {
        let err = parse_program(r#"(SANDBOXED-EXECUTE)"#).unwrap_err();
        assert!(err.message.contains("tool name"));
    }

    #[test]
    fn oversized_source_is_rejected_before_tokenizing() {
        let source = format!(r#"(QUERY "{}")"#, "a".repeat(MAX_SOURCE_BYTES));
        let err = parse_program(&source).unwrap_err();
        assert!(err.message.contains("exceeds"));
    }

    #[test]
    fn trailing_tokens_after_the_top_level_expression_are_rejected() {
        let err = parse_program(r#"(QUERY "x") (QUERY "y")"#).unwrap_err();
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = parse_program(r#"(FROBNICATE "x")"#).unwrap_err();
        assert!(err.message.contains("unknown operator"));
    }
}
