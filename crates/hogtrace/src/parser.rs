//! Recursive-descent / precedence-climbing parser for probe source text
//! (spec.md §4.1).
//!
//! Grammar (informal, matches spec.md's EBNF):
//!
//! ```text
//! program     := probe*
//! probe       := probeSpec predicate? "{" statement* "}"
//! probeSpec   := segment ":" segment ":" probePoint
//! probePoint  := ("entry" | "exit") ("+" INT)?
//! predicate   := "/" expr "/"
//! statement   := action ";"
//! action      := sample | assignment | capture
//! sample      := "sample" (percent | ratio)
//! assignment  := request_var "=" expr
//! capture     := ("capture" | "send") "(" arg_list? ")"
//! expr        := or_expr
//! or_expr     := and_expr (("||" | "or") and_expr)*
//! and_expr    := eq_expr (("&&" | "and") eq_expr)*
//! eq_expr     := cmp_expr (("==" | "!=") cmp_expr)*
//! cmp_expr    := add_expr (("<" | ">" | "<=" | ">=") add_expr)*
//! add_expr    := mul_expr (("+" | "-") mul_expr)*
//! mul_expr    := unary (("*" | "/" | "%") unary)*
//! unary       := ("!" | "not" | "-" | "+")? postfix
//! postfix     := atom ("." ident | "[" expr "]" | "(" arg_list? ")")*
//! atom        := literal | ident | request_var | "(" expr ")"
//! ```
//!
//! The closing `/` of a predicate and the division operator share a token;
//! `mul_expr` disambiguates by checking whether the token after a `/` can
//! start an operand at all (a predicate's closing slash is always followed
//! by `{`).

use std::fmt;

use thiserror::Error;

use crate::ast::{
    Action, AssignmentAction, BinaryOp, BinaryOperator, CaptureAction, Expression, FieldAccess, FunctionCall,
    Identifier, IndexAccess, Literal, LiteralValue, Predicate, Probe, ProbeSpec, Program, RequestVar, SampleAction,
    UnaryOp, UnaryOperator,
};
use crate::lexer::{lex, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{line}:{column}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// A parse failure, collecting every syntax error found in one pass rather
/// than stopping at the first (spec.md §4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub errors: Vec<SyntaxError>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Parses complete probe source text into a [`Program`].
///
/// # Errors
///
/// Returns every syntax error collected during the pass; never returns a
/// partially built `Program` (spec.md §4.1's "a parse either fully succeeds
/// or reports every error" invariant).
pub fn parse(source: &str) -> Result<Program, ParseError> {
    let (tokens, lex_errors) = lex(source);
    let mut parser = Parser::new(tokens);
    let probes = parser.parse_program();

    let mut errors: Vec<SyntaxError> = lex_errors
        .into_iter()
        .map(|e| SyntaxError {
            message: e.message,
            line: e.line,
            column: e.column,
        })
        .collect();
    errors.extend(parser.errors);

    if errors.is_empty() {
        Ok(Program { probes })
    } else {
        Err(ParseError { errors })
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&mut self, message: impl Into<String>) {
        let tok = self.peek();
        self.errors.push(SyntaxError {
            message: message.into(),
            line: tok.line,
            column: tok.column,
        });
    }

    /// Skips tokens until the closing `}` of the broken probe (or EOF), so
    /// one bad probe block doesn't suppress diagnostics for the rest of the
    /// program.
    fn recover_to_next_probe(&mut self) {
        while !self.is_eof() {
            if matches!(self.peek().kind, TokenKind::RBrace) {
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> Option<Token> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind) {
            Some(self.advance())
        } else {
            let found = self.peek().raw.clone();
            self.error(format!("expected {context}, found '{found}'"));
            None
        }
    }

    fn parse_program(&mut self) -> Vec<Probe> {
        let mut probes = Vec::new();
        while !self.is_eof() {
            if let Some(probe) = self.parse_probe() {
                probes.push(probe);
            } else {
                self.recover_to_next_probe();
            }
        }
        probes
    }

    fn parse_probe(&mut self) -> Option<Probe> {
        let spec = self.parse_probe_spec()?;

        let predicate = if matches!(self.peek().kind, TokenKind::Slash) {
            self.advance(); // opening '/'
            let expr = self.parse_expression()?;
            self.expect(&TokenKind::Slash, "'/' to close the predicate")?;
            Some(Predicate { expression: expr })
        } else {
            None
        };

        self.expect(&TokenKind::LBrace, "'{' to start the probe body")?;
        let mut actions = Vec::new();
        while !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof) {
            actions.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "'}' to close the probe body")?;

        Some(Probe { spec, predicate, actions })
    }

    /// A statement is an action terminated by `;` (spec.md §4.1, §6).
    fn parse_statement(&mut self) -> Option<Action> {
        let action = self.parse_action()?;
        self.expect(&TokenKind::Semicolon, "';' to terminate the statement")?;
        Some(action)
    }

    fn parse_probe_spec(&mut self) -> Option<ProbeSpec> {
        let provider = self.parse_spec_segment()?;
        self.expect(&TokenKind::Colon, "':' in probe spec")?;
        let module_function = self.parse_spec_segment()?;
        self.expect(&TokenKind::Colon, "':' in probe spec")?;
        let mut probe_point = self.parse_spec_segment()?;

        if matches!(self.peek().kind, TokenKind::Plus) {
            self.advance();
            let tok = self.advance();
            let TokenKind::Int(offset) = tok.kind else {
                self.error("expected an integer line offset after '+'");
                return None;
            };
            probe_point = format!("{probe_point}+{offset}");
        }

        Some(ProbeSpec::new(provider, module_function, probe_point))
    }

    /// A provider/module_function/probe_point segment is any run of
    /// identifier-like tokens joined by `.`; we accept it as raw text since
    /// these segments are opaque to the VM (spec.md §3).
    fn parse_spec_segment(&mut self) -> Option<String> {
        let mut segment = String::new();
        loop {
            match &self.peek().kind {
                TokenKind::Ident(name) => {
                    segment.push_str(name);
                    self.advance();
                }
                TokenKind::Star => {
                    segment.push('*');
                    self.advance();
                }
                _ => break,
            }
            if matches!(self.peek().kind, TokenKind::Dot) {
                segment.push('.');
                self.advance();
            } else {
                break;
            }
        }
        if segment.is_empty() {
            self.error("expected a probe spec segment");
            None
        } else {
            Some(segment)
        }
    }

    fn parse_action(&mut self) -> Option<Action> {
        match self.peek().kind.clone() {
            TokenKind::KwSample => self.parse_sample(),
            TokenKind::KwCapture => self.parse_capture(),
            TokenKind::RequestVar(_) => self.parse_assignment(),
            _ => {
                self.error("expected an action ('sample', 'capture', or an assignment)");
                None
            }
        }
    }

    fn parse_sample(&mut self) -> Option<Action> {
        self.advance(); // 'sample'
        let tok = self.advance();
        match tok.kind {
            TokenKind::Int(n) if matches!(self.peek().kind, TokenKind::Percent) => {
                self.advance();
                if n < 0 {
                    self.error("sample percentage must not be negative");
                    return None;
                }
                let percentage = u32::try_from(n).unwrap_or(u32::MAX);
                Some(Action::Sample(SampleAction {
                    is_percentage: true,
                    percentage: Some(percentage),
                    numerator: None,
                    denominator: None,
                    threshold: f64::from(percentage) / 100.0,
                }))
            }
            TokenKind::Int(numerator) if matches!(self.peek().kind, TokenKind::Slash) => {
                self.advance();
                let denom_tok = self.advance();
                let TokenKind::Int(denominator) = denom_tok.kind else {
                    self.error("expected an integer denominator in sample ratio");
                    return None;
                };
                if denominator == 0 {
                    self.error("sample ratio denominator must not be zero");
                    return None;
                }
                if numerator < 0 || denominator < 0 {
                    self.error("sample ratio must not be negative");
                    return None;
                }
                let numerator = u64::try_from(numerator).unwrap_or(u64::MAX);
                let denominator = u64::try_from(denominator).unwrap_or(u64::MAX);
                #[allow(clippy::cast_precision_loss, reason = "ratios are small counters, not precision-sensitive")]
                let threshold = numerator as f64 / denominator as f64;
                Some(Action::Sample(SampleAction {
                    is_percentage: false,
                    percentage: None,
                    numerator: Some(numerator),
                    denominator: Some(denominator),
                    threshold,
                }))
            }
            _ => {
                self.error("expected a percentage ('10%') or ratio ('1/100') after 'sample'");
                None
            }
        }
    }

    fn parse_assignment(&mut self) -> Option<Action> {
        let var_tok = self.advance();
        let TokenKind::RequestVar(name) = var_tok.kind else {
            self.error("expected a request variable");
            return None;
        };
        let variable = split_request_var(&name, &var_tok.raw);
        self.expect(&TokenKind::Assign, "'=' in assignment")?;
        let value = self.parse_expression()?;
        Some(Action::Assignment(AssignmentAction { variable, value }))
    }

    fn parse_capture(&mut self) -> Option<Action> {
        let keyword = self.advance(); // 'capture' or 'send'
        self.expect(&TokenKind::LParen, "'(' after 'capture'/'send'")?;
        let mut arguments = Vec::new();
        let mut named_arguments = Vec::new();
        if !matches!(self.peek().kind, TokenKind::RParen) {
            loop {
                if let (TokenKind::Ident(name), Some(TokenKind::Assign)) =
                    (self.peek().kind.clone(), self.tokens.get(self.pos + 1).map(|t| &t.kind))
                {
                    self.advance();
                    self.advance();
                    let value = self.parse_expression()?;
                    named_arguments.push((name, value));
                } else {
                    arguments.push(self.parse_expression()?);
                }
                if matches!(self.peek().kind, TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')' to close 'capture(...)'")?;
        Some(Action::Capture(CaptureAction {
            function: keyword.raw,
            arguments,
            named_arguments,
        }))
    }

    fn parse_expression(&mut self) -> Option<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Option<Expression> {
        let mut left = self.parse_and()?;
        while matches!(self.peek().kind, TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = self.binary(BinaryOperator::Or, left, right);
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expression> {
        let mut left = self.parse_equality()?;
        while matches!(self.peek().kind, TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_equality()?;
            left = self.binary(BinaryOperator::And, left, right);
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<Expression> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOperator::Eq,
                TokenKind::NotEq => BinaryOperator::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = self.binary(op, left, right);
        }
        Some(left)
    }

    fn parse_comparison(&mut self) -> Option<Expression> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOperator::Lt,
                TokenKind::Gt => BinaryOperator::Gt,
                TokenKind::Le => BinaryOperator::Le,
                TokenKind::Ge => BinaryOperator::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.binary(op, left, right);
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOperator::Mul,
                // A lone '/' also closes a predicate (spec.md §4.1's
                // `/ expr /`). Only treat it as division when another
                // operand actually follows; otherwise leave it for
                // `parse_probe` to consume as the closing delimiter.
                TokenKind::Slash if self.next_token_starts_operand() => BinaryOperator::Div,
                TokenKind::Slash => break,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
        Some(left)
    }

    /// Whether the token after the current one can start a unary operand,
    /// used to tell a division `/` from a predicate's closing `/`.
    fn next_token_starts_operand(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(
                TokenKind::Int(_)
                    | TokenKind::Float(_)
                    | TokenKind::Str(_)
                    | TokenKind::Bool(_)
                    | TokenKind::Null
                    | TokenKind::Ident(_)
                    | TokenKind::RequestVar(_)
                    | TokenKind::LParen
                    | TokenKind::Bang
                    | TokenKind::Minus
                    | TokenKind::Plus
            )
        )
    }

    fn parse_unary(&mut self) -> Option<Expression> {
        let (op, raw) = match self.peek().kind {
            TokenKind::Bang => (Some(UnaryOperator::Not), "!"),
            TokenKind::Minus => (Some(UnaryOperator::Neg), "-"),
            TokenKind::Plus => (Some(UnaryOperator::Pos), "+"),
            _ => (None, ""),
        };
        if let Some(operator) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let raw_text = format!("{raw}{}", operand.raw());
            return Some(Expression::UnaryOp(UnaryOp {
                operator,
                operand: Box::new(operand),
                raw: raw_text,
            }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expression> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.peek().kind.clone() {
                TokenKind::Dot => {
                    self.advance();
                    let field_tok = self.advance();
                    let TokenKind::Ident(field) = field_tok.kind else {
                        self.error("expected a field name after '.'");
                        return None;
                    };
                    let raw = format!("{}.{field}", expr.raw());
                    expr = Expression::FieldAccess(FieldAccess {
                        object: Box::new(expr),
                        field,
                        raw,
                    });
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&TokenKind::RBracket, "']' to close index access")?;
                    let raw = format!("{}[{}]", expr.raw(), index.raw());
                    expr = Expression::IndexAccess(IndexAccess {
                        object: Box::new(expr),
                        index: Box::new(index),
                        raw,
                    });
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_atom(&mut self) -> Option<Expression> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Int(n) => Some(Expression::Literal(Literal {
                value: LiteralValue::Int(n),
                raw: tok.raw,
            })),
            TokenKind::Float(x) => Some(Expression::Literal(Literal {
                value: LiteralValue::Float(x),
                raw: tok.raw,
            })),
            TokenKind::Str(s) => Some(Expression::Literal(Literal {
                value: LiteralValue::Str(s),
                raw: tok.raw,
            })),
            TokenKind::Bool(b) => Some(Expression::Literal(Literal {
                value: LiteralValue::Bool(b),
                raw: tok.raw,
            })),
            TokenKind::Null => Some(Expression::Literal(Literal {
                value: LiteralValue::Null,
                raw: tok.raw,
            })),
            TokenKind::RequestVar(name) => Some(Expression::RequestVar(split_request_var(&name, &tok.raw))),
            TokenKind::Ident(name) => {
                if matches!(self.peek().kind, TokenKind::LParen) {
                    self.advance();
                    let mut arguments = Vec::new();
                    if !matches!(self.peek().kind, TokenKind::RParen) {
                        loop {
                            arguments.push(self.parse_expression()?);
                            if matches!(self.peek().kind, TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')' to close function call")?;
                    let args_raw: Vec<&str> = arguments.iter().map(Expression::raw).collect();
                    let raw = format!("{name}({})", args_raw.join(", "));
                    Some(Expression::FunctionCall(FunctionCall {
                        function: name,
                        arguments,
                        raw,
                    }))
                } else {
                    Some(Expression::Identifier(Identifier { name: name.clone(), raw: name }))
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')' to close parenthesized expression")?;
                Some(inner)
            }
            _ => {
                self.error(format!("unexpected token '{}'", tok.raw));
                None
            }
        }
    }

    fn binary(&self, operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
        let raw = format!("{} {:?} {}", left.raw(), operator, right.raw());
        Expression::BinaryOp(BinaryOp {
            operator,
            left: Box::new(left),
            right: Box::new(right),
            raw,
        })
    }
}

fn split_request_var(name: &str, raw: &str) -> RequestVar {
    let (prefix, rest) = name.split_once('.').unwrap_or((name, ""));
    RequestVar {
        name: rest.to_owned(),
        prefix: prefix.to_owned(),
        raw: raw.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_probe() {
        let program = parse("http:server:request_end / status_code >= 500 / { sample 10%; }").unwrap();
        assert_eq!(program.probes.len(), 1);
        let probe = &program.probes[0];
        assert_eq!(probe.spec.full_spec, "http:server:request_end");
        assert!(probe.predicate.is_some());
        assert_eq!(probe.actions.len(), 1);
    }

    #[test]
    fn parses_assignment_and_capture() {
        let program = parse(
            r#"http:server:request_start { $req.start_ms = timestamp(); }
               http:server:request_end { capture(duration_ms=timestamp() - $req.start_ms, status_code); }"#,
        )
        .unwrap();
        assert_eq!(program.probes.len(), 2);
        assert_eq!(program.probes[1].actions.len(), 1);
    }

    #[test]
    fn parses_send_as_a_capture_alias() {
        let program = parse("fn:t:entry { send(value=arg0); }").unwrap();
        assert_eq!(program.probes[0].actions.len(), 1);
    }

    #[test]
    fn parses_entry_plus_offset_line_probes() {
        let program = parse("fn:myapp.function:entry+10 { capture(locals); }").unwrap();
        assert_eq!(program.probes[0].spec.probe_point, "entry+10");
    }

    #[test]
    fn probe_with_no_predicate_still_requires_braces() {
        let program = parse("fn:myapp.users.create_user:entry { capture(args); }").unwrap();
        assert!(program.probes[0].predicate.is_none());
    }

    #[test]
    fn division_inside_a_predicate_is_not_mistaken_for_its_closing_slash() {
        let program = parse("fn:t:entry / arg0 / 2 > 10 / { capture(value=arg0); }").unwrap();
        let predicate = program.probes[0].predicate.as_ref().unwrap();
        let Expression::BinaryOp(top) = &predicate.expression else {
            panic!("expected a binary op at the top level");
        };
        assert_eq!(top.operator, BinaryOperator::Gt);
    }

    #[test]
    fn collects_multiple_errors() {
        let err = parse(":: { }").unwrap_err();
        assert!(!err.errors.is_empty());
    }

    #[test]
    fn operator_precedence_binds_multiplicative_tighter_than_additive() {
        let program = parse("a:b:c / 1 + 2 * 3 == 7 / { capture(x=1); }").unwrap();
        let predicate = program.probes[0].predicate.as_ref().unwrap();
        let Expression::BinaryOp(top) = &predicate.expression else {
            panic!("expected a binary op at the top level");
        };
        assert_eq!(top.operator, BinaryOperator::Eq);
    }
}
