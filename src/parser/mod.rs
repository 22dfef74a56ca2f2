use crate::ast::*;
use crate::lexer::Token;
use crate::vm::fixed;

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    ast: Ast,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Binary operator precedence, loosest first.
static PRECEDENCE: &[&[(Token, NodeKind)]] = &[
    &[(Token::OrOr, NodeKind::LogOr)],
    &[(Token::AndAnd, NodeKind::LogAnd)],
    &[(Token::Pipe, NodeKind::BitOr)],
    &[(Token::Caret, NodeKind::BitXor)],
    &[(Token::Amp, NodeKind::BitAnd)],
    &[(Token::EqEq, NodeKind::Eq), (Token::NotEq, NodeKind::Neq)],
    &[
        (Token::Less, NodeKind::Lt),
        (Token::Greater, NodeKind::Gt),
        (Token::LessEq, NodeKind::Leq),
        (Token::GreaterEq, NodeKind::Geq),
    ],
    &[(Token::Plus, NodeKind::Add), (Token::Minus, NodeKind::Sub)],
    &[(Token::Star, NodeKind::Mul), (Token::Slash, NodeKind::Div), (Token::Percent, NodeKind::Mod)],
];

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0, ast: Ast::new() }
    }

    /// Build a parser straight from [`crate::lexer::lex`] output.
    pub fn from_lexed(tokens: Vec<(Token, std::ops::Range<usize>)>) -> Self {
        Parser::new(
            tokens
                .into_iter()
                .map(|(t, r)| (t, Span { start: r.start, end: r.end }))
                .collect(),
        )
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .or_else(|| self.tokens.last().map(|(_, s)| Span { start: s.end, end: s.end }))
            .unwrap_or(Span::UNKNOWN)
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            return Span::UNKNOWN;
        }
        self.tokens.get(self.pos - 1).map(|(_, s)| *s).unwrap_or(Span::UNKNOWN)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => Err(self.error("GL-P001", format!("expected {:?}, got {:?}", expected, tok))),
            None => Err(self.error("GL-P002", format!("expected {:?}, got EOF", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let span = self.peek_span();
                self.advance();
                Ok((name, span))
            }
            Some(tok) => Err(self.error("GL-P001", format!("expected identifier, got {:?}", tok))),
            None => Err(self.error("GL-P002", "expected identifier, got EOF".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn span_from(&self, start: Span) -> Span {
        start.merge(self.prev_span())
    }

    // ---- Top-level parsing ----

    /// Parse a whole compilation unit. The returned root is a `ProgramStart`
    /// node holding every item that parsed; errors are collected rather than
    /// stopping at the first one.
    pub fn parse_program(mut self) -> (Ast, NodeId, Vec<ParseError>) {
        let root = self.ast.add(NodeKind::ProgramStart, Span::UNKNOWN);
        let mut errors: Vec<ParseError> = Vec::new();
        const MAX_ERRORS: usize = 20;

        while !self.at_end() {
            if errors.len() >= MAX_ERRORS {
                break;
            }
            let start = self.pos;
            match self.parse_item() {
                Ok(item) => self.ast.push_child(root, item),
                Err(e) => {
                    errors.push(e);
                    self.sync_to_item_boundary();
                    if self.pos == start {
                        self.advance();
                    }
                }
            }
        }

        if let Some(last) = self.tokens.last() {
            self.ast[root].span = Span { start: 0, end: last.1.end };
        }
        (self.ast, root, errors)
    }

    /// Skip to the end of the broken statement or to the next item keyword.
    /// Brace depth is tracked so nested `{…}` blocks are skipped whole.
    fn sync_to_item_boundary(&mut self) {
        let mut depth: usize = 0;
        while let Some(tok) = self.peek() {
            match tok {
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    if depth <= 1 {
                        self.advance();
                        return;
                    }
                    depth -= 1;
                }
                Token::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::Fn | Token::Struct | Token::SyscallDef if depth == 0 => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_item(&mut self) -> Result<NodeId> {
        match self.peek() {
            Some(Token::Fn) => self.parse_fn_def(),
            Some(Token::Struct) => self.parse_struct_def(),
            Some(Token::SyscallDef) => self.parse_syscall_def(),
            _ => self.parse_statement(),
        }
    }

    /// `fn name(a, b[], p: point) { ... }`
    fn parse_fn_def(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::Fn)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut children = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let (pname, pspan) = self.expect_ident()?;
                let arg = self.ast.add_named(NodeKind::FuncDefArg, pname, pspan);
                if let Some(ty) = self.parse_typespec()? {
                    self.ast.push_child(arg, ty);
                }
                self.ast[arg].span = self.span_from(pspan);
                children.push(arg);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        children.push(self.parse_block()?);
        let f = self.ast.add_with(NodeKind::FuncDef, self.span_from(start), children);
        self.ast[f].name = Some(name);
        Ok(f)
    }

    /// `struct point { var x; var y; }`
    fn parse_struct_def(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::Struct)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::LBrace)?;
        let mut members = Vec::new();
        while !self.check(&Token::RBrace) {
            self.expect(&Token::Var)?;
            loop {
                let (mname, mspan) = self.expect_ident()?;
                let member = self.ast.add_named(NodeKind::Declare, mname, mspan);
                if let Some(ty) = self.parse_typespec()? {
                    self.ast.push_child(member, ty);
                }
                if self.check(&Token::Assign) {
                    return Err(self.error("GL-P006", "struct members cannot have initializers".into()));
                }
                self.ast[member].span = self.span_from(mspan);
                members.push(member);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::Semi)?;
        }
        self.expect(&Token::RBrace)?;
        let s = self.ast.add_with(NodeKind::StructDef, self.span_from(start), members);
        self.ast[s].name = Some(name);
        Ok(s)
    }

    /// `syscalldef name(a, b);`
    fn parse_syscall_def(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::SyscallDef)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let (aname, aspan) = self.expect_ident()?;
                args.push(self.ast.add_named(NodeKind::FuncDefArg, aname, aspan));
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        self.expect(&Token::Semi)?;
        let s = self.ast.add_with(NodeKind::SyscallDef, self.span_from(start), args);
        self.ast[s].name = Some(name);
        Ok(s)
    }

    /// `[4][n]: point` — dimensions outermost first, then an optional struct
    /// type. `[]` leaves a dimension open; it is marked with `size == -1`.
    fn parse_typespec(&mut self) -> Result<Option<NodeId>> {
        let mut dims = Vec::new();
        while self.check(&Token::LBracket) {
            let start = self.expect(&Token::LBracket)?;
            let (dim, open) = if self.check(&Token::RBracket) {
                (self.ast.add_number(0, self.peek_span()), true)
            } else {
                (self.parse_expr()?, false)
            };
            self.expect(&Token::RBracket)?;
            let arr = self.ast.add_with(NodeKind::ArrayRef, self.span_from(start), vec![dim]);
            if open {
                self.ast[arr].size = -1;
            }
            dims.push(arr);
        }

        let mut inner = None;
        if self.eat(&Token::Colon) {
            let (tname, tspan) = self.expect_ident()?;
            inner = Some(self.ast.add_named(NodeKind::DataType, tname, tspan));
        }

        // nest from the innermost dimension outwards
        for arr in dims.into_iter().rev() {
            if let Some(t) = inner {
                self.ast.push_child(arr, t);
            }
            inner = Some(arr);
        }
        Ok(inner)
    }

    // ---- Statements ----

    fn parse_statement(&mut self) -> Result<NodeId> {
        match self.peek() {
            Some(Token::Var) => {
                let decl = self.parse_var_decl()?;
                self.expect(&Token::Semi)?;
                Ok(decl)
            }
            Some(Token::If) => self.parse_if(),
            Some(Token::While) => self.parse_while(),
            Some(Token::For) => self.parse_for(),
            Some(Token::Return) => self.parse_return(),
            Some(Token::LBrace) => self.parse_block(),
            Some(Token::Semi) => {
                let span = self.expect(&Token::Semi)?;
                Ok(self.ast.add(NodeKind::Multi, span))
            }
            Some(Token::Fn) | Some(Token::Struct) | Some(Token::SyscallDef) => Err(self.error(
                "GL-P005",
                "functions, structs and syscall declarations are only allowed at top level".into(),
            )),
            Some(_) => {
                let stmt = self.parse_simple()?;
                self.expect(&Token::Semi)?;
                Ok(stmt)
            }
            None => Err(self.error("GL-P002", "expected statement, got EOF".into())),
        }
    }

    /// Body of a conditional or loop: any statement but a bare declaration.
    fn parse_body(&mut self) -> Result<NodeId> {
        if self.check(&Token::Var) {
            return Err(self.error("GL-P005", "declarations must be inside a block".into()));
        }
        self.parse_statement()
    }

    fn parse_block(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.error("GL-P002", "expected RBrace, got EOF".into()));
            }
            stmts.push(self.parse_statement()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(self.ast.add_with(NodeKind::Block, self.span_from(start), stmts))
    }

    /// `var a, b[4], c = 1` without the terminator. A lone declaration is
    /// returned bare; anything else is wrapped in a `Multi`.
    fn parse_var_decl(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::Var)?;
        let mut items = Vec::new();
        loop {
            let (name, nspan) = self.expect_ident()?;
            let decl = self.ast.add_named(NodeKind::Declare, name.clone(), nspan);
            if let Some(ty) = self.parse_typespec()? {
                self.ast.push_child(decl, ty);
            }
            self.ast[decl].span = self.span_from(nspan);
            items.push(decl);
            if self.eat(&Token::Assign) {
                let value = self.parse_expr()?;
                let var = self.ast.add_named(NodeKind::Var, name, nspan);
                let target = self.ast.add_with(NodeKind::Ref, nspan, vec![var]);
                let span = self.span_from(nspan);
                items.push(self.ast.add_with(NodeKind::Assign, span, vec![target, value]));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        if items.len() == 1 {
            return Ok(items[0]);
        }
        Ok(self.ast.add_with(NodeKind::Multi, self.span_from(start), items))
    }

    fn parse_if(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::If)?;
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let mut children = vec![cond, self.parse_body()?];
        if self.eat(&Token::Else) {
            children.push(self.parse_body()?);
        }
        Ok(self.ast.add_with(NodeKind::If, self.span_from(start), children))
    }

    fn parse_while(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::While)?;
        self.expect(&Token::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        let body = self.parse_body()?;
        Ok(self.ast.add_with(NodeKind::While, self.span_from(start), vec![cond, body]))
    }

    /// `for (init; cond; step) body`, stored as `[init, cond, body, step]` so
    /// the children are already in execution order.
    fn parse_for(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::For)?;
        self.expect(&Token::LParen)?;

        let init_span = self.peek_span();
        let init = if self.check(&Token::Semi) {
            self.ast.add(NodeKind::Multi, init_span)
        } else if self.check(&Token::Var) {
            let decl = self.parse_var_decl()?;
            self.ast.add_with(NodeKind::Multi, init_span, vec![decl])
        } else {
            let stmt = self.parse_simple()?;
            self.ast.add_with(NodeKind::Multi, init_span, vec![stmt])
        };
        self.expect(&Token::Semi)?;

        let cond = if self.check(&Token::Semi) {
            self.ast.add_number(fixed::ONE, self.peek_span())
        } else {
            self.parse_expr()?
        };
        self.expect(&Token::Semi)?;

        let step_span = self.peek_span();
        let step = if self.check(&Token::RParen) {
            self.ast.add(NodeKind::Multi, step_span)
        } else {
            let stmt = self.parse_simple()?;
            self.ast.add_with(NodeKind::Multi, step_span, vec![stmt])
        };
        self.expect(&Token::RParen)?;

        let body = self.parse_body()?;
        Ok(self.ast.add_with(NodeKind::For, self.span_from(start), vec![init, cond, body, step]))
    }

    fn parse_return(&mut self) -> Result<NodeId> {
        let start = self.expect(&Token::Return)?;
        let value = if self.check(&Token::Semi) {
            self.ast.add_number(0, start)
        } else {
            self.parse_expr()?
        };
        self.expect(&Token::Semi)?;
        Ok(self.ast.add_with(NodeKind::Return, self.span_from(start), vec![value]))
    }

    /// An assignment or an expression evaluated for its side effects.
    fn parse_simple(&mut self) -> Result<NodeId> {
        let start = self.peek_span();
        let expr = self.parse_expr()?;
        let combine = match self.peek() {
            Some(Token::Assign) => None,
            Some(Token::PlusAssign) => Some(NodeKind::Add),
            Some(Token::MinusAssign) => Some(NodeKind::Sub),
            Some(Token::StarAssign) => Some(NodeKind::Mul),
            Some(Token::SlashAssign) => Some(NodeKind::Div),
            _ => return Ok(self.ast.add_with(NodeKind::Drop, self.span_from(start), vec![expr])),
        };
        if self.ast[expr].kind != NodeKind::Deref {
            return Err(self.error("GL-P004", "left side of assignment is not assignable".into()));
        }
        self.advance();
        let rhs = self.parse_expr()?;
        let value = match combine {
            Some(kind) => {
                let current = self.ast.deep_clone(expr);
                let span = self.span_from(start);
                self.ast.add_with(kind, span, vec![current, rhs])
            }
            None => rhs,
        };
        self.ast[expr].kind = NodeKind::Ref;
        Ok(self.ast.add_with(NodeKind::Assign, self.span_from(start), vec![expr, value]))
    }

    // ---- Expressions ----

    pub fn parse_expr(&mut self) -> Result<NodeId> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, level: usize) -> Result<NodeId> {
        if level >= PRECEDENCE.len() {
            return self.parse_unary();
        }
        let start = self.peek_span();
        let mut lhs = self.parse_binary(level + 1)?;
        'outer: loop {
            for (tok, kind) in PRECEDENCE[level] {
                if self.check(tok) {
                    self.advance();
                    let rhs = self.parse_binary(level + 1)?;
                    lhs = self.ast.add_with(*kind, self.span_from(start), vec![lhs, rhs]);
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_unary(&mut self) -> Result<NodeId> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                let zero = self.ast.add_number(0, start);
                Ok(self.ast.add_with(NodeKind::Sub, self.span_from(start), vec![zero, operand]))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            Some(Token::Bang) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.ast.add_with(NodeKind::LogNot, self.span_from(start), vec![operand]))
            }
            Some(Token::Tilde) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(self.ast.add_with(NodeKind::BitNot, self.span_from(start), vec![operand]))
            }
            Some(Token::PlusPlus) | Some(Token::MinusMinus) => {
                let delta = if self.check(&Token::PlusPlus) { fixed::ONE } else { -fixed::ONE };
                self.advance();
                let operand = self.parse_unary()?;
                self.increment(NodeKind::PreAdd, operand, delta, start)
            }
            _ => self.parse_postfix(),
        }
    }

    fn increment(&mut self, kind: NodeKind, target: NodeId, delta: i32, start: Span) -> Result<NodeId> {
        if self.ast[target].kind != NodeKind::Deref {
            return Err(ParseError {
                code: "GL-P004",
                position: self.pos,
                span: self.ast[target].span,
                message: "operand of ++/-- is not assignable".into(),
            });
        }
        self.ast[target].kind = NodeKind::Ref;
        let node = self.ast.add_with(kind, self.span_from(start), vec![target]);
        self.ast[node].number = delta;
        Ok(node)
    }

    fn parse_postfix(&mut self) -> Result<NodeId> {
        let start = self.peek_span();
        let expr = self.parse_primary()?;
        match self.peek() {
            Some(Token::PlusPlus) => {
                self.advance();
                self.increment(NodeKind::PostAdd, expr, fixed::ONE, start)
            }
            Some(Token::MinusMinus) => {
                self.advance();
                self.increment(NodeKind::PostAdd, expr, -fixed::ONE, start)
            }
            _ => Ok(expr),
        }
    }

    fn parse_primary(&mut self) -> Result<NodeId> {
        let start = self.peek_span();
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(self.ast.add_number(n, start))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                self.advance();
                if self.check(&Token::LParen) {
                    self.parse_call(name, start)
                } else {
                    self.parse_chain(name, start)
                }
            }
            Some(tok) => Err(self.error("GL-P003", format!("expected expression, got {:?}", tok))),
            None => Err(self.error("GL-P002", "expected expression, got EOF".into())),
        }
    }

    fn parse_call(&mut self, name: String, start: Span) -> Result<NodeId> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let call = self.ast.add_with(NodeKind::FuncCall, self.span_from(start), args);
        self.ast[call].name = Some(name);
        Ok(call)
    }

    /// `name[i].member[j]...` read by value: `Deref(Var(ArrayRef(i, StructMember(...))))`.
    fn parse_chain(&mut self, name: String, start: Span) -> Result<NodeId> {
        let root = self.ast.add_named(NodeKind::Var, name, start);
        let mut tail = root;
        loop {
            if self.check(&Token::LBracket) {
                let open = self.expect(&Token::LBracket)?;
                let index = self.parse_expr()?;
                self.expect(&Token::RBracket)?;
                let acc = self.ast.add_with(NodeKind::ArrayRef, self.span_from(open), vec![index]);
                self.ast.push_child(tail, acc);
                tail = acc;
            } else if self.check(&Token::Dot) && matches!(self.peek_at(1), Some(Token::Ident(_))) {
                self.advance();
                let (member, mspan) = self.expect_ident()?;
                let acc = self.ast.add_named(NodeKind::StructMember, member, mspan);
                self.ast.push_child(tail, acc);
                tail = acc;
            } else {
                break;
            }
        }
        let span = self.span_from(start);
        self.ast[root].span = span;
        Ok(self.ast.add_with(NodeKind::Deref, span, vec![root]))
    }
}

/// Lex and parse `source`, stopping at the first error.
pub fn parse(source: &str) -> std::result::Result<(Ast, NodeId), crate::compiler::CompileError> {
    let tokens = crate::lexer::lex(source)?;
    let (ast, root, mut errors) = Parser::from_lexed(tokens).parse_program();
    if !errors.is_empty() {
        return Err(errors.swap_remove(0).into());
    }
    Ok((ast, root))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> (Ast, NodeId) {
        let (ast, root, errors) = Parser::from_lexed(crate::lexer::lex(source).unwrap()).parse_program();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
        (ast, root)
    }

    fn parse_errors(source: &str) -> Vec<ParseError> {
        let (_, _, errors) = Parser::from_lexed(crate::lexer::lex(source).unwrap()).parse_program();
        errors
    }

    fn kinds_of(ast: &Ast, ids: &[NodeId]) -> Vec<NodeKind> {
        ids.iter().map(|&c| ast[c].kind).collect()
    }

    #[test]
    fn parse_function_with_params() {
        let (ast, root) = parse_ok("fn add(a, b) { return a + b; }");
        let f = ast.children(root)[0];
        assert_eq!(ast[f].kind, NodeKind::FuncDef);
        assert_eq!(ast[f].name(), "add");
        assert_eq!(
            kinds_of(&ast, ast.children(f)),
            vec![NodeKind::FuncDefArg, NodeKind::FuncDefArg, NodeKind::Block]
        );
    }

    #[test]
    fn parse_precedence() {
        let (ast, root) = parse_ok("x = 1 + 2 * 3;");
        let assign = ast.children(root)[0];
        let value = ast.children(assign)[1];
        assert_eq!(ast[value].kind, NodeKind::Add);
        assert_eq!(ast[ast.children(value)[1]].kind, NodeKind::Mul);
    }

    #[test]
    fn parse_left_associative() {
        let (ast, root) = parse_ok("x = 8 - 4 - 2;");
        let value = ast.children(ast.children(root)[0])[1];
        let lhs = ast.children(value)[0];
        assert_eq!(ast[lhs].kind, NodeKind::Sub);
    }

    #[test]
    fn parse_comparison_binds_looser_than_arith() {
        let (ast, root) = parse_ok("x = a + 1 < b && c;");
        let value = ast.children(ast.children(root)[0])[1];
        assert_eq!(ast[value].kind, NodeKind::LogAnd);
        assert_eq!(ast[ast.children(value)[0]].kind, NodeKind::Lt);
    }

    #[test]
    fn parse_unary_minus_is_subtraction_from_zero() {
        let (ast, root) = parse_ok("x = -y;");
        let value = ast.children(ast.children(root)[0])[1];
        assert_eq!(ast[value].kind, NodeKind::Sub);
        assert_eq!(ast[ast.children(value)[0]].number, 0);
    }

    #[test]
    fn parse_access_chain() {
        let (ast, root) = parse_ok("x = ps[2].pos[1];");
        let value = ast.children(ast.children(root)[0])[1];
        assert_eq!(ast[value].kind, NodeKind::Deref);
        let var = ast.children(value)[0];
        assert_eq!(ast[var].kind, NodeKind::Var);
        let idx = ast.children(var)[0];
        assert_eq!(ast[idx].kind, NodeKind::ArrayRef);
        let member = ast.children(idx)[1];
        assert_eq!(ast[member].kind, NodeKind::StructMember);
        assert_eq!(ast[member].name(), "pos");
        assert_eq!(ast[ast.children(member)[0]].kind, NodeKind::ArrayRef);
    }

    #[test]
    fn parse_assignment_target_becomes_ref() {
        let (ast, root) = parse_ok("a[1] = 2;");
        let assign = ast.children(root)[0];
        assert_eq!(ast[assign].kind, NodeKind::Assign);
        assert_eq!(ast[ast.children(assign)[0]].kind, NodeKind::Ref);
    }

    #[test]
    fn parse_compound_assignment_rereads_target() {
        let (ast, root) = parse_ok("x += 2;");
        let assign = ast.children(root)[0];
        let value = ast.children(assign)[1];
        assert_eq!(ast[value].kind, NodeKind::Add);
        let reread = ast.children(value)[0];
        assert_eq!(ast[reread].kind, NodeKind::Deref);
        assert_ne!(reread, ast.children(assign)[0]);
    }

    #[test]
    fn parse_var_with_initializers() {
        let (ast, root) = parse_ok("var a = 1, b, c[3];");
        let multi = ast.children(root)[0];
        assert_eq!(
            kinds_of(&ast, ast.children(multi)),
            vec![NodeKind::Declare, NodeKind::Assign, NodeKind::Declare, NodeKind::Declare]
        );
    }

    #[test]
    fn parse_nested_typespec() {
        let (ast, root) = parse_ok("var m[2][3]: point;");
        let decl = ast.children(root)[0];
        let outer = ast.children(decl)[0];
        assert_eq!(ast[outer].kind, NodeKind::ArrayRef);
        let inner = ast.children(outer)[1];
        assert_eq!(ast[inner].kind, NodeKind::ArrayRef);
        assert_eq!(ast[ast.children(inner)[1]].kind, NodeKind::DataType);
    }

    #[test]
    fn parse_open_array_param() {
        let (ast, root) = parse_ok("fn sum(xs[]) { return 0; }");
        let arg = ast.children(ast.children(root)[0])[0];
        let ty = ast.children(arg)[0];
        assert_eq!(ast[ty].size, -1);
    }

    #[test]
    fn parse_struct_and_syscalldef() {
        let (ast, root) = parse_ok("struct p { var x, y; var z[2]; } syscalldef led(i, c);");
        let s = ast.children(root)[0];
        assert_eq!(ast[s].kind, NodeKind::StructDef);
        assert_eq!(ast.children(s).len(), 3);
        let d = ast.children(root)[1];
        assert_eq!(ast[d].kind, NodeKind::SyscallDef);
        assert_eq!(ast.children(d).len(), 2);
    }

    #[test]
    fn parse_for_children_order() {
        let (ast, root) = parse_ok("for (var i = 0; i < 3; i++) x = i;");
        let f = ast.children(root)[0];
        assert_eq!(
            kinds_of(&ast, ast.children(f)),
            vec![NodeKind::Multi, NodeKind::Lt, NodeKind::Assign, NodeKind::Multi]
        );
    }

    #[test]
    fn parse_for_empty_clauses() {
        let (ast, root) = parse_ok("for (;;) { }");
        let f = ast.children(root)[0];
        let cond = ast.children(f)[1];
        assert_eq!(ast[cond].number, fixed::ONE);
    }

    #[test]
    fn parse_increments() {
        let (ast, root) = parse_ok("i++; --j;");
        let post = ast.children(ast.children(root)[0])[0];
        assert_eq!(ast[post].kind, NodeKind::PostAdd);
        assert_eq!(ast[post].number, fixed::ONE);
        let pre = ast.children(ast.children(root)[1])[0];
        assert_eq!(ast[pre].kind, NodeKind::PreAdd);
        assert_eq!(ast[pre].number, -fixed::ONE);
    }

    #[test]
    fn parse_if_else_and_return() {
        let (ast, root) = parse_ok("fn f(x) { if (x) return 1; else { return; } }");
        let body = ast.children(ast.children(root)[0])[1];
        let stmt = ast.children(body)[0];
        assert_eq!(ast[stmt].kind, NodeKind::If);
        assert_eq!(ast.children(stmt).len(), 3);
    }

    #[test]
    fn parse_spans_cover_source() {
        let src = "fn main() { return 1; }";
        let (ast, root) = parse_ok(src);
        let f = ast.children(root)[0];
        assert_eq!(ast[f].span, Span { start: 0, end: src.len() });
    }

    #[test]
    fn error_assign_to_call() {
        let errors = parse_errors("f() = 3;");
        assert_eq!(errors[0].code, "GL-P004");
    }

    #[test]
    fn error_nested_function() {
        let errors = parse_errors("fn a() { fn b() {} }");
        assert_eq!(errors[0].code, "GL-P005");
    }

    #[test]
    fn error_bare_declaration_as_body() {
        let errors = parse_errors("fn f(x) { if (x) var y; }");
        assert_eq!(errors[0].code, "GL-P005");
    }

    #[test]
    fn error_missing_semicolon() {
        let errors = parse_errors("var x\nvar y;");
        assert_eq!(errors[0].code, "GL-P001");
        assert!(errors[0].message.contains("Semi"));
    }

    #[test]
    fn error_recovery_reports_several() {
        let errors = parse_errors("x = ;\nfn ok() { return 1; }\ny = );");
        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn error_at_eof() {
        let errors = parse_errors("fn main() { return 1;");
        assert_eq!(errors[0].code, "GL-P002");
    }
}
