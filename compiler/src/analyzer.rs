use log::debug;

use crate::{
    error::{CompileError, CompileResult},
    tokens::{Token, TokenKind, BINARY_OPS, CONSTANTS, STATEMENTS, TYPE_NAMES, UNARY_OPS},
    tree::{NodeId, NodeKind, Tree},
};

/// Deepest nesting of terms and statement blocks accepted by the parser.
pub const MAX_NESTING: usize = 256;

/// Production an [`Analyzer`] run starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Class,
    ClassVarDecs,
    SubroutineDec,
    ParameterList,
    SubroutineBody,
    Statements,
    Statement,
    Expression,
    Term,
    ExpressionList,
}

/// Recursive-descent parser building a [`Tree`]. Every production receives the
/// node it attaches to; inline productions attach their matches to that node
/// directly instead of creating one of their own.
pub struct Analyzer<'a> {
    tokens: Box<dyn Iterator<Item = CompileResult<Token>> + 'a>,
    token: Token,
    tree: Tree,
    depth: usize,
}

impl<'a> Analyzer<'a> {
    /// Parses a whole class. Returns the tree and its `Start` root.
    pub fn start<I>(tokens: I) -> CompileResult<(Tree, NodeId)>
    where
        I: IntoIterator<Item = CompileResult<Token>>,
        I::IntoIter: 'a,
    {
        Self::start_with(tokens, EntryPoint::Class)
    }

    pub fn start_with<I>(tokens: I, entry: EntryPoint) -> CompileResult<(Tree, NodeId)>
    where
        I: IntoIterator<Item = CompileResult<Token>>,
        I::IntoIter: 'a,
    {
        let mut tokens: Box<dyn Iterator<Item = CompileResult<Token>> + 'a> =
            Box::new(tokens.into_iter());
        let token = match tokens.next() {
            Some(t) => t?,
            None => return CompileError::syntax(1, "unexpected end of file"),
        };
        let mut a = Analyzer {
            tokens,
            token,
            tree: Tree::new(),
            depth: 0,
        };
        let root = a.tree.add(None, NodeKind::Start, None);
        match entry {
            EntryPoint::Class => {
                a.class_dec(root)?;
            }
            EntryPoint::ClassVarDecs => a.class_var_decs(root)?,
            EntryPoint::SubroutineDec => {
                a.subroutine_dec(root)?;
            }
            EntryPoint::ParameterList => {
                a.parameter_list(root)?;
            }
            EntryPoint::SubroutineBody => {
                a.subroutine_body(root)?;
            }
            EntryPoint::Statements => {
                a.statements(root)?;
            }
            EntryPoint::Statement => a.statement(root)?,
            EntryPoint::Expression => {
                a.expression(root)?;
            }
            EntryPoint::Term => {
                a.term(root)?;
            }
            EntryPoint::ExpressionList => {
                a.expression_list(root)?;
            }
        }
        if a.token.kind != TokenKind::Eof {
            return CompileError::syntax(
                a.token.line,
                format!("expected EOF, found '{}'", a.token.value),
            );
        }
        debug!("analyzed {:?}: {} nodes", entry, a.tree.len());
        Ok((a.tree, root))
    }

    /// Enters one nesting level. The tree depth, and with it the recursion of
    /// every pass over the tree, stays bounded by [`MAX_NESTING`].
    fn nest(&mut self, what: &str) -> CompileResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return CompileError::syntax(self.token.line, format!("{what} nested too deeply"));
        }
        Ok(())
    }

    fn advance(&mut self) -> CompileResult<()> {
        self.token = match self.tokens.next() {
            Some(t) => t?,
            None => return CompileError::syntax(self.token.line, "unexpected end of file"),
        };
        Ok(())
    }

    /// Turns the current token into a terminal node of `kind` under `parent`.
    fn terminal(&mut self, parent: NodeId, kind: NodeKind) -> CompileResult<NodeId> {
        if self.token.kind == TokenKind::Eof {
            return CompileError::syntax(self.token.line, "unexpected end of file");
        }
        let id = self.tree.add(Some(parent), kind, Some(self.token.clone()));
        self.advance()?;
        Ok(id)
    }

    fn consume(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let kind = match self.token.kind {
            TokenKind::Keyword => NodeKind::Keyword,
            TokenKind::Symbol => NodeKind::Symbol,
            TokenKind::Identifier => NodeKind::Identifier,
            TokenKind::IntConst => NodeKind::IntConst,
            TokenKind::StringConst => NodeKind::StringConst,
            TokenKind::Eof => {
                return CompileError::syntax(self.token.line, "unexpected end of file");
            }
        };
        self.terminal(parent, kind)
    }

    fn expect(&mut self, parent: NodeId, values: &[&str]) -> CompileResult<NodeId> {
        if self.token.is_one_of(values) {
            return self.consume(parent);
        }
        if self.token.kind == TokenKind::Eof {
            return CompileError::syntax(
                self.token.line,
                format!("unexpected end of file, expected {values:?}"),
            );
        }
        CompileError::syntax(
            self.token.line,
            format!("expected {values:?}, found '{}'", self.token.value),
        )
    }

    fn accept(&mut self, parent: NodeId, values: &[&str]) -> CompileResult<bool> {
        if self.token.is_one_of(values) {
            self.consume(parent)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn next_is(&self, value: &str) -> bool {
        self.token.is_one_of(&[value])
    }

    fn next_is_term(&self) -> bool {
        match self.token.kind {
            TokenKind::IntConst | TokenKind::StringConst | TokenKind::Identifier => true,
            TokenKind::Keyword => CONSTANTS.contains(&self.token.value.as_str()),
            TokenKind::Symbol => self.next_is("(") || self.token.is_one_of(&UNARY_OPS),
            TokenKind::Eof => false,
        }
    }

    fn identifier(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        if self.token.kind != TokenKind::Identifier {
            return CompileError::syntax(
                self.token.line,
                format!("expected identifier, found '{}'", self.token.value),
            );
        }
        self.terminal(parent, NodeKind::Identifier)
    }

    fn class_dec(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::Class, None);
        self.expect(node, &["class"])?;
        let name = self.identifier(node)?;
        debug!("parsing class {}", self.tree.value(name).unwrap_or_default());
        self.expect(node, &["{"])?;
        self.class_var_decs(node)?;
        self.subroutine_decs(node)?;
        self.expect(node, &["}"])?;
        Ok(node)
    }

    fn class_var_decs(&mut self, parent: NodeId) -> CompileResult<()> {
        while self.token.is_one_of(&["static", "field"]) {
            self.class_var_dec(parent)?;
        }
        Ok(())
    }

    fn class_var_dec(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::ClassVarDec, None);
        self.expect(node, &["static", "field"])?;
        self.type_name(node)?;
        self.var_names(node)?;
        self.expect(node, &[";"])?;
        Ok(node)
    }

    fn type_name(&mut self, parent: NodeId) -> CompileResult<()> {
        if !self.accept(parent, &TYPE_NAMES)? {
            self.identifier(parent)?;
        }
        Ok(())
    }

    fn var_names(&mut self, parent: NodeId) -> CompileResult<()> {
        self.identifier(parent)?;
        while self.accept(parent, &[","])? {
            self.identifier(parent)?;
        }
        Ok(())
    }

    fn subroutine_decs(&mut self, parent: NodeId) -> CompileResult<()> {
        while self.token.is_one_of(&["constructor", "function", "method"]) {
            self.subroutine_dec(parent)?;
        }
        Ok(())
    }

    fn subroutine_dec(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::SubroutineDec, None);
        self.expect(node, &["constructor", "function", "method"])?;
        if !self.accept(node, &["void"])? {
            self.type_name(node)?;
        }
        self.identifier(node)?;
        self.expect(node, &["("])?;
        self.parameter_list(node)?;
        self.expect(node, &[")"])?;
        self.subroutine_body(node)?;
        Ok(node)
    }

    fn parameter_list(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::ParameterList, None);
        if self.token.is_one_of(&TYPE_NAMES) || self.token.kind == TokenKind::Identifier {
            self.type_name(node)?;
            self.identifier(node)?;
            while self.accept(node, &[","])? {
                self.type_name(node)?;
                self.identifier(node)?;
            }
        }
        Ok(node)
    }

    fn subroutine_body(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::SubroutineBody, None);
        self.expect(node, &["{"])?;
        while self.next_is("var") {
            self.var_dec(node)?;
        }
        self.statements(node)?;
        self.expect(node, &["}"])?;
        Ok(node)
    }

    fn var_dec(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::VarDec, None);
        self.expect(node, &["var"])?;
        self.type_name(node)?;
        self.var_names(node)?;
        self.expect(node, &[";"])?;
        Ok(node)
    }

    fn statements(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        self.nest("statements")?;
        let node = self.tree.add(Some(parent), NodeKind::Statements, None);
        while self.token.is_one_of(&STATEMENTS) {
            self.statement(node)?;
        }
        self.depth -= 1;
        Ok(node)
    }

    fn statement(&mut self, parent: NodeId) -> CompileResult<()> {
        let keyword = self.token.value.clone();
        match keyword.as_str() {
            "let" => self.let_statement(parent)?,
            "do" => self.do_statement(parent)?,
            "if" => self.if_statement(parent)?,
            "while" => self.while_statement(parent)?,
            _ => self.return_statement(parent)?,
        };
        Ok(())
    }

    fn let_statement(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::LetStatement, None);
        self.expect(node, &["let"])?;
        let target = self.identifier(node)?;
        if self.next_is("[") {
            let assignment = self.tree.add(Some(node), NodeKind::ArrayAssignment, None);
            self.tree.adopt(assignment, target);
            self.expect(assignment, &["["])?;
            self.expression(assignment)?;
            self.expect(assignment, &["]"])?;
            self.expect(assignment, &["="])?;
            self.expression(assignment)?;
        } else {
            let assignment = self.tree.add(Some(node), NodeKind::Assignment, None);
            self.tree.adopt(assignment, target);
            self.expect(assignment, &["="])?;
            self.expression(assignment)?;
        }
        self.expect(node, &[";"])?;
        Ok(node)
    }

    fn if_statement(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::IfStatement, None);
        self.expect(node, &["if"])?;
        self.expect(node, &["("])?;
        self.expression(node)?;
        self.expect(node, &[")"])?;
        self.expect(node, &["{"])?;
        self.statements(node)?;
        self.expect(node, &["}"])?;
        if self.accept(node, &["else"])? {
            self.expect(node, &["{"])?;
            self.statements(node)?;
            self.expect(node, &["}"])?;
        }
        Ok(node)
    }

    fn while_statement(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::WhileStatement, None);
        self.expect(node, &["while"])?;
        self.expect(node, &["("])?;
        self.expression(node)?;
        self.expect(node, &[")"])?;
        self.expect(node, &["{"])?;
        self.statements(node)?;
        self.expect(node, &["}"])?;
        Ok(node)
    }

    fn do_statement(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::DoStatement, None);
        self.expect(node, &["do"])?;
        let callee = self.identifier(node)?;
        self.subroutine_call(node, callee)?;
        self.expect(node, &[";"])?;
        Ok(node)
    }

    fn return_statement(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::ReturnStatement, None);
        self.expect(node, &["return"])?;
        if !self.accept(node, &[";"])? {
            self.expression(node)?;
            self.expect(node, &[";"])?;
        }
        Ok(node)
    }

    /// `term (op term)*`, folded left to right: after each operator the
    /// operator node adopts the operand built so far and the new term.
    fn expression(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::Expression, None);
        let mut lhs = self.term(node)?;
        let mut folds = 0;
        while self.token.is_one_of(&BINARY_OPS) {
            // each fold pushes the operands built so far one level down
            self.nest("expression")?;
            folds += 1;
            let op = self.terminal(node, NodeKind::BinaryOp)?;
            let rhs = self.term(node)?;
            self.tree.pivot(op, &[lhs, rhs]);
            lhs = op;
        }
        self.depth -= folds;
        Ok(node)
    }

    fn term(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        self.nest("expression")?;
        let node = self.tree.add(Some(parent), NodeKind::Term, None);
        match self.token.kind {
            TokenKind::IntConst | TokenKind::StringConst => {
                self.consume(node)?;
            }
            TokenKind::Keyword if CONSTANTS.contains(&self.token.value.as_str()) => {
                self.consume(node)?;
            }
            TokenKind::Identifier => {
                let id = self.identifier(node)?;
                if self.next_is(".") || self.next_is("(") {
                    self.subroutine_call(node, id)?;
                } else if self.next_is("[") {
                    self.array_access(node, id)?;
                }
            }
            TokenKind::Symbol if self.next_is("(") => {
                self.consume(node)?;
                self.expression(node)?;
                self.expect(node, &[")"])?;
            }
            TokenKind::Symbol if self.token.is_one_of(&UNARY_OPS) => {
                let op = self.terminal(node, NodeKind::UnaryOp)?;
                let operand = self.term(node)?;
                self.tree.pivot(op, &[operand]);
            }
            TokenKind::Eof => {
                return CompileError::syntax(self.token.line, "unexpected end of file, expected term");
            }
            _ => {
                return CompileError::syntax(
                    self.token.line,
                    format!("expected term, found '{}'", self.token.value),
                );
            }
        }
        self.depth -= 1;
        Ok(node)
    }

    /// Call whose callee or qualifier identifier was already parsed into `callee`.
    fn subroutine_call(&mut self, parent: NodeId, callee: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::SubroutineCall, None);
        self.tree.adopt(node, callee);
        if self.accept(node, &["."])? {
            self.member_name(node)?;
        }
        self.expect(node, &["("])?;
        self.expression_list(node)?;
        self.expect(node, &[")"])?;
        Ok(node)
    }

    /// Subroutine name after `.`. Reserved words are accepted here and stored
    /// as identifiers, since the callee belongs to another class.
    fn member_name(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        if self.token.kind == TokenKind::Keyword {
            return self.terminal(parent, NodeKind::Identifier);
        }
        self.identifier(parent)
    }

    fn array_access(&mut self, parent: NodeId, base: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::ArrayAccess, None);
        self.tree.adopt(node, base);
        self.expect(node, &["["])?;
        self.expression(node)?;
        self.expect(node, &["]"])?;
        Ok(node)
    }

    fn expression_list(&mut self, parent: NodeId) -> CompileResult<NodeId> {
        let node = self.tree.add(Some(parent), NodeKind::ExpressionList, None);
        if self.next_is_term() {
            self.expression(node)?;
            while self.accept(node, &[","])? {
                self.expression(node)?;
            }
        }
        Ok(node)
    }
}
