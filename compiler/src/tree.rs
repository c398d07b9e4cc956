use std::fmt::Write;

use derive_more::Display;

use crate::tokens::Token;

/// Index of a node inside its [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub struct NodeId(pub usize);

/// Grammar productions that materialize a node; terminals carry their token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum NodeKind {
    #[display(fmt = "start")]
    Start,
    #[display(fmt = "class")]
    Class,
    #[display(fmt = "classVarDec")]
    ClassVarDec,
    #[display(fmt = "subroutineDec")]
    SubroutineDec,
    #[display(fmt = "parameterList")]
    ParameterList,
    #[display(fmt = "subroutineBody")]
    SubroutineBody,
    #[display(fmt = "varDec")]
    VarDec,
    #[display(fmt = "statements")]
    Statements,
    #[display(fmt = "letStatement")]
    LetStatement,
    #[display(fmt = "assignment")]
    Assignment,
    #[display(fmt = "arrayAssignment")]
    ArrayAssignment,
    #[display(fmt = "ifStatement")]
    IfStatement,
    #[display(fmt = "whileStatement")]
    WhileStatement,
    #[display(fmt = "doStatement")]
    DoStatement,
    #[display(fmt = "returnStatement")]
    ReturnStatement,
    #[display(fmt = "expression")]
    Expression,
    #[display(fmt = "term")]
    Term,
    #[display(fmt = "binaryOp")]
    BinaryOp,
    #[display(fmt = "unaryOp")]
    UnaryOp,
    #[display(fmt = "subroutineCall")]
    SubroutineCall,
    #[display(fmt = "expressionList")]
    ExpressionList,
    #[display(fmt = "arrayAccess")]
    ArrayAccess,
    #[display(fmt = "keyword")]
    Keyword,
    #[display(fmt = "symbol")]
    Symbol,
    #[display(fmt = "identifier")]
    Identifier,
    #[display(fmt = "integerConstant")]
    IntConst,
    #[display(fmt = "stringConstant")]
    StringConst,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub token: Option<Token>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn value(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.value.as_str())
    }
}

/// Syntax tree stored as an arena. Parent links are plain indices, so
/// reparenting never leaves a node owned twice.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Tree { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends a node as the last child of `parent`.
    pub fn add(&mut self, parent: Option<NodeId>, kind: NodeKind, token: Option<Token>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            kind,
            token,
            children: Vec::new(),
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.0].kind
    }

    pub fn value(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.0].value()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn root(&self, mut id: NodeId) -> NodeId {
        while let Some(p) = self.parent(id) {
            id = p;
        }
        id
    }

    /// Moves `child` from its current parent to the end of `new_parent`'s children.
    pub fn adopt(&mut self, new_parent: NodeId, child: NodeId) {
        debug_assert!(new_parent != child);
        if let Some(old) = self.nodes[child.0].parent {
            self.nodes[old.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(new_parent);
        self.nodes[new_parent.0].children.push(child);
    }

    /// Makes `op` the parent of `operands`, in order. Used to turn a flat
    /// `term op term` run into a nested operator node.
    pub fn pivot(&mut self, op: NodeId, operands: &[NodeId]) {
        for operand in operands {
            self.adopt(op, *operand);
        }
    }

    /// Pre-order iteration over the subtree rooted at `id`.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![id],
        }
    }

    /// Terminal tokens of the subtree in source order. Binary operators sit
    /// between their operands, unary operators before theirs.
    pub fn terminals(&self, id: NodeId) -> Vec<&Token> {
        let mut out = Vec::new();
        self.collect_terminals(id, &mut out);
        out
    }

    fn collect_terminals<'a>(&'a self, id: NodeId, out: &mut Vec<&'a Token>) {
        let node = self.node(id);
        let children = &node.children;
        match (&node.token, node.kind) {
            (Some(t), NodeKind::BinaryOp) if !children.is_empty() => {
                self.collect_terminals(children[0], out);
                out.push(t);
                for c in &children[1..] {
                    self.collect_terminals(*c, out);
                }
            }
            (Some(t), _) => {
                out.push(t);
                for c in children {
                    self.collect_terminals(*c, out);
                }
            }
            (None, _) => {
                for c in children {
                    self.collect_terminals(*c, out);
                }
            }
        }
    }

    /// Indented listing of the subtree, one node per line.
    pub fn dump(&self, id: NodeId) -> String {
        let mut s = String::new();
        self.dump_node(id, 0, &mut s);
        s
    }

    fn dump_node(&self, id: NodeId, depth: usize, s: &mut String) {
        let node = self.node(id);
        let _ = match node.value() {
            Some(v) => writeln!(s, "{}{} {}", "  ".repeat(depth), node.kind, v),
            None => writeln!(s, "{}{}", "  ".repeat(depth), node.kind),
        };
        for c in &node.children {
            self.dump_node(*c, depth + 1, s);
        }
    }
}

pub struct Descendants<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}
