//! The AST shape the compiler consumes.
//!
//! The lexer and parser live outside this crate; they hand over a tree of
//! [`Node`]s where interior nodes carry their grammar kind in `text` and
//! leaves carry the source token. The recognized kinds:
//!
//! * `program` — sequence of top-level items
//! * `funcdef` — name, parameter list, body block
//! * `block`, `simple_block` — body statements
//! * `statement`, `simple_statement` — single wrapped form
//! * `vardec` — declarator, optional initializer expression
//! * `assign`, `assign_binop`, `inplace_negate`
//! * `foreach` — declarator, optional start, end, body
//! * `return` — optional value expression
//! * `expr`, `simple_expr` — wrappers
//! * `base_unexp` — operator, operand
//! * `base_binexp`, `binexp_*` — lhs, operator, rhs
//! * `name`, `int`, `float` — leaves with the token in `children[0].text`
//!
//! A declarator's first child is the name token; an optional second child
//! is the static type token (`int` or `float`).

use std::rc::Rc;

use crate::error::CompileError;

/// One AST node: a textual kind plus ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Grammar kind for interior nodes, source token for leaves.
    pub text: String,
    /// Ordered children.
    pub children: Vec<Rc<Node>>,
}

impl Node {
    /// Build an interior node.
    pub fn branch(kind: impl Into<String>, children: Vec<Rc<Node>>) -> Rc<Node> {
        Rc::new(Node {
            text: kind.into(),
            children,
        })
    }

    /// Build a leaf carrying a source token.
    pub fn leaf(token: impl Into<String>) -> Rc<Node> {
        Rc::new(Node {
            text: token.into(),
            children: Vec::new(),
        })
    }

    /// The node's kind (or token, for leaves).
    pub fn kind(&self) -> &str {
        &self.text
    }

    pub(crate) fn child(&self, index: usize) -> Result<&Rc<Node>, CompileError> {
        self.children.get(index).ok_or_else(|| {
            CompileError::MalformedAst(format!(
                "`{}` node is missing child {index}",
                self.text
            ))
        })
    }

    /// The token of a leaf-carrying node (`name`, `int`, `float`, operator
    /// nodes, declarator children).
    pub(crate) fn token(&self) -> Result<&str, CompileError> {
        Ok(self.child(0)?.text.as_str())
    }
}

/// Convenience constructors for building ASTs by hand — the shape a parser
/// would produce, without the parser.
pub mod build {
    use super::Node;
    use std::rc::Rc;

    /// `program` with the given top-level items.
    pub fn program(items: Vec<Rc<Node>>) -> Rc<Node> {
        Node::branch("program", items)
    }

    /// Declarator: a name with an optional static type.
    pub fn declarator(name: &str, ty: Option<&str>) -> Rc<Node> {
        let mut children = vec![Node::leaf(name)];
        if let Some(ty) = ty {
            children.push(Node::leaf(ty));
        }
        Node::branch("declarator", children)
    }

    /// `funcdef name(params) { body }`
    pub fn funcdef(name: &str, params: Vec<Rc<Node>>, body: Vec<Rc<Node>>) -> Rc<Node> {
        Node::branch(
            "funcdef",
            vec![
                name_ref(name),
                Node::branch("params", params),
                Node::branch("block", body),
            ],
        )
    }

    /// A `name` reference node.
    pub fn name_ref(name: &str) -> Rc<Node> {
        Node::branch("name", vec![Node::leaf(name)])
    }

    /// An `int` literal node.
    pub fn int(value: i64) -> Rc<Node> {
        Node::branch("int", vec![Node::leaf(value.to_string())])
    }

    /// A `float` literal node.
    pub fn float(value: f64) -> Rc<Node> {
        Node::branch("float", vec![Node::leaf(format!("{value:?}"))])
    }

    /// An operator node as the parser wraps it.
    pub fn op(text: &str) -> Rc<Node> {
        Node::branch("op", vec![Node::leaf(text)])
    }

    /// `vardec name[:ty] [= init]`
    pub fn vardec(name: &str, ty: Option<&str>, init: Option<Rc<Node>>) -> Rc<Node> {
        let mut children = vec![declarator(name, ty)];
        children.extend(init);
        Node::branch("vardec", children)
    }

    /// `assign name = rhs`
    pub fn assign(name: &str, rhs: Rc<Node>) -> Rc<Node> {
        Node::branch("assign", vec![name_ref(name), rhs])
    }

    /// `assign_binop name op= rhs`
    pub fn assign_binop(name: &str, operator: &str, rhs: Rc<Node>) -> Rc<Node> {
        Node::branch("assign_binop", vec![name_ref(name), op(operator), rhs])
    }

    /// `lhs operator rhs`
    pub fn binexp(lhs: Rc<Node>, operator: &str, rhs: Rc<Node>) -> Rc<Node> {
        Node::branch("base_binexp", vec![lhs, op(operator), rhs])
    }

    /// Unary `operator operand`.
    pub fn unexp(operator: &str, operand: Rc<Node>) -> Rc<Node> {
        Node::branch("base_unexp", vec![op(operator), operand])
    }

    /// `for decl in [start,] end { body }`
    pub fn foreach(
        decl: Rc<Node>,
        start: Option<Rc<Node>>,
        end: Rc<Node>,
        body: Vec<Rc<Node>>,
    ) -> Rc<Node> {
        let mut children = vec![decl];
        children.extend(start);
        children.push(end);
        children.push(Node::branch("block", body));
        Node::branch("foreach", children)
    }

    /// `return [value]`
    pub fn ret(value: Option<Rc<Node>>) -> Rc<Node> {
        Node::branch("return", value.into_iter().collect())
    }
}
