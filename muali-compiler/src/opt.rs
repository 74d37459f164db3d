//! AST-level rewrites that run before lowering.
//!
//! The only rewrite today recognizes `assign x = -x` (through any number of
//! wrapper nodes) and replaces it with the synthetic `inplace_negate` form,
//! which lowers to a single negate against the variable's own slot instead
//! of a temporary.

use std::rc::Rc;

use crate::ast::Node;

/// Rewrite a tree bottom-up, returning the optimized version.
pub fn optimize(root: &Rc<Node>) -> Rc<Node> {
    if let Some(rewritten) = rewrite_inplace_negate(root) {
        return rewritten;
    }
    if root.children.is_empty() {
        return Rc::clone(root);
    }
    let children = root.children.iter().map(optimize).collect();
    Node::branch(root.text.clone(), children)
}

fn rewrite_inplace_negate(node: &Rc<Node>) -> Option<Rc<Node>> {
    if node.kind() != "assign" || node.children.len() != 2 {
        return None;
    }
    let target = &node.children[0];
    if target.kind() != "name" {
        return None;
    }
    let name = &target.children.first()?.text;

    let rhs = unwrap_single(&node.children[1]);
    if rhs.kind() != "base_unexp" || rhs.children.len() != 2 {
        return None;
    }
    if rhs.children[0].children.first()?.text != "-" {
        return None;
    }
    let operand = unwrap_single(&rhs.children[1]);
    if operand.kind() != "name" || &operand.children.first()?.text != name {
        return None;
    }

    Some(Node::branch("inplace_negate", vec![Rc::clone(target)]))
}

/// Skip wrapper nodes and single-child expression tiers.
fn unwrap_single(node: &Rc<Node>) -> &Rc<Node> {
    let mut current = node;
    loop {
        let kind = current.kind();
        let passthrough = matches!(kind, "expr" | "simple_expr")
            || ((kind == "base_binexp" || kind == "base_unexp" || kind.starts_with("binexp_"))
                && current.children.len() == 1);
        if passthrough && !current.children.is_empty() {
            current = &current.children[0];
        } else {
            return current;
        }
    }
}
