//! Per-function control-flow graphs.
//!
//! A [`Cfg`] owns its nodes, its local variables, and its argument list.
//! Nodes are referenced by dense index; node 0 is the entry. The graph is
//! built front to back by the function block decoder and lives only until
//! it is handed to lowering.

use std::fmt;

use super::instr::Inst;
use super::types::Type;

/// Dense index of a node within its function.
pub type NodeIndex = usize;

/// Identifier of a local variable within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%v{}", self.0)
    }
}

/// A local variable: instruction result, argument, or forward placeholder.
#[derive(Debug, Clone)]
pub struct Variable {
    pub ty: Type,
    pub name: Option<String>,
}

/// One basic block.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: Option<String>,
    pub insts: Vec<Inst>,
    /// Indices of predecessor nodes; filled in by
    /// [`Cfg::compute_predecessors`] at block exit.
    pub preds: Vec<NodeIndex>,
}

impl Node {
    /// True once a terminator has been appended.
    pub fn is_terminated(&self) -> bool {
        self.insts.last().map(Inst::is_terminator).unwrap_or(false)
    }

    /// Successors of this node's terminator.
    pub fn successors(&self) -> Vec<NodeIndex> {
        match self.insts.last() {
            Some(inst) => inst.kind.successors(),
            None => vec![],
        }
    }
}

/// A decoded function body.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub name: String,
    /// Position of this function's declaration in the module's flat global
    /// ID space. Lowering may finish functions out of order; whoever writes
    /// final output uses this to re-impose declaration order.
    pub decl_order: usize,
    pub return_type: Type,
    pub internal: bool,
    variables: Vec<Variable>,
    /// Argument variables, bound to the first N local value slots.
    pub args: Vec<VarId>,
    nodes: Vec<Node>,
}

impl Cfg {
    pub fn new(name: String, decl_order: usize, return_type: Type, internal: bool) -> Self {
        Self {
            name,
            decl_order,
            return_type,
            internal,
            variables: Vec::new(),
            args: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Append a new empty node and return its index.
    pub fn make_node(&mut self) -> NodeIndex {
        self.nodes.push(Node::default());
        self.nodes.len() - 1
    }

    /// Allocate a new variable of the given type.
    pub fn make_variable(&mut self, ty: Type) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable { ty, name: None });
        id
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn var_type(&self, id: VarId) -> Type {
        self.variables[id.index()].ty
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn set_var_name(&mut self, id: VarId, name: String) {
        self.variables[id.index()].name = Some(name);
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Append an instruction to the given node.
    pub fn append_inst(&mut self, node: NodeIndex, inst: Inst) {
        self.nodes[node].insts.push(inst);
    }

    /// Fill in the predecessor sets of every node from the terminator
    /// successor edges. Duplicate edges collapse to one predecessor entry.
    pub fn compute_predecessors(&mut self) {
        for node in &mut self.nodes {
            node.preds.clear();
        }
        let edges: Vec<(NodeIndex, Vec<NodeIndex>)> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (i, node.successors()))
            .collect();
        for (from, succs) in edges {
            for to in succs {
                if to < self.nodes.len() && !self.nodes[to].preds.contains(&from) {
                    self.nodes[to].preds.push(from);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::{InstKind, Operand};

    fn terminate(cfg: &mut Cfg, node: NodeIndex, kind: InstKind) {
        cfg.append_inst(node, Inst::new(kind, None));
    }

    #[test]
    fn test_make_node_and_variable() {
        let mut cfg = Cfg::new("f".into(), 0, Type::Void, true);
        assert_eq!(cfg.make_node(), 0);
        assert_eq!(cfg.make_node(), 1);
        let v = cfg.make_variable(Type::I32);
        assert_eq!(v, VarId(0));
        assert_eq!(cfg.var_type(v), Type::I32);
    }

    #[test]
    fn test_node_termination() {
        let mut cfg = Cfg::new("f".into(), 0, Type::Void, true);
        let entry = cfg.make_node();
        assert!(!cfg.node(entry).is_terminated());
        let v = cfg.make_variable(Type::I32);
        cfg.append_inst(
            entry,
            Inst::new(
                InstKind::Assign {
                    src: Operand::Var(v),
                },
                Some(v),
            ),
        );
        assert!(!cfg.node(entry).is_terminated());
        terminate(&mut cfg, entry, InstKind::Ret { value: None });
        assert!(cfg.node(entry).is_terminated());
    }

    #[test]
    fn test_compute_predecessors() {
        let mut cfg = Cfg::new("f".into(), 0, Type::Void, true);
        let b0 = cfg.make_node();
        let b1 = cfg.make_node();
        let b2 = cfg.make_node();
        let cond = cfg.make_variable(Type::I1);

        terminate(
            &mut cfg,
            b0,
            InstKind::CondBr {
                cond: Operand::Var(cond),
                then_dest: b1,
                else_dest: b2,
            },
        );
        terminate(&mut cfg, b1, InstKind::Br { dest: b2 });
        terminate(&mut cfg, b2, InstKind::Ret { value: None });

        cfg.compute_predecessors();
        assert!(cfg.node(b0).preds.is_empty());
        assert_eq!(cfg.node(b1).preds, vec![b0]);
        assert_eq!(cfg.node(b2).preds, vec![b0, b1]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut cfg = Cfg::new("f".into(), 0, Type::Void, true);
        let b0 = cfg.make_node();
        let b1 = cfg.make_node();
        let cond = cfg.make_variable(Type::I1);
        terminate(
            &mut cfg,
            b0,
            InstKind::CondBr {
                cond: Operand::Var(cond),
                then_dest: b1,
                else_dest: b1,
            },
        );
        terminate(&mut cfg, b1, InstKind::Ret { value: None });
        cfg.compute_predecessors();
        assert_eq!(cfg.node(b1).preds, vec![b0]);
    }
}
