use crate::error::CompileResult;
use crate::tree::{NodeId, Tree};

/// Post-order pass over a syntax tree. `enter` runs before a node's children
/// are visited, `leave` receives the children's results in order and builds
/// the node's own.
pub trait CompilationEngine {
    type Output;

    fn enter(&mut self, _tree: &Tree, _id: NodeId) -> CompileResult<()> {
        Ok(())
    }

    fn leave(
        &mut self,
        tree: &Tree,
        id: NodeId,
        children: Vec<Self::Output>,
    ) -> CompileResult<Self::Output>;

    fn visit(&mut self, tree: &Tree, id: NodeId) -> CompileResult<Self::Output> {
        self.enter(tree, id)?;
        let mut children = Vec::with_capacity(tree.children(id).len());
        for child in tree.children(id) {
            children.push(self.visit(tree, *child)?);
        }
        self.leave(tree, id, children)
    }
}
