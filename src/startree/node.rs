//! 树节点与节点 arena
//!
//! 节点存放在稠密 Vec 中，用下标 [`NodeId`] 互相引用；
//! 子节点关系是 维度值 → NodeId 的有序映射，star 子节点键为 `STAR_VALUE`。

use std::collections::{BTreeMap, VecDeque};

use super::record::{ROOT_DIMENSION_ID, STAR_VALUE};

pub type NodeId = usize;

/// 树节点
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub start_doc_id: usize,
    pub end_doc_id: usize,
    /// 本节点切分所用维度（根为 `ROOT_DIMENSION_ID`）
    pub dimension_id: i32,
    /// 维度值或 `STAR_VALUE`
    pub dimension_value: i32,
    /// 子节点切分维度，叶子为 -1
    pub child_dimension_id: i32,
    /// None 表示叶子
    pub children: Option<BTreeMap<i32, NodeId>>,
    /// 聚合行 ID，聚合传播后必有值
    pub aggregated_doc_id: Option<usize>,
    /// 深度，根为 0
    pub level: usize,
}

impl TreeNode {
    pub fn root(start_doc_id: usize, end_doc_id: usize) -> Self {
        Self {
            start_doc_id,
            end_doc_id,
            dimension_id: ROOT_DIMENSION_ID,
            dimension_value: STAR_VALUE,
            child_dimension_id: -1,
            children: None,
            aggregated_doc_id: None,
            level: 0,
        }
    }

    #[inline]
    pub fn num_docs(&self) -> usize {
        self.end_doc_id - self.start_doc_id
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.as_ref().map_or(true, |c| c.is_empty())
    }

    #[inline]
    pub fn is_star(&self) -> bool {
        self.dimension_id != ROOT_DIMENSION_ID && self.dimension_value == STAR_VALUE
    }

    /// star 子节点
    pub fn star_child(&self) -> Option<NodeId> {
        self.children.as_ref()?.get(&STAR_VALUE).copied()
    }
}

/// 节点 arena
#[derive(Debug, Clone, Default)]
pub struct NodeArena {
    nodes: Vec<TreeNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: TreeNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 子节点 ID（按维度值升序，star 在最前）
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id]
            .children
            .as_ref()
            .map(|c| c.values().copied().collect())
            .unwrap_or_default()
    }

    /// 广度优先顺序
    pub fn breadth_first(&self, root: NodeId) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.children(id));
        }
        order
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TreeNode)> {
        self.nodes.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_breadth_first() {
        let mut arena = NodeArena::new();
        let root = arena.alloc(TreeNode::root(0, 3));
        let mut leaf = TreeNode::root(0, 1);
        leaf.dimension_id = 0;
        leaf.dimension_value = 4;
        leaf.level = 1;
        let a = arena.alloc(leaf.clone());
        leaf.dimension_value = STAR_VALUE;
        let star = arena.alloc(leaf);

        arena.get_mut(root).children = Some(BTreeMap::from([(4, a), (STAR_VALUE, star)]));

        assert_eq!(arena.children(root), vec![star, a]);
        assert_eq!(arena.breadth_first(root), vec![root, star, a]);
        assert_eq!(arena.get(root).star_child(), Some(star));
        assert!(arena.get(star).is_star());
        assert!(!arena.get(root).is_star());
        assert!(arena.get(a).is_leaf());
    }
}
