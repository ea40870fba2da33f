//! Tri-state file selection tree
//!
//! Files of a torrent are shown as a tree of check boxes. Checking or
//! unchecking a directory applies to everything below it, and every directory
//! shows checked, unchecked or partial depending on its children.

use crate::error::{Error, Result};
use crate::types::TorrentDescriptor;
use crate::utils::format_bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Checked,
    Partial,
    Unchecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf { length: u64, path: Vec<String> },
    Interior { children: Vec<NodeId> },
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
    state: CheckState,
}

/// Number and total size of the checked files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub count: usize,
    pub total_size: u64,
}

impl Selection {
    /// Nothing would be downloaded
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn label(&self) -> String {
        if self.is_empty() {
            "Nothing to download".to_string()
        } else {
            format!(
                "Selected {} files ({})",
                self.count,
                format_bytes(self.total_size)
            )
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileTree {
    nodes: Vec<Node>,
}

impl FileTree {
    /// Empty directory tree, everything checked
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            nodes: vec![Node {
                name: root_name.into(),
                parent: None,
                kind: NodeKind::Interior {
                    children: Vec::new(),
                },
                state: CheckState::Checked,
            }],
        }
    }

    /// Tree consisting of a single file
    pub fn single_file(name: impl Into<String>, length: u64) -> Self {
        let name = name.into();
        Self {
            nodes: vec![Node {
                name: name.clone(),
                parent: None,
                kind: NodeKind::Leaf {
                    length,
                    path: vec![name],
                },
                state: CheckState::Checked,
            }],
        }
    }

    pub fn from_descriptor(descriptor: &TorrentDescriptor) -> Result<Self> {
        if descriptor.single_file_mode && descriptor.files.len() == 1 {
            return Ok(Self::single_file(
                descriptor.suggested_name.clone(),
                descriptor.files[0].length,
            ));
        }

        let mut tree = Self::new(descriptor.suggested_name.clone());
        for file in &descriptor.files {
            tree.add_file(&file.path, file.length)?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Add a checked file at `path` (relative to the root), creating
    /// directories on the way
    pub fn add_file(&mut self, path: &[String], length: u64) -> Result<NodeId> {
        let Some((file_name, dirs)) = path.split_last() else {
            return Err(Error::InvalidSelection("empty file path".to_string()));
        };

        let mut parent = self.root();
        for dir in dirs {
            parent = match self.child_named(parent, dir)? {
                Some(existing) if self.is_leaf(existing) => {
                    return Err(Error::InvalidSelection(format!(
                        "{} is a file, not a directory",
                        dir
                    )))
                }
                Some(existing) => existing,
                None => self.push_child(
                    parent,
                    dir.clone(),
                    NodeKind::Interior {
                        children: Vec::new(),
                    },
                )?,
            };
        }

        if self.child_named(parent, file_name)?.is_some() {
            return Err(Error::InvalidSelection(format!(
                "duplicate path {}",
                path.join("/")
            )));
        }
        let leaf = self.push_child(
            parent,
            file_name.clone(),
            NodeKind::Leaf {
                length,
                path: path.to_vec(),
            },
        )?;
        self.refresh_ancestors(leaf);
        Ok(leaf)
    }

    /// Locate a node by its path relative to the root
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        let mut current = self.root();
        for component in path {
            current = self.child_named(current, component).ok().flatten()?;
        }
        Some(current)
    }

    pub fn state(&self, id: NodeId) -> Result<CheckState> {
        Ok(self.node(id)?.state)
    }

    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(&self.node(id)?.name)
    }

    /// Children in name order; empty for files
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        match &self.node(id)?.kind {
            NodeKind::Interior { children } => Ok(children.as_slice()),
            NodeKind::Leaf { .. } => Ok(&[]),
        }
    }

    /// Set the state of `id`, force it onto its whole subtree, then recompute
    /// every ancestor up to the root.
    ///
    /// `Partial` is derived and cannot be set.
    pub fn set_check_state(&mut self, id: NodeId, state: CheckState) -> Result<()> {
        self.node(id)?;
        if state == CheckState::Partial {
            return Err(Error::InvalidSelection(
                "partial state cannot be set directly".to_string(),
            ));
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.state = state;
            if let NodeKind::Interior { children } = &node.kind {
                stack.extend(children.iter().copied());
            }
        }

        self.refresh_ancestors(id);
        Ok(())
    }

    /// Flip a check box the way a click does: anything not checked becomes
    /// checked
    pub fn toggle(&mut self, id: NodeId) -> Result<CheckState> {
        let next = match self.state(id)? {
            CheckState::Checked => CheckState::Unchecked,
            CheckState::Partial | CheckState::Unchecked => CheckState::Checked,
        };
        self.set_check_state(id, next)?;
        Ok(next)
    }

    /// Count and size of checked files, computed from scratch
    pub fn selected_leaves(&self) -> Selection {
        self.nodes
            .iter()
            .filter(|node| node.state == CheckState::Checked)
            .filter_map(|node| match node.kind {
                NodeKind::Leaf { length, .. } => Some(length),
                NodeKind::Interior { .. } => None,
            })
            .fold(Selection::default(), |acc, length| Selection {
                count: acc.count + 1,
                total_size: acc.total_size + length,
            })
    }

    /// Paths of checked files in tree order
    pub fn selected_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            match &node.kind {
                NodeKind::Leaf { path, .. } => {
                    if node.state == CheckState::Checked {
                        paths.push(path.clone());
                    }
                }
                NodeKind::Interior { children } => {
                    if node.state != CheckState::Unchecked {
                        stack.extend(children.iter().rev().copied());
                    }
                }
            }
        }
        paths
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| Error::InvalidSelection(format!("unknown node {}", id.0)))
    }

    fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Leaf { .. })
    }

    fn child_named(&self, parent: NodeId, name: &str) -> Result<Option<NodeId>> {
        Ok(self
            .children(parent)?
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].name == name))
    }

    fn push_child(&mut self, parent: NodeId, name: String, kind: NodeKind) -> Result<NodeId> {
        let id = NodeId(self.nodes.len());
        let position = {
            let NodeKind::Interior { children } = &self.nodes[parent.0].kind else {
                return Err(Error::InvalidSelection(format!(
                    "{} is a file, not a directory",
                    self.nodes[parent.0].name
                )));
            };
            children.partition_point(|child| self.nodes[child.0].name <= name)
        };

        self.nodes.push(Node {
            name,
            parent: Some(parent),
            kind,
            state: CheckState::Checked,
        });
        if let NodeKind::Interior { children } = &mut self.nodes[parent.0].kind {
            children.insert(position, id);
        }
        Ok(id)
    }

    fn refresh_ancestors(&mut self, id: NodeId) {
        let mut current = self.nodes[id.0].parent;
        while let Some(ancestor) = current {
            let derived = match &self.nodes[ancestor.0].kind {
                NodeKind::Interior { children } => {
                    derive_state(children.iter().map(|child| self.nodes[child.0].state))
                }
                NodeKind::Leaf { .. } => self.nodes[ancestor.0].state,
            };
            self.nodes[ancestor.0].state = derived;
            current = self.nodes[ancestor.0].parent;
        }
    }
}

/// Checked if every child is checked, unchecked if every child is unchecked,
/// partial otherwise
pub fn derive_state(children: impl IntoIterator<Item = CheckState>) -> CheckState {
    let mut has_checked = false;
    let mut has_partial = false;
    let mut has_unchecked = false;
    for state in children {
        match state {
            CheckState::Checked => has_checked = true,
            CheckState::Partial => has_partial = true,
            CheckState::Unchecked => has_unchecked = true,
        }
    }

    if !has_partial && !has_unchecked {
        CheckState::Checked
    } else if has_checked || has_partial {
        CheckState::Partial
    } else {
        CheckState::Unchecked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<String> {
        s.split('/').map(String::from).collect()
    }

    /// root: { "a.txt": 100, dir: { "b.txt": 200, "c.txt": 50 } }
    fn sample() -> FileTree {
        let mut tree = FileTree::new("root");
        tree.add_file(&path("a.txt"), 100).unwrap();
        tree.add_file(&path("dir/b.txt"), 200).unwrap();
        tree.add_file(&path("dir/c.txt"), 50).unwrap();
        tree
    }

    fn all_nodes(tree: &FileTree) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(tree.children(id).unwrap().iter().copied());
        }
        out
    }

    fn assert_consistent(tree: &FileTree, id: NodeId) {
        let children = tree.children(id).unwrap();
        if children.is_empty() {
            return;
        }
        for &child in children {
            assert_consistent(tree, child);
        }
        let expected = derive_state(children.iter().map(|&c| tree.state(c).unwrap()));
        assert_eq!(
            tree.state(id).unwrap(),
            expected,
            "node {:?} disagrees with its children",
            tree.name(id).unwrap()
        );
    }

    #[test]
    fn test_example_selection() {
        let mut tree = sample();
        let root = tree.root();
        tree.set_check_state(root, CheckState::Unchecked).unwrap();
        assert_eq!(tree.selected_leaves(), Selection::default());

        let dir = tree.find(&["dir"]).unwrap();
        tree.set_check_state(dir, CheckState::Checked).unwrap();
        assert_eq!(
            tree.selected_leaves(),
            Selection {
                count: 2,
                total_size: 250
            }
        );
        assert_eq!(tree.state(root).unwrap(), CheckState::Partial);

        let a = tree.find(&["a.txt"]).unwrap();
        tree.set_check_state(a, CheckState::Checked).unwrap();
        assert_eq!(
            tree.selected_leaves(),
            Selection {
                count: 3,
                total_size: 350
            }
        );
        assert_eq!(tree.state(root).unwrap(), CheckState::Checked);
    }

    #[test]
    fn test_all_and_nothing_selected() {
        let mut tree = sample();
        assert_eq!(
            tree.selected_leaves(),
            Selection {
                count: 3,
                total_size: 350
            }
        );

        tree.toggle(tree.root()).unwrap();
        let selection = tree.selected_leaves();
        assert!(selection.is_empty());
        assert_eq!(selection.label(), "Nothing to download");
        assert!(tree.selected_paths().is_empty());
        for id in all_nodes(&tree) {
            assert_eq!(tree.state(id).unwrap(), CheckState::Unchecked);
        }
    }

    #[test]
    fn test_invariant_holds_after_toggles() {
        let mut tree = FileTree::new("root");
        for p in ["x/1", "x/2", "x/y/3", "x/y/4", "x/y/z/5", "6", "w/7"] {
            tree.add_file(&path(p), 10).unwrap();
        }

        let nodes = all_nodes(&tree);
        // Deterministic walk over the nodes with a stride coprime to the count
        for step in 0..40 {
            let id = nodes[(step * 5) % nodes.len()];
            tree.toggle(id).unwrap();
            assert_consistent(&tree, tree.root());
        }
    }

    #[test]
    fn test_check_then_uncheck_round_trip() {
        let mut tree = sample();
        let b = tree.find(&["dir", "b.txt"]).unwrap();
        tree.set_check_state(b, CheckState::Unchecked).unwrap();

        let before: Vec<_> = all_nodes(&tree)
            .into_iter()
            .map(|id| tree.state(id).unwrap())
            .collect();

        let c = tree.find(&["dir", "c.txt"]).unwrap();
        tree.set_check_state(c, CheckState::Unchecked).unwrap();
        tree.set_check_state(c, CheckState::Checked).unwrap();

        let after: Vec<_> = all_nodes(&tree)
            .into_iter()
            .map(|id| tree.state(id).unwrap())
            .collect();
        assert_eq!(before, after);
        assert_eq!(
            tree.state(tree.find(&["dir"]).unwrap()).unwrap(),
            CheckState::Partial
        );
    }

    #[test]
    fn test_partial_cannot_be_set() {
        let mut tree = sample();
        let dir = tree.find(&["dir"]).unwrap();
        assert!(matches!(
            tree.set_check_state(dir, CheckState::Partial),
            Err(Error::InvalidSelection(_))
        ));
        assert!(tree.set_check_state(NodeId(99), CheckState::Checked).is_err());
    }

    #[test]
    fn test_conflicting_paths_are_rejected() {
        let mut tree = sample();
        assert!(tree.add_file(&path("a.txt/nested"), 1).is_err());
        assert!(tree.add_file(&path("dir/b.txt"), 1).is_err());
        assert!(tree.add_file(&[], 1).is_err());
    }

    #[test]
    fn test_selected_paths_in_name_order() {
        let mut tree = FileTree::new("root");
        tree.add_file(&path("b/2"), 1).unwrap();
        tree.add_file(&path("a"), 1).unwrap();
        tree.add_file(&path("b/1"), 1).unwrap();

        assert_eq!(
            tree.selected_paths(),
            vec![path("a"), path("b/1"), path("b/2")]
        );
        assert_eq!(tree.selected_leaves().label(), "Selected 3 files (3 B)");
    }

    #[test]
    fn test_single_file_tree() {
        let mut tree = FileTree::single_file("movie.mkv", 700);
        assert!(tree.children(tree.root()).unwrap().is_empty());
        tree.toggle(tree.root()).unwrap();
        assert!(tree.selected_leaves().is_empty());
    }
}
