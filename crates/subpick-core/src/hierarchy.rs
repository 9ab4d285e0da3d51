//! Element hierarchy: the parent/child tree of semantically named model elements.
//!
//! Loaders deliver the hierarchy as a flat map `{ elementId: [name, parentId] }`
//! where the root's parent is [`ROOT_SENTINEL`]. [`build_tree`] turns it into a
//! [`TreeNode`] tree whose node ids are freshly assigned, so several models can
//! share one tree view without id collisions.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Parent marker of the root element.
pub const ROOT_SENTINEL: &str = "*";

/// Identifier of an element in a loaded model's hierarchy.
pub type ElementId = String;

/// Flat hierarchy as delivered by the loader.
pub type Hierarchy = HashMap<ElementId, HierarchyEntry>;

/// One element of the flat hierarchy. Serialized as `[name, parentIdOrSentinel]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct HierarchyEntry {
    pub name: String,
    /// Parent element id; `None` for the root.
    pub parent: Option<ElementId>,
}

impl HierarchyEntry {
    pub fn new(name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
        }
    }
}

impl From<(String, String)> for HierarchyEntry {
    fn from((name, parent): (String, String)) -> Self {
        let parent = (parent != ROOT_SENTINEL).then_some(parent);
        Self { name, parent }
    }
}

impl From<HierarchyEntry> for (String, String) {
    fn from(entry: HierarchyEntry) -> Self {
        let parent = entry.parent.unwrap_or_else(|| ROOT_SENTINEL.to_string());
        (entry.name, parent)
    }
}

/// A node of the built element tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Freshly assigned tree id.
    pub id: u32,
    /// Element id from the source hierarchy.
    pub element_id: ElementId,
    pub name: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Finds a node by tree id.
    #[must_use]
    pub fn find(&self, id: u32) -> Option<&TreeNode> {
        self.iter().find(|node| node.id == id)
    }

    /// Pre-order walk over this subtree.
    pub fn iter(&self) -> TreeIter<'_> {
        TreeIter { stack: vec![self] }
    }

    /// Returns the number of nodes in this subtree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// A tree always contains at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Pre-order iterator returned by [`TreeNode::iter`].
pub struct TreeIter<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for TreeIter<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

impl<'a> IntoIterator for &'a TreeNode {
    type Item = &'a TreeNode;
    type IntoIter = TreeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A built tree with the id mapping used for tree-view sync.
#[derive(Debug, Clone)]
pub struct BuiltTree {
    pub root: TreeNode,
    /// Element id -> assigned tree id, for every element of the hierarchy.
    pub node_ids: HashMap<ElementId, u32>,
}

/// Builds the element tree.
///
/// Every entry receives a sequential id starting at `start_id + 1`, in natural
/// order of element ids. Children are sorted by natural order of their names.
/// Returns `None` when the hierarchy has no root entry. Entries whose parent is
/// missing are assigned an id but are not reachable from the root.
pub fn build_tree(hierarchy: &Hierarchy, start_id: u32) -> Option<BuiltTree> {
    let mut element_ids: Vec<&str> = hierarchy.keys().map(String::as_str).collect();
    element_ids.sort_by(|a, b| natural_cmp(a, b));

    let position: HashMap<&str, usize> = element_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut node_ids = HashMap::with_capacity(element_ids.len());
    let mut next_id = start_id;
    for id in &element_ids {
        next_id = next_id.saturating_add(1);
        node_ids.insert((*id).to_string(), next_id);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); element_ids.len()];
    let mut roots = Vec::new();
    for (i, id) in element_ids.iter().enumerate() {
        let entry = &hierarchy[*id];
        match entry.parent.as_deref() {
            None => roots.push(i),
            Some(parent) => match position.get(parent) {
                Some(&p) => children[p].push(i),
                None => log::debug!("element '{id}' references missing parent '{parent}'"),
            },
        }
    }

    let name_of = |i: usize| hierarchy[element_ids[i]].name.as_str();
    for list in &mut children {
        list.sort_by(|&a, &b| natural_cmp(name_of(a), name_of(b)).then(a.cmp(&b)));
    }

    let &root = roots.first()?;
    if roots.len() > 1 {
        log::warn!(
            "hierarchy has {} root entries, using '{}'",
            roots.len(),
            element_ids[root]
        );
    }

    // Iterative pre-order walk, then assemble nodes bottom-up.
    let mut order = Vec::new();
    let mut stack = vec![root];
    while let Some(i) = stack.pop() {
        order.push(i);
        stack.extend(children[i].iter().copied());
    }

    let mut built: Vec<Option<TreeNode>> = vec![None; element_ids.len()];
    for &i in order.iter().rev() {
        let kids = children[i].iter().filter_map(|&c| built[c].take()).collect();
        let element_id = element_ids[i];
        built[i] = Some(TreeNode {
            id: node_ids[element_id],
            element_id: element_id.to_string(),
            name: name_of(i).to_string(),
            children: kids,
        });
    }

    Some(BuiltTree {
        root: built[root].take()?,
        node_ids,
    })
}

/// Numeric-aware string ordering: `"part2" < "part10"`.
///
/// Digit runs compare by value, everything else compares case-insensitively,
/// with a plain byte comparison as the final tie-break.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ab, bb) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < ab.len() && j < bb.len() {
        if ab[i].is_ascii_digit() && bb[j].is_ascii_digit() {
            let run_a = digit_run(ab, i);
            let run_b = digit_run(bb, j);
            let ord = compare_digit_runs(&ab[i..run_a], &bb[j..run_b]);
            if ord != Ordering::Equal {
                return ord;
            }
            i = run_a;
            j = run_b;
        } else {
            let ord = ab[i].to_ascii_lowercase().cmp(&bb[j].to_ascii_lowercase());
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }
    (ab.len() - i)
        .cmp(&(bb.len() - j))
        .then_with(|| a.cmp(b))
}

fn digit_run(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|c| !c.is_ascii_digit())
        .map_or(bytes.len(), |p| from + p)
}

fn compare_digit_runs(a: &[u8], b: &[u8]) -> Ordering {
    let strip = |s: &[u8]| -> usize { s.iter().take_while(|&&c| c == b'0').count() };
    let (a, b) = (&a[strip(a)..], &b[strip(b)..]);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
