use log::warn;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::config::ColumnMapping;
use crate::record::{CellValue, NodeId, Record};

/// Filter value meaning "the whole organization"
pub const ALL_DIRECTORATES: &str = "Geral";

/// One employee in the arena
#[derive(Clone, Debug)]
pub struct OrgNode {
    pub id: Option<NodeId>,
    pub parent: Option<NodeId>,
    /// Directorate key, used by the department filter
    pub directorate: Option<String>,
    pub record: Record,
    /// Arena indices of direct reports, in sheet order
    pub children: Vec<usize>,
}

/// Result of looking up the top manager of a directorate
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectorateRoot {
    /// Arena index of the unique root
    Found(usize),
    /// Nobody belongs to the directorate
    NoMembers,
    /// No identifiable member reports outside the directorate (a cycle, or a
    /// root without an id)
    NoCandidate,
    /// Several members report outside the directorate
    Ambiguous(usize),
}

/// Organization tree built once from the flat employee list
///
/// Nodes live in an arena (`Vec<OrgNode>`) and refer to each other by index;
/// an index map resolves identifiers. Building is O(n) and the structure is
/// never mutated afterwards, so filtered views are always detached copies.
#[derive(Clone, Debug, Default)]
pub struct OrgTree {
    nodes: Vec<OrgNode>,
    index: HashMap<NodeId, usize>,
    parent_key: String,
}

impl OrgTree {
    /// Build the arena from employee records
    ///
    /// When an identifier repeats, the last record with it is the one the index
    /// resolves; children are attached to that record.
    ///
    /// # Arguments
    /// * `records` - Employee rows (already merged with grades, if desired)
    /// * `mapping` - Column configuration naming the id, parent and directorate fields
    pub fn build(records: Vec<Record>, mapping: &ColumnMapping) -> Self {
        let mut nodes: Vec<OrgNode> = records
            .into_iter()
            .map(|record| OrgNode {
                id: NodeId::from_cell(record.value(&mapping.id)),
                parent: NodeId::from_cell(record.value(&mapping.parent)),
                directorate: record.value(&mapping.directorate).as_key(),
                record,
                children: Vec::new(),
            })
            .collect();

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if let Some(id) = &node.id {
                index.insert(id.clone(), i);
            }
        }

        for i in 0..nodes.len() {
            let parent_idx = nodes[i].parent.as_ref().and_then(|p| index.get(p)).copied();
            if let Some(p) = parent_idx {
                nodes[p].children.push(i);
            }
        }

        OrgTree {
            nodes,
            index,
            parent_key: mapping.parent.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Arena index of an identifier
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Record of an identifier
    pub fn get(&self, id: &NodeId) -> Option<&Record> {
        self.position(id).map(|idx| &self.nodes[idx].record)
    }

    /// All records, in sheet order
    pub fn records(&self) -> Vec<Record> {
        self.nodes.iter().map(|n| n.record.clone()).collect()
    }

    /// Indices of the subtree under `root`, root first, in level order
    ///
    /// Every reachable node appears once even if the child lists contain
    /// duplicates; nodes not reachable through child links never appear.
    /// Unknown roots yield an empty list.
    pub fn subtree(&self, root: &NodeId) -> Vec<usize> {
        let Some(start) = self.position(root) else {
            return Vec::new();
        };

        let mut order = Vec::new();
        let mut visited: HashSet<&NodeId> = HashSet::from([root]);
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &child in &self.nodes[current].children {
                let Some(child_id) = self.nodes[child].id.as_ref() else {
                    continue;
                };
                if visited.insert(child_id) {
                    queue.push_back(self.position(child_id).unwrap_or(child));
                }
            }
        }

        order
    }

    /// Detached copies of the records in the subtree under `root`
    pub fn subtree_records(&self, root: &NodeId) -> Vec<Record> {
        self.subtree(root)
            .into_iter()
            .map(|idx| self.nodes[idx].record.clone())
            .collect()
    }

    /// Find the top manager of a directorate
    ///
    /// Among members of the directorate, the root is the unique member whose
    /// manager is not itself a member.
    pub fn directorate_root(&self, directorate: &str) -> DirectorateRoot {
        let wanted = directorate.trim();
        let members: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].directorate.as_deref() == Some(wanted))
            .collect();
        if members.is_empty() {
            return DirectorateRoot::NoMembers;
        }

        let member_ids: HashSet<&NodeId> = members
            .iter()
            .filter_map(|&i| self.nodes[i].id.as_ref())
            .collect();

        let candidates: Vec<usize> = members
            .into_iter()
            .filter(|&i| {
                self.nodes[i]
                    .parent
                    .as_ref()
                    .is_none_or(|p| !member_ids.contains(p))
            })
            .collect();

        match candidates.as_slice() {
            [] => DirectorateRoot::NoCandidate,
            [only] => DirectorateRoot::Found(*only),
            many => DirectorateRoot::Ambiguous(many.len()),
        }
    }

    /// Records shown when the chart is filtered to one directorate
    ///
    /// The directorate root's parent field is blanked on the returned copy so
    /// the chart treats it as its own root. When no unique, identified root
    /// exists the outcome of the root lookup is returned instead; a root
    /// without an identifier reports `NoCandidate`.
    pub fn directorate_view(&self, directorate: &str) -> Result<Vec<Record>, DirectorateRoot> {
        let root = match self.directorate_root(directorate) {
            DirectorateRoot::Found(idx) => idx,
            other => return Err(other),
        };
        let Some(root_id) = self.nodes[root].id.as_ref() else {
            return Err(DirectorateRoot::NoCandidate);
        };

        let mut view = self.subtree_records(root_id);
        if let Some(first) = view.first_mut() {
            first.set(self.parent_key.clone(), CellValue::Empty);
        }
        Ok(view)
    }

    /// Like `directorate_view`, but an unresolvable root gives an empty view
    pub fn filter_by_directorate(&self, directorate: &str) -> Vec<Record> {
        self.directorate_view(directorate).unwrap_or_else(|outcome| {
            warn!(
                "could not determine a unique root for directorate {:?} ({:?}); showing an empty chart",
                directorate, outcome
            );
            Vec::new()
        })
    }

    /// Records for a filter value, where `"Geral"` means everybody
    pub fn view(&self, filter: Option<&str>) -> Vec<Record> {
        match filter.map(str::trim) {
            None | Some("") | Some(ALL_DIRECTORATES) => self.records(),
            Some(directorate) => self.filter_by_directorate(directorate),
        }
    }

    /// Distinct directorate names, sorted
    pub fn directorates(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter_map(|n| n.directorate.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Extract the subtree under `root` from a flat employee list
///
/// Builds the id and children maps once and walks them breadth-first. The
/// root comes first; an unknown root gives an empty list.
///
/// # Examples
/// ```
/// use orgchart::config::ColumnMapping;
/// use orgchart::record::{CellValue, NodeId, Record};
/// use orgchart::tree::get_subtree;
///
/// let mapping = ColumnMapping::default();
/// let row = |id: &str, parent: &str| -> Record {
///     [(mapping.id.as_str(), CellValue::from(id)), (mapping.parent.as_str(), CellValue::from(parent))]
///         .into_iter()
///         .collect()
/// };
/// let all = vec![row("A", ""), row("B", "A"), row("C", "B"), row("D", "A")];
/// let team = get_subtree(&all, &NodeId::from("B"), &mapping);
/// assert_eq!(team.len(), 2);
/// ```
pub fn get_subtree(records: &[Record], root: &NodeId, mapping: &ColumnMapping) -> Vec<Record> {
    OrgTree::build(records.to_vec(), mapping).subtree_records(root)
}
