//! Tree builder: rebuilds the sponsor hierarchy of a network from its flat
//! membership rows.
//!
//! Sponsor edges are meant to form a tree but nothing enforces it. The walk
//! tracks the set of users on the current root-to-node path; a recruit that
//! is already on that path becomes a cycle marker leaf instead of being
//! expanded, so traversal always terminates with a partial tree. Sibling
//! branches never see each other's visits.
//!
//! Building, JSON rendering and dropping are all iterative, so a long sponsor
//! chain is bounded by heap rather than stack. `TreeNode` has no `Serialize`
//! impl for that reason; render it with [`TreeNode::write_json`].

use std::collections::{HashMap, HashSet};
use std::io::Write;

use serde::Deserialize;
use serde::ser::Error as _;

use crate::constants::{CYCLE_MARKER, UNKNOWN_NAME};
use crate::error::Result;
use crate::model::{Membership, User};
use crate::store::MembershipStore;

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Member(MemberNode),
    Cycle(CycleMarker),
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
pub struct MemberNode {
    pub user_id: String,
    pub name: String,
    pub is_head: bool,
    pub generation: Option<u32>,
    pub position_in_generation: Option<u32>,
    pub children: Vec<TreeNode>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CycleMarker {
    pub error: String,
}

impl Drop for MemberNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(node) = pending.pop() {
            if let TreeNode::Member(mut m) = node {
                pending.append(&mut m.children);
            }
        }
    }
}

impl TreeNode {
    pub fn cycle() -> Self {
        TreeNode::Cycle(CycleMarker {
            error: CYCLE_MARKER.to_string(),
        })
    }

    pub fn as_member(&self) -> Option<&MemberNode> {
        match self {
            TreeNode::Member(m) => Some(m),
            TreeNode::Cycle(_) => None,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, TreeNode::Cycle(_))
    }

    /// Number of member nodes (cycle markers excluded).
    pub fn member_count(&self) -> usize {
        self.walk().filter(|n| !n.is_cycle()).count()
    }

    pub fn cycle_count(&self) -> usize {
        self.walk().filter(|n| n.is_cycle()).count()
    }

    /// Write compact JSON: members as `{"user_id", "name", "is_head",
    /// "generation", "position_in_generation", "children"}`, cycle markers as
    /// `{"error": "cycle detected"}`.
    pub fn write_json<W: Write>(&self, mut out: W) -> serde_json::Result<()> {
        enum Step<'t> {
            Open(&'t TreeNode),
            Comma,
            Close,
        }

        let mut steps = vec![Step::Open(self)];
        while let Some(step) = steps.pop() {
            match step {
                Step::Comma => raw(&mut out, b",")?,
                Step::Close => raw(&mut out, b"]}")?,
                Step::Open(TreeNode::Cycle(c)) => {
                    raw(&mut out, b"{\"error\":")?;
                    serde_json::to_writer(&mut out, &c.error)?;
                    raw(&mut out, b"}")?;
                }
                Step::Open(TreeNode::Member(m)) => {
                    raw(&mut out, b"{\"user_id\":")?;
                    serde_json::to_writer(&mut out, &m.user_id)?;
                    raw(&mut out, b",\"name\":")?;
                    serde_json::to_writer(&mut out, &m.name)?;
                    raw(&mut out, b",\"is_head\":")?;
                    serde_json::to_writer(&mut out, &m.is_head)?;
                    raw(&mut out, b",\"generation\":")?;
                    serde_json::to_writer(&mut out, &m.generation)?;
                    raw(&mut out, b",\"position_in_generation\":")?;
                    serde_json::to_writer(&mut out, &m.position_in_generation)?;
                    raw(&mut out, b",\"children\":[")?;

                    steps.push(Step::Close);
                    for (i, child) in m.children.iter().enumerate().rev() {
                        steps.push(Step::Open(child));
                        if i > 0 {
                            steps.push(Step::Comma);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut out = Vec::new();
        self.write_json(&mut out)?;
        String::from_utf8(out).map_err(serde_json::Error::custom)
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn walk(&self) -> impl Iterator<Item = &TreeNode> {
        let mut pending = vec![self];
        std::iter::from_fn(move || {
            let node = pending.pop()?;
            if let TreeNode::Member(m) = node {
                pending.extend(m.children.iter().rev());
            }
            Some(node)
        })
    }
}

fn raw<W: Write>(out: &mut W, bytes: &[u8]) -> serde_json::Result<()> {
    out.write_all(bytes).map_err(serde_json::Error::io)
}

struct MemberInfo<'a> {
    name: &'a str,
    is_head: bool,
    generation: u32,
    position_in_generation: u32,
}

/// Sponsor-to-recruits index over one network's memberships.
pub struct NetworkIndex<'a> {
    recruits: HashMap<&'a str, Vec<&'a str>>,
    info: HashMap<&'a str, MemberInfo<'a>>,
}

impl<'a> NetworkIndex<'a> {
    /// `heads` holds the user ids of commercials owning a network.
    pub fn new(
        memberships: &'a [Membership],
        users: &'a [User],
        heads: &'a HashSet<String>,
    ) -> Self {
        let names: HashMap<&str, &str> = users
            .iter()
            .map(|u| (u.id.as_str(), u.display_name()))
            .collect();

        let mut recruits: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut info = HashMap::with_capacity(memberships.len());
        for m in memberships {
            // The root seat sponsors itself; it is not its own recruit.
            if !m.is_root {
                recruits
                    .entry(m.sponsor_id.as_str())
                    .or_default()
                    .push(m.user_id.as_str());
            }
            info.insert(
                m.user_id.as_str(),
                MemberInfo {
                    name: names.get(m.user_id.as_str()).copied().unwrap_or(UNKNOWN_NAME),
                    is_head: heads.contains(&m.user_id),
                    generation: m.generation,
                    position_in_generation: m.position_in_generation,
                },
            );
        }

        Self { recruits, info }
    }

    fn node(&self, user_id: &str) -> MemberNode {
        let (name, is_head, generation, position_in_generation) = match self.info.get(user_id) {
            Some(i) => (
                i.name,
                i.is_head,
                Some(i.generation),
                Some(i.position_in_generation),
            ),
            None => (UNKNOWN_NAME, false, None, None),
        };
        MemberNode {
            user_id: user_id.to_string(),
            name: name.to_string(),
            is_head,
            generation,
            position_in_generation,
            children: Vec::new(),
        }
    }

    fn recruit_at(&self, sponsor_id: &str, index: usize) -> Option<&'a str> {
        self.recruits.get(sponsor_id)?.get(index).copied()
    }

    /// Expand the hierarchy below `root`.
    pub fn tree(&self, root: &str) -> TreeNode {
        struct Frame<'f> {
            user_id: &'f str,
            node: MemberNode,
            next: usize,
        }

        let mut on_path: HashSet<&str> = HashSet::from([root]);
        let mut stack = vec![Frame {
            user_id: root,
            node: self.node(root),
            next: 0,
        }];

        while let Some(top) = stack.last_mut() {
            if let Some(child_id) = self.recruit_at(top.user_id, top.next) {
                top.next += 1;
                if on_path.contains(child_id) {
                    top.node.children.push(TreeNode::cycle());
                } else {
                    on_path.insert(child_id);
                    stack.push(Frame {
                        user_id: child_id,
                        node: self.node(child_id),
                        next: 0,
                    });
                }
                continue;
            }

            let Some(done) = stack.pop() else { break };
            on_path.remove(done.user_id);
            match stack.last_mut() {
                Some(parent) => parent.node.children.push(TreeNode::Member(done.node)),
                None => return TreeNode::Member(done.node),
            }
        }

        // The root frame is always popped last and returned above.
        TreeNode::Member(self.node(root))
    }
}

/// Rebuild the tree below `user_id` from its network's memberships.
///
/// Returns `None` when the user holds no membership. Read-only.
pub fn build_network_tree<S: MembershipStore>(
    store: &S,
    user_id: &str,
) -> Result<Option<TreeNode>> {
    let Some(membership) = store.get_membership(user_id)? else {
        return Ok(None);
    };

    let memberships = store.list_memberships(&membership.network_id)?;
    let ids: Vec<&str> = memberships.iter().map(|m| m.user_id.as_str()).collect();
    let users = store.get_users(&ids)?;
    let heads = store.head_user_ids()?;

    Ok(Some(NetworkIndex::new(&memberships, &users, &heads).tree(user_id)))
}
