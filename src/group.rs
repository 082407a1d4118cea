use crate::LinkId;

/// A set of laterally adjacent links, ordered left to right.
/// Lane changing is only permitted between members of a link group,
/// and members share a longitudinal coordinate frame.
#[derive(Clone, Debug)]
pub struct LinkGroup {
    link_ids: Vec<LinkId>,
}

impl LinkGroup {
    pub fn new(link_ids: &[LinkId]) -> Self {
        if link_ids.len() < 2 {
            panic!("Link group must contain atleast two links");
        }
        Self {
            link_ids: link_ids.to_vec(),
        }
    }

    /// The links in the group, left to right.
    pub fn link_ids(&self) -> &[LinkId] {
        &self.link_ids
    }

    /// The link directly to the left of the given link.
    pub fn left_of(&self, link_id: LinkId) -> Option<LinkId> {
        let idx = self.position(link_id)?;
        idx.checked_sub(1).map(|i| self.link_ids[i])
    }

    /// The link directly to the right of the given link.
    pub fn right_of(&self, link_id: LinkId) -> Option<LinkId> {
        let idx = self.position(link_id)?;
        self.link_ids.get(idx + 1).copied()
    }

    fn position(&self, link_id: LinkId) -> Option<usize> {
        self.link_ids.iter().position(|id| *id == link_id)
    }
}
