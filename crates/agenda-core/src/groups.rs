use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use crate::model::{Group, Participant, is_blank};

/// Snapshot of group membership keyed by group id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDirectory {
    groups: BTreeMap<String, Group>,
}

impl GroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip_all)]
    pub fn from_groups<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = Group>,
    {
        let mut out = BTreeMap::new();
        for group in groups {
            if is_blank(&group.id) {
                warn!("skipping group with blank id");
                continue;
            }
            if let Some(previous) = out.insert(group.id.clone(), group) {
                debug!(group = %previous.id, "duplicate group id; keeping the later entry");
            }
        }
        debug!(count = out.len(), "built group directory");
        Self { groups: out }
    }

    pub fn get(&self, group_id: &str) -> Option<&Group> {
        self.groups.get(group_id)
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.groups.contains_key(group_id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Person members listed directly on the group. Nested groups are not
    /// followed; unknown groups have no members.
    pub fn direct_people(&self, group_id: &str) -> impl Iterator<Item = &str> {
        self.groups
            .get(group_id)
            .into_iter()
            .flat_map(|group| group.members.iter())
            .filter_map(Participant::as_person)
            .filter(|id| !is_blank(id))
    }

    /// Every person reachable from `group_id` through nested groups.
    ///
    /// Membership data can contain cycles (a group listing one of its own
    /// ancestors); each group is expanded at most once.
    #[tracing::instrument(skip(self))]
    pub fn resolve_people(&self, group_id: &str) -> BTreeSet<String> {
        let mut people = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut worklist = vec![group_id.to_string()];

        while let Some(current) = worklist.pop() {
            if !visited.insert(current.clone()) {
                trace!(group = %current, "group already expanded");
                continue;
            }

            let Some(group) = self.groups.get(&current) else {
                trace!(group = %current, "nested group not in directory");
                continue;
            };

            for member in &group.members {
                match member {
                    Participant::Person(id) if !is_blank(id) => {
                        people.insert(id.clone());
                    }
                    Participant::Group(id) if !is_blank(id) => {
                        if !visited.contains(id) {
                            worklist.push(id.clone());
                        }
                    }
                    _ => {}
                }
            }
        }

        debug!(count = people.len(), groups = visited.len(), "resolved group members");
        people
    }

    /// Group ids nested anywhere below `group_id`, excluding itself.
    pub fn nested_groups(&self, group_id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut worklist = vec![group_id.to_string()];

        while let Some(current) = worklist.pop() {
            let Some(group) = self.groups.get(&current) else {
                continue;
            };
            for nested in group.members.iter().filter_map(Participant::as_group) {
                if nested != group_id && !is_blank(nested) && seen.insert(nested.to_string()) {
                    worklist.push(nested.to_string());
                }
            }
        }

        seen
    }
}

impl FromIterator<Group> for GroupDirectory {
    fn from_iter<T: IntoIterator<Item = Group>>(iter: T) -> Self {
        Self::from_groups(iter)
    }
}
