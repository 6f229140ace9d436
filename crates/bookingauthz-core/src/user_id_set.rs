use std::collections::HashSet;

/// A set of user ids, or the marker that matches every user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdSet {
    Everyone,
    Users(HashSet<String>),
}

impl Default for UserIdSet {
    fn default() -> Self {
        Self::Users(HashSet::new())
    }
}

impl UserIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(user_id: impl Into<String>) -> Self {
        Self::Users(HashSet::from([user_id.into()]))
    }

    pub fn is_everyone(&self) -> bool {
        matches!(self, Self::Everyone)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Everyone => false,
            Self::Users(ids) => ids.is_empty(),
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        match self {
            Self::Everyone => true,
            Self::Users(ids) => ids.contains(user_id),
        }
    }

    /// Explicit members, `None` for the everyone marker.
    pub fn user_ids(&self) -> Option<&HashSet<String>> {
        match self {
            Self::Everyone => None,
            Self::Users(ids) => Some(ids),
        }
    }

    pub fn insert(&mut self, user_id: impl Into<String>) {
        if let Self::Users(ids) = self {
            ids.insert(user_id.into());
        }
    }

    /// Removing from the everyone marker is a no-op.
    pub fn remove(&mut self, user_id: &str) {
        if let Self::Users(ids) = self {
            ids.remove(user_id);
        }
    }

    pub fn union(&mut self, other: &UserIdSet) {
        match other {
            Self::Everyone => *self = Self::Everyone,
            Self::Users(more) => {
                if let Self::Users(ids) = self {
                    ids.extend(more.iter().cloned());
                }
            }
        }
    }
}

impl FromIterator<String> for UserIdSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::Users(iter.into_iter().collect())
    }
}

impl From<HashSet<String>> for UserIdSet {
    fn from(ids: HashSet<String>) -> Self {
        Self::Users(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(ids: &[&str]) -> UserIdSet {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn everyone_contains_any_id() {
        let set = UserIdSet::Everyone;

        assert!(set.contains("1"));
        assert!(set.contains("anybody"));
        assert!(!set.is_empty());
        assert_eq!(set.user_ids(), None);
    }

    #[test]
    fn explicit_set_contains_only_members() {
        let set = users(&["1", "2"]);

        assert!(set.contains("2"));
        assert!(!set.contains("3"));
    }

    #[test]
    fn union_with_everyone_becomes_everyone() {
        let mut set = users(&["1"]);
        set.union(&UserIdSet::Everyone);

        assert!(set.is_everyone());
    }

    #[test]
    fn everyone_absorbs_union_and_insert() {
        let mut set = UserIdSet::Everyone;
        set.union(&users(&["1"]));
        set.insert("2");
        set.remove("3");

        assert_eq!(set, UserIdSet::Everyone);
    }

    #[test]
    fn union_of_explicit_sets_merges_members() {
        let mut set = users(&["1"]);
        set.union(&users(&["2", "3"]));

        assert_eq!(set, users(&["1", "2", "3"]));
    }

    #[test]
    fn default_is_empty() {
        assert!(UserIdSet::new().is_empty());
        assert!(!UserIdSet::single("1").is_empty());
    }
}
