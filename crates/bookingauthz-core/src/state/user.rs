use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::acl::{AclEntry, AclEntryId, AclObjectIdentity};
use crate::object_type::{ObjectClass, ObjectTypeRegistry, Permission, Role};

/// Denormalized view of every ACL entry that applies to one user, directly or
/// through a group.
#[derive(Debug)]
pub struct AclUserState {
    registry: Arc<ObjectTypeRegistry>,
    inner: RwLock<UserStateInner>,
}

#[derive(Debug, Default)]
struct UserStateInner {
    entries: HashMap<AclEntryId, AclEntry>,
    objects: HashMap<AclObjectIdentity, ObjectState>,
    indexes: [HashMap<ObjectClass, HashSet<i64>>; Index::COUNT],
}

#[derive(Debug, Default)]
struct ObjectState {
    entries: HashMap<AclEntryId, AclEntry>,
    roles: HashSet<Role>,
    permissions: HashSet<Permission>,
}

impl ObjectState {
    fn recompute(&mut self, class: &ObjectClass, registry: &ObjectTypeRegistry) {
        self.roles = self.entries.values().map(|entry| entry.role.clone()).collect();
        self.permissions = self
            .roles
            .iter()
            .filter_map(|role| registry.role_permissions(class, role))
            .flatten()
            .cloned()
            .collect();
    }
}

/// The class-indexed object sets kept for fast listing.
#[derive(Debug, Clone, Copy)]
enum Index {
    Owned,
    Readable,
    Writable,
    Reservable,
    Controllable,
}

impl Index {
    const COUNT: usize = 5;
    const ALL: [Index; Self::COUNT] = [
        Self::Owned,
        Self::Readable,
        Self::Writable,
        Self::Reservable,
        Self::Controllable,
    ];

    fn holds(self, state: &ObjectState) -> bool {
        match self {
            Self::Owned => state.roles.contains(&Role::OWNER),
            Self::Readable => state.permissions.contains(&Permission::READ),
            Self::Writable => state.permissions.contains(&Permission::WRITE),
            Self::Reservable => state.permissions.contains(&Permission::RESERVE_RESOURCE),
            Self::Controllable => state.permissions.contains(&Permission::CONTROL_RESOURCE),
        }
    }

    fn for_permission(permission: &Permission) -> Option<Self> {
        [
            (Permission::READ, Self::Readable),
            (Permission::WRITE, Self::Writable),
            (Permission::RESERVE_RESOURCE, Self::Reservable),
            (Permission::CONTROL_RESOURCE, Self::Controllable),
        ]
        .into_iter()
        .find(|(indexed, _)| indexed == permission)
        .map(|(_, index)| index)
    }
}

impl UserStateInner {
    fn reindex(&mut self, object: &AclObjectIdentity) {
        let empty = ObjectState::default();
        let state = self.objects.get(object).unwrap_or(&empty);
        for index in Index::ALL {
            let by_class = &mut self.indexes[index as usize];
            if index.holds(state) {
                by_class
                    .entry(object.object_class.clone())
                    .or_default()
                    .insert(object.object_id);
            } else if let Some(ids) = by_class.get_mut(&object.object_class) {
                ids.remove(&object.object_id);
                if ids.is_empty() {
                    by_class.remove(&object.object_class);
                }
            }
        }
    }

    fn indexed(&self, index: Index, class: &ObjectClass) -> HashSet<i64> {
        self.indexes[index as usize]
            .get(class)
            .cloned()
            .unwrap_or_default()
    }

    fn scan(&self, class: &ObjectClass, predicate: impl Fn(&ObjectState) -> bool) -> HashSet<i64> {
        self.objects
            .iter()
            .filter(|(object, state)| object.object_class == *class && predicate(state))
            .map(|(object, _)| object.object_id)
            .collect()
    }
}

impl AclUserState {
    pub fn new(registry: Arc<ObjectTypeRegistry>) -> Self {
        Self {
            registry,
            inner: RwLock::new(UserStateInner::default()),
        }
    }

    /// Returns `false` when the entry was already present.
    pub fn add_entry(&self, entry: &AclEntry) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&entry.id) {
            return false;
        }
        inner.entries.insert(entry.id, entry.clone());

        let object = &entry.object_identity;
        let state = inner.objects.entry(object.clone()).or_default();
        state.entries.insert(entry.id, entry.clone());
        state.recompute(&object.object_class, &self.registry);
        inner.reindex(object);
        true
    }

    /// Returns `false` when the entry was not present.
    pub fn remove_entry(&self, entry: &AclEntry) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.remove(&entry.id).is_none() {
            return false;
        }

        let object = &entry.object_identity;
        let now_empty = match inner.objects.get_mut(object) {
            Some(state) => {
                state.entries.remove(&entry.id);
                state.recompute(&object.object_class, &self.registry);
                state.entries.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.objects.remove(object);
        }
        inner.reindex(object);
        true
    }

    pub fn contains_entry(&self, entry_id: AclEntryId) -> bool {
        self.inner.read().entries.contains_key(&entry_id)
    }

    pub fn entry_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn entries(&self, object: &AclObjectIdentity) -> Vec<AclEntry> {
        self.inner
            .read()
            .objects
            .get(object)
            .map(|state| state.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn roles(&self, object: &AclObjectIdentity) -> HashSet<Role> {
        self.inner
            .read()
            .objects
            .get(object)
            .map(|state| state.roles.clone())
            .unwrap_or_default()
    }

    pub fn permissions(&self, object: &AclObjectIdentity) -> HashSet<Permission> {
        self.inner
            .read()
            .objects
            .get(object)
            .map(|state| state.permissions.clone())
            .unwrap_or_default()
    }

    pub fn has_role(&self, object: &AclObjectIdentity, role: &Role) -> bool {
        self.inner
            .read()
            .objects
            .get(object)
            .is_some_and(|state| state.roles.contains(role))
    }

    pub fn has_permission(&self, object: &AclObjectIdentity, permission: &Permission) -> bool {
        self.inner
            .read()
            .objects
            .get(object)
            .is_some_and(|state| state.permissions.contains(permission))
    }

    pub fn objects_with_role(&self, class: &ObjectClass, role: &Role) -> HashSet<i64> {
        let inner = self.inner.read();
        if *role == Role::OWNER {
            return inner.indexed(Index::Owned, class);
        }
        inner.scan(class, |state| state.roles.contains(role))
    }

    pub fn objects_with_permission(
        &self,
        class: &ObjectClass,
        permission: &Permission,
    ) -> HashSet<i64> {
        let inner = self.inner.read();
        match Index::for_permission(permission) {
            Some(index) => inner.indexed(index, class),
            None => inner.scan(class, |state| state.permissions.contains(permission)),
        }
    }
}
