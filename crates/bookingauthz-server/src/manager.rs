use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

use bookingauthz_core::{
    AclEntry, AclEntryDependency, AclEntryId, AclIdentity, AclObjectIdentity, DependencyKind, Role,
};
use bookingauthz_storage::AclStore;

use crate::audit;
use crate::authorization::Authorization;
use crate::error::AuthzError;
use crate::graph::ObjectGraph;
use crate::provider::IdentityProvider;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Entries deleted by one call, and children kept because another parent
/// still references them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<AclEntry>,
    pub retained: Vec<AclEntry>,
}

impl DeleteOutcome {
    fn merge(&mut self, other: DeleteOutcome) {
        self.deleted.extend(other.deleted);
        self.retained.extend(other.retained);
    }

    fn is_deleted(&self, entry_id: AclEntryId) -> bool {
        self.deleted.iter().any(|entry| entry.id == entry_id)
    }
}

/// Entries created and deleted since `begin`. Deleting an entry created in
/// the same transaction cancels both; the entry is kept in `cancelled` so a
/// projection loaded from the store meanwhile can still be scrubbed.
#[derive(Debug, Default)]
struct Transaction {
    added: BTreeMap<AclEntryId, AclEntry>,
    removed: BTreeMap<AclEntryId, AclEntry>,
    cancelled: BTreeMap<AclEntryId, AclEntry>,
}

impl Transaction {
    fn add(&mut self, entry: AclEntry) {
        if self.removed.remove(&entry.id).is_none() {
            self.added.insert(entry.id, entry);
        }
    }

    fn remove(&mut self, entry: AclEntry) {
        match self.added.remove(&entry.id) {
            Some(added) => {
                self.cancelled.insert(added.id, added);
            }
            None => {
                self.removed.insert(entry.id, entry);
            }
        }
    }
}

/// Mutates ACL entries inside a transaction and propagates grants along the
/// object graph. Changes reach the shared cache on `commit`.
pub struct AuthorizationManager<S, P, G> {
    authorization: Arc<Authorization<S, P>>,
    graph: Arc<G>,
    transaction: Option<Transaction>,
}

impl<S: AclStore, P: IdentityProvider, G: ObjectGraph> AuthorizationManager<S, P, G> {
    pub fn new(authorization: Arc<Authorization<S, P>>, graph: Arc<G>) -> Self {
        Self {
            authorization,
            graph,
            transaction: None,
        }
    }

    pub fn authorization(&self) -> &Authorization<S, P> {
        &self.authorization
    }

    // --- Transactions ---

    pub fn begin(&mut self) -> Result<(), AuthzError> {
        if self.transaction.is_some() {
            return Err(AuthzError::TransactionActive);
        }
        self.transaction = Some(Transaction::default());
        Ok(())
    }

    pub fn is_transaction_active(&self) -> bool {
        self.transaction.is_some()
    }

    /// Applies the net additions, then the net removals, to the cache.
    /// Cancelled entries are evicted like removals.
    /// A failure leaves the cache partially updated; clear it before retrying.
    pub async fn commit(&mut self) -> Result<(), AuthzError> {
        let transaction = self.transaction.take().ok_or(AuthzError::NoTransaction)?;
        let authorization = Arc::clone(&self.authorization);

        let _guard = authorization.commit_lock().lock().await;
        for entry in transaction.added.values() {
            authorization.add_entry_to_cache(entry).await?;
        }
        for entry in transaction
            .removed
            .values()
            .chain(transaction.cancelled.values())
        {
            authorization.remove_entry_from_cache(entry).await?;
        }
        audit::audit_transaction_committed(transaction.added.len(), transaction.removed.len());
        Ok(())
    }

    /// Discards the working sets. Undoing store writes is left to the
    /// enclosing store transaction.
    pub fn rollback(&mut self) -> Result<(), AuthzError> {
        let transaction = self.transaction.take().ok_or(AuthzError::NoTransaction)?;
        tracing::debug!(
            target: "acl",
            added = transaction.added.len(),
            removed = transaction.removed.len(),
            "ACL transaction rolled back"
        );
        Ok(())
    }

    fn transaction_mut(&mut self) -> Result<&mut Transaction, AuthzError> {
        self.transaction.as_mut().ok_or(AuthzError::NoTransaction)
    }

    fn is_removed(&self, entry_id: AclEntryId) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|transaction| transaction.removed.contains_key(&entry_id))
    }

    // --- Reads ---

    /// Entry for the triple as seen by the open transaction.
    pub async fn get_entry(
        &self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<Option<AclEntry>, AuthzError> {
        if let Some(transaction) = &self.transaction
            && let Some(entry) = transaction
                .added
                .values()
                .find(|entry| entry.matches(identity, object, role))
        {
            return Ok(Some(entry.clone()));
        }
        let entry = self
            .authorization
            .store()
            .find_entry(identity, object, role)
            .await?;
        Ok(entry.filter(|entry| !self.is_removed(entry.id)))
    }

    pub async fn entry(&self, entry_id: AclEntryId) -> Result<Option<AclEntry>, AuthzError> {
        if let Some(entry) = self
            .transaction
            .as_ref()
            .and_then(|transaction| transaction.added.get(&entry_id))
        {
            return Ok(Some(entry.clone()));
        }
        if self.is_removed(entry_id) {
            return Ok(None);
        }
        if let Some(entry) = self.authorization.cache().acl_entry(entry_id).await {
            return Ok(Some(entry));
        }
        Ok(self.authorization.store().get_entry(entry_id).await?)
    }

    /// Entries of `object` as seen by the open transaction.
    pub async fn entries(&self, object: &AclObjectIdentity) -> Result<Vec<AclEntry>, AuthzError> {
        let mut entries: Vec<AclEntry> = self
            .authorization
            .store()
            .list_entries_by_object(object)
            .await?
            .into_iter()
            .filter(|entry| !self.is_removed(entry.id))
            .collect();
        if let Some(transaction) = &self.transaction {
            for entry in transaction.added.values() {
                if entry.object_identity == *object
                    && !entries.iter().any(|existing| existing.id == entry.id)
                {
                    entries.push(entry.clone());
                }
            }
        }
        Ok(entries)
    }

    // --- Creation ---

    /// Grants `role` on `object` and propagates it to the object's children.
    /// Returns the existing entry when the grant already exists, and `None`
    /// for the root user, who holds every permission without entries.
    pub async fn create_entry(
        &mut self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<Option<AclEntry>, AuthzError> {
        if identity.is_root() {
            return Ok(None);
        }
        self.transaction_mut()?;
        self.validate_role(object, role)?;

        if let Some(existing) = self.get_entry(identity, object, role).await? {
            return Ok(Some(existing));
        }
        let entry = self.insert_entry(identity, object, role).await?;
        self.propagate_from(&entry).await?;
        Ok(Some(entry))
    }

    fn validate_role(&self, object: &AclObjectIdentity, role: &Role) -> Result<(), AuthzError> {
        let object_type = self
            .authorization
            .registry()
            .get(&object.object_class)
            .ok_or_else(|| AuthzError::UnknownObjectClass(object.object_class.clone()))?;
        if !object_type.allows_role(role) {
            return Err(AuthzError::InvalidRole {
                object: object.clone(),
                role: role.clone(),
            });
        }
        Ok(())
    }

    async fn insert_entry(
        &mut self,
        identity: &AclIdentity,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<AclEntry, AuthzError> {
        let entry = self
            .authorization
            .store()
            .create_entry(identity, object, role)
            .await?;
        audit::audit_entry_created(&entry);
        self.transaction_mut()?.add(entry.clone());
        Ok(entry)
    }

    /// Applies every propagation rule of the entry's class to the children
    /// the object graph reports.
    fn propagate_from<'s>(
        &'s mut self,
        entry: &'s AclEntry,
    ) -> BoxFuture<'s, Result<(), AuthzError>> {
        Box::pin(async move {
            let authorization = Arc::clone(&self.authorization);
            let graph = Arc::clone(&self.graph);
            let registry = authorization.registry();

            for rule in registry.propagation_rules(&entry.object_identity.object_class) {
                let Some(child_type) = registry.get(&rule.child_class) else {
                    continue;
                };
                let Some((role, kind)) = rule.child_grant(&entry.role, child_type) else {
                    continue;
                };
                let children = graph.children(&entry.object_identity, &rule.relation).await?;
                for child in children
                    .iter()
                    .filter(|child| child.object_class == rule.child_class)
                {
                    self.propagate_to_child(entry, child, &role, kind).await?;
                }
            }
            Ok(())
        })
    }

    /// Grants `role` on `child_object` to the parent entry's identity and
    /// records the dependency. Nothing propagates when the parent's role is
    /// not propagatable on its class.
    pub fn propagate_to_child<'s>(
        &'s mut self,
        parent: &'s AclEntry,
        child_object: &'s AclObjectIdentity,
        role: &'s Role,
        kind: DependencyKind,
    ) -> BoxFuture<'s, Result<Option<AclEntry>, AuthzError>> {
        Box::pin(async move {
            self.transaction_mut()?;
            let authorization = Arc::clone(&self.authorization);
            if !authorization
                .registry()
                .is_propagatable(&parent.object_identity.object_class, &parent.role)
            {
                return Ok(None);
            }
            self.validate_role(child_object, role)?;

            let child = match self.get_entry(&parent.identity, child_object, role).await? {
                Some(existing) => existing,
                None => {
                    let child = self
                        .insert_entry(&parent.identity, child_object, role)
                        .await?;
                    self.propagate_from(&child).await?;
                    child
                }
            };

            let store = authorization.store();
            if store.find_dependency(parent.id, child.id).await?.is_none() {
                let dependency = AclEntryDependency::new(parent.id, child.id, kind);
                store.create_dependency(&dependency).await?;
                audit::audit_dependency_created(&dependency);
            }
            Ok(Some(child))
        })
    }

    /// Copies the parent object's grants onto a newly attached child.
    pub async fn create_entries_for_child(
        &mut self,
        parent_object: &AclObjectIdentity,
        child_object: &AclObjectIdentity,
    ) -> Result<Vec<AclEntry>, AuthzError> {
        self.transaction_mut()?;
        let authorization = Arc::clone(&self.authorization);
        let child_type = authorization
            .registry()
            .get(&child_object.object_class)
            .ok_or_else(|| AuthzError::UnknownObjectClass(child_object.object_class.clone()))?;

        let mut created = Vec::new();
        for parent in self.entries(parent_object).await? {
            if !child_type.allows_role(&parent.role) {
                continue;
            }
            if let Some(child) = self
                .propagate_to_child(&parent, child_object, &parent.role, DependencyKind::Detach)
                .await?
            {
                created.push(child);
            }
        }
        Ok(created)
    }

    // --- Deletion ---

    /// Deletes the entry and, through its dependencies, the children it
    /// granted. Fails with `Referenced` when the entry is itself a child and
    /// `detach_children` is false.
    pub async fn delete_entry(
        &mut self,
        entry: &AclEntry,
        detach_children: bool,
    ) -> Result<DeleteOutcome, AuthzError> {
        self.transaction_mut()?;
        let mut outcome = DeleteOutcome::default();
        self.delete_recursive(entry, detach_children, &mut outcome)
            .await?;
        Ok(outcome)
    }

    fn delete_recursive<'s>(
        &'s mut self,
        entry: &'s AclEntry,
        detach_children: bool,
        outcome: &'s mut DeleteOutcome,
    ) -> BoxFuture<'s, Result<(), AuthzError>> {
        Box::pin(async move {
            let authorization = Arc::clone(&self.authorization);
            let store = authorization.store();

            let parents = store.list_dependencies_by_child(entry.id).await?;
            if !parents.is_empty() {
                if !detach_children {
                    return Err(AuthzError::Referenced { entry_id: entry.id });
                }
                for dependency in &parents {
                    store.delete_dependency(dependency).await?;
                }
            }

            let children = store.list_dependencies_by_parent(entry.id).await?;
            store.delete_entry(entry).await?;
            audit::audit_entry_deleted(entry);
            self.transaction_mut()?.remove(entry.clone());
            outcome.deleted.push(entry.clone());

            for dependency in children {
                if dependency.kind == DependencyKind::Detach && detach_children {
                    continue;
                }
                let Some(child) = store.get_entry(dependency.child_entry_id).await? else {
                    continue;
                };
                match self.delete_recursive(&child, false, outcome).await {
                    Ok(()) => {}
                    Err(AuthzError::Referenced { .. }) => {
                        audit::audit_child_retained(entry, &child);
                        outcome.retained.push(child);
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        })
    }

    /// Deletes every entry of `object`, detaching it from its parents.
    pub async fn delete_entries_for_object(
        &mut self,
        object: &AclObjectIdentity,
    ) -> Result<DeleteOutcome, AuthzError> {
        self.transaction_mut()?;
        let mut outcome = DeleteOutcome::default();
        for entry in self.entries(object).await? {
            if self.is_removed(entry.id) || outcome.is_deleted(entry.id) {
                continue;
            }
            let mut deleted = DeleteOutcome::default();
            self.delete_recursive(&entry, true, &mut deleted).await?;
            outcome.merge(deleted);
        }
        Ok(outcome)
    }

    /// Removes the dependencies from entries of `parent_object` to entries of
    /// `child_object`, deleting each child entry left without parents.
    pub async fn delete_entries_for_child(
        &mut self,
        parent_object: &AclObjectIdentity,
        child_object: &AclObjectIdentity,
    ) -> Result<DeleteOutcome, AuthzError> {
        self.transaction_mut()?;
        let authorization = Arc::clone(&self.authorization);
        let store = authorization.store();

        let mut outcome = DeleteOutcome::default();
        for dependency in store.list_dependencies_by_child_object(child_object).await? {
            let Some(parent) = self.entry(dependency.parent_entry_id).await? else {
                continue;
            };
            if parent.object_identity != *parent_object {
                continue;
            }
            store.delete_dependency(&dependency).await?;

            if !store
                .list_dependencies_by_child(dependency.child_entry_id)
                .await?
                .is_empty()
            {
                continue;
            }
            if let Some(child) = store.get_entry(dependency.child_entry_id).await? {
                self.delete_recursive(&child, false, &mut outcome).await?;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookingauthz_core::{ObjectClass, ObjectTypeRegistry, Permission};
    use bookingauthz_storage::InMemoryAclStore;

    use crate::authorization::AuthorizationSettings;
    use crate::graph::InMemoryObjectGraph;
    use crate::provider::{InMemoryIdentityProvider, UserData};

    type TestManager =
        AuthorizationManager<InMemoryAclStore, InMemoryIdentityProvider, InMemoryObjectGraph>;

    fn manager() -> (TestManager, Arc<InMemoryObjectGraph>) {
        let provider = InMemoryIdentityProvider::new();
        provider.add_user(UserData::new("1"));
        provider.add_user(UserData::new("2"));
        let authorization = Authorization::new(
            Arc::new(InMemoryAclStore::new()),
            Arc::new(provider),
            Arc::new(ObjectTypeRegistry::booking()),
            AuthorizationSettings::default(),
        )
        .unwrap();
        let graph = Arc::new(InMemoryObjectGraph::new());
        (
            AuthorizationManager::new(Arc::new(authorization), Arc::clone(&graph)),
            graph,
        )
    }

    fn resource(id: i64) -> AclObjectIdentity {
        AclObjectIdentity::new(ObjectClass::RESOURCE, id)
    }

    fn request(id: i64) -> AclObjectIdentity {
        AclObjectIdentity::new(ObjectClass::RESERVATION_REQUEST, id)
    }

    fn reservation(id: i64) -> AclObjectIdentity {
        AclObjectIdentity::new(ObjectClass::RESERVATION, id)
    }

    // --- Transactions ---

    #[tokio::test]
    async fn begin_twice_fails() {
        let (mut manager, _) = manager();

        manager.begin().unwrap();

        assert!(matches!(manager.begin(), Err(AuthzError::TransactionActive)));
    }

    #[tokio::test]
    async fn commit_and_rollback_require_transaction() {
        let (mut manager, _) = manager();

        assert!(matches!(manager.commit().await, Err(AuthzError::NoTransaction)));
        assert!(matches!(manager.rollback(), Err(AuthzError::NoTransaction)));
    }

    #[tokio::test]
    async fn mutations_require_transaction() {
        let (mut manager, _) = manager();

        let result = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await;

        assert!(matches!(result, Err(AuthzError::NoTransaction)));
        assert_eq!(manager.authorization().store().entry_count(), 0);
    }

    #[tokio::test]
    async fn uncommitted_entries_are_visible_only_to_the_transaction() {
        let (mut manager, _) = manager();
        let state = manager.authorization().user_state("1").await.unwrap();
        manager.begin().unwrap();

        let entry = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(manager.entries(&resource(1)).await.unwrap(), vec![entry.clone()]);
        assert!(!state.has_role(&resource(1), &Role::OWNER));

        manager.commit().await.unwrap();
        assert!(state.has_role(&resource(1), &Role::OWNER));
    }

    #[tokio::test]
    async fn rollback_discards_working_sets() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();
        manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap();

        manager.rollback().unwrap();

        assert!(!manager.is_transaction_active());
        let state = manager.authorization().user_state("1").await.unwrap();
        assert_eq!(state.entry_count(), 1);
        assert!(manager.authorization().cache().user_state("1").await.is_some());
    }

    // --- Creation ---

    #[tokio::test]
    async fn create_existing_entry_returns_it() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();

        let first = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap();
        let second = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(manager.authorization().store().entry_count(), 1);
    }

    #[tokio::test]
    async fn root_user_receives_no_entries() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();

        let entry = manager
            .create_entry(&AclIdentity::user("0"), &resource(1), &Role::OWNER)
            .await
            .unwrap();

        assert_eq!(entry, None);
        assert_eq!(manager.authorization().store().entry_count(), 0);
    }

    #[tokio::test]
    async fn disallowed_role_is_rejected_before_store_mutation() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();

        let result = manager
            .create_entry(&AclIdentity::user("1"), &reservation(1), &Role::RESERVATION)
            .await;

        assert!(matches!(result, Err(AuthzError::InvalidRole { .. })));
        assert_eq!(manager.authorization().store().entry_count(), 0);
    }

    #[tokio::test]
    async fn unknown_class_is_rejected() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();

        let result = manager
            .create_entry(
                &AclIdentity::user("1"),
                &AclObjectIdentity::new("ROOM", 1),
                &Role::OWNER,
            )
            .await;

        assert!(matches!(result, Err(AuthzError::UnknownObjectClass(_))));
    }

    #[tokio::test]
    async fn grant_propagates_through_the_graph() {
        let (mut manager, graph) = manager();
        graph.link(&request(1), "reservations", &reservation(2));
        manager.begin().unwrap();

        let parent = manager
            .create_entry(&AclIdentity::user("1"), &request(1), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();
        let child = manager
            .get_entry(&AclIdentity::user("1"), &reservation(2), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();

        let store = manager.authorization().store();
        let dependency = store.find_dependency(parent.id, child.id).await.unwrap().unwrap();
        assert_eq!(dependency.kind, DependencyKind::Detach);
    }

    #[tokio::test]
    async fn request_user_becomes_reader_on_reservations() {
        let (mut manager, graph) = manager();
        graph.link(&request(1), "reservations", &reservation(2));
        manager.begin().unwrap();

        manager
            .create_entry(
                &AclIdentity::user("1"),
                &request(1),
                &Role::RESERVATION_REQUEST_USER,
            )
            .await
            .unwrap();
        manager.commit().await.unwrap();

        let authorization = manager.authorization();
        assert!(
            authorization
                .has_user_permission("1", &reservation(2), &Permission::READ)
                .await
                .unwrap()
        );
        assert!(
            !authorization
                .has_user_permission("1", &reservation(2), &Permission::WRITE)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn non_propagatable_role_stays_on_parent() {
        let (mut manager, graph) = manager();
        let tag = AclObjectIdentity::new(ObjectClass::TAG, 1);
        graph.link(&tag, "tagged_resources", &resource(2));
        manager.begin().unwrap();

        manager
            .create_entry(&AclIdentity::user("1"), &tag, &Role::OWNER)
            .await
            .unwrap();
        manager
            .create_entry(&AclIdentity::user("1"), &tag, &Role::RESERVATION)
            .await
            .unwrap();

        let children = manager.entries(&resource(2)).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].role, Role::RESERVATION);
    }

    #[tokio::test]
    async fn attached_child_receives_parent_grants() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();
        manager
            .create_entry(&AclIdentity::user("1"), &request(1), &Role::OWNER)
            .await
            .unwrap();
        manager
            .create_entry(
                &AclIdentity::user("2"),
                &request(1),
                &Role::RESERVATION_REQUEST_USER,
            )
            .await
            .unwrap();

        let created = manager
            .create_entries_for_child(&request(1), &reservation(5))
            .await
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].role, Role::OWNER);
        assert_eq!(created[0].object_identity, reservation(5));
    }

    // --- Deletion ---

    #[tokio::test]
    async fn create_then_delete_in_one_transaction_cancels() {
        let (mut manager, _) = manager();
        let state = manager.authorization().user_state("1").await.unwrap();
        manager.begin().unwrap();

        let entry = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();
        manager.delete_entry(&entry, false).await.unwrap();
        manager.commit().await.unwrap();

        assert_eq!(state.entry_count(), 0);
        assert_eq!(manager.authorization().store().entry_count(), 0);
        assert!(manager.authorization().cache().acl_entry(entry.id).await.is_none());
    }

    #[tokio::test]
    async fn cancelled_entry_is_evicted_from_state_loaded_mid_transaction() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();

        let entry = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();
        let authorization = Arc::clone(&manager.authorization);
        authorization.user_state("1").await.unwrap();
        authorization.object_state(&resource(1)).await.unwrap();

        manager.delete_entry(&entry, false).await.unwrap();
        manager.commit().await.unwrap();

        assert_eq!(authorization.store().entry_count(), 0);
        assert!(
            !authorization
                .has_user_permission("1", &resource(1), &Permission::WRITE)
                .await
                .unwrap()
        );
        let object_state = authorization.object_state(&resource(1)).await.unwrap();
        assert_eq!(object_state.entry_count(), 0);
        assert!(authorization.cache().acl_entry(entry.id).await.is_none());
    }

    #[tokio::test]
    async fn deleted_entry_is_hidden_before_commit() {
        let (mut manager, _) = manager();
        manager.begin().unwrap();
        let entry = manager
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();
        manager.commit().await.unwrap();

        manager.begin().unwrap();
        manager.delete_entry(&entry, false).await.unwrap();

        assert_eq!(manager.entry(entry.id).await.unwrap(), None);
        assert!(manager.entries(&resource(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_entries_for_object_detaches_from_parents() {
        let (mut manager, graph) = manager();
        graph.link(&request(1), "reservations", &reservation(2));
        manager.begin().unwrap();
        let parent = manager
            .create_entry(&AclIdentity::user("1"), &request(1), &Role::OWNER)
            .await
            .unwrap()
            .unwrap();

        let outcome = manager
            .delete_entries_for_object(&reservation(2))
            .await
            .unwrap();

        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(manager.entries(&request(1)).await.unwrap(), vec![parent]);
        assert_eq!(manager.authorization().store().dependency_count(), 0);
    }

    #[tokio::test]
    async fn delete_entries_for_child_removes_only_that_parent_edge() {
        let (mut manager, graph) = manager();
        graph.link(&request(1), "reservations", &reservation(3));
        graph.link(&request(2), "reservations", &reservation(3));
        manager.begin().unwrap();
        for parent in [request(1), request(2)] {
            manager
                .create_entry(&AclIdentity::user("1"), &parent, &Role::OWNER)
                .await
                .unwrap();
        }
        assert_eq!(manager.authorization().store().dependency_count(), 2);

        let first = manager
            .delete_entries_for_child(&request(1), &reservation(3))
            .await
            .unwrap();
        assert!(first.deleted.is_empty());
        assert_eq!(manager.entries(&reservation(3)).await.unwrap().len(), 1);

        let second = manager
            .delete_entries_for_child(&request(2), &reservation(3))
            .await
            .unwrap();
        assert_eq!(second.deleted.len(), 1);
        assert!(manager.entries(&reservation(3)).await.unwrap().is_empty());
    }
}
