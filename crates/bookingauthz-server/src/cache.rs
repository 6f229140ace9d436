use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use bookingauthz_core::state::{AclObjectState, AclUserState};
use bookingauthz_core::{AclEntry, AclEntryId, AclObjectIdentity, UserIdSet};

use crate::error::AuthzError;
use crate::provider::{Group, UserAuthorizationData, UserData};

/// Expiration per partition group. `Duration::ZERO` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheExpiration {
    pub user_id: Duration,
    pub user_information: Duration,
    pub acl: Duration,
    pub group: Duration,
}

impl Default for CacheExpiration {
    fn default() -> Self {
        Self {
            user_id: Duration::from_secs(300),
            user_information: Duration::from_secs(600),
            acl: Duration::from_secs(300),
            group: Duration::from_secs(600),
        }
    }
}

fn partition<K, V>(expiration: Duration) -> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let mut builder = Cache::builder();
    if !expiration.is_zero() {
        builder = builder.time_to_live(expiration);
    }
    builder.build()
}

fn shared(err: Arc<AuthzError>) -> AuthzError {
    (*err).clone()
}

/// All caches fronting the ACL store and the identity provider.
///
/// `Option` values record negative lookups so a missing user is not fetched
/// again until the entry expires.
pub struct AuthorizationCache {
    user_id_by_access_token: Cache<String, String>,
    user_id_by_principal_name: Cache<String, Option<String>>,
    user_data_by_user_id: Cache<String, Option<Arc<UserData>>>,
    user_authorization_data_by_access_token: Cache<String, Option<UserAuthorizationData>>,
    acl_entry_by_id: Cache<AclEntryId, AclEntry>,
    acl_user_state_by_user_id: Cache<String, Arc<AclUserState>>,
    acl_object_state_by_identity: Cache<AclObjectIdentity, Arc<AclObjectState>>,
    group_by_group_id: Cache<String, Option<Arc<Group>>>,
    group_id_by_name: Cache<String, String>,
    user_ids_by_group_id: Cache<String, UserIdSet>,
}

impl AuthorizationCache {
    pub fn new(expiration: CacheExpiration) -> Self {
        Self {
            user_id_by_access_token: partition(expiration.user_id),
            user_id_by_principal_name: partition(expiration.user_id),
            user_data_by_user_id: partition(expiration.user_information),
            user_authorization_data_by_access_token: partition(expiration.user_information),
            acl_entry_by_id: partition(expiration.acl),
            acl_user_state_by_user_id: partition(expiration.acl),
            acl_object_state_by_identity: partition(expiration.acl),
            group_by_group_id: partition(expiration.group),
            group_id_by_name: partition(expiration.group),
            user_ids_by_group_id: partition(expiration.group),
        }
    }

    pub fn clear(&self) {
        self.user_id_by_access_token.invalidate_all();
        self.user_id_by_principal_name.invalidate_all();
        self.user_data_by_user_id.invalidate_all();
        self.user_authorization_data_by_access_token.invalidate_all();
        self.acl_entry_by_id.invalidate_all();
        self.acl_user_state_by_user_id.invalidate_all();
        self.acl_object_state_by_identity.invalidate_all();
        self.group_by_group_id.invalidate_all();
        self.group_id_by_name.invalidate_all();
        self.user_ids_by_group_id.invalidate_all();
        tracing::debug!(target: "acl", "authorization cache cleared");
    }

    // --- User ids ---

    pub async fn user_id_by_access_token(&self, access_token: &str) -> Option<String> {
        self.user_id_by_access_token.get(access_token).await
    }

    pub async fn put_user_id_by_access_token(&self, access_token: &str, user_id: &str) {
        self.user_id_by_access_token
            .insert(access_token.to_string(), user_id.to_string())
            .await;
    }

    pub async fn user_id_by_principal_name<F>(
        &self,
        principal_name: &str,
        init: F,
    ) -> Result<Option<String>, AuthzError>
    where
        F: Future<Output = Result<Option<String>, AuthzError>>,
    {
        self.user_id_by_principal_name
            .try_get_with(principal_name.to_string(), init)
            .await
            .map_err(shared)
    }

    // --- User information ---

    pub async fn user_data<F>(
        &self,
        user_id: &str,
        init: F,
    ) -> Result<Option<Arc<UserData>>, AuthzError>
    where
        F: Future<Output = Result<Option<Arc<UserData>>, AuthzError>>,
    {
        self.user_data_by_user_id
            .try_get_with(user_id.to_string(), init)
            .await
            .map_err(shared)
    }

    pub async fn put_user_data(&self, user_data: Arc<UserData>) {
        self.user_data_by_user_id
            .insert(user_data.user_id.clone(), Some(user_data))
            .await;
    }

    pub async fn user_authorization_data<F>(
        &self,
        access_token: &str,
        init: F,
    ) -> Result<Option<UserAuthorizationData>, AuthzError>
    where
        F: Future<Output = Result<Option<UserAuthorizationData>, AuthzError>>,
    {
        self.user_authorization_data_by_access_token
            .try_get_with(access_token.to_string(), init)
            .await
            .map_err(shared)
    }

    pub async fn put_user_authorization_data(
        &self,
        access_token: &str,
        authorization: UserAuthorizationData,
    ) {
        self.user_authorization_data_by_access_token
            .insert(access_token.to_string(), Some(authorization))
            .await;
    }

    // --- ACL ---

    pub async fn acl_entry(&self, entry_id: AclEntryId) -> Option<AclEntry> {
        self.acl_entry_by_id.get(&entry_id).await
    }

    pub async fn put_acl_entry(&self, entry: &AclEntry) {
        self.acl_entry_by_id.insert(entry.id, entry.clone()).await;
    }

    pub async fn remove_acl_entry(&self, entry_id: AclEntryId) {
        self.acl_entry_by_id.invalidate(&entry_id).await;
    }

    pub async fn user_state(&self, user_id: &str) -> Option<Arc<AclUserState>> {
        self.acl_user_state_by_user_id.get(user_id).await
    }

    pub async fn user_state_or_fetch<F>(
        &self,
        user_id: &str,
        init: F,
    ) -> Result<Arc<AclUserState>, AuthzError>
    where
        F: Future<Output = Result<Arc<AclUserState>, AuthzError>>,
    {
        self.acl_user_state_by_user_id
            .try_get_with(user_id.to_string(), init)
            .await
            .map_err(shared)
    }

    pub async fn remove_user_state(&self, user_id: &str) {
        self.acl_user_state_by_user_id.invalidate(user_id).await;
    }

    /// Every user state currently cached.
    pub fn user_states(&self) -> Vec<Arc<AclUserState>> {
        self.acl_user_state_by_user_id
            .iter()
            .map(|(_, state)| state)
            .collect()
    }

    pub async fn object_state(&self, object: &AclObjectIdentity) -> Option<Arc<AclObjectState>> {
        self.acl_object_state_by_identity.get(object).await
    }

    pub async fn object_state_or_fetch<F>(
        &self,
        object: &AclObjectIdentity,
        init: F,
    ) -> Result<Arc<AclObjectState>, AuthzError>
    where
        F: Future<Output = Result<Arc<AclObjectState>, AuthzError>>,
    {
        self.acl_object_state_by_identity
            .try_get_with(object.clone(), init)
            .await
            .map_err(shared)
    }

    pub async fn remove_object_state(&self, object: &AclObjectIdentity) {
        self.acl_object_state_by_identity.invalidate(object).await;
    }

    // --- Groups ---

    pub async fn group<F>(&self, group_id: &str, init: F) -> Result<Option<Arc<Group>>, AuthzError>
    where
        F: Future<Output = Result<Option<Arc<Group>>, AuthzError>>,
    {
        self.group_by_group_id
            .try_get_with(group_id.to_string(), init)
            .await
            .map_err(shared)
    }

    pub async fn group_id_by_name(&self, name: &str) -> Option<String> {
        self.group_id_by_name.get(name).await
    }

    pub async fn put_group_id_by_name(&self, name: &str, group_id: &str) {
        self.group_id_by_name
            .insert(name.to_string(), group_id.to_string())
            .await;
    }

    pub async fn group_user_ids<F>(&self, group_id: &str, init: F) -> Result<UserIdSet, AuthzError>
    where
        F: Future<Output = Result<UserIdSet, AuthzError>>,
    {
        self.user_ids_by_group_id
            .try_get_with(group_id.to_string(), init)
            .await
            .map_err(shared)
    }

    pub async fn cached_group_user_ids(&self, group_id: &str) -> Option<UserIdSet> {
        self.user_ids_by_group_id.get(group_id).await
    }

    pub async fn put_group_user_ids(&self, group_id: &str, user_ids: UserIdSet) {
        self.user_ids_by_group_id
            .insert(group_id.to_string(), user_ids)
            .await;
    }

    /// Stores the modified group and drops name mappings and the member list
    /// that pointed at it, since its name may have changed.
    pub async fn put_group(&self, group: Arc<Group>) {
        self.scrub_group_name(&group.id).await;
        self.user_ids_by_group_id.invalidate(&group.id).await;
        self.group_by_group_id
            .insert(group.id.clone(), Some(group))
            .await;
    }

    pub async fn remove_group(&self, group_id: &str) {
        self.group_by_group_id.invalidate(group_id).await;
        self.user_ids_by_group_id.invalidate(group_id).await;
        self.scrub_group_name(group_id).await;
    }

    async fn scrub_group_name(&self, group_id: &str) {
        let names: Vec<Arc<String>> = self
            .group_id_by_name
            .iter()
            .filter(|(_, id)| id == group_id)
            .map(|(name, _)| name)
            .collect();
        for name in names {
            self.group_id_by_name.invalidate(name.as_str()).await;
        }
    }
}
