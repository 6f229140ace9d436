use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Mutex;

use bookingauthz_core::acl::{EVERYONE_GROUP_ID, EVERYONE_GROUP_NAME, ROOT_USER_ID};
use bookingauthz_core::expression::AuthorizationExpression;
use bookingauthz_core::state::{AclObjectState, AclUserState};
use bookingauthz_core::{
    AclEntry, AclIdentity, AclIdentityType, AclObjectIdentity, ObjectClass, ObjectTypeRegistry,
    Permission, Role, UserIdSet,
};
use bookingauthz_storage::AclStore;

use crate::audit;
use crate::cache::{AuthorizationCache, CacheExpiration};
use crate::error::AuthzError;
use crate::provider::{
    Group, GroupType, IdentityProvider, ProviderError, SecurityToken, UserAuthorizationData,
    UserData,
};

#[derive(Debug, Clone, Default)]
pub struct AuthorizationSettings {
    pub expiration: CacheExpiration,
    pub administrator: Option<String>,
    pub operator: Option<String>,
    pub reservation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdministrationMode {
    Administrator,
    Operator,
}

impl AdministrationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Operator => "operator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPermission {
    Administration,
    Operator,
    Reservation,
}

/// Object ids a principal may access within one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectIdSet {
    All,
    Ids(HashSet<i64>),
}

impl ObjectIdSet {
    pub fn contains(&self, object_id: i64) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&object_id),
        }
    }
}

/// Results of evaluating the system expressions for the root user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressionCheck {
    pub administrator: bool,
    pub operator: bool,
    pub reservation: bool,
}

pub struct Authorization<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    registry: Arc<ObjectTypeRegistry>,
    cache: AuthorizationCache,
    administrator_expression: AuthorizationExpression,
    operator_expression: AuthorizationExpression,
    reservation_expression: AuthorizationExpression,
    administration_modes: RwLock<HashMap<String, AdministrationMode>>,
    commit_lock: Mutex<()>,
    removals: AtomicU64,
    root_user: Arc<UserData>,
}

impl<S: AclStore, P: IdentityProvider> Authorization<S, P> {
    pub fn new(
        store: Arc<S>,
        provider: Arc<P>,
        registry: Arc<ObjectTypeRegistry>,
        settings: AuthorizationSettings,
    ) -> Result<Self, AuthzError> {
        Ok(Self {
            store,
            provider,
            registry,
            cache: AuthorizationCache::new(settings.expiration),
            administrator_expression: AuthorizationExpression::compile(
                settings.administrator.as_deref(),
            )?,
            operator_expression: AuthorizationExpression::compile(settings.operator.as_deref())?,
            reservation_expression: AuthorizationExpression::compile(
                settings.reservation.as_deref(),
            )?,
            administration_modes: RwLock::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            removals: AtomicU64::new(0),
            root_user: Arc::new(UserData::root()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn registry(&self) -> &ObjectTypeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &AuthorizationCache {
        &self.cache
    }

    pub(crate) fn commit_lock(&self) -> &Mutex<()> {
        &self.commit_lock
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // --- Users ---

    pub async fn user_id(&self, token: &SecurityToken) -> Result<String, AuthzError> {
        if let Some(user_id) = self.cache.user_id_by_access_token(token.access_token()).await {
            return Ok(user_id);
        }
        Ok(self.user_information(token).await?.user_id.clone())
    }

    pub async fn user_information(
        &self,
        token: &SecurityToken,
    ) -> Result<Arc<UserData>, AuthzError> {
        let access_token = token.access_token();
        if let Some(user_id) = self.cache.user_id_by_access_token(access_token).await {
            return self.user_information_by_id(&user_id).await;
        }

        let user = Arc::new(self.provider.user_data_by_token(access_token).await?);
        self.cache
            .put_user_id_by_access_token(access_token, &user.user_id)
            .await;
        self.cache
            .put_user_authorization_data(
                access_token,
                user.authorization.clone().unwrap_or_default(),
            )
            .await;
        self.cache.put_user_data(Arc::clone(&user)).await;
        Ok(user)
    }

    pub async fn user_information_by_id(&self, user_id: &str) -> Result<Arc<UserData>, AuthzError> {
        if user_id == ROOT_USER_ID {
            return Ok(Arc::clone(&self.root_user));
        }
        let user = self
            .cache
            .user_data(user_id, async {
                match self.provider.user_data_by_id(user_id).await {
                    Ok(user) => Ok(Some(Arc::new(user))),
                    Err(ProviderError::UserNotFound(_)) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            })
            .await?;
        user.ok_or_else(|| AuthzError::UserNotFound(user_id.to_string()))
    }

    pub async fn has_user(&self, user_id: &str) -> Result<bool, AuthzError> {
        match self.user_information_by_id(user_id).await {
            Ok(_) => Ok(true),
            Err(AuthzError::UserNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn user_information_by_principal_name(
        &self,
        principal_name: &str,
    ) -> Result<Arc<UserData>, AuthzError> {
        let user_id = self
            .cache
            .user_id_by_principal_name(principal_name, async {
                match self.provider.user_id_by_principal_name(principal_name).await {
                    Ok(user_id) => Ok(Some(user_id)),
                    Err(ProviderError::UserNotFound(_)) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            })
            .await?
            .ok_or_else(|| AuthzError::UserNotFound(principal_name.to_string()))?;
        self.user_information_by_id(&user_id).await
    }

    /// Level of assurance and provider of the caller; `LOA_NONE` when the
    /// provider reports nothing.
    pub async fn user_authorization_data(
        &self,
        token: &SecurityToken,
    ) -> Result<UserAuthorizationData, AuthzError> {
        let access_token = token.access_token();
        let data = self
            .cache
            .user_authorization_data(access_token, async {
                match self.provider.user_data_by_token(access_token).await {
                    Ok(user) => Ok(Some(user.authorization.unwrap_or_default())),
                    Err(ProviderError::UserNotFound(_) | ProviderError::InvalidToken) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            })
            .await?;
        Ok(data.unwrap_or_default())
    }

    // --- Groups ---

    pub async fn group(&self, group_id: &str) -> Result<Arc<Group>, AuthzError> {
        if group_id == EVERYONE_GROUP_ID {
            return Ok(Arc::new(Group::everyone()));
        }
        let group = self
            .cache
            .group(group_id, async {
                match self.provider.group(group_id).await {
                    Ok(group) => Ok(Some(Arc::new(group))),
                    Err(ProviderError::GroupNotFound(_)) => Ok(None),
                    Err(err) => Err(err.into()),
                }
            })
            .await?;
        group.ok_or_else(|| AuthzError::GroupNotFound(group_id.to_string()))
    }

    pub async fn group_id_by_name(&self, name: &str) -> Result<String, AuthzError> {
        if name == EVERYONE_GROUP_NAME {
            return Ok(EVERYONE_GROUP_ID.to_string());
        }
        if let Some(group_id) = self.cache.group_id_by_name(name).await {
            return Ok(group_id);
        }
        let group_id = self.provider.group_id_by_name(name).await?;
        self.cache.put_group_id_by_name(name, &group_id).await;
        Ok(group_id)
    }

    pub async fn group_user_ids(&self, group_id: &str) -> Result<UserIdSet, AuthzError> {
        if group_id == EVERYONE_GROUP_ID {
            return Ok(UserIdSet::Everyone);
        }
        self.cache
            .group_user_ids(group_id, async {
                let members = self.provider.group_member_ids(group_id).await?;
                Ok(UserIdSet::from(members))
            })
            .await
    }

    /// Users an identity stands for.
    pub async fn user_ids(&self, identity: &AclIdentity) -> Result<UserIdSet, AuthzError> {
        match identity.kind {
            AclIdentityType::User => Ok(UserIdSet::single(identity.principal_id.clone())),
            AclIdentityType::Group => self.group_user_ids(&identity.principal_id).await,
        }
    }

    /// Groups from the provider, with the built-in everyone group first.
    pub async fn list_groups(
        &self,
        group_ids: Option<&HashSet<String>>,
        kinds: Option<&HashSet<GroupType>>,
    ) -> Result<Vec<Group>, AuthzError> {
        let mut groups = self.provider.list_groups(group_ids, kinds).await?;
        groups.insert(0, Group::everyone());
        Ok(groups)
    }

    pub async fn create_group(&self, group: Group) -> Result<String, AuthzError> {
        if group.name.to_lowercase() == EVERYONE_GROUP_NAME {
            return Err(AuthzError::GroupAlreadyExists(group.name));
        }
        let group_id = self.provider.create_group(&group).await?;
        let name = group.name.clone();
        self.cache
            .put_group(Arc::new(Group {
                id: group_id.clone(),
                ..group
            }))
            .await;
        self.cache.put_group_id_by_name(&name, &group_id).await;
        tracing::debug!(target: "acl", group_id = %group_id, name = %name, "group created");
        Ok(group_id)
    }

    pub async fn modify_group(&self, group: Group) -> Result<(), AuthzError> {
        if group.is_everyone() {
            return Err(AuthzError::EveryoneGroupImmutable);
        }
        self.provider.modify_group(&group).await?;
        self.cache.put_group(Arc::new(group)).await;
        Ok(())
    }

    pub async fn delete_group(&self, group_id: &str) -> Result<(), AuthzError> {
        if group_id == EVERYONE_GROUP_ID {
            return Err(AuthzError::EveryoneGroupImmutable);
        }
        let members = self.group_user_ids(group_id).await?;
        self.provider.delete_group(group_id).await?;
        self.cache.remove_group(group_id).await;
        for user_id in members.user_ids().into_iter().flatten() {
            self.cache.remove_user_state(user_id).await;
        }
        Ok(())
    }

    pub async fn add_group_user(&self, group_id: &str, user_id: &str) -> Result<(), AuthzError> {
        if group_id == EVERYONE_GROUP_ID {
            return Err(AuthzError::EveryoneGroupImmutable);
        }
        self.provider.add_group_user(group_id, user_id).await?;
        if let Some(mut members) = self.cache.cached_group_user_ids(group_id).await {
            members.insert(user_id);
            self.cache.put_group_user_ids(group_id, members).await;
        }
        self.cache.remove_user_state(user_id).await;
        Ok(())
    }

    pub async fn remove_group_user(&self, group_id: &str, user_id: &str) -> Result<(), AuthzError> {
        if group_id == EVERYONE_GROUP_ID {
            return Err(AuthzError::EveryoneGroupImmutable);
        }
        self.provider.remove_group_user(group_id, user_id).await?;
        if let Some(mut members) = self.cache.cached_group_user_ids(group_id).await {
            members.remove(user_id);
            self.cache.put_group_user_ids(group_id, members).await;
        }
        self.cache.remove_user_state(user_id).await;
        Ok(())
    }

    // --- System permissions ---

    pub fn administration_mode(&self, token: &SecurityToken) -> Option<AdministrationMode> {
        self.administration_modes
            .read()
            .get(token.access_token())
            .copied()
    }

    pub fn is_administrator(&self, token: &SecurityToken) -> bool {
        self.administration_mode(token) == Some(AdministrationMode::Administrator)
    }

    /// Administrators are operators too.
    pub fn is_operator(&self, token: &SecurityToken) -> bool {
        self.administration_mode(token).is_some()
    }

    /// Enables the strongest mode the caller's attributes grant, or disables
    /// administration mode.
    pub async fn update_administration_mode(
        &self,
        token: &SecurityToken,
        enabled: bool,
    ) -> Result<Option<AdministrationMode>, AuthzError> {
        let mode = if !enabled {
            None
        } else if self.evaluate(&self.administrator_expression, token).await? {
            Some(AdministrationMode::Administrator)
        } else if self.evaluate(&self.operator_expression, token).await? {
            Some(AdministrationMode::Operator)
        } else {
            None
        };

        {
            let mut modes = self.administration_modes.write();
            match mode {
                Some(mode) => modes.insert(token.access_token().to_string(), mode),
                None => modes.remove(token.access_token()),
            };
        }
        let user_id = self.user_id(token).await?;
        audit::audit_administration_mode(&user_id, mode.map_or("none", AdministrationMode::as_str));
        Ok(mode)
    }

    pub async fn has_system_permission(
        &self,
        token: &SecurityToken,
        permission: SystemPermission,
    ) -> Result<bool, AuthzError> {
        if self.is_administrator(token) {
            return Ok(true);
        }
        if self.user_id(token).await? == ROOT_USER_ID {
            return Ok(true);
        }
        match permission {
            SystemPermission::Administration => Ok(self
                .evaluate(&self.administrator_expression, token)
                .await?
                || self.evaluate(&self.operator_expression, token).await?),
            SystemPermission::Operator => Ok(self.is_operator(token)),
            SystemPermission::Reservation => {
                self.evaluate(&self.reservation_expression, token).await
            }
        }
    }

    async fn evaluate(
        &self,
        expression: &AuthorizationExpression,
        token: &SecurityToken,
    ) -> Result<bool, AuthzError> {
        if expression.is_constant_false() {
            return Ok(false);
        }
        let user = self.user_information(token).await?;
        let authorization = self.user_authorization_data(token).await?;
        self.evaluate_for(expression, &user, &authorization).await
    }

    async fn evaluate_for(
        &self,
        expression: &AuthorizationExpression,
        user: &UserData,
        authorization: &UserAuthorizationData,
    ) -> Result<bool, AuthzError> {
        let mut groups = HashMap::new();
        for name in expression.group_names() {
            let members = match self.group_id_by_name(&name).await {
                Ok(group_id) => self.group_user_ids(&group_id).await?,
                Err(AuthzError::GroupNotFound(_)) => {
                    tracing::warn!(
                        target: "acl",
                        group = %name,
                        "expression references unknown group"
                    );
                    UserIdSet::new()
                }
                Err(err) => return Err(err),
            };
            groups.insert(name, members);
        }
        Ok(expression.evaluate(&user.to_attributes(authorization), &groups)?)
    }

    /// Evaluates the system expressions for the root user.
    pub async fn check_expressions(&self) -> Result<ExpressionCheck, AuthzError> {
        let root = Arc::clone(&self.root_user);
        let authorization = UserAuthorizationData::default();
        Ok(ExpressionCheck {
            administrator: self
                .evaluate_for(&self.administrator_expression, &root, &authorization)
                .await?,
            operator: self
                .evaluate_for(&self.operator_expression, &root, &authorization)
                .await?,
            reservation: self
                .evaluate_for(&self.reservation_expression, &root, &authorization)
                .await?,
        })
    }

    // --- Object permissions ---

    pub async fn has_role(
        &self,
        token: &SecurityToken,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<bool, AuthzError> {
        if self.is_administrator(token) || (*role == Role::READER && self.is_operator(token)) {
            return Ok(true);
        }
        let user_id = self.user_id(token).await?;
        self.has_user_role(&user_id, object, role).await
    }

    pub async fn has_user_role(
        &self,
        user_id: &str,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<bool, AuthzError> {
        if user_id == ROOT_USER_ID {
            return Ok(true);
        }
        Ok(self.user_state(user_id).await?.has_role(object, role))
    }

    pub async fn has_permission(
        &self,
        token: &SecurityToken,
        object: &AclObjectIdentity,
        permission: &Permission,
    ) -> Result<bool, AuthzError> {
        if self.is_administrator(token)
            || (*permission == Permission::READ && self.is_operator(token))
        {
            return Ok(true);
        }
        let user_id = self.user_id(token).await?;
        self.has_user_permission(&user_id, object, permission).await
    }

    pub async fn has_user_permission(
        &self,
        user_id: &str,
        object: &AclObjectIdentity,
        permission: &Permission,
    ) -> Result<bool, AuthzError> {
        if user_id == ROOT_USER_ID {
            return Ok(true);
        }
        Ok(self
            .user_state(user_id)
            .await?
            .has_permission(object, permission))
    }

    pub async fn object_permissions(
        &self,
        token: &SecurityToken,
        object: &AclObjectIdentity,
    ) -> Result<BTreeSet<Permission>, AuthzError> {
        if self.is_administrator(token) {
            return Ok(self.registry.permissions(&object.object_class));
        }
        let user_id = self.user_id(token).await?;
        if user_id == ROOT_USER_ID {
            return Ok(self.registry.permissions(&object.object_class));
        }
        let mut permissions: BTreeSet<Permission> = self
            .user_state(&user_id)
            .await?
            .permissions(object)
            .into_iter()
            .collect();
        if self.is_operator(token) {
            permissions.insert(Permission::READ);
        }
        Ok(permissions)
    }

    pub async fn objects_with_role(
        &self,
        token: &SecurityToken,
        class: &ObjectClass,
        role: &Role,
    ) -> Result<ObjectIdSet, AuthzError> {
        if self.is_administrator(token) || (*role == Role::READER && self.is_operator(token)) {
            return Ok(ObjectIdSet::All);
        }
        let user_id = self.user_id(token).await?;
        if user_id == ROOT_USER_ID {
            return Ok(ObjectIdSet::All);
        }
        let state = self.user_state(&user_id).await?;
        Ok(ObjectIdSet::Ids(state.objects_with_role(class, role)))
    }

    pub async fn objects_with_permission(
        &self,
        token: &SecurityToken,
        class: &ObjectClass,
        permission: &Permission,
    ) -> Result<ObjectIdSet, AuthzError> {
        if self.is_administrator(token)
            || (*permission == Permission::READ && self.is_operator(token))
        {
            return Ok(ObjectIdSet::All);
        }
        let user_id = self.user_id(token).await?;
        if user_id == ROOT_USER_ID {
            return Ok(ObjectIdSet::All);
        }
        let state = self.user_state(&user_id).await?;
        Ok(ObjectIdSet::Ids(state.objects_with_permission(class, permission)))
    }

    pub async fn user_ids_with_role(
        &self,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<UserIdSet, AuthzError> {
        Ok(self.object_state(object).await?.user_ids_with_role(role))
    }

    /// Users holding `role` on `object`; empty when the role is granted to
    /// everyone, since everyone cannot be enumerated.
    pub async fn users_with_role(
        &self,
        object: &AclObjectIdentity,
        role: &Role,
    ) -> Result<Vec<Arc<UserData>>, AuthzError> {
        let user_ids = self.user_ids_with_role(object, role).await?;
        let mut users = Vec::new();
        for user_id in user_ids.user_ids().into_iter().flatten() {
            match self.user_information_by_id(user_id).await {
                Ok(user) => users.push(user),
                Err(AuthzError::UserNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(users)
    }

    // --- Projections ---

    /// Cached projection for `user_id`, loaded from the store on a miss.
    /// A load that overlaps a committed removal may have read the store
    /// before the deletion, so it is dropped and loaded again.
    pub async fn user_state(&self, user_id: &str) -> Result<Arc<AclUserState>, AuthzError> {
        loop {
            let removals = self.removals.load(Ordering::Acquire);
            let mut loaded = false;
            let state = self
                .cache
                .user_state_or_fetch(user_id, async {
                    loaded = true;
                    self.fetch_user_state(user_id).await
                })
                .await?;
            if !loaded || self.removals.load(Ordering::Acquire) == removals {
                return Ok(state);
            }
            self.cache.remove_user_state(user_id).await;
        }
    }

    async fn fetch_user_state(&self, user_id: &str) -> Result<Arc<AclUserState>, AuthzError> {
        let mut identities = HashSet::from([AclIdentity::user(user_id), AclIdentity::everyone()]);
        match self.provider.user_group_ids(user_id).await {
            Ok(group_ids) => identities.extend(group_ids.into_iter().map(AclIdentity::group)),
            Err(ProviderError::UserNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let entries = self.store.list_entries_by_identities(&identities).await?;
        let state = AclUserState::new(Arc::clone(&self.registry));
        for entry in &entries {
            state.add_entry(entry);
            self.cache.put_acl_entry(entry).await;
        }
        tracing::debug!(target: "acl", user_id, entries = entries.len(), "user ACL state fetched");
        Ok(Arc::new(state))
    }

    pub async fn object_state(
        &self,
        object: &AclObjectIdentity,
    ) -> Result<Arc<AclObjectState>, AuthzError> {
        loop {
            let removals = self.removals.load(Ordering::Acquire);
            let mut loaded = false;
            let state = self
                .cache
                .object_state_or_fetch(object, async {
                    loaded = true;
                    self.fetch_object_state(object).await
                })
                .await?;
            if !loaded || self.removals.load(Ordering::Acquire) == removals {
                return Ok(state);
            }
            self.cache.remove_object_state(object).await;
        }
    }

    async fn fetch_object_state(
        &self,
        object: &AclObjectIdentity,
    ) -> Result<Arc<AclObjectState>, AuthzError> {
        let entries = self.store.list_entries_by_object(object).await?;
        let state = AclObjectState::new();
        for entry in &entries {
            let user_ids = self.resolve_members(&entry.identity).await?;
            state.add_entry(entry, user_ids);
            self.cache.put_acl_entry(entry).await;
        }
        tracing::debug!(
            target: "acl",
            object = %object,
            entries = entries.len(),
            "object ACL state fetched"
        );
        Ok(Arc::new(state))
    }

    /// Like `user_ids`, but a group that no longer exists has no members.
    async fn resolve_members(&self, identity: &AclIdentity) -> Result<UserIdSet, AuthzError> {
        match self.user_ids(identity).await {
            Err(AuthzError::GroupNotFound(group_id)) => {
                tracing::warn!(
                    target: "acl",
                    group_id = %group_id,
                    "ACL entry references unknown group"
                );
                Ok(UserIdSet::new())
            }
            result => result,
        }
    }

    /// Applies a committed entry to the entry cache and every projection it
    /// affects. Projections not yet cached are fetched.
    pub(crate) async fn add_entry_to_cache(&self, entry: &AclEntry) -> Result<(), AuthzError> {
        self.cache.put_acl_entry(entry).await;

        let members = self.resolve_members(&entry.identity).await?;
        match &members {
            UserIdSet::Everyone => {
                for state in self.cache.user_states() {
                    state.add_entry(entry);
                }
            }
            UserIdSet::Users(user_ids) => {
                for user_id in user_ids.iter().filter(|id| id.as_str() != ROOT_USER_ID) {
                    self.user_state(user_id).await?.add_entry(entry);
                }
            }
        }

        match self.cache.object_state(&entry.object_identity).await {
            Some(state) => {
                state.add_entry(entry, members);
            }
            None => {
                self.object_state(&entry.object_identity).await?;
            }
        }
        Ok(())
    }

    /// Removes a committed deletion from the entry cache and every cached
    /// projection.
    pub(crate) async fn remove_entry_from_cache(&self, entry: &AclEntry) -> Result<(), AuthzError> {
        self.removals.fetch_add(1, Ordering::AcqRel);
        self.cache.remove_acl_entry(entry.id).await;

        let members = match self.user_ids(&entry.identity).await {
            Err(AuthzError::GroupNotFound(_)) => UserIdSet::Everyone,
            result => result?,
        };
        match &members {
            UserIdSet::Everyone => {
                for state in self.cache.user_states() {
                    state.remove_entry(entry);
                }
            }
            UserIdSet::Users(user_ids) => {
                for user_id in user_ids {
                    if let Some(state) = self.cache.user_state(user_id).await {
                        state.remove_entry(entry);
                    }
                }
            }
        }

        if let Some(state) = self.cache.object_state(&entry.object_identity).await {
            state.remove_entry(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookingauthz_storage::InMemoryAclStore;

    use crate::provider::InMemoryIdentityProvider;

    type TestAuthorization = Authorization<InMemoryAclStore, InMemoryIdentityProvider>;

    fn provider() -> InMemoryIdentityProvider {
        let provider = InMemoryIdentityProvider::new();
        provider.add_user(UserData {
            organization: Some("CESNET".to_string()),
            authorization: Some(UserAuthorizationData {
                provider: Some("idp".to_string()),
                loa: 2,
            }),
            principal_names: vec!["admin@cesnet.cz".to_string()],
            ..UserData::new("1")
        });
        provider.add_user(UserData::new("2"));
        provider.add_user(UserData::new("3"));
        provider.add_token("admin-token", "1");
        provider.add_token("operator-token", "2");
        provider.add_token("user-token", "3");
        provider.add_group(Group::new("20", "operators"), &["2"]);
        provider
    }

    fn authorization_with(
        store: InMemoryAclStore,
    ) -> (TestAuthorization, Arc<InMemoryIdentityProvider>) {
        let provider = Arc::new(provider());
        let settings = AuthorizationSettings {
            expiration: CacheExpiration::default(),
            administrator: Some("organization == 'CESNET' && loa >= 2".to_string()),
            operator: Some("id in group('operators')".to_string()),
            reservation: Some("loa >= 2 || id in group('operators')".to_string()),
        };
        let authorization = Authorization::new(
            Arc::new(store),
            Arc::clone(&provider),
            Arc::new(ObjectTypeRegistry::booking()),
            settings,
        )
        .unwrap();
        (authorization, provider)
    }

    fn authorization() -> (TestAuthorization, Arc<InMemoryIdentityProvider>) {
        authorization_with(InMemoryAclStore::new())
    }

    fn resource(id: i64) -> AclObjectIdentity {
        AclObjectIdentity::new(ObjectClass::RESOURCE, id)
    }

    // --- Construction ---

    #[test]
    fn invalid_expression_is_rejected_at_construction() {
        let result = TestAuthorization::new(
            Arc::new(InMemoryAclStore::new()),
            Arc::new(InMemoryIdentityProvider::new()),
            Arc::new(ObjectTypeRegistry::booking()),
            AuthorizationSettings {
                administrator: Some("id ==".to_string()),
                ..AuthorizationSettings::default()
            },
        );

        assert!(matches!(result, Err(AuthzError::Expression(_))));
    }

    // --- Users ---

    #[tokio::test]
    async fn user_information_is_cached_by_token() {
        let (authorization, provider) = authorization();
        let token = SecurityToken::new("user-token");

        let first = authorization.user_information(&token).await.unwrap();
        let calls = provider.lookup_count();
        let second = authorization.user_information(&token).await.unwrap();
        let user_id = authorization.user_id(&token).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(user_id, "3");
        assert_eq!(provider.lookup_count(), calls);
    }

    #[tokio::test]
    async fn missing_user_is_negatively_cached() {
        let (authorization, provider) = authorization();

        assert!(!authorization.has_user("404").await.unwrap());
        let calls = provider.lookup_count();
        assert!(matches!(
            authorization.user_information_by_id("404").await,
            Err(AuthzError::UserNotFound(_))
        ));
        assert_eq!(provider.lookup_count(), calls);
    }

    #[tokio::test]
    async fn root_user_is_never_fetched() {
        let (authorization, provider) = authorization();

        let root = authorization.user_information_by_id(ROOT_USER_ID).await.unwrap();

        assert_eq!(root.last_name.as_deref(), Some("root"));
        assert_eq!(provider.lookup_count(), 0);
    }

    #[tokio::test]
    async fn lookup_by_principal_name() {
        let (authorization, _) = authorization();

        let user = authorization
            .user_information_by_principal_name("admin@cesnet.cz")
            .await
            .unwrap();
        assert_eq!(user.user_id, "1");
        assert!(matches!(
            authorization.user_information_by_principal_name("ghost").await,
            Err(AuthzError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_authorization_data_defaults_to_no_assurance() {
        let (authorization, _) = authorization();

        let data = authorization
            .user_authorization_data(&SecurityToken::new("user-token"))
            .await
            .unwrap();

        assert_eq!(data.loa, UserAuthorizationData::LOA_NONE);
    }

    // --- Groups ---

    #[tokio::test]
    async fn everyone_group_is_built_in() {
        let (authorization, provider) = authorization();

        assert_eq!(authorization.group_id_by_name("everyone").await.unwrap(), "0");
        assert!(authorization.group_user_ids("0").await.unwrap().is_everyone());
        assert!(authorization.group("0").await.unwrap().is_everyone());
        assert_eq!(provider.lookup_count(), 0);
        assert!(matches!(
            authorization.delete_group("0").await,
            Err(AuthzError::EveryoneGroupImmutable)
        ));
    }

    #[tokio::test]
    async fn group_membership_changes_update_cached_members() {
        let (authorization, _) = authorization();
        assert_eq!(
            authorization.group_user_ids("20").await.unwrap(),
            UserIdSet::single("2")
        );

        authorization.add_group_user("20", "3").await.unwrap();
        assert!(authorization.group_user_ids("20").await.unwrap().contains("3"));

        authorization.remove_group_user("20", "2").await.unwrap();
        assert_eq!(
            authorization.group_user_ids("20").await.unwrap(),
            UserIdSet::single("3")
        );
    }

    #[tokio::test]
    async fn deleted_group_is_no_longer_resolved() {
        let (authorization, _) = authorization();
        assert_eq!(authorization.group_id_by_name("operators").await.unwrap(), "20");

        authorization.delete_group("20").await.unwrap();

        assert!(matches!(
            authorization.group_id_by_name("operators").await,
            Err(AuthzError::GroupNotFound(_))
        ));
        assert!(matches!(
            authorization.group("20").await,
            Err(AuthzError::GroupNotFound(_))
        ));
    }

    #[tokio::test]
    async fn everyone_name_cannot_be_created() {
        let (authorization, provider) = authorization();

        for name in ["everyone", "Everyone", "EVERYONE"] {
            let result = authorization.create_group(Group::new("", name)).await;
            assert!(
                matches!(
                    result,
                    Err(AuthzError::GroupAlreadyExists(ref existing)) if existing == name
                ),
                "expected GroupAlreadyExists for {name}, got: {result:?}"
            );
        }
        assert_eq!(provider.lookup_count(), 0);
    }

    #[tokio::test]
    async fn created_group_replaces_cached_miss() {
        let (authorization, _) = authorization();
        assert!(matches!(
            authorization.group("21").await,
            Err(AuthzError::GroupNotFound(_))
        ));

        let group_id = authorization
            .create_group(Group::new("", "reviewers"))
            .await
            .unwrap();

        assert_eq!(group_id, "21");
        assert_eq!(authorization.group("21").await.unwrap().name, "reviewers");
        assert_eq!(authorization.group_id_by_name("reviewers").await.unwrap(), "21");
        assert!(matches!(
            authorization.create_group(Group::new("", "reviewers")).await,
            Err(AuthzError::GroupAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn list_groups_puts_everyone_first() {
        let (authorization, _) = authorization();

        let groups = authorization.list_groups(None, None).await.unwrap();
        assert!(groups[0].is_everyone());
        assert_eq!(groups[1].name, "operators");

        let only = HashSet::from(["20".to_string()]);
        let groups = authorization.list_groups(Some(&only), None).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert!(groups[0].is_everyone());
    }

    #[tokio::test]
    async fn renamed_group_resolves_by_new_name() {
        let (authorization, _) = authorization();
        authorization.group_id_by_name("operators").await.unwrap();

        authorization
            .modify_group(Group::new("20", "ops"))
            .await
            .unwrap();

        assert_eq!(authorization.group("20").await.unwrap().name, "ops");
        assert_eq!(authorization.group_id_by_name("ops").await.unwrap(), "20");
        assert!(authorization.group_id_by_name("operators").await.is_err());
    }

    // --- System permissions ---

    #[tokio::test]
    async fn administration_mode_follows_expressions() {
        let (authorization, _) = authorization();
        let admin = SecurityToken::new("admin-token");
        let operator = SecurityToken::new("operator-token");
        let user = SecurityToken::new("user-token");

        assert_eq!(
            authorization.update_administration_mode(&admin, true).await.unwrap(),
            Some(AdministrationMode::Administrator)
        );
        assert_eq!(
            authorization.update_administration_mode(&operator, true).await.unwrap(),
            Some(AdministrationMode::Operator)
        );
        assert_eq!(authorization.update_administration_mode(&user, true).await.unwrap(), None);

        assert!(authorization.is_administrator(&admin));
        assert!(authorization.is_operator(&operator));
        assert!(!authorization.is_administrator(&operator));

        authorization.update_administration_mode(&admin, false).await.unwrap();
        assert!(!authorization.is_administrator(&admin));
    }

    #[tokio::test]
    async fn system_permissions() {
        let (authorization, _) = authorization();
        let admin = SecurityToken::new("admin-token");
        let operator = SecurityToken::new("operator-token");
        let user = SecurityToken::new("user-token");

        assert!(
            authorization
                .has_system_permission(&admin, SystemPermission::Administration)
                .await
                .unwrap()
        );
        assert!(
            authorization
                .has_system_permission(&operator, SystemPermission::Reservation)
                .await
                .unwrap()
        );
        assert!(
            !authorization
                .has_system_permission(&operator, SystemPermission::Operator)
                .await
                .unwrap()
        );
        authorization.update_administration_mode(&operator, true).await.unwrap();
        assert!(
            authorization
                .has_system_permission(&operator, SystemPermission::Operator)
                .await
                .unwrap()
        );
        assert!(
            !authorization
                .has_system_permission(&user, SystemPermission::Reservation)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn root_user_expressions_evaluate_to_false() {
        let (authorization, _) = authorization();

        let check = authorization.check_expressions().await.unwrap();

        assert_eq!(
            check,
            ExpressionCheck {
                administrator: false,
                operator: false,
                reservation: false
            }
        );
    }

    // --- Object permissions ---

    #[tokio::test]
    async fn user_state_is_built_from_direct_group_and_everyone_entries() {
        let store = InMemoryAclStore::new();
        store
            .create_entry(&AclIdentity::user("2"), &resource(1), &Role::OWNER)
            .await
            .unwrap();
        store
            .create_entry(&AclIdentity::group("20"), &resource(2), &Role::RESERVATION)
            .await
            .unwrap();
        store
            .create_entry(&AclIdentity::everyone(), &resource(3), &Role::READER)
            .await
            .unwrap();
        store
            .create_entry(&AclIdentity::user("3"), &resource(4), &Role::OWNER)
            .await
            .unwrap();
        let (authorization, _) = authorization_with(store);

        let state = authorization.user_state("2").await.unwrap();

        assert_eq!(state.entry_count(), 3);
        assert!(state.has_role(&resource(1), &Role::OWNER));
        assert!(state.has_permission(&resource(2), &Permission::RESERVE_RESOURCE));
        assert!(state.has_permission(&resource(3), &Permission::READ));
        assert!(!state.has_permission(&resource(4), &Permission::READ));
    }

    #[tokio::test]
    async fn operator_reads_everything_administrator_does_everything() {
        let (authorization, _) = authorization();
        let admin = SecurityToken::new("admin-token");
        let operator = SecurityToken::new("operator-token");
        authorization.update_administration_mode(&admin, true).await.unwrap();
        authorization.update_administration_mode(&operator, true).await.unwrap();

        assert!(
            authorization
                .has_permission(&operator, &resource(1), &Permission::READ)
                .await
                .unwrap()
        );
        assert!(
            !authorization
                .has_permission(&operator, &resource(1), &Permission::WRITE)
                .await
                .unwrap()
        );
        assert!(
            authorization
                .has_role(&admin, &resource(1), &Role::OWNER)
                .await
                .unwrap()
        );
        assert_eq!(
            authorization
                .objects_with_permission(&operator, &ObjectClass::RESOURCE, &Permission::READ)
                .await
                .unwrap(),
            ObjectIdSet::All
        );
        assert_eq!(
            authorization.object_permissions(&admin, &resource(1)).await.unwrap(),
            ObjectTypeRegistry::booking().permissions(&ObjectClass::RESOURCE)
        );
    }

    #[tokio::test]
    async fn root_user_holds_every_permission() {
        let (authorization, _) = authorization();

        assert!(
            authorization
                .has_user_permission(ROOT_USER_ID, &resource(1), &Permission::CONTROL_RESOURCE)
                .await
                .unwrap()
        );
        assert!(
            authorization
                .has_user_role(ROOT_USER_ID, &resource(1), &Role::OWNER)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn user_ids_with_role_expands_groups() {
        let store = InMemoryAclStore::new();
        store
            .create_entry(&AclIdentity::user("1"), &resource(1), &Role::OWNER)
            .await
            .unwrap();
        store
            .create_entry(&AclIdentity::group("20"), &resource(1), &Role::OWNER)
            .await
            .unwrap();
        store
            .create_entry(&AclIdentity::everyone(), &resource(1), &Role::READER)
            .await
            .unwrap();
        let (authorization, _) = authorization_with(store);

        let owners = authorization
            .user_ids_with_role(&resource(1), &Role::OWNER)
            .await
            .unwrap();
        assert_eq!(owners, ["1", "2"].into_iter().map(String::from).collect());
        assert!(
            authorization
                .user_ids_with_role(&resource(1), &Role::READER)
                .await
                .unwrap()
                .is_everyone()
        );
        assert!(
            authorization
                .users_with_role(&resource(1), &Role::READER)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            authorization
                .users_with_role(&resource(1), &Role::OWNER)
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
