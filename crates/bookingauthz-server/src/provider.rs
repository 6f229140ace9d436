use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use bookingauthz_core::acl::{EVERYONE_GROUP_ID, EVERYONE_GROUP_NAME, ROOT_USER_ID};
use bookingauthz_core::expression::IdentityAttributes;

/// Bearer token identifying the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityToken {
    access_token: String,
}

impl SecurityToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAuthorizationData {
    pub provider: Option<String>,
    pub loa: i64,
}

impl UserAuthorizationData {
    /// Level of assurance of an identity whose provider reported none.
    pub const LOA_NONE: i64 = 0;
}

impl Default for UserAuthorizationData {
    fn default() -> Self {
        Self {
            provider: None,
            loa: Self::LOA_NONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserData {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub principal_names: Vec<String>,
    pub authorization: Option<UserAuthorizationData>,
}

impl UserData {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn root() -> Self {
        Self {
            user_id: ROOT_USER_ID.to_string(),
            last_name: Some("root".to_string()),
            ..Self::default()
        }
    }

    pub fn is_root(&self) -> bool {
        self.user_id == ROOT_USER_ID
    }

    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn to_attributes(&self, authorization: &UserAuthorizationData) -> IdentityAttributes {
        IdentityAttributes {
            id: Some(self.user_id.clone()),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            organization: self.organization.clone(),
            provider: authorization.provider.clone(),
            loa: Some(authorization.loa),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupType {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: GroupType,
    pub administrators: BTreeSet<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            kind: GroupType::User,
            administrators: BTreeSet::new(),
        }
    }

    pub fn everyone() -> Self {
        Self {
            kind: GroupType::System,
            description: Some("All users".to_string()),
            ..Self::new(EVERYONE_GROUP_ID, EVERYONE_GROUP_NAME)
        }
    }

    pub fn is_everyone(&self) -> bool {
        self.id == EVERYONE_GROUP_ID
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("user '{0}' not found")]
    UserNotFound(String),
    #[error("group '{0}' not found")]
    GroupNotFound(String),
    #[error("group '{0}' already exists")]
    GroupAlreadyExists(String),
    #[error("access token is not valid")]
    InvalidToken,
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// The external identity and group web service.
pub trait IdentityProvider: Send + Sync {
    fn user_data_by_token(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<UserData, ProviderError>> + Send;

    fn user_data_by_id(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<UserData, ProviderError>> + Send;

    fn user_id_by_principal_name(
        &self,
        principal_name: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn group(&self, group_id: &str) -> impl Future<Output = Result<Group, ProviderError>> + Send;

    fn group_id_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn group_member_ids(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<HashSet<String>, ProviderError>> + Send;

    fn user_group_ids(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<HashSet<String>, ProviderError>> + Send;

    /// Groups matching both filters; `None` matches every group.
    fn list_groups(
        &self,
        group_ids: Option<&HashSet<String>>,
        kinds: Option<&HashSet<GroupType>>,
    ) -> impl Future<Output = Result<Vec<Group>, ProviderError>> + Send;

    /// Returns the id assigned to the new group.
    fn create_group(
        &self,
        group: &Group,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    fn modify_group(&self, group: &Group) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn delete_group(
        &self,
        group_id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn add_group_user(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn remove_group_user(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;
}

#[derive(Debug, Default)]
struct ProviderState {
    users: HashMap<String, UserData>,
    tokens: HashMap<String, String>,
    groups: HashMap<String, Group>,
    members: HashMap<String, HashSet<String>>,
}

/// Identity provider backed by process memory, counting every lookup.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    state: RwLock<ProviderState>,
    lookups: AtomicUsize,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: UserData) {
        self.state.write().users.insert(user.user_id.clone(), user);
    }

    pub fn add_token(&self, access_token: impl Into<String>, user_id: impl Into<String>) {
        self.state
            .write()
            .tokens
            .insert(access_token.into(), user_id.into());
    }

    pub fn add_group(&self, group: Group, member_ids: &[&str]) {
        let mut state = self.state.write();
        state.members.insert(
            group.id.clone(),
            member_ids.iter().map(|id| id.to_string()).collect(),
        );
        state.groups.insert(group.id.clone(), group);
    }

    /// Number of provider calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    async fn user_data_by_token(&self, access_token: &str) -> Result<UserData, ProviderError> {
        self.touch();
        let state = self.state.read();
        let user_id = state
            .tokens
            .get(access_token)
            .ok_or(ProviderError::InvalidToken)?;
        state
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ProviderError::UserNotFound(user_id.clone()))
    }

    async fn user_data_by_id(&self, user_id: &str) -> Result<UserData, ProviderError> {
        self.touch();
        self.state
            .read()
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ProviderError::UserNotFound(user_id.to_string()))
    }

    async fn user_id_by_principal_name(
        &self,
        principal_name: &str,
    ) -> Result<String, ProviderError> {
        self.touch();
        self.state
            .read()
            .users
            .values()
            .find(|user| user.principal_names.iter().any(|name| name == principal_name))
            .map(|user| user.user_id.clone())
            .ok_or_else(|| ProviderError::UserNotFound(principal_name.to_string()))
    }

    async fn group(&self, group_id: &str) -> Result<Group, ProviderError> {
        self.touch();
        self.state
            .read()
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))
    }

    async fn group_id_by_name(&self, name: &str) -> Result<String, ProviderError> {
        self.touch();
        self.state
            .read()
            .groups
            .values()
            .find(|group| group.name == name)
            .map(|group| group.id.clone())
            .ok_or_else(|| ProviderError::GroupNotFound(name.to_string()))
    }

    async fn group_member_ids(&self, group_id: &str) -> Result<HashSet<String>, ProviderError> {
        self.touch();
        self.state
            .read()
            .members
            .get(group_id)
            .cloned()
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))
    }

    async fn user_group_ids(&self, user_id: &str) -> Result<HashSet<String>, ProviderError> {
        self.touch();
        let state = self.state.read();
        if !state.users.contains_key(user_id) {
            return Err(ProviderError::UserNotFound(user_id.to_string()));
        }
        Ok(state
            .members
            .iter()
            .filter(|(_, members)| members.contains(user_id))
            .map(|(group_id, _)| group_id.clone())
            .collect())
    }

    async fn list_groups(
        &self,
        group_ids: Option<&HashSet<String>>,
        kinds: Option<&HashSet<GroupType>>,
    ) -> Result<Vec<Group>, ProviderError> {
        self.touch();
        let mut groups: Vec<Group> = self
            .state
            .read()
            .groups
            .values()
            .filter(|group| group_ids.is_none_or(|ids| ids.contains(&group.id)))
            .filter(|group| kinds.is_none_or(|kinds| kinds.contains(&group.kind)))
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    async fn create_group(&self, group: &Group) -> Result<String, ProviderError> {
        self.touch();
        let mut state = self.state.write();
        if state.groups.values().any(|existing| existing.name == group.name) {
            return Err(ProviderError::GroupAlreadyExists(group.name.clone()));
        }
        let next_id = state
            .groups
            .keys()
            .filter_map(|id| id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let group_id = next_id.to_string();
        state.members.insert(group_id.clone(), HashSet::new());
        state.groups.insert(
            group_id.clone(),
            Group {
                id: group_id.clone(),
                ..group.clone()
            },
        );
        Ok(group_id)
    }

    async fn modify_group(&self, group: &Group) -> Result<(), ProviderError> {
        self.touch();
        let mut state = self.state.write();
        let existing = state
            .groups
            .get_mut(&group.id)
            .ok_or_else(|| ProviderError::GroupNotFound(group.id.clone()))?;
        *existing = group.clone();
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), ProviderError> {
        self.touch();
        let mut state = self.state.write();
        if state.groups.remove(group_id).is_none() {
            return Err(ProviderError::GroupNotFound(group_id.to_string()));
        }
        state.members.remove(group_id);
        Ok(())
    }

    async fn add_group_user(&self, group_id: &str, user_id: &str) -> Result<(), ProviderError> {
        self.touch();
        let mut state = self.state.write();
        if !state.users.contains_key(user_id) {
            return Err(ProviderError::UserNotFound(user_id.to_string()));
        }
        let members = state
            .members
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))?;
        members.insert(user_id.to_string());
        Ok(())
    }

    async fn remove_group_user(&self, group_id: &str, user_id: &str) -> Result<(), ProviderError> {
        self.touch();
        let mut state = self.state.write();
        let members = state
            .members
            .get_mut(group_id)
            .ok_or_else(|| ProviderError::GroupNotFound(group_id.to_string()))?;
        members.remove(user_id);
        Ok(())
    }
}
