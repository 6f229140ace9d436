use std::borrow::{Borrow, Cow};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::acl::DependencyKind;

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident { $($constant:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            $(pub const $constant: $name = $name(Cow::Borrowed(stringify!($constant)));)*

            pub fn new(name: impl Into<String>) -> Self {
                Self(Cow::Owned(name.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self::new(name)
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self::new(name)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

name_type!(
    /// A named role that can be granted on an object.
    Role {
        OWNER,
        READER,
        RESERVATION,
        RESERVATION_REQUEST_USER,
    }
);

name_type!(
    /// A permission implied by one or more roles.
    Permission {
        READ,
        WRITE,
        RESERVE_RESOURCE,
        CONTROL_RESOURCE,
        PROVIDE_RESERVATION_REQUEST,
    }
);

name_type!(
    /// The class of a domain object (resource, reservation request, ...).
    ObjectClass {
        RESOURCE,
        RESERVATION_REQUEST,
        RESERVATION,
        EXECUTABLE,
        TAG,
        DOMAIN,
        FOREIGN_RESOURCES,
    }
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeDef {
    pub class: ObjectClass,
    /// Allowed roles and the permissions each one implies.
    #[serde(default)]
    pub roles: BTreeMap<Role, BTreeSet<Permission>>,
    /// Roles that propagate to child objects. `None` means all allowed roles.
    #[serde(default)]
    pub propagatable_roles: Option<BTreeSet<Role>>,
    #[serde(default)]
    pub propagation: Vec<PropagationRule>,
}

impl ObjectTypeDef {
    pub fn new(class: ObjectClass) -> Self {
        Self {
            class,
            roles: BTreeMap::new(),
            propagatable_roles: None,
            propagation: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role, permissions: &[Permission]) -> Self {
        self.roles
            .insert(role, permissions.iter().cloned().collect());
        self
    }

    pub fn with_propagatable_roles(mut self, roles: &[Role]) -> Self {
        self.propagatable_roles = Some(roles.iter().cloned().collect());
        self
    }

    pub fn with_rule(mut self, rule: PropagationRule) -> Self {
        self.propagation.push(rule);
        self
    }

    pub fn allowed_roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.keys()
    }

    pub fn allows_role(&self, role: &Role) -> bool {
        self.roles.contains_key(role)
    }

    pub fn role_permissions(&self, role: &Role) -> Option<&BTreeSet<Permission>> {
        self.roles.get(role)
    }

    /// Every permission any allowed role implies.
    pub fn permissions(&self) -> BTreeSet<Permission> {
        self.roles.values().flatten().cloned().collect()
    }

    pub fn is_propagatable(&self, role: &Role) -> bool {
        match &self.propagatable_roles {
            Some(roles) => roles.contains(role),
            None => self.allows_role(role),
        }
    }
}

/// Declares that ACEs granted on an object are copied onto the children the
/// domain reports for `relation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationRule {
    pub relation: String,
    pub child_class: ObjectClass,
    pub roles: RolePropagation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RolePropagation {
    /// The child receives the granted role, or its substitute when the child
    /// class does not allow it.
    Inherit {
        #[serde(default = "default_inherit_kind")]
        kind: DependencyKind,
        #[serde(default)]
        substitutes: BTreeMap<Role, Role>,
    },
    /// A read-only reference: always READER with a CASCADE edge.
    Reference,
}

fn default_inherit_kind() -> DependencyKind {
    DependencyKind::Detach
}

impl PropagationRule {
    pub fn inherit(relation: impl Into<String>, child_class: ObjectClass) -> Self {
        Self {
            relation: relation.into(),
            child_class,
            roles: RolePropagation::Inherit {
                kind: DependencyKind::Detach,
                substitutes: BTreeMap::new(),
            },
        }
    }

    pub fn reference(relation: impl Into<String>, child_class: ObjectClass) -> Self {
        Self {
            relation: relation.into(),
            child_class,
            roles: RolePropagation::Reference,
        }
    }

    pub fn cascading(mut self) -> Self {
        if let RolePropagation::Inherit { kind, .. } = &mut self.roles {
            *kind = DependencyKind::Cascade;
        }
        self
    }

    pub fn substituting(mut self, granted: Role, child_role: Role) -> Self {
        if let RolePropagation::Inherit { substitutes, .. } = &mut self.roles {
            substitutes.insert(granted, child_role);
        }
        self
    }

    /// Role and edge kind a child of `child_type` receives when `role` is
    /// granted on the parent, or `None` when nothing propagates.
    pub fn child_grant(
        &self,
        role: &Role,
        child_type: &ObjectTypeDef,
    ) -> Option<(Role, DependencyKind)> {
        match &self.roles {
            RolePropagation::Reference => child_type
                .allows_role(&Role::READER)
                .then(|| (Role::READER, DependencyKind::Cascade)),
            RolePropagation::Inherit { kind, substitutes } => {
                if child_type.allows_role(role) {
                    return Some((role.clone(), *kind));
                }
                substitutes
                    .get(role)
                    .filter(|substitute| child_type.allows_role(substitute))
                    .map(|substitute| (substitute.clone(), *kind))
            }
        }
    }
}
