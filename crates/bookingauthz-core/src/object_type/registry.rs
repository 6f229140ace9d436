use std::collections::{BTreeSet, HashMap};

use super::types::{ObjectClass, ObjectTypeDef, Permission, PropagationRule, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("object class '{0}' is declared more than once")]
    DuplicateClass(ObjectClass),
    #[error("object class '{0}' does not declare any role")]
    NoRoles(ObjectClass),
    #[error("propagatable role '{role}' is not allowed for object class '{class}'")]
    PropagatableRoleNotAllowed { class: ObjectClass, role: Role },
    #[error("relation '{relation}' of '{class}' targets unknown object class '{child_class}'")]
    UnknownChildClass {
        class: ObjectClass,
        relation: String,
        child_class: ObjectClass,
    },
}

/// Object classes the authorization core knows, keyed by class.
#[derive(Debug, Clone, Default)]
pub struct ObjectTypeRegistry {
    types: HashMap<ObjectClass, ObjectTypeDef>,
}

impl ObjectTypeRegistry {
    pub fn new(types: Vec<ObjectTypeDef>) -> Result<Self, RegistryError> {
        let mut by_class = HashMap::with_capacity(types.len());
        for def in types {
            if def.roles.is_empty() {
                return Err(RegistryError::NoRoles(def.class));
            }
            if let Some(role) = def
                .propagatable_roles
                .iter()
                .flatten()
                .find(|role| !def.allows_role(role))
            {
                return Err(RegistryError::PropagatableRoleNotAllowed {
                    class: def.class.clone(),
                    role: role.clone(),
                });
            }
            let class = def.class.clone();
            if by_class.insert(class.clone(), def).is_some() {
                return Err(RegistryError::DuplicateClass(class));
            }
        }

        for def in by_class.values() {
            if let Some(rule) = def
                .propagation
                .iter()
                .find(|rule| !by_class.contains_key(&rule.child_class))
            {
                return Err(RegistryError::UnknownChildClass {
                    class: def.class.clone(),
                    relation: rule.relation.clone(),
                    child_class: rule.child_class.clone(),
                });
            }
        }

        Ok(Self { types: by_class })
    }

    /// The object classes of the booking controller.
    pub fn booking() -> Self {
        let types = booking_types()
            .into_iter()
            .map(|def| (def.class.clone(), def))
            .collect();
        Self { types }
    }

    pub fn get(&self, class: &ObjectClass) -> Option<&ObjectTypeDef> {
        self.types.get(class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ObjectClass> {
        self.types.keys()
    }

    pub fn allowed_roles(&self, class: &ObjectClass) -> BTreeSet<Role> {
        self.get(class)
            .map(|def| def.allowed_roles().cloned().collect())
            .unwrap_or_default()
    }

    pub fn allows_role(&self, class: &ObjectClass, role: &Role) -> bool {
        self.get(class).is_some_and(|def| def.allows_role(role))
    }

    pub fn role_permissions(
        &self,
        class: &ObjectClass,
        role: &Role,
    ) -> Option<&BTreeSet<Permission>> {
        self.get(class).and_then(|def| def.role_permissions(role))
    }

    pub fn permissions(&self, class: &ObjectClass) -> BTreeSet<Permission> {
        self.get(class)
            .map(ObjectTypeDef::permissions)
            .unwrap_or_default()
    }

    pub fn is_propagatable(&self, class: &ObjectClass, role: &Role) -> bool {
        self.get(class).is_some_and(|def| def.is_propagatable(role))
    }

    pub fn propagation_rules(&self, class: &ObjectClass) -> &[PropagationRule] {
        self.get(class)
            .map(|def| def.propagation.as_slice())
            .unwrap_or_default()
    }
}

pub fn booking_types() -> Vec<ObjectTypeDef> {
    use Permission as P;

    vec![
        ObjectTypeDef::new(ObjectClass::RESOURCE)
            .with_role(Role::OWNER, &[P::READ, P::WRITE, P::CONTROL_RESOURCE])
            .with_role(Role::RESERVATION, &[P::READ, P::RESERVE_RESOURCE])
            .with_role(Role::READER, &[P::READ]),
        ObjectTypeDef::new(ObjectClass::RESERVATION_REQUEST)
            .with_role(Role::OWNER, &[P::READ, P::WRITE, P::PROVIDE_RESERVATION_REQUEST])
            .with_role(
                Role::RESERVATION_REQUEST_USER,
                &[P::READ, P::PROVIDE_RESERVATION_REQUEST],
            )
            .with_role(Role::READER, &[P::READ])
            .with_rule(PropagationRule::inherit(
                "child_requests",
                ObjectClass::RESERVATION_REQUEST,
            ))
            .with_rule(PropagationRule::inherit(
                "usages",
                ObjectClass::RESERVATION_REQUEST,
            ))
            .with_rule(
                PropagationRule::inherit("reservations", ObjectClass::RESERVATION)
                    .substituting(Role::RESERVATION_REQUEST_USER, Role::READER),
            ),
        ObjectTypeDef::new(ObjectClass::RESERVATION)
            .with_role(Role::OWNER, &[P::READ, P::WRITE, P::PROVIDE_RESERVATION_REQUEST])
            .with_role(Role::READER, &[P::READ])
            .with_rule(PropagationRule::inherit(
                "child_reservations",
                ObjectClass::RESERVATION,
            ))
            .with_rule(PropagationRule::inherit("executable", ObjectClass::EXECUTABLE))
            .with_rule(PropagationRule::reference(
                "reused_reservation",
                ObjectClass::RESERVATION,
            )),
        ObjectTypeDef::new(ObjectClass::EXECUTABLE)
            .with_role(Role::OWNER, &[P::READ, P::WRITE])
            .with_role(Role::READER, &[P::READ]),
        ObjectTypeDef::new(ObjectClass::TAG)
            .with_role(Role::OWNER, &[P::READ, P::WRITE])
            .with_role(Role::RESERVATION, &[P::READ, P::RESERVE_RESOURCE])
            .with_role(Role::READER, &[P::READ])
            .with_propagatable_roles(&[Role::READER, Role::RESERVATION])
            .with_rule(
                PropagationRule::inherit("tagged_resources", ObjectClass::RESOURCE).cascading(),
            )
            .with_rule(
                PropagationRule::inherit("tagged_foreign_resources", ObjectClass::FOREIGN_RESOURCES)
                    .cascading(),
            ),
        ObjectTypeDef::new(ObjectClass::DOMAIN)
            .with_role(Role::OWNER, &[P::READ, P::WRITE])
            .with_role(Role::READER, &[P::READ]),
        ObjectTypeDef::new(ObjectClass::FOREIGN_RESOURCES)
            .with_role(Role::OWNER, &[P::READ, P::WRITE, P::CONTROL_RESOURCE])
            .with_role(Role::RESERVATION, &[P::READ, P::RESERVE_RESOURCE])
            .with_role(Role::READER, &[P::READ]),
    ]
}
