use std::collections::HashMap;

use parking_lot::RwLock;

use bookingauthz_core::AclObjectIdentity;
use bookingauthz_storage::StorageError;

/// Child objects the domain model reports for a parent, by relation name.
pub trait ObjectGraph: Send + Sync {
    fn children(
        &self,
        object: &AclObjectIdentity,
        relation: &str,
    ) -> impl Future<Output = Result<Vec<AclObjectIdentity>, StorageError>> + Send;
}

#[derive(Debug, Default)]
pub struct InMemoryObjectGraph {
    edges: RwLock<HashMap<(AclObjectIdentity, String), Vec<AclObjectIdentity>>>,
}

impl InMemoryObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self, parent: &AclObjectIdentity, relation: &str, child: &AclObjectIdentity) {
        let mut edges = self.edges.write();
        let children = edges
            .entry((parent.clone(), relation.to_string()))
            .or_default();
        if !children.contains(child) {
            children.push(child.clone());
        }
    }

    pub fn unlink(&self, parent: &AclObjectIdentity, relation: &str, child: &AclObjectIdentity) {
        let mut edges = self.edges.write();
        if let Some(children) = edges.get_mut(&(parent.clone(), relation.to_string())) {
            children.retain(|existing| existing != child);
        }
    }
}

impl ObjectGraph for InMemoryObjectGraph {
    async fn children(
        &self,
        object: &AclObjectIdentity,
        relation: &str,
    ) -> Result<Vec<AclObjectIdentity>, StorageError> {
        Ok(self
            .edges
            .read()
            .get(&(object.clone(), relation.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookingauthz_core::ObjectClass;

    #[tokio::test]
    async fn link_and_unlink_children() {
        let graph = InMemoryObjectGraph::new();
        let request = AclObjectIdentity::new(ObjectClass::RESERVATION_REQUEST, 1);
        let reservation = AclObjectIdentity::new(ObjectClass::RESERVATION, 2);

        graph.link(&request, "reservations", &reservation);
        graph.link(&request, "reservations", &reservation);
        assert_eq!(
            graph.children(&request, "reservations").await.unwrap(),
            vec![reservation.clone()]
        );
        assert!(graph.children(&request, "usages").await.unwrap().is_empty());

        graph.unlink(&request, "reservations", &reservation);
        assert!(graph.children(&request, "reservations").await.unwrap().is_empty());
    }
}
