use bookingauthz_core::{AclEntry, AclEntryDependency};

pub fn audit_entry_created(entry: &AclEntry) {
    tracing::info!(
        target: "acl",
        event = "entry_created",
        entry_id = entry.id.value(),
        identity = %entry.identity,
        object = %entry.object_identity,
        role = %entry.role,
        "ACL entry created"
    );
}

pub fn audit_entry_deleted(entry: &AclEntry) {
    tracing::info!(
        target: "acl",
        event = "entry_deleted",
        entry_id = entry.id.value(),
        identity = %entry.identity,
        object = %entry.object_identity,
        role = %entry.role,
        "ACL entry deleted"
    );
}

pub fn audit_dependency_created(dependency: &AclEntryDependency) {
    tracing::info!(
        target: "acl",
        event = "dependency_created",
        parent_entry_id = dependency.parent_entry_id.value(),
        child_entry_id = dependency.child_entry_id.value(),
        kind = %dependency.kind,
        "ACL dependency created"
    );
}

pub fn audit_child_retained(parent: &AclEntry, child: &AclEntry) {
    tracing::warn!(
        target: "acl",
        event = "child_retained",
        parent_entry_id = parent.id.value(),
        child_entry_id = child.id.value(),
        child_object = %child.object_identity,
        "ACL entry kept because another parent still references it"
    );
}

pub fn audit_transaction_committed(added: usize, removed: usize) {
    tracing::info!(
        target: "acl",
        event = "transaction_committed",
        added = added,
        removed = removed,
        "ACL transaction committed"
    );
}

pub fn audit_administration_mode(user_id: &str, mode: &str) {
    tracing::info!(
        target: "acl",
        event = "administration_mode",
        user_id = user_id,
        mode = mode,
        "administration mode updated"
    );
}
