//! Access control entries and lists.

use serde::{Deserialize, Serialize};

/// A grant of permissions to one principal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ace {
    pub principal_id: String,
    pub permissions: Vec<String>,
    /// `false` when the entry is inherited rather than set on the object.
    pub direct: bool,
}

impl Ace {
    pub fn new<I, S>(principal_id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            principal_id: principal_id.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            direct: true,
        }
    }

    /// Same principal and permission set, ignoring `direct`.
    pub fn same_grant(&self, other: &Ace) -> bool {
        if self.principal_id != other.principal_id {
            return false;
        }
        let mut a = self.permissions.clone();
        let mut b = other.permissions.clone();
        a.sort();
        b.sort();
        a == b
    }
}

/// An access control list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub aces: Vec<Ace>,
    /// Whether the list is exactly what the repository enforces.
    pub is_exact: Option<bool>,
}

impl Acl {
    pub fn new(aces: Vec<Ace>) -> Self {
        Self {
            aces,
            is_exact: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aces.is_empty()
    }

    /// Permissions granted directly or by inheritance to `principal_id`.
    pub fn permissions_for(&self, principal_id: &str) -> Vec<&str> {
        self.aces
            .iter()
            .filter(|ace| ace.principal_id == principal_id)
            .flat_map(|ace| ace.permissions.iter().map(String::as_str))
            .collect()
    }
}

/// How an ACL change propagates to dependent objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclPropagation {
    RepositoryDetermined,
    ObjectOnly,
    Propagate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_grant_ignores_permission_order_and_direct_flag() {
        let a = Ace::new("alice", ["cmis:read", "cmis:write"]);
        let mut b = Ace::new("alice", ["cmis:write", "cmis:read"]);
        b.direct = false;
        assert!(a.same_grant(&b));
        assert!(!a.same_grant(&Ace::new("bob", ["cmis:read", "cmis:write"])));
    }

    #[test]
    fn permissions_for_collects_across_entries() {
        let acl = Acl::new(vec![
            Ace::new("alice", ["cmis:read"]),
            Ace::new("bob", ["cmis:all"]),
            Ace::new("alice", ["cmis:write"]),
        ]);
        assert_eq!(acl.permissions_for("alice"), vec!["cmis:read", "cmis:write"]);
        assert!(acl.permissions_for("carol").is_empty());
    }
}
