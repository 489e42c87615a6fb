use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An operation the current user may perform on an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    CanDeleteObject,
    CanUpdateProperties,
    CanGetProperties,
    CanGetObjectRelationships,
    CanGetObjectParents,
    CanGetFolderParent,
    CanGetDescendants,
    CanGetChildren,
    CanMoveObject,
    CanDeleteContentStream,
    CanCheckOut,
    CanCancelCheckOut,
    CanCheckIn,
    CanSetContentStream,
    CanGetAllVersions,
    CanGetContentStream,
    CanApplyPolicy,
    CanGetAppliedPolicies,
    CanRemovePolicy,
    CanCreateDocument,
    CanCreateFolder,
    CanCreateRelationship,
    CanCreateItem,
    CanDeleteTree,
    CanGetRenditions,
    CanGetAcl,
    CanApplyAcl,
}

/// The set of actions the repository allows on one object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowableActions {
    actions: BTreeSet<Action>,
}

impl AllowableActions {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            actions: actions.into_iter().collect(),
        }
    }

    pub fn contains(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn iter(&self) -> impl Iterator<Item = Action> + '_ {
        self.actions.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
