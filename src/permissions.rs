//! Project roles and the actions each role may perform.

use crate::error::{BoardError, Result};
use crate::models::{EntityId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    ProjectDelete,
    ProjectUpdate,
    ListCreate,
    ListDelete,
    ListReorder,
    TaskCreate,
    TaskUpdate,
    TaskDelete,
    TaskReorder,
    TaskAssign,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ProjectDelete => "project.delete",
            Action::ProjectUpdate => "project.update",
            Action::ListCreate => "list.create",
            Action::ListDelete => "list.delete",
            Action::ListReorder => "list.reorder",
            Action::TaskCreate => "task.create",
            Action::TaskUpdate => "task.update",
            Action::TaskDelete => "task.delete",
            Action::TaskReorder => "task.reorder",
            Action::TaskAssign => "task.assign",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ADMIN_ACTIONS: &[Action] = &[
    Action::ProjectDelete,
    Action::ProjectUpdate,
    Action::ListCreate,
    Action::ListDelete,
    Action::ListReorder,
    Action::TaskCreate,
    Action::TaskUpdate,
    Action::TaskDelete,
    Action::TaskReorder,
    Action::TaskAssign,
];

const MANAGER_ACTIONS: &[Action] = &[
    Action::ListCreate,
    Action::ListReorder,
    Action::TaskCreate,
    Action::TaskUpdate,
    Action::TaskDelete,
    Action::TaskReorder,
    Action::TaskAssign,
];

// members may add, edit and drag cards; column structure and reassignment stay with managers
const MEMBER_ACTIONS: &[Action] = &[Action::TaskCreate, Action::TaskUpdate, Action::TaskReorder];

impl Role {
    pub fn actions(&self) -> &'static [Action] {
        match self {
            Role::Admin => ADMIN_ACTIONS,
            Role::Manager => MANAGER_ACTIONS,
            Role::Member => MEMBER_ACTIONS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `role` may perform `action`; no role means no permissions
pub fn has_permission(role: Option<Role>, action: Action) -> bool {
    role.is_some_and(|r| r.actions().contains(&action))
}

/// Ask `oracle` whether `role` may perform `action`, as the error the caller sees
pub fn require(oracle: &dyn PermissionOracle, role: Option<Role>, action: Action) -> Result<()> {
    if oracle.has_permission(role, action) {
        Ok(())
    } else {
        Err(BoardError::Forbidden(action.to_string()))
    }
}

/// Answers "what role does this user hold in this project"
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn role(&self, project_id: &EntityId, user_id: &UserId) -> Result<Option<Role>>;

    fn has_permission(&self, role: Option<Role>, action: Action) -> bool {
        has_permission(role, action)
    }
}

/// A project membership as the server reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: UserId,
    pub role: Role,
}

/// Resolve a role from an owner and a membership list; the owner is always admin
pub fn resolve_role(owner: &UserId, members: &[Membership], user_id: &UserId) -> Option<Role> {
    if owner == user_id {
        return Some(Role::Admin);
    }
    members
        .iter()
        .find(|m| &m.user_id == user_id)
        .map(|m| m.role)
}

/// In-memory oracle for one or more projects
#[derive(Debug, Default, Clone)]
pub struct StaticRoles {
    owners: HashMap<EntityId, UserId>,
    members: HashMap<EntityId, Vec<Membership>>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, project_id: impl Into<EntityId>, owner: impl Into<UserId>) -> Self {
        self.owners.insert(project_id.into(), owner.into());
        self
    }

    pub fn with_member(
        mut self,
        project_id: impl Into<EntityId>,
        user_id: impl Into<UserId>,
        role: Role,
    ) -> Self {
        self.members
            .entry(project_id.into())
            .or_default()
            .push(Membership {
                user_id: user_id.into(),
                role,
            });
        self
    }
}

#[async_trait]
impl PermissionOracle for StaticRoles {
    async fn role(&self, project_id: &EntityId, user_id: &UserId) -> Result<Option<Role>> {
        let members = self
            .members
            .get(project_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        match self.owners.get(project_id) {
            Some(owner) => Ok(resolve_role(owner, members, user_id)),
            None => Ok(members
                .iter()
                .find(|m| &m.user_id == user_id)
                .map(|m| m.role)),
        }
    }
}
