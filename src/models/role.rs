//! Role model - workspace-scoped roles with typed capability maps.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Product modules a role can be granted access to. Closed set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    Workspace,
    Social,
    BioPage,
    Courses,
    Commerce,
    Crm,
    Marketing,
    Templates,
    Analytics,
    Team,
}

impl Module {
    pub const ALL: [Module; 10] = [
        Module::Workspace,
        Module::Social,
        Module::BioPage,
        Module::Courses,
        Module::Commerce,
        Module::Crm,
        Module::Marketing,
        Module::Templates,
        Module::Analytics,
        Module::Team,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Workspace => "workspace",
            Module::Social => "social",
            Module::BioPage => "bio-page",
            Module::Courses => "courses",
            Module::Commerce => "commerce",
            Module::Crm => "crm",
            Module::Marketing => "marketing",
            Module::Templates => "templates",
            Module::Analytics => "analytics",
            Module::Team => "team",
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Actions a role can take within a module. Closed set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Manage,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Module-to-allowed-actions mapping. Absent module means no access.
pub type CapabilityMap = BTreeMap<Module, BTreeSet<Action>>;

/// Role entity (workspace-scoped).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleDefinition {
    pub role_id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub capabilities: CapabilityMap,
    pub is_default: bool,
    pub is_system: bool,
    pub created_utc: DateTime<Utc>,
}

impl RoleDefinition {
    /// Create a custom (non-system) role.
    pub fn new_custom(
        workspace_id: Uuid,
        name: String,
        description: Option<String>,
        capabilities: CapabilityMap,
    ) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            workspace_id,
            name,
            description,
            capabilities,
            is_default: false,
            is_system: false,
            created_utc: Utc::now(),
        }
    }

    /// Instantiate a system role template for a workspace.
    pub fn from_template(workspace_id: Uuid, template: &RoleTemplate) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            workspace_id,
            name: template.name.to_string(),
            description: Some(template.description.to_string()),
            capabilities: template.capabilities.clone(),
            is_default: template.is_default,
            is_system: true,
            created_utc: Utc::now(),
        }
    }

    /// Check whether this role authorizes an action in a module.
    pub fn allows(&self, module: Module, action: Action) -> bool {
        self.capabilities
            .get(&module)
            .is_some_and(|actions| actions.contains(&action))
    }

    /// Add an action for a module. Returns true when the map changed.
    pub fn grant(&mut self, module: Module, action: Action) -> bool {
        self.capabilities.entry(module).or_default().insert(action)
    }

    /// Remove an action for a module. Removing the last action drops the
    /// module key entirely. Returns true when the map changed.
    pub fn revoke(&mut self, module: Module, action: Action) -> bool {
        let Some(actions) = self.capabilities.get_mut(&module) else {
            return false;
        };
        let changed = actions.remove(&action);
        if actions.is_empty() {
            self.capabilities.remove(&module);
        }
        changed
    }
}

/// Built-in role template. Instantiated per workspace by the registry.
#[derive(Debug, Clone)]
pub struct RoleTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub capabilities: CapabilityMap,
    pub is_default: bool,
}

fn actions(list: &[Action]) -> BTreeSet<Action> {
    list.iter().copied().collect()
}

fn every_module(list: &[Action]) -> CapabilityMap {
    Module::ALL
        .iter()
        .map(|m| (*m, actions(list)))
        .collect()
}

const CONTENT_MODULES: [Module; 7] = [
    Module::Social,
    Module::BioPage,
    Module::Courses,
    Module::Commerce,
    Module::Crm,
    Module::Marketing,
    Module::Templates,
];

/// The five built-in system role templates. Viewer is the single default.
pub fn system_role_templates() -> Vec<RoleTemplate> {
    let full = [
        Action::View,
        Action::Create,
        Action::Edit,
        Action::Delete,
        Action::Manage,
    ];

    let owner = RoleTemplate {
        name: "Owner",
        description: "Full control over the workspace and every module",
        capabilities: every_module(&full),
        is_default: false,
    };

    let mut admin_caps = every_module(&full);
    admin_caps.insert(
        Module::Workspace,
        actions(&[Action::View, Action::Edit, Action::Manage]),
    );
    let administrator = RoleTemplate {
        name: "Administrator",
        description: "Full module access; cannot delete the workspace",
        capabilities: admin_caps,
        is_default: false,
    };

    let mut manager_caps: CapabilityMap = CONTENT_MODULES
        .iter()
        .map(|m| {
            (
                *m,
                actions(&[Action::View, Action::Create, Action::Edit, Action::Delete]),
            )
        })
        .collect();
    manager_caps.insert(Module::Workspace, actions(&[Action::View]));
    manager_caps.insert(Module::Analytics, actions(&[Action::View]));
    manager_caps.insert(Module::Team, actions(&[Action::View, Action::Manage]));
    let manager = RoleTemplate {
        name: "Manager",
        description: "Manages content and the team roster",
        capabilities: manager_caps,
        is_default: false,
    };

    let mut editor_caps: CapabilityMap = CONTENT_MODULES
        .iter()
        .map(|m| (*m, actions(&[Action::View, Action::Create, Action::Edit])))
        .collect();
    editor_caps.insert(Module::Workspace, actions(&[Action::View]));
    editor_caps.insert(Module::Analytics, actions(&[Action::View]));
    editor_caps.insert(Module::Team, actions(&[Action::View]));
    let editor = RoleTemplate {
        name: "Editor",
        description: "Creates and edits content",
        capabilities: editor_caps,
        is_default: false,
    };

    let viewer = RoleTemplate {
        name: "Viewer",
        description: "Read-only access across modules",
        capabilities: every_module(&[Action::View]),
        is_default: true,
    };

    vec![owner, administrator, manager, editor, viewer]
}
