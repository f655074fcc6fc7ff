//! Role registry and permission checks.

use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{system_role_templates, Action, CapabilityMap, Module, RoleDefinition};
use crate::storage::RoleStore;

/// Manages role definitions and answers permission questions for a workspace.
#[derive(Clone)]
pub struct RoleRegistry {
    roles: Arc<dyn RoleStore>,
}

impl RoleRegistry {
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Instantiate the five built-in roles for a workspace.
    ///
    /// Exactly one of the templates is flagged as the workspace default.
    #[instrument(skip(self), fields(workspace_id = %workspace_id))]
    pub async fn install_system_roles(
        &self,
        workspace_id: Uuid,
    ) -> Result<Vec<RoleDefinition>, OnboardingError> {
        let templates = system_role_templates();

        let defaults = templates.iter().filter(|t| t.is_default).count();
        if defaults != 1 {
            return Err(OnboardingError::Integrity(format!(
                "Expected exactly one default role template, found {}",
                defaults
            )));
        }

        let mut installed = Vec::with_capacity(templates.len());
        for template in &templates {
            let role = RoleDefinition::from_template(workspace_id, template);
            self.roles.insert_role(&role).await?;
            installed.push(role);
        }

        info!(
            workspace_id = %workspace_id,
            count = installed.len(),
            "System roles installed"
        );
        Ok(installed)
    }

    /// Create a workspace-specific role with an explicit capability map.
    #[instrument(skip(self, capabilities), fields(workspace_id = %workspace_id, name = %name))]
    pub async fn create_custom_role(
        &self,
        workspace_id: Uuid,
        name: &str,
        description: &str,
        capabilities: CapabilityMap,
    ) -> Result<RoleDefinition, OnboardingError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OnboardingError::Validation(
                "Role name must not be empty".to_string(),
            ));
        }

        // Name uniqueness is case-insensitive within a workspace
        if self.roles.role_by_name(workspace_id, name).await?.is_some() {
            return Err(OnboardingError::Validation(format!(
                "Role '{}' already exists in this workspace",
                name
            )));
        }

        let description = Some(description.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let role =
            RoleDefinition::new_custom(workspace_id, name.to_string(), description, capabilities);
        self.roles.insert_role(&role).await?;

        info!(role_id = %role.role_id, name = %role.name, "Custom role created");
        Ok(role)
    }

    /// Check whether a role name resolves in the workspace.
    pub async fn role_exists(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<bool, OnboardingError> {
        Ok(self.roles.role_by_name(workspace_id, name).await?.is_some())
    }

    /// Look up a role by name.
    pub async fn find_role(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        self.roles.role_by_name(workspace_id, name).await
    }

    /// Look up a role by name, failing when it does not resolve.
    pub async fn require_role(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<RoleDefinition, OnboardingError> {
        self.roles
            .role_by_name(workspace_id, name)
            .await?
            .ok_or_else(|| OnboardingError::Validation(format!("Unknown role '{}'", name)))
    }

    /// The role assigned when an invitation does not name one.
    pub async fn default_role(
        &self,
        workspace_id: Uuid,
    ) -> Result<RoleDefinition, OnboardingError> {
        self.roles.default_role(workspace_id).await?.ok_or_else(|| {
            OnboardingError::Integrity("No default role configured for workspace".to_string())
        })
    }

    /// Answer whether the named role allows `action` on `module`.
    pub async fn has_permission(
        &self,
        workspace_id: Uuid,
        role_name: &str,
        module: Module,
        action: Action,
    ) -> Result<bool, OnboardingError> {
        let role = self.require_role(workspace_id, role_name).await?;
        Ok(role.allows(module, action))
    }

    /// Grant a capability on a custom role. System roles are immutable.
    #[instrument(skip(self), fields(role_id = %role_id))]
    pub async fn grant_capability(
        &self,
        role_id: Uuid,
        module: Module,
        action: Action,
    ) -> Result<RoleDefinition, OnboardingError> {
        let mut role = self.load_mutable_role(role_id).await?;

        if !role.grant(module, action) {
            return Ok(role);
        }

        let updated = self
            .roles
            .update_role_capabilities(role_id, &role.capabilities)
            .await?
            .ok_or_else(|| OnboardingError::NotFound(format!("Role {} not found", role_id)))?;

        info!(role_id = %role_id, "Role capability granted");
        Ok(updated)
    }

    /// Revoke a capability on a custom role. System roles are immutable.
    #[instrument(skip(self), fields(role_id = %role_id))]
    pub async fn revoke_capability(
        &self,
        role_id: Uuid,
        module: Module,
        action: Action,
    ) -> Result<RoleDefinition, OnboardingError> {
        let mut role = self.load_mutable_role(role_id).await?;

        if !role.revoke(module, action) {
            return Ok(role);
        }

        let updated = self
            .roles
            .update_role_capabilities(role_id, &role.capabilities)
            .await?
            .ok_or_else(|| OnboardingError::NotFound(format!("Role {} not found", role_id)))?;

        info!(role_id = %role_id, "Role capability revoked");
        Ok(updated)
    }

    /// All roles defined in the workspace, system and custom.
    pub fn list_roles(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<RoleDefinition, OnboardingError>> {
        self.roles.list_roles(workspace_id)
    }

    async fn load_mutable_role(&self, role_id: Uuid) -> Result<RoleDefinition, OnboardingError> {
        let role = self
            .roles
            .role_by_id(role_id)
            .await?
            .ok_or_else(|| OnboardingError::NotFound(format!("Role {} not found", role_id)))?;

        if role.is_system {
            return Err(OnboardingError::Validation(
                "System roles cannot be modified".to_string(),
            ));
        }
        Ok(role)
    }
}
