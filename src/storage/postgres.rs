//! Postgres storage for onboarding-service.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::OnboardingError;
use crate::models::{
    BatchStatus, CapabilityMap, Invitation, InviteBatch, Membership, Notification, RoleDefinition,
    RowError,
};
use crate::storage::{
    BatchStore, InvitationFilter, InvitationStore, MembershipStore, NotificationFilter,
    NotificationStore, RoleStore,
};

/// Database connection pool wrapper implementing every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "onboarding-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, OnboardingError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| {
                OnboardingError::Database(anyhow::anyhow!("Failed to connect: {}", e))
            })?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), OnboardingError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                OnboardingError::Database(anyhow::anyhow!("Health check failed: {}", e))
            })?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), OnboardingError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OnboardingError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Invitation Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl InvitationStore for PgStore {
    #[instrument(
        skip(self, invitation),
        fields(invitation_id = %invitation.invitation_id, workspace_id = %invitation.workspace_id)
    )]
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            INSERT INTO invitations (invitation_id, workspace_id, email, role_name, department,
                position, message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(invitation.workspace_id)
        .bind(&invitation.email)
        .bind(&invitation.role_name)
        .bind(&invitation.department)
        .bind(&invitation.position)
        .bind(&invitation.message)
        .bind(&invitation.token)
        .bind(invitation.status)
        .bind(invitation.invited_by_user_id)
        .bind(invitation.expiry_utc)
        .bind(invitation.reminders_sent)
        .bind(invitation.last_reminder_utc)
        .bind(invitation.accepted_utc)
        .bind(invitation.declined_utc)
        .bind(invitation.cancelled_utc)
        .bind(&invitation.decline_reason)
        .bind(Json(&invitation.metadata))
        .bind(invitation.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to insert invitation: {}", e))
        })?;

        Ok(())
    }

    async fn invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, workspace_id, email, role_name, department, position, message,
                token, status, invited_by_user_id, expiry_utc, reminders_sent, last_reminder_utc,
                accepted_utc, declined_utc, cancelled_utc, decline_reason, metadata, created_utc
            FROM invitations
            WHERE invitation_id = $1
            "#,
        )
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to fetch invitation: {}", e))
        })?;

        Ok(invitation)
    }

    async fn invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, workspace_id, email, role_name, department, position, message,
                token, status, invited_by_user_id, expiry_utc, reminders_sent, last_reminder_utc,
                accepted_utc, declined_utc, cancelled_utc, decline_reason, metadata, created_utc
            FROM invitations
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!(
                "Failed to fetch invitation by token: {}",
                e
            ))
        })?;

        Ok(invitation)
    }

    fn list_invitations(
        &self,
        filter: InvitationFilter,
    ) -> BoxStream<'_, Result<Invitation, OnboardingError>> {
        sqlx::query_as::<_, Invitation>(
            r#"
            SELECT invitation_id, workspace_id, email, role_name, department, position, message,
                token, status, invited_by_user_id, expiry_utc, reminders_sent, last_reminder_utc,
                accepted_utc, declined_utc, cancelled_utc, decline_reason, metadata, created_utc
            FROM invitations
            WHERE ($1::uuid IS NULL OR workspace_id = $1)
              AND ($2::invitation_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR email = $3)
              AND ($4::timestamptz IS NULL OR created_utc >= $4)
              AND ($5::timestamptz IS NULL OR created_utc <= $5)
            ORDER BY created_utc, invitation_id
            "#,
        )
        .bind(filter.workspace_id)
        .bind(filter.status)
        .bind(filter.email.map(|e| e.trim().to_lowercase()))
        .bind(filter.created_after)
        .bind(filter.created_before)
        .fetch(&self.pool)
        .map_err(OnboardingError::from)
        .boxed()
    }

    #[instrument(skip(self), fields(invitation_id = %invitation_id))]
    async fn accept_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET status = 'accepted', accepted_utc = $2
            WHERE invitation_id = $1 AND status = 'pending' AND expiry_utc > $2
            RETURNING invitation_id, workspace_id, email, role_name, department, position,
                message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to accept invitation: {}", e))
        })?;

        if invitation.is_some() {
            info!(invitation_id = %invitation_id, "Invitation accepted");
        }
        Ok(invitation)
    }

    #[instrument(skip(self, reason), fields(invitation_id = %invitation_id))]
    async fn decline_if_pending(
        &self,
        invitation_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET status = 'declined', declined_utc = $2, decline_reason = $3
            WHERE invitation_id = $1 AND status = 'pending'
            RETURNING invitation_id, workspace_id, email, role_name, department, position,
                message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(now)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to decline invitation: {}", e))
        })?;

        if invitation.is_some() {
            info!(invitation_id = %invitation_id, "Invitation declined");
        }
        Ok(invitation)
    }

    #[instrument(skip(self), fields(invitation_id = %invitation_id))]
    async fn cancel_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET status = 'cancelled', cancelled_utc = $2
            WHERE invitation_id = $1 AND status = 'pending'
            RETURNING invitation_id, workspace_id, email, role_name, department, position,
                message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to cancel invitation: {}", e))
        })?;

        if invitation.is_some() {
            info!(invitation_id = %invitation_id, "Invitation cancelled");
        }
        Ok(invitation)
    }

    async fn expire_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET status = 'expired'
            WHERE invitation_id = $1 AND status = 'pending' AND expiry_utc <= $2
            RETURNING invitation_id, workspace_id, email, role_name, department, position,
                message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to expire invitation: {}", e))
        })?;

        Ok(invitation)
    }

    #[instrument(skip(self, token), fields(invitation_id = %invitation_id))]
    async fn replace_token_if_pending(
        &self,
        invitation_id: Uuid,
        token: &str,
        expiry_utc: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET token = $2, expiry_utc = $3
            WHERE invitation_id = $1 AND status = 'pending'
            RETURNING invitation_id, workspace_id, email, role_name, department, position,
                message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(token)
        .bind(expiry_utc)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to replace token: {}", e))
        })?;

        if invitation.is_some() {
            info!(invitation_id = %invitation_id, "Invitation token regenerated");
        }
        Ok(invitation)
    }

    async fn increment_reminders_if_pending(
        &self,
        invitation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Invitation>, OnboardingError> {
        let invitation = sqlx::query_as::<_, Invitation>(
            r#"
            UPDATE invitations
            SET reminders_sent = reminders_sent + 1, last_reminder_utc = $2
            WHERE invitation_id = $1 AND status = 'pending'
            RETURNING invitation_id, workspace_id, email, role_name, department, position,
                message, token, status, invited_by_user_id, expiry_utc, reminders_sent,
                last_reminder_utc, accepted_utc, declined_utc, cancelled_utc, decline_reason,
                metadata, created_utc
            "#,
        )
        .bind(invitation_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to record reminder: {}", e))
        })?;

        Ok(invitation)
    }

    #[instrument(skip(self))]
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, OnboardingError> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'expired' WHERE status = 'pending' AND expiry_utc <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to sweep invitations: {}", e))
        })?;

        Ok(result.rows_affected())
    }
}

// -----------------------------------------------------------------------------
// Batch Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl BatchStore for PgStore {
    #[instrument(
        skip(self, batch),
        fields(batch_id = %batch.batch_id, workspace_id = %batch.workspace_id)
    )]
    async fn insert_batch(&self, batch: &InviteBatch) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            INSERT INTO invite_batches (batch_id, workspace_id, created_by_user_id, name,
                total_rows, successful_rows, failed_rows, status, errors, source,
                completed_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(batch.batch_id)
        .bind(batch.workspace_id)
        .bind(batch.created_by_user_id)
        .bind(&batch.name)
        .bind(batch.total_rows)
        .bind(batch.successful_rows)
        .bind(batch.failed_rows)
        .bind(batch.status)
        .bind(Json(&batch.errors))
        .bind(&batch.source)
        .bind(batch.completed_utc)
        .bind(batch.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to insert batch: {}", e))
        })?;

        Ok(())
    }

    async fn batch_by_id(&self, batch_id: Uuid) -> Result<Option<InviteBatch>, OnboardingError> {
        let batch = sqlx::query_as::<_, InviteBatch>(
            r#"
            SELECT batch_id, workspace_id, created_by_user_id, name, total_rows, successful_rows,
                failed_rows, status, errors, source, completed_utc, created_utc
            FROM invite_batches
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to fetch batch: {}", e))
        })?;

        Ok(batch)
    }

    async fn record_row_outcome(
        &self,
        batch_id: Uuid,
        success: bool,
        error: Option<RowError>,
    ) -> Result<Option<InviteBatch>, OnboardingError> {
        let (success_inc, failed_inc) = if success { (1i32, 0i32) } else { (0i32, 1i32) };

        let batch = sqlx::query_as::<_, InviteBatch>(
            r#"
            UPDATE invite_batches
            SET successful_rows = successful_rows + $2,
                failed_rows = failed_rows + $3,
                errors = CASE WHEN $4::jsonb IS NULL THEN errors ELSE errors || $4::jsonb END
            WHERE batch_id = $1
            RETURNING batch_id, workspace_id, created_by_user_id, name, total_rows,
                successful_rows, failed_rows, status, errors, source, completed_utc, created_utc
            "#,
        )
        .bind(batch_id)
        .bind(success_inc)
        .bind(failed_inc)
        .bind(error.map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to record row outcome: {}", e))
        })?;

        Ok(batch)
    }

    #[instrument(skip(self), fields(batch_id = %batch_id, status = %status))]
    async fn finalize_batch(
        &self,
        batch_id: Uuid,
        status: BatchStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<InviteBatch>, OnboardingError> {
        let batch = sqlx::query_as::<_, InviteBatch>(
            r#"
            UPDATE invite_batches
            SET status = $2, completed_utc = $3
            WHERE batch_id = $1 AND status = 'processing'
            RETURNING batch_id, workspace_id, created_by_user_id, name, total_rows,
                successful_rows, failed_rows, status, errors, source, completed_utc, created_utc
            "#,
        )
        .bind(batch_id)
        .bind(status)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to finalize batch: {}", e))
        })?;

        if batch.is_some() {
            info!(batch_id = %batch_id, status = %status, "Batch finalized");
        }
        Ok(batch)
    }

    fn list_batches(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<InviteBatch, OnboardingError>> {
        sqlx::query_as::<_, InviteBatch>(
            r#"
            SELECT batch_id, workspace_id, created_by_user_id, name, total_rows, successful_rows,
                failed_rows, status, errors, source, completed_utc, created_utc
            FROM invite_batches
            WHERE workspace_id = $1
            ORDER BY created_utc, batch_id
            "#,
        )
        .bind(workspace_id)
        .fetch(&self.pool)
        .map_err(OnboardingError::from)
        .boxed()
    }
}

// -----------------------------------------------------------------------------
// Role Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl RoleStore for PgStore {
    #[instrument(
        skip(self, role),
        fields(role_id = %role.role_id, workspace_id = %role.workspace_id, name = %role.name)
    )]
    async fn insert_role(&self, role: &RoleDefinition) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            INSERT INTO roles (role_id, workspace_id, name, description, capabilities,
                is_default, is_system, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.role_id)
        .bind(role.workspace_id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(Json(&role.capabilities))
        .bind(role.is_default)
        .bind(role.is_system)
        .bind(role.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                OnboardingError::Validation(format!(
                    "Role '{}' already exists in this workspace",
                    role.name
                ))
            }
            _ => OnboardingError::Database(anyhow::anyhow!("Failed to insert role: {}", e)),
        })?;

        Ok(())
    }

    async fn role_by_id(&self, role_id: Uuid) -> Result<Option<RoleDefinition>, OnboardingError> {
        let role = sqlx::query_as::<_, RoleDefinition>(
            r#"
            SELECT role_id, workspace_id, name, description, capabilities, is_default, is_system,
                created_utc
            FROM roles
            WHERE role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OnboardingError::Database(anyhow::anyhow!("Failed to fetch role: {}", e)))?;

        Ok(role)
    }

    async fn role_by_name(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        let role = sqlx::query_as::<_, RoleDefinition>(
            r#"
            SELECT role_id, workspace_id, name, description, capabilities, is_default, is_system,
                created_utc
            FROM roles
            WHERE workspace_id = $1 AND LOWER(name) = LOWER($2)
            "#,
        )
        .bind(workspace_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to fetch role by name: {}", e))
        })?;

        Ok(role)
    }

    async fn default_role(
        &self,
        workspace_id: Uuid,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        let role = sqlx::query_as::<_, RoleDefinition>(
            r#"
            SELECT role_id, workspace_id, name, description, capabilities, is_default, is_system,
                created_utc
            FROM roles
            WHERE workspace_id = $1 AND is_default = TRUE
            "#,
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to fetch default role: {}", e))
        })?;

        Ok(role)
    }

    fn list_roles(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<RoleDefinition, OnboardingError>> {
        sqlx::query_as::<_, RoleDefinition>(
            r#"
            SELECT role_id, workspace_id, name, description, capabilities, is_default, is_system,
                created_utc
            FROM roles
            WHERE workspace_id = $1
            ORDER BY created_utc, role_id
            "#,
        )
        .bind(workspace_id)
        .fetch(&self.pool)
        .map_err(OnboardingError::from)
        .boxed()
    }

    #[instrument(skip(self, capabilities), fields(role_id = %role_id))]
    async fn update_role_capabilities(
        &self,
        role_id: Uuid,
        capabilities: &CapabilityMap,
    ) -> Result<Option<RoleDefinition>, OnboardingError> {
        let role = sqlx::query_as::<_, RoleDefinition>(
            r#"
            UPDATE roles
            SET capabilities = $2
            WHERE role_id = $1 AND is_system = FALSE
            RETURNING role_id, workspace_id, name, description, capabilities, is_default,
                is_system, created_utc
            "#,
        )
        .bind(role_id)
        .bind(Json(capabilities))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to update role: {}", e))
        })?;

        Ok(role)
    }
}

// -----------------------------------------------------------------------------
// Membership Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl MembershipStore for PgStore {
    #[instrument(
        skip(self, membership),
        fields(workspace_id = %membership.workspace_id, user_id = %membership.user_id)
    )]
    async fn insert_membership(&self, membership: &Membership) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            INSERT INTO memberships (membership_id, workspace_id, user_id, role_id, status,
                invited_by_user_id, invited_utc, joined_utc, last_activity_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.workspace_id)
        .bind(membership.user_id)
        .bind(membership.role_id)
        .bind(membership.status)
        .bind(membership.invited_by_user_id)
        .bind(membership.invited_utc)
        .bind(membership.joined_utc)
        .bind(membership.last_activity_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                OnboardingError::Validation(
                    "User is already a member of this workspace".to_string(),
                )
            }
            _ => OnboardingError::Database(anyhow::anyhow!("Failed to insert membership: {}", e)),
        })?;

        Ok(())
    }

    async fn membership_for_user(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, OnboardingError> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT membership_id, workspace_id, user_id, role_id, status, invited_by_user_id,
                invited_utc, joined_utc, last_activity_utc
            FROM memberships
            WHERE workspace_id = $1 AND user_id = $2
            "#,
        )
        .bind(workspace_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to fetch membership: {}", e))
        })?;

        Ok(membership)
    }

    fn list_active_members(
        &self,
        workspace_id: Uuid,
    ) -> BoxStream<'_, Result<Membership, OnboardingError>> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT membership_id, workspace_id, user_id, role_id, status, invited_by_user_id,
                invited_utc, joined_utc, last_activity_utc
            FROM memberships
            WHERE workspace_id = $1 AND status = 'active'
            ORDER BY joined_utc, membership_id
            "#,
        )
        .bind(workspace_id)
        .fetch(&self.pool)
        .map_err(OnboardingError::from)
        .boxed()
    }
}

// -----------------------------------------------------------------------------
// Notification Operations
// -----------------------------------------------------------------------------

#[async_trait]
impl NotificationStore for PgStore {
    #[instrument(
        skip(self, notification),
        fields(
            notification_id = %notification.notification_id,
            recipient_user_id = %notification.recipient_user_id
        )
    )]
    async fn insert_notification(
        &self,
        notification: &Notification,
    ) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (notification_id, workspace_id, recipient_user_id,
                sender_user_id, kind, title, message, action_url, metadata, priority, read,
                read_utc, expiry_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(notification.notification_id)
        .bind(notification.workspace_id)
        .bind(notification.recipient_user_id)
        .bind(notification.sender_user_id)
        .bind(notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.action_url)
        .bind(Json(&notification.metadata))
        .bind(notification.priority)
        .bind(notification.read)
        .bind(notification.read_utc)
        .bind(notification.expiry_utc)
        .bind(notification.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to insert notification: {}", e))
        })?;

        Ok(())
    }

    async fn notification_by_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, OnboardingError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            SELECT notification_id, workspace_id, recipient_user_id, sender_user_id, kind, title,
                message, action_url, metadata, priority, read, read_utc, expiry_utc, created_utc
            FROM notifications
            WHERE notification_id = $1
            "#,
        )
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to fetch notification: {}", e))
        })?;

        Ok(notification)
    }

    fn list_notifications(
        &self,
        workspace_id: Uuid,
        recipient_user_id: Uuid,
        filter: NotificationFilter,
    ) -> BoxStream<'_, Result<Notification, OnboardingError>> {
        sqlx::query_as::<_, Notification>(
            r#"
            SELECT notification_id, workspace_id, recipient_user_id, sender_user_id, kind, title,
                message, action_url, metadata, priority, read, read_utc, expiry_utc, created_utc
            FROM notifications
            WHERE workspace_id = $1
              AND recipient_user_id = $2
              AND (NOT $3::bool OR read = FALSE)
              AND ($4::timestamptz IS NULL OR expiry_utc IS NULL OR expiry_utc > $4)
            ORDER BY created_utc, notification_id
            "#,
        )
        .bind(workspace_id)
        .bind(recipient_user_id)
        .bind(filter.unread_only)
        .bind(filter.visible_at)
        .fetch(&self.pool)
        .map_err(OnboardingError::from)
        .boxed()
    }

    async fn mark_notification_read(
        &self,
        notification_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, OnboardingError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET read = TRUE, read_utc = COALESCE(read_utc, $2)
            WHERE notification_id = $1
            RETURNING notification_id, workspace_id, recipient_user_id, sender_user_id, kind,
                title, message, action_url, metadata, priority, read, read_utc, expiry_utc,
                created_utc
            "#,
        )
        .bind(notification_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!("Failed to mark notification read: {}", e))
        })?;

        Ok(notification)
    }

    async fn mark_notification_unread(
        &self,
        notification_id: Uuid,
    ) -> Result<Option<Notification>, OnboardingError> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET read = FALSE, read_utc = NULL
            WHERE notification_id = $1
            RETURNING notification_id, workspace_id, recipient_user_id, sender_user_id, kind,
                title, message, action_url, metadata, priority, read, read_utc, expiry_utc,
                created_utc
            "#,
        )
        .bind(notification_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            OnboardingError::Database(anyhow::anyhow!(
                "Failed to mark notification unread: {}",
                e
            ))
        })?;

        Ok(notification)
    }
}
