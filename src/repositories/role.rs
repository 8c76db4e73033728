use async_trait::async_trait;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::{map_constraint_error, PgStore},
    error::Result,
    models::role::Role,
};

/// Changes applied by a role edit. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

/// Persistence for roles.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Inserts a role. A duplicate name is a `Conflict`.
    async fn insert(&self, role: Role) -> Result<Role>;

    /// Inserts a role unless one with the same name exists.
    ///
    /// # Returns
    ///
    /// `true` when the role was created.
    async fn insert_if_absent(&self, role: Role) -> Result<bool>;

    /// Finds a role by ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>>;

    /// Finds a role by name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// Lists every role, ordered by name.
    async fn list(&self) -> Result<Vec<Role>>;

    /// Applies an edit. A name clash is a `Conflict`.
    async fn update(&self, id: Uuid, update: RoleUpdate) -> Result<Option<Role>>;

    /// Deletes a role. A role still referenced by users is a `Conflict`.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

const ROLE_COLUMNS: &str = "id, name, description, permissions, created_at";

fn row_to_role(row: &Row) -> Result<Role> {
    Ok(Role {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        permissions: row.try_get("permissions")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn insert(&self, role: Role) -> Result<Role> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    r#"
                    INSERT INTO roles (id, name, description, permissions, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {ROLE_COLUMNS}
                    "#
                ),
                &[&role.id, &role.name, &role.description, &role.permissions, &role.created_at],
            )
            .await
            .map_err(|e| map_constraint_error(e, "Role already exists"))?;
        row_to_role(&row)
    }

    async fn insert_if_absent(&self, role: Role) -> Result<bool> {
        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO roles (id, name, description, permissions, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (name) DO NOTHING
                "#,
                &[&role.id, &role.name, &role.description, &role.permissions, &role.created_at],
            )
            .await?;
        Ok(inserted > 0)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"), &[&id])
            .await?;
        row.map(|r| row_to_role(&r)).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"), &[&name])
            .await?;
        row.map(|r| row_to_role(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<Role>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name ASC"), &[])
            .await?;
        rows.iter().map(row_to_role).collect()
    }

    async fn update(&self, id: Uuid, update: RoleUpdate) -> Result<Option<Role>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE roles
                    SET
                        name = COALESCE($2, name),
                        description = COALESCE($3, description),
                        permissions = COALESCE($4, permissions)
                    WHERE id = $1
                    RETURNING {ROLE_COLUMNS}
                    "#
                ),
                &[&id, &update.name, &update.description, &update.permissions],
            )
            .await
            .map_err(|e| map_constraint_error(e, "Role already exists"))?;
        row.map(|r| row_to_role(&r)).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM roles WHERE id = $1", &[&id])
            .await
            .map_err(|e| map_constraint_error(e, "Role is still assigned to users"))?;
        Ok(deleted > 0)
    }
}
