//! Maintenance type lookups and updates over the `tipos_manutencao` table.

use crate::db::executor::QueryExecutor;
use crate::db::params::QueryParam;
use crate::error::StoreResult;
use crate::models::{MaintenanceType, UpdateMaintenanceType};
use tracing::{debug, info};

mod queries {
    /// Column list with the aliases `MaintenanceType::from_row` expects.
    macro_rules! select_maintenance_type {
        () => {
            "SELECT id, nome AS name, ativo AS isActive, categoria AS category, \
             descricao AS description, criado_em AS createdAt, atualizado_em AS updatedAt \
             FROM tipos_manutencao"
        };
    }

    pub const GET: &str = concat!(select_maintenance_type!(), " WHERE id = ?");
    pub const LIST_ACTIVE: &str =
        concat!(select_maintenance_type!(), " WHERE ativo = 1 ORDER BY nome");
    pub const EXISTS: &str = "SELECT id FROM tipos_manutencao WHERE id = ?";
    pub const UPDATE: &str = "UPDATE tipos_manutencao \
         SET nome = ?, ativo = ?, atualizado_em = CURRENT_TIMESTAMP WHERE id = ?";
}

#[derive(Debug, Clone)]
pub struct MaintenanceTypeRepository {
    executor: QueryExecutor,
}

impl MaintenanceTypeRepository {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    pub async fn get(&self, id: i64) -> StoreResult<Option<MaintenanceType>> {
        let rows = self
            .executor
            .query(queries::GET, vec![QueryParam::from(id)])
            .await?;
        rows.first().map(MaintenanceType::from_row).transpose()
    }

    /// Active maintenance types ordered by name.
    pub async fn list_active(&self) -> StoreResult<Vec<MaintenanceType>> {
        let rows = self.executor.query(queries::LIST_ACTIVE, ()).await?;
        rows.iter().map(MaintenanceType::from_row).collect()
    }

    /// Rename and (de)activate a maintenance type. `None` when the id does not exist.
    pub async fn update(
        &self,
        id: i64,
        update: UpdateMaintenanceType,
    ) -> StoreResult<Option<MaintenanceType>> {
        update.validate()?;

        let existing = self
            .executor
            .query(queries::EXISTS, vec![QueryParam::from(id)])
            .await?;
        if existing.is_empty() {
            debug!(id, "Maintenance type not found");
            return Ok(None);
        }

        let name = update.name.trim().to_string();
        self.executor
            .execute(
                queries::UPDATE,
                vec![
                    QueryParam::from(name),
                    QueryParam::from(update.is_active),
                    QueryParam::from(id),
                ],
            )
            .await?;
        info!(id, is_active = update.is_active, "Maintenance type updated");

        self.get(id).await
    }
}
