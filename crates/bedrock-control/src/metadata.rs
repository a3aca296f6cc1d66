use std::sync::Arc;

use anyhow::Context;
use bedrock_db::{
    entities::member_roles,
    sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set},
};
use bedrock_supervisor::MetadataStore;

/// Roster lookups backed by the `member_roles` table.
#[derive(Clone)]
pub struct DbMetadata {
    db: Arc<DatabaseConnection>,
}

impl DbMetadata {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl MetadataStore for DbMetadata {
    async fn role_of(&self, world_id: i32, xuid: &str) -> anyhow::Result<Option<String>> {
        let row = member_roles::Entity::find()
            .filter(member_roles::Column::WorldServerId.eq(world_id))
            .filter(member_roles::Column::Xuid.eq(xuid))
            .one(&*self.db)
            .await
            .with_context(|| format!("look up role of {xuid} in world {world_id}"))?;
        Ok(row.map(|r| r.role))
    }

    async fn ensure_player(&self, world_id: i32, xuid: &str, name: &str) -> anyhow::Result<()> {
        let existing = member_roles::Entity::find()
            .filter(member_roles::Column::WorldServerId.eq(world_id))
            .filter(member_roles::Column::Xuid.eq(xuid))
            .one(&*self.db)
            .await
            .with_context(|| format!("look up player {xuid} in world {world_id}"))?;

        match existing {
            // Rows created before the name was known get it filled in once.
            Some(row) if row.name.is_empty() && !name.is_empty() => {
                let mut active: member_roles::ActiveModel = row.into();
                active.name = Set(name.to_string());
                active
                    .update(&*self.db)
                    .await
                    .context("backfill player name")?;
            }
            Some(_) => {}
            None => {
                member_roles::ActiveModel {
                    name: Set(name.to_string()),
                    xuid: Set(xuid.to_string()),
                    world_server_id: Set(world_id),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await
                .with_context(|| format!("add player {xuid} to world {world_id}"))?;
                tracing::info!(world_id, xuid, name, "player added to roster");
            }
        }
        Ok(())
    }
}
