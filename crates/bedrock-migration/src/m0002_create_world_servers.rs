use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WorldServers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WorldServers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WorldServers::CreatorId).integer().null())
                    .col(ColumnDef::new(WorldServers::Port).integer().not_null())
                    .col(ColumnDef::new(WorldServers::Name).string().not_null())
                    .col(
                        ColumnDef::new(WorldServers::GameMode)
                            .string()
                            .not_null()
                            .default("survival"),
                    )
                    .col(
                        ColumnDef::new(WorldServers::Difficult)
                            .string()
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(WorldServers::AllowCheat)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(WorldServers::ViewDistance)
                            .integer()
                            .not_null()
                            .default(32),
                    )
                    .col(
                        ColumnDef::new(WorldServers::SeedWorld)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(WorldServers::MaxPlayer)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(WorldServers::DefaultPermissionPlayer)
                            .string()
                            .not_null()
                            .default("member"),
                    )
                    .index(
                        Index::create()
                            .name("idx_world_servers_port_unique")
                            .table(WorldServers::Table)
                            .col(WorldServers::Port)
                            .unique(),
                    )
                    .index(
                        Index::create()
                            .name("idx_world_servers_name_unique")
                            .table(WorldServers::Table)
                            .col(WorldServers::Name)
                            .unique(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_world_servers_creator")
                            .from(WorldServers::Table, WorldServers::CreatorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Non-unique indexes cannot be attached to CREATE TABLE on Postgres.
        manager
            .create_index(
                Index::create()
                    .name("idx_world_servers_creator_id")
                    .table(WorldServers::Table)
                    .col(WorldServers::CreatorId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WorldServers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WorldServers {
    Table,
    Id,
    CreatorId,
    Port,
    Name,
    GameMode,
    Difficult,
    AllowCheat,
    ViewDistance,
    SeedWorld,
    MaxPlayer,
    DefaultPermissionPlayer,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
