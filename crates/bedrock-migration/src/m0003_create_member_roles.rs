use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MemberRoles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MemberRoles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MemberRoles::Name)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(MemberRoles::Role)
                            .string()
                            .not_null()
                            .default("bocil"),
                    )
                    .col(
                        ColumnDef::new(MemberRoles::Xuid)
                            .string()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(MemberRoles::WorldServerId)
                            .integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_member_roles_world_server")
                            .from(MemberRoles::Table, MemberRoles::WorldServerId)
                            .to(WorldServers::Table, WorldServers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_member_roles_world_server_id")
                    .table(MemberRoles::Table)
                    .col(MemberRoles::WorldServerId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MemberRoles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MemberRoles {
    Table,
    Id,
    Name,
    Role,
    Xuid,
    WorldServerId,
}

#[derive(DeriveIden)]
enum WorldServers {
    Table,
    Id,
}
