use sea_orm::entity::prelude::*;

/// Per-world roster: the role a player gets tagged with on spawn.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "member_roles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub role: String,
    pub xuid: String,
    pub world_server_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::world_servers::Entity",
        from = "Column::WorldServerId",
        to = "super::world_servers::Column::Id",
        on_delete = "Cascade"
    )]
    WorldServers,
}

impl Related<super::world_servers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorldServers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
