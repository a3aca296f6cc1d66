use sea_orm::entity::prelude::*;

/// Accounts that create worlds. Rows are written by the auth service.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub password: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::world_servers::Entity")]
    WorldServers,
}

impl Related<super::world_servers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorldServers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
