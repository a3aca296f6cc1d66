use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "world_servers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub creator_id: Option<i32>,
    #[sea_orm(unique)]
    pub port: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub game_mode: String,
    pub difficult: String,
    pub allow_cheat: bool,
    pub view_distance: i32,
    pub seed_world: String,
    pub max_player: i32,
    pub default_permission_player: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatorId",
        to = "super::users::Column::Id",
        on_delete = "SetNull"
    )]
    Users,
    #[sea_orm(has_many = "super::member_roles::Entity")]
    MemberRoles,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl Related<super::member_roles::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberRoles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
