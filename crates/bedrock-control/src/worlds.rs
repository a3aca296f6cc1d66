use bedrock_db::{
    entities::{member_roles, users, world_servers},
    sea_orm::{
        ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
        PaginatorTrait, QueryFilter, QueryOrder, Set,
    },
};
use bedrock_process::{WorldEdit, WorldSettings};
use serde::Serialize;

const DEFAULT_MAX_PLAYERS: i32 = 10;
const DEFAULT_VIEW_DISTANCE: i32 = 32;

#[derive(Debug, Serialize)]
pub struct WorldSummary {
    pub id: i32,
    pub creator: Option<String>,
    pub name: String,
    pub port: i32,
    pub players: u64,
    pub running: bool,
}

#[derive(Debug, Serialize)]
pub struct RosterEntry {
    pub xuid: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct WorldDetail {
    pub id: i32,
    pub creator: Option<String>,
    pub name: String,
    pub port: i32,
    pub game_mode: String,
    pub difficult: String,
    pub allow_cheats: bool,
    pub view_distance: i32,
    pub seed: String,
    pub max_player: i32,
    pub permission_player: String,
    pub players: Vec<RosterEntry>,
}

pub async fn find_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<world_servers::Model>, DbErr> {
    world_servers::Entity::find()
        .filter(world_servers::Column::Name.eq(name))
        .one(db)
        .await
}

pub async fn find_by_id(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<world_servers::Model>, DbErr> {
    world_servers::Entity::find_by_id(id).one(db).await
}

pub async fn port_taken(db: &DatabaseConnection, port: i32, except_id: Option<i32>) -> Result<bool, DbErr> {
    let mut query = world_servers::Entity::find().filter(world_servers::Column::Port.eq(port));
    if let Some(id) = except_id {
        query = query.filter(world_servers::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

pub async fn insert_world(
    db: &DatabaseConnection,
    creator_id: i32,
    s: &WorldSettings,
) -> Result<world_servers::Model, DbErr> {
    world_servers::ActiveModel {
        creator_id: Set(Some(creator_id)),
        port: Set(i32::from(s.port)),
        name: Set(s.name.clone()),
        game_mode: Set(s.game_mode.as_str().to_string()),
        difficult: Set(s.difficulty.as_str().to_string()),
        allow_cheat: Set(s.allow_cheats),
        view_distance: Set(non_zero_or(s.view_distance, DEFAULT_VIEW_DISTANCE)),
        seed_world: Set(s.seed.clone().unwrap_or_default()),
        max_player: Set(non_zero_or(s.max_players, DEFAULT_MAX_PLAYERS)),
        default_permission_player: Set(s.default_permission.as_str().to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn update_world(
    db: &DatabaseConnection,
    row: world_servers::Model,
    edit: &WorldEdit,
) -> Result<world_servers::Model, DbErr> {
    let mut active: world_servers::ActiveModel = row.into();
    apply_edit(&mut active, edit);
    active.update(db).await
}

/// Absent fields, zero numbers and an empty seed keep the stored values.
fn apply_edit(active: &mut world_servers::ActiveModel, edit: &WorldEdit) {
    if let Some(name) = &edit.name {
        active.name = Set(name.clone());
    }
    if let Some(mode) = edit.game_mode {
        active.game_mode = Set(mode.as_str().to_string());
    }
    if let Some(difficulty) = edit.difficulty {
        active.difficult = Set(difficulty.as_str().to_string());
    }
    if let Some(allow) = edit.allow_cheats {
        active.allow_cheat = Set(allow);
    }
    if let Some(permission) = edit.default_permission {
        active.default_permission_player = Set(permission.as_str().to_string());
    }
    if edit.port != 0 {
        active.port = Set(i32::from(edit.port));
    }
    if edit.max_players != 0 {
        active.max_player = Set(clamp_i32(edit.max_players));
    }
    if edit.view_distance != 0 {
        active.view_distance = Set(clamp_i32(edit.view_distance));
    }
    if let Some(seed) = edit.seed.as_deref().filter(|v| !v.is_empty()) {
        active.seed_world = Set(seed.to_string());
    }
}

pub async fn delete_world(db: &DatabaseConnection, row: world_servers::Model) -> Result<(), DbErr> {
    row.delete(db).await?;
    Ok(())
}

pub async fn list_worlds(
    db: &DatabaseConnection,
    running: &[String],
) -> Result<Vec<WorldSummary>, DbErr> {
    let rows = world_servers::Entity::find()
        .find_also_related(users::Entity)
        .order_by_asc(world_servers::Column::Id)
        .all(db)
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for (world, creator) in rows {
        let players = member_roles::Entity::find()
            .filter(member_roles::Column::WorldServerId.eq(world.id))
            .count(db)
            .await?;
        out.push(WorldSummary {
            id: world.id,
            creator: creator.map(|u| u.username),
            running: running.iter().any(|n| n == &world.name),
            name: world.name,
            port: world.port,
            players,
        });
    }
    Ok(out)
}

pub async fn world_with_players(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<WorldDetail>, DbErr> {
    let Some((world, creator)) = world_servers::Entity::find()
        .filter(world_servers::Column::Name.eq(name))
        .find_also_related(users::Entity)
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let players = world
        .find_related(member_roles::Entity)
        .order_by_asc(member_roles::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|m| RosterEntry {
            xuid: m.xuid,
            name: m.name,
            role: m.role,
        })
        .collect();

    Ok(Some(WorldDetail {
        id: world.id,
        creator: creator.map(|u| u.username),
        name: world.name,
        port: world.port,
        game_mode: world.game_mode,
        difficult: world.difficult,
        allow_cheats: world.allow_cheat,
        view_distance: world.view_distance,
        seed: world.seed_world,
        max_player: world.max_player,
        permission_player: world.default_permission_player,
        players,
    }))
}

fn non_zero_or(v: u32, default: i32) -> i32 {
    if v == 0 { default } else { clamp_i32(v) }
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}
