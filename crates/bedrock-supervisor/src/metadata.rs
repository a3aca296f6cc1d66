/// The slice of the world metadata store the supervisor needs.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Role of a player on a world's roster, looked up by xuid.
    async fn role_of(&self, world_id: i32, xuid: &str) -> anyhow::Result<Option<String>>;

    /// Adds the player to the roster unless an entry with this xuid exists.
    async fn ensure_player(&self, world_id: i32, xuid: &str, name: &str) -> anyhow::Result<()>;
}
