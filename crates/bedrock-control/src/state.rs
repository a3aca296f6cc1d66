use std::sync::Arc;

use bedrock_db::sea_orm::DatabaseConnection;
use bedrock_supervisor::Supervisor;

use crate::config::ControlConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub supervisor: Supervisor,
    pub config: Arc<ControlConfig>,
}
