use axum::Json;

use crate::project::{self, ProjectInfo};

pub async fn version() -> Json<ProjectInfo> {
    Json(project::info())
}
