use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Role;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct RoleList {
    #[schema(value_type = Vec<Role>)]
    pub items: Vec<Role>,
}
