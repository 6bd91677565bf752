use std::sync::Arc;

use crate::dto::{OpResult, RoleInfo, RoleType};
use crate::host::UserAdmin;

pub struct RolesAdapter {
    admin: Arc<dyn UserAdmin>,
}

impl RolesAdapter {
    pub fn new(admin: Arc<dyn UserAdmin>) -> Self {
        Self { admin }
    }

    pub fn list(&self) -> Vec<RoleInfo> {
        self.admin.roles()
    }

    pub fn create(&self, name: &str, role_type: RoleType) -> OpResult {
        match self.admin.create_role(name, role_type) {
            Ok(true) => OpResult::success(format!("Role '{name}' has been created")),
            Ok(false) => OpResult::error(format!("Role '{name}' already exists")),
            Err(err) => OpResult::error(format!("The role cannot be created: {err}")),
        }
    }

    pub fn update(&self, role: &RoleInfo) -> OpResult {
        match self.admin.update_role(role) {
            Ok(()) => OpResult::success(format!("Role '{}' has been updated", role.name)),
            Err(err) => OpResult::error(format!("The role cannot be updated: {err}")),
        }
    }

    pub fn remove(&self, name: &str) -> OpResult {
        match self.admin.remove_role(name) {
            Ok(true) => OpResult::success(format!("Role '{name}' has been removed")),
            Ok(false) => OpResult::error(format!("Role '{name}' does not exist")),
            Err(err) => OpResult::error(format!("The role cannot be removed: {err}")),
        }
    }
}
