//! Static role requirements per endpoint.
//!
//! An endpoint is identified by the base it is mounted under (the
//! controller) and its handler name. A handler entry, even an empty one,
//! overrides the controller entry. Endpoints with neither are open to any
//! authenticated caller.

use std::collections::HashMap;

use crate::auth::account::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointId<'a> {
    pub controller: &'a str,
    pub handler: &'a str,
}

impl<'a> EndpointId<'a> {
    pub fn new(controller: &'a str, handler: &'a str) -> Self {
        Self {
            controller,
            handler,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleTable {
    controllers: HashMap<String, Vec<Role>>,
    handlers: HashMap<String, HashMap<String, Vec<Role>>>,
}

impl RoleTable {
    pub fn builder() -> RoleTableBuilder {
        RoleTableBuilder::default()
    }

    /// Roles allowed to reach `endpoint`; empty means unrestricted.
    pub fn required_roles(&self, endpoint: &EndpointId<'_>) -> &[Role] {
        self.handlers
            .get(endpoint.controller)
            .and_then(|handlers| handlers.get(endpoint.handler))
            .or_else(|| self.controllers.get(endpoint.controller))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
pub struct RoleTableBuilder {
    table: RoleTable,
}

impl RoleTableBuilder {
    pub fn controller(mut self, base: &str, roles: &[Role]) -> Self {
        self.table
            .controllers
            .insert(normalize_base(base), roles.to_vec());
        self
    }

    pub fn handler(mut self, base: &str, handler: &str, roles: &[Role]) -> Self {
        self.table
            .handlers
            .entry(normalize_base(base))
            .or_default()
            .insert(handler.to_string(), roles.to_vec());
        self
    }

    pub fn build(self) -> RoleTable {
        self.table
    }
}

fn normalize_base(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
