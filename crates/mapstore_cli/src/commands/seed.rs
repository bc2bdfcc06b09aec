//! Loading a JSON seed into in-memory storages.

use super::CliError;
use mapstore_core::{StringKeyConverter, UnitOfWork};
use mapstore_model::{AuthorizationStorages, Resource, ResourceServer};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Contents of a seed file.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    /// Resource servers, created first.
    #[serde(default)]
    pub resource_servers: Vec<ResourceServer<String>>,
    /// Resources; each must name a seeded server.
    #[serde(default)]
    pub resources: Vec<Resource<String>>,
}

/// Reads and parses a seed file.
pub fn read(path: &Path) -> Result<Seed, CliError> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Loads a seed file into fresh storages, committed in one unit of work.
pub fn load(path: &Path) -> Result<AuthorizationStorages<String>, CliError> {
    let seed = read(path)?;
    let storages = AuthorizationStorages::in_memory(Arc::new(StringKeyConverter));
    populate(&storages, seed)?;
    Ok(storages)
}

/// Writes a seed through the stores of one unit of work.
pub fn populate(storages: &AuthorizationStorages<String>, seed: Seed) -> Result<(), CliError> {
    let servers = seed.resource_servers.len();
    let resources = seed.resources.len();

    let uow = UnitOfWork::new();
    let stores = storages.store_factory(&uow);

    for server in seed.resource_servers {
        let view = stores.resource_servers().create(&server.id)?;
        view.set_allow_remote_resource_management(server.allow_remote_resource_management);
        view.set_policy_enforcement_mode(server.policy_enforcement_mode);
        view.set_decision_strategy(server.decision_strategy);
    }

    for resource in seed.resources {
        if stores
            .resource_servers()
            .find_by_id(&resource.resource_server_id)?
            .is_none()
        {
            return Err(CliError::InvalidSeed(format!(
                "resource {} refers to unknown server {}",
                resource.id, resource.resource_server_id
            )));
        }
        let view = stores.resources().create(
            Some(&resource.id),
            &resource.name,
            &resource.resource_server_id,
            &resource.owner,
        )?;
        view.set_display_name(resource.display_name);
        view.set_resource_type(resource.resource_type);
        view.update_uris(resource.uris);
        view.update_scopes(resource.scope_ids);
        view.set_icon_uri(resource.icon_uri);
        view.set_owner_managed_access(resource.owner_managed_access);
        for (name, values) in resource.attributes {
            view.set_attribute(name, values);
        }
        debug!(id = %resource.id, "seeded resource");
    }

    uow.commit()?;
    info!(servers, resources, "seed loaded");
    Ok(())
}
