//! Stats command implementation.

use super::{seed, CliError, Format};
use mapstore_core::{CriteriaBuilder, UnitOfWork};
use mapstore_model::PolicyEnforcementMode;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Seed statistics.
#[derive(Debug, Serialize)]
pub struct StatsResult {
    /// Seed path.
    pub seed: String,
    /// Number of resource servers.
    pub resource_servers: usize,
    /// Number of resources.
    pub resources: usize,
    /// Number of distinct owners across all servers.
    pub owners: usize,
    /// Per-server breakdown, ordered by server id.
    pub servers: Vec<ServerStats>,
}

/// Statistics for a single resource server.
#[derive(Debug, Serialize)]
pub struct ServerStats {
    /// Server id.
    pub id: String,
    /// Enforcement mode.
    pub policy_enforcement_mode: PolicyEnforcementMode,
    /// Number of resources.
    pub resources: usize,
    /// Number of distinct owners.
    pub owners: usize,
    /// Number of distinct scopes.
    pub scopes: usize,
}

/// Runs the stats command.
pub fn run(seed_path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let result = execute(seed_path)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Loads the seed and summarizes it.
pub fn execute(seed_path: &Path) -> Result<StatsResult, CliError> {
    let storages = seed::load(seed_path)?;
    let resources = storages
        .resources
        .count(&storages.resources.create_criteria_builder())?;

    let uow = UnitOfWork::new();
    let stores = storages.store_factory(&uow);

    let mut server_ids: Vec<String> = {
        let all = storages.resource_servers.begin();
        let mut tx = all.lock();
        let everything = CriteriaBuilder::new();
        let ids = tx
            .get_updated_not_removed(&everything)?
            .map(|server| server.read().id.clone())
            .collect();
        ids
    };
    server_ids.sort();

    let mut all_owners = BTreeSet::new();
    let mut servers = Vec::with_capacity(server_ids.len());
    for id in server_ids {
        let Some(server) = stores.resource_servers().find_by_id(&id)? else {
            continue;
        };
        let owned = stores.resources().find_by_resource_server(&id)?;
        let owners: BTreeSet<String> = owned.iter().map(|r| r.owner()).collect();
        let scopes: BTreeSet<String> = owned.iter().flat_map(|r| r.scope_ids()).collect();
        all_owners.extend(owners.iter().cloned());
        servers.push(ServerStats {
            id,
            policy_enforcement_mode: server.policy_enforcement_mode(),
            resources: owned.len(),
            owners: owners.len(),
            scopes: scopes.len(),
        });
    }
    uow.rollback();

    Ok(StatsResult {
        seed: seed_path.display().to_string(),
        resource_servers: servers.len(),
        resources,
        owners: all_owners.len(),
        servers,
    })
}

fn print_text_output(result: &StatsResult) {
    println!("mapstore seed statistics");
    println!("========================");
    println!();
    println!("Seed: {}", result.seed);
    println!();
    println!("Totals:");
    println!("  Resource servers: {}", result.resource_servers);
    println!("  Resources:        {}", result.resources);
    println!("  Owners:           {}", result.owners);

    if !result.servers.is_empty() {
        println!();
        println!("Servers:");
        for server in &result.servers {
            println!(
                "  [{}] {:?}: {} resources, {} owners, {} scopes",
                server.id,
                server.policy_enforcement_mode,
                server.resources,
                server.owners,
                server.scopes
            );
        }
    }
}
