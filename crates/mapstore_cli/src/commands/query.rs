//! Query command implementation.

use super::{seed, CliError, Format};
use clap::Args;
use mapstore_core::UnitOfWork;
use mapstore_model::{FilterOption, Page, ResourceView};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Resource filters.
#[derive(Debug, Default, Args)]
pub struct QueryArgs {
    /// Restrict to one resource server
    #[arg(short, long)]
    pub server: Option<String>,

    /// Match resources with any of these ids
    #[arg(long)]
    pub id: Vec<String>,

    /// Match resources owned by any of these owners
    #[arg(long)]
    pub owner: Vec<String>,

    /// Match names containing this text, ignoring case
    #[arg(long, conflicts_with = "exact_name")]
    pub name: Option<String>,

    /// Match this exact name
    #[arg(long)]
    pub exact_name: Option<String>,

    /// Match resources supporting any of these scopes
    #[arg(long)]
    pub scope: Vec<String>,

    /// Match resources protecting any of these URIs
    #[arg(long)]
    pub uri: Vec<String>,

    /// Only resources protecting at least one URI
    #[arg(long)]
    pub with_uris: bool,

    /// Match on the owner managed access flag
    #[arg(long)]
    pub owner_managed: Option<bool>,

    /// Skip this many results
    #[arg(long, default_value = "0")]
    pub first: usize,

    /// Return at most this many results
    #[arg(long)]
    pub max: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    pub format: Format,
}

impl QueryArgs {
    fn filters(&self) -> BTreeMap<FilterOption, Vec<String>> {
        let mut filters = BTreeMap::new();
        let mut add = |option, values: &[String]| {
            if !values.is_empty() {
                filters.insert(option, values.to_vec());
            }
        };
        add(FilterOption::Id, &self.id);
        add(FilterOption::Owner, &self.owner);
        add(FilterOption::ScopeId, &self.scope);
        add(FilterOption::Uri, &self.uri);
        if let Some(name) = &self.name {
            filters.insert(FilterOption::Name, vec![name.clone()]);
        }
        if let Some(name) = &self.exact_name {
            filters.insert(FilterOption::ExactName, vec![name.clone()]);
        }
        if self.with_uris {
            filters.insert(FilterOption::UriNotNull, Vec::new());
        }
        if let Some(flag) = self.owner_managed {
            filters.insert(FilterOption::OwnerManagedAccess, vec![flag.to_string()]);
        }
        filters
    }

    fn page(&self) -> Page {
        Page {
            first: Some(self.first),
            max: self.max,
        }
    }
}

/// One matching resource.
#[derive(Debug, Serialize)]
pub struct ResourceRow {
    /// Resource id.
    pub id: String,
    /// Name.
    pub name: String,
    /// Owning server.
    pub resource_server_id: String,
    /// Owner.
    pub owner: String,
    /// Resource type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Protected URIs.
    pub uris: Vec<String>,
    /// Supported scopes.
    pub scopes: Vec<String>,
}

impl From<&ResourceView<String>> for ResourceRow {
    fn from(view: &ResourceView<String>) -> Self {
        Self {
            id: view.id(),
            name: view.name(),
            resource_server_id: view.resource_server_id(),
            owner: view.owner(),
            resource_type: view.resource_type(),
            uris: view.uris().into_iter().collect(),
            scopes: view.scope_ids().into_iter().collect(),
        }
    }
}

/// Query result.
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Number of rows returned.
    pub count: usize,
    /// Matching resources, ordered by name.
    pub resources: Vec<ResourceRow>,
}

/// Runs the query command.
pub fn run(seed_path: &Path, args: &QueryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let result = execute(seed_path, args)?;
    match args.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Loads the seed and evaluates the filters against it.
pub fn execute(seed_path: &Path, args: &QueryArgs) -> Result<QueryResult, CliError> {
    let storages = seed::load(seed_path)?;
    let uow = UnitOfWork::new();
    let stores = storages.store_factory(&uow);

    let resources: Vec<ResourceRow> = stores
        .resources()
        .find_by_resource_server_filtered(&args.filters(), args.server.as_deref(), args.page())?
        .iter()
        .map(ResourceRow::from)
        .collect();
    uow.rollback();

    Ok(QueryResult {
        count: resources.len(),
        resources,
    })
}

fn print_text_output(result: &QueryResult) {
    for row in &result.resources {
        println!(
            "{:<12} {:<24} server={} owner={}",
            row.id, row.name, row.resource_server_id, row.owner
        );
        if let Some(resource_type) = &row.resource_type {
            println!("    type:   {resource_type}");
        }
        if !row.uris.is_empty() {
            println!("    uris:   {}", row.uris.join(", "));
        }
        if !row.scopes.is_empty() {
            println!("    scopes: {}", row.scopes.join(", "));
        }
    }
    println!("{} resource(s)", result.count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::seed::tests::{seed_file, SEED};

    fn ids(result: &QueryResult) -> Vec<&str> {
        result.resources.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn no_filters_returns_everything_by_name() {
        let file = seed_file(SEED);
        let result = execute(file.path(), &QueryArgs::default()).unwrap();
        assert_eq!(result.count, 4);
        assert_eq!(ids(&result), vec!["r3", "r1", "r2", "r4"]);
    }

    #[test]
    fn filters_combine() {
        let file = seed_file(SEED);
        let args = QueryArgs {
            server: Some("photoz".into()),
            name: Some("album".into()),
            scope: vec!["delete".into(), "share".into()],
            ..QueryArgs::default()
        };
        let result = execute(file.path(), &args).unwrap();
        assert_eq!(ids(&result), vec!["r1"]);
        assert_eq!(result.resources[0].resource_type.as_deref(), Some("album"));

        let args = QueryArgs {
            owner_managed: Some(true),
            ..QueryArgs::default()
        };
        assert_eq!(ids(&execute(file.path(), &args).unwrap()), vec!["r2"]);

        let args = QueryArgs {
            with_uris: true,
            owner: vec!["photoz".into(), "bob".into()],
            ..QueryArgs::default()
        };
        assert_eq!(ids(&execute(file.path(), &args).unwrap()), vec!["r3"]);
    }

    #[test]
    fn paging() {
        let file = seed_file(SEED);
        let args = QueryArgs {
            first: 1,
            max: Some(2),
            ..QueryArgs::default()
        };
        assert_eq!(ids(&execute(file.path(), &args).unwrap()), vec!["r1", "r2"]);
    }

    #[test]
    fn json_output_names_the_type_field() {
        let file = seed_file(SEED);
        let args = QueryArgs {
            exact_name: Some("Bob Album".into()),
            ..QueryArgs::default()
        };
        let result = execute(file.path(), &args).unwrap();
        let json: serde_json::Value = serde_json::to_value(&result).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["resources"][0]["type"], "album");
    }
}
