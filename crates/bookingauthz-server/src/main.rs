use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bookingauthz_core::{ObjectClass, ObjectTypeRegistry};
use bookingauthz_server::authorization::Authorization;
use bookingauthz_server::cli::{Cli, Command};
use bookingauthz_server::config::{AppConfig, LogFormat};
use bookingauthz_server::provider::InMemoryIdentityProvider;
use bookingauthz_storage::InMemoryAclStore;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            registry.with(fmt_layer).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Some(Command::Registry) => run_registry(&config),
        Some(Command::Check) | None => run_check(&config).await,
    }
}

async fn run_check(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(config.to_registry()?);
    let authorization = Authorization::new(
        Arc::new(InMemoryAclStore::new()),
        Arc::new(InMemoryIdentityProvider::new()),
        Arc::clone(&registry),
        config.to_settings(),
    )?;

    let check = authorization.check_expressions().await?;
    tracing::info!(
        object_types = registry.classes().count(),
        administrator = check.administrator,
        operator = check.operator,
        reservation = check.reservation,
        "configuration is valid"
    );
    Ok(())
}

fn run_registry(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = config.to_registry()?;
    let mut classes: Vec<_> = registry.classes().cloned().collect();
    classes.sort();

    for class in &classes {
        println!("{class}");
        print_roles(&registry, class);
        for rule in registry.propagation_rules(class) {
            println!("  {} -> {} ({:?})", rule.relation, rule.child_class, rule.roles);
        }
    }
    Ok(())
}

fn print_roles(registry: &ObjectTypeRegistry, class: &ObjectClass) {
    for role in registry.allowed_roles(class) {
        let permissions = registry
            .role_permissions(class, &role)
            .map(|permissions| {
                permissions
                    .iter()
                    .map(|permission| permission.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let marker = if registry.is_propagatable(class, &role) {
            "*"
        } else {
            " "
        };
        println!("  {marker}{role}: {permissions}");
    }
}
