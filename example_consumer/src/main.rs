//! Example consumer: registers a few entities and serves them.
//!
//! Run from the repo root: `cargo run -p restmodel-demo`
//! Set `DATABASE_URL` to use PostgreSQL; otherwise rows live in memory.

use restmodel::{
    Api, EndpointOptions, EntityDescriptor, FieldType, MemoryStore, PostgresStore, ServiceConfig,
    SigningKey, Store, TokenAuthenticator, Verb,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("restmodel=info,restmodel_demo=info")),
        )
        .init();

    let config = ServiceConfig::from_env();

    let person = EntityDescriptor::new("person")
        .with_field("name", FieldType::Text)
        .with_unique_field("email", FieldType::Text)
        .with_field("email_verified", FieldType::Boolean);
    let company = EntityDescriptor::new("company")
        .with_field("name", FieldType::Text)
        .with_unique_field("email", FieldType::Text)
        .with_field("website", FieldType::Text);
    let customer = EntityDescriptor::new("customer")
        .with_field("name", FieldType::Text)
        .with_unique_field("email", FieldType::Text)
        .with_field("address", FieldType::Text);

    let gate_key = SigningKey::generate();
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PostgresStore::connect(url).await?;
            let tokens = restmodel::auth::token_descriptor();
            pg.ensure_entity_tables(&[&person, &company, &customer, &tokens])
                .await?;
            tracing::info!("using PostgreSQL store");
            Arc::new(pg)
        }
        None => {
            tracing::info!("no DATABASE_URL, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let gate = TokenAuthenticator::new(Arc::clone(&store), gate_key)
        .with_ttl(chrono::Duration::seconds(config.token_ttl_secs));

    let mut api = Api::new(Arc::clone(&store))
        .with_authenticator(gate)
        .with_max_body_bytes(config.max_body_bytes);

    api.register(person)?;
    api.register_with(
        company,
        EndpointOptions {
            requires_auth: true,
            ..EndpointOptions::default()
        },
    )?;
    api.register_with(
        customer,
        EndpointOptions {
            exclude: vec![Verb::Delete],
            path_segment: Some("customers".into()),
            ..EndpointOptions::default()
        },
    )?;

    if let Some(gate) = api.authenticator() {
        let token = gate.issue("demo").await?;
        tracing::info!(token = %token.value, "demo token for /company/ routes");
    }

    api.serve(&config.bind_addr).await?;
    Ok(())
}
