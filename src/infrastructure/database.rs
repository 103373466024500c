use crate::entities::{files, users};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(50)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    // Every pooled connection to an in-memory sqlite database is a separate database
    if db_url.contains(":memory:") {
        opt.max_connections(1);
    }

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Creates tables and indexes from the entity definitions when missing.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    info!("🔄 Running SeaORM schema sync...");
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables = vec![
        schema
            .create_table_from_entity(users::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(files::Entity)
            .if_not_exists()
            .to_owned(),
    ];
    for stmt in tables {
        db.execute(builder.build(&stmt)).await?;
    }

    for mut stmt in schema.create_index_from_entity(files::Entity) {
        stmt.if_not_exists();
        db.execute(builder.build(&stmt)).await?;
    }

    Ok(())
}
