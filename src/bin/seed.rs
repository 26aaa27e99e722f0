use hospital_portal::{
    config::AppConfig,
    repository::PostgresRepository,
    seed,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Loads the default doctor directory into the database named by `DATABASE_URL`.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hospital_portal=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_url = config
        .db_url
        .expect("FATAL: DATABASE_URL is required to seed the database");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations");

    let repo = PostgresRepository::new(pool);
    match seed::seed_doctors(&repo).await {
        Ok(inserted) => println!("{inserted} doctores precargados"),
        Err(err) => {
            eprintln!("error al precargar doctores: {err}");
            std::process::exit(1);
        }
    }
}
