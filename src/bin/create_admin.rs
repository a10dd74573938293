//! Seeds (or promotes) an admin user. Admins are never created through the
//! public API; run this once against a fresh database:
//!
//! ```text
//! ADMIN_EMAIL=admin@example.com ADMIN_PASSWORD=... cargo run --bin create_admin
//! ```

use sqlx::postgres::PgPoolOptions;
use sqlx::types::Uuid;
use sqlx::Row;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let email = std::env::var("ADMIN_EMAIL").expect("ADMIN_EMAIL must be set");
    let password = std::env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD must be set");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("failed to connect to Postgres");

    let password_hash =
        bcrypt::hash(&password, bcrypt::DEFAULT_COST).expect("password hashing failed");

    let row = sqlx::query(
        "INSERT INTO users (email, password_hash, role)
         VALUES ($1, $2, 'admin'::user_role)
         ON CONFLICT (email) DO UPDATE
         SET password_hash = EXCLUDED.password_hash, role = 'admin'::user_role
         RETURNING id",
    )
    .bind(email.trim().to_lowercase())
    .bind(&password_hash)
    .fetch_one(&pool)
    .await
    .expect("failed to upsert admin user");

    let id: Uuid = row.get("id");
    println!("admin user ready: {id}");
}
