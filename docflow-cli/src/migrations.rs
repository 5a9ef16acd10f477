//! ABOUTME: Embedded schema bootstrap (§10.5 "ambient infrastructure, not a feature the
//! ABOUTME: Non-goal excludes"). Runs once at startup; CRUD migration tooling beyond this is out of scope.

use refinery::embed_migrations;

embed_migrations!("migrations");

/// Applies any migration not yet recorded in the target database.
pub async fn run(client: &mut tokio_postgres::Client) -> Result<(), refinery::Error> {
    migrations::runner().run_async(client).await?;
    Ok(())
}
