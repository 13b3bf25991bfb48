use rocket_db_pools::{sqlx, Database};

#[derive(Database)]
#[database("unibox_db")]
pub struct UniboxDb(sqlx::PgPool);
