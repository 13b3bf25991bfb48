#[macro_use]
extern crate rocket;

pub mod compose;
pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod mutate;
pub mod owner;
pub mod request_logger;
pub mod routes;
pub mod store;
pub mod thread_link;
pub mod transport;

use crate::db::UniboxDb;
use crate::request_logger::RequestLogger;
use crate::transport::{MailTransport, SmtpMailer};
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use std::sync::{Arc, Once};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// Apply pending schema migrations. Idempotent; already-applied migrations
/// are verified and skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    // Configure CORS for the dashboard UI
    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    rocket::build()
        .attach(RequestLogger)
        .attach(UniboxDb::init())
        .attach(cors)
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match UniboxDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Clone the pool into managed state and wire up the SMTP transport
        .attach(AdHoc::try_on_ignite(
            "Manage DB Pool and Mail Transport",
            |rocket| async move {
                match UniboxDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        let transport: Arc<dyn MailTransport> = Arc::new(SmtpMailer);
                        Ok(rocket.manage(pool).manage(transport))
                    }
                    None => Err(rocket),
                }
            },
        ))
        .mount(
            "/api",
            routes![
                routes::health::health_check,
                routes::unibox::list_unibox,
                routes::unibox::get_unread_count,
                routes::unibox::get_record,
                routes::unibox::mutate_record,
                routes::unibox::reply_to_record,
            ],
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use sqlx::PgPool;
    use std::sync::Arc;

    pub use database::{TestDatabase, TestDatabaseError};
    pub use mail::MockTransport;

    use crate::transport::MailTransport;

    /// Seed helpers for the tables the mailbox joins against.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
    }

    impl<'a> TestFixtures<'a> {
        pub fn new(pool: &'a PgPool) -> Self {
            Self { pool }
        }

        /// Insert a sending account, with or without SMTP credentials.
        pub async fn insert_account(
            &self,
            owner_id: i64,
            email: &str,
            with_smtp: bool,
        ) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO email_accounts \
                 (owner_id, email, smtp_host, smtp_port, smtp_username, smtp_password) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
            )
            .bind(owner_id)
            .bind(email)
            .bind(with_smtp.then(|| "smtp.example.com".to_string()))
            .bind(with_smtp.then_some(587))
            .bind(with_smtp.then(|| email.to_string()))
            .bind(with_smtp.then(|| "app-password".to_string()))
            .fetch_one(self.pool)
            .await
        }

        pub async fn insert_contact(&self, owner_id: i64, email: &str) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO contacts (owner_id, email, first_name) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(owner_id)
            .bind(email)
            .bind("Test")
            .fetch_one(self.pool)
            .await
        }

        pub async fn insert_campaign(&self, owner_id: i64, name: &str) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO campaigns (owner_id, name) VALUES ($1, $2) RETURNING id",
            )
            .bind(owner_id)
            .bind(name)
            .fetch_one(self.pool)
            .await
        }

        /// Insert a delivered sent record.
        pub async fn insert_sent(
            &self,
            owner_id: i64,
            account_id: i64,
            subject: &str,
            sent_at: chrono::DateTime<chrono::Utc>,
        ) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO sent_emails \
                 (owner_id, email_account_id, from_address, to_address, subject, content, \
                  message_id, status, sent_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 'sent', $8) RETURNING id",
            )
            .bind(owner_id)
            .bind(account_id)
            .bind("me@example.com")
            .bind("them@example.com")
            .bind(subject)
            .bind("outbound body")
            .bind(format!("<{}@example.com>", uuid::Uuid::new_v4()))
            .bind(sent_at)
            .fetch_one(self.pool)
            .await
        }

        /// Insert an unread inbox record and return its id.
        pub async fn insert_received(
            &self,
            owner_id: i64,
            account_id: i64,
            subject: &str,
            received_at: chrono::DateTime<chrono::Utc>,
        ) -> Result<i64, sqlx::Error> {
            self.insert_received_with_message_id(
                owner_id,
                account_id,
                subject,
                received_at,
                &format!("<{}@example.com>", uuid::Uuid::new_v4()),
            )
            .await
        }

        pub async fn insert_received_with_message_id(
            &self,
            owner_id: i64,
            account_id: i64,
            subject: &str,
            received_at: chrono::DateTime<chrono::Utc>,
            message_id: &str,
        ) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar(
                "INSERT INTO received_emails \
                 (owner_id, email_account_id, from_address, to_address, subject, content, \
                  message_id, received_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            )
            .bind(owner_id)
            .bind(account_id)
            .bind("them@example.com")
            .bind("me@example.com")
            .bind(subject)
            .bind("inbound body")
            .bind(message_id)
            .bind(received_at)
            .fetch_one(self.pool)
            .await
        }
    }

    pub mod database {
        use sqlx::postgres::PgPoolOptions;
        use sqlx::PgPool;
        use testcontainers::{core::WaitFor, GenericImage, ImageExt};
        use testcontainers_modules::testcontainers::{
            core::error::TestcontainersError, runners::AsyncRunner, ContainerAsync,
        };
        use thiserror::Error;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Ephemeral Postgres for integration tests: one disposable container
        /// per database, migrated on creation.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgres", "16-alpine")
                    .with_wait_for(WaitFor::message_on_stdout(
                        "database system is ready to accept connections",
                    ))
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let request = image
                    .with_env_var("POSTGRES_DB", "unibox")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres");

                let container = request.start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/unibox", host, port);

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(&url)
                    .await?;

                crate::MIGRATOR
                    .run(&pool)
                    .await
                    .map_err(sqlx::Error::from)?;

                Ok(Self {
                    pool: Some(pool),
                    container: Some(container),
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and discard the container.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }
                if let Some(container) = self.container.take() {
                    drop(container);
                }
                Ok(())
            }
        }
    }

    pub mod mail {
        use std::sync::Mutex;

        use crate::models::EmailAccount;
        use crate::transport::{MailTransport, OutgoingMessage, TransportError};

        /// In-memory transport double. Records every message it is asked to
        /// deliver and either echoes the minted message id or fails with a
        /// configured error.
        pub struct MockTransport {
            fail_with: Option<String>,
            pub sent: Mutex<Vec<OutgoingMessage>>,
        }

        impl MockTransport {
            pub fn succeeding() -> Self {
                Self {
                    fail_with: None,
                    sent: Mutex::new(Vec::new()),
                }
            }

            pub fn failing(error: &str) -> Self {
                Self {
                    fail_with: Some(error.to_string()),
                    sent: Mutex::new(Vec::new()),
                }
            }

            pub fn deliveries(&self) -> Vec<OutgoingMessage> {
                self.sent.lock().expect("mock transport lock").clone()
            }
        }

        #[rocket::async_trait]
        impl MailTransport for MockTransport {
            async fn send(
                &self,
                _account: &EmailAccount,
                message: &OutgoingMessage,
            ) -> Result<String, TransportError> {
                self.sent
                    .lock()
                    .expect("mock transport lock")
                    .push(message.clone());

                match &self.fail_with {
                    Some(error) => Err(TransportError::Smtp(error.clone())),
                    None => Ok(message.message_id.clone()),
                }
            }
        }
    }

    /// Builder for Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        pg_pool: Option<PgPool>,
        transport: Option<Arc<dyn MailTransport>>,
    }

    impl TestRocketBuilder {
        /// Random port, logging off.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                pg_pool: None,
                transport: None,
            }
        }

        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api".to_string(), routes));
            self
        }

        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        pub fn manage_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
            self.transport = Some(transport);
            self
        }

        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            if let Some(transport) = self.transport {
                rocket = rocket.manage(transport);
            }

            rocket
        }

        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
