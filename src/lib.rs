#[macro_use]
extern crate rocket;

pub mod auth;
pub mod db;
pub mod error;
pub mod request_logger;
pub mod routes;

use crate::auth::{AuthConfig, AuthState, LogMailer, PasswordService, PgCredentialStore};
use crate::db::MarketplaceDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

fn cors_options() -> CorsOptions {
    CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![Method::Get, Method::Post, Method::Options]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allow_credentials(true)
}

fn api_docs_urls() -> Vec<UrlObject> {
    vec![
        UrlObject::new("Accounts", "../../v1/user/openapi.json"),
        UrlObject::new("Health", "../../v1/openapi.json"),
    ]
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let mut rocket = rocket::build()
        .attach(RequestLogger)
        .attach(MarketplaceDb::init());

    match cors_options().to_cors() {
        Ok(cors) => rocket = rocket.attach(cors),
        Err(err) => log::error!("invalid CORS options, CORS disabled: {}", err),
    }

    rocket
        // Run database migrations on startup
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match MarketplaceDb::fetch(&rocket) {
                Some(pool) => match db::run_migrations(pool).await {
                    Ok(_) => {
                        log::info!("database migrations successful");
                        Ok(rocket)
                    }
                    Err(e) => {
                        log::error!("database migrations failed: {}", e);
                        Err(rocket)
                    }
                },
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::try_on_ignite("Auth State", |rocket| async move {
            let pool = match MarketplaceDb::fetch(&rocket) {
                Some(db) => (**db).clone(),
                None => {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                }
            };

            let state = AuthConfig::from_env().and_then(|config| {
                AuthState::new(
                    config,
                    PasswordService::new()?,
                    Arc::new(PgCredentialStore::new(pool)),
                    Arc::new(LogMailer),
                    auth::routes::role_table(),
                )
            });

            match state {
                Ok(state) => Ok(rocket.manage(state)),
                Err(err) => {
                    log::error!("failed to initialise auth state: {}", err);
                    Err(rocket)
                }
            }
        }))
        // Evict expired verification codes in the background
        .attach(AdHoc::on_liftoff("Spawn OTP Sweeper", |rocket| {
            Box::pin(async move {
                match rocket.state::<AuthState>() {
                    Some(state) => {
                        let registry = state.otp_registry.clone();
                        let every = std::time::Duration::from_secs(
                            state.config.otp_sweep_interval_secs.unsigned_abs(),
                        );
                        tokio::spawn(async move {
                            log::info!("starting otp sweeper every {:?}", every);
                            auth::otp::run_sweeper(registry, every).await
                        });
                    }
                    None => log::error!("failed to spawn otp sweeper: auth state not found"),
                }
            })
        }))
        .register("/", error::catchers())
        .mount("/api/v1", openapi_get_routes![routes::health::health_check])
        .mount(auth::routes::USER_BASE, auth::routes::routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                urls: api_docs_urls(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: api_docs_urls(),
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use std::sync::Arc;

    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};

    use crate::auth::account::{Region, Role};
    use crate::auth::{
        AuthConfig, AuthState, MemoryCredentialStore, MemoryMailer, PasswordService,
    };
    use crate::request_logger::RequestLogger;

    pub use database::{TestDatabase, TestDatabaseError};

    /// Auth configuration with short, deterministic values for tests.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            issuer: "https://marketplace.test".into(),
            audience: "marketplace-api".into(),
            jwt_secret: "integration-test-secret-0123456789abcdef".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 604800,
            otp_ttl_secs: 1200,
            otp_digits: 6,
            otp_max_attempts: 5,
            otp_sweep_interval_secs: 300,
            allowed_email_domains: Vec::new(),
            self_register_roles: Role::ALL.to_vec(),
        }
    }

    /// In-memory auth wiring: store seeded with region 1 and a recording mailer.
    pub struct MemoryAuth {
        pub state: AuthState,
        pub store: Arc<MemoryCredentialStore>,
        pub mailer: Arc<MemoryMailer>,
    }

    impl MemoryAuth {
        pub fn new() -> Self {
            Self::with_config(test_auth_config())
        }

        pub fn with_config(config: AuthConfig) -> Self {
            let store = Arc::new(MemoryCredentialStore::with_regions([Region {
                id: 1,
                name: "Tashkent".into(),
            }]));
            let mailer = Arc::new(MemoryMailer::new());
            let state = AuthState::new(
                config,
                PasswordService::with_cost(1024, 1, 1).expect("cheap argon2 params"),
                store.clone(),
                mailer.clone(),
                crate::auth::routes::role_table(),
            )
            .expect("auth state");

            Self {
                state,
                store,
                mailer,
            }
        }

        /// Most recent verification code mailed to `email`.
        pub fn emailed_code(&self, email: &str) -> Option<String> {
            let mail = self.mailer.last_to(email)?;
            mail.body
                .split_whitespace()
                .map(|word| word.trim_end_matches('.'))
                .find(|word| word.len() >= 4 && word.chars().all(|c| c.is_ascii_digit()))
                .map(str::to_string)
        }
    }

    impl Default for MemoryAuth {
        fn default() -> Self {
            Self::new()
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::ContainerAsync;
        use testcontainers::core::error::TestcontainersError;
        use testcontainers::runners::AsyncRunner;
        use testcontainers_modules::postgres::Postgres;
        use thiserror::Error;

        use crate::db::MIGRATOR;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Disposable Postgres container with migrations applied.
        pub struct TestDatabase {
            pool: PgPool,
            _container: ContainerAsync<Postgres>,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().start().await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let options: PgConnectOptions = url.parse()?;
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(options.log_statements(LevelFilter::Off))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool,
                    _container: container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                &self.pool
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool.clone()
            }

            /// Close pool connections; the container is removed on drop.
            pub async fn close(self) {
                self.pool.close().await;
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        auth_state: Option<AuthState>,
        catchers: bool,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                ..Default::default()
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(self, routes: Vec<Route>) -> Self {
            self.mount("/api/v1", routes)
        }

        /// Mount the account routes at their production base.
        pub fn mount_user_routes(self) -> Self {
            self.mount(
                crate::auth::routes::USER_BASE,
                crate::auth::routes::routes(),
            )
        }

        pub fn mount(mut self, base: &str, routes: Vec<Route>) -> Self {
            self.mounts.push((base.to_string(), routes));
            self
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        /// Register the JSON error catchers.
        pub fn with_catchers(mut self) -> Self {
            self.catchers = true;
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).attach(RequestLogger);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            if self.catchers {
                rocket = rocket.register("/", crate::error::catchers());
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
