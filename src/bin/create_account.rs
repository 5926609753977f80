use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use marketplace_api::auth::account::{
    AccountStatus, NewAccount, Role, is_well_formed_email, normalize_email,
};
use marketplace_api::auth::{CredentialStore, PasswordService, PgCredentialStore};
use marketplace_api::db;

#[derive(Parser, Debug)]
#[command(
    name = "create_account",
    about = "Create an already verified marketplace account"
)]
struct Args {
    /// Email address for the account (case insensitive).
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this account.
    #[arg(long)]
    password: String,

    #[arg(long)]
    first_name: String,

    #[arg(long)]
    last_name: String,

    /// Role to assign (`USER`, `ADMIN` or `SUPER_ADMIN`).
    #[arg(long, default_value = "USER")]
    role: String,

    /// Existing region id.
    #[arg(long, default_value_t = 1)]
    region_id: i32,

    #[arg(long, default_value_t = 2000)]
    birth_year: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let email = normalize_email(&args.email);

    if !is_well_formed_email(&email) {
        writeln!(io::stderr(), "error: '{email}' is not a valid email address")?;
        std::process::exit(1);
    }

    let role = match args.role.trim().to_uppercase().parse::<Role>() {
        Ok(role) => role,
        Err(_) => {
            writeln!(
                io::stderr(),
                "error: unsupported role '{}'. Use USER, ADMIN or SUPER_ADMIN.",
                args.role
            )?;
            std::process::exit(1);
        }
    };

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    db::run_migrations(&pool).await?;

    let store = PgCredentialStore::new(pool);

    if store.find_region(args.region_id).await?.is_none() {
        writeln!(io::stderr(), "error: region {} does not exist", args.region_id)?;
        std::process::exit(1);
    }

    let password_hash = PasswordService::new()?.hash(&args.password)?;

    let account = store
        .create(NewAccount {
            first_name: args.first_name,
            last_name: args.last_name,
            email,
            password_hash,
            role,
            status: AccountStatus::Active,
            region_id: args.region_id,
            birth_year: args.birth_year,
            picture: String::new(),
        })
        .await?;

    println!(
        "Created {} account '{}' with id {}",
        account.role, account.email, account.id
    );
    Ok(())
}
