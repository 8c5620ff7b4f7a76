/// Create a user account from the command line
///
/// Usage: create-user --username NAME --email EMAIL --password PASSWORD [--name N] [--surname S]
///
/// Reads DATABASE_URL, JWT_SECRET and JWT_REFRESH_SECRET like the API server
/// and runs pending migrations first.

use clap::Parser;

use taskgroups_api::{
    config::Config,
    db::{self, PgStore},
    models::user::SignupRequest,
    services::auth::AuthService,
};

#[derive(Parser)]
#[command(name = "create-user", about = "Create a user account in the taskgroups database")]
struct Args {
    #[arg(long)]
    username: String,

    #[arg(long)]
    email: String,

    #[arg(long)]
    password: String,

    /// Given name (optional)
    #[arg(long)]
    name: Option<String>,

    /// Family name (optional)
    #[arg(long)]
    surname: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);

    let req = SignupRequest {
        username: args.username,
        email: args.email,
        password: args.password,
        name: args.name,
        surname: args.surname,
    };
    let profile = AuthService::signup(&store, &config, &req).await?;
    tracing::info!("Created user {} ({})", profile.username, profile.id);

    Ok(())
}
