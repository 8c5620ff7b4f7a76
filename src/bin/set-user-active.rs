/// Enable or disable a user account
///
/// Usage: set-user-active --login USERNAME_OR_EMAIL [--disable]
///
/// A disabled account can no longer log in or refresh, and its existing
/// access tokens are rejected on the next request.

use clap::Parser;

use taskgroups_api::{
    config::Config,
    db::{self, PgStore},
    services::auth::AuthService,
};

#[derive(Parser)]
#[command(name = "set-user-active", about = "Enable or disable a user account")]
struct Args {
    /// Username or email address
    #[arg(long)]
    login: String,

    /// Disable the account instead of enabling it
    #[arg(long)]
    disable: bool,
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

    let profile = AuthService::set_active(&store, &args.login, !args.disable).await?;
    tracing::info!(
        "User {} ({}) is now {}",
        profile.username,
        profile.id,
        if profile.is_active { "active" } else { "disabled" }
    );

    Ok(())
}
