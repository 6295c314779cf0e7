use clap::Parser;
use anyhow::Context;
use todo_api::{
    auth::JwtKeys,
    config::{token_ttl, AppConfig},
};

/// Issue a bearer token for a user id, signed with the configured JWT_SECRET.
#[derive(Parser)]
#[command(name = "mint-token")]
struct Args {
    /// Owner identity embedded in the token.
    user_id: String,
    /// Token lifetime in hours (defaults to JWT_EXPIRY_HOURS).
    #[arg(long)]
    hours: Option<i64>,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let config = AppConfig::from_env();
    let keys = match args.hours {
        Some(hours) => {
            let ttl = token_ttl(hours).with_context(|| format!("--hours {hours} is not a usable token lifetime"))?;
            JwtKeys::new(&config.jwt_secret, ttl)
        }
        None => config.jwt_keys(),
    };
    println!("{}", keys.issue(&args.user_id)?);
    Ok(())
}
