use clap::Parser;
use dotenvy::dotenv;
use std::env;
use upload_ingest::utils::auth::issue_token;

/// Signs an HS256 bearer token with JWT_SECRET_KEY for calling /upload.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Subject claim
    #[arg(short, long, default_value = "uploader")]
    subject: String,

    /// Token lifetime in hours
    #[arg(long, default_value_t = 24)]
    ttl_hours: i64,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let secret = env::var("JWT_SECRET_KEY")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET_KEY must be set"))?;

    let token = issue_token(&args.subject, &secret, chrono::Duration::hours(args.ttl_hours))?;
    println!("{token}");
    Ok(())
}
