//! Creates or resets an administrator account directly in the store.

use clap::{Arg, Command};

use download_gate::db::{self, SqliteStore};
use download_gate::{config, provision};

fn command() -> Command {
    Command::new("init-admin")
        .about("Create or reset a download-gate administrator")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("user")
                .short('u')
                .long("user")
                .help("The user to create")
                .default_value("admin"),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .help("The password to set")
                .env("DOWNLOAD_GATE_ADMIN_PASSWORD")
                .required(true),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
    ).init();

    let matches = command().get_matches();
    let user = matches
        .get_one::<String>("user")
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --user"))?;
    let password = matches
        .get_one::<String>("password")
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --password"))?;

    let cfg = config::load()?;
    let pool = db::connect(&cfg.database.url).await?;
    let store = SqliteStore::new(pool);
    let admin = provision::provision_admin(&store, user, password).await?;
    println!("Administrator {} is ready", admin.username);
    Ok(())
}
