use clap::Parser;
use color_eyre::Result;
use goaltrack::cli::{self, Cli, Context};
use goaltrack::{Config, Database, Engine, OwnerId, Profile};
use std::path::Path;

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from_path(Path::new(path), profile)?,
        None => Config::load_with_profile(profile)?,
    };

    // RUST_LOG wins over the configured level; logs go to stderr so --json
    // output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
    config.warn_if_outdated();

    let db_path = config.get_database_path();
    let db = Database::new(
        db_path
            .to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
        config.busy_timeout(),
    )?;
    let engine = Engine::new(db);

    let ctx = Context {
        engine: &engine,
        owner: cli.owner.map(OwnerId).unwrap_or_else(|| config.owner()),
        default_category: config.default_category,
        json: cli.json,
    };
    cli::run(cli.command, &ctx)?;

    Ok(())
}
