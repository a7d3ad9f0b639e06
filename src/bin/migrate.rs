use std::env;
use std::io::{self, Write};

use anyhow::{anyhow, bail, Result};
use productivity_bot::config::DEFAULT_DATABASE_URL;
use productivity_bot::database::connection::{sqlite_path, DatabaseManager, SCHEMA_TABLES};

const USAGE: &str = "\
Productivity Bot database tool

USAGE:
    migrate [up|check|reset [--yes]|help]

COMMANDS:
    up       Apply pending migrations (default, alias: migrate)
    check    Connect and report which schema tables exist
    reset    Delete the SQLite file and migrate from scratch
    help     Show this message

ENVIRONMENT:
    DATABASE_URL   defaults to sqlite:./data/productivity.db";

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Up,
    Check,
    Reset { confirmed: bool },
    Help,
}

impl Action {
    fn from_args(args: &[String]) -> Result<Self> {
        let confirmed = args.iter().skip(1).any(|arg| arg == "--yes" || arg == "-y");
        match args.first().map(String::as_str) {
            None | Some("up") | Some("migrate") => Ok(Action::Up),
            Some("check") => Ok(Action::Check),
            Some("reset") => Ok(Action::Reset { confirmed }),
            Some("help") | Some("--help") | Some("-h") => Ok(Action::Help),
            Some(other) => Err(anyhow!("unknown command '{other}'")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let action = match Action::from_args(&args) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let url = database_url();
    match action {
        Action::Help => println!("{USAGE}"),
        Action::Up => up(&url).await?,
        Action::Check => check(&url).await?,
        Action::Reset { confirmed } => reset(&url, confirmed).await?,
    }
    Ok(())
}

fn database_url() -> String {
    env::var("DATABASE_URL")
        .ok()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

async fn up(url: &str) -> Result<()> {
    println!("🚀 Migrating {url}");
    let db = DatabaseManager::new(url).await?;
    db.run_migrations().await?;
    println!("✅ Schema is up to date ({} tables)", SCHEMA_TABLES.len());
    Ok(())
}

async fn check(url: &str) -> Result<()> {
    println!("🔍 Checking {url}");
    let db = DatabaseManager::new(url).await?;

    let present = db.table_names().await?;
    let missing = db.missing_tables().await?;
    for table in SCHEMA_TABLES {
        let mark = if missing.contains(&table) { "❌" } else { "✅" };
        println!("  {mark} {table}");
    }

    let extra: Vec<&String> = present
        .iter()
        .filter(|name| !SCHEMA_TABLES.iter().any(|table| table == name) && !name.starts_with("_sqlx"))
        .collect();
    if !extra.is_empty() {
        println!("  ℹ️  other tables: {}", extra.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "));
    }

    if missing.is_empty() {
        println!("Schema complete.");
    } else {
        println!("{} table(s) missing, run `migrate up`.", missing.len());
    }
    Ok(())
}

async fn reset(url: &str, confirmed: bool) -> Result<()> {
    let Some(path) = sqlite_path(url) else {
        bail!("reset only works on SQLite database files, got {url}");
    };

    if !confirmed && !confirm(&format!("Delete {} and every row in it?", path.display()))? {
        println!("Reset cancelled.");
        return Ok(());
    }

    if path.exists() {
        std::fs::remove_file(&path)?;
        println!("🗑  Removed {}", path.display());
    }
    up(url).await
}

fn confirm(question: &str) -> Result<bool> {
    print!("⚠️  {question} Type 'yes' to continue: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}
