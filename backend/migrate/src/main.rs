use std::path::PathBuf;

use clap::Parser;
use migrate::Migration;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "DATABASE_PATH", default_value = "restaurants.db")]
    database: PathBuf,

    #[arg(value_enum, default_value_t = Migration::All)]
    migration: Migration,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    migrate::migrate_file(&args.database, args.migration)
}
