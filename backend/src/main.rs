use tracing::error;

#[tokio::main]
async fn main() {
    #[cfg(feature = "migrate")]
    {
        let config = server::config::Config::load();
        if let Err(e) = migrate::migrate_file(&config.database_path, migrate::Migration::All) {
            eprintln!("Migration failed: {e:#}");
            std::process::exit(1);
        }
    }

    if let Err(e) = server::start_server().await {
        error!("Server failed: {e}");
        std::process::exit(1);
    }
}
