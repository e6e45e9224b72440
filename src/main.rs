use clap::Parser;
use conchat::{database_path_from_env, server_with_db, DEFAULT_HOST, DEFAULT_PORT};

/// Multi-room chat server: TCP, newline-delimited JSON, SQLite-backed.
#[derive(Debug, Parser)]
#[command(name = "run_server")]
struct Cli {
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Overrides the DATABASE_PATH environment variable when set.
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let db_path = cli.db.unwrap_or_else(database_path_from_env);

    let (dispatcher, listener) = server_with_db(&cli.host, cli.port, &db_path).await;

    tokio::select! {
        _ = dispatcher.serve(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("shutting down");
        }
    }
}
