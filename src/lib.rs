pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod room_registry;
pub mod store;
pub mod wire;

use std::env;
use std::sync::Arc;

use dispatcher::Dispatcher;
use store::Store;
use tokio::net::TcpListener;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5001;

/// Opens (or creates) the database at `db_path` and binds `host:port`,
/// returning a ready-to-run server. Panics if the store fails to migrate or
/// the address can't be bound -- both are startup-fatal.
pub async fn server_with_db(host: &str, port: u16, db_path: &str) -> (Arc<Dispatcher>, TcpListener) {
    let store = Arc::new(Store::new(db_path));
    let dispatcher = Dispatcher::new(store);
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));
    println!("listening on {addr}");
    (dispatcher, listener)
}

/// `DATABASE_PATH` is honored as an env fallback; callers (the CLI) should
/// prefer an explicit `--db` flag when present.
pub fn database_path_from_env() -> String {
    env::var("DATABASE_PATH").unwrap_or_else(|_| "conchat.db".to_string())
}
