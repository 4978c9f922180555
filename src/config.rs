use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants.
pub const APP_NAME: &str = "Veridex";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "veridex=info,tower_http=info".to_string()
}

/// Application data directory (`~/Veridex` on all platforms).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Default SQLite database path under the application data directory.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("veridex.db")
}

/// Address the HTTP API binds to.
pub fn bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
