//! Test server management.
//!
//! Spawns and manages supportlined instances for integration testing. Each
//! instance gets its own temporary directory holding the config file and
//! the SQLite directory database.

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// Knobs the integration tests turn.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub allow_origins: Vec<String>,
    pub ping_secs: u64,
    pub timeout_secs: u64,
    pub max_message_bytes: usize,
    pub http_side_port: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            ping_secs: 25,
            timeout_secs: 20,
            max_message_bytes: 4096,
            http_side_port: false,
        }
    }
}

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    http_port: Option<u16>,
    db_path: PathBuf,
    _data_dir: TempDir,
}

/// Ask the OS for a port nobody is listening on.
fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

impl TestServer {
    /// Spawn a server with default options.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with(ServerOptions::default()).await
    }

    /// Spawn a server with the given options.
    pub async fn spawn_with(options: ServerOptions) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let port = free_port()?;
        let http_port = if options.http_side_port {
            Some(free_port()?)
        } else {
            None
        };
        let db_path = data_dir.path().join("directory.db");

        let origins = options
            .allow_origins
            .iter()
            .map(|o| format!("{o:?}"))
            .collect::<Vec<_>>()
            .join(", ");

        let config_path = data_dir.path().join("config.toml");
        let config_content = format!(
            r#"
[server]
name = "test.supportline"
metrics_port = {metrics_port}

[listen]
address = "127.0.0.1:{port}"
allow_origins = [{origins}]

[database]
path = {db_path:?}

[limits]
max_message_bytes = {max_message_bytes}

[timeouts]
ping = {ping}
timeout = {timeout}
"#,
            metrics_port = http_port.unwrap_or(0),
            db_path = db_path.display().to_string(),
            max_message_bytes = options.max_message_bytes,
            ping = options.ping_secs,
            timeout = options.timeout_secs,
        );
        std::fs::write(&config_path, config_content)?;

        let child = Command::new(env!("CARGO_BIN_EXE_supportlined"))
            .arg(&config_path)
            .env("RUST_LOG", "supportlined=debug,info")
            .spawn()?;

        let server = Self {
            child,
            port,
            http_port,
            db_path,
            _data_dir: data_dir,
        };

        server.wait_until_ready(server.port).await?;
        if let Some(http_port) = server.http_port {
            server.wait_until_ready(http_port).await?;
        }

        Ok(server)
    }

    /// Wait until the server is accepting connections on `port`.
    async fn wait_until_ready(&self, port: u16) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to listen on {port} within 5 seconds")
    }

    /// Get the WebSocket listener address.
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Get the HTTP side-port address, if enabled.
    #[allow(dead_code)]
    pub fn http_address(&self) -> Option<String> {
        self.http_port.map(|p| format!("127.0.0.1:{p}"))
    }

    /// Create a new test client connected to this server.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.address()).await
    }

    /// Open the server's directory database for row checks.
    #[allow(dead_code)]
    pub async fn db(&self) -> anyhow::Result<SqlitePool> {
        let options = SqliteConnectOptions::new()
            .filename(&self.db_path)
            .busy_timeout(Duration::from_secs(5));
        Ok(SqlitePool::connect_with(options).await?)
    }

    /// Availability flag of a directory row, `None` if there is no row.
    #[allow(dead_code)]
    pub async fn is_available(&self, name: &str) -> anyhow::Result<Option<bool>> {
        let pool = self.db().await?;
        let available = sqlx::query_scalar("SELECT is_available FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&pool)
            .await?;
        pool.close().await;
        Ok(available)
    }

    /// Poll a directory row until its availability equals `expected`.
    #[allow(dead_code)]
    pub async fn wait_for_availability(&self, name: &str, expected: bool) -> anyhow::Result<()> {
        for _ in 0..40 {
            if self.is_available(name).await? == Some(expected) {
                return Ok(());
            }
            sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("{name} never became is_available={expected}")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
