pub mod agent_core;
pub mod api;
pub mod config;
pub mod inference;
pub mod mcp_client;

use agent_core::AgentSettings;
use config::AgentConfig;
use inference::{InferenceClient, InferenceError};
use mcp_client::{McpClient, ToolRegistry, TransportKind};

/// Everything a request handler needs, built once at startup.
///
/// The registry is read-only after `initialize`, so handlers share the
/// context through an `Arc` without locking.
pub struct AppContext {
    pub registry: ToolRegistry<McpClient>,
    pub llm: InferenceClient,
    pub settings: AgentSettings,
}

impl AppContext {
    pub fn new(
        registry: ToolRegistry<McpClient>,
        llm: InferenceClient,
        settings: AgentSettings,
    ) -> Self {
        Self {
            registry,
            llm,
            settings,
        }
    }

    /// Build clients for every configured server and run their handshakes.
    ///
    /// A server without a URL, with an unknown transport, or whose handshake
    /// fails is skipped with a warning; startup continues without its tools.
    pub async fn initialize(config: &AgentConfig) -> Result<Self, InferenceError> {
        let mut registry = ToolRegistry::new();

        for server in &config.servers {
            let Some(url) = server.url.as_deref() else {
                tracing::warn!(server = %server.name, "no URL configured, tools unavailable");
                continue;
            };

            let client = server
                .transport
                .parse::<TransportKind>()
                .and_then(|kind| McpClient::new(&server.name, url, kind));

            match client {
                Ok(client) => {
                    tracing::info!(server = %server.name, url, transport = %server.transport, "MCP server configured");
                    registry.add_client(client);
                }
                Err(e) => {
                    tracing::warn!(server = %server.name, error = %e, "skipping misconfigured MCP server");
                }
            }
        }

        registry.initialize_all().await;

        let llm = InferenceClient::new(&config.model)?;
        tracing::info!(
            model = llm.model_name(),
            endpoint = llm.endpoint(),
            tools = registry.len(),
            "startup complete"
        );

        Ok(Self::new(registry, llm, config.agent_settings()))
    }
}

/// Initialize the tracing subscriber on stdout.
///
/// `RUST_LOG` overrides the default filter; `LOG_FORMAT=json` switches to
/// one JSON object per event.
pub fn init_tracing() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pipeline_agent=info,warn"));

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::fmt().with_env_filter(filter).json().init();
    } else {
        fmt::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "=== pipeline-agent starting ==="
    );
}
