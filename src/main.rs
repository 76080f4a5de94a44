//! aigrader - backend relay for the AI grader web client
//!
//! Accepts an image and a prompt from the browser, forwards them to an
//! OpenAI-compatible vision model, and returns the model's answer.

use aigrader::api::{CONNECTION_TEST_MAX_TOKENS, CONNECTION_TEST_PROMPT};
use aigrader::config::{ApiKey, Config, Sources};
use aigrader::gateway::{has_choices, CompletionRequest, Gateway};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "aigrader")]
#[command(about = "Backend relay between the AI grader web client and vision LLMs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = "aigrader.toml")]
        config: String,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and optionally test the LLM endpoint
    Check {
        /// Path to configuration file
        #[arg(short, long, default_value = "aigrader.toml")]
        config: String,

        /// Send a short text prompt to the configured endpoint
        #[arg(long)]
        ping: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aigrader=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            tracing::info!(config = %config, "Loading configuration");
            let (mut config, sources) = Config::load(&config)?;
            log_sources(&sources);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.server.listen = addr;
            }

            aigrader::api::run_server(config).await
        }

        Commands::Check { config, ping } => {
            tracing::info!(config = %config, "Checking configuration");
            let (config, sources) = Config::load(&config)?;

            println!("listen:       {}", config.server.listen);
            println!("cors origins: {}", config.server.cors_origins.join(", "));
            println!(
                "api url:      {} ({})",
                config.llm.api_url.as_deref().unwrap_or("<unset>"),
                sources.api_url
            );
            println!(
                "api key:      {} ({})",
                if config.llm.api_key.is_some() { "[REDACTED]" } else { "<unset>" },
                sources.api_key
            );
            println!("model:        {}", config.llm.model);
            println!("max tokens:   {}", config.llm.max_tokens);
            println!("timeout:      {}s", config.llm.timeout_secs);

            if ping {
                ping_endpoint(&config).await?;
            }
            Ok(())
        }
    }
}

fn log_sources(sources: &Sources) {
    tracing::info!(
        api_url = %sources.api_url,
        api_key = %sources.api_key,
        "Resolved LLM credentials"
    );
}

/// Run the connection-test prompt against the configured endpoint.
async fn ping_endpoint(config: &Config) -> anyhow::Result<()> {
    let gateway = Gateway::http()?;
    let request = CompletionRequest::new(
        config.llm.api_url.clone().unwrap_or_default(),
        config
            .llm
            .api_key
            .clone()
            .unwrap_or_else(|| ApiKey::from("")),
        config.llm.model.clone(),
        CONNECTION_TEST_PROMPT,
    )
    .with_max_tokens(CONNECTION_TEST_MAX_TOKENS)
    .with_timeout(config.llm.timeout());

    match gateway.complete_chat(&request).await {
        Ok(result) if has_choices(&result) => {
            println!("ping:         ok ({})", config.llm.model);
            Ok(())
        }
        Ok(_) => anyhow::bail!("Invalid response format from API"),
        Err(e) => anyhow::bail!(
            "{} [{}, status {}]{}",
            e.message,
            e.kind,
            e.status_code,
            e.details
                .as_deref()
                .map(|d| format!(": {}", d))
                .unwrap_or_default()
        ),
    }
}
