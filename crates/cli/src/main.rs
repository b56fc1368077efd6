use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relai")]
#[command(about = "relai CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay gateway (HTTP front for the streaming handler).
    Serve {
        /// Config file path (default: RELAI_CONFIG_PATH or ~/.relai/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15190)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Invoke the streaming handler once and print the response protocol to stdout.
    Invoke {
        /// User message to send to the model
        message: String,

        /// Config file path (default: RELAI_CONFIG_PATH or ~/.relai/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Model id override (else BEDROCK_MODEL_ID or config)
        #[arg(long, value_name = "ID")]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relai {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Invoke {
            message,
            config,
            model,
        }) => {
            if let Err(e) = run_invoke(config, message, model).await {
                log::error!("invoke failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_invoke(
    config_path: Option<std::path::PathBuf>,
    message: String,
    model: Option<String>,
) -> anyhow::Result<()> {
    let config = lib::config::load_config(config_path)?;
    let client = lib::llm::BedrockClient::new(
        lib::config::resolve_endpoint(&config),
        lib::config::resolve_bearer_token(&config),
    );
    let model_id = model
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| lib::config::resolve_model_id(&config));
    let params = lib::relay::RelayParams {
        model_id,
        inference: lib::config::inference_config(&config),
    };
    let event = lib::event::InvocationEvent::with_body(
        serde_json::json!({ "message": message }).to_string(),
    );
    let mut sink = lib::sink::StdoutSink::new();
    lib::relay::relay_invocation(&client, &params, &event, &mut sink).await?;
    Ok(())
}
