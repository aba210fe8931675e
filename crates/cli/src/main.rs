use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cafebot")]
#[command(about = "Cafebot CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config.json and profile.json from a bundled preset).
    Init {
        /// Config file path (default: CAFEBOT_CONFIG_PATH or ~/.cafebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Bundled profile preset to seed profile.json with ("cafe" or "polyphony").
        #[arg(long, default_value = "cafe")]
        preset: String,
    },

    /// Run the webhook server.
    Serve {
        /// Config file path (default: CAFEBOT_CONFIG_PATH or ~/.cafebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run one message through the bot and print the reply it would send.
    Ask {
        /// Config file path (default: CAFEBOT_CONFIG_PATH or ~/.cafebot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Sender id the message is attributed to.
        #[arg(long, default_value = "local")]
        sender: String,

        /// Message text.
        text: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("cafebot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config, preset }) => {
            if let Err(e) = run_init(config, &preset) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            sender,
            text,
        }) => {
            if let Err(e) = run_ask(config, sender, text).await {
                log::error!("ask failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>, preset: &str) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path, preset)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config, path).await
}

async fn run_ask(
    config_path: Option<std::path::PathBuf>,
    sender: String,
    text: String,
) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    let bot = lib::gateway::build_bot(&config, &path)?;
    let event = lib::channels::InboundEvent::new(sender, text, "");
    match bot.respond(&event).await {
        Some(reply) => {
            let message = lib::channels::line::line_message(&reply);
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        None => println!("(no reply)"),
    }
    Ok(())
}
