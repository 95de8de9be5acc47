use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "wabridge")]
#[command(about = "Website-visitor to WhatsApp relay bridge", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bridge (HTTP ingress + visitor WebSocket + channel connector).
    Gateway {
        /// Config file path (default: WABRIDGE_CONFIG_PATH or ~/.wabridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP and WebSocket port (default from config or 3001)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Send a one-off WhatsApp notification through a running bridge.
    Send {
        /// Recipient phone number ("07...", "+254..." or canonical)
        phone: String,

        /// Message text
        message: String,

        /// Bridge base URL (default: derived from config)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Config file path (default: WABRIDGE_CONFIG_PATH or ~/.wabridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Connect to a running bridge as a website visitor (interactive).
    Chat {
        /// Config file path (default: WABRIDGE_CONFIG_PATH or ~/.wabridge/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wabridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Send {
            phone,
            message,
            url,
            config,
        }) => {
            if let Err(e) = run_send(phone, message, url, config).await {
                log::error!("send failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    log::debug!("config loaded from {}", path.display());
    if let Some(p) = port {
        config.gateway.port = p;
    }
    lib::gateway::run_gateway(config).await
}

async fn run_send(
    phone: String,
    message: String,
    url: Option<String>,
    config_path: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let base = match url {
        Some(u) => u.trim_end_matches('/').to_string(),
        None => {
            let (config, _) = lib::config::load_config(config_path)?;
            format!(
                "http://{}:{}",
                config.gateway.bind.trim(),
                config.gateway.port
            )
        }
    };
    let endpoint = format!("{}/send-whatsapp", base);

    let client = reqwest::Client::new();
    let resp = client
        .post(&endpoint)
        .json(&serde_json::json!({ "phone": phone, "message": message }))
        .send()
        .await
        .with_context(|| format!("POST {}", endpoint))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.context("reading bridge response")?;
    if status.is_success() {
        println!("sent ({})", body["method"].as_str().unwrap_or("whatsapp"));
        Ok(())
    } else {
        anyhow::bail!(
            "bridge returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        )
    }
}

async fn run_chat(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let url = format!(
        "ws://{}:{}/ws",
        config.gateway.bind.trim(),
        config.gateway.port
    );
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .with_context(|| format!("connecting to {}", url))?;
    let (mut sink, mut stream) = ws.split();

    // Stdin gets its own thread; the async side selects between typed lines
    // and pushed frames so operator replies appear as they arrive.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<String>(4);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = line.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    if line_tx.blocking_send(text).is_err() {
                        break;
                    }
                }
            }
        }
    });

    println!("connected to {} — type a message, /exit to quit", url);
    loop {
        tokio::select! {
            line = line_rx.recv() => {
                let Some(text) = line else { break };
                if text.eq_ignore_ascii_case("/exit") || text.eq_ignore_ascii_case("/quit") {
                    break;
                }
                let frame =
                    serde_json::json!({ "event": "send_message", "text": text }).to_string();
                sink.send(Message::Text(frame))
                    .await
                    .context("sending message frame")?;
            }
            msg = stream.next() => {
                match msg {
                    None => {
                        println!("connection closed");
                        break;
                    }
                    Some(Err(e)) => return Err(e).context("reading from bridge"),
                    Some(Ok(Message::Text(text))) => print_frame(&text),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    Ok(())
}

fn print_frame(text: &str) {
    let Ok(v) = serde_json::from_str::<serde_json::Value>(text) else {
        println!("< {}", text);
        return;
    };
    match v.get("event").and_then(|e| e.as_str()) {
        Some("receive_message") => println!(
            "[{}] {}",
            v["from"].as_str().unwrap_or("?"),
            v["text"].as_str().unwrap_or("")
        ),
        Some("error") => eprintln!("! {}", v["message"].as_str().unwrap_or("error")),
        _ => println!("< {}", text),
    }
}
