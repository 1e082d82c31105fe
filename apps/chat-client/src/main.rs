use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_client::config::Config;
use chat_client::rooms::RoomDirectory;
use chat_client::session::{MessageBody, SessionClient, SessionEvent};

const QUIT: &str = "/quit";

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();

    if std::env::args().nth(1).as_deref() == Some("rooms") {
        list_rooms(&config).await;
        return;
    }

    chat(config).await;
}

async fn list_rooms(config: &Config) {
    let directory = match RoomDirectory::from_endpoint(&config.scheme, &config.host, config.port) {
        Ok(directory) => directory,
        Err(e) => {
            tracing::error!(%e, "cannot reach room directory");
            std::process::exit(2);
        }
    };

    match directory.list_rooms().await {
        Ok(rooms) => {
            for room in rooms {
                println!("{}", room.id);
            }
        }
        Err(e) => {
            tracing::error!(%e, url = directory.base_url(), "failed to list rooms");
            std::process::exit(1);
        }
    }
}

async fn chat(config: Config) {
    let (client, mut events) = SessionClient::channel(config.session_options());

    if let Err(e) = client.connect(config.connect_params()) {
        tracing::error!(%e, "invalid connection settings");
        std::process::exit(2);
    }
    tracing::info!(user_id = %config.user_id, room = %config.room, host = %config.host, port = config.port, "joining chat room");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim() == QUIT => client.disconnect(),
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = client.send(&line) {
                        eprintln!("! {e}");
                    }
                }
                Ok(None) | Err(_) => {
                    stdin_open = false;
                    client.disconnect();
                }
            },
            event = events.recv() => match event {
                Some(SessionEvent::Connected) => eprintln!("* connected to {}", config.room),
                Some(SessionEvent::Interrupted) => eprintln!("* connection lost, reconnecting"),
                Some(SessionEvent::Message(message)) => match &message.body {
                    MessageBody::Chat(chat) => println!("<{}> {}", chat.user_id, chat.message),
                    MessageBody::Text(text) => println!("{text}"),
                    MessageBody::Fields(fields) => println!("{}", serde_json::Value::Object(fields.clone())),
                },
                Some(SessionEvent::Closed) | None => break,
            },
            _ = tokio::signal::ctrl_c() => client.disconnect(),
        }
    }
}
