mod bot;

use clap::{Parser, Subcommand};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use kyarashi::session;
use kyarashi_core::{
    decode_frame, encode_frame, local_schema_version, repair, ClientFrame, GameDocument,
    Participant, Role, ServerFrame, TableId,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Parser)]
#[command(name = "kyarashi-cli", version, about = "Admin tools for kyarashi tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a join code and seed the table on the document service.
    Create {
        #[arg(long, env = "TABLE_WS_BASE_URL", default_value = "ws://localhost:8787/tables")]
        base_url: String,
        /// Keeper display name written into the seeded roster.
        #[arg(long, default_value = "keeper")]
        keeper: String,
        /// Reuse an existing join code instead of generating one.
        #[arg(long)]
        table: Option<String>,
        /// Print the join code without contacting the service.
        #[arg(long)]
        no_connect: bool,
    },
    /// Subscribe to a table and print repaired snapshots as they arrive.
    Watch {
        #[arg(long, env = "TABLE_WS_BASE_URL", default_value = "ws://localhost:8787/tables")]
        base_url: String,
        #[arg(long)]
        table: String,
    },
    /// Drive scripted participants through in-process stores and verify
    /// every session converges on the same document.
    Simulate {
        #[arg(long, default_value_t = 3)]
        players: usize,
        #[arg(long, default_value_t = 24)]
        edits: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Create {
            base_url,
            keeper,
            table,
            no_connect,
        } => create(base_url, keeper, table, no_connect).await,
        Commands::Watch { base_url, table } => watch(base_url, table).await,
        Commands::Simulate {
            players,
            edits,
            seed,
        } => bot::run(bot::BotRunConfig {
            players,
            edits,
            seed,
        }),
    }
}

async fn create(
    base_url: String,
    keeper: String,
    table: Option<String>,
    no_connect: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let table = match table {
        Some(code) => TableId::parse(&code)?,
        None => TableId::parse(&session::generate_table_code())?,
    };
    println!("join code: {table}");
    if no_connect {
        return Ok(());
    }

    let url = build_table_url(&base_url, &table)?;
    let (ws, _response) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();

    send_frame(
        &mut write,
        &ClientFrame::Exists {
            table: table.to_string(),
        },
    )
    .await?;
    match recv_frame_with_timeout(&mut read, Duration::from_secs(5)).await {
        Some(ServerFrame::Exists { exists: true, .. }) => {
            eprintln!("join code already in use, pick another");
            return Ok(());
        }
        Some(ServerFrame::Exists { .. }) => {}
        Some(ServerFrame::Error { code, message }) => {
            return Err(format!("existence check failed with {code}: {message}").into());
        }
        _ => return Err("existence check timed out".into()),
    }

    let mut document = GameDocument::new(table.as_str(), local_schema_version());
    document.players.push(Participant::new(&keeper, Role::Keeper));
    let Some(value) = document.to_value() else {
        return Err("seed document failed to encode".into());
    };
    send_frame(
        &mut write,
        &ClientFrame::Replace {
            table: table.to_string(),
            document: value,
        },
    )
    .await?;
    send_frame(
        &mut write,
        &ClientFrame::Subscribe {
            table: table.to_string(),
        },
    )
    .await?;
    match recv_frame_with_timeout(&mut read, Duration::from_secs(5)).await {
        Some(ServerFrame::Snapshot {
            document: Some(_), ..
        }) => {
            println!("table seeded with schema {}", local_schema_version());
        }
        Some(ServerFrame::Error { code, message }) => {
            return Err(format!("seeding failed with {code}: {message}").into());
        }
        _ => eprintln!("no snapshot echo received, the table may not have been created"),
    }
    Ok(())
}

async fn watch(base_url: String, table: String) -> Result<(), Box<dyn std::error::Error>> {
    let table = TableId::parse(&table)?;
    let url = build_table_url(&base_url, &table)?;
    let (ws, _response) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();
    send_frame(
        &mut write,
        &ClientFrame::Subscribe {
            table: table.to_string(),
        },
    )
    .await?;

    while let Some(frame) = recv_frame(&mut read).await {
        match frame {
            ServerFrame::Snapshot { document, .. } => match document {
                Some(raw) => {
                    let repaired = repair(&raw);
                    println!(
                        "t={} schema={} players={} mysteries={} warnings={}",
                        repaired.document.last_modified,
                        repaired.document.schema_version,
                        repaired.document.players.len(),
                        repaired.document.mysteries.len(),
                        repaired.warnings.len()
                    );
                    for warning in &repaired.warnings {
                        println!(
                            "  warning: {} expected {}, got {}",
                            warning.field, warning.expected, warning.received
                        );
                    }
                }
                None => println!("table does not exist yet"),
            },
            ServerFrame::Error { code, message } => {
                eprintln!("server error {code}: {message}");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

fn build_table_url(base_url: &str, table: &TableId) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base_url)?;
    let base_path = url.path().trim_end_matches('/');
    let path = format!("{}/{}", base_path, table);
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

async fn send_frame(
    write: &mut SplitSink<WsStream, Message>,
    frame: &ClientFrame,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(raw) = encode_frame(frame) {
        write.send(Message::Text(raw)).await?;
    }
    Ok(())
}

async fn recv_frame(read: &mut SplitStream<WsStream>) -> Option<ServerFrame> {
    while let Some(message) = read.next().await {
        let Ok(message) = message else {
            continue;
        };
        match message {
            Message::Text(raw) => {
                if let Some(frame) = decode_frame::<ServerFrame>(&raw) {
                    return Some(frame);
                }
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
    None
}

async fn recv_frame_with_timeout(
    read: &mut SplitStream<WsStream>,
    dur: Duration,
) -> Option<ServerFrame> {
    match timeout(dur, recv_frame(read)).await {
        Ok(frame) => frame,
        Err(_) => None,
    }
}
