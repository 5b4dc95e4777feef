use std::sync::{Arc, Mutex};
use std::time::Duration;

use canvas::bridge::{Bridge, Identity};
use canvas::config::SyncConfig;
use canvas::doc::{Element, Payload, ShapeKind};
use canvas::operation::Action;
use canvas::protocol::{self, ProtocolError};
use canvas::store::Change;
use canvas::sync::SyncState;
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("element {0} not found in room")]
    UnknownElement(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for CliError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

#[derive(Parser, Debug)]
#[command(name = "canvas-cli", about = "Headless collaborator for a canvas relay room")]
struct Cli {
    #[arg(long, env = "CANVAS_RELAY_URL", default_value = "http://127.0.0.1:3000")]
    url: String,

    #[arg(long, env = "CANVAS_ROOM", default_value = "lobby")]
    room: String,

    /// Stable author id; a random one is generated when omitted.
    #[arg(long, env = "CANVAS_USER_ID")]
    user_id: Option<String>,

    #[arg(long, env = "CANVAS_USER_NAME", default_value = "canvas-cli")]
    name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join the room and print state changes as JSON lines.
    Watch {
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Print the room's elements once synced.
    Dump,
    Add(AddArgs),
    Remove {
        id: String,
    },
    Lock {
        id: String,
    },
    Unlock {
        id: String,
    },
    /// Push this client's synced state to every peer.
    FullSync,
}

#[derive(Args, Debug)]
struct AddArgs {
    #[arg(long, value_enum, default_value_t = Kind::Rect)]
    kind: Kind,
    #[arg(long, default_value_t = 0.0)]
    x: f64,
    #[arg(long, default_value_t = 0.0)]
    y: f64,
    #[arg(long, default_value_t = 100.0)]
    width: f64,
    #[arg(long, default_value_t = 100.0)]
    height: f64,
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long, default_value = "#4ECDC4")]
    fill: String,
    #[arg(long, default_value = "")]
    src: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Kind {
    Text,
    Image,
    Rect,
    Ellipse,
    Triangle,
    Star,
    Line,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut session = Session::connect(&cli).await?;
    session.sync().await?;

    match cli.command {
        Command::Watch { seconds } => run_watch(session, seconds).await,
        Command::Dump => {
            print_json(&serde_json::to_value(session.bridge.doc().snapshot_elements())?)?;
            session.close().await
        }
        Command::Add(args) => {
            let element = build_element(&args);
            let id = element.id.clone();
            session.bridge.apply_action(Action::add(element));
            session.close().await?;
            println!("{id}");
            Ok(())
        }
        Command::Remove { id } => {
            if !session.bridge.remove_element(&id) {
                return Err(CliError::UnknownElement(id));
            }
            session.close().await
        }
        Command::Lock { id } => {
            session.require(&id)?;
            session.bridge.apply_action(Action::lock(id, cli.name));
            session.close().await
        }
        Command::Unlock { id } => {
            session.require(&id)?;
            session.bridge.apply_action(Action::unlock(id));
            session.close().await
        }
        Command::FullSync => {
            session.bridge.broadcast_full_sync();
            let count = session.bridge.doc().len();
            session.close().await?;
            eprintln!("full-sync sent: {count} elements");
            Ok(())
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// What ended a wait on the relay connection.
enum Wake {
    Frame(String),
    Timer,
    Stop,
}

/// A bridge wired to one relay connection.
struct Session {
    bridge: Bridge,
    stream: Stream,
}

impl Session {
    async fn connect(cli: &Cli) -> Result<Self, CliError> {
        let url = ws_url(&cli.url, &cli.room)?;
        let (stream, _) = connect_async(url).await?;
        let user_id = cli.user_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let bridge = Bridge::new(Identity::new(user_id, cli.name.clone()), &SyncConfig::from_env());
        let mut session = Self { bridge, stream };

        let deadline = Instant::now() + CONNECT_TIMEOUT;
        while session.bridge.connection_id().is_none() {
            let text = timeout_at(deadline, next_text(&mut session.stream))
                .await
                .map_err(|_| CliError::Timeout("session:connected"))??;
            session.bridge.receive(&text);
        }
        session.flush().await?;
        Ok(session)
    }

    /// Drive the join handshake until the bridge accepts remote operations.
    async fn sync(&mut self) -> Result<(), CliError> {
        while self.bridge.sync_state() != SyncState::Synced {
            self.step_until(None).await?;
        }
        Ok(())
    }

    /// Handle the next inbound frame or due timer, then send whatever the bridge queued.
    ///
    /// Returns `false` once `stop` passes. Only the wait races the stop
    /// deadline; a flush in progress always completes.
    async fn step_until(&mut self, stop: Option<Instant>) -> Result<bool, CliError> {
        match self.wait(stop).await? {
            Wake::Frame(text) => self.bridge.receive(&text),
            Wake::Timer => self.bridge.tick(),
            Wake::Stop => return Ok(false),
        }
        self.flush().await?;
        Ok(true)
    }

    async fn wait(&mut self, stop: Option<Instant>) -> Result<Wake, CliError> {
        let deadline = self.bridge.next_deadline().map(Instant::from_std);
        tokio::select! {
            text = next_text(&mut self.stream) => Ok(Wake::Frame(text?)),
            () = sleep_until_opt(deadline) => Ok(Wake::Timer),
            () = sleep_until_opt(stop) => Ok(Wake::Stop),
        }
    }

    async fn flush(&mut self) -> Result<(), CliError> {
        for message in self.bridge.take_outbound() {
            let text = protocol::encode(&message)?;
            self.stream.send(Message::text(text)).await?;
        }
        Ok(())
    }

    fn require(&self, id: &str) -> Result<(), CliError> {
        if self.bridge.doc().contains(id) { Ok(()) } else { Err(CliError::UnknownElement(id.to_owned())) }
    }

    async fn close(mut self) -> Result<(), CliError> {
        self.flush().await?;
        self.stream.close(None).await?;
        Ok(())
    }
}

async fn next_text(stream: &mut Stream) -> Result<String, CliError> {
    loop {
        let Some(message) = stream.next().await else {
            return Err(CliError::WsClosed);
        };
        match message? {
            Message::Text(text) => return Ok(text.as_str().to_owned()),
            Message::Close(_) => return Err(CliError::WsClosed),
            _ => {}
        }
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_watch(mut session: Session, seconds: Option<u64>) -> Result<(), CliError> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.bridge.subscribe(move |change| {
        if let Ok(mut seen) = sink.lock() {
            seen.push(change);
        }
    });

    print_json(&json!({ "event": "synced", "elements": session.bridge.doc().len() }))?;
    let stop = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while session.step_until(stop).await? {
        let changes = match seen.lock() {
            Ok(mut seen) => std::mem::take(&mut *seen),
            Err(_) => Vec::new(),
        };
        for change in changes {
            if let Some(event) = describe_change(&session.bridge, change)? {
                print_json(&event)?;
            }
        }
    }
    session.close().await
}

fn describe_change(bridge: &Bridge, change: Change) -> Result<Option<Value>, CliError> {
    let event = match change {
        Change::Elements => json!({ "event": "elements", "count": bridge.doc().len() }),
        Change::Canvas => json!({ "event": "canvas", "canvas": serde_json::to_value(bridge.doc().canvas())? }),
        Change::Presence => json!({ "event": "presence", "peers": serde_json::to_value(bridge.presence())? }),
        Change::History => return Ok(None),
    };
    Ok(Some(event))
}

// =============================================================================
// HELPERS
// =============================================================================

fn ws_url(base_url: &str, room: &str) -> Result<String, CliError> {
    let base = base_url.trim_end_matches('/');
    let socket_base = if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_owned()
    } else {
        return Err(CliError::InvalidUrl(base_url.to_owned()));
    };
    Ok(format!("{socket_base}/api/ws/{room}"))
}

fn build_element(args: &AddArgs) -> Element {
    let payload = match args.kind {
        Kind::Text => Payload::text(args.text.clone()),
        Kind::Image => Payload::image(args.src.clone()),
        Kind::Rect => Payload::shape(ShapeKind::Rect, args.fill.clone()),
        Kind::Ellipse => Payload::shape(ShapeKind::Ellipse, args.fill.clone()),
        Kind::Triangle => Payload::shape(ShapeKind::Triangle, args.fill.clone()),
        Kind::Star => Payload::shape(ShapeKind::Star, args.fill.clone()),
        Kind::Line => Payload::shape(ShapeKind::Line, args.fill.clone()),
    };
    Element::new(payload, args.x, args.y, args.width, args.height)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
