//! Console session for local runs.
//!
//! Each stdin line arrives as a private message from a console user; every
//! outbound message is printed to stdout. End of input logs the session out,
//! which stops the supervisor.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use herald_app::{Session, SessionClient, SessionError, SessionFactory};
use herald_core::{
    DisconnectReason, GroupMetadata, InboundEvent, Jid, LifecycleEvent, MessageContent,
    MessageKey, OutboundContent, RawMessage, SessionEvent,
};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::{Mutex, mpsc},
};

/// Identity of the console user.
pub const CONSOLE_USER: &str = "10000000000";

/// Identity of the bot in console sessions.
pub const CONSOLE_BOT: &str = "10000000001";

const EVENT_BUFFER: usize = 64;

/// Factory producing a console session on stdin and stdout.
#[derive(Default)]
pub struct ConsoleFactory {
    opened: bool,
}

impl ConsoleFactory {
    /// Create a factory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionFactory for ConsoleFactory {
    async fn connect(&mut self) -> Result<Session, SessionError> {
        if self.opened {
            return Err(SessionError::Closed { reason: DisconnectReason::LoggedOut });
        }
        self.opened = true;

        let client = Arc::new(ConsoleClient::new(tokio::io::stdout()));
        let events = spawn_reader(BufReader::new(tokio::io::stdin()));
        Ok(Session { client, events })
    }
}

/// Feed lines from `input` as session events: open, one message per
/// non-empty line, then a logged-out close at end of input.
pub fn spawn_reader<R>(input: R) -> mpsc::Receiver<SessionEvent>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        if tx.send(SessionEvent::Lifecycle(LifecycleEvent::Open)).await.is_err() {
            return;
        }

        let mut lines = input.lines();
        let mut next_id = 0u64;
        let detail = loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {},
                Ok(Some(line)) => {
                    next_id += 1;
                    let event = InboundEvent::MessagesUpsert(vec![console_message(next_id, line)]);
                    if tx.send(SessionEvent::Inbound(event)).await.is_err() {
                        return;
                    }
                },
                Ok(None) => break "console input closed".to_string(),
                Err(e) => break format!("console read failed: {e}"),
            }
        };

        let close =
            LifecycleEvent::Close { reason: DisconnectReason::LoggedOut, detail: Some(detail) };
        let _ = tx.send(SessionEvent::Lifecycle(close)).await;
    });

    rx
}

fn console_message(id: u64, text: String) -> RawMessage {
    RawMessage {
        key: MessageKey {
            remote_jid: Jid::user(CONSOLE_USER).to_string(),
            from_me: false,
            id: format!("console-{id}"),
            participant: None,
        },
        push_name: Some("Console".to_string()),
        content: Some(MessageContent::Conversation(text)),
    }
}

/// Session client printing outbound messages.
pub struct ConsoleClient<W> {
    out: Mutex<W>,
    credential_writes: AtomicU64,
}

impl<W> ConsoleClient<W> {
    /// Client writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out), credential_writes: AtomicU64::new(0) }
    }
}

#[async_trait]
impl<W> SessionClient for ConsoleClient<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send_message(&self, to: &Jid, content: OutboundContent) -> Result<(), SessionError> {
        let line = match &content {
            OutboundContent::Text { text, .. } => format!("-> {to}: {text}\n"),
            OutboundContent::Image { url, caption, .. } => {
                format!("-> {to}: [image {url}] {caption}\n")
            },
        };

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await.map_err(|e| SessionError::Request(e.to_string()))?;
        out.flush().await.map_err(|e| SessionError::Request(e.to_string()))
    }

    async fn group_metadata(&self, _group: &Jid) -> Result<GroupMetadata, SessionError> {
        Err(SessionError::Unsupported("group metadata"))
    }

    async fn profile_picture_url(&self, _member: &Jid) -> Result<String, SessionError> {
        Err(SessionError::Unsupported("profile pictures"))
    }

    async fn remove_participants(
        &self,
        _group: &Jid,
        _members: &[Jid],
    ) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("group moderation"))
    }

    async fn request_pairing_code(&self, _phone_number: &str) -> Result<String, SessionError> {
        Err(SessionError::Unsupported("pairing"))
    }

    fn is_registered(&self) -> bool {
        true
    }

    fn own_id(&self) -> Option<Jid> {
        Some(Jid::user(CONSOLE_BOT))
    }

    async fn persist_credentials(&self) -> Result<(), SessionError> {
        self.credential_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn write_cache_snapshot(&self) -> Result<(), SessionError> {
        Ok(())
    }
}
