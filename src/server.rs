//! TCP listener and per-connection I/O loop.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::pg::protocol::ENCRYPTION_DECLINED;
use crate::pg::{
    BackendMessage, FrontendMessage, PgError, PgResult, Severity, SqlState, StartupRequest,
};
use crate::schema::SchemaRegistry;
use crate::session::{Session, StartupReply};
use crate::sqlite::SqliteConnection;

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// The server: shared engine, shared schema registry, and the listener.
pub struct Server {
    config: Arc<ServerConfig>,
    engine: Arc<SqliteConnection>,
    registry: SchemaRegistry,
    next_process_id: AtomicI32,
}

impl Server {
    /// Open the backing database and prepare to accept clients.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let engine = SqliteConnection::open(&config.database).await?;
        let registry = SchemaRegistry::new();

        if config.database != ":memory:" {
            registry.load_existing(&engine).await?;
        }

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            registry,
            next_process_id: AtomicI32::new(1),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// A fresh session with its own process id and secret key.
    pub fn session(&self) -> Session {
        let process_id = self.next_process_id.fetch_add(1, Ordering::Relaxed);
        Session::new(
            self.config.clone(),
            self.engine.clone(),
            self.registry.clone(),
            process_id,
            rand::random::<i32>(),
        )
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Serve clients from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            database = %self.config.database,
            "listening"
        );

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!(error = %e, "could not set TCP_NODELAY");
            }

            let session = self.session();
            let span = info_span!("connection", peer = %peer, pid = session.process_id());

            tokio::spawn(
                async move {
                    info!("client connected");
                    match handle_connection(stream, session).await {
                        Ok(()) => info!("client disconnected"),
                        Err(e) => error!(error = %e, "connection closed with error"),
                    }
                }
                .instrument(span),
            );
        }
    }
}

/// Drive one client connection to completion.
///
/// Startup packets are read until the handshake finishes, then tagged
/// messages until the client terminates or disconnects. Bytes are reassembled
/// in a buffer, so a message may arrive over any number of reads and one read
/// may carry several messages.
pub async fn handle_connection<S>(mut stream: S, mut session: Session) -> PgResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let max_len = session.config().max_message_size;
    let mut read_buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    let mut write_buf = BytesMut::new();

    // Nothing is written on a startup failure, not even an ErrorResponse.
    loop {
        let Some(request) = StartupRequest::decode(&mut read_buf, max_len)? else {
            if stream.read_buf(&mut read_buf).await? == 0 {
                debug!("client closed before startup");
                return Ok(());
            }
            continue;
        };

        match session.handle_startup(request)? {
            StartupReply::Accepted(messages) => {
                for message in &messages {
                    message.encode(&mut write_buf);
                }
                stream.write_all(&write_buf).await?;
                stream.flush().await?;
                write_buf.clear();
                break;
            }
            StartupReply::EncryptionDeclined => {
                stream.write_all(&[ENCRYPTION_DECLINED]).await?;
                stream.flush().await?;
            }
            StartupReply::Close => return Ok(()),
        }
    }

    loop {
        let decoded = FrontendMessage::decode(&mut read_buf, max_len);
        let message = match decoded {
            Ok(Some(message)) => message,
            Ok(None) => {
                if stream.read_buf(&mut read_buf).await? == 0 {
                    return Ok(());
                }
                continue;
            }
            Err(e) => return Err(fail(&mut stream, e).await),
        };

        debug!(tag = %char::from(message.tag()), "received message");
        let replies = match session.handle_message(message).await {
            Ok(replies) => replies,
            Err(e) => return Err(fail(&mut stream, e).await),
        };

        for reply in &replies {
            reply.encode(&mut write_buf);
        }
        if !write_buf.is_empty() {
            stream.write_all(&write_buf).await?;
            stream.flush().await?;
            write_buf.clear();
        }

        if session.is_terminated() {
            return Ok(());
        }
    }
}

/// Tell the client about a fatal protocol error, best effort, and hand the
/// error back for the caller to return.
async fn fail<S>(stream: &mut S, err: PgError) -> PgError
where
    S: AsyncWrite + Unpin,
{
    if err.is_protocol_violation() {
        let mut buf = BytesMut::new();
        BackendMessage::error(Severity::Fatal, SqlState::PROTOCOL_VIOLATION, err.to_string())
            .encode(&mut buf);
        if let Err(e) = stream.write_all(&buf).await {
            debug!(error = %e, "could not send fatal error");
        }
        let _ = stream.flush().await;
    }
    err
}
