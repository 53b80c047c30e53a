//! TCP connection handler
//!
//! Handles individual client connections: line framing, the login
//! handshake, and bidirectional communication with the actors once the
//! session is running.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info};

use crate::account::Mailbox;
use crate::config::Config;
use crate::error::AppError;
use crate::handshake::{Handshake, Login, Step};
use crate::message::ChatMessage;
use crate::server::ServerHandle;
use crate::session::Session;
use crate::types::ConnectionId;

type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;
type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// Handle a new TCP connection
///
/// Runs the handshake, then the command loop, and always releases the
/// account's room membership and mailbox on the way out.
pub async fn handle_connection(
    stream: TcpStream,
    server: ServerHandle,
    config: Arc<Config>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let conn_id = ConnectionId::new();

    info!("Connection {} from {}", conn_id, peer_addr);

    let (reader, writer) = stream.into_split();
    let mut lines = FramedRead::new(
        reader,
        LinesCodec::new_with_max_length(config.max_line_length),
    );
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    let Login {
        username,
        mailbox,
        room,
    } = authenticate(&mut lines, &mut sink, &server, conn_id, config.handshake_timeout()).await?;
    let Mailbox {
        connection,
        sender,
        receiver,
    } = mailbox;

    info!("Connection {} logged in as {}", conn_id, username);

    let session = Session::start(username.clone(), connection, server.clone(), sender, room).await;
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            let _ = server.logout(&username, connection).await;
            return Err(e);
        }
    };

    let result = run_session(session, lines, sink, receiver).await;
    info!("Connection {} ({}) disconnected", conn_id, username);

    result
}

/// Drive the handshake until the client is logged in
async fn authenticate(
    lines: &mut LineReader,
    sink: &mut LineWriter,
    server: &ServerHandle,
    connection: ConnectionId,
    answer_timeout: Option<Duration>,
) -> Result<Login, AppError> {
    let mut handshake = Handshake::new(connection);
    sink.send(handshake.first_prompt()).await?;

    loop {
        let step = match read_answer(lines, answer_timeout).await {
            Ok(line) => handshake.advance(&line, server).await,
            Err(e) => Err(e),
        };

        let sent = match step {
            Ok(Step::Prompt(prompt)) => sink.send(prompt).await.map_err(AppError::from),
            Ok(Step::Ready(login)) => return Ok(login),
            Err(e) => Err(e),
        };

        if let Err(e) = sent {
            handshake.abandon(server).await;
            return Err(e);
        }
    }
}

async fn read_answer(
    lines: &mut LineReader,
    answer_timeout: Option<Duration>,
) -> Result<String, AppError> {
    match answer_timeout {
        Some(limit) => timeout(limit, read_line(lines))
            .await
            .map_err(|_| AppError::HandshakeTimeout)?,
        None => read_line(lines).await,
    }
}

async fn read_line(lines: &mut LineReader) -> Result<String, AppError> {
    match lines.next().await {
        Some(Ok(line)) => Ok(line),
        Some(Err(e)) => Err(e.into()),
        None => Err(AppError::ConnectionClosed),
    }
}

/// Command mode: read task inline, write-drain task spawned
///
/// Closes the session on every exit path. The mailbox receiver outlives the
/// close, so the account stays attached to this connection until it has
/// been released.
async fn run_session(
    mut session: Session,
    mut lines: LineReader,
    mut sink: LineWriter,
    mailbox: mpsc::Receiver<ChatMessage>,
) -> Result<(), AppError> {
    if let Err(e) = sink
        .send(format!("You joined {}", session.room().name()))
        .await
    {
        session.close().await;
        return Err(e.into());
    }

    let username = session.username().to_string();
    let mut write_task = tokio::spawn(drain_mailbox(mailbox, sink, username.clone()));

    // Wait for either side to finish
    let (result, _mailbox) = tokio::select! {
        result = read_commands(&mut lines, &mut session) => {
            debug!("Read loop completed for {}", username);
            (result, None)
        }
        mailbox = &mut write_task => {
            debug!("Write task completed for {}", username);
            (Ok(()), mailbox.ok())
        }
    };

    session.close().await;
    write_task.abort();
    result
}

async fn read_commands(lines: &mut LineReader, session: &mut Session) -> Result<(), AppError> {
    while let Some(line) = lines.next().await {
        let line = line?;
        session.handle_line(&line).await?;
    }
    Ok(())
}

/// Forward mailbox entries to the client, skipping its own messages
///
/// Hands the receiver back when the client stops accepting writes.
async fn drain_mailbox(
    mut mailbox: mpsc::Receiver<ChatMessage>,
    mut sink: LineWriter,
    username: String,
) -> mpsc::Receiver<ChatMessage> {
    while let Some(msg) = mailbox.recv().await {
        if msg.is_from(&username) {
            continue;
        }
        if let Err(e) = sink.send(msg.render()).await {
            debug!("Write to {} failed: {}", username, e);
            break;
        }
    }
    debug!("Write task ended for {}", username);
    mailbox
}
