//! Non-blocking, single-thread-multiplexed TCP front-end.
//!
//! Already-connected clients are serviced before accepting new ones, each
//! client gets its own buffer capped at `net_buffer_size`, and a line is
//! handed to the core only once a full `\n` has arrived.

pub mod protocol;

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use thiserror::Error;

use crate::config::Config;
use crate::event::{parse_line, ClientId};
use crate::queue::{EventQueue, PushOutcome};

#[derive(Debug, Error)]
pub enum Error {
    #[error("network io error: {0}")]
    Io(#[from] std::io::Error),
}

const LISTENER: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const READ_CHUNK: usize = 4096;

struct Client {
    stream: mio::net::TcpStream,
    inbuf: Vec<u8>,
    outbuf: Vec<u8>,
}

/// Owns the listening socket and every open client connection, polled from
/// a single thread at [`crate::config::NETWORK_THREAD_PRIORITY`].
pub struct Server {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    clients: HashMap<u64, Client>,
    next_id: u64,
    cfg: Config,
}

impl Server {
    pub fn bind(cfg: Config) -> Result<Self, Error> {
        let addr: SocketAddr = ([0, 0, 0, 0], cfg.server_port).into();
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Self {
            listener,
            poll,
            events: Events::with_capacity(128),
            clients: HashMap::new(),
            // Client id 0 is reserved for the listener's own mio token.
            next_id: 1,
            cfg,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop until `shutdown` is set. Parsed lines become
    /// [`crate::event::Event`]s pushed onto `queue`; replies popped off
    /// `replies` are framed with the `[SERVER]: ` prefix and written back
    /// to the originating connection.
    pub fn serve(
        mut self,
        queue: EventQueue,
        replies: crossbeam_channel::Receiver<(ClientId, String)>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), Error> {
        while !shutdown.load(Ordering::Relaxed) {
            self.poll.poll(&mut self.events, Some(POLL_TIMEOUT))?;

            while let Ok((client, body)) = replies.try_recv() {
                self.enqueue_reply(client, &body);
            }

            // Existing clients first, new accepts last.
            let ready: Vec<Token> = self
                .events
                .iter()
                .map(|event| event.token())
                .filter(|&token| token != LISTENER)
                .collect();
            let listener_ready = self.events.iter().any(|event| event.token() == LISTENER);

            for token in ready {
                self.service_client(token, &queue);
            }

            if listener_ready {
                self.accept_new_clients();
            }
        }

        Ok(())
    }

    fn accept_new_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, _addr)) => {
                    if self.clients.len() >= self.cfg.max_clients {
                        tracing::warn!("max clients reached, refusing new connection");
                        continue;
                    }

                    let id = self.next_id;
                    self.next_id += 1;
                    let token = Token(id as usize);

                    if let Err(err) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        tracing::warn!(error = %err, "failed to register new client");
                        continue;
                    }

                    self.clients.insert(
                        id,
                        Client {
                            stream,
                            inbuf: Vec::new(),
                            outbuf: Vec::new(),
                        },
                    );
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    break;
                }
            }
        }
    }

    fn service_client(&mut self, token: Token, queue: &EventQueue) {
        let id = token.0 as u64;
        let mut closed = false;

        if let Some(client) = self.clients.get_mut(&id) {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match client.stream.read(&mut buf) {
                    Ok(0) => {
                        closed = true;
                        break;
                    }
                    Ok(n) => {
                        if client.inbuf.len() + n > self.cfg.net_buffer_size {
                            tracing::warn!(client = id, "client exceeded net buffer size, closing");
                            closed = true;
                            break;
                        }
                        client.inbuf.extend_from_slice(&buf[..n]);
                    }
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(_) => {
                        closed = true;
                        break;
                    }
                }
            }

            for line in protocol::drain_lines(&mut client.inbuf) {
                let reply = match parse_line(id, &line) {
                    Ok(event) => match queue.push(event) {
                        PushOutcome::Ok => None,
                        PushOutcome::Full => Some("ERR System Busy".to_owned()),
                    },
                    Err(_) => Some("ERR Invalid Command".to_owned()),
                };

                if let Some(body) = reply {
                    client
                        .outbuf
                        .extend_from_slice(protocol::frame_response(&body).as_bytes());
                }
            }

            Self::flush_client(client);
        }

        if closed {
            self.drop_client(id);
        }
    }

    fn enqueue_reply(&mut self, client: ClientId, body: &str) {
        if let Some(conn) = self.clients.get_mut(&client) {
            conn.outbuf
                .extend_from_slice(protocol::frame_response(body).as_bytes());
            Self::flush_client(conn);
        }
    }

    fn flush_client(client: &mut Client) {
        while !client.outbuf.is_empty() {
            match client.stream.write(&client.outbuf) {
                Ok(0) => break,
                Ok(n) => {
                    client.outbuf.drain(..n);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    fn drop_client(&mut self, id: u64) {
        if let Some(mut client) = self.clients.remove(&id) {
            let _ = self.poll.registry().deregister(&mut client.stream);
        }
    }
}
