use futures::{
    FutureExt,
    channel::{mpsc, oneshot},
    future::Shared,
};
use mural_common::{Dimensions, Error, Message, PixelEdit, PixelGrid, Result, Snapshot};
use std::{collections::HashMap, fmt, net::SocketAddr};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type Outbox = mpsc::Sender<Message>;

/// Resolves once the connection is no longer part of the hub, whether it
/// left or was reaped. Every task serving the connection should stop on it.
pub type Closed = Shared<oneshot::Receiver<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    Live,
    /// Outbox closed or full; removed at the end of the current fan-out
    Dead,
}

struct Connection {
    outbox: Outbox,
    peer: Option<SocketAddr>,
    liveness: Liveness,
    // dropped together with the connection, which resolves `Closed`
    _closer: oneshot::Sender<()>,
}

impl Connection {
    fn offer(&mut self, message: Message) -> Result<()> {
        if let Err(error) = self.outbox.try_send(message) {
            self.liveness = Liveness::Dead;
            debug!(full = error.is_full(), "outbox rejected message");
            return Err(Error::Disconnected);
        }

        Ok(())
    }
}

/// Authoritative canvas plus the set of connections it fans out to.
///
/// Every method runs to completion without suspending. Whoever owns the hub
/// is the single serialization point: deltas are applied in call order and
/// snapshots never observe a half-applied edit.
pub struct BroadcastHub {
    grid: PixelGrid,
    connections: HashMap<ConnectionId, Connection>,
    next_id: u64,
}

impl BroadcastHub {
    pub fn new(dims: Dimensions) -> Self {
        Self {
            grid: PixelGrid::new(dims),
            connections: HashMap::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn dimensions(&self) -> Dimensions {
        self.grid.dimensions()
    }

    #[inline]
    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn snapshot(&self) -> Snapshot {
        self.grid.snapshot()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Registers a connection and queues the current snapshot as its first
    /// message.
    pub fn join(
        &mut self,
        outbox: Outbox,
        peer: Option<SocketAddr>,
    ) -> Result<(ConnectionId, Closed)> {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let (closer, closed) = oneshot::channel();
        let mut connection = Connection {
            outbox,
            peer,
            liveness: Liveness::Live,
            _closer: closer,
        };
        connection.offer(Message::Snapshot(self.grid.snapshot()))?;
        self.connections.insert(id, connection);

        info!(%id, ?peer, connections = self.connections.len(), "connection joined");
        Ok((id, closed.shared()))
    }

    /// Removes a connection. Also the hook for external liveness checks.
    pub fn leave(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(&id) else {
            return false;
        };

        info!(
            %id,
            peer = ?connection.peer,
            connections = self.connections.len(),
            "connection left"
        );
        true
    }

    /// Applies a frame sent by `origin` and forwards it to everyone else.
    pub fn ingest(&mut self, origin: ConnectionId, payload: Vec<u8>) -> Result<PixelEdit> {
        if !self.contains(origin) {
            return Err(Error::Disconnected);
        }

        let edit = match Message::decode(self.dimensions(), payload)? {
            Message::Delta(edit) => edit,
            Message::Snapshot(..) => return Err(Error::UnexpectedSnapshot),
        };

        edit.apply(&mut self.grid)?;
        trace!(%origin, x = edit.x, y = edit.y, color = edit.color, "applied delta");

        self.broadcast(origin, edit);
        Ok(edit)
    }

    fn broadcast(&mut self, origin: ConnectionId, edit: PixelEdit) {
        let mut reaped = false;
        for (id, connection) in &mut self.connections {
            if *id == origin {
                continue;
            }

            if connection.offer(Message::Delta(edit)).is_err() {
                reaped = true;
            }
        }

        if reaped {
            self.connections.retain(|id, connection| {
                let live = connection.liveness == Liveness::Live;
                if !live {
                    warn!(%id, peer = ?connection.peer, "reaping connection that stopped draining");
                }
                live
            });
        }
    }
}
