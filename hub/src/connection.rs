use crate::hub::{BroadcastHub, Closed, ConnectionId};
use futures::{FutureExt, StreamExt, channel::mpsc, pin_mut, select_biased};
use monoio::{
    io::{AsyncWriteRent, OwnedReadHalf, OwnedWriteHalf, Splitable},
    net::TcpStream,
};
use mural_common::{Message, transport};
use std::{cell::RefCell, net::SocketAddr, rc::Rc, time::Duration};

#[derive(Clone, Copy, Debug)]
pub struct Limits {
    /// Outbound messages a connection may fall behind by before it is dropped
    pub backlog: usize,
    pub idle_timeout: Option<Duration>,
}

/// Serves one client until it disconnects, fails or is removed from the hub.
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Rc<RefCell<BroadcastHub>>,
    limits: Limits,
) {
    if let Err(error) = stream.set_nodelay(true) {
        warn!(?error, %peer, "failed to set nodelay");
    }

    let (reader, writer) = stream.into_split();
    let (outbox, queue) = mpsc::channel(limits.backlog);

    // join queues the snapshot before any delta can be fanned out to us
    let (id, closed) = match hub.borrow_mut().join(outbox, Some(peer)) {
        Ok(joined) => joined,
        Err(error) => {
            warn!(?error, %peer, "failed to register connection");
            return;
        }
    };

    monoio::spawn(drain(id, writer, queue, hub.clone(), closed.clone()));

    let max_len = hub.borrow().dimensions().snapshot_len();
    if let Err(error) = ingest(id, reader, max_len, &hub, limits.idle_timeout, closed).await {
        warn!(%id, %error, "connection failed");
    }

    hub.borrow_mut().leave(id);
}

async fn next_frame(
    reader: &mut OwnedReadHalf<TcpStream>,
    max_len: usize,
    idle_timeout: Option<Duration>,
) -> mural_common::Result<Option<Vec<u8>>> {
    let read = transport::read_frame(reader, max_len);
    let Some(limit) = idle_timeout else {
        return read.await;
    };

    match monoio::time::timeout(limit, read).await {
        Ok(frame) => frame,
        Err(..) => {
            info!(?limit, "idle timeout elapsed");
            Ok(None)
        }
    }
}

async fn ingest(
    id: ConnectionId,
    mut reader: OwnedReadHalf<TcpStream>,
    max_len: usize,
    hub: &RefCell<BroadcastHub>,
    idle_timeout: Option<Duration>,
    mut closed: Closed,
) -> mural_common::Result<()> {
    loop {
        let next = next_frame(&mut reader, max_len, idle_timeout).fuse();
        pin_mut!(next);

        let frame = select_biased! {
            _ = closed => {
                debug!(%id, "removed from the hub, no longer reading");
                return Ok(());
            }
            frame = next => frame?,
        };

        let Some(payload) = frame else {
            debug!(%id, "peer closed the stream");
            return Ok(());
        };

        let result = hub.borrow_mut().ingest(id, payload);
        match result {
            Ok(..) => {}
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => warn!(%id, %error, "rejected message"),
        }
    }
}

async fn drain(
    id: ConnectionId,
    mut writer: OwnedWriteHalf<TcpStream>,
    mut queue: mpsc::Receiver<Message>,
    hub: Rc<RefCell<BroadcastHub>>,
    mut closed: Closed,
) {
    loop {
        let message = select_biased! {
            _ = closed => None,
            message = queue.next() => message,
        };
        let Some(message) = message else {
            break;
        };

        let write = transport::write_frame(&mut writer, message.into_bytes()).fuse();
        pin_mut!(write);

        let result = select_biased! {
            _ = closed => break,
            result = write => result,
        };

        if let Err(error) = result {
            debug!(%id, %error, "send failed");
            hub.borrow_mut().leave(id);
            return;
        }
    }

    // whatever is still queued belongs to a connection that is gone
    debug!(%id, "connection closed, shutting down");
    drop(queue);
    if let Err(error) = writer.shutdown().await {
        debug!(%id, ?error, "shutdown failed");
    }
}
