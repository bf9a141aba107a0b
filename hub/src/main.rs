#[macro_use]
extern crate tracing;

use monoio::net::TcpListener;
use mural_common::CANVAS;
use mural_hub::{BroadcastHub, Limits, connection};
use std::{
    cell::RefCell,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    rc::Rc,
    time::Duration,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const LISTEN_ON: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 4000);

#[derive(argh::FromArgs)]
/// Authoritative canvas hub: holds the shared canvas and relays every edit
struct Args {
    #[argh(option, default = "LISTEN_ON")]
    /// address to accept painters on
    listen: SocketAddr,

    #[argh(option, default = "1024")]
    /// outbound messages a connection may lag behind before it is dropped
    backlog: usize,

    #[argh(option)]
    /// drop connections that stay silent for this many seconds
    idle_timeout: Option<u64>,
}

async fn run(args: Args) -> anyhow::Result<()> {
    let listener = TcpListener::bind(args.listen)?;
    let hub = Rc::new(RefCell::new(BroadcastHub::new(CANVAS)));
    let limits = Limits {
        backlog: args.backlog,
        idle_timeout: args.idle_timeout.map(Duration::from_secs),
    };

    info!(addr = %args.listen, canvas = %CANVAS, "accepting connections");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                error!(?error, "accept failed");
                continue;
            }
        };

        debug!(%peer, connections = hub.borrow().len(), "accepted connection");
        monoio::spawn(connection::serve(stream, peer, Rc::clone(&hub), limits));
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    // one runtime thread: the hub is only ever touched from here
    let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_timer()
        .build()?;

    runtime.block_on(run(args))
}
