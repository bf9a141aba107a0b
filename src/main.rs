#[macro_use]
extern crate tracing;

use monoio::{
    io::{OwnedReadHalf, OwnedWriteHalf, Splitable},
    net::TcpStream,
};
use mural_common::{
    ArchivedStencil, CANVAS, Error, SessionState, SyncSession, Update, transport,
};
use rand::seq::SliceRandom;
use rkyv::vec::ArchivedVec;
use std::{
    cell::RefCell,
    fs::File,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    rc::Rc,
    thread,
    time::{Duration, Instant, SystemTime},
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const WHERE_TO: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000);

#[derive(Clone, argh::FromArgs)]
/// Paint stencils onto a shared mural canvas
struct Args {
    #[argh(option, default = "WHERE_TO")]
    /// address of the mural hub
    addr: SocketAddr,

    #[argh(option)]
    /// file containing the stencil archive
    data: PathBuf,

    #[argh(option, default = "0")]
    /// x offset
    x_offset: u16,

    #[argh(option, default = "0")]
    /// y offset
    y_offset: u16,

    #[argh(option)]
    /// cycle through the stencil frames at this rate
    framerate: Option<f32>,

    #[argh(switch)]
    /// keep repainting pixels that others paint over
    watch: bool,

    #[argh(option, default = "500")]
    /// pause between repaint passes in watch mode, in milliseconds
    interval_ms: u64,

    #[argh(option)]
    /// start at the provided unix timestamp
    start_at: Option<u64>,

    #[argh(switch)]
    /// skip the checking of the stencil archive
    ///
    /// will speed up initial loads at the cost of potential segfaults
    skip_checks: bool,
}

type Shared = Rc<RefCell<SyncSession>>;

/// Pixels of `stencil` that the mirror does not show yet, as canvas
/// coordinates with their color.
fn pending(
    idx_buf: &mut Vec<(u16, u16, u32)>,
    session: &SyncSession,
    stencil: &ArchivedStencil,
    (x_offset, y_offset): (u16, u16),
) {
    idx_buf.clear();
    let Some(mirror) = session.mirror() else {
        return;
    };

    let width = stencil.width.to_native();
    for (idx, pixel) in stencil.pixels.iter().enumerate() {
        if !pixel.draw {
            continue;
        }

        let x = (idx % width as usize) as u16;
        let y = (idx / width as usize) as u16;
        let (Some(x), Some(y)) = (x.checked_add(x_offset), y.checked_add(y_offset)) else {
            continue;
        };

        let color = pixel.color.to_native();
        // clipped pixels fall out here too
        if mirror.get(x, y).is_ok_and(|current| current.packed() != color) {
            idx_buf.push((x, y, color));
        }
    }
}

/// Rejects frames whose pixel count does not match their declared shape.
fn validate(frames: &ArchivedVec<ArchivedStencil>) -> anyhow::Result<()> {
    anyhow::ensure!(!frames.is_empty(), "stencil archive has no frames");

    for (idx, frame) in frames.iter().enumerate() {
        let (width, height) = (frame.width.to_native(), frame.height.to_native());
        anyhow::ensure!(
            width != 0 && height != 0,
            "frame {idx} has an empty shape ({width}x{height})"
        );
        anyhow::ensure!(
            frame.pixels.len() == width as usize * height as usize,
            "frame {idx} holds {} pixels, expected {width}x{height}",
            frame.pixels.len()
        );
    }

    Ok(())
}

async fn paint_pass(
    idx_buf: &mut Vec<(u16, u16, u32)>,
    session: &Shared,
    writer: &mut OwnedWriteHalf<TcpStream>,
    stencil: &ArchivedStencil,
    offset: (u16, u16),
) -> mural_common::Result<usize> {
    pending(idx_buf, &session.borrow(), stencil, offset);
    idx_buf.shuffle(&mut rand::thread_rng());

    for &(x, y, color) in idx_buf.iter() {
        let edit = {
            let mut session = session.borrow_mut();
            session.arm(color);
            session.paint(x, y)?
        };

        transport::write_frame(writer, edit.encode().to_vec()).await?;
    }

    Ok(idx_buf.len())
}

/// Applies everything the hub sends to the mirror until the stream ends.
async fn follow(session: Shared, mut reader: OwnedReadHalf<TcpStream>) {
    let max_len = session.borrow().dimensions().snapshot_len();

    loop {
        let payload = match transport::read_frame(&mut reader, max_len).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!("hub closed the connection");
                break;
            }
            Err(error) => {
                error!(?error, "receiving failed");
                break;
            }
        };

        let result = session.borrow_mut().receive(payload);
        match result {
            Ok(Update::Full) => info!("canvas synchronised"),
            Ok(Update::Pixel(edit)) => trace!(?edit, "remote edit"),
            Ok(Update::Dropped) => debug!("dropped early delta"),
            Err(error @ (Error::MalformedMessage { .. } | Error::OutOfBounds { .. })) => {
                warn!(%error, "ignoring frame");
            }
            Err(error) => {
                error!(%error, "session failed");
                break;
            }
        }
    }

    session.borrow_mut().close();
}

async fn connect(addr: SocketAddr) -> anyhow::Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn run(args: Args, frames: &ArchivedVec<ArchivedStencil>) -> anyhow::Result<()> {
    info!(addr = %args.addr, "connecting..");
    let stream = connect(args.addr).await?;
    let (reader, mut writer) = stream.into_split();

    let session = Rc::new(RefCell::new(SyncSession::new(CANVAS)));
    session.borrow_mut().connected()?;
    monoio::spawn(follow(Rc::clone(&session), reader));

    while session.borrow().state() == SessionState::AwaitingSnapshot {
        monoio::time::sleep(Duration::from_millis(10)).await;
    }

    let offset = (args.x_offset, args.y_offset);
    let frame_duration = args.framerate.map(|rate| Duration::from_secs_f32(1.0 / rate));
    let interval = Duration::from_millis(args.interval_ms);

    let mut idx_buf = Vec::new();
    let mut frame_ctr = 0;

    info!("starting to paint");

    loop {
        if session.borrow().state() != SessionState::Live {
            anyhow::bail!("lost the connection to the hub");
        }

        let started = Instant::now();
        let painted =
            paint_pass(&mut idx_buf, &session, &mut writer, &frames[frame_ctr], offset).await?;
        info!(frame = frame_ctr, painted, elapsed = ?started.elapsed(), "painted pass");

        if let Some(frame_duration) = frame_duration {
            monoio::time::sleep(frame_duration.saturating_sub(started.elapsed())).await;

            frame_ctr += 1;
            frame_ctr %= frames.len();
        } else if args.watch {
            monoio::time::sleep(interval).await;
        } else {
            break;
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    info!("loading stencils..");
    let data_file = File::open(&args.data)?;
    let data = unsafe { memmap2::Mmap::map(&data_file)? };

    let frames: &ArchivedVec<ArchivedStencil> = if args.skip_checks {
        unsafe { rkyv::access_unchecked(&data) }
    } else {
        rkyv::access::<_, rkyv::rancor::Error>(&data)?
    };
    validate(frames)?;

    info!(frames = frames.len(), "loaded stencils successfully");

    if let Some(at_timestamp) = args.start_at {
        info!("waiting until {at_timestamp}..");
        let point_in_time = SystemTime::UNIX_EPOCH + Duration::from_secs(at_timestamp);
        let duration = point_in_time.duration_since(SystemTime::now())?;

        thread::sleep(duration);
    }

    let mut runtime = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
        .enable_timer()
        .build()?;

    runtime.block_on(run(args, frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mural_common::{Stencil, StencilPixel};

    fn check(stencils: Vec<Stencil>) -> anyhow::Result<()> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&stencils).unwrap();
        let frames =
            rkyv::access::<ArchivedVec<ArchivedStencil>, rkyv::rancor::Error>(&bytes).unwrap();
        validate(frames)
    }

    fn stencil(width: u16, height: u16, pixels: usize) -> Stencil {
        Stencil {
            width,
            height,
            pixels: vec![
                StencilPixel {
                    color: 0xFF0000FF,
                    draw: true,
                };
                pixels
            ],
        }
    }

    #[test]
    fn accepts_well_formed_frames() {
        check(vec![stencil(2, 3, 6), stencil(1, 1, 1)]).unwrap();
    }

    #[test]
    fn rejects_zero_width() {
        assert!(check(vec![stencil(0, 4, 4)]).is_err());
    }

    #[test]
    fn rejects_pixel_count_mismatch() {
        assert!(check(vec![stencil(2, 2, 3)]).is_err());
        assert!(check(vec![stencil(2, 3, 6), stencil(4, 4, 17)]).is_err());
    }

    #[test]
    fn rejects_empty_archive() {
        assert!(check(Vec::new()).is_err());
    }
}
