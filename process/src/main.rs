#[macro_use]
extern crate tracing;

use anyhow::Context;
use image::GenericImageView;
use itertools::Itertools;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(argh::FromArgs)]
/// turn images into a stencil archive for the mural painter
struct Args {
    #[argh(positional)]
    /// image files, or directories of image files
    paths: Vec<PathBuf>,

    #[argh(option)]
    /// path to output file
    output: PathBuf,
}

fn expand(path: PathBuf) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path]);
    }

    let entries: Vec<PathBuf> = fs::read_dir(&path)?
        .map_ok(|entry| entry.path())
        .try_collect()?;

    Ok(entries.into_iter().filter(|entry| entry.is_file()).sorted().collect())
}

fn read_stencil(path: &Path) -> anyhow::Result<mural_common::Stencil> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let (width, height) = image.dimensions();
    let width = u16::try_from(width).context("image too wide")?;
    let height = u16::try_from(height).context("image too tall")?;

    let pixels = image
        .to_rgba8()
        .pixels()
        .map(|pixel| mural_common::StencilPixel {
            color: u32::from_le_bytes(pixel.0),
            draw: pixel.0[3] != 0,
        })
        .collect_vec();

    Ok(mural_common::Stencil {
        width,
        height,
        pixels,
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = argh::from_env();

    let files: Vec<PathBuf> = args
        .paths
        .into_iter()
        .map(expand)
        .flatten_ok()
        .try_collect()?;
    anyhow::ensure!(!files.is_empty(), "no images given");

    let stencils: Vec<mural_common::Stencil> = files
        .iter()
        .map(|path| {
            let stencil = read_stencil(path)?;
            info!(
                path = %path.display(),
                width = stencil.width,
                height = stencil.height,
                "processed frame"
            );
            anyhow::Ok(stencil)
        })
        .try_collect()?;

    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&stencils)?;

    let file = File::create(&args.output)?;
    let mut file = BufWriter::new(file);
    file.write_all(&bytes)?;
    file.flush()?;

    info!(frames = stencils.len(), bytes = bytes.len(), "wrote stencil archive");

    Ok(())
}
