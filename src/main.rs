use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dwi_qc::{DatasetPaths, NiftiWriter, Orientation, QcConfig, QcError, Session, UiEvent};
use log::{error, info, warn};

/// Review diffusion directions and save a copy without the excluded ones.
#[derive(Parser)]
#[command(name = "dwi-qc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 4D NIfTI image
    #[arg(long)]
    image: Option<PathBuf>,

    /// b-values text file
    #[arg(long)]
    bvals: Option<PathBuf>,

    /// b-vectors text file
    #[arg(long)]
    bvecs: Option<PathBuf>,

    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directions to exclude, e.g. "[3, 17]"
    #[arg(short, long)]
    exclude: Option<String>,

    /// Write the three centre previews of every direction as PNG files
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Save the QC-edited dataset next to the input
    #[arg(long)]
    save: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => QcConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => QcConfig::default(),
    };
    let mut session = Session::new(config);

    let paths = match (&cli.image, &cli.bvals, &cli.bvecs) {
        (Some(image), Some(bvals), Some(bvecs)) => DatasetPaths::new(image, bvals, bvecs),
        (None, None, None) => {
            info!("No dataset given, nothing to load");
            return Ok(());
        }
        _ => {
            warn!("--image, --bvals and --bvecs must be given together, nothing to load");
            return Ok(());
        }
    };

    let mut report = |direction: usize| info!("rescaled direction {direction}");
    session
        .load_from_paths(paths.clone(), Some(&mut report))
        .with_context(|| format!("loading {}", paths.image.display()))?;
    print_summary(&session);

    if let Some(list) = cli.exclude {
        match session.handle(UiEvent::EditExclusions(list)) {
            Ok(_) => {}
            Err(QcError::Validation(e)) => {
                error!("Rejected exclusion list: {e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
    println!("excluded: {}", session.exclusion_text());

    if let Some(dir) = &cli.preview_dir {
        write_previews(&mut session, dir)?;
    }

    if cli.save {
        match session.save(&NiftiWriter) {
            Ok(Some(outcome)) => {
                println!("saved {}", outcome.image.display());
                println!("log   {}", outcome.log.display());
            }
            Ok(None) => println!("Nothing to do!"),
            Err(e) => error!("{e}"),
        }
    }
    Ok(())
}

fn print_summary(session: &Session) {
    let Some(dataset) = session.dataset() else {
        return;
    };
    let (x, y, z, d) = dataset.volume().dim();
    let spacing = dataset.volume().spacing();
    println!(
        "volume {x}x{y}x{z}, {d} directions, spacing {:.3} x {:.3} x {:.3}",
        spacing[0], spacing[1], spacing[2]
    );
    for direction in 0..d {
        if let Some((b_value, [gx, gy, gz])) = dataset.directions().get(direction) {
            println!("  {direction:>3}: b={b_value:<6} g=({gx:.4}, {gy:.4}, {gz:.4})");
        }
    }
}

fn write_previews(session: &mut Session, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let directions = session.dataset().map_or(0, |d| d.signal_length());
    for direction in 0..directions {
        session.handle(UiEvent::SelectDirection(direction))?;
        for orientation in Orientation::ALL {
            let Some(image) = session.render(orientation) else {
                continue;
            };
            let name = format!("d{direction:03}_{}.png", format!("{orientation:?}").to_lowercase());
            image
                .save(dir.join(&name))
                .with_context(|| format!("writing preview {name}"))?;
        }
    }
    info!("Wrote previews of {directions} directions to {}", dir.display());
    Ok(())
}
