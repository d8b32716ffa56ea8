use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;
use serde_json::json;

use lithos::config::{load_scene_config, SceneConfig};
use lithos::error_codes::{find_coded_error, CodedError};
use lithos::fracture::CeilingFracture;
use lithos::glyphs::GlyphCache;
use lithos::room::Surface;
use lithos::session::{evaluate_command, load_session_script, Session, SessionScript};
use lithos::texture::{LayoutOnlyBuilder, PixmapTextureBuilder, SurfaceTextureBuilder};

const MAX_VIEWPORT_EDGE: u32 = 8192;

#[derive(Debug, Parser)]
#[command(name = "lithos")]
#[command(about = "Lithos Room: letters pulled off the walls and flown to the back wall")]
#[command(version, long_version = env!("LITHOS_LONG_VERSION"))]
struct Cli {
    /// Machine-readable output; errors become a JSON envelope on stderr.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate a scene and summarize it.
    Check { scene: Option<PathBuf> },
    /// Per-letter supply across the four walls.
    Capacity { scene: Option<PathBuf> },
    /// Replay a command script headlessly.
    Simulate {
        scene: Option<PathBuf>,
        #[arg(long)]
        script: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Rasterize textures and write them here as PNG.
        #[arg(long = "png-dir")]
        png_dir: Option<PathBuf>,
        /// Glyph image directory (A.png .. Z.png); overrides the scene.
        #[arg(long)]
        glyphs: Option<PathBuf>,
    },
    /// Poses of one command's letters at a point in time.
    Pose {
        scene: Option<PathBuf>,
        #[arg(long)]
        command: String,
        #[arg(long)]
        at: f64,
    },
    /// Shatter the flat 2D ceiling and render the result.
    Fracture {
        #[arg(long, default_value_t = 800)]
        width: u32,
        #[arg(long, default_value_t = 600)]
        height: u32,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Click position as X,Y; repeatable.
        #[arg(long = "click")]
        clicks: Vec<String>,
        /// Frames of debris motion after the clicks.
        #[arg(long, default_value_t = 0)]
        frames: u32,
        /// Scene whose fracture layout to use.
        #[arg(long)]
        scene: Option<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error, cli.json),
    }
}

fn report_error(error: &anyhow::Error, json: bool) -> ExitCode {
    if let Some(coded) = find_coded_error(error) {
        if json {
            match serde_json::to_string(&coded.envelope()) {
                Ok(envelope) => eprintln!("{envelope}"),
                Err(_) => eprintln!("error: {coded}"),
            }
        } else {
            eprintln!("error: {coded}");
        }
        return ExitCode::from(coded.exit_code() as u8);
    }
    eprintln!("error: {error:#}");
    ExitCode::FAILURE
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Check { scene } => run_check(scene.as_deref()),
        Commands::Capacity { scene } => run_capacity(scene.as_deref(), cli.json),
        Commands::Simulate {
            scene,
            script,
            output,
            png_dir,
            glyphs,
        } => run_simulate(
            scene.as_deref(),
            script,
            output.as_deref(),
            png_dir.as_deref(),
            glyphs.as_deref(),
        ),
        Commands::Pose { scene, command, at } => {
            run_pose(scene.as_deref(), command, *at, cli.json)
        }
        Commands::Fracture {
            width,
            height,
            seed,
            clicks,
            frames,
            scene,
            output,
        } => run_fracture(
            *width,
            *height,
            *seed,
            clicks,
            *frames,
            scene.as_deref(),
            output,
        ),
    }
}

/// The built-in scene when `path` is absent.
fn load_scene(path: Option<&Path>) -> Result<SceneConfig> {
    let Some(path) = path else {
        return Ok(SceneConfig::default());
    };
    load_scene_config(path).map_err(|error| {
        CodedError::config_invalid(format!("{error:#}"))
            .with_details(json!({ "path": path.display().to_string() }))
            .into()
    })
}

fn load_script(path: &Path) -> Result<SessionScript> {
    load_session_script(path).map_err(|error| {
        CodedError::script_invalid(format!("{error:#}"))
            .with_details(json!({ "path": path.display().to_string() }))
            .into()
    })
}

fn run_check(scene_path: Option<&Path>) -> Result<()> {
    let config = load_scene(scene_path)?;
    let label = scene_path.map_or_else(|| "<default scene>".to_owned(), |p| p.display().to_string());

    println!(
        "OK: {} (room {}x{}x{}, back wall {}x{}, max {} live letters)",
        label,
        config.room.width,
        config.room.height,
        config.room.depth,
        config.back_wall.rows,
        config.back_wall.cols,
        config.max_live_letters
    );
    for surface in Surface::SOURCES {
        let surface_config = config.surfaces.get(surface);
        println!(
            "  {:<8} {}x{} grid on {}x{} px, {} letters",
            surface.as_str(),
            surface_config.rows,
            surface_config.cols,
            surface_config.texture.w,
            surface_config.texture.h,
            surface_config.capacity().values().sum::<usize>()
        );
    }
    Ok(())
}

fn run_capacity(scene_path: Option<&Path>, json_output: bool) -> Result<()> {
    let config = load_scene(scene_path)?;
    let capacity = config.letter_capacity();
    if json_output {
        println!("{}", serde_json::to_string_pretty(&capacity)?);
        return Ok(());
    }
    for ch in 'A'..='Z' {
        println!("{ch}: {}", capacity.get(&ch).copied().unwrap_or(0));
    }
    Ok(())
}

fn run_simulate(
    scene_path: Option<&Path>,
    script_path: &Path,
    output: Option<&Path>,
    png_dir: Option<&Path>,
    glyphs: Option<&Path>,
) -> Result<()> {
    let mut config = load_scene(scene_path)?;
    let script = load_script(script_path)?;
    if let Some(glyphs) = glyphs {
        config.glyph_dir = Some(glyphs.to_path_buf());
    }

    match png_dir {
        Some(dir) => {
            let builder = PixmapTextureBuilder::new(GlyphCache::new(config.glyph_dir.clone()));
            simulate_with(config, builder, &script, output, Some(dir))
        }
        None => simulate_with(config, LayoutOnlyBuilder, &script, output, None),
    }
}

fn simulate_with<B: SurfaceTextureBuilder>(
    config: SceneConfig,
    builder: B,
    script: &SessionScript,
    output: Option<&Path>,
    png_dir: Option<&Path>,
) -> Result<()> {
    let mut session = Session::new(config, builder)?;
    let report = session.run(script)?;
    let rendered = serde_json::to_string_pretty(&report).context("failed to encode report")?;

    if let Some(dir) = png_dir {
        let written = session.write_pngs(dir)?;
        info!("wrote {} png file(s) to {}", written.len(), dir.display());
    }
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_pose(scene_path: Option<&Path>, command: &str, at: f64, json_output: bool) -> Result<()> {
    if !at.is_finite() || at < 0.0 {
        return Err(CodedError::usage(format!("--at must be finite and >= 0, got {at}")).into());
    }
    let config = load_scene(scene_path)?;
    let letters = evaluate_command(config, LayoutOnlyBuilder, command, at)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&letters)?);
        return Ok(());
    }
    for letter in &letters {
        println!(
            "{} {} {:?} pos=({:.3}, {:.3}, {:.3}) visible={}",
            letter.id,
            letter.ch,
            letter.phase,
            letter.position.x,
            letter.position.y,
            letter.position.z,
            letter.visible
        );
    }
    Ok(())
}

fn parse_click(raw: &str) -> Result<(f32, f32)> {
    let parsed = raw.split_once(',').and_then(|(x, y)| {
        let x = x.trim().parse::<f32>().ok()?;
        let y = y.trim().parse::<f32>().ok()?;
        (x.is_finite() && y.is_finite()).then_some((x, y))
    });
    parsed.ok_or_else(|| CodedError::usage(format!("--click expects X,Y, got '{raw}'")).into())
}

fn run_fracture(
    width: u32,
    height: u32,
    seed: u64,
    clicks: &[String],
    frames: u32,
    scene_path: Option<&Path>,
    output: &Path,
) -> Result<()> {
    for (label, value) in [("--width", width), ("--height", height)] {
        if value == 0 || value > MAX_VIEWPORT_EDGE {
            return Err(CodedError::usage(format!(
                "{label} must be within 1..={MAX_VIEWPORT_EDGE}, got {value}"
            ))
            .into());
        }
    }
    let clicks = clicks
        .iter()
        .map(|raw| parse_click(raw))
        .collect::<Result<Vec<_>>>()?;
    let config = load_scene(scene_path)?;

    let mut fracture = CeilingFracture::new(width, height, &config.fracture, seed);
    let mut broken = 0;
    for (x, y) in clicks {
        broken += fracture.click(x, y);
    }
    for _ in 0..frames {
        fracture.step();
    }

    let pixmap = fracture.render()?;
    pixmap
        .save_png(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Wrote {} ({} of {} cells broken, {} debris)",
        output.display(),
        broken,
        fracture.seeds().len(),
        fracture.debris().len()
    );
    Ok(())
}
