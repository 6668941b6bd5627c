mod grid;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Mat4;
use grid::CharGrid;
use lumen_assets::{SceneConfig, load_shader_pair};
use lumen_render::{DeviceCall, FixedTicks, HeadlessDevice, Host, Session, bootstrap, load_program};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen-cli", about = "CLI tool for lumen shader pipelines")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Compile and link a shader pair without a GPU
    Check {
        /// Vertex shader (WGSL)
        vertex: PathBuf,
        /// Fragment shader (WGSL)
        fragment: PathBuf,
    },
    /// Print the projection, view, model and MVP matrices of a scene
    Mvp {
        /// Scene file (YAML); built-in defaults when omitted
        #[arg(long)]
        scene: Option<PathBuf>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run a scene on the headless device and summarize the device calls
    Render {
        /// Scene file (YAML); built-in defaults when omitted
        #[arg(long)]
        scene: Option<PathBuf>,
        /// Number of frames to run
        #[arg(short, long, default_value = "3")]
        frames: u64,
    },
    /// Animate a walker across a character grid in the terminal
    Grid {
        #[arg(long, default_value = "10")]
        width: usize,
        #[arg(long, default_value = "10")]
        height: usize,
        /// Frames per second
        #[arg(long, default_value = "30")]
        fps: u32,
        /// Number of frames to show
        #[arg(short, long, default_value = "100")]
        frames: u64,
    },
}

#[derive(Serialize)]
struct MatrixReport {
    projection: Mat4,
    view: Mat4,
    model: Mat4,
    mvp: Mat4,
}

fn load_scene(path: Option<&Path>) -> anyhow::Result<SceneConfig> {
    Ok(match path {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    })
}

fn print_matrix(name: &str, m: &Mat4) {
    println!("{name}:");
    for row in 0..4 {
        let r = m.row(row);
        println!("  [{:>9.4} {:>9.4} {:>9.4} {:>9.4}]", r.x, r.y, r.z, r.w);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("assets: {}", lumen_assets::crate_info());
            println!("render: {}", lumen_render::crate_info());
        }
        Commands::Check { vertex, fragment } => {
            let (vertex, fragment) = load_shader_pair(&vertex, &fragment)?;
            let mut device = HeadlessDevice::new();
            let program = load_program(&mut device, &vertex, &fragment)?;

            println!("Linked {} + {}", vertex.name(), fragment.name());
            if program.active_uniforms().next().is_none() {
                println!("No active uniforms");
            }
            for uniform in program.active_uniforms() {
                println!(
                    "  uniform {:<12} {:<12} location {}",
                    uniform.name, uniform.kind, uniform.location.index
                );
            }
            program.release(&mut device)?;
        }
        Commands::Mvp { scene, json } => {
            let scene = load_scene(scene.as_deref())?;
            let t = scene.transform_builder(scene.aspect()).build();
            let report = MatrixReport {
                projection: t.projection,
                view: t.view,
                model: t.model,
                mvp: t.mvp(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_matrix("projection", &report.projection);
                print_matrix("view", &report.view);
                print_matrix("model", &report.model);
                print_matrix("mvp", &report.mvp);
            }
        }
        Commands::Render { scene, frames } => {
            let scene = load_scene(scene.as_deref())?;
            tracing::info!(frames, "running headless session");
            let mut device = HeadlessDevice::new();
            let renderer = bootstrap(&mut device, &scene, scene.aspect())?;
            let mut session = Session::new(renderer);

            let presented = session
                .run(&mut device, &mut FixedTicks::new(frames, 1.0 / 60.0))
                .context("headless session failed")?;

            let calls = device.calls();
            let count = |f: fn(&DeviceCall) -> bool| calls.iter().filter(|c| f(c)).count();
            println!("Frames presented: {presented}");
            println!("Draw calls: {:?}", device.draw_calls());
            println!(
                "Uniform uploads: {}",
                count(|c| matches!(c, DeviceCall::SetUniform { .. }))
            );
            println!(
                "Attribute binds: {}",
                count(|c| matches!(c, DeviceCall::AttributePointer { .. }))
            );
            println!("Device calls: {}", calls.len());

            session.into_renderer().release(&mut device)?;
        }
        Commands::Grid {
            width,
            height,
            fps,
            frames,
        } => {
            let mut grid = CharGrid::new(width, height);
            let mut host = FixedTicks::new(frames, 1.0 / f64::from(fps.max(1))).paced(fps);
            let mut out = std::io::stdout().lock();
            while !host.next_tick().exit_requested {
                // Clear the screen and home the cursor.
                write!(out, "\x1b[2J\x1b[H{grid}")?;
                out.flush()?;
                grid.step();
            }
        }
    }

    Ok(())
}
