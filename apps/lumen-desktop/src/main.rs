use anyhow::{Context, Result};
use clap::Parser;
use lumen_assets::SceneConfig;
use lumen_render::{Session, Tick, TickOutcome, bootstrap};
use lumen_render_wgpu::WgpuDevice;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "lumen-desktop", about = "Render a scene in a window")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene file (YAML); built-in defaults when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Override the scene's vertex shader path
    #[arg(long)]
    vertex: Option<PathBuf>,

    /// Override the scene's fragment shader path
    #[arg(long)]
    fragment: Option<PathBuf>,
}

/// Window, device and session. Created on the first `resumed`.
struct Running {
    window: Arc<Window>,
    device: WgpuDevice,
    session: Session,
}

struct DesktopApp {
    scene: SceneConfig,
    running: Option<Running>,
    started: Instant,
    exit_requested: bool,
    fatal: Option<anyhow::Error>,
}

impl DesktopApp {
    fn new(scene: SceneConfig) -> Self {
        Self {
            scene,
            running: None,
            started: Instant::now(),
            exit_requested: false,
            fatal: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attrs = Window::default_attributes()
            .with_title(self.scene.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.scene.window.width, self.scene.window.height))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attrs).context("failed to create window")?);

        let size = window.inner_size();
        let mut device =
            WgpuDevice::new(window.clone(), size.width, size.height).context("failed to initialize the GPU")?;
        let aspect = size.width.max(1) as f32 / size.height.max(1) as f32;
        let renderer = bootstrap(&mut device, &self.scene, aspect)?;

        Ok(Running {
            window,
            device,
            session: Session::new(renderer),
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{error:#}");
        self.fatal = Some(error);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(Running {
            mut device, session, ..
        }) = self.running.take()
        {
            let renderer = session.into_renderer();
            tracing::info!(frames = renderer.frame_index(), "shutting down");
            if let Err(e) = renderer.release(&mut device) {
                tracing::warn!("failed to release GPU objects: {e}");
            }
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for DesktopApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() || self.fatal.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                self.started = Instant::now();
                self.running = Some(running);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.exit_requested = true;
                if let Some(running) = &self.running {
                    running.window.request_redraw();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(running) = &mut self.running {
                    running.device.resize(size.width, size.height);
                    let aspect = size.width.max(1) as f32 / size.height.max(1) as f32;
                    let transforms = self.scene.transform_builder(aspect).build();
                    running.session.renderer_mut().set_transforms(transforms);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(running) = &mut self.running else {
                    return;
                };
                let tick = Tick {
                    time: self.started.elapsed().as_secs_f64(),
                    exit_requested: self.exit_requested,
                };
                match running.session.advance(&mut running.device, tick) {
                    Ok(TickOutcome::Presented(_)) => {}
                    Ok(TickOutcome::Finished) => self.shutdown(event_loop),
                    Err(e) => self.fail(event_loop, e.into()),
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    tracing::info!("lumen-desktop starting");

    let mut scene = match &cli.scene {
        Some(path) => SceneConfig::load(path)?,
        None => SceneConfig::default(),
    };
    if let Some(vertex) = cli.vertex {
        scene.shaders.vertex = vertex;
    }
    if let Some(fragment) = cli.fragment {
        scene.shaders.fragment = fragment;
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = DesktopApp::new(scene);
    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
