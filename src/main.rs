use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use pathtracer_gpu::display::Presenter;
use pathtracer_gpu::input::{CameraController, InputState};
use pathtracer_gpu::pathtracer_shared::glam::vec3;
use pathtracer_gpu::pathtracer_shared::{CameraUniform, PathTracerConfig};
use pathtracer_gpu::{load_gltf, CpuRenderer, GpuContext, RenderConfig, Renderer, Scene};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::EventLoop,
    window::WindowBuilder,
};

/// Progressive LBVH path tracer
#[derive(Parser, Debug)]
#[command(name = "pathtracer", version, about)]
struct Args {
    /// glTF or GLB scene; the built-in Cornell box when omitted
    #[arg(long)]
    scene: Option<PathBuf>,

    #[arg(long, default_value_t = 800)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// BRDF sampled bounces after the primary hit
    #[arg(long, default_value_t = PathTracerConfig::DEFAULT_BOUNCES)]
    bounces: u32,

    /// Traversal counters, pass timestamps and BVH line read-back
    #[arg(long)]
    debug: bool,

    /// Render without a window and write the image to --output
    #[arg(long)]
    headless: bool,

    /// Frames accumulated in headless mode
    #[arg(long, default_value_t = 64)]
    frames: u32,

    #[arg(long, default_value = "out.png")]
    output: PathBuf,

    /// Headless rendering on the CPU reference backend
    #[arg(long)]
    cpu: bool,
}

impl Args {
    fn render_config(&self) -> RenderConfig {
        RenderConfig::default()
            .with_size(self.width, self.height)
            .with_bounces(self.bounces)
            .with_debug(self.debug)
    }

    fn load_scene(&self) -> anyhow::Result<Scene> {
        match &self.scene {
            Some(path) => load_gltf(path).with_context(|| format!("loading scene {}", path.display())),
            None => Ok(Scene::cornell_box()),
        }
    }
}

fn default_camera() -> CameraUniform {
    CameraUniform::look_at(vec3(0.0, 1.0, 5.0), vec3(0.0, 1.0, 0.0), vec3(0.0, 1.0, 0.0), 45.0, 0.01, 1000.0)
}

fn run_headless(args: &Args, scene: &Scene, camera: &CameraUniform) -> anyhow::Result<()> {
    let config = args.render_config();
    let start = Instant::now();

    let image = if args.cpu {
        let mut renderer = CpuRenderer::new(config);
        renderer.set_scene(scene)?;
        for _ in 0..args.frames.max(1) {
            renderer.render(camera);
        }
        if args.debug {
            info!("{:?}", renderer.debug_stats()?);
        }
        renderer.read_image()?
    } else {
        let mut renderer = Renderer::new(config);
        pollster::block_on(renderer.init())?;
        renderer.set_scene(scene)?;
        for _ in 0..args.frames.max(1) {
            renderer.render(camera)?;
        }
        if args.debug {
            info!("{:?}", renderer.debug_stats()?);
        }
        renderer.read_image()?
    };

    image
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!(
        "Wrote {} after {} frames in {:.2}s",
        args.output.display(),
        args.frames.max(1),
        start.elapsed().as_secs_f32()
    );
    Ok(())
}

/// Window, renderer and camera state of the interactive viewer
struct Viewer {
    context: Arc<GpuContext>,
    renderer: Renderer,
    presenter: Presenter,
    input: InputState,
    controller: CameraController,
    debug: bool,
    start_time: Instant,
    frame_count: u64,
}

impl Viewer {
    fn resize(&mut self, size: PhysicalSize<u32>) -> pathtracer_gpu::Result<()> {
        self.presenter
            .resize(&self.context, &mut self.renderer, size.width, size.height)
    }

    /// Steps the overlay depth by `delta` levels, or toggles parent boxes.
    fn adjust_overlay(&mut self, delta: i32, toggle_parents: bool) -> pathtracer_gpu::Result<()> {
        let overlay = self.renderer.line_overlay()?;
        if toggle_parents {
            self.renderer.set_bvh_show_parents(overlay.show_parents == 0)?;
        }
        let level = overlay.level.saturating_add_signed(delta);
        self.renderer.set_bvh_level(level)?;
        info!("BVH overlay level {}", level);
        Ok(())
    }

    fn render(&mut self) -> pathtracer_gpu::Result<()> {
        self.frame_count += 1;
        let frame = self.renderer.render(&self.controller.uniform())?;
        self.presenter.present(&self.context, &self.renderer)?;

        // Log performance stats every 60 frames
        if self.frame_count % 60 == 0 {
            let fps = self.frame_count as f32 / self.start_time.elapsed().as_secs_f32();
            info!("FPS: {:.1}, accumulated frames: {}", fps, frame);
            if self.debug {
                info!("{:?}", self.renderer.debug_stats()?);
            }
        }
        Ok(())
    }
}

fn run_windowed(args: &Args, scene: &Scene, camera: &CameraUniform) -> anyhow::Result<()> {
    let config = args.render_config();
    let debug = config.debug;
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("LBVH Path Tracer")
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .build(&event_loop)?;

    let (context, surface) = pollster::block_on(GpuContext::with_window(&window, &config))?;
    let context = Arc::new(context);

    let mut renderer = Renderer::new(config.clone());
    renderer.init_with_context(context.clone())?;
    renderer.set_scene(scene)?;

    let size = window.inner_size();
    let presenter = Presenter::new(&context, surface, size.width, size.height, debug);
    renderer.resize(size.width, size.height)?;

    let mut viewer = Viewer {
        context,
        renderer,
        presenter,
        input: InputState::new(),
        controller: CameraController::from_uniform(camera),
        debug,
        start_time: Instant::now(),
        frame_count: 0,
    };

    event_loop.run(move |event, _, control_flow| match event {
        Event::WindowEvent { ref event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => control_flow.set_exit(),
            WindowEvent::Resized(physical_size) => {
                if let Err(e) = viewer.resize(*physical_size) {
                    error!("Resize failed: {}", e);
                }
            }
            WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                if let Err(e) = viewer.resize(**new_inner_size) {
                    error!("Resize failed: {}", e);
                }
            }
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(key),
                        ..
                    },
                ..
            } => match key {
                VirtualKeyCode::Space => {
                    if let Err(e) = viewer.renderer.reset_accumulation() {
                        warn!("Reset ignored: {}", e);
                    }
                }
                VirtualKeyCode::W => viewer.controller.translate(1.0, 0.0),
                VirtualKeyCode::S => viewer.controller.translate(-1.0, 0.0),
                VirtualKeyCode::A => viewer.controller.translate(0.0, -1.0),
                VirtualKeyCode::D => viewer.controller.translate(0.0, 1.0),
                VirtualKeyCode::Up | VirtualKeyCode::Down | VirtualKeyCode::P if viewer.debug => {
                    let delta = match key {
                        VirtualKeyCode::Up => 1,
                        VirtualKeyCode::Down => -1,
                        _ => 0,
                    };
                    if let Err(e) = viewer.adjust_overlay(delta, *key == VirtualKeyCode::P) {
                        warn!("Overlay change ignored: {}", e);
                    }
                }
                VirtualKeyCode::Escape => control_flow.set_exit(),
                _ => {}
            },
            WindowEvent::MouseInput { button, state, .. } => {
                viewer.input.handle_mouse_input(*button, *state);
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some((delta_x, delta_y)) = viewer.input.handle_cursor_moved(*position) {
                    viewer.controller.rotate(delta_x, delta_y);
                }
            }
            _ => {}
        },
        Event::RedrawRequested(window_id) if window_id == window.id() => {
            if let Err(e) = viewer.render() {
                error!("Frame failed: {}", e);
                control_flow.set_exit();
            }
        }
        Event::MainEventsCleared => {
            window.request_redraw();
        }
        _ => {}
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let scene = args.load_scene()?;
    let camera = scene.camera.unwrap_or_else(default_camera);

    if args.headless || args.cpu {
        run_headless(&args, &scene, &camera)
    } else {
        run_windowed(&args, &scene, &camera)
    }
}
