use egui::Context;
use egui_wgpu::wgpu::StoreOp;
use egui_wgpu::{Renderer, RendererOptions, ScreenDescriptor, wgpu};
use egui_winit::{ActionRequested, State};
use serde::{Deserialize, Serialize};
use wgpu::{Color, ExperimentalFeatures, LoadOp};
use winit::event::WindowEvent;
use winit::window::{Window, WindowId};
use egui_wgpu::wgpu::SurfaceError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use std::{fs, time};
use toml::Value;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event_loop::ActiveEventLoop;

use crate::ui::TripApp;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:9000";
pub const DEFAULT_TILE_URL_PATTERN: &str = "https://a.tile.openstreetmap.fr/hot/{z}/{x}/{y}.png";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub window_size_startup: [f32; 2],
    pub start_in_fullscreen: bool,
    pub api_base_url: String,
    pub tile_url_pattern: String,
}

pub fn default_userconfig_path() -> PathBuf {
    PathBuf::from("trip_log_data").join("userconfig.toml")
}

fn toml_number(value: &Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

/// Per-key extraction with defaults, so a partial or half-broken config
/// still starts the app instead of erroring out.
fn config_from_toml(contents: &str) -> Config {
    let parsed = match contents.parse::<toml::Table>() {
        Ok(table) => table,
        _ => Default::default(),
    };

    let window_size_startup = parsed
        .get("window_size_startup")
        .and_then(|v| v.as_array())
        .and_then(|items| {
            let numbers: Option<Vec<f32>> =
                items.iter().map(|i| toml_number(i).map(|n| n as f32)).collect();
            numbers.and_then(|nums| {
                if nums.len() == 2 {
                    Some([nums[0], nums[1]])
                } else {
                    None
                }
            })
        })
        .filter(|size| !size.iter().any(|x| *x < 200.0))
        .unwrap_or([1280.0, 720.0]);

    let start_in_fullscreen = parsed
        .get("start_in_fullscreen")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let api_base_url = parsed
        .get("api_base_url")
        .and_then(|v| v.as_str())
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

    let tile_url_pattern = parsed
        .get("tile_url_pattern")
        .and_then(|v| v.as_str())
        .filter(|s| s.contains("{z}") && s.contains("{x}") && s.contains("{y}"))
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_TILE_URL_PATTERN.to_string());

    Config {
        window_size_startup,
        start_in_fullscreen,
        api_base_url,
        tile_url_pattern,
    }
}

/// Reads the user config, filling gaps with defaults, and writes the
/// normalized file back so every known key is visible for editing.
pub fn get_check_and_set_config(config_path: &Path) -> Config {
    let contents = match fs::read_to_string(config_path) {
        Ok(thing) => thing,
        Err(_) => {
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = fs::File::create(config_path);
            String::new()
        }
    };

    let config = config_from_toml(&contents);

    if let Ok(toml_string) = toml::to_string(&config) {
        let _ = fs::write(config_path, toml_string);
    }

    config
}

pub struct AppState<'a> {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub surface: wgpu::Surface<'a>,
    pub scale_factor: f32,
    pub egui_winit_state: State,
    pub egui_wgpu_renderer: Renderer,
}

impl AppState<'_> {
    async fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        window: &Window,
        width: u32,
        height: u32,
    ) -> Self {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .expect("Failed to find an appropriate adapter");

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
                experimental_features: ExperimentalFeatures::disabled(),
            })
            .await
            .expect("Failed to create device");

        let swapchain_capabilities = surface.get_capabilities(&adapter);

        let swapchain_format = swapchain_capabilities
            .formats
            .iter()
            .copied()
            .find(|format| *format == wgpu::TextureFormat::Bgra8Unorm)
            .unwrap_or(swapchain_capabilities.formats[0]);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: swapchain_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: swapchain_capabilities.alpha_modes[0],
            view_formats: vec![],
        };

        surface.configure(&device, &surface_config);

        let egui_context = Context::default();

        let max_texture_side = device.limits().max_texture_dimension_2d as usize;

        let egui_winit_state = egui_winit::State::new(
            egui_context,
            egui::viewport::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            Some(max_texture_side),
        );

        let renderer_options = RendererOptions {
            msaa_samples: 1,
            depth_stencil_format: None,
            dithering: false,
            predictable_texture_filtering: true,
        };

        let egui_wgpu_renderer = Renderer::new(&device, surface_config.format, renderer_options);

        let scale_factor = window.scale_factor() as f32;

        Self {
            device,
            queue,
            surface,
            surface_config,
            scale_factor,
            egui_wgpu_renderer,
            egui_winit_state,
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn context(&self) -> &Context {
        self.egui_winit_state.egui_ctx()
    }
}

pub struct App<'a> {
    cursor_inside_window: bool,
    window_is_focused: bool,
    instance: wgpu::Instance,
    state: Option<AppState<'a>>,
    window: Option<Arc<Window>>,
    trip_app: TripApp,
    last_active: Option<Instant>,
    in_sleep: bool,
    window_size_startup: [f32; 2],
}

impl<'a> App<'a> {
    pub fn new(trip_app: TripApp, window_size_startup: [f32; 2]) -> Self {
        let instance = egui_wgpu::wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        Self {
            cursor_inside_window: false,
            window_is_focused: false,
            instance,
            state: None,
            window: None,
            trip_app,
            last_active: Some(Instant::now()),
            in_sleep: false,
            window_size_startup,
        }
    }

    async fn set_window(&mut self, window: Window) {
        let window = Arc::new(window);
        let initial_width = self.window_size_startup[0] as u32;
        let initial_height = self.window_size_startup[1] as u32;

        let _ = window.request_inner_size(PhysicalSize::new(initial_width, initial_height));

        let surface = self
            .instance
            .create_surface(window.clone())
            .expect("Failed to create surface!");

        let state = AppState::new(&self.instance, surface, &window, initial_width, initial_height).await;

        self.window.get_or_insert(window);

        let ctx = state.context();
        self.trip_app.init_with_context(ctx);

        self.state.get_or_insert(state);
    }

    fn handle_resized(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            if let Some(state) = self.state.as_mut() {
                state.resize_surface(width, height);
            }
        }
    }

    fn handle_redraw(&mut self, event_loop: &ActiveEventLoop) {
        let window = match &self.window {
            Some(w) => w,
            None => return,
        };

        if window.is_minimized().unwrap_or(false) {
            return;
        }

        let state = match &mut self.state {
            Some(s) => s,
            None => return,
        };

        let raw_input = state.egui_winit_state.take_egui_input(window);

        // idle and unfocused for 10 seconds: stop the continuous redraw loop
        if raw_input.events.is_empty()
            && !state.context().has_requested_repaint()
            && !self.window_is_focused
            && !self.cursor_inside_window
        {
            match self.last_active {
                Some(time) => {
                    if time.elapsed() > time::Duration::from_secs(10) {
                        self.in_sleep = true;
                    }
                }
                None => self.last_active = Some(Instant::now()),
            }
        } else {
            self.last_active = Some(Instant::now());
        }

        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: [state.surface_config.width, state.surface_config.height],
            pixels_per_point: state.scale_factor,
        };

        let surface_texture = match state.surface.get_current_texture() {
            Ok(tex) => tex,
            Err(SurfaceError::Outdated | SurfaceError::Lost) => {
                state.surface.configure(&state.device, &state.surface_config);
                self.window.as_ref().unwrap().request_redraw();
                return;
            }
            Err(SurfaceError::Timeout) => {
                eprintln!("Surface timed out!");
                return;
            }
            Err(SurfaceError::OutOfMemory) => {
                eprintln!("Out of memory!");
                std::process::exit(1);
            }
            Err(_) => return,
        };

        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = state
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });

        state.context().begin_pass(raw_input);

        let is_fullscreen = self
            .window
            .as_ref()
            .and_then(|w| w.fullscreen().map(|_| true))
            .unwrap_or(false);

        let root_id = egui::viewport::ViewportId::ROOT;
        let info = state
            .egui_winit_state
            .egui_input_mut()
            .viewports
            .entry(root_id)
            .or_default();
        info.fullscreen = Some(is_fullscreen);

        let ctx = state.context();
        self.trip_app.ui(ctx);

        let full_output = state.context().end_pass();

        let mut actions_requested: Vec<ActionRequested> = vec![];
        let egui_ctx = state.context().clone();
        let window = &self.window.as_ref().unwrap();

        for (id, output) in full_output.viewport_output.into_iter() {
            if let Some(viewport_info) = state.egui_winit_state.egui_input_mut().viewports.get_mut(&id) {
                egui_winit::process_viewport_commands(
                    &egui_ctx,
                    viewport_info,
                    output.commands,
                    &window,
                    &mut actions_requested,
                );
                if viewport_info
                    .events
                    .iter()
                    .any(|e| matches!(e, egui::ViewportEvent::Close))
                {
                    event_loop.exit();
                }
            }
        }

        state
            .egui_winit_state
            .handle_platform_output(window, full_output.platform_output);

        let ctx = state.context();
        let paint_jobs = ctx.tessellate(full_output.shapes, ctx.pixels_per_point());

        for (id, delta) in &full_output.textures_delta.set {
            state
                .egui_wgpu_renderer
                .update_texture(&state.device, &state.queue, *id, delta);
        }

        state.egui_wgpu_renderer.update_buffers(
            &state.device,
            &state.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui main render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_view,
                    resolve_target: None,
                    ops: egui_wgpu::wgpu::Operations {
                        load: LoadOp::Clear(Color { r: 0.05, g: 0.07, b: 0.09, a: 1.0 }),
                        store: StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            state
                .egui_wgpu_renderer
                .render(&mut rpass.forget_lifetime(), &paint_jobs, &screen_descriptor);
        }

        state.queue.submit(Some(encoder.finish()));
        surface_texture.present();

        for tex_id in full_output.textures_delta.free {
            state.egui_wgpu_renderer.free_texture(&tex_id);
        }
    }
}

impl ApplicationHandler for App<'_> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = event_loop
            .create_window({
                let window_title = format!("TripLog    -   Ver.{}", env!("BUILD_DATE"));
                let minimum_size = LogicalSize::new(600.0, 400.0);

                Window::default_attributes()
                    .with_title(window_title)
                    .with_min_inner_size(minimum_size)
            })
            .unwrap();
        pollster::block_on(self.set_window(window));
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        if let Some(state) = self.state.as_mut() {
            // let egui process the event first
            let resp = state
                .egui_winit_state
                .on_window_event(self.window.as_ref().unwrap(), &event);

            if resp.consumed {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resized(new_size.width, new_size.height);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, mut inner_size_writer } => {
                let physical_size = self.window.as_ref().unwrap().inner_size();

                if let Some(state) = self.state.as_mut() {
                    state.scale_factor = scale_factor as f32;
                    state.resize_surface(physical_size.width, physical_size.height);

                    let ctx = state.context();
                    ctx.set_pixels_per_point(state.scale_factor);
                }

                let _ = inner_size_writer.request_inner_size(physical_size);
            }
            WindowEvent::Focused(focused) => {
                self.window_is_focused = focused;
                self.cursor_inside_window = focused;

                self.last_active = None;
                self.in_sleep = false;
                self.handle_redraw(event_loop);
                self.window.as_ref().unwrap().request_redraw();
            }
            WindowEvent::RedrawRequested => {
                self.handle_redraw(event_loop);

                if !self.in_sleep {
                    self.window.as_ref().unwrap().request_redraw();
                }
            }
            WindowEvent::CursorEntered { .. } => {
                self.cursor_inside_window = true;
                self.last_active = None;
                self.in_sleep = false;
                self.window.as_ref().unwrap().request_redraw();
            }
            WindowEvent::CursorMoved { .. } => {
                self.cursor_inside_window = true;
                self.last_active = None;
                self.in_sleep = false;
                self.window.as_ref().unwrap().request_redraw();
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor_inside_window = false;
                self.last_active = None;
                self.in_sleep = false;
                self.window.as_ref().unwrap().request_redraw();
            }
            _ => (),
        }
    }

    // lets the worker threads make the UI refresh
    fn user_event(&mut self, _event_loop: &ActiveEventLoop, _event: ()) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
