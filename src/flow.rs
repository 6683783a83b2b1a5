//! Event loop and application lifecycle.
//!
//! [`run`] opens a window and drives a [`Viewer`] from winit's events:
//!
//! 1. On `resumed` the GPU context is created (blocking on native, as a
//!    `spawn_local` future on the web) and the viewer is set up.
//! 2. The model and texture loads are spawned; their [`LoadEvent`]s come
//!    back through the event loop proxy so the scene is only ever touched
//!    on the event loop thread.
//! 3. Every `RedrawRequested` renders a frame and requests the next one.
//! 4. `Resized` updates projection, surface and controls.

use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
use anyhow::Context as _;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    config::ViewerConfig,
    context::Context,
    render::GpuRenderer,
    resources::{self, LoadEvent, SharedSource},
    viewer::{LoadPlan, Viewer},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Messages delivered to the event loop from background tasks.
#[derive(Debug)]
pub enum ViewerEvent {
    /// The GPU context finished initializing (web only, native blocks).
    #[cfg(target_arch = "wasm32")]
    Initialized(Box<anyhow::Result<Viewer<GpuRenderer>>>),
    Load(LoadEvent),
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    source: SharedSource,
    // Taken once the window exists.
    config: Option<ViewerConfig>,
    viewer: Option<Viewer<GpuRenderer>>,
}

impl App {
    fn new(
        event_loop: &EventLoop<ViewerEvent>,
        config: ViewerConfig,
        source: SharedSource,
    ) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            source,
            config: Some(config),
            viewer: None,
        })
    }

    /// Sizes the freshly created viewer to its window and kicks off loading.
    fn start(&mut self, mut viewer: Viewer<GpuRenderer>) {
        let window = viewer.renderer().context().window().clone();
        let size = window.inner_size();
        viewer.resize(size.width, size.height);
        if let Some(plan) = viewer.begin_load() {
            self.spawn_loads(plan);
        }
        self.viewer = Some(viewer);
        window.request_redraw();
    }

    fn spawn_loads(&self, plan: LoadPlan) {
        let LoadPlan { model, textures } = plan;

        let source = self.source.clone();
        let proxy = self.proxy.clone();
        let model_load = async move {
            resources::run_model_load(source.as_ref(), &model, move |event| {
                if proxy.send_event(ViewerEvent::Load(event)).is_err() {
                    log::warn!("Event loop closed before the model finished loading");
                }
            })
            .await;
        };

        let source = self.source.clone();
        let texture_loads = async move {
            resources::load_textures(source.as_ref(), &textures).await;
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            self.async_runtime.spawn(model_load);
            self.async_runtime.spawn(texture_loads);
        }

        #[cfg(target_arch = "wasm32")]
        {
            wasm_bindgen_futures::spawn_local(model_load);
            wasm_bindgen_futures::spawn_local(texture_loads);
        }
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(config) = self.config.take() else {
            return;
        };

        let window_attributes = Window::default_attributes().with_title("view-ngin");
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Cannot open a window: {e}");
                event_loop.exit();
                return;
            }
        };

        #[cfg(target_arch = "wasm32")]
        {
            if let Err(e) = attach_to_container(&window, &config.container_id) {
                log::warn!("Canvas stays detached: {e:?}");
            }
        }

        let init = async move {
            let ctx = Context::new(window, &config).await?;
            Ok::<_, anyhow::Error>(Viewer::new(config, GpuRenderer::new(ctx)))
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init) {
                Ok(viewer) => self.start(viewer),
                Err(e) => {
                    log::error!("App initialization failed: {e:?}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let viewer = init.await;
                if proxy
                    .send_event(ViewerEvent::Initialized(Box::new(viewer)))
                    .is_err()
                {
                    log::error!("Event loop closed during initialization");
                }
            });
        }
    }

    #[cfg_attr(not(target_arch = "wasm32"), allow(unused_variables))]
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            ViewerEvent::Initialized(viewer) => match *viewer {
                Ok(viewer) => self.start(viewer),
                Err(e) => {
                    log::error!("App initialization failed: {e:?}");
                    event_loop.exit();
                }
            },
            ViewerEvent::Load(event) => match &mut self.viewer {
                Some(viewer) => viewer.handle_load_event(event),
                None => log::warn!("Load event before the viewer exists: {event:?}"),
            },
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        viewer.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let window = viewer.renderer().context().window().clone();
                match viewer.frame() {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = window.inner_size();
                        viewer.resize(size.width, size.height);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Out of GPU memory, exiting");
                        event_loop.exit();
                    }
                    Err(e) => log::warn!("Unable to render {e}"),
                }
                // invoke main render loop
                window.request_redraw();
            }
            _ => {}
        }
    }
}

/// Puts winit's canvas into the page element with id `container_id`.
#[cfg(target_arch = "wasm32")]
fn attach_to_container(window: &Window, container_id: &str) -> anyhow::Result<()> {
    use winit::platform::web::WindowExtWebSys;

    let canvas = window.canvas().context("window has no canvas")?;
    let document = web_sys::window()
        .and_then(|window| window.document())
        .context("no document")?;
    let container = document
        .get_element_by_id(container_id)
        .with_context(|| format!("no element with id {container_id:?}"))?;
    canvas
        .set_attribute("style", "display: block; width: 100%; height: 100%")
        .map_err(|e| anyhow::anyhow!("cannot style canvas: {e:?}"))?;
    container
        .append_child(&canvas)
        .map_err(|e| anyhow::anyhow!("cannot append canvas: {e:?}"))?;
    Ok(())
}

/// Opens the viewer window and runs until it is closed.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    let source = resources::default_source(&config.asset_root)?;
    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config, source)?;

    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Browser entry point: the GLB viewer with its placeholder model.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    run(ViewerConfig::default()).map_err(|e| JsValue::from_str(&format!("{e:?}")))
}
