//! Entry point for demoforge: load the demo's assets through the chosen
//! rendering backend, optionally simulate a library reload, then tear down.

use std::path::PathBuf;

use anyhow::Result;
use demo::{LoadConfig, load_demo_state, revalidate};
use renderer::{HeadlessDevice, RenderDevice, WgpuDevice};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BackendKind {
    Headless,
    Wgpu,
}

fn parse_backend_kind_arg() -> BackendKind {
    // Accept: --backend=headless|wgpu
    let mut kind = BackendKind::Wgpu;
    for arg in std::env::args() {
        if let Some(val) = arg.strip_prefix("--backend=") {
            kind = match val.to_ascii_lowercase().as_str() {
                "headless" | "none" => BackendKind::Headless,
                "wgpu" | "gpu" => BackendKind::Wgpu,
                other => {
                    log::warn!("Unknown backend '{}', using wgpu.", other);
                    BackendKind::Wgpu
                }
            };
        }
    }
    kind
}

fn parse_gpu_backend_arg() -> wgpu::Backends {
    // Accept: --gpu-backend=auto|vulkan|dx12|metal|gl
    let mut backends = wgpu::Backends::all();
    for arg in std::env::args() {
        if let Some(val) = arg.strip_prefix("--gpu-backend=") {
            backends = match val.to_ascii_lowercase().as_str() {
                "auto" => wgpu::Backends::all(),
                "vulkan" | "vk" => wgpu::Backends::VULKAN,
                "dx12" | "d3d12" => wgpu::Backends::DX12,
                "metal" | "mtl" => wgpu::Backends::METAL,
                "gl" | "opengl" | "gles" => wgpu::Backends::GL,
                other => {
                    log::warn!("Unknown GPU backend '{}', falling back to auto.", other);
                    wgpu::Backends::all()
                }
            };
        }
    }
    backends
}

fn parse_flag_arg(name: &str, default: bool) -> bool {
    // --name[=on|off]
    let bare = format!("--{name}");
    let prefix = format!("--{name}=");
    let mut value = default;
    for arg in std::env::args() {
        if arg == bare {
            value = true;
        } else if let Some(val) = arg.strip_prefix(&prefix) {
            value = matches!(val.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes");
        }
    }
    value
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let prefix = format!("--{name}=");
    std::env::args()
        .filter_map(|arg| arg.strip_prefix(&prefix).map(PathBuf::from))
        .last()
}

fn parse_size_args() -> (u32, u32) {
    let mut w: Option<u32> = None;
    let mut h: Option<u32> = None;

    for arg in std::env::args() {
        if let Some(v) = arg.strip_prefix("--size=") {
            if let Some((sw, sh)) = v.split_once('x').or_else(|| v.split_once('X')) {
                if let (Ok(pw), Ok(ph)) = (sw.parse::<u32>(), sh.parse::<u32>()) {
                    w = Some(pw);
                    h = Some(ph);
                }
            }
        } else if let Some(v) = arg.strip_prefix("--width=") {
            if let Ok(pw) = v.parse::<u32>() {
                w = Some(pw);
            }
        } else if let Some(v) = arg.strip_prefix("--height=") {
            if let Ok(ph) = v.parse::<u32>() {
                h = Some(ph);
            }
        }
    }

    let ww = w.unwrap_or(1280).max(1);
    let hh = h.unwrap_or(720).max(1);
    (ww, hh)
}

fn load_config() -> LoadConfig {
    let (width, height) = parse_size_args();
    let mut config = LoadConfig::default()
        .with_streaming(parse_flag_arg("streaming", true))
        .with_frame_size(width, height);
    if let Some(dir) = parse_path_arg("resource-dir") {
        config = config.with_resource_dir(dir);
    }
    if let Some(path) = parse_path_arg("cache") {
        config = config.with_cache_path(path);
    }
    config
}

fn create_device(kind: BackendKind) -> Result<Box<dyn RenderDevice>> {
    Ok(match kind {
        BackendKind::Headless => Box::new(HeadlessDevice::new()),
        BackendKind::Wgpu => {
            let device = WgpuDevice::new(parse_gpu_backend_arg())?;
            log::info!("Using adapter: {}", device.adapter_name());
            Box::new(device)
        }
    })
}

fn run(device: &mut dyn RenderDevice, config: &LoadConfig, simulate_reload: bool) -> Result<()> {
    let mut state = load_demo_state(device, config)?;
    for issue in state.report.issues() {
        log::warn!("{issue}");
    }

    if simulate_reload {
        let epoch = device.epoch().advance();
        log::info!("Simulated library reload (epoch {epoch})");
        revalidate(&mut state, device);
    }

    let summary = state.release_all();
    if summary.stale > 0 {
        log::warn!("{} handles could not be released through stale hooks", summary.stale);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let kind = parse_backend_kind_arg();
    let config = load_config();
    let simulate_reload = parse_flag_arg("simulate-reload", false);
    log::info!(
        "Starting demoforge. Backend: {:?}, resources={}, cache={}, streaming={}, frame_size={}x{}",
        kind,
        config.resource_dir.display(),
        config.cache_path.display(),
        config.streaming,
        config.frame_width,
        config.frame_height
    );

    let mut device = create_device(kind)?;
    run(device.as_mut(), &config, simulate_reload)?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
