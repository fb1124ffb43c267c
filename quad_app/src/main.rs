//! Rotating quad demo application
//!
//! Opens a GLFW window, starts a Vulkan session on it and drives the quad game
//! unit. With `--game-lib` the game is loaded from a shared library and
//! reloaded whenever the library is rebuilt, or when F5 is pressed.

use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use quad_app::args::{self, LaunchArgs, ParsedArgs};
use quad_app::scene;
use thiserror::Error;
use vk_session::foundation::logging;
use vk_session::prelude::*;

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error(transparent)]
    Game(#[from] GameError),
}

fn load_config(launch: &LaunchArgs) -> Result<ApplicationConfig, ConfigError> {
    let mut config = match &launch.config {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None => ApplicationConfig::default(),
    };

    // Flags only ever switch features on; the version flag always wins
    config.session.api_version = launch.api_version;
    config.session.enable_validation |= launch.validation;
    config.session.enable_debug_callback |= launch.debug_callback;
    config.window.high_pixel_density |= launch.hdpi;
    if launch.verbose {
        config.engine.log_level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

fn game_loader(game_lib: Option<&Path>) -> Box<dyn GameLoader> {
    match game_lib {
        Some(path) => Box::new(DynamicGameLoader::new(path)),
        None => Box::new(StaticGameLoader::new("quad", scene::create_game)),
    }
}

fn run(launch: &LaunchArgs, config: &ApplicationConfig) -> Result<(), AppError> {
    let platform = GlfwPlatform::new(&config.window, LogSink::verbose_or_null(launch.verbose))?;
    platform.log_sink().line(format_args!("{launch}"));

    let mut session = Session::new(&platform, &config.session)?;
    log::info!("Rendering on {}", session.device_name().unwrap_or("unknown device"));

    let mut host = GameHost::new(game_loader(launch.game_lib.as_deref()));
    host.start(&mut session)?;

    let mut last_frame = Instant::now();
    while !host.is_closed() && !platform.should_close() {
        for event in platform.poll_events() {
            match event {
                InputEvent::Resized { .. } => session.notify_resized(),
                InputEvent::KeyPressed(KeyCode::F5) => {
                    if let Err(e) = host.reload(&mut session) {
                        log::error!("Reload failed: {e}");
                    }
                    continue;
                }
                _ => {}
            }
            host.process_input(&event);
        }

        match host.reload_if_changed(&mut session) {
            Ok(true) => log::info!("Game reloaded ({} so far)", host.reload_count()),
            Ok(false) => {}
            Err(e) => log::error!("Reload failed: {e}"),
        }

        let now = Instant::now();
        host.update(now - last_frame);
        last_frame = now;

        match host.draw(&mut session)? {
            FrameOutcome::Presented => {}
            FrameOutcome::SwapchainStale => log::debug!("Swapchain out of date, rebuilding next frame"),
            FrameOutcome::Skipped => std::thread::sleep(std::time::Duration::from_millis(10)),
        }
    }

    session.wait_idle()?;
    log::info!("Device idle, shutting down");
    Ok(())
}

fn main() -> ExitCode {
    let launch = match args::parse(std::env::args_os()) {
        ParsedArgs::Run(launch) => launch,
        ParsedArgs::Help(text) => {
            println!("{text}");
            return ExitCode::SUCCESS;
        }
    };

    let config = match load_config(&launch) {
        Ok(config) => config,
        Err(e) => {
            logging::init();
            log::error!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init_with_level(config.engine.level_filter().unwrap_or(log::LevelFilter::Info));

    match run(&launch, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
