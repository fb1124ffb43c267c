//! GLFW window back end
//!
//! Wraps a GLFW window created without a client API and exposes it as a
//! [`PlatformSurface`]. Surface creation uses GLFW's own Vulkan support so no
//! raw window handles cross the boundary.

use std::ptr;

use ash::vk;

use super::{InputEvent, KeyCode, PlatformError, PlatformResult, PlatformSurface};
use crate::core::config::WindowConfig;
use crate::foundation::logging::LogSink;

/// GLFW window with an event queue and a diagnostics sink
pub struct GlfwPlatform {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    sink: LogSink,
}

impl GlfwPlatform {
    /// Open a window configured for Vulkan presentation
    pub fn new(config: &WindowConfig, sink: LogSink) -> PlatformResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors)
            .map_err(|e| PlatformError::InitializationFailed(format!("{e:?}")))?;

        if !glfw.vulkan_supported() {
            return Err(PlatformError::InitializationFailed(
                "GLFW could not find a Vulkan loader".to_string(),
            ));
        }

        // Configure for Vulkan (no OpenGL context)
        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));
        glfw.window_hint(glfw::WindowHint::ScaleToMonitor(config.high_pixel_density));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or_else(|| {
                PlatformError::WindowCreation(format!("{}x{} '{}'", config.width, config.height, config.title))
            })?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Opened {}x{} window '{}'", config.width, config.height, config.title);

        Ok(Self { glfw, window, events, sink })
    }

    /// Pump the GLFW event loop and translate pending window events
    pub fn poll_events(&self) -> Vec<InputEvent> {
        // Glfw handles share one library instance; polling through a clone
        // leaves the window borrowable by a running session.
        let mut glfw = self.glfw.clone();
        glfw.poll_events();

        glfw::flush_messages(&self.events)
            .filter_map(|(_, event)| translate_event(event))
            .collect()
    }

    /// Whether the window's close flag is set
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }
}

fn translate_key(key: glfw::Key) -> KeyCode {
    match key {
        glfw::Key::Escape => KeyCode::Escape,
        glfw::Key::Space => KeyCode::Space,
        glfw::Key::F5 => KeyCode::F5,
        other => KeyCode::Other(other as i32),
    }
}

fn translate_event(event: glfw::WindowEvent) -> Option<InputEvent> {
    match event {
        glfw::WindowEvent::Close => Some(InputEvent::CloseRequested),
        glfw::WindowEvent::Key(key, _, glfw::Action::Press, _) => Some(InputEvent::KeyPressed(translate_key(key))),
        glfw::WindowEvent::Key(key, _, glfw::Action::Release, _) => Some(InputEvent::KeyReleased(translate_key(key))),
        glfw::WindowEvent::FramebufferSize(width, height) => Some(InputEvent::Resized {
            width: u32::try_from(width).unwrap_or(0),
            height: u32::try_from(height).unwrap_or(0),
        }),
        _ => None,
    }
}

impl PlatformSurface for GlfwPlatform {
    fn required_extensions(&self) -> PlatformResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .filter(|names| !names.is_empty())
            .ok_or_else(|| PlatformError::Extensions("GLFW reports no Vulkan presentation support".to_string()))
    }

    fn create_surface(&self, _entry: &ash::Entry, instance: &ash::Instance) -> PlatformResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance.handle(), ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(PlatformError::Surface(result))
        }
    }

    fn drawable_size(&self) -> PlatformResult<(u32, u32)> {
        let (width, height) = self.window.get_framebuffer_size();
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(width), Ok(height)) => Ok((width, height)),
            _ => Err(PlatformError::DrawableSize(format!("negative framebuffer size {width}x{height}"))),
        }
    }

    fn log_sink(&self) -> LogSink {
        self.sink.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_key_events() {
        let mods = glfw::Modifiers::empty();
        assert_eq!(
            translate_event(glfw::WindowEvent::Key(glfw::Key::F5, 0, glfw::Action::Press, mods)),
            Some(InputEvent::KeyPressed(KeyCode::F5))
        );
        assert_eq!(
            translate_event(glfw::WindowEvent::Key(glfw::Key::Escape, 0, glfw::Action::Release, mods)),
            Some(InputEvent::KeyReleased(KeyCode::Escape))
        );
        assert_eq!(translate_event(glfw::WindowEvent::Key(glfw::Key::A, 0, glfw::Action::Repeat, mods)), None);
        assert_eq!(translate_key(glfw::Key::A), KeyCode::Other(glfw::Key::A as i32));
    }

    #[test]
    fn test_translate_resize_clamps_negative() {
        assert_eq!(
            translate_event(glfw::WindowEvent::FramebufferSize(1024, 768)),
            Some(InputEvent::Resized { width: 1024, height: 768 })
        );
        assert_eq!(
            translate_event(glfw::WindowEvent::FramebufferSize(-1, 0)),
            Some(InputEvent::Resized { width: 0, height: 0 })
        );
        assert_eq!(translate_event(glfw::WindowEvent::Close), Some(InputEvent::CloseRequested));
    }
}
