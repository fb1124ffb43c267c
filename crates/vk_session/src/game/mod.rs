//! Reloadable game units
//!
//! A [`Game`] is the swappable part of a program: it owns its meshes and
//! simulation state and reaches the GPU only through a [`GameContext`]. The
//! [`GameHost`] drives it and, on reload, waits for the device to go idle,
//! drops the old unit, loads a new one through its [`GameLoader`] and
//! initializes it. Session GPU objects are never rebuilt by a reload.

pub mod loader;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::platform::InputEvent;
use crate::render::vulkan::resources::mesh::{Mesh, Vertex};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::{FrameOutcome, Session};

pub use loader::GameLoader;

/// Errors at the reload boundary
#[derive(Error, Debug)]
pub enum GameError {
    /// A graphics call made by the game failed
    #[error("Graphics error: {0}")]
    Vulkan(#[from] VulkanError),

    /// The game library could not be loaded
    #[error("Can't load game library '{}': {reason}", path.display())]
    Load {
        /// Library path
        path: PathBuf,
        /// Loader diagnostic
        reason: String,
    },

    /// The library lacks the factory symbol
    #[error("No function [{symbol}] in '{}': {reason}", path.display())]
    Symbol {
        /// Missing symbol
        symbol: String,
        /// Library path
        path: PathBuf,
        /// Loader diagnostic
        reason: String,
    },

    /// The game rejected its initialization
    #[error("Game initialization failed: {0}")]
    Initialization(String),
}

/// GPU-facing services a game may use
pub trait GameContext {
    /// Block until the device has finished all submitted work
    fn wait_idle(&mut self) -> VulkanResult<()>;

    /// Current drawable extent in pixels, `(0, 0)` when there is none
    fn drawable_extent(&self) -> (u32, u32);

    /// Upload a mesh, indexed when `indices` is given
    fn create_mesh(&mut self, name: &str, vertices: &[Vertex], indices: Option<&[u16]>) -> VulkanResult<Mesh>;

    /// Render one frame of `mesh` with the given uniform bytes
    fn draw_frame(&mut self, mesh: &Mesh, uniforms: &[u8]) -> VulkanResult<FrameOutcome>;
}

impl GameContext for Session<'_> {
    fn wait_idle(&mut self) -> VulkanResult<()> {
        Session::wait_idle(self)
    }

    fn drawable_extent(&self) -> (u32, u32) {
        self.swapchain_extent().unwrap_or((0, 0))
    }

    fn create_mesh(&mut self, name: &str, vertices: &[Vertex], indices: Option<&[u16]>) -> VulkanResult<Mesh> {
        match indices {
            Some(indices) => self.create_indexed_mesh(name, vertices, indices),
            None => Session::create_mesh(self, name, vertices),
        }
    }

    fn draw_frame(&mut self, mesh: &Mesh, uniforms: &[u8]) -> VulkanResult<FrameOutcome> {
        Session::draw_frame(self, mesh, uniforms)
    }
}

/// The swappable unit driven by the host loop
pub trait Game {
    /// Create GPU resources and initial state
    fn initialize(&mut self, ctx: &mut dyn GameContext) -> Result<(), GameError>;

    /// React to one window event
    fn process_input(&mut self, event: &InputEvent);

    /// Advance the simulation by `dt`
    fn update(&mut self, dt: Duration);

    /// Render the current state
    fn draw(&self, ctx: &mut dyn GameContext) -> VulkanResult<FrameOutcome>;

    /// Whether the game wants the program to exit
    fn is_closed(&self) -> bool;
}

/// Owns the current game unit and its loader
pub struct GameHost<L: GameLoader> {
    // Declared first: the game must drop before the library that holds its code
    game: Option<Box<dyn Game>>,
    loader: L,
    reloads: u32,
}

impl<L: GameLoader> GameHost<L> {
    /// Host with nothing loaded yet
    pub fn new(loader: L) -> Self {
        Self { game: None, loader, reloads: 0 }
    }

    /// Load and initialize the first game unit
    pub fn start(&mut self, ctx: &mut dyn GameContext) -> Result<(), GameError> {
        log::info!("Starting game from {}", self.loader.describe());
        self.install(ctx)
    }

    /// Replace the running game with a freshly loaded one
    ///
    /// On failure no game is running until the next successful reload.
    pub fn reload(&mut self, ctx: &mut dyn GameContext) -> Result<(), GameError> {
        log::info!("Reloading game from {}", self.loader.describe());
        ctx.wait_idle()?;
        self.game = None;
        self.install(ctx)?;
        self.reloads += 1;
        Ok(())
    }

    /// Reload when the loader reports a newer build; returns whether it reloaded
    pub fn reload_if_changed(&mut self, ctx: &mut dyn GameContext) -> Result<bool, GameError> {
        if !self.loader.needs_reload() {
            return Ok(false);
        }
        self.reload(ctx)?;
        Ok(true)
    }

    fn install(&mut self, ctx: &mut dyn GameContext) -> Result<(), GameError> {
        let mut game = self.loader.load()?;
        game.initialize(ctx)?;
        self.game = Some(game);
        Ok(())
    }

    /// Forward a window event
    pub fn process_input(&mut self, event: &InputEvent) {
        if let Some(game) = self.game.as_mut() {
            game.process_input(event);
        }
    }

    /// Advance the running game
    pub fn update(&mut self, dt: Duration) {
        if let Some(game) = self.game.as_mut() {
            game.update(dt);
        }
    }

    /// Draw the running game; skipped while none is loaded
    pub fn draw(&self, ctx: &mut dyn GameContext) -> Result<FrameOutcome, GameError> {
        match self.game.as_ref() {
            Some(game) => Ok(game.draw(ctx)?),
            None => Ok(FrameOutcome::Skipped),
        }
    }

    /// Whether the running game asked to exit
    pub fn is_closed(&self) -> bool {
        self.game.as_ref().is_some_and(|game| game.is_closed())
    }

    /// Whether a game is currently loaded
    pub fn is_running(&self) -> bool {
        self.game.is_some()
    }

    /// Successful reloads so far
    pub fn reload_count(&self) -> u32 {
        self.reloads
    }

    /// The loader
    pub fn loader(&self) -> &L {
        &self.loader
    }
}

#[cfg(test)]
mod tests {
    use super::loader::StaticGameLoader;
    use super::*;
    use crate::platform::KeyCode;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeContext {
        idle_waits: usize,
        extent_queries: Cell<usize>,
        draws: usize,
    }

    impl GameContext for FakeContext {
        fn wait_idle(&mut self) -> VulkanResult<()> {
            self.idle_waits += 1;
            Ok(())
        }

        fn drawable_extent(&self) -> (u32, u32) {
            self.extent_queries.set(self.extent_queries.get() + 1);
            (800, 600)
        }

        fn create_mesh(&mut self, _: &str, _: &[Vertex], _: Option<&[u16]>) -> VulkanResult<Mesh> {
            Err(VulkanError::invalid("no device in tests"))
        }

        fn draw_frame(&mut self, _: &Mesh, _: &[u8]) -> VulkanResult<FrameOutcome> {
            self.draws += 1;
            Err(VulkanError::invalid("no device in tests"))
        }
    }

    struct CountingGame {
        drops: Arc<AtomicUsize>,
        initialized: bool,
        updates: u32,
        closed: bool,
    }

    impl Game for CountingGame {
        fn initialize(&mut self, ctx: &mut dyn GameContext) -> Result<(), GameError> {
            assert_eq!(ctx.drawable_extent(), (800, 600));
            self.initialized = true;
            Ok(())
        }

        fn process_input(&mut self, event: &InputEvent) {
            if matches!(event, InputEvent::KeyPressed(KeyCode::Escape)) {
                self.closed = true;
            }
        }

        fn update(&mut self, _dt: Duration) {
            self.updates += 1;
        }

        fn draw(&self, ctx: &mut dyn GameContext) -> VulkanResult<FrameOutcome> {
            assert!(self.initialized);
            let _ = ctx.drawable_extent();
            Ok(FrameOutcome::Presented)
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    impl Drop for CountingGame {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn host(drops: &Arc<AtomicUsize>, created: &Arc<AtomicUsize>) -> GameHost<StaticGameLoader<impl FnMut() -> Box<dyn Game>>> {
        let drops = Arc::clone(drops);
        let created = Arc::clone(created);
        GameHost::new(StaticGameLoader::new("counting", move || {
            created.fetch_add(1, Ordering::SeqCst);
            Box::new(CountingGame { drops: Arc::clone(&drops), initialized: false, updates: 0, closed: false })
                as Box<dyn Game>
        }))
    }

    #[test]
    fn test_draw_without_game_is_skipped() {
        let drops = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let host = host(&drops, &created);
        let mut ctx = FakeContext::default();
        assert!(!host.is_running());
        assert_eq!(host.draw(&mut ctx).unwrap(), FrameOutcome::Skipped);
        assert_eq!(ctx.draws, 0);
        assert_eq!(ctx.extent_queries.get(), 0);
        assert!(!host.is_closed());
    }

    #[test]
    fn test_reload_replaces_game_behind_idle_wait() {
        let drops = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let mut host = host(&drops, &created);
        let mut ctx = FakeContext::default();

        host.start(&mut ctx).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        let queries = ctx.extent_queries.get();
        assert_eq!(host.draw(&mut ctx).unwrap(), FrameOutcome::Presented);
        assert_eq!(ctx.extent_queries.get(), queries + 1);

        host.reload(&mut ctx).unwrap();
        assert_eq!(ctx.idle_waits, 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(host.reload_count(), 1);
        assert!(host.is_running());
    }

    #[test]
    fn test_static_loader_never_reloads_on_its_own() {
        let drops = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let mut host = host(&drops, &created);
        let mut ctx = FakeContext::default();
        host.start(&mut ctx).unwrap();
        assert!(!host.reload_if_changed(&mut ctx).unwrap());
        assert_eq!(ctx.idle_waits, 0);
    }

    #[test]
    fn test_input_reaches_game() {
        let drops = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));
        let mut host = host(&drops, &created);
        let mut ctx = FakeContext::default();
        host.start(&mut ctx).unwrap();
        host.update(Duration::from_millis(16));
        assert!(!host.is_closed());
        host.process_input(&InputEvent::KeyPressed(KeyCode::Escape));
        assert!(host.is_closed());
        drop(host);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
