//! Game unit loaders
//!
//! [`StaticGameLoader`] builds the game from an in-process factory.
//! [`DynamicGameLoader`] loads it from a shared library exporting
//! `create_game`, and reports a pending reload whenever the library file's
//! modification time moves past the one it was loaded from. The library is
//! copied to a shadow file before loading so the build can overwrite the
//! original while the game runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use libloading::{Library, Symbol};

use super::{Game, GameError};

/// Factory symbol a game library must export
pub const CREATE_GAME_SYMBOL: &str = "create_game";

/// Signature of [`CREATE_GAME_SYMBOL`]
pub type CreateGameFn = fn() -> Box<dyn Game>;

/// Source of game units
pub trait GameLoader {
    /// Produce a fresh, uninitialized game
    fn load(&mut self) -> Result<Box<dyn Game>, GameError>;

    /// Human-readable origin for logs
    fn describe(&self) -> String;

    /// Whether a newer build is available
    fn needs_reload(&self) -> bool {
        false
    }
}

impl<L: GameLoader + ?Sized> GameLoader for Box<L> {
    fn load(&mut self) -> Result<Box<dyn Game>, GameError> {
        (**self).load()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn needs_reload(&self) -> bool {
        (**self).needs_reload()
    }
}

/// Loader backed by a closure
pub struct StaticGameLoader<F>
where
    F: FnMut() -> Box<dyn Game>,
{
    name: String,
    factory: F,
}

impl<F> StaticGameLoader<F>
where
    F: FnMut() -> Box<dyn Game>,
{
    /// Wrap a factory
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self { name: name.into(), factory }
    }
}

impl<F> GameLoader for StaticGameLoader<F>
where
    F: FnMut() -> Box<dyn Game>,
{
    fn load(&mut self) -> Result<Box<dyn Game>, GameError> {
        Ok((self.factory)())
    }

    fn describe(&self) -> String {
        format!("built-in game '{}'", self.name)
    }
}

/// Loader backed by a shared library
pub struct DynamicGameLoader {
    path: PathBuf,
    shadow_path: PathBuf,
    settle_interval: Duration,
    library: Option<Library>,
    loaded_at: Option<SystemTime>,
}

impl DynamicGameLoader {
    /// Loader for the library at `path`; nothing is opened until [`GameLoader::load`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let shadow_path = shadow_path_for(&path);
        Self { path, shadow_path, settle_interval: Duration::from_millis(100), library: None, loaded_at: None }
    }

    /// How long to wait between modification-time checks while a build is still writing
    #[must_use]
    pub fn with_settle_interval(mut self, interval: Duration) -> Self {
        self.settle_interval = interval;
        self
    }

    /// Library path being watched
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy that is actually opened
    pub fn shadow_path(&self) -> &Path {
        &self.shadow_path
    }

    /// Whether a library is currently open
    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|meta| meta.modified()).ok()
    }

    // Wait until the build stops touching the file
    fn settled_modification_time(&self) -> Result<SystemTime, GameError> {
        let load_error = |reason: String| GameError::Load { path: self.path.clone(), reason };
        let mut current = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .map_err(|e| load_error(e.to_string()))?;
        for _ in 0..50 {
            thread::sleep(self.settle_interval);
            match self.modified() {
                Some(next) if next != current => current = next,
                _ => return Ok(current),
            }
        }
        Ok(current)
    }
}

impl GameLoader for DynamicGameLoader {
    fn load(&mut self) -> Result<Box<dyn Game>, GameError> {
        let modified = self.settled_modification_time()?;

        // Close the previous copy before overwriting it
        self.library = None;
        fs::copy(&self.path, &self.shadow_path).map_err(|e| GameError::Load {
            path: self.path.clone(),
            reason: format!("can't copy to '{}': {e}", self.shadow_path.display()),
        })?;

        let library = unsafe { Library::new(&self.shadow_path) }
            .map_err(|e| GameError::Load { path: self.shadow_path.clone(), reason: e.to_string() })?;
        let create: CreateGameFn = unsafe {
            let symbol: Symbol<CreateGameFn> =
                library.get(CREATE_GAME_SYMBOL.as_bytes()).map_err(|e| GameError::Symbol {
                    symbol: CREATE_GAME_SYMBOL.to_string(),
                    path: self.shadow_path.clone(),
                    reason: e.to_string(),
                })?;
            *symbol
        };
        let game = create();

        log::info!("Loaded game library {}", self.path.display());
        self.library = Some(library);
        self.loaded_at = Some(modified);
        Ok(game)
    }

    fn describe(&self) -> String {
        format!("library '{}'", self.path.display())
    }

    fn needs_reload(&self) -> bool {
        match (self.loaded_at, self.modified()) {
            (Some(loaded), Some(now)) => now != loaded,
            _ => false,
        }
    }
}

impl Drop for DynamicGameLoader {
    fn drop(&mut self) {
        self.library = None;
        if self.shadow_path.exists() {
            if let Err(e) = fs::remove_file(&self.shadow_path) {
                log::debug!("Can't remove {}: {e}", self.shadow_path.display());
            }
        }
    }
}

/// `dir/libgame.so` is opened as `dir/loaded-libgame.so`
pub fn shadow_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map_or_else(|| "game".to_string(), |name| name.to_string_lossy().into_owned());
    path.with_file_name(format!("loaded-{file_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_shadow_path_is_a_sibling() {
        let shadow = shadow_path_for(Path::new("/tmp/build/libquad.so"));
        assert_eq!(shadow, PathBuf::from("/tmp/build/loaded-libquad.so"));
    }

    #[test]
    fn test_missing_library_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = DynamicGameLoader::new(dir.path().join("libmissing.so"))
            .with_settle_interval(Duration::from_millis(1));
        let err = loader.load().err().unwrap();
        assert!(matches!(err, GameError::Load { .. }));
        assert!(!loader.is_loaded());
        assert!(!loader.needs_reload());
    }

    #[test]
    fn test_garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libgarbage.so");
        fs::File::create(&path).unwrap().write_all(b"not a shared object").unwrap();

        let mut loader = DynamicGameLoader::new(&path).with_settle_interval(Duration::from_millis(1));
        let err = loader.load().err().unwrap();
        assert!(matches!(err, GameError::Load { .. }));
        assert!(loader.describe().contains("libgarbage.so"));
        assert!(!loader.needs_reload());
    }
}
