/// Galaxy3D Engine - Singleton manager for the renderer and the logger
///
/// This module provides global singleton management for the renderer. It uses
/// thread-safe static storage with RwLock for safe concurrent access.

use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
use crate::renderer::Renderer;

// ===== INTERNAL STATE =====

/// Global engine state storage
static ENGINE_STATE: OnceLock<EngineState> = OnceLock::new();

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Internal state structure holding the engine singletons
struct EngineState {
    /// Renderer singleton (wrapped in Mutex for thread-safe mutable access)
    renderer: RwLock<Option<Arc<Mutex<Renderer>>>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            renderer: RwLock::new(None),
        }
    }
}

fn global_logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger::default())))
}

// ===== PUBLIC API =====

/// Main engine singleton manager
///
/// Owns the process-wide renderer, if any, and routes every log entry of the
/// binding layer.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use galaxy_3d_binder::galaxy3d::{Config, Engine, Renderer};
/// use galaxy_3d_binder::galaxy3d::mock::MockGraphicsDevice;
///
/// Engine::initialize()?;
/// Engine::create_renderer(Renderer::new(Arc::new(MockGraphicsDevice::new()), Config::default())?)?;
///
/// let renderer = Engine::renderer()?;
/// // renderer.lock() ...
///
/// Engine::shutdown();
/// # Ok::<(), galaxy_3d_binder::galaxy3d::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Helper to log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        match &error {
            Error::InitializationFailed(msg) => {
                crate::engine_error!("galaxy3d::Engine", "Initialization failed: {}", msg);
            }
            Error::BackendError(msg) => {
                crate::engine_error!("galaxy3d::Engine", "Backend error: {}", msg);
            }
            _ => {
                crate::engine_error!("galaxy3d::Engine", "Engine error: {}", error);
            }
        }
        error
    }

    fn state() -> Result<&'static EngineState> {
        ENGINE_STATE.get().ok_or_else(|| {
            Self::log_and_return_error(Error::InitializationFailed(
                "Engine not initialized. Call Engine::initialize() first.".to_string(),
            ))
        })
    }

    /// Initialize the engine
    ///
    /// Must be called once at application startup before creating the renderer.
    /// Calling it again is harmless.
    pub fn initialize() -> Result<()> {
        ENGINE_STATE.get_or_init(EngineState::new);
        Ok(())
    }

    /// Shutdown the engine and destroy the renderer singleton
    ///
    /// The renderer is drained and its leak report logged before it is dropped.
    pub fn shutdown() {
        if let Some(state) = ENGINE_STATE.get() {
            let renderer = match state.renderer.write() {
                Ok(mut lock) => lock.take(),
                Err(_) => None,
            };
            if let Some(renderer) = renderer {
                Self::shutdown_renderer(&renderer);
            }
        }
    }

    fn shutdown_renderer(renderer: &Arc<Mutex<Renderer>>) {
        match renderer.lock() {
            Ok(mut renderer) => {
                if let Err(error) = renderer.shutdown() {
                    crate::engine_warn!("galaxy3d::Engine", "Renderer shutdown failed: {}", error);
                }
            }
            Err(_) => {
                crate::engine_warn!("galaxy3d::Engine", "Renderer lock poisoned, dropped without drain");
            }
        }
    }

    /// Register the renderer singleton
    ///
    /// # Arguments
    ///
    /// * `renderer` - Renderer built on the device the application picked
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The engine is not initialized
    /// - A renderer already exists (there is no partial re-initialization)
    /// - The renderer lock is poisoned
    pub fn create_renderer(renderer: Renderer) -> Result<()> {
        let state = Self::state()?;

        let mut lock = state.renderer.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("Renderer lock poisoned".to_string())
            ))?;

        if lock.is_some() {
            return Err(Self::log_and_return_error(
                Error::InitializationFailed("Renderer already exists. Call Engine::destroy_renderer() first.".to_string())
            ));
        }

        *lock = Some(Arc::new(Mutex::new(renderer)));

        crate::engine_info!("galaxy3d::Engine", "Renderer singleton created successfully");

        Ok(())
    }

    /// Get the renderer singleton
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The engine is not initialized
    /// - The renderer has not been created
    ///
    /// # Example
    ///
    /// ```no_run
    /// use galaxy_3d_binder::galaxy3d::Engine;
    ///
    /// let renderer = Engine::renderer()?;
    /// let index = renderer.lock().unwrap().begin_frame()?;
    /// # Ok::<(), galaxy_3d_binder::galaxy3d::Error>(())
    /// ```
    pub fn renderer() -> Result<Arc<Mutex<Renderer>>> {
        let state = Self::state()?;

        let lock = state.renderer.read()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("Renderer lock poisoned".to_string())
            ))?;

        lock.clone()
            .ok_or_else(|| Self::log_and_return_error(
                Error::InitializationFailed("Renderer not created. Call Engine::create_renderer() first.".to_string())
            ))
    }

    /// Whether a renderer singleton exists
    pub fn has_renderer() -> bool {
        ENGINE_STATE
            .get()
            .and_then(|state| state.renderer.read().ok().map(|lock| lock.is_some()))
            .unwrap_or(false)
    }

    /// Shut down and remove the renderer singleton
    ///
    /// Existing references stay valid until dropped, but the renderer they
    /// point at is shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is not initialized
    pub fn destroy_renderer() -> Result<()> {
        let state = Self::state()?;

        let renderer = state.renderer.write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("Renderer lock poisoned".to_string())
            ))?
            .take();

        if let Some(renderer) = renderer {
            Self::shutdown_renderer(&renderer);
            crate::engine_info!("galaxy3d::Engine", "Renderer singleton destroyed");
        }

        Ok(())
    }

    /// Reset all singletons for testing (only available in test builds)
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Some(state) = ENGINE_STATE.get() {
            if let Ok(mut renderer) = state.renderer.write() {
                *renderer = None;
            }
        }
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// Replace the default logger with a custom implementation (file logger,
    /// `MemoryLogger` in tests, etc.)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use galaxy_3d_binder::galaxy3d::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct FileLogger;
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = global_logger().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        if let Ok(mut lock) = global_logger().write() {
            *lock = Box::new(DefaultLogger::default());
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    ///
    /// # Arguments
    ///
    /// * `severity` - Log severity level
    /// * `source` - Source module (e.g., "galaxy3d::FramePipeline")
    /// * `message` - Log message
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = global_logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error! and the error helper macros.
    ///
    /// # Arguments
    ///
    /// * `severity` - Log severity level (typically Error)
    /// * `source` - Source module (e.g., "galaxy3d::DescriptorHeap")
    /// * `message` - Log message
    /// * `file` - Source file path
    /// * `line` - Source line number
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = global_logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
