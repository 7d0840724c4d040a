//! Background map loading.
//!
//! A dedicated thread owns the upload and physics backends and compiles maps
//! as requests arrive. Each finished level is published whole into a
//! `LevelSlot`; readers clone the `Arc`s and never see a half-built level.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;

use bspview_common::error::AssetError;

use crate::backend::{GpuBackend, PhysicsBackend};
use crate::level::Level;
use crate::map_compiler::{compile_bytes, compile_map, CompileOptions};
use crate::material::MaterialRegistry;

/// Pending load requests before `request` starts refusing.
pub const LOAD_QUEUE_CAPACITY: usize = 4;

/// A compiled level with the material table it was compiled against.
#[derive(Debug, Clone)]
pub struct LoadedMap {
    pub level: Arc<Level>,
    pub materials: Arc<MaterialRegistry>,
}

/// The level currently in use.
#[derive(Debug, Default)]
pub struct LevelSlot {
    current: RwLock<Option<LoadedMap>>,
}

impl LevelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current level, returning the previous one.
    pub fn publish(&self, map: LoadedMap) -> Option<LoadedMap> {
        self.current.write().replace(map)
    }

    pub fn current(&self) -> Option<LoadedMap> {
        self.current.read().clone()
    }

    pub fn clear(&self) -> Option<LoadedMap> {
        self.current.write().take()
    }
}

#[derive(Debug)]
pub enum LoadEvent {
    Loaded { name: String, models: usize },
    Failed { name: String, error: AssetError },
}

enum LoadRequest {
    File(String),
    Bytes { name: String, data: Vec<u8> },
}

struct LoadWorker {
    gpu: Box<dyn GpuBackend + Send>,
    physics: Box<dyn PhysicsBackend + Send>,
    materials: MaterialRegistry,
    options: CompileOptions,
    slot: Arc<LevelSlot>,
    /// Replaced levels whose buffers wait for the last reader to let go.
    retired: Vec<Arc<Level>>,
}

impl LoadWorker {
    fn release_retired(&mut self) {
        let gpu = &mut *self.gpu;
        self.retired.retain(|level| {
            if Arc::strong_count(level) > 1 {
                return true;
            }
            level.release(&mut *gpu);
            false
        });
    }

    fn run(mut self, requests: Receiver<LoadRequest>, events: Sender<LoadEvent>) {
        for request in requests.iter() {
            self.release_retired();

            let (name, result) = match request {
                LoadRequest::File(path) => {
                    let result = compile_map(
                        &path,
                        &mut self.materials,
                        &mut *self.gpu,
                        &mut *self.physics,
                        &self.options,
                    );
                    (path, result)
                }
                LoadRequest::Bytes { name, data } => {
                    let result = compile_bytes(
                        &name,
                        &data,
                        &mut self.materials,
                        &mut *self.gpu,
                        &mut *self.physics,
                        &self.options,
                    );
                    (name, result)
                }
            };

            let event = match result {
                Ok(level) => {
                    let models = level.num_models();
                    let previous = self.slot.publish(LoadedMap {
                        level: Arc::new(level),
                        materials: Arc::new(self.materials.clone()),
                    });
                    log::info!("published {}", name);
                    if let Some(previous) = previous {
                        self.retired.push(previous.level);
                        self.release_retired();
                    }
                    LoadEvent::Loaded { name, models }
                }
                Err(error) => {
                    log::warn!("failed to load {}: {}", name, error);
                    LoadEvent::Failed { name, error }
                }
            };

            if events.send(event).is_err() {
                break;
            }
        }

        self.release_retired();
        if !self.retired.is_empty() {
            log::warn!("{} replaced levels still in use at loader exit", self.retired.len());
        }
        log::debug!("map loader thread exiting");
    }
}

/// Owns the loader thread. Dropping it finishes the request in flight and
/// joins the thread.
pub struct MapLoader {
    requests: Option<Sender<LoadRequest>>,
    events: Receiver<LoadEvent>,
    worker: Option<JoinHandle<()>>,
}

impl MapLoader {
    pub fn spawn(
        gpu: Box<dyn GpuBackend + Send>,
        physics: Box<dyn PhysicsBackend + Send>,
        materials: MaterialRegistry,
        options: CompileOptions,
        slot: Arc<LevelSlot>,
    ) -> io::Result<Self> {
        let (request_tx, request_rx) = bounded(LOAD_QUEUE_CAPACITY);
        let (event_tx, event_rx) = unbounded();

        let worker = LoadWorker {
            gpu,
            physics,
            materials,
            options,
            slot,
            retired: Vec::new(),
        };
        let handle = thread::Builder::new()
            .name("map-loader".into())
            .spawn(move || worker.run(request_rx, event_tx))?;

        Ok(Self {
            requests: Some(request_tx),
            events: event_rx,
            worker: Some(handle),
        })
    }

    fn send(&self, request: LoadRequest) -> bool {
        let Some(requests) = &self.requests else {
            return false;
        };
        match requests.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("map load queue full, request dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("map loader thread is gone");
                false
            }
        }
    }

    /// Queue the map at `path`. Returns false when the queue is full.
    pub fn request(&self, path: impl Into<String>) -> bool {
        self.send(LoadRequest::File(path.into()))
    }

    /// Queue an in-memory map image.
    pub fn request_bytes(&self, name: impl Into<String>, data: Vec<u8>) -> bool {
        self.send(LoadRequest::Bytes {
            name: name.into(),
            data,
        })
    }

    pub fn poll(&self) -> Option<LoadEvent> {
        self.events.try_recv().ok()
    }

    pub fn wait(&self, timeout: Duration) -> Option<LoadEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for MapLoader {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("map loader thread panicked");
            }
        }
    }
}
