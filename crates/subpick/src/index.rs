//! Draw Range Index: the model cache hosted on a background thread.
//!
//! Hierarchy construction and range scans over large models run on a
//! dedicated worker so they never stall the interactive thread. The worker
//! owns its [`ModelCache`] outright; callers talk to it only through
//! request messages, each answered on its own reply channel.

use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use subpick_core::cache::{CacheBackend, JsonDirBackend, MemoryBackend, ModelCache};
use subpick_core::{
    DrawRange, Hierarchy, MeshDrawRanges, Options, PickError, RangeId, Result, TreeNode,
};

/// Messages understood by the index worker.
enum Request {
    Add {
        key: String,
        hierarchy: Hierarchy,
        draw_ranges: MeshDrawRanges,
        reply: mpsc::Sender<Result<()>>,
    },
    BuildHierarchy {
        key: String,
        hierarchy: Option<Hierarchy>,
        start_id: u32,
        reply: mpsc::Sender<Option<TreeNode>>,
    },
    GetDrawRange {
        key: String,
        mesh: String,
        face_index: u32,
        reply: mpsc::Sender<Option<DrawRange>>,
    },
    GetPointId {
        key: String,
        mesh: String,
        point_index: u32,
        reply: mpsc::Sender<Option<DrawRange>>,
    },
    GetNameFromRangeId {
        key: String,
        range_id: String,
        reply: mpsc::Sender<Option<String>>,
    },
    GetDrawRangesByMemberNames {
        key: String,
        names: Vec<String>,
        reply: mpsc::Sender<Vec<(String, RangeId)>>,
    },
    GetNodeId {
        key: String,
        element_id: String,
        reply: mpsc::Sender<Option<u32>>,
    },
    Remove {
        key: String,
        reply: mpsc::Sender<Result<()>>,
    },
    Keys {
        reply: mpsc::Sender<Vec<String>>,
    },
    Shutdown,
}

/// The eventual answer to one index request.
///
/// The configured timeout runs from the moment the request was sent, so a
/// render loop polling with [`try_recv`](Self::try_recv) gives up at the same
/// point a blocking [`wait`](Self::wait) would.
#[must_use = "an index request does nothing useful unless its answer is awaited"]
pub struct Pending<T> {
    rx: mpsc::Receiver<T>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<T> Pending<T> {
    fn new(rx: mpsc::Receiver<T>, timeout: Option<Duration>) -> Self {
        Self {
            rx,
            timeout,
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Blocks for the answer, honoring the index's configured timeout.
    pub fn wait(self) -> Result<T> {
        match self.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                match self.rx.recv_timeout(left) {
                    Ok(value) => Ok(value),
                    Err(RecvTimeoutError::Timeout) => Err(self.timed_out()),
                    Err(RecvTimeoutError::Disconnected) => Err(PickError::WorkerDisconnected),
                }
            }
            None => self.rx.recv().map_err(|_| PickError::WorkerDisconnected),
        }
    }

    /// Blocks for at most `timeout`, ignoring the configured one.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(timeout_error(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(PickError::WorkerDisconnected),
        }
    }

    /// Returns the answer if it has arrived, without blocking.
    ///
    /// Yields a timeout error once the configured timeout has passed.
    pub fn try_recv(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Disconnected) => Some(Err(PickError::WorkerDisconnected)),
            Err(TryRecvError::Empty) => match self.deadline {
                Some(deadline) if Instant::now() >= deadline => Some(Err(self.timed_out())),
                _ => None,
            },
        }
    }

    fn timed_out(&self) -> PickError {
        timeout_error(self.timeout.unwrap_or_default())
    }
}

fn timeout_error(timeout: Duration) -> PickError {
    let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    log::warn!("draw range index request timed out after {ms} ms");
    PickError::Timeout(ms)
}

/// Handle to the background index worker.
///
/// Dropping the handle stops the worker and waits for it to exit.
pub struct DrawRangeIndex {
    request_tx: mpsc::Sender<Request>,
    thread: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
}

impl DrawRangeIndex {
    /// Spawns the worker over the given durable backend.
    pub fn spawn(backend: Box<dyn CacheBackend>, options: &Options) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<Request>();
        let thread = std::thread::Builder::new()
            .name("draw-range-index".into())
            .spawn(move || {
                Self::thread_loop(ModelCache::new(backend), request_rx);
            })?;

        log::debug!("draw range index worker started");
        Ok(Self {
            request_tx,
            thread: Some(thread),
            timeout: options.index_request_timeout(),
        })
    }

    /// Spawns the worker with the backend named by `options.cache_dir`.
    pub fn from_options(options: &Options) -> Result<Self> {
        let backend: Box<dyn CacheBackend> = match &options.cache_dir {
            Some(dir) => Box::new(JsonDirBackend::open(dir)?),
            None => Box::new(MemoryBackend::new()),
        };
        Self::spawn(backend, options)
    }

    /// Spawns a worker without durable storage.
    pub fn in_memory() -> Result<Self> {
        Self::spawn(Box::new(MemoryBackend::new()), &Options::default())
    }

    /// Validates, persists and mirrors a model's hierarchy and draw ranges.
    pub fn add(
        &self,
        key: &str,
        hierarchy: Hierarchy,
        draw_ranges: MeshDrawRanges,
    ) -> Pending<Result<()>> {
        self.request(|reply| Request::Add {
            key: key.to_string(),
            hierarchy,
            draw_ranges,
            reply,
        })
    }

    /// Builds the element tree with fresh ids starting at `start_id + 1`.
    ///
    /// Uses the cached hierarchy when `hierarchy` is `None`.
    pub fn build_hierarchy(
        &self,
        key: &str,
        hierarchy: Option<Hierarchy>,
        start_id: u32,
    ) -> Pending<Option<TreeNode>> {
        self.request(|reply| Request::BuildHierarchy {
            key: key.to_string(),
            hierarchy,
            start_id,
            reply,
        })
    }

    /// Resolves a triangle index to the draw range containing it.
    pub fn get_draw_range(
        &self,
        key: &str,
        mesh: &str,
        face_index: u32,
    ) -> Pending<Option<DrawRange>> {
        self.request(|reply| Request::GetDrawRange {
            key: key.to_string(),
            mesh: mesh.to_string(),
            face_index,
            reply,
        })
    }

    /// Resolves a raw vertex index to the draw range containing it.
    pub fn get_point_id(
        &self,
        key: &str,
        mesh: &str,
        point_index: u32,
    ) -> Pending<Option<DrawRange>> {
        self.request(|reply| Request::GetPointId {
            key: key.to_string(),
            mesh: mesh.to_string(),
            point_index,
            reply,
        })
    }

    pub fn get_name_from_range_id(&self, key: &str, range_id: &str) -> Pending<Option<String>> {
        self.request(|reply| Request::GetNameFromRangeId {
            key: key.to_string(),
            range_id: range_id.to_string(),
            reply,
        })
    }

    /// Every `(mesh, range id)` whose element name is one of `names`.
    pub fn get_draw_ranges_by_member_names(
        &self,
        key: &str,
        names: &[String],
    ) -> Pending<Vec<(String, RangeId)>> {
        self.request(|reply| Request::GetDrawRangesByMemberNames {
            key: key.to_string(),
            names: names.to_vec(),
            reply,
        })
    }

    /// Tree id last assigned to an element by [`build_hierarchy`](Self::build_hierarchy).
    pub fn get_node_id(&self, key: &str, element_id: &str) -> Pending<Option<u32>> {
        self.request(|reply| Request::GetNodeId {
            key: key.to_string(),
            element_id: element_id.to_string(),
            reply,
        })
    }

    /// Evicts a model from memory and durable storage.
    pub fn remove(&self, key: &str) -> Pending<Result<()>> {
        self.request(|reply| Request::Remove {
            key: key.to_string(),
            reply,
        })
    }

    pub fn keys(&self) -> Pending<Vec<String>> {
        self.request(|reply| Request::Keys { reply })
    }

    /// Stops the worker and waits for it to finish.
    pub fn shutdown(&mut self) {
        let _ = self.request_tx.send(Request::Shutdown);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("draw range index worker panicked");
            }
        }
    }

    fn request<T>(&self, make: impl FnOnce(mpsc::Sender<T>) -> Request) -> Pending<T> {
        let (reply, rx) = mpsc::channel();
        // On failure the reply sender is dropped with the message, so the
        // caller sees WorkerDisconnected.
        if self.request_tx.send(make(reply)).is_err() {
            log::error!("draw range index worker is not running");
        }
        Pending::new(rx, self.timeout)
    }

    #[allow(clippy::needless_pass_by_value)]
    fn thread_loop(mut cache: ModelCache, request_rx: mpsc::Receiver<Request>) {
        // Replies are best effort: a caller that timed out has dropped its receiver.
        while let Ok(request) = request_rx.recv() {
            match request {
                Request::Shutdown => break,
                Request::Add {
                    key,
                    hierarchy,
                    draw_ranges,
                    reply,
                } => {
                    let _ = reply.send(cache.add(&key, hierarchy, draw_ranges));
                }
                Request::BuildHierarchy {
                    key,
                    hierarchy,
                    start_id,
                    reply,
                } => {
                    let _ = reply.send(cache.build_hierarchy(&key, hierarchy.as_ref(), start_id));
                }
                Request::GetDrawRange {
                    key,
                    mesh,
                    face_index,
                    reply,
                } => {
                    let _ = reply.send(cache.get_draw_range(&key, &mesh, face_index));
                }
                Request::GetPointId {
                    key,
                    mesh,
                    point_index,
                    reply,
                } => {
                    let _ = reply.send(cache.get_point_id(&key, &mesh, point_index));
                }
                Request::GetNameFromRangeId {
                    key,
                    range_id,
                    reply,
                } => {
                    let _ = reply.send(cache.get_name_from_range_id(&key, &range_id));
                }
                Request::GetDrawRangesByMemberNames { key, names, reply } => {
                    let _ = reply.send(cache.get_draw_ranges_by_member_names(&key, &names));
                }
                Request::GetNodeId {
                    key,
                    element_id,
                    reply,
                } => {
                    let _ = reply.send(cache.get_node_id(&key, &element_id));
                }
                Request::Remove { key, reply } => {
                    let _ = reply.send(cache.remove(&key));
                }
                Request::Keys { reply } => {
                    let _ = reply.send(cache.keys());
                }
            }
        }
        log::debug!("draw range index worker stopped");
    }
}

impl Drop for DrawRangeIndex {
    fn drop(&mut self) {
        self.shutdown();
    }
}
