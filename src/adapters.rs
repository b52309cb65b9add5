//! View-state adapters.
//!
//! Each adapter binds one service call to a [`RequestState`] that
//! presentation code reads or subscribes to. Adapters are the recovery
//! boundary: service errors end up in the state and never escape a trigger.
//!
//! Every trigger takes a new generation number. A response is applied only
//! if no newer trigger is still running or has already settled, so a slow
//! superseded request cannot overwrite a newer result.

use crate::api::{ApiClient, DownloadCount, DownloadStage, ImagePage, ImageRecord, SavedDownload};
use crate::error::{GalleryError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Lifecycle of one adapter's request
///
/// A value and an error are never held at the same time.
#[derive(Debug, Clone)]
pub enum RequestState<T> {
    Idle,
    Pending,
    Failed(Arc<GalleryError>),
    Settled(T),
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        RequestState::Idle
    }
}

impl<T> RequestState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, RequestState::Pending)
    }

    pub fn error(&self) -> Option<&Arc<GalleryError>> {
        match self {
            RequestState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            RequestState::Settled(value) => Some(value),
            _ => None,
        }
    }
}

/// What happened to a trigger's response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The response was stored in the state
    Applied,
    /// A newer trigger superseded this one; the response was dropped
    Discarded,
    /// Nothing was requested
    Skipped,
}

/// Generation-guarded holder of a [`RequestState`]
///
/// Any number of requests may be in flight. The newest one still running
/// owns the state: its settlement is applied, older ones are discarded once
/// a newer settlement has landed.
pub struct Tracker<T> {
    state: watch::Sender<RequestState<T>>,
    flights: Mutex<Flights<T>>,
}

/// Bookkeeping of the requests a tracker has started
struct Flights<T> {
    next: u64,
    live: BTreeSet<u64>,
    applied: u64,
    /// State to put back if every live request is abandoned
    baseline: Option<RequestState<T>>,
}

impl<T> Flights<T> {
    fn is_newest(&self, generation: u64) -> bool {
        generation > self.applied && self.live.iter().all(|&g| g <= generation)
    }
}

impl<T> Default for Tracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tracker<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RequestState::Idle);
        Self {
            state,
            flights: Mutex::new(Flights {
                next: 0,
                live: BTreeSet::new(),
                applied: 0,
                baseline: None,
            }),
        }
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn error(&self) -> Option<Arc<GalleryError>> {
        self.state.borrow().error().cloned()
    }

    /// Run `request` as the latest generation and store its outcome
    pub async fn track<F>(&self, request: F) -> Settlement
    where
        F: Future<Output = Result<T>>,
    {
        self.track_with(|_| request).await
    }

    /// Like [`Tracker::track`], handing the request its generation
    ///
    /// The generation can be checked with [`Tracker::is_newest`] to tell
    /// whether the request still owns the state.
    pub async fn track_with<F, Fut>(&self, request: F) -> Settlement
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let flight = InFlight::begin(self);

        let next = match request(flight.generation).await {
            Ok(value) => RequestState::Settled(value),
            Err(e) => {
                tracing::warn!("Request failed: {}", e);
                RequestState::Failed(Arc::new(e))
            }
        };

        flight.settle(next)
    }

    /// Whether a settlement of `generation` would be applied right now
    pub fn is_newest(&self, generation: u64) -> bool {
        lock(&self.flights).is_newest(generation)
    }

    fn begin(&self) -> u64 {
        let mut flights = lock(&self.flights);
        flights.next += 1;
        let generation = flights.next;
        flights.live.insert(generation);

        self.state.send_modify(|state| {
            let previous = std::mem::replace(state, RequestState::Pending);
            if !previous.is_loading() {
                flights.baseline = Some(previous);
            }
        });
        generation
    }

    fn apply(&self, generation: u64, next: RequestState<T>) -> bool {
        let mut flights = lock(&self.flights);
        let newest = flights.is_newest(generation);
        flights.live.remove(&generation);
        if !newest {
            return false;
        }

        flights.applied = generation;
        flights.baseline = None;
        self.state.send_replace(next);
        true
    }

    fn abandon(&self, generation: u64) {
        let mut flights = lock(&self.flights);
        flights.live.remove(&generation);

        let applied = flights.applied;
        if flights.live.iter().any(|&g| g > applied) {
            // A request that can still settle keeps the state pending
            return;
        }

        let restored = flights.baseline.take().unwrap_or(RequestState::Idle);
        self.state.send_if_modified(|state| {
            if !state.is_loading() {
                return false;
            }
            *state = restored;
            true
        });
    }
}

impl<T: Clone> Tracker<T> {
    pub fn state(&self) -> RequestState<T> {
        self.state.borrow().clone()
    }

    pub fn result(&self) -> Option<T> {
        self.state.borrow().result().cloned()
    }
}

/// One outstanding request of a [`Tracker`]
///
/// If dropped before settling it leaves the tracker's live set. When no
/// other request can still settle, the state from before the requests
/// began is put back so the tracker never stays `Pending` for a request
/// nobody is polling.
struct InFlight<'a, T> {
    tracker: &'a Tracker<T>,
    generation: u64,
    settled: bool,
}

impl<'a, T> InFlight<'a, T> {
    fn begin(tracker: &'a Tracker<T>) -> Self {
        Self {
            tracker,
            generation: tracker.begin(),
            settled: false,
        }
    }

    fn settle(mut self, next: RequestState<T>) -> Settlement {
        self.settled = true;
        if self.tracker.apply(self.generation, next) {
            Settlement::Applied
        } else {
            tracing::debug!("Discarding stale response (generation {})", self.generation);
            Settlement::Discarded
        }
    }
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker.abandon(self.generation);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parameters of the image listing; compared by content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagesQuery {
    pub skip: u32,
    pub limit: u32,
    pub tags: Vec<String>,
    pub featured: Option<bool>,
}

impl Default for ImagesQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 20,
            tags: Vec::new(),
            featured: None,
        }
    }
}

impl ImagesQuery {
    pub fn page(skip: u32, limit: u32) -> Self {
        Self {
            skip,
            limit,
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_featured(mut self, featured: Option<bool>) -> Self {
        self.featured = featured;
        self
    }
}

/// Paginated image listing
pub struct ImagesAdapter {
    api: ApiClient,
    query: Mutex<ImagesQuery>,
    state: Tracker<ImagePage>,
}

impl ImagesAdapter {
    pub fn new(api: ApiClient, query: ImagesQuery) -> Self {
        Self {
            api,
            query: Mutex::new(query),
            state: Tracker::new(),
        }
    }

    /// Create the adapter and run the initial fetch
    pub async fn mount(api: ApiClient, query: ImagesQuery) -> Self {
        let adapter = Self::new(api, query);
        adapter.refetch().await;
        adapter
    }

    pub fn query(&self) -> ImagesQuery {
        lock(&self.query).clone()
    }

    /// Replace the parameters, re-fetching only when they changed
    pub async fn set_query(&self, query: ImagesQuery) -> Option<Settlement> {
        {
            let mut current = lock(&self.query);
            if *current == query {
                return None;
            }
            *current = query;
        }
        Some(self.refetch().await)
    }

    pub async fn refetch(&self) -> Settlement {
        let query = self.query();
        self.state
            .track(
                self.api
                    .list_images(query.skip, query.limit, &query.tags, query.featured),
            )
            .await
    }

    pub fn result(&self) -> Option<ImagePage> {
        self.state.result()
    }

    /// Records of the last settled page, empty before the first one
    pub fn images(&self) -> Vec<ImageRecord> {
        self.result().map(|page| page.images).unwrap_or_default()
    }

    pub fn total_images(&self) -> u64 {
        self.result().map(|page| page.total).unwrap_or(0)
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn error(&self) -> Option<Arc<GalleryError>> {
        self.state.error()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<ImagePage>> {
        self.state.subscribe()
    }
}

/// A single image record
pub struct ImageAdapter {
    api: ApiClient,
    id: Mutex<String>,
    state: Tracker<ImageRecord>,
}

impl ImageAdapter {
    pub fn new(api: ApiClient, id: impl Into<String>) -> Self {
        Self {
            api,
            id: Mutex::new(id.into()),
            state: Tracker::new(),
        }
    }

    pub fn id(&self) -> String {
        lock(&self.id).clone()
    }

    /// Switch to another image, re-fetching only when the id changed
    pub async fn set_id(&self, id: impl Into<String>) -> Option<Settlement> {
        let id = id.into();
        {
            let mut current = lock(&self.id);
            if *current == id {
                return None;
            }
            *current = id;
        }
        Some(self.refetch().await)
    }

    /// Fetch the current id; an empty id requests nothing
    pub async fn refetch(&self) -> Settlement {
        let id = self.id();
        if id.is_empty() {
            return Settlement::Skipped;
        }
        self.state.track(self.api.get_image(&id)).await
    }

    pub fn image(&self) -> Option<ImageRecord> {
        self.state.result()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn error(&self) -> Option<Arc<GalleryError>> {
        self.state.error()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<ImageRecord>> {
        self.state.subscribe()
    }
}

/// Which counter a [`DownloadStatsAdapter`] reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountScope {
    Global,
    Image(String),
}

/// Download counter, global or for one image
pub struct DownloadStatsAdapter {
    api: ApiClient,
    scope: CountScope,
    state: Tracker<DownloadCount>,
}

impl DownloadStatsAdapter {
    pub fn global(api: ApiClient) -> Self {
        Self::new(api, CountScope::Global)
    }

    pub fn for_image(api: ApiClient, image_id: impl Into<String>) -> Self {
        Self::new(api, CountScope::Image(image_id.into()))
    }

    pub fn new(api: ApiClient, scope: CountScope) -> Self {
        Self {
            api,
            scope,
            state: Tracker::new(),
        }
    }

    pub fn scope(&self) -> &CountScope {
        &self.scope
    }

    pub async fn refetch(&self) -> Settlement {
        match &self.scope {
            CountScope::Global => self.state.track(self.api.get_total_downloads()).await,
            CountScope::Image(id) => self.state.track(self.api.get_image_downloads(id)).await,
        }
    }

    /// Last fetched count, 0 before the first one
    pub fn total_downloads(&self) -> u64 {
        self.state
            .result()
            .map(|count| count.total_downloads)
            .unwrap_or(0)
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn error(&self) -> Option<Arc<GalleryError>> {
        self.state.error()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<DownloadCount>> {
        self.state.subscribe()
    }
}

/// Full download-and-save flow into one directory
pub struct DownloadAdapter {
    api: ApiClient,
    dir: PathBuf,
    state: Tracker<SavedDownload>,
    stage: watch::Sender<DownloadStage>,
}

impl DownloadAdapter {
    pub fn new(api: ApiClient, dir: impl Into<PathBuf>) -> Self {
        let (stage, _) = watch::channel(DownloadStage::Idle);
        Self {
            api,
            dir: dir.into(),
            state: Tracker::new(),
            stage,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download `image_id` and save it
    pub async fn trigger(&self, image_id: &str) -> Settlement {
        self.state
            .track_with(|generation| {
                self.api.save_to_disk_with(image_id, &self.dir, move |stage| {
                    if self.state.is_newest(generation) {
                        self.stage.send_replace(stage);
                    }
                })
            })
            .await
    }

    /// Stage of the trigger that owns the download state
    ///
    /// Superseded triggers stop reporting stages, so this never describes a
    /// download whose result is discarded.
    pub fn stage(&self) -> DownloadStage {
        *self.stage.borrow()
    }

    pub fn last_saved(&self) -> Option<SavedDownload> {
        self.state.result()
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading()
    }

    pub fn error(&self) -> Option<Arc<GalleryError>> {
        self.state.error()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<SavedDownload>> {
        self.state.subscribe()
    }

    pub fn subscribe_stage(&self) -> watch::Receiver<DownloadStage> {
        self.stage.subscribe()
    }
}
