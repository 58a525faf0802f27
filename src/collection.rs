//! Collection controller: owns the authoritative event list and the view
//! derived from it by the current filter criteria.
//!
//! Criteria edits are coalesced through a [`DebounceTimer`]; a completed
//! reload recomputes the view immediately. Every view is published whole
//! through a `watch` channel, so subscribers never see a partial result.
//!
//! Reloads are tagged with a generation number. Only the most recently
//! started reload may touch state when it settles; older responses are
//! dropped. After [`CollectionController::dispose`] no response is applied.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::{runtime::Handle, sync::watch};
use tracing::{debug, info, warn};

use crate::api::{ApiError, EventSource};
use crate::config::AppConfig;
use crate::debounce::DebounceTimer;
use crate::filter::{self, FilterCriteria};
use crate::models::{DifficultyLevel, Event, FilterOptions, SortOrder};

const LOAD_ERROR: &str = "Could not load events. Please try again later.";
const UPCOMING_ERROR: &str = "Could not load upcoming events. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub debounce: Duration,
    pub upcoming_count: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            upcoming_count: 6,
        }
    }
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            debounce: config.debounce(),
            upcoming_count: config.upcoming_count,
        }
    }
}

/// One published derived view. `revision` increases with every recompute.
#[derive(Debug, Clone)]
pub struct EventView {
    pub revision: u64,
    pub events: Arc<[Event]>,
}

impl Default for EventView {
    fn default() -> Self {
        Self {
            revision: 0,
            events: Arc::from(Vec::new()),
        }
    }
}

/// How a reload settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Failed,
    /// A newer reload started, or the controller was disposed, before this
    /// one finished; its result was discarded.
    Superseded,
}

#[derive(Debug, Default)]
struct CollectionState {
    original: Arc<[Event]>,
    criteria: FilterCriteria,
    options: FilterOptions,
    upcoming: Arc<[Event]>,
    registered: HashSet<i64>,
    loading: bool,
    filtering: bool,
    error: Option<String>,
    upcoming_loading: bool,
    upcoming_error: Option<String>,
    revision: u64,
    /// Id of the debounced recompute that may still run.
    shot: u64,
}

struct Shared {
    state: Mutex<CollectionState>,
    view: watch::Sender<EventView>,
    disposed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CollectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-derives the view from the current snapshot and criteria.
    fn recompute(&self, state: &mut CollectionState) {
        let events: Arc<[Event]> = filter::apply_filters(&state.original, &state.criteria).into();
        state.revision += 1;
        state.filtering = false;
        debug!(
            revision = state.revision,
            shown = events.len(),
            total = state.original.len(),
            "recomputed event view"
        );
        self.view.send_replace(EventView {
            revision: state.revision,
            events,
        });
    }

    /// Body of a debounced recompute. A shot that was rescheduled, flushed
    /// or superseded by a reload leaves the state alone.
    fn fire(&self, shot: u64) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let mut state = self.lock();
        if state.shot != shot {
            debug!(shot, current = state.shot, "skipping stale recompute");
            return;
        }
        self.recompute(&mut state);
    }
}

pub struct CollectionController {
    source: Arc<dyn EventSource>,
    shared: Arc<Shared>,
    debounce: Mutex<DebounceTimer>,
    load_generation: AtomicU64,
    upcoming_generation: AtomicU64,
    settings: ControllerSettings,
}

impl CollectionController {
    /// Creates a controller bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(source: Arc<dyn EventSource>, settings: ControllerSettings) -> Self {
        Self::with_runtime(source, settings, Handle::current())
    }

    /// Creates a controller whose debounce timer runs on `runtime`, so the
    /// criteria setters may be called from threads outside it.
    pub fn with_runtime(
        source: Arc<dyn EventSource>,
        settings: ControllerSettings,
        runtime: Handle,
    ) -> Self {
        let (view, _) = watch::channel(EventView::default());
        Self {
            source,
            shared: Arc::new(Shared {
                state: Mutex::new(CollectionState::default()),
                view,
                disposed: AtomicBool::new(false),
            }),
            debounce: Mutex::new(DebounceTimer::new(settings.debounce, runtime)),
            load_generation: AtomicU64::new(0),
            upcoming_generation: AtomicU64::new(0),
            settings,
        }
    }

    pub fn settings(&self) -> ControllerSettings {
        self.settings
    }

    // ---- reload -------------------------------------------------------

    /// Fetches the full collection and its filter options.
    ///
    /// On success the snapshot is replaced (ordered by date) and the view
    /// is recomputed at once; the upcoming list is then refreshed. On
    /// failure the previous snapshot stays in place and `error` is set.
    pub async fn load(&self) -> LoadOutcome {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.shared.lock();
            state.loading = true;
            state.error = None;
        }

        let fetched = self.fetch_collection().await;
        if !self.is_current_load(generation) {
            debug!(generation, "discarding superseded reload");
            return LoadOutcome::Superseded;
        }

        match fetched {
            Ok((events, options)) => {
                // the immediate recompute below already reflects any edit
                // still waiting on the debounce
                self.debounce_timer().cancel();
                {
                    let mut state = self.shared.lock();
                    info!(count = events.len(), "loaded events");
                    state.original = filter::sort_by_date(events).into();
                    state.options = options;
                    state.loading = false;
                    state.shot += 1;
                    self.shared.recompute(&mut state);
                }
                self.refresh_upcoming().await;
                LoadOutcome::Applied
            }
            Err(err) => {
                warn!("failed to load events: {err}");
                let mut state = self.shared.lock();
                state.error = Some(LOAD_ERROR.to_string());
                state.loading = false;
                LoadOutcome::Failed
            }
        }
    }

    /// Re-runs the last reload after a failure.
    pub async fn retry(&self) -> LoadOutcome {
        self.load().await
    }

    async fn fetch_collection(&self) -> Result<(Vec<Event>, FilterOptions), ApiError> {
        let events = self.source.fetch_all_events().await?;
        let options = match self.source.fetch_filter_options().await {
            Ok(options) => options.deduplicated(),
            Err(err) => {
                debug!("filter options unavailable, deriving locally: {err}");
                filter::derive_filter_options(&events)
            }
        };
        Ok((events, options))
    }

    fn is_current_load(&self, generation: u64) -> bool {
        !self.is_disposed() && self.load_generation.load(Ordering::SeqCst) == generation
    }

    // ---- upcoming events ------------------------------------------------

    /// Fetches the next `count` events into the upcoming list.
    pub async fn load_upcoming(&self, count: usize) -> LoadOutcome {
        let generation = self.upcoming_generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.shared.lock();
            state.upcoming_loading = true;
            state.upcoming_error = None;
        }

        let fetched = self.source.fetch_upcoming_events(count).await;
        if self.is_disposed() || self.upcoming_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding superseded upcoming reload");
            return LoadOutcome::Superseded;
        }

        let mut state = self.shared.lock();
        state.upcoming_loading = false;
        match fetched {
            Ok(events) => {
                state.upcoming = filter::sort_by_date(events).into();
                LoadOutcome::Applied
            }
            Err(err) => {
                warn!("failed to load upcoming events: {err}");
                state.upcoming_error = Some(UPCOMING_ERROR.to_string());
                LoadOutcome::Failed
            }
        }
    }

    /// Part of a full reload: a failure keeps the previous upcoming list and
    /// does not fail the reload.
    async fn refresh_upcoming(&self) {
        if self.load_upcoming(self.settings.upcoming_count).await == LoadOutcome::Failed {
            self.shared.lock().upcoming_error = None;
        }
    }

    // ---- criteria -----------------------------------------------------

    pub fn criteria(&self) -> FilterCriteria {
        self.shared.lock().criteria.clone()
    }

    pub fn set_search_text(&self, search: impl Into<String>) {
        let search = search.into();
        self.edit_criteria(|criteria| criteria.search = search);
    }

    pub fn set_city(&self, city: Option<String>) {
        let city = city.filter(|city| !city.is_empty());
        self.edit_criteria(|criteria| criteria.city = city);
    }

    pub fn set_level(&self, level: Option<DifficultyLevel>) {
        self.edit_criteria(|criteria| criteria.level = level);
    }

    pub fn set_sort_order(&self, sort: SortOrder) {
        self.edit_criteria(|criteria| criteria.sort = sort);
    }

    pub fn toggle_sort_order(&self) {
        self.edit_criteria(|criteria| criteria.sort = criteria.sort.toggled());
    }

    /// Restores every criterion to its default in one update and schedules
    /// exactly one recompute.
    pub fn reset_filters(&self) {
        self.shared.lock().criteria = FilterCriteria::default();
        self.schedule_recompute();
    }

    /// Recomputes now, dropping any pending debounced recompute.
    pub fn flush(&self) {
        self.debounce_timer().cancel();
        let mut state = self.shared.lock();
        state.shot += 1;
        self.shared.recompute(&mut state);
    }

    fn edit_criteria<F>(&self, edit: F)
    where
        F: FnOnce(&mut FilterCriteria),
    {
        let changed = {
            let mut state = self.shared.lock();
            let before = state.criteria.clone();
            edit(&mut state.criteria);
            state.criteria != before
        };
        if changed {
            self.schedule_recompute();
        }
    }

    /// Lock order is timer then state, so shot ids are handed out in the
    /// same order the timer sees them.
    fn schedule_recompute(&self) {
        if self.is_disposed() {
            return;
        }
        let mut timer = self.debounce_timer();
        let shot = {
            let mut state = self.shared.lock();
            state.filtering = true;
            state.shot += 1;
            state.shot
        };
        let shared = Arc::clone(&self.shared);
        timer.schedule(move || shared.fire(shot));
    }

    fn debounce_timer(&self) -> MutexGuard<'_, DebounceTimer> {
        self.debounce.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- registration badges -------------------------------------------

    /// Replaces the ids the caller has flagged as registered.
    pub fn set_registered_ids(&self, ids: impl IntoIterator<Item = i64>) {
        self.shared.lock().registered = ids.into_iter().collect();
    }

    pub fn is_registered(&self, event_id: i64) -> bool {
        self.shared.lock().registered.contains(&event_id)
    }

    pub fn registered_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.shared.lock().registered.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    // ---- read side ----------------------------------------------------

    pub fn view(&self) -> EventView {
        self.shared.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EventView> {
        self.shared.view.subscribe()
    }

    pub fn events(&self) -> Arc<[Event]> {
        self.view().events
    }

    pub fn original(&self) -> Arc<[Event]> {
        Arc::clone(&self.shared.lock().original)
    }

    pub fn upcoming(&self) -> Arc<[Event]> {
        Arc::clone(&self.shared.lock().upcoming)
    }

    pub fn filter_options(&self) -> FilterOptions {
        self.shared.lock().options.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.lock().loading
    }

    /// True while a debounced recompute is waiting to run.
    pub fn is_filtering(&self) -> bool {
        self.shared.lock().filtering
    }

    pub fn error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    pub fn is_upcoming_loading(&self) -> bool {
        self.shared.lock().upcoming_loading
    }

    pub fn upcoming_error(&self) -> Option<String> {
        self.shared.lock().upcoming_error.clone()
    }

    // ---- teardown -----------------------------------------------------

    /// Cancels the pending recompute; in-flight reloads are ignored when
    /// they settle.
    pub fn dispose(&self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
        self.debounce_timer().cancel();
        let mut state = self.shared.lock();
        state.shot += 1;
        state.filtering = false;
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for CollectionController {
    fn drop(&mut self) {
        self.shared.disposed.store(true, Ordering::SeqCst);
    }
}
