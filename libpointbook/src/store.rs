//! Store controller
//!
//! [`Store`] is the single owner of the live [`AppState`]. Consumers read it
//! through queries and change it through commands; they never touch the
//! state directly. Every command becomes an [`Action`] run through the
//! reducer, and changed state is written back to a [`KeyValueStore`]:
//!
//! - after a quiet window (debounced, 500ms by default) following the last
//!   change;
//! - additionally ~100ms after `place_bet` and `add_raffle_entry`, whatever
//!   the debounce timer is doing;
//! - immediately on [`Store::flush`].
//!
//! # Lifecycle
//!
//! `Uninitialized -> Loading -> Ready -> ShutDown`. Nothing is persisted
//! before `Ready`, and merging the loaded snapshot never schedules a write.
//! Changes made before `Ready` are saved with one debounced write once the
//! load completes. After `shutdown()` commands still update memory but
//! schedule nothing.
//!
//! # Failure containment
//!
//! Commands never return errors. A failed read falls back to defaults and a
//! failed write is logged and reported as [`StoreEvent::PersistFailed`]; the
//! next successful write reconciles storage with memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libpointbook::storage::FileStore;
//! use libpointbook::store::{Store, StoreOptions};
//! use libpointbook::types::BetSpec;
//!
//! # async fn example() -> libpointbook::Result<()> {
//! let storage = Arc::new(FileStore::new("/tmp/pointbook"));
//! let store = Store::open(storage, StoreOptions::default()).await;
//!
//! let bet = store.place_bet(BetSpec::new(100, 250).with_detail("team", "Lions"));
//! store.simulate_bet_completion(bet.id, true);
//! assert_eq!(store.points(), 1050);
//!
//! store.flush().await?;
//! store.shutdown();
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::actions::Action;
use crate::config::{Config, DEFAULT_STORAGE_KEY};
use crate::error::Result;
use crate::events::{EventBus, EventReceiver, PersistReason, StoreEvent};
use crate::reducer::{reduce_with, BalancePolicy};
use crate::scheduler::PersistScheduler;
use crate::snapshot;
use crate::state::{AppState, STARTING_POINTS};
use crate::storage::{FileStore, KeyValueStore};
use crate::types::{Bet, BetId, BetResult, BetSpec, CartItem, ItemId, ShippingInfo};

/// Store settings
#[derive(Debug, Clone, PartialEq)]
pub struct StoreOptions {
    /// Key the whole snapshot is stored under
    pub storage_key: String,
    /// Quiet window before a debounced persist
    pub debounce: Duration,
    /// Delay of the forced persist after bets and raffle entries
    pub forced_delay: Duration,
    /// Balance of a fresh state
    pub starting_points: i64,
    pub balance_policy: BalancePolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            debounce: Duration::from_millis(500),
            forced_delay: Duration::from_millis(100),
            starting_points: STARTING_POINTS,
            balance_policy: BalancePolicy::AllowNegative,
        }
    }
}

/// Where the store is in its startup/teardown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Loading,
    Ready,
    ShutDown,
}

/// Handle to the application state store
///
/// Cheap to clone; clones share the same state. Dropping the last handle
/// aborts any persist still waiting on a timer.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: RwLock<AppState>,
    lifecycle: RwLock<Lifecycle>,
    storage: Arc<dyn KeyValueStore>,
    options: StoreOptions,
    scheduler: PersistScheduler,
    events: EventBus,
    /// Serialises snapshot writes so they land in order
    write_lock: Mutex<()>,
    /// A change or forced write was requested before `Ready`
    changed_before_ready: AtomicBool,
}

impl Store {
    /// Build a store over `storage` without loading
    ///
    /// The state holds defaults with `is_loading` set until [`Store::load`]
    /// runs.
    pub fn new(storage: Arc<dyn KeyValueStore>, options: StoreOptions) -> Self {
        let scheduler = PersistScheduler::new(options.debounce, options.forced_delay);
        let state = AppState::with_starting_points(options.starting_points);

        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(state),
                lifecycle: RwLock::new(Lifecycle::Uninitialized),
                storage,
                options,
                scheduler,
                events: EventBus::new(100),
                write_lock: Mutex::new(()),
                changed_before_ready: AtomicBool::new(false),
            }),
        }
    }

    /// Build a store and run the startup protocol
    pub async fn open(storage: Arc<dyn KeyValueStore>, options: StoreOptions) -> Self {
        let store = Self::new(storage, options);
        store.load().await;
        store
    }

    /// Open a file-backed store as described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the persistence durations in `config` are invalid.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let storage = Arc::new(FileStore::new(config.storage_dir()));
        Ok(Self::open(storage, config.store_options()?).await)
    }

    /// Read the saved snapshot and merge it into the state
    ///
    /// Never fails: unreadable, undecodable or invalid snapshots leave the
    /// defaults in place. Returns whether a snapshot was restored. Calling
    /// this more than once does nothing.
    pub async fn load(&self) -> bool {
        {
            let mut lifecycle = self.inner.write_lifecycle();
            if *lifecycle != Lifecycle::Uninitialized {
                warn!(lifecycle = ?*lifecycle, "Store already loaded");
                return false;
            }
            *lifecycle = Lifecycle::Loading;
        }
        self.inner.apply(Action::SetLoading(true));

        let key = &self.inner.options.storage_key;
        info!(key = %key, "Loading saved state");

        let restored = match self.inner.storage.get(key).await {
            Ok(Some(text)) => match snapshot::decode(&text) {
                Ok(Some(patch)) => {
                    self.inner.apply(Action::SetState(patch.with_loading(false)));
                    info!(points = self.points(), "Loaded saved state");
                    true
                }
                Ok(None) => {
                    warn!("Invalid saved state, using defaults");
                    false
                }
                Err(e) => {
                    warn!(error = %e, "Unreadable saved state, using defaults");
                    false
                }
            },
            Ok(None) => {
                info!("No saved state found, using defaults");
                false
            }
            Err(e) => {
                error!(error = %e, "Error loading state");
                false
            }
        };

        if !restored {
            self.inner.apply(Action::SetLoading(false));
        }

        let deferred = {
            let mut lifecycle = self.inner.write_lifecycle();
            *lifecycle = Lifecycle::Ready;
            self.inner.changed_before_ready.swap(false, Ordering::SeqCst)
        };
        self.inner.events.emit(StoreEvent::Loaded { restored });

        if deferred {
            debug!("Saving changes made while loading");
            self.schedule_persist(PersistReason::Debounced);
        }
        restored
    }

    /// Run `action` through the reducer
    ///
    /// Returns whether the state changed. A change made while the store is
    /// `Ready` (re)arms the debounced persist; one made earlier is saved when
    /// loading completes.
    pub fn dispatch(&self, action: Action) -> bool {
        self.dispatch_with(|_| Some(action))
    }

    /// Build the action from the current state and apply it atomically
    ///
    /// `None` from `build` leaves the state alone.
    fn dispatch_with<F>(&self, build: F) -> bool
    where
        F: FnOnce(&AppState) -> Option<Action>,
    {
        let mut kind = "UNKNOWN";
        let changed = self.inner.apply_with(|state| {
            let action = build(state)?;
            kind = action.kind();
            Some(action)
        });

        tracing::trace!(action = kind, changed, "Dispatched");
        if changed {
            self.inner.events.emit(StoreEvent::StateChanged {
                action: kind.to_string(),
            });
            self.request_persist(PersistReason::Debounced);
        }
        changed
    }

    fn schedule_persist(&self, reason: PersistReason) {
        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let task = async move {
            if let Some(inner) = weak.upgrade() {
                // Failures are already logged and broadcast
                let _ = inner.persist(reason).await;
            }
        };

        match reason {
            PersistReason::Debounced => self.inner.scheduler.schedule_debounced(task),
            _ => self.inner.scheduler.schedule_forced(task),
        }
    }

    fn force_persist(&self) {
        self.request_persist(PersistReason::Forced);
    }

    /// Schedule a persist when `Ready`, or remember it for the end of loading
    fn request_persist(&self, reason: PersistReason) {
        let lifecycle = self.inner.read_lifecycle();
        match *lifecycle {
            Lifecycle::Ready => self.schedule_persist(reason),
            Lifecycle::Uninitialized | Lifecycle::Loading => {
                self.inner.changed_before_ready.store(true, Ordering::SeqCst);
            }
            Lifecycle::ShutDown => {}
        }
    }

    // === Commands ===

    pub fn add_points(&self, points: i64) {
        self.dispatch(Action::AddPoints(points));
    }

    pub fn subtract_points(&self, points: i64) {
        self.dispatch(Action::SubtractPoints(points));
    }

    /// Place a bet, debiting its amount in the same transition
    ///
    /// The bet id is the current time in milliseconds, bumped past existing
    /// ids on a clash. Forces an early persist.
    pub fn place_bet(&self, spec: BetSpec) -> Bet {
        let now = Utc::now();
        let mut bet = Bet::from_spec(spec, now.timestamp_millis(), now);

        self.dispatch_with(|state| {
            bet.id = state.next_bet_id(bet.id);
            Some(Action::PlaceBet(bet.clone()))
        });
        self.force_persist();

        info!(
            bet_id = bet.id,
            amount = bet.amount,
            potential_win = bet.potential_win,
            points = self.points(),
            "Bet placed"
        );
        bet
    }

    /// Settle an active bet; unknown ids are ignored
    pub fn complete_bet(&self, bet_id: BetId, result: BetResult) -> bool {
        self.dispatch(Action::CompleteBet { bet_id, result })
    }

    /// Settle an active bet with the standard win/loss result
    ///
    /// A win credits `potential_win - amount`. Returns the settled bet, or
    /// `None` when no active bet has `bet_id`.
    pub fn simulate_bet_completion(&self, bet_id: BetId, won: bool) -> Option<Bet> {
        let mut settled = None;

        self.dispatch_with(|state| {
            let bet = state.find_active_bet(bet_id)?;
            let result = BetResult::simulated(bet, won);
            settled = Some(bet.clone().complete(result.clone()));
            Some(Action::CompleteBet { bet_id, result })
        });

        match &settled {
            Some(bet) => info!(
                bet_id,
                status = %bet.status,
                winnings = bet.winnings.unwrap_or(0),
                points = self.points(),
                "Bet settled"
            ),
            None => debug!(bet_id, "No active bet to settle"),
        }
        settled
    }

    /// Buy one raffle entry; forces an early persist
    pub fn add_raffle_entry(&self) {
        self.dispatch(Action::AddRaffleEntry);
        self.force_persist();
        info!(entries = self.raffle_entries(), "Raffle entry added");
    }

    pub fn add_to_cart(&self, item: CartItem) -> bool {
        self.dispatch(Action::AddToCart(item))
    }

    pub fn remove_from_cart(&self, id: impl Into<ItemId>) -> bool {
        self.dispatch(Action::RemoveFromCart(id.into()))
    }

    pub fn clear_cart(&self) {
        self.dispatch(Action::ClearCart);
    }

    pub fn update_shipping_info(&self, info: ShippingInfo) {
        self.dispatch(Action::UpdateShipping(info));
    }

    // === Persistence ===

    /// Write the current state now
    ///
    /// Cancels the pending debounced persist, which would write the same
    /// state. Unlike timer-driven persists, the storage error is returned.
    pub async fn flush(&self) -> Result<()> {
        self.inner.scheduler.cancel_debounced();
        self.inner.persist(PersistReason::Flush).await
    }

    /// Cancel outstanding persists and stop scheduling new ones
    pub fn shutdown(&self) {
        let pending = self.inner.scheduler.has_pending();
        self.inner.scheduler.cancel_pending();
        *self.inner.write_lifecycle() = Lifecycle::ShutDown;
        debug!(pending, "Store shut down");
    }

    /// Whether a persist is waiting on a timer
    pub fn has_pending_persist(&self) -> bool {
        self.inner.scheduler.has_pending()
    }

    // === Queries ===

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// Copy of the full current state
    pub fn state(&self) -> AppState {
        self.inner.read_state().clone()
    }

    pub fn points(&self) -> i64 {
        self.inner.read_state().user_points
    }

    pub fn active_bets(&self) -> Vec<Bet> {
        self.inner.read_state().user_bets.clone()
    }

    pub fn completed_bets(&self) -> Vec<Bet> {
        self.inner.read_state().completed_bets.clone()
    }

    pub fn raffle_entries(&self) -> u64 {
        self.inner.read_state().raffle_entries
    }

    pub fn cart(&self) -> Vec<CartItem> {
        self.inner.read_state().cart.clone()
    }

    pub fn shipping_info(&self) -> ShippingInfo {
        self.inner.read_state().shipping_info.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.read_state().is_loading
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.inner.read_lifecycle()
    }

    pub fn find_active_bet(&self, bet_id: BetId) -> Option<Bet> {
        self.inner.read_state().find_active_bet(bet_id).cloned()
    }
}

impl StoreInner {
    fn read_state(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_lifecycle(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lifecycle(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, action: Action) -> bool {
        self.apply_with(|_| Some(action))
    }

    /// Reduce under the write lock; returns whether the state changed
    fn apply_with<F>(&self, build: F) -> bool
    where
        F: FnOnce(&AppState) -> Option<Action>,
    {
        let mut state = self.write_state();
        let Some(action) = build(&state) else {
            return false;
        };

        let previous = std::mem::take(&mut *state);
        let next = reduce_with(previous.clone(), action, self.options.balance_policy);
        let changed = next != previous;
        *state = next;
        changed
    }

    /// Write the state as it is now
    async fn persist(&self, reason: PersistReason) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let encoded = snapshot::encode(&self.read_state());

        let outcome = match encoded {
            Ok(text) => self
                .storage
                .set(&self.options.storage_key, &text)
                .await
                .map(|()| text.len()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(bytes) => {
                debug!(reason = %reason, bytes, "State saved");
                self.events.emit(StoreEvent::Persisted { reason });
                Ok(())
            }
            Err(e) => {
                error!(reason = %reason, error = %e, "Error saving state");
                self.events.emit(StoreEvent::PersistFailed {
                    reason,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::BetStatus;

    const KEY: &str = "appState";

    fn ready_store(storage: &MemoryStore) -> Store {
        let store = Store::new(Arc::new(storage.clone()), StoreOptions::default());
        *store.inner.write_lifecycle() = Lifecycle::Ready;
        store.inner.apply(Action::SetLoading(false));
        store
    }

    #[test]
    fn test_new_store_is_uninitialized_and_loading() {
        let store = Store::new(Arc::new(MemoryStore::new()), StoreOptions::default());

        assert_eq!(store.lifecycle(), Lifecycle::Uninitialized);
        assert!(store.is_loading());
        assert_eq!(store.points(), 1000);
    }

    #[test]
    fn test_starting_points_option() {
        let options = StoreOptions {
            starting_points: 50,
            ..StoreOptions::default()
        };
        let store = Store::new(Arc::new(MemoryStore::new()), options);

        assert_eq!(store.points(), 50);
    }

    #[tokio::test]
    async fn test_dispatch_reports_change() {
        let store = ready_store(&MemoryStore::new());

        assert!(store.dispatch(Action::AddPoints(5)));
        assert!(!store.dispatch(Action::RemoveBet(42)));
        assert!(!store.dispatch(Action::Unknown));
        assert!(!store.dispatch(Action::AddPoints(0)));
    }

    #[tokio::test]
    async fn test_reads_see_latest_dispatch() {
        let store = ready_store(&MemoryStore::new());

        store.add_points(10);
        assert_eq!(store.points(), 1010);
        store.subtract_points(20);
        assert_eq!(store.points(), 990);
    }

    #[tokio::test]
    async fn test_place_bet_is_single_transition() {
        let store = ready_store(&MemoryStore::new());
        let mut events = store.subscribe();

        let bet = store.place_bet(BetSpec::new(100, 250));

        assert_eq!(store.points(), 900);
        assert_eq!(store.active_bets(), vec![bet.clone()]);
        assert_eq!(bet.status, BetStatus::Active);
        assert_eq!(
            events.try_recv().unwrap(),
            StoreEvent::StateChanged {
                action: "PLACE_BET".to_string()
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bet_ids_are_unique() {
        let store = ready_store(&MemoryStore::new());

        let ids: Vec<BetId> = (0..5)
            .map(|_| store.place_bet(BetSpec::new(1, 2)).id)
            .collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();

        assert_eq!(store.active_bets().len(), 5);
        assert_eq!(unique.len(), 5);
    }

    #[tokio::test]
    async fn test_simulate_completion_win_and_loss() {
        let store = ready_store(&MemoryStore::new());

        let winner = store.place_bet(BetSpec::new(100, 250));
        let loser = store.place_bet(BetSpec::new(50, 120));
        assert_eq!(store.points(), 850);

        let settled = store.simulate_bet_completion(winner.id, true).unwrap();
        assert_eq!(settled.status, BetStatus::Won);
        assert_eq!(settled.winnings, Some(150));
        assert_eq!(settled.result.as_deref(), Some("Won +150 points"));
        assert_eq!(store.points(), 1000);

        let settled = store.simulate_bet_completion(loser.id, false).unwrap();
        assert_eq!(settled.status, BetStatus::Lost);
        assert_eq!(settled.result.as_deref(), Some("Lost -50 points"));
        assert_eq!(store.points(), 1000);

        assert!(store.active_bets().is_empty());
        assert_eq!(store.completed_bets().len(), 2);
    }

    #[tokio::test]
    async fn test_simulate_completion_unknown_id() {
        let store = ready_store(&MemoryStore::new());
        let before = store.state();

        assert!(store.simulate_bet_completion(7, true).is_none());
        assert_eq!(store.state(), before);
    }

    #[tokio::test]
    async fn test_cart_and_shipping_commands() {
        let store = ready_store(&MemoryStore::new());

        assert!(store.add_to_cart(CartItem::new(1i64).with_field("name", "Cap")));
        assert!(store.add_to_cart(CartItem::new("hoodie")));
        assert!(!store.add_to_cart(CartItem::new(1i64)));
        assert!(store.remove_from_cart(1i64));
        assert!(!store.remove_from_cart("missing"));
        assert_eq!(store.cart().len(), 1);

        store.clear_cart();
        assert!(store.cart().is_empty());

        let info = ShippingInfo {
            name: "Ada".to_string(),
            city: "Turin".to_string(),
            ..ShippingInfo::default()
        };
        store.update_shipping_info(info.clone());
        assert_eq!(store.shipping_info(), info);
    }

    #[tokio::test]
    async fn test_flush_writes_snapshot() {
        let storage = MemoryStore::new();
        let store = ready_store(&storage);

        store.add_points(1);
        store.flush().await.unwrap();

        let saved = storage.peek(KEY).unwrap();
        assert!(saved.starts_with(r#"{"userPoints":1001"#));
        assert!(!saved.contains("isLoading"));
        assert!(!store.has_pending_persist());
    }

    #[tokio::test]
    async fn test_flush_reports_write_failure() {
        let storage = MemoryStore::new();
        storage.set_fail_writes(true);
        let store = ready_store(&storage);
        let mut events = store.subscribe();

        assert!(store.flush().await.is_err());
        assert!(matches!(
            events.try_recv().unwrap(),
            StoreEvent::PersistFailed {
                reason: PersistReason::Flush,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_load_twice_is_ignored() {
        let storage = MemoryStore::with_entry(KEY, r#"{"userPoints":5}"#);
        let store = Store::open(Arc::new(storage.clone()), StoreOptions::default()).await;

        store.add_points(1);
        assert!(!store.load().await);
        assert_eq!(store.points(), 6);
        assert_eq!(storage.get_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_before_ready_are_saved_after_load() {
        let storage = MemoryStore::new();
        let store = Store::new(Arc::new(storage.clone()), StoreOptions::default());

        store.add_points(5);
        store.add_raffle_entry();
        assert_eq!(store.points(), 1005);
        assert!(!store.has_pending_persist());

        assert!(!store.load().await);
        assert!(store.has_pending_persist());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(storage.set_count(), 1);
        let saved: serde_json::Value =
            serde_json::from_str(storage.writes_for(DEFAULT_STORAGE_KEY).last().unwrap()).unwrap();
        assert_eq!(saved["userPoints"], 1005);
        assert_eq!(saved["raffleEntries"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_load_schedules_nothing() {
        let storage = MemoryStore::new();
        let store = Store::new(Arc::new(storage.clone()), StoreOptions::default());

        store.load().await;
        assert!(!store.has_pending_persist());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(storage.set_count(), 0);
    }

    #[tokio::test]
    async fn test_from_config_uses_storage_section() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.path = temp.path().to_string_lossy().into_owned();
        config.storage.key = "points".to_string();

        let first = Store::from_config(&config).await.unwrap();
        assert_eq!(first.lifecycle(), Lifecycle::Ready);
        first.add_points(1);
        first.flush().await.unwrap();
        first.shutdown();
        assert!(temp.path().join("points.json").exists());

        let second = Store::from_config(&config).await.unwrap();
        assert_eq!(second.points(), 1001);
        second.shutdown();
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_duration() {
        let mut config = Config::default();
        config.persistence.debounce = "whenever".to_string();

        assert!(Store::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_scheduling() {
        let store = ready_store(&MemoryStore::new());

        store.add_points(5);
        assert!(store.has_pending_persist());

        store.shutdown();
        assert_eq!(store.lifecycle(), Lifecycle::ShutDown);
        assert!(!store.has_pending_persist());

        store.add_points(5);
        assert_eq!(store.points(), 1010);
        assert!(!store.has_pending_persist());
    }
}
