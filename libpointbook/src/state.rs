//! Application state
//!
//! Single aggregate owned by the [`Store`](crate::store::Store). All
//! transitions go through the reducer (see `reducer.rs`).

use serde::{Deserialize, Serialize};

use crate::types::{Bet, BetId, CartItem, ShippingInfo};

/// Balance every new state starts with
pub const STARTING_POINTS: i64 = 1000;

/// Root application state
///
/// Serializes to the flat snapshot layout. `is_loading` is transient and
/// never written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    /// Spendable points balance
    pub user_points: i64,

    /// Active bets in placement order
    pub user_bets: Vec<Bet>,

    /// Raffle entries bought so far
    pub raffle_entries: u64,

    /// Merchandise cart
    pub cart: Vec<CartItem>,

    /// Delivery address for the cart
    pub shipping_info: ShippingInfo,

    /// Settled bets, append-only
    pub completed_bets: Vec<Bet>,

    /// True only while the initial load is in flight
    #[serde(skip)]
    pub is_loading: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_starting_points(STARTING_POINTS)
    }
}

impl AppState {
    /// Create new application state with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state with a custom opening balance
    pub fn with_starting_points(points: i64) -> Self {
        Self {
            user_points: points,
            user_bets: Vec::new(),
            raffle_entries: 0,
            cart: Vec::new(),
            shipping_info: ShippingInfo::default(),
            completed_bets: Vec::new(),
            is_loading: true,
        }
    }

    /// Look up an active bet
    pub fn find_active_bet(&self, id: BetId) -> Option<&Bet> {
        self.user_bets.iter().find(|b| b.id == id)
    }

    /// Whether any bet, active or settled, already uses `id`
    pub fn has_bet_id(&self, id: BetId) -> bool {
        self.user_bets
            .iter()
            .chain(self.completed_bets.iter())
            .any(|b| b.id == id)
    }

    /// Pick a bet id no existing bet uses, preferring `candidate`
    pub fn next_bet_id(&self, candidate: BetId) -> BetId {
        if !self.has_bet_id(candidate) {
            return candidate;
        }
        let highest = self
            .user_bets
            .iter()
            .chain(self.completed_bets.iter())
            .map(|b| b.id)
            .max()
            .unwrap_or(candidate);
        if let Some(next) = highest.max(candidate).checked_add(1) {
            return next;
        }
        (BetId::MIN..candidate)
            .rev()
            .find(|id| !self.has_bet_id(*id))
            .unwrap_or(candidate)
    }

    /// Total points currently staked on active bets
    pub fn points_at_stake(&self) -> i64 {
        self.user_bets.iter().map(|b| b.amount).sum()
    }
}

/// Partial state for shallow merges
///
/// Present fields replace the corresponding state field wholesale; absent
/// fields leave it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_points: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_bets: Option<Vec<Bet>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raffle_entries: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart: Option<Vec<CartItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_info: Option<ShippingInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_bets: Option<Vec<Bet>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_loading: Option<bool>,
}

impl StatePatch {
    /// Merge this patch over `state`
    pub fn apply(self, state: AppState) -> AppState {
        AppState {
            user_points: self.user_points.unwrap_or(state.user_points),
            user_bets: self.user_bets.unwrap_or(state.user_bets),
            raffle_entries: self.raffle_entries.unwrap_or(state.raffle_entries),
            cart: self.cart.unwrap_or(state.cart),
            shipping_info: self.shipping_info.unwrap_or(state.shipping_info),
            completed_bets: self.completed_bets.unwrap_or(state.completed_bets),
            is_loading: self.is_loading.unwrap_or(state.is_loading),
        }
    }

    /// Builder-style setter used by the loader
    pub fn with_loading(mut self, is_loading: bool) -> Self {
        self.is_loading = Some(is_loading);
        self
    }
}

impl From<AppState> for StatePatch {
    fn from(state: AppState) -> Self {
        Self {
            user_points: Some(state.user_points),
            user_bets: Some(state.user_bets),
            raffle_entries: Some(state.raffle_entries),
            cart: Some(state.cart),
            shipping_info: Some(state.shipping_info),
            completed_bets: Some(state.completed_bets),
            is_loading: Some(state.is_loading),
        }
    }
}
