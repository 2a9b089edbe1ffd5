//! Pure reducer function for state transitions
//!
//! The reducer is a pure function: `(State, Action) -> State`.
//!
//! It has NO side effects. Persistence, timers and logging all live in the
//! store controller. The reducer is also total: it never fails, and actions
//! that reference a missing bet or cart item leave state unchanged.

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::state::AppState;
use crate::types::{BetOutcome, BetStatus};

/// What happens when a debit would take the balance below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BalancePolicy {
    /// Let the balance go negative
    #[default]
    #[serde(rename = "allow")]
    AllowNegative,

    /// Stop debits at zero
    #[serde(rename = "clamp")]
    ClampAtZero,
}

impl BalancePolicy {
    fn debit(self, balance: i64, amount: i64) -> i64 {
        let next = balance.saturating_sub(amount);
        match self {
            BalancePolicy::AllowNegative => next,
            BalancePolicy::ClampAtZero => next.max(0),
        }
    }
}

/// Apply `action` to `state` with the default (allow-negative) policy
pub fn reduce(state: AppState, action: Action) -> AppState {
    reduce_with(state, action, BalancePolicy::default())
}

/// Apply `action` to `state`
///
/// `policy` governs the debits done by `SubtractPoints` and `PlaceBet`.
pub fn reduce_with(state: AppState, action: Action, policy: BalancePolicy) -> AppState {
    match action {
        // === Points ===
        Action::SetPoints(points) => AppState {
            user_points: points,
            ..state
        },

        Action::AddPoints(points) => AppState {
            user_points: state.user_points.saturating_add(points),
            ..state
        },

        Action::SubtractPoints(points) => AppState {
            user_points: policy.debit(state.user_points, points),
            ..state
        },

        // === Bets ===
        Action::AddBet(bet) => {
            if state.has_bet_id(bet.id) {
                return state;
            }
            let mut user_bets = state.user_bets;
            user_bets.push(bet);
            AppState { user_bets, ..state }
        }

        Action::PlaceBet(bet) => {
            if state.has_bet_id(bet.id) {
                return state;
            }
            let user_points = policy.debit(state.user_points, bet.amount);
            let mut user_bets = state.user_bets;
            user_bets.push(bet);
            AppState {
                user_points,
                user_bets,
                ..state
            }
        }

        Action::RemoveBet(id) => {
            if state.find_active_bet(id).is_none() {
                return state;
            }
            let mut user_bets = state.user_bets;
            user_bets.retain(|b| b.id != id);
            AppState { user_bets, ..state }
        }

        Action::CompleteBet { bet_id, result } => {
            let Some(pos) = state.user_bets.iter().position(|b| b.id == bet_id) else {
                return state;
            };

            let mut user_bets = state.user_bets;
            let bet = user_bets.remove(pos);
            let credit = match result.status {
                BetOutcome::Won => result.winnings,
                BetOutcome::Lost => 0,
            };
            let completed = bet.complete(result);
            debug_assert!(completed.status != BetStatus::Active);

            let mut completed_bets = state.completed_bets;
            completed_bets.push(completed);

            AppState {
                user_points: state.user_points.saturating_add(credit),
                user_bets,
                completed_bets,
                ..state
            }
        }

        // === Raffle ===
        Action::AddRaffleEntry => AppState {
            raffle_entries: state.raffle_entries.saturating_add(1),
            ..state
        },

        // === Cart ===
        Action::AddToCart(item) => {
            if state.cart.iter().any(|i| i.id == item.id) {
                return state;
            }
            let mut cart = state.cart;
            cart.push(item);
            AppState { cart, ..state }
        }

        Action::RemoveFromCart(id) => {
            if !state.cart.iter().any(|i| i.id == id) {
                return state;
            }
            let mut cart = state.cart;
            cart.retain(|i| i.id != id);
            AppState { cart, ..state }
        }

        Action::ClearCart => AppState {
            cart: Vec::new(),
            ..state
        },

        Action::UpdateShipping(info) => AppState {
            shipping_info: info,
            ..state
        },

        // === Whole-state ===
        Action::LoadState(patch) | Action::SetState(patch) => patch.apply(state),

        Action::SetLoading(is_loading) => AppState { is_loading, ..state },

        Action::Unknown => state,
    }
}
