//! Actions for the reducer pattern
//!
//! Every state transition is described by an [`Action`]. Actions are plain
//! data; the reducer (see `reducer.rs`) decides what they do to state.
//!
//! Actions also have a JSON form, `{"type": "ADD_USER_POINTS", "payload": 50}`,
//! so they can be fed in from tooling. Any `type` this build does not know
//! decodes as [`Action::Unknown`] through [`Action::from_json`], which the
//! reducer ignores.

use serde::{Deserialize, Serialize};

use crate::state::StatePatch;
use crate::types::{Bet, BetId, BetResult, CartItem, ItemId, ShippingInfo};

/// Actions that trigger state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Action {
    // === Points ===
    /// Replace the balance
    #[serde(rename = "SET_USER_POINTS")]
    SetPoints(i64),

    /// Credit the balance
    #[serde(rename = "ADD_USER_POINTS")]
    AddPoints(i64),

    /// Debit the balance
    #[serde(rename = "SUBTRACT_USER_POINTS")]
    SubtractPoints(i64),

    // === Bets ===
    /// Append an active bet without touching the balance
    #[serde(rename = "ADD_BET")]
    AddBet(Bet),

    /// Append an active bet and debit its stake in one step
    #[serde(rename = "PLACE_BET")]
    PlaceBet(Bet),

    /// Drop an active bet
    #[serde(rename = "REMOVE_BET")]
    RemoveBet(BetId),

    /// Settle an active bet and credit any winnings
    #[serde(rename = "COMPLETE_BET", rename_all = "camelCase")]
    CompleteBet { bet_id: BetId, result: BetResult },

    // === Raffle ===
    #[serde(rename = "ADD_RAFFLE_ENTRY")]
    AddRaffleEntry,

    // === Cart ===
    #[serde(rename = "ADD_TO_CART")]
    AddToCart(CartItem),

    #[serde(rename = "REMOVE_FROM_CART")]
    RemoveFromCart(ItemId),

    #[serde(rename = "CLEAR_CART")]
    ClearCart,

    #[serde(rename = "UPDATE_SHIPPING_INFO")]
    UpdateShipping(ShippingInfo),

    // === Whole-state ===
    /// Shallow-merge a restored snapshot
    #[serde(rename = "LOAD_STATE")]
    LoadState(StatePatch),

    /// Shallow-merge arbitrary fields
    #[serde(rename = "SET_STATE")]
    SetState(StatePatch),

    #[serde(rename = "SET_LOADING")]
    SetLoading(bool),

    /// Any action kind this build does not recognise
    #[serde(other)]
    Unknown,
}

/// Wire names of every action this build understands
const KNOWN_KINDS: &[&str] = &[
    "SET_USER_POINTS",
    "ADD_USER_POINTS",
    "SUBTRACT_USER_POINTS",
    "ADD_BET",
    "PLACE_BET",
    "REMOVE_BET",
    "COMPLETE_BET",
    "ADD_RAFFLE_ENTRY",
    "ADD_TO_CART",
    "REMOVE_FROM_CART",
    "CLEAR_CART",
    "UPDATE_SHIPPING_INFO",
    "LOAD_STATE",
    "SET_STATE",
    "SET_LOADING",
];

impl Action {
    /// Decode an action from its JSON form
    ///
    /// Unrecognised kinds become [`Action::Unknown`] whatever their payload.
    ///
    /// # Errors
    ///
    /// Returns an error when the `type` field is missing or a known kind
    /// carries a malformed payload.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let recognised = match value.get("type").and_then(|t| t.as_str()) {
            Some(kind) => KNOWN_KINDS.contains(&kind),
            None => true, // let serde report the missing tag
        };
        if !recognised {
            return Ok(Action::Unknown);
        }
        serde_json::from_value(value)
    }

    /// Decode an action from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        Self::from_json(serde_json::from_str(text)?)
    }

    /// Wire name of this action, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetPoints(_) => "SET_USER_POINTS",
            Action::AddPoints(_) => "ADD_USER_POINTS",
            Action::SubtractPoints(_) => "SUBTRACT_USER_POINTS",
            Action::AddBet(_) => "ADD_BET",
            Action::PlaceBet(_) => "PLACE_BET",
            Action::RemoveBet(_) => "REMOVE_BET",
            Action::CompleteBet { .. } => "COMPLETE_BET",
            Action::AddRaffleEntry => "ADD_RAFFLE_ENTRY",
            Action::AddToCart(_) => "ADD_TO_CART",
            Action::RemoveFromCart(_) => "REMOVE_FROM_CART",
            Action::ClearCart => "CLEAR_CART",
            Action::UpdateShipping(_) => "UPDATE_SHIPPING_INFO",
            Action::LoadState(_) => "LOAD_STATE",
            Action::SetState(_) => "SET_STATE",
            Action::SetLoading(_) => "SET_LOADING",
            Action::Unknown => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BetOutcome;
    use serde_json::json;

    #[test]
    fn test_parses_payload_actions() {
        let action: Action =
            serde_json::from_value(json!({"type": "ADD_USER_POINTS", "payload": 50})).unwrap();
        assert_eq!(action, Action::AddPoints(50));

        let action: Action =
            serde_json::from_value(json!({"type": "REMOVE_FROM_CART", "payload": "tee"})).unwrap();
        assert_eq!(action, Action::RemoveFromCart(ItemId::Text("tee".to_string())));
    }

    #[test]
    fn test_parses_unit_actions_without_payload() {
        let action: Action = serde_json::from_value(json!({"type": "CLEAR_CART"})).unwrap();
        assert_eq!(action, Action::ClearCart);

        let action: Action = serde_json::from_value(json!({"type": "ADD_RAFFLE_ENTRY"})).unwrap();
        assert_eq!(action, Action::AddRaffleEntry);
    }

    #[test]
    fn test_parses_complete_bet_payload() {
        let action: Action = serde_json::from_value(json!({
            "type": "COMPLETE_BET",
            "payload": {
                "betId": 17,
                "result": {"status": "won", "winnings": 150, "result": "Won +150 points"}
            }
        }))
        .unwrap();

        match action {
            Action::CompleteBet { bet_id, result } => {
                assert_eq!(bet_id, 17);
                assert_eq!(result.status, BetOutcome::Won);
                assert_eq!(result.winnings, 150);
            }
            other => panic!("Expected CompleteBet, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognised_kind_is_unknown() {
        let action = Action::from_json(json!({"type": "RESET_EVERYTHING", "payload": 1})).unwrap();
        assert_eq!(action, Action::Unknown);
        assert_eq!(action.kind(), "UNKNOWN");

        let action: Action = serde_json::from_value(json!({"type": "RESET_EVERYTHING"})).unwrap();
        assert_eq!(action, Action::Unknown);
    }

    #[test]
    fn test_from_json_rejects_malformed_known_payload() {
        assert!(Action::from_json(json!({"type": "ADD_USER_POINTS", "payload": "lots"})).is_err());
        assert!(Action::from_json(json!({"payload": 5})).is_err());
    }

    #[test]
    fn test_from_json_str_round_trip() {
        let action = Action::from_json_str(r#"{"type":"SET_LOADING","payload":false}"#).unwrap();
        assert_eq!(action, Action::SetLoading(false));
    }

    #[test]
    fn test_every_known_kind_is_listed() {
        let bet = Bet::from_spec(crate::types::BetSpec::new(1, 2), 1, chrono::Utc::now());
        let actions = [
            Action::PlaceBet(bet),
            Action::AddRaffleEntry,
            Action::UpdateShipping(ShippingInfo::default()),
            Action::LoadState(StatePatch::default()),
        ];
        for action in actions {
            assert!(KNOWN_KINDS.contains(&action.kind()));
        }
        assert!(!KNOWN_KINDS.contains(&Action::Unknown.kind()));
    }

    #[test]
    fn test_kind_matches_wire_name() {
        let actions = vec![
            Action::SetPoints(1),
            Action::SubtractPoints(1),
            Action::RemoveBet(1),
            Action::ClearCart,
            Action::SetLoading(false),
        ];
        for action in actions {
            let value = serde_json::to_value(&action).unwrap();
            assert_eq!(value["type"], action.kind());
        }
    }
}
