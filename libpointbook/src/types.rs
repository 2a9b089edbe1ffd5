//! Core domain records: bets, cart items and shipping details
//!
//! Field names serialize in camelCase so a saved snapshot keeps the flat
//! layout consumers already read (`potentialWin`, `timePlaced`, `zipCode`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bet identifier, derived from the creation timestamp in milliseconds
pub type BetId = i64;

/// Opaque consumer-supplied fields carried alongside a record
pub type Details = serde_json::Map<String, serde_json::Value>;

/// Keys owned by [`Bet`] itself; never accepted from opaque details
const RESERVED_BET_KEYS: &[&str] = &[
    "id",
    "amount",
    "potentialWin",
    "status",
    "timePlaced",
    "winnings",
    "result",
];

/// Lifecycle status of a bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Active,
    Won,
    Lost,
}

impl BetStatus {
    /// Whether the bet has been settled
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Active)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetStatus::Active => write!(f, "active"),
            BetStatus::Won => write!(f, "won"),
            BetStatus::Lost => write!(f, "lost"),
        }
    }
}

/// Terminal outcome carried by a completion result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetOutcome {
    Won,
    Lost,
}

impl From<BetOutcome> for BetStatus {
    fn from(outcome: BetOutcome) -> Self {
        match outcome {
            BetOutcome::Won => BetStatus::Won,
            BetOutcome::Lost => BetStatus::Lost,
        }
    }
}

/// What a consumer asks for when placing a bet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetSpec {
    /// Points wagered
    pub amount: i64,
    /// Points paid out if the bet is won
    pub potential_win: i64,
    /// Game, team, market and anything else the screen wants to keep
    #[serde(flatten)]
    pub details: Details,
}

impl BetSpec {
    pub fn new(amount: i64, potential_win: i64) -> Self {
        Self {
            amount,
            potential_win,
            details: Details::new(),
        }
    }

    /// Attach an opaque detail (e.g. `"game"`, `"team"`)
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// A wager, active or settled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub id: BetId,
    pub amount: i64,
    pub potential_win: i64,
    pub status: BetStatus,
    pub time_placed: DateTime<Utc>,

    /// Points credited on completion (0 for a lost bet)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winnings: Option<i64>,

    /// Human-readable settlement message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(flatten)]
    pub details: Details,
}

impl Bet {
    /// Build an active bet from a spec
    pub fn from_spec(spec: BetSpec, id: BetId, time_placed: DateTime<Utc>) -> Self {
        Self {
            id,
            amount: spec.amount,
            potential_win: spec.potential_win,
            status: BetStatus::Active,
            time_placed,
            winnings: None,
            result: None,
            details: without_reserved(spec.details),
        }
    }

    /// Merge a completion result into this bet
    pub fn complete(mut self, result: BetResult) -> Self {
        self.status = result.status.into();
        self.winnings = Some(result.winnings);
        self.result = result.result;
        self.details.extend(without_reserved(result.extra));
        self
    }

    /// Net gain if this bet is won (payout minus stake)
    pub fn net_win(&self) -> i64 {
        self.potential_win - self.amount
    }
}

/// Settlement data merged into a bet when it completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetResult {
    pub status: BetOutcome,

    /// Points credited to the balance when `status` is `won`
    #[serde(default)]
    pub winnings: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(flatten)]
    pub extra: Details,
}

impl BetResult {
    pub fn won(winnings: i64) -> Self {
        Self {
            status: BetOutcome::Won,
            winnings,
            result: None,
            extra: Details::new(),
        }
    }

    pub fn lost() -> Self {
        Self {
            status: BetOutcome::Lost,
            winnings: 0,
            result: None,
            extra: Details::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.result = Some(message.into());
        self
    }

    /// Result used by simulated settlement: a win credits the net gain
    pub fn simulated(bet: &Bet, won: bool) -> Self {
        if won {
            let net = bet.net_win();
            Self::won(net).with_message(format!("Won +{} points", net))
        } else {
            Self::lost().with_message(format!("Lost -{} points", bet.amount))
        }
    }
}

/// Identifier of a cart item; the catalogue uses both numbers and strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    Text(String),
}

impl ItemId {
    /// Numeric when the text parses as an integer, textual otherwise
    pub fn parse(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(n) => ItemId::Number(n),
            Err(_) => ItemId::Text(s.to_string()),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => write!(f, "{}", n),
            ItemId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        ItemId::Number(n)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId::Text(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId::Text(s)
    }
}

/// Merchandise entry; the store only tracks membership
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ItemId,
    #[serde(flatten)]
    pub payload: Details,
}

impl CartItem {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            payload: Details::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let key = key.into();
        if key != "id" {
            self.payload.insert(key, value.into());
        }
        self
    }
}

/// Delivery address for merchandise orders, replaced wholesale on update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShippingInfo {
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

fn without_reserved(mut details: Details) -> Details {
    for key in RESERVED_BET_KEYS {
        details.remove(*key);
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn placed_at() -> DateTime<Utc> {
        "2025-03-01T18:30:00Z".parse().unwrap()
    }

    #[test]
    fn test_bet_from_spec_is_active() {
        let spec = BetSpec::new(100, 250).with_detail("game", "Lakers vs Celtics");
        let bet = Bet::from_spec(spec, 1, placed_at());

        assert_eq!(bet.status, BetStatus::Active);
        assert_eq!(bet.amount, 100);
        assert_eq!(bet.potential_win, 250);
        assert_eq!(bet.details["game"], "Lakers vs Celtics");
        assert!(bet.winnings.is_none());
    }

    #[test]
    fn test_bet_from_spec_drops_reserved_details() {
        let spec = BetSpec::new(100, 250)
            .with_detail("status", "won")
            .with_detail("id", 99)
            .with_detail("team", "home");
        let bet = Bet::from_spec(spec, 7, placed_at());

        assert_eq!(bet.id, 7);
        assert_eq!(bet.status, BetStatus::Active);
        assert!(!bet.details.contains_key("status"));
        assert!(!bet.details.contains_key("id"));
        assert_eq!(bet.details["team"], "home");
    }

    #[test]
    fn test_bet_serializes_flat_camel_case() {
        let spec = BetSpec::new(50, 120).with_detail("game", "g-1");
        let bet = Bet::from_spec(spec, 1700000000000, placed_at());

        let value = serde_json::to_value(&bet).unwrap();
        assert_eq!(value["id"], 1700000000000i64);
        assert_eq!(value["potentialWin"], 120);
        assert_eq!(value["status"], "active");
        assert_eq!(value["game"], "g-1");
        assert!(value.get("winnings").is_none());
        assert!(value["timePlaced"].as_str().unwrap().starts_with("2025-03-01T18:30:00"));
    }

    #[test]
    fn test_bet_accepts_javascript_iso_timestamps() {
        let value = json!({
            "id": 1,
            "amount": 10,
            "potentialWin": 30,
            "status": "active",
            "timePlaced": "2025-03-01T18:30:00.000Z",
            "gameId": 12
        });
        let bet: Bet = serde_json::from_value(value).unwrap();

        assert_eq!(bet.time_placed, placed_at());
        assert_eq!(bet.details["gameId"], 12);
    }

    #[test]
    fn test_complete_merges_result() {
        let bet = Bet::from_spec(BetSpec::new(100, 250), 1, placed_at());
        let mut result = BetResult::won(150).with_message("Won +150 points");
        result.extra.insert("finalScore".to_string(), json!("102-99"));

        let done = bet.complete(result);
        assert_eq!(done.status, BetStatus::Won);
        assert_eq!(done.winnings, Some(150));
        assert_eq!(done.result.as_deref(), Some("Won +150 points"));
        assert_eq!(done.details["finalScore"], "102-99");
    }

    #[test]
    fn test_simulated_results() {
        let bet = Bet::from_spec(BetSpec::new(100, 250), 1, placed_at());

        let won = BetResult::simulated(&bet, true);
        assert_eq!(won.status, BetOutcome::Won);
        assert_eq!(won.winnings, 150);
        assert_eq!(won.result.as_deref(), Some("Won +150 points"));

        let lost = BetResult::simulated(&bet, false);
        assert_eq!(lost.status, BetOutcome::Lost);
        assert_eq!(lost.winnings, 0);
        assert_eq!(lost.result.as_deref(), Some("Lost -100 points"));
    }

    #[test]
    fn test_bet_status_terminal() {
        assert!(!BetStatus::Active.is_terminal());
        assert!(BetStatus::Won.is_terminal());
        assert!(BetStatus::Lost.is_terminal());
        assert_eq!(BetStatus::from(BetOutcome::Lost), BetStatus::Lost);
    }

    #[test]
    fn test_item_id_parse_and_wire_form() {
        assert_eq!(ItemId::parse("42"), ItemId::Number(42));
        assert_eq!(ItemId::parse("hoodie-xl"), ItemId::Text("hoodie-xl".to_string()));

        let numeric: CartItem = serde_json::from_value(json!({"id": 3, "name": "Cap"})).unwrap();
        assert_eq!(numeric.id, ItemId::Number(3));
        assert_eq!(numeric.payload["name"], "Cap");

        let textual: CartItem = serde_json::from_value(json!({"id": "tee"})).unwrap();
        assert_eq!(textual.id.to_string(), "tee");
    }

    #[test]
    fn test_cart_item_ignores_id_field() {
        let item = CartItem::new(5i64).with_field("id", 9).with_field("price", 1200);
        assert_eq!(item.id, ItemId::Number(5));
        assert!(!item.payload.contains_key("id"));
        assert_eq!(item.payload["price"], 1200);
    }

    #[test]
    fn test_shipping_info_partial_object_loads() {
        let info: ShippingInfo = serde_json::from_value(json!({"name": "Sam", "zipCode": "94110"})).unwrap();
        assert_eq!(info.name, "Sam");
        assert_eq!(info.zip_code, "94110");
        assert_eq!(info.city, "");
    }
}
