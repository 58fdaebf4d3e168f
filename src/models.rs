//! Domain records for the four list families.
//!
//! Only the fields the engine and CLI touch are modelled; everything else in
//! the payload is ignored by serde.

use crate::slot::Identified;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An open bet market offered to other users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetMarket {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub stake: Option<f64>,
    #[serde(default)]
    pub odds: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for BetMarket {
    type Id = String;

    fn identity(&self) -> String {
        self.id.clone()
    }
}

/// A scheduled sporting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: i64,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub home_team: String,
    #[serde(default)]
    pub away_team: String,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
}

impl Identified for Fixture {
    type Id = i64;

    fn identity(&self) -> i64 {
        self.id
    }
}

/// A settled or pending bet placed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRecord {
    pub id: String,
    #[serde(default)]
    pub market_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stake: Option<f64>,
    #[serde(default)]
    pub payout: Option<f64>,
    #[serde(default)]
    pub placed_at: Option<DateTime<Utc>>,
}

impl Identified for BetRecord {
    type Id = String;

    fn identity(&self) -> String {
        self.id.clone()
    }
}

/// A wallet ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for Transaction {
    type Id = String;

    fn identity(&self) -> String {
        self.id.clone()
    }
}
