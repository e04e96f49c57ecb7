use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::{postgres::PgRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::money::{Money, Odds};
use crate::error::{AppError, AppResult};

/// Over/under threshold used when neither the bet nor the fixture carries one
pub const DEFAULT_TOTAL_LINE: Decimal = Decimal::from_parts(25, 0, 0, false, 1);

// ========== ACCOUNTS ==========

/// Bettor account
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Public 10-digit account number shown to the player
    pub account_id: String,
    pub balance: Money,
    pub bonus_balance: Money,
    pub total_bonus_received: Money,
    pub has_claimed_welcome_bonus: bool,
    pub language: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            account_id: row.try_get("account_id")?,
            balance: Money::new(row.try_get("balance")?),
            bonus_balance: Money::new(row.try_get("bonus_balance")?),
            total_bonus_received: Money::new(row.try_get("total_bonus_received")?),
            has_claimed_welcome_bonus: row.try_get("has_claimed_welcome_bonus")?,
            language: row.try_get("language")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub account_id: String,
    pub language: String,
}

/// Privileged role that can be granted to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            other => Err(AppError::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// Auditable privilege grant. A role is held while an unrevoked grant exists.
#[derive(Debug, Clone, Serialize)]
pub struct PrivilegeGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    /// None only for the start-up bootstrap grant
    pub granted_by: Option<Uuid>,
    pub reason: String,
    pub granted_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<Uuid>,
}

impl PrivilegeGrant {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        let role: String = row.try_get("role")?;
        Ok(PrivilegeGrant {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            role: role.parse()?,
            granted_by: row.try_get("granted_by")?,
            reason: row.try_get("reason")?,
            granted_at: row.try_get("granted_at")?,
            revoked_at: row.try_get("revoked_at")?,
            revoked_by: row.try_get("revoked_by")?,
        })
    }
}

// ========== FIXTURES ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureStatus {
    Scheduled,
    Live,
    Finished,
}

impl FixtureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureStatus::Scheduled => "scheduled",
            FixtureStatus::Live => "live",
            FixtureStatus::Finished => "finished",
        }
    }

    /// Scores exist only once play has started
    pub fn allows_scores(&self) -> bool {
        matches!(self, FixtureStatus::Live | FixtureStatus::Finished)
    }
}

impl FromStr for FixtureStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(FixtureStatus::Scheduled),
            "live" => Ok(FixtureStatus::Live),
            "finished" => Ok(FixtureStatus::Finished),
            other => Err(AppError::InvalidInput(format!("Unknown fixture status: {}", other))),
        }
    }
}

/// Trackable sporting event with its market lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub id: Uuid,
    pub sport: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub status: FixtureStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub current_minute: i32,
    pub home_odds: Option<Odds>,
    pub draw_odds: Option<Odds>,
    pub away_odds: Option<Odds>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub total_line: Option<Decimal>,
    pub over_odds: Option<Odds>,
    pub under_odds: Option<Odds>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fixture {
    /// Finished with both scores recorded
    pub fn is_finalized(&self) -> bool {
        self.status == FixtureStatus::Finished && self.home_score.is_some() && self.away_score.is_some()
    }

    pub fn is_open_for_betting(&self) -> bool {
        self.status != FixtureStatus::Finished
    }

    /// Quoted odds for one of the fixture markets
    pub fn odds_for(&self, market: &Market) -> Option<Odds> {
        match market {
            Market::Home => self.home_odds,
            Market::Draw => self.draw_odds,
            Market::Away => self.away_odds,
            Market::Over => self.over_odds,
            Market::Under => self.under_odds,
            Market::Other(_) => None,
        }
    }

    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(Fixture {
            id: row.try_get("id")?,
            sport: row.try_get("sport")?,
            league: row.try_get("league")?,
            home_team: row.try_get("home_team")?,
            away_team: row.try_get("away_team")?,
            start_time: row.try_get("start_time")?,
            status: status.parse()?,
            home_score: row.try_get("home_score")?,
            away_score: row.try_get("away_score")?,
            current_minute: row.try_get("current_minute")?,
            home_odds: odds_column(row, "home_odds")?,
            draw_odds: odds_column(row, "draw_odds")?,
            away_odds: odds_column(row, "away_odds")?,
            total_line: row.try_get("total_line")?,
            over_odds: odds_column(row, "over_odds")?,
            under_odds: odds_column(row, "under_odds")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn odds_column(row: &PgRow, column: &str) -> AppResult<Option<Odds>> {
    let value: Option<Decimal> = row.try_get(column)?;
    value.map(Odds::new).transpose()
}

/// Scores may only be present once a fixture is live or finished
pub fn validate_scores(
    status: FixtureStatus,
    home_score: Option<i32>,
    away_score: Option<i32>,
) -> AppResult<()> {
    if !status.allows_scores() && (home_score.is_some() || away_score.is_some()) {
        return Err(AppError::InvalidInput(format!(
            "Scores cannot be set while fixture is {}",
            status.as_str()
        )));
    }
    if home_score.map_or(false, |s| s < 0) || away_score.map_or(false, |s| s < 0) {
        return Err(AppError::InvalidInput("Scores cannot be negative".to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFixture {
    pub sport: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    #[serde(default = "default_fixture_status")]
    pub status: FixtureStatus,
    #[serde(default)]
    pub home_score: Option<i32>,
    #[serde(default)]
    pub away_score: Option<i32>,
    #[serde(default)]
    pub current_minute: i32,
    #[serde(default)]
    pub home_odds: Option<Odds>,
    #[serde(default)]
    pub draw_odds: Option<Odds>,
    #[serde(default)]
    pub away_odds: Option<Odds>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub total_line: Option<Decimal>,
    #[serde(default)]
    pub over_odds: Option<Odds>,
    #[serde(default)]
    pub under_odds: Option<Odds>,
}

fn default_fixture_status() -> FixtureStatus {
    FixtureStatus::Scheduled
}

impl NewFixture {
    pub fn validate(&self) -> AppResult<()> {
        if self.home_team.trim().is_empty() || self.away_team.trim().is_empty() {
            return Err(AppError::InvalidInput("Both teams are required".to_string()));
        }
        validate_scores(self.status, self.home_score, self.away_score)
    }
}

/// Partial fixture update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixturePatch {
    pub status: Option<FixtureStatus>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub current_minute: Option<i32>,
    pub home_odds: Option<Odds>,
    pub draw_odds: Option<Odds>,
    pub away_odds: Option<Odds>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub total_line: Option<Decimal>,
    pub over_odds: Option<Odds>,
    pub under_odds: Option<Odds>,
    pub league: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

impl FixturePatch {
    /// Apply onto a fixture, enforcing the score/status invariant on the result
    pub fn apply_to(&self, fixture: &mut Fixture) -> AppResult<()> {
        let status = self.status.unwrap_or(fixture.status);
        let home_score = self.home_score.or(fixture.home_score);
        let away_score = self.away_score.or(fixture.away_score);
        validate_scores(status, home_score, away_score)?;

        fixture.status = status;
        fixture.home_score = home_score;
        fixture.away_score = away_score;
        if let Some(minute) = self.current_minute {
            fixture.current_minute = minute;
        }
        fixture.home_odds = self.home_odds.or(fixture.home_odds);
        fixture.draw_odds = self.draw_odds.or(fixture.draw_odds);
        fixture.away_odds = self.away_odds.or(fixture.away_odds);
        fixture.total_line = self.total_line.or(fixture.total_line);
        fixture.over_odds = self.over_odds.or(fixture.over_odds);
        fixture.under_odds = self.under_odds.or(fixture.under_odds);
        if let Some(league) = &self.league {
            fixture.league = league.clone();
        }
        if let Some(start_time) = self.start_time {
            fixture.start_time = start_time;
        }
        fixture.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureFilter {
    pub sport: Option<String>,
    pub live_only: bool,
    pub limit: Option<i64>,
}

// ========== WAGERS ==========

/// Market selection. `Other` carries free text entered by an admin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Market {
    Home,
    Draw,
    Away,
    Over,
    Under,
    Other(String),
}

impl Market {
    pub fn as_str(&self) -> &str {
        match self {
            Market::Home => "home",
            Market::Draw => "draw",
            Market::Away => "away",
            Market::Over => "over",
            Market::Under => "under",
            Market::Other(text) => text.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "home" => Market::Home,
            "draw" => Market::Draw,
            "away" => Market::Away,
            "over" => Market::Over,
            "under" => Market::Under,
            _ => Market::Other(value.trim().to_string()),
        }
    }

    pub fn is_totals(&self) -> bool {
        matches!(self, Market::Over | Market::Under)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Market {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Market {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        if value.trim().is_empty() {
            return Err(serde::de::Error::custom("market cannot be empty"));
        }
        Ok(Market::parse(&value))
    }
}

/// Wager lifecycle: pending → exactly one of won/lost/void, never reverted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Void => "void",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            "void" => Ok(BetStatus::Void),
            other => Err(AppError::InvalidInput(format!("Unknown bet status: {}", other))),
        }
    }
}

/// Inline match description for admin-entered bets without a fixture record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMatch {
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub home_score: Option<i32>,
    #[serde(default)]
    pub away_score: Option<i32>,
}

impl CustomMatch {
    pub fn is_finalized(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub fixture_id: Option<Uuid>,
    pub custom_match: Option<CustomMatch>,
    pub market: Market,
    /// Over/under line captured when the bet was placed
    #[serde(with = "rust_decimal::serde::str_option")]
    pub line: Option<Decimal>,
    pub stake: Money,
    pub odds: Odds,
    /// stake × odds fixed at placement; credited verbatim on a win
    pub potential_win: Money,
    pub status: BetStatus,
    /// Admin who entered the bet on the user's behalf
    pub placed_by: Option<Uuid>,
    /// Set when automatic settlement could not resolve the bet
    pub review_note: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        let market: String = row.try_get("market")?;
        let status: String = row.try_get("status")?;
        let custom_home: Option<String> = row.try_get("custom_home_team")?;
        let custom_away: Option<String> = row.try_get("custom_away_team")?;

        let custom_match = match (custom_home, custom_away) {
            (Some(home_team), Some(away_team)) => Some(CustomMatch {
                home_team,
                away_team,
                league: row.try_get("custom_league")?,
                home_score: row.try_get("custom_home_score")?,
                away_score: row.try_get("custom_away_score")?,
            }),
            _ => None,
        };

        Ok(Bet {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            fixture_id: row.try_get("fixture_id")?,
            custom_match,
            market: Market::parse(&market),
            line: row.try_get("line")?,
            stake: Money::new(row.try_get("stake")?),
            odds: Odds::new(row.try_get("odds")?)?,
            potential_win: Money::new(row.try_get("potential_win")?),
            status: status.parse()?,
            placed_by: row.try_get("placed_by")?,
            review_note: row.try_get("review_note")?,
            placed_at: row.try_get("placed_at")?,
            settled_at: row.try_get("settled_at")?,
        })
    }

    pub fn matchup(&self, fixture: Option<&Fixture>) -> String {
        match (&self.custom_match, fixture) {
            (Some(custom), _) => format!("{} vs {}", custom.home_team, custom.away_team),
            (None, Some(fixture)) => fixture.matchup(),
            _ => String::new(),
        }
    }
}

/// Validated wager ready to be persisted
#[derive(Debug, Clone)]
pub struct NewBet {
    pub user_id: Uuid,
    pub fixture_id: Option<Uuid>,
    pub custom_match: Option<CustomMatch>,
    pub market: Market,
    pub line: Option<Decimal>,
    pub stake: Money,
    pub odds: Odds,
    pub potential_win: Money,
    pub placed_by: Option<Uuid>,
}

impl NewBet {
    /// Computes the potential win once; it is never recomputed afterwards
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        fixture_id: Option<Uuid>,
        custom_match: Option<CustomMatch>,
        market: Market,
        line: Option<Decimal>,
        stake: Money,
        odds: Odds,
        placed_by: Option<Uuid>,
    ) -> AppResult<Self> {
        if !stake.is_positive() {
            return Err(crate::error::BalanceError::NonPositiveAmount(stake.to_string()).into());
        }
        if fixture_id.is_none() && custom_match.is_none() {
            return Err(crate::error::BetError::MissingTarget.into());
        }
        let potential_win = odds.potential_win(stake)?;
        Ok(Self {
            user_id,
            fixture_id,
            custom_match,
            market,
            line,
            stake,
            odds,
            potential_win,
            placed_by,
        })
    }

    pub fn into_bet(self, id: Uuid, placed_at: DateTime<Utc>) -> Bet {
        Bet {
            id,
            user_id: self.user_id,
            fixture_id: self.fixture_id,
            custom_match: self.custom_match,
            market: self.market,
            line: self.line,
            stake: self.stake,
            odds: self.odds,
            potential_win: self.potential_win,
            status: BetStatus::Pending,
            placed_by: self.placed_by,
            review_note: None,
            placed_at,
            settled_at: None,
        }
    }
}

/// Bet joined with the fixture it references, if any
#[derive(Debug, Clone, Serialize)]
pub struct BetWithFixture {
    #[serde(flatten)]
    pub bet: Bet,
    pub fixture: Option<Fixture>,
}

/// Who drove a settlement transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementSource {
    Reconciler,
    Admin(Uuid),
}

impl SettlementSource {
    pub fn actor(&self) -> Option<Uuid> {
        match self {
            SettlementSource::Reconciler => None,
            SettlementSource::Admin(id) => Some(*id),
        }
    }
}

/// Atomic pending → terminal transition with its balance effect
#[derive(Debug, Clone)]
pub struct SettleCommand {
    pub bet_id: Uuid,
    pub status: BetStatus,
    pub credit: Option<Money>,
    pub source: SettlementSource,
}

impl SettleCommand {
    /// Derives the credit from the bet: potential win on `won`, stake on `void`.
    /// Admin-entered bets never debited a stake, so voiding them credits nothing.
    pub fn for_bet(bet: &Bet, status: BetStatus, source: SettlementSource) -> AppResult<Self> {
        let credit = match status {
            BetStatus::Won => Some(bet.potential_win),
            BetStatus::Void if bet.placed_by.is_none() => Some(bet.stake),
            BetStatus::Void => None,
            BetStatus::Lost => None,
            BetStatus::Pending => {
                return Err(crate::error::BetError::InvalidTerminalStatus(status).into())
            }
        };
        Ok(Self {
            bet_id: bet.id,
            status,
            credit,
            source,
        })
    }

    pub fn note(&self) -> String {
        match self.source {
            SettlementSource::Reconciler => format!("settled {}", self.status),
            SettlementSource::Admin(_) => format!("admin override: {}", self.status),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SettleOutcome {
    Settled { bet: Bet, new_balance: Option<Money> },
    AlreadySettled(BetStatus),
}

// ========== FUNDING ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Confirmed => "confirmed",
            DepositStatus::Rejected => "rejected",
        }
    }

    /// Only pending deposits can be reviewed
    pub fn can_transition_to(&self, to: DepositStatus) -> bool {
        *self == DepositStatus::Pending && to != DepositStatus::Pending
    }
}

impl FromStr for DepositStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DepositStatus::Pending),
            "confirmed" => Ok(DepositStatus::Confirmed),
            "rejected" => Ok(DepositStatus::Rejected),
            other => Err(AppError::InvalidInput(format!("Unknown deposit status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Money,
    pub method: String,
    pub tx_id: Option<String>,
    pub status: DepositStatus,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(Deposit {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            amount: Money::new(row.try_get("amount")?),
            method: row.try_get("method")?,
            tx_id: row.try_get("tx_id")?,
            status: status.parse()?,
            reviewed_by: row.try_get("reviewed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub user_id: Uuid,
    pub amount: Money,
    pub method: String,
    pub tx_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processed => "processed",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn can_transition_to(&self, to: WithdrawalStatus) -> bool {
        *self == WithdrawalStatus::Pending && to != WithdrawalStatus::Pending
    }
}

impl FromStr for WithdrawalStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WithdrawalStatus::Pending),
            "processed" => Ok(WithdrawalStatus::Processed),
            "rejected" => Ok(WithdrawalStatus::Rejected),
            other => Err(AppError::InvalidInput(format!("Unknown withdrawal status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Money,
    pub method: String,
    pub address: Option<String>,
    pub status: WithdrawalStatus,
    pub admin_note: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(Withdrawal {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            amount: Money::new(row.try_get("amount")?),
            method: row.try_get("method")?,
            address: row.try_get("address")?,
            status: status.parse()?,
            admin_note: row.try_get("admin_note")?,
            reviewed_by: row.try_get("reviewed_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub user_id: Uuid,
    pub amount: Money,
    pub method: String,
    pub address: Option<String>,
}

// ========== BALANCE LEDGER ==========

/// Every balance mutation is attributed to exactly one cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationCause {
    BetPlacement,
    BetSettlement,
    DepositConfirmation,
    WithdrawalProcessing,
    AdminAdjustment,
    WelcomeBonus,
}

impl MutationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationCause::BetPlacement => "bet_placement",
            MutationCause::BetSettlement => "bet_settlement",
            MutationCause::DepositConfirmation => "deposit_confirmation",
            MutationCause::WithdrawalProcessing => "withdrawal_processing",
            MutationCause::AdminAdjustment => "admin_adjustment",
            MutationCause::WelcomeBonus => "welcome_bonus",
        }
    }
}

impl FromStr for MutationCause {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet_placement" => Ok(MutationCause::BetPlacement),
            "bet_settlement" => Ok(MutationCause::BetSettlement),
            "deposit_confirmation" => Ok(MutationCause::DepositConfirmation),
            "withdrawal_processing" => Ok(MutationCause::WithdrawalProcessing),
            "admin_adjustment" => Ok(MutationCause::AdminAdjustment),
            "welcome_bonus" => Ok(MutationCause::WelcomeBonus),
            other => Err(AppError::InvalidInput(format!("Unknown mutation cause: {}", other))),
        }
    }
}

/// Requested balance change. `(cause, reference_id)` identifies the triggering event.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub user_id: Uuid,
    pub delta: Money,
    pub cause: MutationCause,
    pub reference_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
}

/// Permanent record of one committed balance mutation
#[derive(Debug, Clone, Serialize)]
pub struct BalanceMutation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub delta: Money,
    pub balance_after: Money,
    pub cause: MutationCause,
    pub reference_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BalanceMutation {
    pub fn from_row(row: &PgRow) -> AppResult<Self> {
        let cause: String = row.try_get("cause")?;
        Ok(BalanceMutation {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            delta: Money::new(row.try_get("delta")?),
            balance_after: Money::new(row.try_get("balance_after")?),
            cause: cause.parse()?,
            reference_id: row.try_get("reference_id")?,
            actor_id: row.try_get("actor_id")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fixture(status: FixtureStatus, home: Option<i32>, away: Option<i32>) -> Fixture {
        Fixture {
            id: Uuid::new_v4(),
            sport: "football".into(),
            league: "Thai League 1".into(),
            home_team: "Buriram".into(),
            away_team: "Port FC".into(),
            start_time: Utc::now(),
            status,
            home_score: home,
            away_score: away,
            current_minute: 0,
            home_odds: Some(Odds::new(dec!(1.9)).unwrap()),
            draw_odds: Some(Odds::new(dec!(3.2)).unwrap()),
            away_odds: None,
            total_line: Some(dec!(2.5)),
            over_odds: None,
            under_odds: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_total_line() {
        assert_eq!(DEFAULT_TOTAL_LINE, dec!(2.5));
    }

    #[test]
    fn test_fixture_finalized_requires_status_and_scores() {
        assert!(fixture(FixtureStatus::Finished, Some(2), Some(1)).is_finalized());
        assert!(!fixture(FixtureStatus::Live, Some(2), Some(1)).is_finalized());
        assert!(!fixture(FixtureStatus::Finished, None, Some(1)).is_finalized());
    }

    #[test]
    fn test_scores_rejected_before_kickoff() {
        assert!(validate_scores(FixtureStatus::Scheduled, Some(0), None).is_err());
        assert!(validate_scores(FixtureStatus::Scheduled, None, None).is_ok());
        assert!(validate_scores(FixtureStatus::Live, Some(1), Some(0)).is_ok());
        assert!(validate_scores(FixtureStatus::Finished, Some(-1), Some(0)).is_err());
    }

    #[test]
    fn test_patch_keeps_invariant() {
        let mut f = fixture(FixtureStatus::Scheduled, None, None);
        let bad = FixturePatch {
            home_score: Some(1),
            ..Default::default()
        };
        assert!(bad.apply_to(&mut f).is_err());
        assert_eq!(f.home_score, None);

        let good = FixturePatch {
            status: Some(FixtureStatus::Finished),
            home_score: Some(1),
            away_score: Some(1),
            ..Default::default()
        };
        good.apply_to(&mut f).unwrap();
        assert!(f.is_finalized());
    }

    #[test]
    fn test_market_parse_round_trips_free_text() {
        assert_eq!(Market::parse("HOME"), Market::Home);
        assert_eq!(Market::parse(" under "), Market::Under);
        assert_eq!(Market::parse("Buriram -1.5"), Market::Other("Buriram -1.5".into()));
        assert_eq!(Market::Other("first goal".into()).as_str(), "first goal");
    }

    #[test]
    fn test_fixture_odds_lookup() {
        let f = fixture(FixtureStatus::Scheduled, None, None);
        assert_eq!(f.odds_for(&Market::Home), Some(Odds::new(dec!(1.9)).unwrap()));
        assert_eq!(f.odds_for(&Market::Away), None);
        assert_eq!(f.odds_for(&Market::Other("x".into())), None);
    }

    #[test]
    fn test_new_bet_validation() {
        let odds = Odds::new(dec!(2.0)).unwrap();
        let user = Uuid::new_v4();
        assert!(NewBet::new(user, Some(Uuid::new_v4()), None, Market::Home, None, Money::ZERO, odds, None).is_err());
        assert!(NewBet::new(user, None, None, Market::Home, None, Money::from_cents(100), odds, None).is_err());

        let bet = NewBet::new(user, Some(Uuid::new_v4()), None, Market::Home, None, Money::from_cents(1050), odds, None)
            .unwrap();
        assert_eq!(bet.potential_win, Money::from_cents(2100));
    }

    #[test]
    fn test_settle_command_credit() {
        let odds = Odds::new(dec!(3)).unwrap();
        let bet = NewBet::new(Uuid::new_v4(), Some(Uuid::new_v4()), None, Market::Draw, None, Money::from_cents(500), odds, None)
            .unwrap()
            .into_bet(Uuid::new_v4(), Utc::now());

        let won = SettleCommand::for_bet(&bet, BetStatus::Won, SettlementSource::Reconciler).unwrap();
        assert_eq!(won.credit, Some(Money::from_cents(1500)));
        let void = SettleCommand::for_bet(&bet, BetStatus::Void, SettlementSource::Reconciler).unwrap();
        assert_eq!(void.credit, Some(Money::from_cents(500)));
        let lost = SettleCommand::for_bet(&bet, BetStatus::Lost, SettlementSource::Reconciler).unwrap();
        assert_eq!(lost.credit, None);
        assert!(SettleCommand::for_bet(&bet, BetStatus::Pending, SettlementSource::Reconciler).is_err());
    }

    #[test]
    fn test_admin_entered_void_has_no_credit() {
        let odds = Odds::new(dec!(3)).unwrap();
        let admin = Uuid::new_v4();
        let bet = NewBet::new(Uuid::new_v4(), Some(Uuid::new_v4()), None, Market::Draw, None, Money::from_cents(500), odds, Some(admin))
            .unwrap()
            .into_bet(Uuid::new_v4(), Utc::now());

        let void = SettleCommand::for_bet(&bet, BetStatus::Void, SettlementSource::Admin(admin)).unwrap();
        assert_eq!(void.credit, None);
        let won = SettleCommand::for_bet(&bet, BetStatus::Won, SettlementSource::Admin(admin)).unwrap();
        assert_eq!(won.credit, Some(Money::from_cents(1500)));
    }

    #[test]
    fn test_review_transitions() {
        assert!(DepositStatus::Pending.can_transition_to(DepositStatus::Confirmed));
        assert!(!DepositStatus::Confirmed.can_transition_to(DepositStatus::Rejected));
        assert!(!WithdrawalStatus::Processed.can_transition_to(WithdrawalStatus::Rejected));
        assert!(WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::Rejected));
    }
}
