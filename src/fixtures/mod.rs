// Admin-managed fixtures: listing, editing and bulk import
pub mod import;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::ledger::models::{Fixture, FixtureFilter, FixturePatch, NewFixture};
use crate::ledger::money::Odds;
use crate::ledger::store::LedgerStore;
use import::ImportReport;

const DEFAULT_LIST_LIMIT: i64 = 100;

/// Query string accepted by the public fixture listing
#[derive(Debug, Default, Deserialize)]
pub struct FixtureQuery {
    pub sport: Option<String>,
    pub league: Option<String>,
    pub limit: Option<i64>,
}

/// Odds-only update from the admin console
#[derive(Debug, Default, Deserialize)]
pub struct OddsPatch {
    pub home_odds: Option<Odds>,
    pub draw_odds: Option<Odds>,
    pub away_odds: Option<Odds>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub total_line: Option<Decimal>,
    pub over_odds: Option<Odds>,
    pub under_odds: Option<Odds>,
}

impl From<OddsPatch> for FixturePatch {
    fn from(odds: OddsPatch) -> Self {
        FixturePatch {
            home_odds: odds.home_odds,
            draw_odds: odds.draw_odds,
            away_odds: odds.away_odds,
            total_line: odds.total_line,
            over_odds: odds.over_odds,
            under_odds: odds.under_odds,
            ..Default::default()
        }
    }
}

/// `league=thai` matches Thai competitions in English or Thai script
pub fn is_thai_league(league: &str) -> bool {
    let league = league.to_lowercase();
    league.contains("thai") || league.contains("ไทย")
}

fn league_matches(fixture: &Fixture, wanted: &str) -> bool {
    if wanted.eq_ignore_ascii_case("thai") {
        is_thai_league(&fixture.league)
    } else {
        fixture.league.to_lowercase().contains(&wanted.to_lowercase())
    }
}

pub struct FixtureService {
    store: Arc<dyn LedgerStore>,
}

impl FixtureService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, query: &FixtureQuery) -> AppResult<Vec<Fixture>> {
        let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500);
        let filter = FixtureFilter {
            sport: query.sport.clone(),
            live_only: false,
            // League filtering happens after the fetch
            limit: if query.league.is_some() { None } else { Some(limit) },
        };

        let mut fixtures = self.store.list_fixtures(&filter).await?;
        if let Some(league) = &query.league {
            fixtures.retain(|f| league_matches(f, league));
            fixtures.truncate(limit as usize);
        }
        Ok(fixtures)
    }

    pub async fn live(&self) -> AppResult<Vec<Fixture>> {
        self.store
            .list_fixtures(&FixtureFilter {
                live_only: true,
                ..Default::default()
            })
            .await
    }

    pub async fn create(&self, fixture: NewFixture) -> AppResult<Fixture> {
        let fixture = self.store.create_fixture(fixture).await?;
        info!("🏟️ Fixture created: {} ({})", fixture.matchup(), fixture.id);
        Ok(fixture)
    }

    pub async fn update(&self, id: Uuid, patch: &FixturePatch) -> AppResult<Fixture> {
        let fixture = self.store.update_fixture(id, patch).await?;
        info!(
            "🏟️ Fixture {} updated: {} {:?}-{:?}",
            id,
            fixture.status.as_str(),
            fixture.home_score,
            fixture.away_score
        );
        Ok(fixture)
    }

    pub async fn update_odds(&self, id: Uuid, odds: OddsPatch) -> AppResult<Fixture> {
        self.update(id, &odds.into()).await
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.store.delete_fixture(id).await?;
        info!("🗑️ Fixture {} deleted", id);
        Ok(())
    }

    /// Create fixtures from bulk text. Lines that fail to parse or store are skipped.
    pub async fn import(&self, text: &str) -> AppResult<ImportReport> {
        let (parsed, mut skipped) = import::parse_batch(text);
        let mut created = Vec::with_capacity(parsed.len());

        for fixture in parsed {
            let matchup = format!("{} vs {}", fixture.home_team, fixture.away_team);
            match self.store.create_fixture(fixture).await {
                Ok(fixture) => created.push(fixture),
                Err(e) => {
                    warn!("⚠️ Import of {} failed: {}", matchup, e);
                    skipped.push(import::SkippedLine {
                        line_number: 0,
                        line: matchup,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for line in &skipped {
            warn!("⚠️ Import skipped line {}: {}", line.line_number, line.reason);
        }
        info!("📥 Imported {} fixtures ({} skipped)", created.len(), skipped.len());

        Ok(ImportReport { created, skipped })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::FixtureStatus;
    use crate::ledger::MemoryLedger;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn new_fixture(league: &str, status: FixtureStatus) -> NewFixture {
        NewFixture {
            sport: "football".into(),
            league: league.into(),
            home_team: "Home".into(),
            away_team: "Away".into(),
            start_time: Utc::now(),
            status,
            home_score: None,
            away_score: None,
            current_minute: 0,
            home_odds: None,
            draw_odds: None,
            away_odds: None,
            total_line: None,
            over_odds: None,
            under_odds: None,
        }
    }

    #[test]
    fn test_thai_league_matching() {
        assert!(is_thai_league("Thai League 1"));
        assert!(is_thai_league("THAILAND FA Cup"));
        assert!(is_thai_league("ไทยลีก"));
        assert!(!is_thai_league("Premier League"));
    }

    #[tokio::test]
    async fn test_list_with_thai_filter() {
        let service = FixtureService::new(Arc::new(MemoryLedger::new()));
        service.create(new_fixture("Thai League 1", FixtureStatus::Scheduled)).await.unwrap();
        service.create(new_fixture("ไทยลีก 2", FixtureStatus::Scheduled)).await.unwrap();
        service.create(new_fixture("Premier League", FixtureStatus::Scheduled)).await.unwrap();

        let thai = service
            .list(&FixtureQuery {
                league: Some("thai".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(thai.len(), 2);

        let all = service.list(&FixtureQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_live_listing() {
        let service = FixtureService::new(Arc::new(MemoryLedger::new()));
        service.create(new_fixture("Thai League 1", FixtureStatus::Live)).await.unwrap();
        service.create(new_fixture("Thai League 1", FixtureStatus::Scheduled)).await.unwrap();

        let live = service.live().await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].status, FixtureStatus::Live);
    }

    #[tokio::test]
    async fn test_update_odds_leaves_scores() {
        let service = FixtureService::new(Arc::new(MemoryLedger::new()));
        let mut fixture = new_fixture("Thai League 1", FixtureStatus::Live);
        fixture.home_score = Some(1);
        fixture.away_score = Some(0);
        let fixture = service.create(fixture).await.unwrap();

        let updated = service
            .update_odds(
                fixture.id,
                OddsPatch {
                    home_odds: Some(Odds::new(dec!(1.45)).unwrap()),
                    total_line: Some(dec!(3.5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.home_odds.unwrap().value(), dec!(1.45));
        assert_eq!(updated.total_line, Some(dec!(3.5)));
        assert_eq!(updated.home_score, Some(1));
    }

    #[tokio::test]
    async fn test_import_creates_fixtures() {
        let service = FixtureService::new(Arc::new(MemoryLedger::new()));
        let report = service
            .import("foottai:live:Buriram:Port FC:1:0:1.85:3.40:4.20:2.5:1.90:67\nbad")
            .await
            .unwrap();

        assert_eq!(report.created.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(service.live().await.unwrap().len(), 1);
    }
}
