// Bulk fixture import from colon-separated text lines
//
// sport:status:home:away:homeScore:awayScore:homeOdds[:drawOdds:awayOdds:totalLine:overOdds]:minute
//
// foot / foottai lines with 11+ fields carry draw, away and totals odds.
// bask / ten lines with 9+ fields carry away odds at position 7.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use crate::ledger::models::{Fixture, FixtureStatus, NewFixture};
use crate::ledger::money::Odds;

/// Under odds are derived from over odds at this ratio
const UNDER_ODDS_RATIO: Decimal = Decimal::from_parts(9, 0, 0, false, 1);

const MIN_FIELDS: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct SkippedLine {
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub created: Vec<Fixture>,
    pub skipped: Vec<SkippedLine>,
}

/// Sport and default league for a sport code
fn sport_for(code: &str) -> (String, String) {
    match code {
        "foot" => ("football".into(), "Premier League".into()),
        "foottai" => ("football".into(), "Thai League 1".into()),
        "bask" => ("basketball".into(), "NBA".into()),
        "ten" => ("tennis".into(), "ATP".into()),
        other => (other.to_string(), "Other".into()),
    }
}

fn parse_odds(field: &str, name: &str) -> Result<Odds, String> {
    let value = Decimal::from_str(field.trim()).map_err(|_| format!("{} '{}' is not a number", name, field))?;
    Odds::new(value).map_err(|e| format!("{}: {}", name, e))
}

fn parse_score(field: &str) -> Option<i32> {
    field.trim().parse::<i32>().ok().filter(|s| *s >= 0)
}

/// Parse one line into a fixture
pub fn parse_line(line: &str) -> Result<NewFixture, String> {
    let parts: Vec<&str> = line.trim().split(':').map(str::trim).collect();
    if parts.len() < MIN_FIELDS {
        return Err(format!("expected at least {} fields, got {}", MIN_FIELDS, parts.len()));
    }

    let code = parts[0];
    let (sport, league) = sport_for(code);
    let status = match parts[1] {
        "live" => FixtureStatus::Live,
        "finished" => FixtureStatus::Finished,
        _ => FixtureStatus::Scheduled,
    };

    let home_team = parts[2].to_string();
    let away_team = parts[3].to_string();
    if home_team.is_empty() || away_team.is_empty() {
        return Err("team names cannot be empty".into());
    }

    // Scores only exist once play has started
    let (home_score, away_score) = if status.allows_scores() {
        (parse_score(parts[4]), parse_score(parts[5]))
    } else {
        (None, None)
    };

    let home_odds = parse_odds(parts[6], "home odds")?;
    let current_minute = parts
        .last()
        .and_then(|m| m.parse::<i32>().ok())
        .unwrap_or(0)
        .max(0);

    let mut fixture = NewFixture {
        sport,
        league,
        home_team,
        away_team,
        start_time: Utc::now(),
        status,
        home_score,
        away_score,
        current_minute,
        home_odds: Some(home_odds),
        draw_odds: None,
        away_odds: None,
        total_line: None,
        over_odds: None,
        under_odds: None,
    };

    match code {
        "foot" | "foottai" if parts.len() >= 11 => {
            fixture.draw_odds = Some(parse_odds(parts[7], "draw odds")?);
            fixture.away_odds = Some(parse_odds(parts[8], "away odds")?);
            let line = Decimal::from_str(parts[9]).map_err(|_| format!("total line '{}' is not a number", parts[9]))?;
            if line.is_sign_negative() {
                return Err(format!("total line {} is negative", line));
            }
            fixture.total_line = Some(line);
            let over = parse_odds(parts[10], "over odds")?;
            fixture.over_odds = Some(over);
            // An over price too short to discount leaves the under side unquoted
            fixture.under_odds = Odds::new((over.value() * UNDER_ODDS_RATIO).round_dp(2)).ok();
        }
        "bask" | "ten" if parts.len() >= 9 => {
            fixture.away_odds = Some(parse_odds(parts[7], "away odds")?);
        }
        _ => {}
    }

    fixture.validate().map_err(|e| e.to_string())?;
    Ok(fixture)
}

/// Parse every non-blank line; bad lines are reported, not fatal
pub fn parse_batch(text: &str) -> (Vec<NewFixture>, Vec<SkippedLine>) {
    let mut fixtures = Vec::new();
    let mut skipped = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(fixture) => fixtures.push(fixture),
            Err(reason) => skipped.push(SkippedLine {
                line_number: index + 1,
                line: line.to_string(),
                reason,
            }),
        }
    }

    (fixtures, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_thai_football_full_line() {
        let fixture = parse_line("foottai:live:Buriram:Port FC:1:0:1.85:3.40:4.20:2.5:1.90:67").unwrap();

        assert_eq!(fixture.sport, "football");
        assert_eq!(fixture.league, "Thai League 1");
        assert_eq!(fixture.status, FixtureStatus::Live);
        assert_eq!(fixture.home_score, Some(1));
        assert_eq!(fixture.away_score, Some(0));
        assert_eq!(fixture.current_minute, 67);
        assert_eq!(fixture.home_odds.unwrap().value(), dec!(1.85));
        assert_eq!(fixture.draw_odds.unwrap().value(), dec!(3.4));
        assert_eq!(fixture.total_line, Some(dec!(2.5)));
        assert_eq!(fixture.under_odds.unwrap().value(), dec!(1.71));
    }

    #[test]
    fn test_scheduled_line_drops_scores() {
        let fixture = parse_line("foot:upcoming:Arsenal:Chelsea:2:1:2.10:3.30:3.60:2.5:1.95:0").unwrap();
        assert_eq!(fixture.status, FixtureStatus::Scheduled);
        assert_eq!(fixture.home_score, None);
        assert_eq!(fixture.away_score, None);
        assert_eq!(fixture.league, "Premier League");
    }

    #[test]
    fn test_basketball_line() {
        let fixture = parse_line("bask:live:Lakers:Celtics:88:85:1.75:2.05:38").unwrap();
        assert_eq!(fixture.sport, "basketball");
        assert_eq!(fixture.away_odds.unwrap().value(), dec!(2.05));
        assert_eq!(fixture.draw_odds, None);
        assert_eq!(fixture.current_minute, 38);
    }

    #[test]
    fn test_zero_score_is_kept() {
        let fixture = parse_line("ten:live:Alcaraz:Sinner:0:1:1.60:2.30:5").unwrap();
        assert_eq!(fixture.home_score, Some(0));
    }

    #[test]
    fn test_short_price_leaves_under_unquoted() {
        let fixture = parse_line("foot:live:A:B:0:0:1.5:3:4:2.5:1.10:12").unwrap();
        assert_eq!(fixture.under_odds, None);
        assert!(fixture.over_odds.is_some());
    }

    #[test]
    fn test_batch_reports_bad_lines() {
        let text = "foot:live:A:B:0:0:1.9:3.1:4.0:2.5:1.8:10\n\
                    \n\
                    garbage line\n\
                    foot:live:A:B:0:0:abc:3.1:4.0:2.5:1.8:10\n\
                    ten:scheduled:X:Y:::1.40:2.80:0";
        let (fixtures, skipped) = parse_batch(text);

        assert_eq!(fixtures.len(), 2);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].line_number, 3);
        assert!(skipped[1].reason.contains("home odds"));
    }
}
