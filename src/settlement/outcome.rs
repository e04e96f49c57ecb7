// Market outcome rules for a finalized score
use rust_decimal::Decimal;

use crate::error::SettlementError;
use crate::ledger::models::{BetStatus, Market, DEFAULT_TOTAL_LINE};

/// Over/under threshold: the line captured on the bet, else the fixture's
/// current line, else 2.5
pub fn resolve_line(bet_line: Option<Decimal>, fixture_line: Option<Decimal>) -> Decimal {
    bet_line.or(fixture_line).unwrap_or(DEFAULT_TOTAL_LINE)
}

/// Decide won/lost for a market given the final score.
///
/// Markets outside home/draw/away/over/under are not guessed at and come
/// back as `UnresolvableMarket`.
pub fn evaluate(market: &Market, line: Decimal, home: i32, away: i32) -> Result<BetStatus, SettlementError> {
    if home < 0 || away < 0 {
        return Err(SettlementError::MalformedScore { home, away });
    }

    let won = match market {
        Market::Home => home > away,
        Market::Draw => home == away,
        Market::Away => away > home,
        Market::Over | Market::Under => {
            if line.is_sign_negative() {
                return Err(SettlementError::InvalidLine(line.to_string()));
            }
            let total = Decimal::from(home) + Decimal::from(away);
            if *market == Market::Over {
                total > line
            } else {
                total < line
            }
        }
        Market::Other(text) => return Err(SettlementError::UnresolvableMarket(text.clone())),
    };

    Ok(if won { BetStatus::Won } else { BetStatus::Lost })
}
