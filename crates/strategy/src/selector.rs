use std::collections::HashSet;

use tracing::debug;

use common::Signal;

use crate::evaluator::Evaluation;

/// The symbol chosen to open a position on.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub signal: Signal,
}

/// Pick the highest-scoring valid signal among symbols not in `blacklist`.
///
/// Ties keep the first symbol seen; callers pass symbols in configured order.
pub fn select_candidate<'a, I>(evaluations: I, blacklist: &HashSet<String>) -> Option<Candidate>
where
    I: IntoIterator<Item = (&'a str, &'a Evaluation)>,
{
    let mut best: Option<(&'a str, &'a Signal)> = None;

    for (symbol, eval) in evaluations {
        let Some(signal) = eval.signal.as_ref() else {
            continue;
        };
        if blacklist.contains(symbol) {
            debug!(symbol = %symbol, "Skipping blacklisted symbol");
            continue;
        }
        if signal.validate().is_err() {
            continue;
        }
        match best {
            Some((_, current)) if signal.score <= current.score => {}
            _ => best = Some((symbol, signal)),
        }
    }

    best.map(|(symbol, signal)| Candidate {
        symbol: symbol.to_string(),
        signal: signal.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TradeSide;

    fn eval_with_score(score: Option<f64>) -> Evaluation {
        Evaluation {
            side: TradeSide::Long,
            signal: score.map(|score| Signal {
                side: TradeSide::Long,
                entry_price: 10.0,
                stop_loss: 9.7,
                take_profit: 10.8,
                volume: 1_000.0,
                score,
                reason: String::new(),
            }),
            reason: String::new(),
            score: score.unwrap_or(0.0),
            close: 10.0,
            snapshot: None,
        }
    }

    #[test]
    fn highest_score_wins() {
        let a = eval_with_score(Some(95.0));
        let b = eval_with_score(Some(120.0));
        let c = eval_with_score(None);
        let pick = select_candidate(
            [("AAAUSDT", &a), ("BBBUSDT", &b), ("CCCUSDT", &c)],
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(pick.symbol, "BBBUSDT");
        assert_eq!(pick.signal.score, 120.0);
    }

    #[test]
    fn ties_keep_first_seen() {
        let a = eval_with_score(Some(50.0));
        let b = eval_with_score(Some(50.0));
        let pick = select_candidate([("FIRST", &a), ("SECOND", &b)], &HashSet::new()).unwrap();
        assert_eq!(pick.symbol, "FIRST");
    }

    #[test]
    fn blacklisted_symbols_are_skipped() {
        let a = eval_with_score(Some(95.0));
        let b = eval_with_score(Some(120.0));
        let blacklist: HashSet<String> = ["BBBUSDT".to_string()].into();
        let pick = select_candidate([("AAAUSDT", &a), ("BBBUSDT", &b)], &blacklist).unwrap();
        assert_eq!(pick.symbol, "AAAUSDT");
    }

    #[test]
    fn invalid_signal_is_never_selected() {
        let mut bad = eval_with_score(Some(500.0));
        if let Some(sig) = bad.signal.as_mut() {
            sig.take_profit = f64::NAN;
        }
        let good = eval_with_score(Some(1.0));
        let pick = select_candidate([("BAD", &bad), ("GOOD", &good)], &HashSet::new()).unwrap();
        assert_eq!(pick.symbol, "GOOD");
    }

    #[test]
    fn nothing_to_pick() {
        let none = eval_with_score(None);
        assert!(select_candidate([("X", &none)], &HashSet::new()).is_none());
    }
}
