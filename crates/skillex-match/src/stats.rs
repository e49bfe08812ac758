//! Summary of a set of match outcomes.

use serde::{Deserialize, Serialize};
use skillex_core::{MatchMethod, TaxonomyMatchResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchingStats {
    pub total: usize,
    pub matched: usize,
    pub emergent: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub semantic: usize,
}

impl MatchingStats {
    pub fn from_outcomes<'a, I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a TaxonomyMatchResult>>,
    {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.record(outcome.map(|r| r.method));
        }
        stats
    }

    pub fn record(&mut self, method: Option<MatchMethod>) {
        self.total += 1;
        match method {
            None => self.emergent += 1,
            Some(m) => {
                self.matched += 1;
                match m {
                    MatchMethod::Exact => self.exact += 1,
                    MatchMethod::Fuzzy => self.fuzzy += 1,
                    MatchMethod::Semantic => self.semantic += 1,
                }
            }
        }
    }

    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }

    pub fn emergent_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.emergent as f64 / self.total as f64
        }
    }
}
