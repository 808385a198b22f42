//! Early stopping on a monitored eval metric
//!
//! Training stops once `patience` consecutive rounds fail to improve on the
//! best value seen so far. Equal values do not count as improvement, so the
//! first round reaching the best value is the one reported.

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    higher_is_better: bool,
    best_value: Option<f64>,
    best_round: usize,
    current_round: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize, higher_is_better: bool) -> Self {
        Self {
            patience,
            higher_is_better,
            best_value: None,
            best_round: 0,
            current_round: 0,
        }
    }

    /// Record the metric for the next round and report whether to stop
    pub fn should_stop(&mut self, value: f64) -> bool {
        let improved = match self.best_value {
            None => !value.is_nan(),
            Some(best) if self.higher_is_better => value > best,
            Some(best) => value < best,
        };

        if improved {
            self.best_value = Some(value);
            self.best_round = self.current_round;
        }
        self.current_round += 1;

        self.rounds_without_improvement() >= self.patience
    }

    /// Rounds recorded since the best one
    pub fn rounds_without_improvement(&self) -> usize {
        match self.best_value {
            Some(_) => self.current_round - self.best_round - 1,
            None => self.current_round,
        }
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }

    pub fn best_round(&self) -> Option<usize> {
        self.best_value.map(|_| self.best_round)
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }
}
