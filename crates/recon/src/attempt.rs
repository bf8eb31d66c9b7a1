//! Ordered fallback chains.
//!
//! Header, name-column and amount-column resolution all share the same
//! shape: try strategies in order, keep the first answer that clears its
//! confidence floor, remember what was tried.

/// Minimum confidence a step's answer must exceed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Floor {
    /// Any answer is accepted
    None,
    /// Confidence must be strictly greater than the value
    Above(f64),
}

impl Floor {
    pub fn admits(&self, confidence: f64) -> bool {
        match self {
            Floor::None => true,
            Floor::Above(min) => confidence > *min,
        }
    }
}

/// One strategy's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt<T, S> {
    pub value: T,
    pub confidence: f64,
    pub source: S,
}

impl<T, S> Attempt<T, S> {
    pub fn new(value: T, confidence: f64, source: S) -> Self {
        Self {
            value,
            confidence,
            source,
        }
    }
}

type StepFn<'a, T, S> = Box<dyn FnOnce() -> Option<Attempt<T, S>> + 'a>;

struct Step<'a, T, S> {
    label: &'static str,
    floor: Floor,
    run: StepFn<'a, T, S>,
}

/// Result of running a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome<T, S> {
    pub winner: Option<Attempt<T, S>>,
    /// Labels of every step that ran, in order
    pub tried: Vec<String>,
}

pub struct AttemptChain<'a, T, S> {
    steps: Vec<Step<'a, T, S>>,
}

impl<'a, T, S> Default for AttemptChain<'a, T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T, S> AttemptChain<'a, T, S> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn step(
        mut self,
        label: &'static str,
        floor: Floor,
        run: impl FnOnce() -> Option<Attempt<T, S>> + 'a,
    ) -> Self {
        self.steps.push(Step {
            label,
            floor,
            run: Box::new(run),
        });
        self
    }

    /// Run steps until one answers above its floor. Later steps never run.
    pub fn run(self) -> ChainOutcome<T, S> {
        let mut tried = Vec::new();
        for step in self.steps {
            tried.push(step.label.to_string());
            match (step.run)() {
                Some(attempt) if step.floor.admits(attempt.confidence) => {
                    log::debug!(
                        "strategy '{}' accepted (confidence {:.2})",
                        step.label,
                        attempt.confidence
                    );
                    return ChainOutcome {
                        winner: Some(attempt),
                        tried,
                    };
                }
                Some(attempt) => {
                    log::debug!(
                        "strategy '{}' below floor {:?} (confidence {:.2})",
                        step.label,
                        step.floor,
                        attempt.confidence
                    );
                }
                None => log::debug!("strategy '{}' gave no answer", step.label),
            }
        }
        ChainOutcome {
            winner: None,
            tried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_admitted_answer_wins() {
        let later_ran = Cell::new(false);
        let outcome = AttemptChain::new()
            .step("nothing", Floor::None, || None)
            .step("weak", Floor::Above(0.3), || Some(Attempt::new(1, 0.3, "weak")))
            .step("strong", Floor::Above(0.3), || Some(Attempt::new(2, 0.31, "strong")))
            .step("never", Floor::None, || {
                later_ran.set(true);
                Some(Attempt::new(3, 1.0, "never"))
            })
            .run();

        let winner = outcome.winner.unwrap();
        assert_eq!(winner.value, 2);
        assert_eq!(winner.source, "strong");
        assert_eq!(outcome.tried, vec!["nothing", "weak", "strong"]);
        assert!(!later_ran.get());
    }

    #[test]
    fn exhausted_chain() {
        let outcome: ChainOutcome<u8, ()> = AttemptChain::new()
            .step("a", Floor::None, || None)
            .step("b", Floor::Above(0.5), || Some(Attempt::new(1, 0.5, ())))
            .run();
        assert!(outcome.winner.is_none());
        assert_eq!(outcome.tried, vec!["a", "b"]);
    }
}
