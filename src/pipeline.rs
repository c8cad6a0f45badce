use std::collections::VecDeque;

/// What the event loop should do after a speedrun step completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedrunStep {
    Run(usize),
    Finished,
    Aborted { failed: usize },
}

/// Runs task slots strictly in order, stopping at the first failure.
///
/// The runner only decides which slot comes next; executing the slot and
/// reporting its failure stay with the task itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speedrun {
    remaining: VecDeque<usize>,
    current: Option<usize>,
}

impl Speedrun {
    pub fn new(order: impl IntoIterator<Item = usize>) -> Self {
        Self {
            remaining: order.into_iter().collect(),
            current: None,
        }
    }

    pub fn start(&mut self) -> SpeedrunStep {
        self.advance()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Feeds the terminal state of `slot`. Results for slots the speedrun is
    /// not waiting on are ignored and leave it untouched.
    pub fn on_finished(&mut self, slot: usize, succeeded: bool) -> Option<SpeedrunStep> {
        if self.current != Some(slot) {
            return None;
        }
        if !succeeded {
            self.current = None;
            self.remaining.clear();
            return Some(SpeedrunStep::Aborted { failed: slot });
        }
        Some(self.advance())
    }

    fn advance(&mut self) -> SpeedrunStep {
        self.current = self.remaining.pop_front();
        match self.current {
            Some(slot) => SpeedrunStep::Run(slot),
            None => SpeedrunStep::Finished,
        }
    }
}
