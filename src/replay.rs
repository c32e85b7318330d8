//! Experience replay for off-policy training.
//!
//! The buffer is a fixed-capacity ring: a cyclic write pointer overwrites
//! the oldest transition once capacity is reached, so the store always
//! holds the most recent `capacity` transitions. Sampling is uniform
//! random **without replacement** over the current contents.
//!
//! The buffer is single-writer by design: the training loop pushes after
//! every environment tick and samples between ticks, on the same thread.
//! Introducing concurrent producers would require adding a
//! synchronization discipline here first.

/// One stored interaction with the environment.
///
/// `mask` is the continuation mask: 1.0 while the episode continues,
/// 0.0 on the transition that observed the teardown signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Observation the action was selected from.
    pub state: Vec<f32>,
    /// Action emitted by the policy (one entry per subflow).
    pub action: Vec<f32>,
    /// Continuation mask (1.0 = episode continues).
    pub mask: f32,
    /// Observation after the environment tick.
    pub next_state: Vec<f32>,
    /// Shaped reward for the tick.
    pub reward: f32,
}

impl Transition {
    /// Create a new transition.
    pub fn new(
        state: Vec<f32>,
        action: Vec<f32>,
        mask: f32,
        next_state: Vec<f32>,
        reward: f32,
    ) -> Self {
        Self {
            state,
            action,
            mask,
            next_state,
            reward,
        }
    }

    /// Whether this transition ended its episode.
    pub fn is_terminal(&self) -> bool {
        self.mask == 0.0
    }
}

/// Fixed-capacity uniform replay buffer with ring eviction.
#[derive(Debug)]
pub struct ReplayBuffer {
    slots: Vec<Transition>,
    capacity: usize,
    /// Next position to overwrite once the buffer is full.
    write_pos: usize,
}

impl ReplayBuffer {
    /// Create a buffer holding at most `capacity` transitions.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; the trainer validates this bound
    /// before construction.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay capacity must be positive");
        Self {
            slots: Vec::with_capacity(capacity.min(4096)),
            capacity,
            write_pos: 0,
        }
    }

    /// Push a transition, evicting the oldest if the buffer is full.
    pub fn push(&mut self, transition: Transition) {
        if self.slots.len() < self.capacity {
            self.slots.push(transition);
        } else {
            self.slots[self.write_pos] = transition;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
    }

    /// Draw `n` transitions uniformly at random without replacement.
    ///
    /// Returns `None` while the buffer holds fewer than `n` transitions;
    /// the trainer additionally gates updates on a warmup multiple of the
    /// batch size, so this guard is a backstop rather than the policy.
    pub fn sample(&self, n: usize) -> Option<Vec<Transition>> {
        if self.slots.len() < n {
            return None;
        }

        // Partial Fisher-Yates over indices.
        let mut indices: Vec<usize> = (0..self.slots.len()).collect();
        for i in 0..n {
            let j = fastrand::usize(i..indices.len());
            indices.swap(i, j);
        }

        Some(
            indices[..n]
                .iter()
                .map(|&idx| self.slots[idx].clone())
                .collect(),
        )
    }

    /// Current number of stored transitions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over the stored transitions in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.slots.iter()
    }
}
