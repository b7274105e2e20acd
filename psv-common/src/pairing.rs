//! Left/right placement of pair items
//!
//! Each (session, item) gets its own coin flip, drawn on first request and
//! memoized on the session so re-rendering never swaps sides. Placements are
//! independent across items and sessions; there is no global shuffle.

use crate::catalog::{Item, ItemKind};
use crate::session::Session;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Screen side of a pair item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Side::Left),
            "right" => Ok(Side::Right),
            other => Err(format!("unknown side '{}'", other)),
        }
    }
}

/// Placement of a pair item for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PresentationOrder {
    pub ground_truth_on_left: bool,
}

impl PresentationOrder {
    pub fn new(ground_truth_on_left: bool) -> Self {
        Self {
            ground_truth_on_left,
        }
    }

    pub fn ground_truth_side(&self) -> Side {
        if self.ground_truth_on_left {
            Side::Left
        } else {
            Side::Right
        }
    }

    pub fn candidate_side(&self) -> Side {
        self.ground_truth_side().opposite()
    }
}

/// Draws and memoizes placements
#[derive(Debug, Clone, Default)]
pub struct PairingEngine {
    seed: Option<u64>,
}

impl PairingEngine {
    /// `seed = None` draws from the thread RNG; `Some` makes every
    /// (participant, pass, item) placement reproducible across restarts
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    /// Placement for `item` in `session`, drawn once and then memoized
    ///
    /// Single items have no placement.
    pub fn order_for(&self, session: &mut Session, item: &Item) -> Option<PresentationOrder> {
        if item.kind() != ItemKind::Pair {
            return None;
        }
        if let Some(order) = session.presentation_order(&item.id) {
            return Some(order);
        }

        let order = PresentationOrder::new(self.draw(session, item));
        session.remember_order(&item.id, order);
        Some(order)
    }

    fn draw(&self, session: &Session, item: &Item) -> bool {
        match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(derive_seed(
                    seed,
                    session.participant_id(),
                    session.pass(),
                    &item.id,
                ));
                rng.gen_bool(0.5)
            }
            None => rand::thread_rng().gen_bool(0.5),
        }
    }
}

/// Hash (seed, participant, pass, item) into an independent per-draw seed
fn derive_seed(seed: u64, participant_id: &str, pass: u64, item_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update((participant_id.len() as u64).to_le_bytes());
    hasher.update(participant_id.as_bytes());
    hasher.update(pass.to_le_bytes());
    hasher.update(item_id.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
