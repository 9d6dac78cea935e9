//! Relative-motion pair construction for hand-eye calibration.

use nalgebra::{Matrix4, RealField};
use rigpose_core::rigid_inverse;
use serde::{Deserialize, Serialize};

/// How relative-motion pairs are drawn from a pose sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairingMode {
    /// Pair each sample with its successor only: `N-1` pairs.
    Consecutive,
    /// Pair every sample with every later one: `N·(N-1)/2` pairs.
    ///
    /// Better-conditioned stacked systems at quadratic cost.
    AllPairs,
}

impl PairingMode {
    pub fn from_all_pairs_flag(use_all_pairs: bool) -> Self {
        if use_all_pairs {
            Self::AllPairs
        } else {
            Self::Consecutive
        }
    }

    /// Number of pairs produced from a sequence of length `n`.
    pub fn pair_count(self, n: usize) -> usize {
        match self {
            Self::Consecutive => n.saturating_sub(1),
            Self::AllPairs => n * n.saturating_sub(1) / 2,
        }
    }
}

/// One relative-motion pair between two samples `i < k` of a shared sequence.
///
/// `hand` and `eye` satisfy `hand · X = X · eye` for the unknown fixed
/// transform `X` between the two sensors.
#[derive(Debug, Clone)]
pub struct MotionPair<T: RealField> {
    pub hand: Matrix4<T>,
    pub eye: Matrix4<T>,
}

/// Build relative-motion pairs from two synchronized pose sequences.
///
/// The composition is deliberately asymmetric and is the invariant the whole
/// calibration rests on:
///
/// - hand side: `H_ik = hand_k⁻¹ · hand_i`
/// - eye side:  `E_ik = eye_k · eye_i⁻¹`
///
/// Swapping either order produces a wrong-signed system. The caller
/// guarantees equal lengths and `n ≥ 2`; the degenerate short sequences are
/// rejected one layer up, in the calibration entry point.
pub fn build_motion_pairs<T: RealField>(
    hand: &[Matrix4<T>],
    eye: &[Matrix4<T>],
    mode: PairingMode,
) -> Vec<MotionPair<T>> {
    debug_assert_eq!(hand.len(), eye.len());

    let n = hand.len();
    let mut pairs = Vec::with_capacity(mode.pair_count(n));

    for i in 0..n.saturating_sub(1) {
        let to = match mode {
            PairingMode::AllPairs => n,
            PairingMode::Consecutive => i + 2,
        };
        for k in (i + 1)..to {
            let hand_ik = rigid_inverse(&hand[k]) * &hand[i];
            let eye_ik = &eye[k] * rigid_inverse(&eye[i]);
            pairs.push(MotionPair {
                hand: hand_ik,
                eye: eye_ik,
            });
        }
    }

    pairs
}
