//! Chromosome length and centromere position lookup used to assign breakends to chromosome arms
//!

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Chromosome arm relative to the centromere
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, strum::Display,
)]
pub enum ChromosomeArm {
    P,
    Q,
}

impl ChromosomeArm {
    /// Sign used when accumulating breakend orientation across the arm, P arms count up from the
    /// telomere and Q arms count down towards it
    pub fn consistency_sign(&self) -> i32 {
        match self {
            ChromosomeArm::P => 1,
            ChromosomeArm::Q => -1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChromosomeArmBounds {
    /// Chromosome length, also the position of the Q-arm telomere
    pub length: i64,

    /// First position of the Q arm
    pub centromere: i64,
}

impl ChromosomeArmBounds {
    pub fn arm(&self, position: i64) -> ChromosomeArm {
        if position < self.centromere {
            ChromosomeArm::P
        } else {
            ChromosomeArm::Q
        }
    }
}

/// GRCh37 chromosome lengths and the first position past the p11.1 band
const GRCH37_ARM_BOUNDS: &[(&str, i64, i64)] = &[
    ("1", 249_250_621, 125_000_000),
    ("2", 243_199_373, 93_300_000),
    ("3", 198_022_430, 91_000_000),
    ("4", 191_154_276, 50_400_000),
    ("5", 180_915_260, 48_400_000),
    ("6", 171_115_067, 61_000_000),
    ("7", 159_138_663, 59_900_000),
    ("8", 146_364_022, 45_600_000),
    ("9", 141_213_431, 49_000_000),
    ("10", 135_534_747, 40_200_000),
    ("11", 135_006_516, 53_700_000),
    ("12", 133_851_895, 35_800_000),
    ("13", 115_169_878, 17_900_000),
    ("14", 107_349_540, 17_600_000),
    ("15", 102_531_392, 19_000_000),
    ("16", 90_354_753, 36_600_000),
    ("17", 81_195_210, 24_000_000),
    ("18", 78_077_248, 17_200_000),
    ("19", 59_128_983, 26_500_000),
    ("20", 63_025_520, 27_500_000),
    ("21", 48_129_895, 13_200_000),
    ("22", 51_304_566, 14_700_000),
    ("X", 155_270_560, 60_600_000),
    ("Y", 59_373_566, 12_500_000),
];

/// Strip any 'chr' prefix so that GRCh37 and GRCh38 style names share one lookup key
fn normalize_chromosome_name(chromosome: &str) -> &str {
    chromosome.strip_prefix("chr").unwrap_or(chromosome)
}

/// Arm bounds for every chromosome of a reference genome
///
#[derive(Clone, Default)]
pub struct RefGenomeArms {
    bounds: BTreeMap<String, ChromosomeArmBounds>,
}

impl RefGenomeArms {
    pub fn grch37() -> Self {
        let mut x = Self::default();
        for &(chromosome, length, centromere) in GRCH37_ARM_BOUNDS {
            x.add_chromosome(chromosome, length, centromere);
        }
        x
    }

    pub fn add_chromosome(&mut self, chromosome: &str, length: i64, centromere: i64) {
        assert!(
            centromere > 1 && centromere <= length,
            "Invalid centromere position {centromere} for chromosome '{chromosome}' of length {length}"
        );
        self.bounds.insert(
            normalize_chromosome_name(chromosome).to_string(),
            ChromosomeArmBounds { length, centromere },
        );
    }

    pub fn get(&self, chromosome: &str) -> Option<&ChromosomeArmBounds> {
        self.bounds.get(normalize_chromosome_name(chromosome))
    }

    pub fn arm(&self, chromosome: &str, position: i64) -> Option<ChromosomeArm> {
        self.get(chromosome).map(|x| x.arm(position))
    }
}

impl fmt::Debug for RefGenomeArms {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RefGenomeArms: {} chromosomes", self.bounds.len())
    }
}
