//! Language feature sets.
//!
//! Each script records the set of language features its tree currently
//! uses; each pass declares the richest set it can handle. The phase
//! optimizer compares the two before running a pass, and sugar-removal
//! transforms shrink the recorded set as they rewrite.

/// A single language feature beyond the ES3 baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Feature {
    LetConst = 0,
    Destructuring,
    ForOf,
    TemplateLiterals,
    ArrowFunctions,
    Classes,
    DefaultParams,
    RestParams,
    Spread,
    Generators,
    AsyncFunctions,
    ExponentOp,
}

const FEATURE_COUNT: u32 = 12;

/// A set of [`Feature`]s with lattice operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureSet {
    bits: u32,
}

impl FeatureSet {
    /// The ES3 baseline: no optional features.
    pub const ES3: FeatureSet = FeatureSet { bits: 0 };

    /// ES5 adds nothing the core tracks beyond the baseline.
    pub const ES5: FeatureSet = FeatureSet { bits: 0 };

    /// Everything this compiler understands.
    pub const LATEST: FeatureSet = FeatureSet {
        bits: (1 << FEATURE_COUNT) - 1,
    };

    /// The ES2015 feature group.
    pub fn es2015() -> FeatureSet {
        FeatureSet::ES3
            .with(Feature::LetConst)
            .with(Feature::Destructuring)
            .with(Feature::ForOf)
            .with(Feature::TemplateLiterals)
            .with(Feature::ArrowFunctions)
            .with(Feature::Classes)
            .with(Feature::DefaultParams)
            .with(Feature::RestParams)
            .with(Feature::Spread)
            .with(Feature::Generators)
    }

    pub fn with(self, f: Feature) -> FeatureSet {
        FeatureSet {
            bits: self.bits | (1 << f as u32),
        }
    }

    pub fn without(self, f: Feature) -> FeatureSet {
        FeatureSet {
            bits: self.bits & !(1 << f as u32),
        }
    }

    pub fn has(self, f: Feature) -> bool {
        self.bits & (1 << f as u32) != 0
    }

    pub fn union(self, other: FeatureSet) -> FeatureSet {
        FeatureSet {
            bits: self.bits | other.bits,
        }
    }

    /// Whether every feature in `other` is also in `self`.
    pub fn contains(self, other: FeatureSet) -> bool {
        self.bits & other.bits == other.bits
    }

    pub fn is_empty(self) -> bool {
        self.bits == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_and_contains() {
        let fs = FeatureSet::ES3.with(Feature::LetConst);
        assert!(fs.has(Feature::LetConst));
        assert!(!fs.has(Feature::ForOf));
        assert!(fs.contains(FeatureSet::ES3));
        assert!(FeatureSet::LATEST.contains(fs));
        assert!(!FeatureSet::ES3.contains(fs));
    }

    #[test]
    fn without_removes() {
        let fs = FeatureSet::es2015();
        assert!(fs.has(Feature::Destructuring));
        let fs = fs.without(Feature::Destructuring);
        assert!(!fs.has(Feature::Destructuring));
        assert!(fs.has(Feature::LetConst));
    }

    #[test]
    fn union_is_upper_bound() {
        let a = FeatureSet::ES3.with(Feature::LetConst);
        let b = FeatureSet::ES3.with(Feature::ForOf);
        let u = a.union(b);
        assert!(u.contains(a));
        assert!(u.contains(b));
    }
}
