use std::fmt;

use crate::floating_type_mod::FT;

/// Faults raised by the resolution model and the neighbor relations.
///
/// The first four variants are configuration faults detected at construction,
/// the last three are caller protocol violations detected while the relations are used.
#[derive(Debug, Clone, PartialEq)]
pub enum SphError {
    /// A parameter that has to be positive and finite is not.
    InvalidParameter { name: &'static str, value: FT },
    /// The deepest refinement level yields a spacing that is not in `(0, reference_spacing]`.
    InconsistentRefinement {
        refinement_level: usize,
        reference_spacing: FT,
        minimum_spacing: FT,
    },
    /// A shape driven refinement was requested without a target shape.
    MissingShape { policy: &'static str },
    /// A configured coordinate vector does not match the simulation dimension.
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        got: usize,
    },
    /// The particle collection holds more live particles than the relation was sized for.
    BoundExceeded { live_count: usize, bound: usize },
    /// A neighbor entry at or beyond `current_size` was requested.
    StaleNeighborhoodRead { index: usize, current_size: usize },
    /// The spatial index of a body was built for a different number of live particles.
    StaleSpatialIndex {
        body: String,
        indexed_count: usize,
        live_count: usize,
    },
}

impl SphError {
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SphError::InvalidParameter { .. }
                | SphError::InconsistentRefinement { .. }
                | SphError::MissingShape { .. }
                | SphError::DimensionMismatch { .. }
        )
    }

    pub fn is_consistency_error(&self) -> bool {
        !self.is_configuration_error()
    }
}

impl fmt::Display for SphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SphError::InvalidParameter { name, value } => write!(
                f,
                "configuration error: parameter `{}` must be positive and finite, got {}",
                name, value
            ),
            SphError::InconsistentRefinement {
                refinement_level,
                reference_spacing,
                minimum_spacing,
            } => write!(
                f,
                "configuration error: refinement level {} yields minimum spacing {} for reference spacing {}",
                refinement_level, minimum_spacing, reference_spacing
            ),
            SphError::MissingShape { policy } => {
                write!(f, "configuration error: refinement policy `{}` needs a target shape", policy)
            }
            SphError::DimensionMismatch { name, expected, got } => write!(
                f,
                "configuration error: `{}` has {} components, simulation dimension is {}",
                name, got, expected
            ),
            SphError::BoundExceeded { live_count, bound } => write!(
                f,
                "consistency error: {} live particles exceed the relation bound of {} (missing resize?)",
                live_count, bound
            ),
            SphError::StaleNeighborhoodRead { index, current_size } => write!(
                f,
                "consistency error: neighbor entry {} read beyond current size {}",
                index, current_size
            ),
            SphError::StaleSpatialIndex {
                body,
                indexed_count,
                live_count,
            } => write!(
                f,
                "consistency error: spatial index of `{}` holds {} particles but {} are live (missing cell list update?)",
                body, indexed_count, live_count
            ),
        }
    }
}

impl std::error::Error for SphError {}

/// Rejects zero, negative and non-finite values.
pub fn check_positive(name: &'static str, value: FT) -> Result<FT, SphError> {
    if value.is_finite() && value > 0. {
        Ok(value)
    } else {
        Err(SphError::InvalidParameter { name, value })
    }
}

#[test]
fn check_positive_rejects_degenerate_values() {
    assert_eq!(check_positive("spacing", 0.5), Ok(0.5));
    for bad in [0., -1., FT::NAN, FT::INFINITY] {
        let err = check_positive("spacing", bad).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("spacing"));
    }
}
