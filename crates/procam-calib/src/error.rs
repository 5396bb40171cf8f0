/// Error types for the calibration solvers.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CalibError {
    /// Fewer correspondences than the solve mode requires.
    #[error("solver requires at least {required} correspondences, got {actual}")]
    InsufficientPoints {
        /// Minimum number of correspondences required by the solver.
        required: usize,
        /// Actual number of correspondences provided.
        actual: usize,
    },

    /// The correspondences do not determine a unique solution.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// A correspondence has an unset object point and the solve was asked to reject it.
    #[error("correspondence {index} has an unset object point")]
    IncompleteCorrespondence {
        /// Position of the offending correspondence in the set.
        index: usize,
    },

    /// Invalid input parameter, such as an empty image or inverted clip planes.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
