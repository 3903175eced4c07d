use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Hard failures of the analysis battery. Per-metric insufficiency is not an
/// error; metrics report `valid: false` instead and take no weight.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no samples inside the tracking phase")]
    EmptySeries,

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("no analysis metric produced a result")]
    NothingMeasurable,
}
