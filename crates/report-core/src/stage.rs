use crate::ReportError;

/// Result of one pipeline stage.
///
/// Stages whose failure only shrinks the report yield `Degraded`; stages whose
/// failure ends the request yield `Fatal`.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Ok(T),
    Degraded(ReportError),
    Fatal(ReportError),
}

/// How a stage treats its own failure.
///
/// `Degrade` only covers soft errors; an error that is fatal on its own
/// (`ReportError::is_fatal`) still ends the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    Degrade,
}

impl<T> StageOutcome<T> {
    pub fn from_result(result: Result<T, ReportError>, policy: FailurePolicy) -> Self {
        match (result, policy) {
            (Ok(v), _) => StageOutcome::Ok(v),
            (Err(e), FailurePolicy::Abort) => StageOutcome::Fatal(e),
            (Err(e), FailurePolicy::Degrade) if e.is_fatal() => StageOutcome::Fatal(e),
            (Err(e), FailurePolicy::Degrade) => StageOutcome::Degraded(e),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            StageOutcome::Ok(v) => Some(v),
            StageOutcome::Degraded(_) | StageOutcome::Fatal(_) => None,
        }
    }

    /// Treat any failure as an error, for stages that cannot continue without a value
    pub fn into_result(self) -> Result<T, ReportError> {
        match self {
            StageOutcome::Ok(v) => Ok(v),
            StageOutcome::Degraded(e) | StageOutcome::Fatal(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_decides_outcome() {
        let err = || Err::<u8, _>(ReportError::Ai("quota".into()));
        assert!(matches!(
            StageOutcome::from_result(err(), FailurePolicy::Degrade),
            StageOutcome::Degraded(ReportError::Ai(_))
        ));
        assert!(matches!(
            StageOutcome::from_result(err(), FailurePolicy::Abort),
            StageOutcome::Fatal(ReportError::Ai(_))
        ));
        assert_eq!(
            StageOutcome::from_result(Ok(3u8), FailurePolicy::Abort).ok(),
            Some(3)
        );
    }

    #[test]
    fn test_degrade_does_not_swallow_fatal_errors() {
        let outcome = StageOutcome::<u8>::from_result(
            Err(ReportError::DataUnavailable("listing down".into())),
            FailurePolicy::Degrade,
        );
        assert!(matches!(outcome, StageOutcome::Fatal(ReportError::DataUnavailable(_))));
    }

    #[test]
    fn test_into_result_keeps_error() {
        let outcome: StageOutcome<u8> = StageOutcome::Degraded(ReportError::Render("font".into()));
        assert_eq!(outcome.into_result(), Err(ReportError::Render("font".into())));
    }
}
