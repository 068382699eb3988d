use thiserror::Error;

use crate::remote::RemoteError;

/// A non-fatal problem met while interpreting or reconciling an assistant reply.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Issue {
    /// A field could not be coerced. The field is omitted, the command survives.
    #[error("{kind}: ignored field `{field}` ({reason})")]
    Parse {
        kind: &'static str,
        field: String,
        reason: String,
    },
    /// A command lacked the minimum data to act on and was skipped.
    #[error("{kind}: dropped ({reason})")]
    Drop { kind: &'static str, reason: String },
    /// An authoritative lookup failed and a fallback path was taken.
    #[error(
        "{kind}{}: fetch failed ({source})",
        .remote_id.as_deref().map(|id| format!(" {id}")).unwrap_or_default()
    )]
    Fetch {
        kind: &'static str,
        remote_id: Option<String>,
        source: RemoteError,
    },
    /// A guardrail rejected a change. State was not touched.
    #[error("{message}")]
    Validation { message: String },
    #[error("{kind}: store error ({message})")]
    Store { kind: &'static str, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueClass {
    Parse,
    Drop,
    Fetch,
    Validation,
    Store,
}

impl Issue {
    #[must_use]
    pub fn class(&self) -> IssueClass {
        match self {
            Issue::Parse { .. } => IssueClass::Parse,
            Issue::Drop { .. } => IssueClass::Drop,
            Issue::Fetch { .. } => IssueClass::Fetch,
            Issue::Validation { .. } => IssueClass::Validation,
            Issue::Store { .. } => IssueClass::Store,
        }
    }

    /// Only validation failures are meant for the user directly.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        self.class() == IssueClass::Validation
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Issue::Fetch { source, .. } if source.is_unauthorized())
    }

    pub(crate) fn store(kind: &'static str, err: &anyhow::Error) -> Self {
        Issue::Store {
            kind,
            message: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_display_with_and_without_id() {
        let with_id = Issue::Fetch {
            kind: "create_meal",
            remote_id: Some("m-1".to_string()),
            source: RemoteError::Timeout,
        };
        assert_eq!(
            with_id.to_string(),
            "create_meal m-1: fetch failed (request timed out)"
        );
        let without = Issue::Fetch {
            kind: "macro_targets",
            remote_id: None,
            source: RemoteError::Unauthorized,
        };
        assert!(without.to_string().starts_with("macro_targets: fetch failed"));
        assert!(without.is_unauthorized());
        assert!(!with_id.is_unauthorized());
    }

    #[test]
    fn test_class_and_user_facing() {
        let validation = Issue::Validation {
            message: "Rate must be positive".to_string(),
        };
        assert_eq!(validation.class(), IssueClass::Validation);
        assert!(validation.is_user_facing());
        let drop = Issue::Drop {
            kind: "create_meal",
            reason: "no id and no name".to_string(),
        };
        assert_eq!(drop.class(), IssueClass::Drop);
        assert!(!drop.is_user_facing());
    }
}
