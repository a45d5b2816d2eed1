//! Lifecycle error taxonomy with user-facing messages
//!
//! Every variant is terminal for the single-item operation that raised it.
//! Messages are written so the CLI can print them verbatim.

use thiserror::Error;

use crate::item::ItemKind;

/// Boxed cause carried by errors that wrap a collaborator failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by [`crate::LifecycleController`] and [`crate::ItemRegistry`]
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// The slug is not installed
    #[error("The {kind} '{slug}' could not be found.")]
    NotFound { kind: ItemKind, slug: String },

    /// The repository does not know the slug, or could not be reached
    #[error("Can't find the {kind} '{slug}' in the repository{}", cause_suffix(.source))]
    RepositoryLookup {
        kind: ItemKind,
        slug: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Nothing to do: the item is installed at the requested (or latest) version
    #[error("{} '{slug}' is already installed ({version}).", .kind.title())]
    AlreadyInstalled {
        kind: ItemKind,
        slug: String,
        version: String,
    },

    /// Fetching or installing failed; the registry is unchanged
    #[error("Installation of {kind} '{slug}' failed: {source}")]
    Install {
        kind: ItemKind,
        slug: String,
        #[source]
        source: BoxError,
    },

    /// The active-item switch did not take effect
    #[error("Could not switch to '{name}' {kind}.")]
    Activation { kind: ItemKind, name: String },

    /// Removing the item's files failed
    #[error("Could not delete {kind} '{slug}': {source}")]
    Deletion {
        kind: ItemKind,
        slug: String,
        #[source]
        source: BoxError,
    },

    /// Refused: the item is currently active
    #[error("Can't delete the currently active {kind}.")]
    ActiveItemDeletion { kind: ItemKind, slug: String },

    /// Local state (items directory, active state file) could not be read
    #[error("Could not read installed {kind}s: {source}")]
    State {
        kind: ItemKind,
        #[source]
        source: BoxError,
    },
}

impl LifecycleError {
    pub(crate) fn state(kind: ItemKind, err: anyhow::Error) -> Self {
        LifecycleError::State {
            kind,
            source: err.into(),
        }
    }
}

fn cause_suffix(source: &Option<BoxError>) -> String {
    match source {
        Some(cause) => format!(": {cause}"),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_cli_wording() {
        let err = LifecycleError::ActiveItemDeletion {
            kind: ItemKind::Theme,
            slug: "twentyten".to_string(),
        };
        assert_eq!(err.to_string(), "Can't delete the currently active theme.");

        let err = LifecycleError::RepositoryLookup {
            kind: ItemKind::Theme,
            slug: "nope".to_string(),
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "Can't find the theme 'nope' in the repository."
        );

        let err = LifecycleError::AlreadyInstalled {
            kind: ItemKind::Plugin,
            slug: "akismet".to_string(),
            version: "1.0.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Plugin 'akismet' is already installed (1.0.0)."
        );
    }

    #[test]
    fn test_lookup_error_carries_cause() {
        let err = LifecycleError::RepositoryLookup {
            kind: ItemKind::Plugin,
            slug: "akismet".to_string(),
            source: Some(anyhow::anyhow!("connection refused").into()),
        };
        assert!(err.to_string().ends_with(": connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
