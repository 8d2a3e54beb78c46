//! Partial field selection.

use std::collections::BTreeSet;

/// Restricts which fields take part in a serialize or reconcile pass.
///
/// Paths are dotted (`author.name`) and compared case-insensitively, since
/// the wire carries lowercased names. The default selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    paths: Option<BTreeSet<String>>,
}

impl Selection {
    /// Select every field.
    pub fn all() -> Self {
        Self { paths: None }
    }

    /// Select only the given dotted paths.
    pub fn of<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: Some(
                paths
                    .into_iter()
                    .map(|p| p.as_ref().to_lowercase())
                    .collect(),
            ),
        }
    }

    pub fn is_all(&self) -> bool {
        self.paths.is_none()
    }

    /// Whether `field` takes part, directly or through a nested path.
    pub fn is_selected(&self, field: &str) -> bool {
        let Some(paths) = &self.paths else {
            return true;
        };
        let field = field.to_lowercase();
        let prefix = format!("{}.", field);
        paths.contains(&field) || paths.iter().any(|p| p.starts_with(&prefix))
    }

    /// Selection for the relation behind `field`.
    ///
    /// Entries prefixed `field.` are kept with the prefix stripped. Selecting
    /// the bare relation name selects the whole related model.
    pub fn sub_selection(&self, field: &str) -> Selection {
        let Some(paths) = &self.paths else {
            return Selection::all();
        };
        let field = field.to_lowercase();
        if paths.contains(&field) {
            return Selection::all();
        }
        let prefix = format!("{}.", field);
        Selection {
            paths: Some(
                paths
                    .iter()
                    .filter_map(|p| p.strip_prefix(&prefix))
                    .map(str::to_string)
                    .collect(),
            ),
        }
    }

    /// Selected paths, sorted; `None` when everything is selected.
    pub fn paths(&self) -> Option<impl Iterator<Item = &str>> {
        self.paths.as_ref().map(|p| p.iter().map(String::as_str))
    }
}
