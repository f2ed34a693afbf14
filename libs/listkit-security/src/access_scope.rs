use crate::filter::Filter;

/// The outcome of an operation-level access decision, as seen by a query.
///
/// A scope is one of three things:
///
/// - deny-all: the operation is refused outright,
/// - unconstrained: every row is reachable (no extra where clause),
/// - filtered: only rows matching the filter are reachable.
///
/// Filtered scopes are merged with the caller's `where` via [`AccessScope::and_where`],
/// so an access filter can only ever narrow what the caller asked for.
///
/// # Examples
///
/// ```
/// use listkit_security::{AccessScope, Filter};
///
/// // deny-all (default)
/// let scope = AccessScope::default();
/// assert!(scope.is_deny_all());
///
/// // only the caller's own posts
/// let scope = AccessScope::filtered(Filter::eq("authorId", "u1"));
/// let merged = scope.and_where(Some(Filter::eq("title", "x")));
/// assert!(merged.is_some());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct AccessScope {
    filter: Option<Filter>,
    unconstrained: bool,
}

impl Default for AccessScope {
    /// Default is deny-all: no filter and not unconstrained.
    fn default() -> Self {
        Self::deny_all()
    }
}

impl AccessScope {
    /// Create an "allow all" (unconstrained) scope.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            filter: None,
            unconstrained: true,
        }
    }

    /// Create a "deny all" scope (no access).
    #[must_use]
    pub fn deny_all() -> Self {
        Self {
            filter: None,
            unconstrained: false,
        }
    }

    /// Create a scope restricted to rows matching `filter`.
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter: Some(filter),
            unconstrained: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.unconstrained
    }

    /// Returns `true` if this scope denies all access.
    #[inline]
    #[must_use]
    pub fn is_deny_all(&self) -> bool {
        !self.unconstrained && self.filter.is_none()
    }

    /// The row filter, if this scope is filtered.
    #[inline]
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Intersect two scopes. Deny wins; unconstrained is the identity.
    #[must_use]
    pub fn and(self, other: AccessScope) -> AccessScope {
        if self.is_deny_all() || other.is_deny_all() {
            return Self::deny_all();
        }
        match (self.filter, other.filter) {
            (None, None) => Self::allow_all(),
            (Some(f), None) | (None, Some(f)) => Self::filtered(f),
            (Some(a), Some(b)) => Self::filtered(a.and(b)),
        }
    }

    /// Merge with a caller-supplied where clause.
    ///
    /// Returns the effective where clause for persistence: `None` means
    /// "no restriction". Callers must check [`AccessScope::is_deny_all`] first;
    /// a deny-all scope yields a filter that matches nothing.
    #[must_use]
    pub fn and_where(self, client_where: Option<Filter>) -> Option<Filter> {
        if self.is_deny_all() {
            return Some(Filter::any(Vec::new()));
        }
        match (self.filter, client_where) {
            (None, w) => w,
            (Some(f), None) => Some(f),
            (Some(f), Some(w)) => Some(w.and(f)),
        }
    }

    /// Consume into the row filter, if any.
    #[must_use]
    pub fn into_filter(self) -> Option<Filter> {
        self.filter
    }
}

impl From<bool> for AccessScope {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::allow_all()
        } else {
            Self::deny_all()
        }
    }
}

impl From<Filter> for AccessScope {
    fn from(filter: Filter) -> Self {
        Self::filtered(filter)
    }
}
