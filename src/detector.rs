/// Outcome of comparing a board's fingerprint with the last delivered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

/// Remembers the ETag of the last board state that made it to the chat.
/// Memory only: a restart always re-posts the board once.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known fingerprint.
    #[cfg(test)]
    pub fn with_last(fingerprint: impl Into<String>) -> Self {
        Self {
            last: Some(fingerprint.into()),
        }
    }

    /// An absent fingerprint on either side never compares equal.
    pub fn check(&self, fingerprint: Option<&str>) -> Change {
        match (self.last.as_deref(), fingerprint) {
            (Some(last), Some(current)) if last == current => Change::Unchanged,
            _ => Change::Changed,
        }
    }

    /// Record `fingerprint` as delivered. Call only once the cycle counts as
    /// complete.
    pub fn commit(&mut self, fingerprint: Option<&str>) {
        self.last = fingerprint.map(str::to_string);
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_check_is_changed() {
        let detector = ChangeDetector::new();
        assert_eq!(detector.check(Some("e1")), Change::Changed);
        assert_eq!(detector.check(None), Change::Changed);
    }

    #[test]
    fn test_same_fingerprint_after_commit_is_unchanged() {
        let mut detector = ChangeDetector::new();
        assert_eq!(detector.check(Some("e1")), Change::Changed);
        detector.commit(Some("e1"));
        assert_eq!(detector.check(Some("e1")), Change::Unchanged);
        assert_eq!(detector.check(Some("e1")), Change::Unchanged);
    }

    #[test]
    fn test_new_fingerprint_is_changed() {
        let detector = ChangeDetector::with_last("e1");
        assert_eq!(detector.check(Some("e2")), Change::Changed);
        assert_eq!(detector.last(), Some("e1"));
    }

    #[test]
    fn test_check_alone_does_not_advance() {
        let detector = ChangeDetector::new();
        detector.check(Some("e1"));
        assert_eq!(detector.check(Some("e1")), Change::Changed);
    }

    #[test]
    fn test_absent_fingerprint_never_matches() {
        let mut detector = ChangeDetector::new();
        detector.commit(None);
        assert_eq!(detector.check(None), Change::Changed);
        assert_eq!(detector.last(), None);
    }
}
