//! # Branch Preselector
//!
//! A discovery-side predicate consulted by the SCM source for every
//! candidate branch, independent of (and usually before) any
//! reconciliation run. It rejects unsupported and excluded branch names
//! early, with a logged reason, so they never reach the engine, and it
//! records each accepted branch's last-change time into the registry's
//! age side-map. That side channel is the only path by which the registry
//! learns ages outside a reconciliation run, which is what lets the age
//! filter make informed decisions on the very first run.

use std::time::{Duration, SystemTime};

use glob::Pattern;

use crate::branch::BranchNameMapper;
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::registry::BranchAgeListener;
use crate::scm::{BranchHead, BranchPreselector};

use std::sync::Arc;

/// Rejects unsupported/too-old branches during discovery and feeds the
/// age side-map for the rest.
pub struct ListeningBranchPreselector {
    mapper: Arc<BranchNameMapper>,
    max_age: Option<Duration>,
    excludes: Vec<Pattern>,
    age_listener: Arc<dyn BranchAgeListener>,
}

impl ListeningBranchPreselector {
    /// Creates a preselector.
    ///
    /// `exclude` patterns are matched against the raw branch head name;
    /// `max_age` (when set) rejects branches whose last change is older.
    pub fn new(
        mapper: Arc<BranchNameMapper>,
        max_age: Option<Duration>,
        exclude: &[String],
        age_listener: Arc<dyn BranchAgeListener>,
    ) -> Result<Self> {
        let excludes = exclude
            .iter()
            .map(|pattern| Pattern::new(pattern))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            mapper,
            max_age,
            excludes,
            age_listener,
        })
    }
}

impl BranchPreselector for ListeningBranchPreselector {
    fn accept(&self, head: &BranchHead, sink: &dyn ProgressSink) -> bool {
        let name = head.name();
        if !self.mapper.branch_name_supported(name) {
            sink.error(&format!("The branch name {} is not supported.", name));
            return false;
        }
        if let Some(pattern) = self.excludes.iter().find(|p| p.matches(name)) {
            sink.message(&format!(
                "Branch {} excluded by pattern {}.",
                name,
                pattern.as_str()
            ));
            return false;
        }
        let branch = match self.mapper.from_branch_head(name) {
            Ok(branch) => branch,
            Err(e) => {
                sink.error(&format!("Cannot map branch {}: {}", name, e));
                return false;
            }
        };
        if let Some(max_age) = self.max_age {
            let Some(last_change) = head.last_change() else {
                sink.error(&format!(
                    "Branch {} has no last-change date; cannot verify its age.",
                    name
                ));
                return false;
            };
            // A clock skew into the future counts as age zero.
            let age = SystemTime::now()
                .duration_since(last_change)
                .unwrap_or(Duration::ZERO);
            if age > max_age {
                sink.message(&format!(
                    "Branch {} is too old (last change {} ago).",
                    name,
                    humantime::format_duration(Duration::from_secs(age.as_secs()))
                ));
                return false;
            }
        }
        if let Some(last_change) = head.last_change() {
            self.age_listener.register_last_change(&branch, last_change);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchId;
    use crate::progress::NullSink;
    use parking_lot::Mutex;
    use std::path::Path;

    /// Records registered ages for assertions.
    #[derive(Default)]
    struct RecordingListener {
        registered: Mutex<Vec<(String, SystemTime)>>,
    }

    impl BranchAgeListener for RecordingListener {
        fn register_last_change(&self, branch: &BranchId, last_change: SystemTime) {
            self.registered
                .lock()
                .push((branch.head().to_string(), last_change));
        }
    }

    /// Captures sink lines for assertions.
    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn message(&self, line: &str) {
            self.messages.lock().push(line.to_string());
        }
        fn error(&self, line: &str) {
            self.errors.lock().push(line.to_string());
        }
    }

    fn mapper() -> Arc<BranchNameMapper> {
        Arc::new(
            BranchNameMapper::new(Path::new("/work/branches"), "feature/", "f-", "template")
                .unwrap(),
        )
    }

    fn preselector(
        max_age: Option<Duration>,
        exclude: &[&str],
        listener: Arc<RecordingListener>,
    ) -> ListeningBranchPreselector {
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        ListeningBranchPreselector::new(mapper(), max_age, &exclude, listener).unwrap()
    }

    #[test]
    fn test_accepts_supported_branch_and_registers_age() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(None, &[], Arc::clone(&listener));
        let now = SystemTime::now();

        assert!(selector.accept(&BranchHead::new("feature/login", now), &NullSink));

        let registered = listener.registered.lock();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0], ("feature/login".to_string(), now));
    }

    #[test]
    fn test_rejects_unsupported_name_with_reason() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(None, &[], Arc::clone(&listener));
        let sink = RecordingSink::default();

        assert!(!selector.accept(
            &BranchHead::new("main", SystemTime::now()),
            &sink
        ));
        assert!(sink.errors.lock()[0].contains("not supported"));
        assert!(listener.registered.lock().is_empty());
    }

    #[test]
    fn test_rejects_excluded_pattern_with_reason() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(None, &["feature/wip-*"], Arc::clone(&listener));
        let sink = RecordingSink::default();

        assert!(!selector.accept(
            &BranchHead::new("feature/wip-spike", SystemTime::now()),
            &sink
        ));
        assert!(sink.messages.lock()[0].contains("excluded by pattern"));
        assert!(listener.registered.lock().is_empty());

        // Non-matching names still pass.
        assert!(selector.accept(
            &BranchHead::new("feature/done", SystemTime::now()),
            &sink
        ));
    }

    #[test]
    fn test_rejects_branch_older_than_max_age() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(
            Some(Duration::from_secs(3600)),
            &[],
            Arc::clone(&listener),
        );
        let sink = RecordingSink::default();
        let old = SystemTime::now() - Duration::from_secs(7200);

        assert!(!selector.accept(&BranchHead::new("feature/stale", old), &sink));
        assert!(sink.messages.lock()[0].contains("too old"));
        assert!(listener.registered.lock().is_empty());
    }

    #[test]
    fn test_accepts_young_branch_within_max_age() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(
            Some(Duration::from_secs(3600)),
            &[],
            Arc::clone(&listener),
        );
        let recent = SystemTime::now() - Duration::from_secs(60);

        assert!(selector.accept(&BranchHead::new("feature/fresh", recent), &NullSink));
        assert_eq!(listener.registered.lock().len(), 1);
    }

    #[test]
    fn test_unknown_age_rejected_when_max_age_set() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(
            Some(Duration::from_secs(3600)),
            &[],
            Arc::clone(&listener),
        );
        let sink = RecordingSink::default();

        assert!(!selector.accept(&BranchHead::without_age("feature/mystery"), &sink));
        assert!(sink.errors.lock()[0].contains("no last-change date"));
    }

    #[test]
    fn test_unknown_age_accepted_without_max_age() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(None, &[], Arc::clone(&listener));

        assert!(selector.accept(&BranchHead::without_age("feature/mystery"), &NullSink));
        // Nothing to register without a timestamp.
        assert!(listener.registered.lock().is_empty());
    }

    #[test]
    fn test_future_timestamp_counts_as_age_zero() {
        let listener = Arc::new(RecordingListener::default());
        let selector = preselector(
            Some(Duration::from_secs(3600)),
            &[],
            Arc::clone(&listener),
        );
        let future = SystemTime::now() + Duration::from_secs(600);

        assert!(selector.accept(&BranchHead::new("feature/ahead", future), &NullSink));
    }
}
