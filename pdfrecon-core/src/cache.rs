//! Scan-result cache.
//!
//! Re-scanning a file whose path, mtime, and size are all unchanged is
//! wasted work for the batch driver. One mutex guards the whole map; entry
//! replacement is atomic from the callers' perspective.

use crate::report::FileReport;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    mtime: SystemTime,
    size: u64,
}

#[derive(Debug, Default)]
pub struct ScanCache {
    entries: Mutex<HashMap<PathBuf, (CacheKey, Arc<FileReport>)>>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, (CacheKey, Arc<FileReport>)>> {
        // A panicked scan thread must not disable the cache for the rest.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached report for `path`, when mtime and size still match.
    pub fn get(&self, path: &Path, mtime: SystemTime, size: u64) -> Option<Arc<FileReport>> {
        let entries = self.lock();
        let (key, report) = entries.get(path)?;
        if *key == (CacheKey { mtime, size }) {
            Some(Arc::clone(report))
        } else {
            None
        }
    }

    /// Store (replacing any previous entry for `path`).
    pub fn insert(
        &self,
        path: PathBuf,
        mtime: SystemTime,
        size: u64,
        report: FileReport,
    ) -> Arc<FileReport> {
        let report = Arc::new(report);
        self.lock()
            .insert(path, (CacheKey { mtime, size }, Arc::clone(&report)));
        report
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RiskLevel;

    fn report() -> FileReport {
        FileReport {
            path: PathBuf::from("a.pdf"),
            size: 10,
            md5: String::new(),
            findings: vec![],
            revisions: vec![],
            classification: RiskLevel::Green,
            timeline: vec![],
            errors: vec![],
        }
    }

    #[test]
    fn test_hit_requires_matching_metadata() {
        let cache = ScanCache::new();
        let now = SystemTime::now();
        cache.insert(PathBuf::from("a.pdf"), now, 10, report());

        assert!(cache.get(Path::new("a.pdf"), now, 10).is_some());
        assert!(cache.get(Path::new("a.pdf"), now, 11).is_none());
        assert!(cache
            .get(
                Path::new("a.pdf"),
                now + std::time::Duration::from_secs(1),
                10
            )
            .is_none());
        assert!(cache.get(Path::new("b.pdf"), now, 10).is_none());
    }

    #[test]
    fn test_insert_replaces() {
        let cache = ScanCache::new();
        let now = SystemTime::now();
        cache.insert(PathBuf::from("a.pdf"), now, 10, report());
        let mut updated = report();
        updated.classification = RiskLevel::Red;
        cache.insert(PathBuf::from("a.pdf"), now, 10, updated);

        assert_eq!(cache.len(), 1);
        let fetched = cache.get(Path::new("a.pdf"), now, 10).unwrap();
        assert_eq!(fetched.classification, RiskLevel::Red);
    }

    #[test]
    fn test_clear() {
        let cache = ScanCache::new();
        cache.insert(PathBuf::from("a.pdf"), SystemTime::now(), 1, report());
        assert!(!cache.is_empty());
        cache.clear();
        assert!(cache.is_empty());
    }
}
