use std::collections::HashMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use webqa_core::{QaError, QaResult, SearchHit};

use crate::shard::{parse_shard, write_shard};

pub const SHARD_PREFIX: &str = "search-";
pub const SHARD_EXTENSION: &str = ".txt";
pub const MASTER_SHARD: &str = "search-master.txt";
pub const DEFAULT_FLUSH_INTERVAL: usize = 10;
/// In-progress writes; never matched by `list_shards`.
const TEMP_PREFIX: &str = ".search-";

/// Search results keyed by normalized query, persisted as shard files.
///
/// Every process writes only its own shard (`search-<id>.txt`). `load` folds
/// the master shard and then every other shard into memory, deletes the
/// folded shards and rewrites the master. A shard must be closed by its
/// writer before another process loads the directory: nothing here locks
/// across processes.
pub struct ResultCache {
    dir: PathBuf,
    own_shard: PathBuf,
    flush_interval: usize,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Vec<SearchHit>>,
    additions: usize,
    unflushed: usize,
}

/// Outcome of `ResultCache::load`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub shards_merged: usize,
    pub shards_skipped: Vec<PathBuf>,
    pub entries: usize,
}

impl ResultCache {
    /// A cache over `dir` with a fresh random shard for this process.
    pub fn new(dir: impl Into<PathBuf>, flush_interval: usize) -> Self {
        let id = ulid::Ulid::new().to_string().to_lowercase();
        Self::with_shard_id(dir, &id, flush_interval)
    }

    pub fn with_shard_id(dir: impl Into<PathBuf>, shard_id: &str, flush_interval: usize) -> Self {
        let dir = dir.into();
        let own_shard = dir.join(format!("{SHARD_PREFIX}{shard_id}{SHARD_EXTENSION}"));
        Self {
            dir,
            own_shard,
            flush_interval: flush_interval.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn own_shard(&self) -> &Path {
        &self.own_shard
    }

    pub fn master_shard(&self) -> PathBuf {
        self.dir.join(MASTER_SHARD)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fold every shard in the cache directory into memory.
    ///
    /// The master is folded first, the other shards after it in filename
    /// order, so for a query present in several shards the last one wins.
    /// Corrupt shards are logged and left on disk. The master is rewritten
    /// with the merged map and only then are the folded shards deleted; if
    /// the rewrite fails the shards stay on disk for the next load.
    ///
    /// A shard that disappears between listing and reading was folded by
    /// another process, which wrote the master before deleting it, so the
    /// master is read again and its entries missing here are adopted.
    pub fn load(&self) -> QaResult<LoadReport> {
        fs::create_dir_all(&self.dir)?;
        let shards = list_shards(&self.dir)?;
        Ok(self.fold(shards))
    }

    /// Fold the master, then `shards`, which were listed before the master
    /// is read.
    fn fold(&self, shards: Vec<PathBuf>) -> LoadReport {
        let master = self.master_shard();
        let mut report = LoadReport::default();
        let mut folded = Vec::new();
        let mut vanished = 0;

        {
            let mut state = self.lock();

            match read_shard(&master) {
                Ok(Some(records)) => {
                    state.entries.extend(records);
                    report.shards_merged += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("skipping master shard: {e}");
                    set_aside(&master);
                    report.shards_skipped.push(master.clone());
                }
            }

            for shard in shards {
                match read_shard(&shard) {
                    Ok(Some(records)) => {
                        debug!(shard = %shard.display(), records = records.len(), "folding shard");
                        state.entries.extend(records);
                        report.shards_merged += 1;
                        folded.push(shard);
                    }
                    Ok(None) => {
                        debug!(shard = %shard.display(), "shard already folded elsewhere");
                        vanished += 1;
                    }
                    Err(e) => {
                        warn!("skipping shard: {e}");
                        report.shards_skipped.push(shard);
                    }
                }
            }

            if vanished > 0 {
                if let Ok(Some(records)) = read_shard(&master) {
                    for (query, hits) in records {
                        state.entries.entry(query).or_insert(hits);
                    }
                }
            }

            report.entries = state.entries.len();
        }

        if let Err(e) = self.flush(&master) {
            warn!(
                "cannot rewrite master shard {}, keeping {} folded shard(s): {e}",
                master.display(),
                folded.len()
            );
            return report;
        }

        for shard in &folded {
            match fs::remove_file(shard) {
                Ok(()) => info!("deleted folded cache shard {}", shard.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("cannot delete cache shard {}: {e}", shard.display()),
            }
        }

        report
    }

    pub fn get(&self, query: &str) -> Option<Vec<SearchHit>> {
        self.lock().entries.get(query).cloned()
    }

    /// Insert or replace the hits for `query`; every `flush_interval`
    /// additions the whole map is written to this process's shard.
    pub fn put(&self, query: &str, hits: Vec<SearchHit>) -> QaResult<()> {
        if query.is_empty() {
            debug!("not caching an empty query");
            return Ok(());
        }

        let mut state = self.lock();
        state.entries.insert(query.to_string(), hits);
        state.additions += 1;
        state.unflushed += 1;

        if state.additions % self.flush_interval == 0 {
            write_atomically(&self.own_shard, &state.entries)?;
            state.unflushed = 0;
            debug!(additions = state.additions, "flushed own cache shard");
        }
        Ok(())
    }

    /// Serialize the whole map to `target`, keys in lexicographic order.
    pub fn flush(&self, target: &Path) -> QaResult<()> {
        let mut state = self.lock();
        write_atomically(target, &state.entries)?;
        if target == self.own_shard.as_path() {
            state.unflushed = 0;
        }
        Ok(())
    }

    /// Flush this process's shard if it has additions not yet on disk.
    pub fn persist(&self) -> QaResult<()> {
        let unflushed = self.lock().unflushed;
        if unflushed == 0 {
            return Ok(());
        }
        self.flush(&self.own_shard)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached queries in lexicographic order.
    pub fn queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = self.lock().entries.keys().cloned().collect();
        queries.sort();
        queries
    }

    pub fn snapshot(&self) -> HashMap<String, Vec<SearchHit>> {
        self.lock().entries.clone()
    }
}

// ---------------------------------------------------------------------------
// Shard files
// ---------------------------------------------------------------------------

/// Non-master shards in `dir`, sorted by filename.
fn list_shards(dir: &Path) -> QaResult<Vec<PathBuf>> {
    let mut shards = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(SHARD_PREFIX)
            && name.ends_with(SHARD_EXTENSION)
            && name != MASTER_SHARD
            && entry.path().is_file()
        {
            shards.push(entry.path());
        }
    }
    shards.sort();
    Ok(shards)
}

/// `None` when the file does not exist (anymore).
fn read_shard(path: &Path) -> QaResult<Option<Vec<(String, Vec<SearchHit>)>>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(QaError::CacheCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };
    parse_shard(&content)
        .map(Some)
        .map_err(|e| QaError::CacheCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Move an unreadable master out of the way before it is rewritten.
fn set_aside(master: &Path) {
    let aside = master.with_extension("txt.corrupt");
    match fs::rename(master, &aside) {
        Ok(()) => warn!("moved unreadable master shard to {}", aside.display()),
        Err(e) => warn!("cannot move unreadable master shard: {e}"),
    }
}

/// Write through a uniquely named temp file in the target's directory, then
/// rename it into place. Concurrent writers of one target never share a temp
/// file and readers never see a partial shard.
fn write_atomically(target: &Path, entries: &HashMap<String, Vec<SearchHit>>) -> QaResult<()> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        write_shard(&mut out, entries)?;
        out.flush()?;
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn hits(prefix: &str, n: usize) -> Vec<SearchHit> {
        (0..n)
            .map(|i| {
                SearchHit::new(
                    format!("{prefix} title {i}"),
                    format!("https://{prefix}.ro/{i}"),
                    format!("{prefix} snippet {i}"),
                    "2021-04-02T11:22:33.000Z",
                    i,
                )
            })
            .collect()
    }

    fn write_raw_shard(dir: &Path, name: &str, records: &[(&str, Vec<SearchHit>)]) {
        let entries: HashMap<String, Vec<SearchHit>> = records
            .iter()
            .map(|(q, h)| (q.to_string(), h.clone()))
            .collect();
        write_atomically(&dir.join(name), &entries).unwrap();
    }

    fn test_cache(dir: &TempDir) -> ResultCache {
        ResultCache::with_shard_id(dir.path(), "test", DEFAULT_FLUSH_INTERVAL)
    }

    #[test]
    fn test_put_and_get() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        assert!(cache.get("covid").is_none());

        cache.put("covid", hits("a", 2)).unwrap();
        assert_eq!(cache.get("covid").unwrap(), hits("a", 2));

        cache.put("covid", hits("b", 1)).unwrap();
        assert_eq!(cache.get("covid").unwrap(), hits("b", 1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_empty_query_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        cache.put("", hits("a", 1)).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_flush_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let writer = test_cache(&dir);
        writer.put("simptome covid", hits("a", 3)).unwrap();
        writer.put("vaccin", Vec::new()).unwrap();
        writer.put("mască protecție", hits("b", 1)).unwrap();
        writer.persist().unwrap();
        let expected = writer.snapshot();

        let reader = ResultCache::with_shard_id(dir.path(), "reader", DEFAULT_FLUSH_INTERVAL);
        let report = reader.load().unwrap();
        assert_eq!(report.shards_merged, 1);
        assert_eq!(report.entries, 3);
        assert_eq!(reader.snapshot(), expected);
    }

    #[test]
    fn test_merge_precedence_by_filename() {
        let dir = TempDir::new().unwrap();
        write_raw_shard(dir.path(), "search-bbb.txt", &[("q", hits("late", 1))]);
        write_raw_shard(
            dir.path(),
            "search-aaa.txt",
            &[("q", hits("early", 2)), ("other", hits("o", 1))],
        );

        let cache = test_cache(&dir);
        cache.load().unwrap();
        assert_eq!(cache.get("q").unwrap(), hits("late", 1));
        assert_eq!(cache.get("other").unwrap(), hits("o", 1));
    }

    #[test]
    fn test_master_is_folded_first() {
        let dir = TempDir::new().unwrap();
        write_raw_shard(dir.path(), MASTER_SHARD, &[("q", hits("master", 1))]);
        write_raw_shard(dir.path(), "search-zzz.txt", &[("q", hits("worker", 1))]);

        let cache = test_cache(&dir);
        cache.load().unwrap();
        assert_eq!(cache.get("q").unwrap(), hits("worker", 1));
    }

    #[test]
    fn test_load_consumes_shards_and_rewrites_master() {
        let dir = TempDir::new().unwrap();
        write_raw_shard(dir.path(), "search-one.txt", &[("a", hits("a", 1))]);
        write_raw_shard(dir.path(), "search-two.txt", &[("b", hits("b", 1))]);

        let cache = test_cache(&dir);
        let report = cache.load().unwrap();
        assert_eq!(report.shards_merged, 2);
        assert!(!dir.path().join("search-one.txt").exists());
        assert!(!dir.path().join("search-two.txt").exists());

        let master = fs::read_to_string(cache.master_shard()).unwrap();
        let records = parse_shard(&master).unwrap();
        let queries: Vec<_> = records.iter().map(|(q, _)| q.as_str()).collect();
        assert_eq!(queries, vec!["a", "b"]);
    }

    #[test]
    fn test_load_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_raw_shard(dir.path(), MASTER_SHARD, &[("m", hits("m", 2))]);
        write_raw_shard(dir.path(), "search-w1.txt", &[("x", hits("x", 1))]);

        let first = test_cache(&dir);
        first.load().unwrap();
        let second = test_cache(&dir);
        second.load().unwrap();
        assert_eq!(first.snapshot(), second.snapshot());

        second.load().unwrap();
        assert_eq!(first.snapshot(), second.snapshot());

        let out_a = dir.path().join("flush-a.out");
        let out_b = dir.path().join("flush-b.out");
        second.flush(&out_a).unwrap();
        second.flush(&out_b).unwrap();
        assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
    }

    #[test]
    fn test_corrupt_shard_skipped() {
        let dir = TempDir::new().unwrap();
        write_raw_shard(dir.path(), "search-good.txt", &[("good", hits("g", 1))]);
        let bad = dir.path().join("search-bad.txt");
        fs::write(&bad, "broken\nTitle\nhttps://x.ro\nsnippet\ndate\n").unwrap();

        let cache = test_cache(&dir);
        let report = cache.load().unwrap();
        assert_eq!(report.shards_merged, 1);
        assert_eq!(report.shards_skipped, vec![bad.clone()]);
        assert!(bad.exists());
        assert!(cache.get("good").is_some());
        assert!(cache.get("broken").is_none());
    }

    #[test]
    fn test_corrupt_master_set_aside() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MASTER_SHARD), "q\nTitle\n").unwrap();

        let cache = test_cache(&dir);
        let report = cache.load().unwrap();
        assert_eq!(report.shards_skipped.len(), 1);
        assert!(dir.path().join("search-master.txt.corrupt").exists());
        assert_eq!(fs::read_to_string(cache.master_shard()).unwrap(), "");
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "not a shard").unwrap();
        fs::write(dir.path().join("search-x.txt.tmp"), "partial").unwrap();

        let cache = test_cache(&dir);
        let report = cache.load().unwrap();
        assert_eq!(report.shards_merged, 0);
        assert!(report.shards_skipped.is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_periodic_flush() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::with_shard_id(dir.path(), "test", 3);
        cache.put("a", hits("a", 1)).unwrap();
        cache.put("b", hits("b", 1)).unwrap();
        assert!(!cache.own_shard().exists());

        cache.put("c", hits("c", 1)).unwrap();
        let records = parse_shard(&fs::read_to_string(cache.own_shard()).unwrap()).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn test_persist_writes_pending_additions() {
        let dir = TempDir::new().unwrap();
        let cache = test_cache(&dir);
        cache.persist().unwrap();
        assert!(!cache.own_shard().exists());

        cache.put("a", hits("a", 1)).unwrap();
        cache.persist().unwrap();
        assert!(cache.own_shard().exists());
    }

    #[test]
    fn test_random_shard_names_differ() {
        let dir = TempDir::new().unwrap();
        let a = ResultCache::new(dir.path(), DEFAULT_FLUSH_INTERVAL);
        let b = ResultCache::new(dir.path(), DEFAULT_FLUSH_INTERVAL);
        assert_ne!(a.own_shard(), b.own_shard());
        let name = a.own_shard().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(SHARD_PREFIX) && name.ends_with(SHARD_EXTENSION));
    }

    #[test]
    fn test_shared_across_threads() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::with_shard_id(dir.path(), "test", 4);
        std::thread::scope(|s| {
            for t in 0..4 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..10 {
                        cache.put(&format!("q{t}-{i}"), hits("t", 1)).unwrap();
                    }
                });
            }
        });
        assert_eq!(cache.len(), 40);
        cache.persist().unwrap();
        let records = parse_shard(&fs::read_to_string(cache.own_shard()).unwrap()).unwrap();
        assert_eq!(records.len(), 40);
    }

    fn seed_workers(dir: &Path, workers: usize) {
        write_raw_shard(dir, MASTER_SHARD, &[("master", hits("m", 1))]);
        for w in 0..workers {
            let query = format!("q{w}");
            write_raw_shard(
                dir,
                &format!("search-w{w}.txt"),
                &[(query.as_str(), hits("w", 2))],
            );
        }
    }

    #[test]
    fn test_concurrent_loads_keep_every_entry() {
        for _ in 0..25 {
            let dir = TempDir::new().unwrap();
            seed_workers(dir.path(), 4);
            let a = ResultCache::with_shard_id(dir.path(), "a", DEFAULT_FLUSH_INTERVAL);
            let b = ResultCache::with_shard_id(dir.path(), "b", DEFAULT_FLUSH_INTERVAL);

            let (ra, rb) = std::thread::scope(|s| {
                let ha = s.spawn(|| a.load());
                let hb = s.spawn(|| b.load());
                (ha.join().unwrap(), hb.join().unwrap())
            });
            assert!(ra.unwrap().shards_skipped.is_empty());
            assert!(rb.unwrap().shards_skipped.is_empty());

            let fresh = ResultCache::with_shard_id(dir.path(), "c", DEFAULT_FLUSH_INTERVAL);
            let report = fresh.load().unwrap();
            assert_eq!(report.entries, 5);
            assert_eq!(report.shards_merged, 1);
            assert!(report.shards_skipped.is_empty());
        }
    }

    #[test]
    fn test_concurrent_flushes_of_one_target() {
        let dir = TempDir::new().unwrap();
        let a = test_cache(&dir);
        let b = ResultCache::with_shard_id(dir.path(), "other", DEFAULT_FLUSH_INTERVAL);
        a.put("alfa", hits("a", 2)).unwrap();
        b.put("beta", hits("b", 2)).unwrap();
        let master = a.master_shard();

        for _ in 0..50 {
            let (ra, rb) = std::thread::scope(|s| {
                let ha = s.spawn(|| a.flush(&master));
                let hb = s.spawn(|| b.flush(&master));
                (ha.join().unwrap(), hb.join().unwrap())
            });
            ra.unwrap();
            rb.unwrap();
            let records = parse_shard(&fs::read_to_string(&master).unwrap()).unwrap();
            assert_eq!(records.len(), 1);
        }
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_shard_folded_elsewhere_is_not_corrupt() {
        let dir = TempDir::new().unwrap();
        seed_workers(dir.path(), 1);
        // Another process folded search-w0.txt into the master and deleted it.
        let cache = test_cache(&dir);
        let mut merged = HashMap::new();
        merged.insert("master".to_string(), hits("m", 1));
        merged.insert("q0".to_string(), hits("w", 2));
        let listed = list_shards(dir.path()).unwrap();
        write_atomically(&cache.master_shard(), &merged).unwrap();
        fs::remove_file(&listed[0]).unwrap();

        let report = cache.fold(listed);
        assert_eq!(report.entries, 2);
        assert!(cache.get("q0").is_some());
        assert!(report.shards_skipped.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_master_rewrite_keeps_shards() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        seed_workers(dir.path(), 2);
        let cache = test_cache(&dir);
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();
        let canary = dir.path().join("writable");
        let read_only = fs::write(&canary, "").is_err();

        let report = cache.load();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        if !read_only {
            // Running with privileges that ignore directory permissions.
            return;
        }

        let report = report.unwrap();
        assert_eq!(report.entries, 3);
        assert!(dir.path().join("search-w0.txt").exists());
        assert!(dir.path().join("search-w1.txt").exists());
    }
}
