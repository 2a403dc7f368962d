// On-disk representation of a SimilarityIndex: a binary vector file and a
// JSON metadata file whose record order matches the vector row order.
use atomicwrites::{AtomicFile, OverwriteBehavior};
use bytes::{Buf, BufMut, BytesMut};
use shopwise_core::{CorpusEntry, Error, Result, SimilarityIndex};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const VECTOR_FILE_MAGIC: &[u8; 4] = b"SWVX";
pub const FORMAT_VERSION: u32 = 1;
pub const FLOAT_WIDTH: u32 = 4;
/// magic(4) + version(4) + float width(4) + dim(4) + count(8)
pub const HEADER_LEN: usize = 24;

/// A vector-file / metadata-file pair
#[derive(Debug, Clone)]
pub struct IndexStore {
    vector_path: PathBuf,
    metadata_path: PathBuf,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(vector_path: P, metadata_path: Q) -> Self {
        Self {
            vector_path: vector_path.as_ref().to_path_buf(),
            metadata_path: metadata_path.as_ref().to_path_buf(),
        }
    }

    pub fn vector_path(&self) -> &Path {
        &self.vector_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn exists(&self) -> bool {
        self.vector_path.exists() && self.metadata_path.exists()
    }

    /// Persist the index. Each file is written to a temporary sibling and
    /// renamed over the target, vectors first, so a concurrent reader sees
    /// either the old or the new file but never a partial one.
    pub fn save(&self, index: &SimilarityIndex) -> Result<()> {
        let vectors = encode_vectors(index)?;
        let metadata = serde_json::to_vec_pretty(index.entries())?;

        write_atomic(&self.vector_path, &vectors)?;
        write_atomic(&self.metadata_path, &metadata)?;

        info!(
            records = index.len(),
            dim = index.dim(),
            vectors = %self.vector_path.display(),
            metadata = %self.metadata_path.display(),
            "Index saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<SimilarityIndex> {
        for path in [&self.vector_path, &self.metadata_path] {
            if !path.exists() {
                return Err(Error::NotFound(path.clone()));
            }
        }

        let raw = std::fs::read(&self.vector_path)?;
        let (dim, count, vectors) = decode_vectors(&raw)?;

        let raw_meta = std::fs::read(&self.metadata_path)?;
        let entries: Vec<CorpusEntry> = serde_json::from_slice(&raw_meta)
            .map_err(|e| Error::CorruptIndex(format!("metadata file is not a record array: {e}")))?;

        if entries.len() != count {
            return Err(Error::CorruptIndex(format!(
                "vector file holds {count} records but metadata holds {}",
                entries.len()
            )));
        }

        debug!(records = count, dim, "Decoded index files");
        SimilarityIndex::from_raw_parts(dim, vectors, entries)
            .map_err(|e| Error::CorruptIndex(e.to_string()))
    }
}

/// Write `index` to the given file pair
pub fn save<P: AsRef<Path>, Q: AsRef<Path>>(
    index: &SimilarityIndex,
    vector_path: P,
    metadata_path: Q,
) -> Result<()> {
    IndexStore::new(vector_path, metadata_path).save(index)
}

/// Read an index back from the given file pair
pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(vector_path: P, metadata_path: Q) -> Result<SimilarityIndex> {
    IndexStore::new(vector_path, metadata_path).load()
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(data))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => Error::Io(e),
        })
}

fn encode_vectors(index: &SimilarityIndex) -> Result<BytesMut> {
    let dim = u32::try_from(index.dim())
        .map_err(|_| Error::InvalidConfig(format!("dimension {} does not fit the header", index.dim())))?;

    let raw = index.raw_vectors();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + raw.len() * FLOAT_WIDTH as usize);
    buf.put_slice(VECTOR_FILE_MAGIC);
    buf.put_u32_le(FORMAT_VERSION);
    buf.put_u32_le(FLOAT_WIDTH);
    buf.put_u32_le(dim);
    buf.put_u64_le(index.len() as u64);
    for value in raw {
        buf.put_f32_le(*value);
    }
    Ok(buf)
}

fn decode_vectors(raw: &[u8]) -> Result<(usize, usize, Vec<f32>)> {
    if raw.len() < HEADER_LEN {
        return Err(Error::CorruptIndex(format!(
            "vector file is {} bytes, shorter than the {HEADER_LEN}-byte header",
            raw.len()
        )));
    }

    let mut buf = raw;
    if &buf[..4] != VECTOR_FILE_MAGIC {
        return Err(Error::CorruptIndex("bad vector file magic".to_string()));
    }
    buf.advance(4);

    let version = buf.get_u32_le();
    if version != FORMAT_VERSION {
        return Err(Error::CorruptIndex(format!("unsupported vector file version {version}")));
    }
    let float_width = buf.get_u32_le();
    if float_width != FLOAT_WIDTH {
        return Err(Error::CorruptIndex(format!("unsupported float width {float_width}")));
    }
    let dim = buf.get_u32_le() as usize;
    let count = usize::try_from(buf.get_u64_le())
        .map_err(|_| Error::CorruptIndex("record count overflows".to_string()))?;

    if dim == 0 && count > 0 {
        return Err(Error::CorruptIndex("zero dimension with non-zero record count".to_string()));
    }

    let expected = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(FLOAT_WIDTH as usize))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| Error::CorruptIndex("declared size overflows".to_string()))?;
    if raw.len() != expected {
        return Err(Error::CorruptIndex(format!(
            "vector file is {} bytes but {count} records of dimension {dim} need {expected}",
            raw.len()
        )));
    }

    let mut vectors = Vec::with_capacity(count * dim);
    while buf.has_remaining() {
        vectors.push(buf.get_f32_le());
    }
    Ok((dim, count, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopwise_core::Vector;

    fn sample_index() -> SimilarityIndex {
        let vectors = vec![
            Vector::new(vec![0.1, 0.2, 0.3]),
            Vector::new(vec![-1.5, 0.0, 2.25]),
            Vector::new(vec![1e-7, 3.4e10, -0.0]),
        ];
        let entries = vec![
            CorpusEntry::new("a", "Espresso machine", "Stainless steel, built-in grinder", "https://img/a.jpg"),
            CorpusEntry::new("b", "Kettle", "", "https://img/b.jpg"),
            CorpusEntry::new("c", "Milk frother \"pro\"", "Unicode ✓", ""),
        ];
        SimilarityIndex::build(vectors, entries).unwrap()
    }

    fn store_in(dir: &tempfile::TempDir) -> IndexStore {
        IndexStore::new(dir.path().join("products.vec"), dir.path().join("products.json"))
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let index = sample_index();

        store.save(&index).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.dim(), 3);
        assert_eq!(loaded.entries(), index.entries());
        for (a, b) in loaded.raw_vectors().iter().zip(index.raw_vectors()) {
            assert!((a - b).abs() <= f32::EPSILON * b.abs().max(1.0));
        }
    }

    #[test]
    fn test_vector_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample_index()).unwrap();
        let size = std::fs::metadata(store.vector_path()).unwrap().len() as usize;
        assert_eq!(size, HEADER_LEN + 3 * 3 * FLOAT_WIDTH as usize);
    }

    #[test]
    fn test_empty_index_keeps_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let empty = SimilarityIndex::build_with_dim(8, Vec::new(), Vec::new()).unwrap();
        store.save(&empty).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dim(), 8);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(matches!(store.load(), Err(Error::NotFound(_))));

        std::fs::write(store.vector_path(), b"").unwrap();
        match store.load() {
            Err(Error::NotFound(path)) => assert_eq!(path, store.metadata_path()),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_vector_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample_index()).unwrap();

        let mut raw = std::fs::read(store.vector_path()).unwrap();
        raw.truncate(raw.len() - 2);
        std::fs::write(store.vector_path(), raw).unwrap();

        assert!(matches!(store.load(), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn test_metadata_count_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample_index()).unwrap();

        let entries = vec![CorpusEntry::new("only", "One", "", "")];
        std::fs::write(store.metadata_path(), serde_json::to_vec(&entries).unwrap()).unwrap();

        assert!(matches!(store.load(), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample_index()).unwrap();

        let mut raw = std::fs::read(store.vector_path()).unwrap();
        raw[0] = b'X';
        std::fs::write(store.vector_path(), raw).unwrap();

        assert!(matches!(store.load(), Err(Error::CorruptIndex(_))));
    }

    #[test]
    fn test_save_replaces_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample_index()).unwrap();

        let smaller = SimilarityIndex::build(
            vec![Vector::new(vec![1.0, 1.0])],
            vec![CorpusEntry::new("z", "Replacement", "", "")],
        )
        .unwrap();
        save(&smaller, store.vector_path(), store.metadata_path()).unwrap();

        let loaded = load(store.vector_path(), store.metadata_path()).unwrap();
        assert_eq!(loaded, smaller);
    }
}
