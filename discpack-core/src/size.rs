use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Looks up a file's current size at packing time.
///
/// A negative size or an error means the file cannot be trusted and is
/// skipped for the pass.
pub trait SizeQuery {
    fn size_of(&self, path: &Path) -> io::Result<i64>;
}

impl<F> SizeQuery for F
where
    F: Fn(&Path) -> io::Result<i64>,
{
    fn size_of(&self, path: &Path) -> io::Result<i64> {
        self(path)
    }
}

/// Sizes from filesystem metadata (follows symlinks).
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSizeQuery;

impl SizeQuery for FsSizeQuery {
    fn size_of(&self, path: &Path) -> io::Result<i64> {
        let len = std::fs::metadata(path)?.len();
        i64::try_from(len).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("size of {:?} overflows i64", path))
        })
    }
}

/// Sizes served from a fixed table; unknown paths report `NotFound`.
#[derive(Clone, Debug, Default)]
pub struct StaticSizes {
    sizes: HashMap<PathBuf, i64>,
}

impl StaticSizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, size: i64) {
        self.sizes.insert(path.into(), size);
    }
}

impl<P: Into<PathBuf>> FromIterator<(P, i64)> for StaticSizes {
    fn from_iter<I: IntoIterator<Item = (P, i64)>>(iter: I) -> Self {
        Self { sizes: iter.into_iter().map(|(p, s)| (p.into(), s)).collect() }
    }
}

impl SizeQuery for StaticSizes {
    fn size_of(&self, path: &Path) -> io::Result<i64> {
        self.sizes.get(path).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no size recorded for {:?}", path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_query_reads_metadata() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("f.bin");
        std::fs::write(&p, vec![0u8; 1234]).unwrap();
        assert_eq!(FsSizeQuery.size_of(&p).unwrap(), 1234);
        assert!(FsSizeQuery.size_of(&td.path().join("missing")).is_err());
    }

    #[test]
    fn closures_and_tables_are_queries() {
        let q = |_: &Path| -> io::Result<i64> { Ok(-1) };
        assert_eq!(q.size_of(Path::new("x")).unwrap(), -1);

        let t: StaticSizes = [("a", 5i64)].into_iter().collect();
        assert_eq!(t.size_of(Path::new("a")).unwrap(), 5);
        assert_eq!(t.size_of(Path::new("b")).unwrap_err().kind(), io::ErrorKind::NotFound);
    }
}
