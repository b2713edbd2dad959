//! Reference contig index (`.fai`) handling.

use std::{io::BufRead, path::Path};

use indexmap::IndexMap;

use crate::common::io::open_read_maybe_gz;

/// Contig names and lengths in reference declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContigIndex {
    contigs: IndexMap<String, u64>,
}

impl ContigIndex {
    /// Load from a tab-separated sequence index (`name`, `length`, ...).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path.as_ref())?;
        Self::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("problem reading contig index {:?}: {}", path.as_ref(), e))
    }

    /// Parse from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, anyhow::Error> {
        let mut contigs = IndexMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let name = fields.next().unwrap_or_default();
            let length = fields
                .next()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .ok_or_else(|| anyhow::anyhow!("invalid length in line {}: {:?}", lineno + 1, &line))?;
            contigs.insert(name.to_string(), length);
        }
        Ok(Self { contigs })
    }

    /// Construct from explicit `(name, length)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            contigs: pairs.into_iter().map(|(n, l)| (n.into(), l)).collect(),
        }
    }

    /// Rank of `name` in declaration order.
    pub fn rank(&self, name: &str) -> Option<usize> {
        self.contigs.get_index_of(name)
    }

    /// Length of contig `name`.
    pub fn length(&self, name: &str) -> Option<u64> {
        self.contigs.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contigs.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Iterate `(name, length)` in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.contigs.iter().map(|(n, l)| (n.as_str(), *l))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn from_path() -> Result<(), anyhow::Error> {
        let index = super::ContigIndex::from_path("tests/data/curebase/ref.fa.fai")?;

        assert_eq!(index.len(), 3);
        assert_eq!(index.rank("chr2"), Some(1));
        assert_eq!(index.rank("chr10"), Some(2));
        assert_eq!(index.length("chr1"), Some(248956422));
        assert_eq!(index.rank("chrUn"), None);

        Ok(())
    }

    #[test]
    fn invalid_length_fails() {
        let res = super::ContigIndex::from_reader(std::io::Cursor::new("chr1\tabc\n"));

        assert!(res.is_err());
    }
}
