//! Schema-free tab-separated tables of variant records.

use std::{io::BufRead, path::Path};

use indexmap::IndexMap;

use crate::common::{
    io::{open_read_maybe_gz, open_write_maybe_gz},
    is_sentinel, parse_int, SENTINEL,
};

/// Column names of the variant key.
pub const KEY_COLUMNS: [&str; 5] = ["Chr", "Start", "End", "Ref", "Alt"];

/// Unique identity of a variant row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_new::new)]
pub struct VariantKey {
    pub chrom: String,
    pub start: String,
    pub end: String,
    pub reference: String,
    pub alternative: String,
}

/// One denormalized row; missing fields read as the sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VariantRecord {
    fields: IndexMap<String, String>,
}

impl VariantRecord {
    /// Construct from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut result = Self::default();
        for (k, v) in pairs {
            result.set(k, v);
        }
        result
    }

    /// Value of `column`, the sentinel if absent.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(|s| s.as_str()).unwrap_or(SENTINEL)
    }

    /// Whether the record has a column of this name.
    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    /// Set `column` to `value`; empty values are stored as the sentinel.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, column: K, value: V) {
        let value = value.into();
        let value = if value.is_empty() {
            SENTINEL.to_string()
        } else {
            value
        };
        self.fields.insert(column.into(), value);
    }

    /// Set `column` to `value` as is, also when empty.
    pub fn set_verbatim<K: Into<String>, V: Into<String>>(&mut self, column: K, value: V) {
        self.fields.insert(column.into(), value.into());
    }

    /// Remove `column`, keeping the order of the remaining columns.
    pub fn remove(&mut self, column: &str) -> Option<String> {
        self.fields.shift_remove(column)
    }

    /// Rename `from` to `to` in place.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.fields.get_index_of(from) {
            if let Some(value) = self.fields.shift_remove(from) {
                self.fields.shift_insert(idx.min(self.fields.len()), to.to_string(), value);
            }
        }
    }

    /// Iterate over `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// The variant key of this record.
    pub fn key(&self) -> VariantKey {
        VariantKey::new(
            self.get("Chr").to_string(),
            self.get("Start").to_string(),
            self.get("End").to_string(),
            self.get("Ref").to_string(),
            self.get("Alt").to_string(),
        )
    }

    /// A copy holding exactly `columns` in that order, absent ones as sentinels.
    pub fn restrict(&self, columns: &[String]) -> Self {
        Self {
            fields: columns
                .iter()
                .map(|c| (c.clone(), self.get(c).to_string()))
                .collect(),
        }
    }
}

/// Sort key for coordinates; non-integer values sort last.
pub fn coordinate_key(value: &str) -> (bool, i64) {
    match parse_int(value) {
        Some(v) => (false, v),
        None => (true, 0),
    }
}

/// Stable sort by `(Chr, Start)` and, if `with_end`, `End`.
pub fn sort_by_position(records: &mut [VariantRecord], with_end: bool) {
    records.sort_by(|a, b| {
        let lhs = (
            a.get("Chr"),
            coordinate_key(a.get("Start")),
            if with_end {
                coordinate_key(a.get("End"))
            } else {
                (false, 0)
            },
        );
        let rhs = (
            b.get("Chr"),
            coordinate_key(b.get("Start")),
            if with_end {
                coordinate_key(b.get("End"))
            } else {
                (false, 0)
            },
        );
        lhs.cmp(&rhs)
    });
}

/// A table with an explicit column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    /// Column names in output order.
    pub columns: Vec<String>,
    /// The rows.
    pub records: Vec<VariantRecord>,
}

impl Table {
    /// Read the whole TSV file at `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let chunks = TableChunks::open(path.as_ref(), usize::MAX)?;
        let columns = chunks.columns.clone();
        let mut records = Vec::new();
        for chunk in chunks {
            records.append(&mut chunk?);
        }
        Ok(Self { columns, records })
    }

    /// Write the table to `path` as TSV.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        write_records(path, &self.columns, &self.records)
    }

    /// Column names that appear in any record, first-seen order.
    pub fn union_columns(records: &[VariantRecord]) -> Vec<String> {
        let mut result: IndexMap<String, ()> = IndexMap::new();
        for record in records {
            for column in record.columns() {
                if !result.contains_key(column) {
                    result.insert(column.clone(), ());
                }
            }
        }
        result.into_keys().collect()
    }
}

/// Chunked reader over a TSV file with header line.
pub struct TableChunks {
    reader: csv::Reader<Box<dyn BufRead>>,
    /// The header of the file.
    pub columns: Vec<String>,
    chunk_size: usize,
    done: bool,
}

impl TableChunks {
    /// Open `path` and read its header; chunks hold at most `chunk_size` rows.
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self, anyhow::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(open_read_maybe_gz(path)?);
        let columns = reader
            .headers()
            .map_err(|e| anyhow::anyhow!("problem reading header of {:?}: {}", path, e))?
            .iter()
            .enumerate()
            .map(|(i, s)| {
                if s.is_empty() {
                    format!("column_{}", i + 1)
                } else {
                    s.to_string()
                }
            })
            .collect();
        Ok(Self {
            reader,
            columns,
            chunk_size: chunk_size.max(1),
            done: false,
        })
    }

    fn to_record(&self, row: &csv::StringRecord) -> VariantRecord {
        let mut result = VariantRecord::default();
        for (i, value) in row.iter().enumerate() {
            let column = match self.columns.get(i) {
                Some(column) => column.clone(),
                None => format!("column_{}", i + 1),
            };
            result.set(column, if is_sentinel(value) { SENTINEL } else { value });
        }
        result
    }
}

impl Iterator for TableChunks {
    type Item = Result<Vec<VariantRecord>, anyhow::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::new();
        let mut row = csv::StringRecord::new();
        while chunk.len() < self.chunk_size {
            match self.reader.read_record(&mut row) {
                Ok(true) => chunk.push(self.to_record(&row)),
                Ok(false) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(anyhow::anyhow!("problem reading table row: {}", e)));
                }
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

/// Write `records` restricted to `columns` as TSV to `path`.
pub fn write_records<P: AsRef<Path>>(
    path: P,
    columns: &[String],
    records: &[VariantRecord],
) -> Result<(), anyhow::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(open_write_maybe_gz(path.as_ref())?);
    writer.write_record(columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| record.get(c)))?;
    }
    writer
        .flush()
        .map_err(|e| anyhow::anyhow!("problem flushing {:?}: {}", path.as_ref(), e))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{VariantRecord, Table};

    #[test]
    fn missing_field_reads_as_sentinel() {
        let mut record = VariantRecord::from_pairs([("Chr", "chr1"), ("Start", "")]);
        record.set("Gene", "BRCA1");

        assert_eq!(record.get("Start"), ".");
        assert_eq!(record.get("Nope"), ".");
        assert_eq!(record.get("Gene"), "BRCA1");
    }

    #[test]
    fn rename_keeps_position() {
        let mut record = VariantRecord::from_pairs([("a", "1"), ("b", "2"), ("c", "3")]);
        record.rename("b", "x");

        assert_eq!(
            record.columns().cloned().collect::<Vec<_>>(),
            vec!["a", "x", "c"]
        );
        assert_eq!(record.get("x"), "2");
    }

    #[test]
    fn chunks_preserve_order() -> Result<(), anyhow::Error> {
        let chunks = super::TableChunks::open(
            std::path::Path::new("tests/data/annofit/annovar.tsv"),
            2,
        )?
        .collect::<Result<Vec<_>, _>>()?;

        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert_eq!(chunks[0][0].get("Start"), "100");
        assert_eq!(chunks[2][0].get("Start"), "900");

        Ok(())
    }

    #[test]
    fn write_then_read() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("out.tsv");
        let table = Table {
            columns: vec!["Chr".into(), "Start".into(), "Info".into()],
            records: vec![VariantRecord::from_pairs([
                ("Chr", "chr1"),
                ("Start", "5"),
                ("Info", "a;b"),
            ])],
        };

        table.write(&path)?;
        let read = Table::read(&path)?;

        assert_eq!(read, table);

        Ok(())
    }

    #[test]
    fn sort_by_position_is_numeric_and_stable() {
        let mut records = vec![
            VariantRecord::from_pairs([("Chr", "chr1"), ("Start", "20"), ("Tag", "a")]),
            VariantRecord::from_pairs([("Chr", "chr1"), ("Start", "3"), ("Tag", "b")]),
            VariantRecord::from_pairs([("Chr", "chr1"), ("Start", "20"), ("Tag", "c")]),
            VariantRecord::from_pairs([("Chr", "chr1"), ("Start", "."), ("Tag", "d")]),
        ];

        super::sort_by_position(&mut records, false);

        assert_eq!(
            records.iter().map(|r| r.get("Tag")).collect::<Vec<_>>(),
            vec!["b", "a", "c", "d"]
        );
    }
}
