//! Lookup tables joined onto normalized variants: the curated pathogenic
//! variant table and the gene cross-reference table.
//!
//! Both are loaded once and shared read-only between chunks and workers.

use std::path::Path;

use multimap::MultiMap;
use thousands::Separable;

use crate::{
    annofit::conf::{CuratedTableConfig, HGMD},
    common::{flatten_values, table::Table, table::VariantRecord, SENTINEL},
};

use super::normalize::format_coordinate;

/// Squeeze matched lookup rows into one value per column.
///
/// One row gives its values, none gives sentinels, several give the sorted,
/// deduplicated `;`-join of their non-sentinel values.
pub fn squeeze(columns: &[String], rows: &[&VariantRecord]) -> Vec<(String, String)> {
    columns
        .iter()
        .map(|column| {
            let value = match rows {
                [] => SENTINEL.to_string(),
                [row] => row.get(column).to_string(),
                rows => flatten_values(rows.iter().map(|r| r.get(column))),
            };
            (column.clone(), value)
        })
        .collect()
}

/// Curated pathogenic-variant table keyed on `(Chr, Start, End)`.
#[derive(Debug, Default)]
pub struct CuratedTable {
    /// Output columns, the name column renamed to `HGMD`.
    pub columns: Vec<String>,
    rows: MultiMap<(String, String, String), VariantRecord>,
}

impl CuratedTable {
    /// Build from a loaded table; coordinates are normalized to integers.
    pub fn from_table(config: &CuratedTableConfig, table: Table) -> Self {
        let anchors = [
            config.chrom_column.as_str(),
            config.start_column.as_str(),
            config.end_column.as_str(),
        ];
        let columns = table
            .columns
            .iter()
            .filter(|c| !anchors.contains(&c.as_str()))
            .map(|c| {
                if *c == config.name_column {
                    HGMD.to_string()
                } else {
                    c.clone()
                }
            })
            .collect::<Vec<_>>();

        let mut rows = MultiMap::new();
        for mut record in table.records {
            let key = (
                record.get(&config.chrom_column).to_string(),
                format_coordinate(record.get(&config.start_column)),
                format_coordinate(record.get(&config.end_column)),
            );
            record.rename(&config.name_column, HGMD);
            rows.insert(key, record);
        }
        Self { columns, rows }
    }

    /// Load from the TSV at `path`.
    pub fn load<P: AsRef<Path>>(
        config: &CuratedTableConfig,
        path: P,
    ) -> Result<Self, anyhow::Error> {
        let table = Table::read(path.as_ref())?;
        tracing::info!(
            "Loaded {} curated variants from {}",
            table.records.len().separate_with_commas(),
            path.as_ref().display()
        );
        Ok(Self::from_table(config, table))
    }

    /// Left-join the curated columns onto `record`.
    pub fn annotate(&self, record: &mut VariantRecord) {
        let key = (
            record.get("Chr").to_string(),
            record.get("Start").to_string(),
            record.get("End").to_string(),
        );
        let matched = self
            .rows
            .get_vec(&key)
            .map(|rows| rows.iter().collect::<Vec<_>>())
            .unwrap_or_default();
        for (column, value) in squeeze(&self.columns, &matched) {
            record.set(column, value);
        }
    }
}

/// Gene cross-reference table keyed on gene symbol.
#[derive(Debug, Default)]
pub struct XRefTable {
    /// Key column name.
    pub key_column: String,
    /// Non-key columns.
    pub columns: Vec<String>,
    rows: MultiMap<String, VariantRecord>,
}

impl XRefTable {
    pub fn from_table(key_column: &str, table: Table) -> Self {
        let columns = table
            .columns
            .iter()
            .filter(|c| *c != key_column)
            .cloned()
            .collect();
        let mut rows = MultiMap::new();
        for record in table.records {
            rows.insert(record.get(key_column).to_string(), record);
        }
        Self {
            key_column: key_column.to_string(),
            columns,
            rows,
        }
    }

    /// Load from the TSV at `path`.
    pub fn load<P: AsRef<Path>>(key_column: &str, path: P) -> Result<Self, anyhow::Error> {
        let table = Table::read(path.as_ref())?;
        tracing::info!(
            "Loaded {} gene cross-references from {}",
            table.records.len().separate_with_commas(),
            path.as_ref().display()
        );
        Ok(Self::from_table(key_column, table))
    }

    pub fn contains(&self, gene: &str) -> bool {
        self.rows.contains_key(gene)
    }

    /// All rows of the given genes.
    pub fn rows_of<'a, I>(&self, genes: I) -> Vec<&VariantRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        genes
            .into_iter()
            .filter_map(|gene| self.rows.get_vec(gene))
            .flatten()
            .collect()
    }

    /// Squeeze the rows of the `;`-separated genes in `gene_column` onto `record`.
    pub fn annotate(&self, gene_column: &str, record: &mut VariantRecord) {
        let genes = record
            .get(gene_column)
            .split(';')
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        let matched = self.rows_of(genes.iter().map(|s| s.as_str()));
        for (column, value) in squeeze(&self.columns, &matched) {
            record.set(column, value);
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::{
        annofit::conf::CuratedTableConfig,
        common::table::{Table, VariantRecord},
    };

    fn variant(chrom: &str, start: &str, end: &str, genes: &str) -> VariantRecord {
        VariantRecord::from_pairs([
            ("Chr", chrom),
            ("Start", start),
            ("End", end),
            ("Ref", "A"),
            ("Alt", "G"),
            ("AnnoFit.GeneName", genes),
        ])
    }

    #[rstest::rstest]
    #[case(vec![], ".")]
    #[case(vec!["b;a"], "b;a")]
    #[case(vec!["b", ".", "a", "b"], "a;b")]
    fn squeeze(#[case] values: Vec<&str>, #[case] expected: &str) {
        let rows = values
            .iter()
            .map(|v| VariantRecord::from_pairs([("X", *v)]))
            .collect::<Vec<_>>();

        let res = super::squeeze(&["X".to_string()], &rows.iter().collect::<Vec<_>>());

        assert_eq!(res, vec![("X".to_string(), expected.to_string())]);
    }

    #[test]
    fn curated_join() -> Result<(), anyhow::Error> {
        let curated =
            super::CuratedTable::load(&CuratedTableConfig::default(), "tests/data/annofit/hgmd.tsv")?;
        let mut hit = variant("chr1", "1000", "1000", "GENE1");
        let mut miss = variant("chr1", "1001", "1001", "GENE1");

        curated.annotate(&mut hit);
        curated.annotate(&mut miss);

        assert_eq!(hit.get("HGMD"), "CM000001");
        assert_eq!(miss.get("HGMD"), ".");
        assert!(miss.contains("HGMD"));

        Ok(())
    }

    #[test]
    fn xref_squeeze_multiple_genes() -> Result<(), anyhow::Error> {
        let xref = super::XRefTable::load("#Gene_name", "tests/data/annofit/xref.tsv")?;
        let mut both = variant("chr1", "1000", "1000", "GENE1;GENE2");
        let mut unknown = variant("chr1", "1000", "1000", "GENE9");

        xref.annotate("AnnoFit.GeneName", &mut both);
        xref.annotate("AnnoFit.GeneName", &mut unknown);

        assert_eq!(both.get("pLi"), "0.1;0.95");
        assert_eq!(unknown.get("pLi"), ".");
        assert_eq!(unknown.get("Disease_description"), ".");
        assert!(xref.contains("GENE3"));

        Ok(())
    }

    #[test]
    fn curated_coordinates_normalized() {
        let config = CuratedTableConfig::default();
        let table = Table {
            columns: vec![
                config.chrom_column.clone(),
                config.start_column.clone(),
                config.end_column.clone(),
                config.name_column.clone(),
            ],
            records: vec![VariantRecord::from_pairs([
                (config.chrom_column.as_str(), "chr2"),
                (config.start_column.as_str(), " 77"),
                (config.end_column.as_str(), "77"),
                (config.name_column.as_str(), "CM2"),
            ])],
        };
        let curated = super::CuratedTable::from_table(&config, table);
        let mut record = variant("chr2", "77", "77", ".");

        curated.annotate(&mut record);

        assert_eq!(curated.columns, vec!["HGMD"]);
        assert_eq!(record.get("HGMD"), "CM2");
    }
}
