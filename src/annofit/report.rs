//! Final sorting, hyperlinks, gene table and output tables.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use itertools::Itertools;
use rayon::prelude::*;

use crate::{
    annofit::{
        conf::{AnnoFitConfig, COMMENT, GENE_NAME, UCSC},
        filter::genes_of,
        xref::XRefTable,
    },
    common::{
        is_sentinel,
        table::{sort_by_position, Table, VariantRecord},
        GenomeRelease, RunContext, SENTINEL,
    },
};

/// Spreadsheet hyperlink formula.
pub fn hyperlink(url: &str, label: &str) -> String {
    format!("=HYPERLINK(\"{}\", \"{}\")", url, label)
}

/// Link to the dbSNP entry of `rs`, sentinel stays sentinel.
pub fn dbsnp_link(rs: &str) -> String {
    if is_sentinel(rs) {
        SENTINEL.to_string()
    } else {
        hyperlink(&format!("https://www.ncbi.nlm.nih.gov/snp/{}", rs), rs)
    }
}

/// Link to the locus in the UCSC genome browser.
pub fn ucsc_link(release: GenomeRelease, chrom: &str, start: &str, end: &str) -> String {
    hyperlink(
        &format!(
            "https://genome.ucsc.edu/cgi-bin/hgTracks?db={}&position={}%3A{}%2D{}",
            release.ucsc_db(),
            chrom,
            start,
            end
        ),
        &format!("{}:{}", chrom, start),
    )
}

/// GeneCards keyword search over the `;`-separated genes.
pub fn genecards_link(genes: &str) -> String {
    if is_sentinel(genes) {
        return SENTINEL.to_string();
    }
    let symbols = genes.split(';').collect::<Vec<_>>();
    let query = symbols
        .iter()
        .map(|g| format!("%5Baliases%5D(%20{}%20)", g))
        .join("%20OR%20");
    hyperlink(
        &format!(
            "https://www.genecards.org/Search/Keyword?queryString={}&keywords={}",
            query,
            symbols.join(",")
        ),
        genes,
    )
}

/// Assembles the output tables from the filtered variants.
#[derive(Debug)]
pub struct ReportAssembler<'a> {
    config: &'a AnnoFitConfig,
    release: GenomeRelease,
    omim: regex::Regex,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(config: &'a AnnoFitConfig, release: GenomeRelease) -> Result<Self, anyhow::Error> {
        Ok(Self {
            config,
            release,
            omim: regex::Regex::new(r"\[MIM:(\d+)\]")?,
        })
    }

    /// OMIM entry links found in a disease description.
    pub fn omim_links(&self, disease: &str) -> Vec<String> {
        self.omim
            .captures_iter(disease)
            .filter_map(|cap| cap.get(1))
            .map(|m| {
                hyperlink(
                    &format!("https://omim.org/entry/{}", m.as_str()),
                    m.as_str(),
                )
            })
            .collect()
    }

    /// Sort by `(Chr, Start, End)`.
    pub fn sort(&self, records: &mut [VariantRecord]) {
        sort_by_position(records, true);
    }

    /// Replace dbSNP ids and gene names by links and fill the UCSC column.
    pub fn add_hyperlinks(&self, ctx: &RunContext, records: &mut [VariantRecord]) {
        let dbsnp_column = &self.config.dbsnp_column;
        ctx.install(|| {
            records.par_iter_mut().for_each(|record| {
                let dbsnp = dbsnp_link(record.get(dbsnp_column));
                let ucsc = ucsc_link(
                    self.release,
                    record.get("Chr"),
                    record.get("Start"),
                    record.get("End"),
                );
                let genes = genecards_link(record.get(GENE_NAME));
                record.set(dbsnp_column.clone(), dbsnp);
                record.set(UCSC, ucsc);
                record.set(GENE_NAME, genes);
            })
        });
    }

    /// One row per surviving gene known to `xref`, sorted by gene name, with
    /// `OMIM-NN` link columns.
    pub fn gene_table(&self, xref: &XRefTable, records: &[VariantRecord]) -> Table {
        let genes = records
            .iter()
            .flat_map(|r| genes_of(r.get(GENE_NAME)))
            .collect::<BTreeSet<_>>();
        let matched = xref.rows_of(genes.iter().copied());

        let disease_column = &self.config.filter.disease_column;
        let links = matched
            .iter()
            .map(|r| self.omim_links(r.get(disease_column)))
            .collect::<Vec<_>>();
        let max_links = links.iter().map(Vec::len).max().unwrap_or_default();
        let mut columns = self.config.gene_table.clone();
        columns.extend((0..max_links).map(omim_column));

        let records = matched
            .into_iter()
            .zip(links)
            .map(|(row, links)| {
                let mut row = row.restrict(&columns);
                for (idx, link) in links.into_iter().enumerate() {
                    row.set(omim_column(idx), link);
                }
                row
            })
            .collect();
        Table { columns, records }
    }

    /// Rows of `lookup` whose dbSNP id occurs among `records`, one per match,
    /// in variant order.
    pub fn lookup_matches(&self, records: &[VariantRecord], lookup: &Table) -> Table {
        let dbsnp_column = &self.config.dbsnp_column;
        let mut by_id: IndexMap<&str, Vec<&VariantRecord>> = IndexMap::new();
        for row in &lookup.records {
            by_id.entry(row.get(dbsnp_column)).or_default().push(row);
        }
        let columns = std::iter::once(dbsnp_column.clone())
            .chain(lookup.columns.iter().filter(|c| *c != dbsnp_column).cloned())
            .collect::<Vec<_>>();
        let records = records
            .iter()
            .map(|r| r.get(dbsnp_column))
            .filter(|id| !is_sentinel(id))
            .flat_map(|id| by_id.get(id).cloned().unwrap_or_default())
            .map(|row| row.restrict(&columns))
            .collect();
        Table { columns, records }
    }

    /// Variant table with the leading blank comment column.
    pub fn variant_table(&self, records: &[VariantRecord]) -> Table {
        let columns = std::iter::once(COMMENT.to_string())
            .chain(self.config.final_variant.iter().cloned())
            .collect::<Vec<_>>();
        let records = records
            .iter()
            .map(|r| {
                let mut row = r.restrict(&columns);
                row.set_verbatim(COMMENT, "");
                row
            })
            .collect();
        Table { columns, records }
    }
}

/// Name of the `idx`-th OMIM link column.
pub fn omim_column(idx: usize) -> String {
    format!("OMIM-{:02}", idx)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::ReportAssembler;
    use crate::{
        annofit::{conf::AnnoFitConfig, xref::XRefTable},
        common::{
            table::{Table, VariantRecord},
            GenomeRelease, RunContext,
        },
    };

    #[test]
    fn links() {
        insta::assert_snapshot!(
            super::dbsnp_link("rs123"),
            @r#"=HYPERLINK("https://www.ncbi.nlm.nih.gov/snp/rs123", "rs123")"#
        );
        assert_eq!(super::dbsnp_link("."), ".");
        insta::assert_snapshot!(
            super::ucsc_link(GenomeRelease::Grch37, "chr1", "100", "101"),
            @r#"=HYPERLINK("https://genome.ucsc.edu/cgi-bin/hgTracks?db=hg19&position=chr1%3A100%2D101", "chr1:100")"#
        );
        insta::assert_snapshot!(
            super::genecards_link("GENE1;GENE2"),
            @r#"=HYPERLINK("https://www.genecards.org/Search/Keyword?queryString=%5Baliases%5D(%20GENE1%20)%20OR%20%5Baliases%5D(%20GENE2%20)&keywords=GENE1,GENE2", "GENE1;GENE2")"#
        );
        assert_eq!(super::genecards_link("."), ".");
    }

    fn variant(chrom: &str, start: &str, end: &str, genes: &str, rs: &str) -> VariantRecord {
        VariantRecord::from_pairs([
            ("Chr", chrom),
            ("Start", start),
            ("End", end),
            ("Ref", "A"),
            ("Alt", "G"),
            ("AnnoFit.GeneName", genes),
            ("avsnp150", rs),
        ])
    }

    #[test]
    fn sort_is_non_decreasing() -> Result<(), anyhow::Error> {
        let config = AnnoFitConfig::default();
        let assembler = ReportAssembler::new(&config, GenomeRelease::Grch37)?;
        let mut records = vec![
            variant("chr2", "10", "10", ".", "."),
            variant("chr1", "200", "201", ".", "."),
            variant("chr1", "200", "200", ".", "."),
            variant("chr1", "30", "30", ".", "."),
        ];

        assembler.sort(&mut records);

        assert_eq!(
            records
                .iter()
                .map(|r| (r.get("Chr"), r.get("Start"), r.get("End")))
                .collect::<Vec<_>>(),
            vec![
                ("chr1", "30", "30"),
                ("chr1", "200", "200"),
                ("chr1", "200", "201"),
                ("chr2", "10", "10")
            ]
        );

        Ok(())
    }

    #[test]
    fn hyperlinks_fill_ucsc() -> Result<(), anyhow::Error> {
        let ctx = RunContext::new(Some(1))?;
        let config = AnnoFitConfig::default();
        let assembler = ReportAssembler::new(&config, GenomeRelease::Grch38)?;
        let mut records = vec![variant("chr1", "5", "5", "GENE1", "rs1")];

        assembler.add_hyperlinks(&ctx, &mut records);

        assert!(records[0].get("UCSC").contains("db=hg38"));
        assert!(records[0].get("avsnp150").starts_with("=HYPERLINK("));
        assert!(records[0].get("AnnoFit.GeneName").contains("keywords=GENE1"));

        Ok(())
    }

    #[test]
    fn gene_table_with_omim_links() -> Result<(), anyhow::Error> {
        let config = AnnoFitConfig::default();
        let assembler = ReportAssembler::new(&config, GenomeRelease::Grch37)?;
        let xref = XRefTable::load("#Gene_name", "tests/data/annofit/xref.tsv")?;
        let records = vec![
            variant("chr1", "5", "5", "GENE2;GENE9", "."),
            variant("chr1", "6", "6", "GENE1", "."),
            variant("chr1", "7", "7", "GENE2", "."),
        ];

        let table = assembler.gene_table(&xref, &records);

        assert_eq!(
            table
                .records
                .iter()
                .map(|r| r.get("#Gene_name"))
                .collect::<Vec<_>>(),
            vec!["GENE1", "GENE2"]
        );
        assert_eq!(&table.columns[table.columns.len() - 2..], &["OMIM-00", "OMIM-01"]);
        assert_eq!(
            table.records[1].get("OMIM-01"),
            "=HYPERLINK(\"https://omim.org/entry/601494\", \"601494\")"
        );
        assert_eq!(table.records[0].get("OMIM-01"), ".");

        Ok(())
    }

    #[test]
    fn lookup_matches_inner_join() -> Result<(), anyhow::Error> {
        let config = AnnoFitConfig::default();
        let assembler = ReportAssembler::new(&config, GenomeRelease::Grch37)?;
        let lookup = Table::read("tests/data/annofit/lookup.tsv")?;
        let records = vec![
            variant("chr1", "5", "5", ".", "rs3"),
            variant("chr1", "6", "6", ".", "."),
            variant("chr1", "7", "7", ".", "rs1"),
            variant("chr1", "8", "8", ".", "rs999"),
        ];

        let table = assembler.lookup_matches(&records, &lookup);

        assert_eq!(table.columns, vec!["avsnp150", "Trait"]);
        assert_eq!(
            table
                .records
                .iter()
                .map(|r| (r.get("avsnp150"), r.get("Trait")))
                .collect::<Vec<_>>(),
            vec![("rs3", "eye colour"), ("rs1", "lactose tolerance")]
        );

        Ok(())
    }

    #[test]
    fn variant_table_has_blank_comment() -> Result<(), anyhow::Error> {
        let config = AnnoFitConfig::default();
        let assembler = ReportAssembler::new(&config, GenomeRelease::Grch37)?;

        let table = assembler.variant_table(&[variant("chr1", "5", "5", "GENE1", "rs1")]);

        assert_eq!(table.columns[0], "Comment");
        assert_eq!(&table.columns[1..], &config.final_variant[..]);
        assert_eq!(table.records[0].get("Comment"), "");
        assert_eq!(table.records[0].get("AnnoFit.Compound"), ".");

        Ok(())
    }
}
