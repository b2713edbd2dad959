//! Normalize, enrich, filter and report an ANNOVAR-style annotation table.

pub mod conf;
pub mod filter;
pub mod normalize;
pub mod report;
pub mod xref;

use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    common::{
        self,
        table::{Table, TableChunks, VariantRecord},
        trace_rss_now, GenomeRelease, RunContext, SENTINEL,
    },
    err::AppError,
};

use self::{
    conf::{AnnoFitConfig, GENE_NAME},
    filter::{compute_compound, FilterEngine},
    report::ReportAssembler,
    xref::{CuratedTable, XRefTable},
};

/// Whether the two filter stages are applied.
#[derive(
    clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum FilteringMode {
    /// Apply both stages and write the gene table.
    #[default]
    Full,
    /// Keep every variant and write the lookup matches.
    PassThrough,
}

/// Command line arguments for `anno fit` sub command.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Normalize, filter and report annotated variants", long_about = None)]
pub struct Args {
    /// Path to the merged annotation table.
    #[arg(long)]
    pub path_input: String,
    /// Path to a JSON configuration, compiled-in defaults otherwise.
    #[arg(long)]
    pub path_config: Option<String>,
    /// Path to the curated pathogenic variant table.
    #[arg(long)]
    pub path_hgmd: String,
    /// Path to the gene cross-reference table.
    #[arg(long)]
    pub path_xref: String,
    /// Path to the output variant table.
    #[arg(long)]
    pub path_output_variants: String,
    /// Path to the output gene table, required when filtering.
    #[arg(long)]
    pub path_output_genes: Option<String>,
    /// Path to the lookup list, required in pass-through mode.
    #[arg(long)]
    pub path_lookup: Option<String>,
    /// Path to the output lookup matches, required in pass-through mode.
    #[arg(long)]
    pub path_output_lookup: Option<String>,
    /// Filtering mode.
    #[arg(long, value_enum, default_value_t = FilteringMode::Full)]
    pub filtering: FilteringMode,
    /// Genome release.
    #[arg(long, value_enum, default_value_t = GenomeRelease::Grch37)]
    pub genome_release: GenomeRelease,
    /// Set the number of threads to use, defaults to number of cores.
    #[arg(long)]
    pub num_threads: Option<usize>,
}

/// Where the second output table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SecondaryOutput {
    Genes { path_output: String },
    Lookup { path_lookup: String, path_output: String },
}

impl SecondaryOutput {
    fn from_args(args: &Args) -> Result<Self, AppError> {
        match args.filtering {
            FilteringMode::Full => args
                .path_output_genes
                .clone()
                .map(|path_output| Self::Genes { path_output })
                .ok_or_else(|| AppError::Config(String::from("filtering requires --path-output-genes"))),
            FilteringMode::PassThrough => match (&args.path_lookup, &args.path_output_lookup) {
                (Some(path_lookup), Some(path_output)) => Ok(Self::Lookup {
                    path_lookup: path_lookup.clone(),
                    path_output: path_output.clone(),
                }),
                _ => Err(AppError::Config(String::from(
                    "pass-through mode requires --path-lookup and --path-output-lookup",
                ))),
            },
        }
    }
}

/// Read the input in chunks, normalize and enrich each chunk and apply the
/// row-local stage if `filtering`.
pub fn process_chunks(
    ctx: &RunContext,
    config: &AnnoFitConfig,
    curated: &CuratedTable,
    xref: &XRefTable,
    engine: Option<&FilterEngine>,
    path_input: &str,
) -> Result<Vec<VariantRecord>, anyhow::Error> {
    let mut result = Vec::new();
    let mut total = 0usize;
    let chunks = TableChunks::open(std::path::Path::new(path_input), config.chunk_size)?;
    for (idx, chunk) in chunks.enumerate() {
        let chunk = chunk?;
        total += chunk.len();
        let mut records = normalize::normalize_chunk(ctx, config, chunk);
        ctx.install(|| {
            records.par_iter_mut().for_each(|record| {
                curated.annotate(record);
                xref.annotate(GENE_NAME, record);
            })
        });
        let records = match engine {
            Some(engine) => engine.stage1(ctx, records),
            None => records,
        };
        tracing::debug!(
            "chunk {}: {} records kept, {} read so far",
            idx,
            records.len().separate_with_commas(),
            total.separate_with_commas()
        );
        result.extend(records);
    }
    tracing::info!(
        "Kept {} of {} records after normalization",
        result.len().separate_with_commas(),
        total.separate_with_commas()
    );
    Ok(result)
}

/// Main entry point for `anno fit` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let secondary = SecondaryOutput::from_args(args)?;
    let config = match &args.path_config {
        Some(path) => AnnoFitConfig::load(path)?,
        None => AnnoFitConfig::default(),
    };
    let ctx = RunContext::new(args.num_threads)?;

    tracing::info!("Loading lookup tables...");
    let before_loading = Instant::now();
    let curated = CuratedTable::load(&config.curated, &args.path_hgmd)?;
    let xref = XRefTable::load(&config.xref_key, &args.path_xref)?;
    tracing::info!("... done loading in {:?}", before_loading.elapsed());

    let engine = FilterEngine::new(&config.filter)?;
    let filtering = args.filtering == FilteringMode::Full;

    tracing::info!("Normalizing {}...", &args.path_input);
    let before_normalize = Instant::now();
    let mut records = process_chunks(
        &ctx,
        &config,
        &curated,
        &xref,
        filtering.then_some(&engine),
        &args.path_input,
    )?;
    tracing::info!("... done normalizing in {:?}", before_normalize.elapsed());
    trace_rss_now();

    if filtering {
        compute_compound(
            &ctx,
            &mut records,
            &config.filter.gene_column,
            &config.filter.compound_column,
        );
        records = engine.stage2(&ctx, records);
    } else {
        records
            .iter_mut()
            .for_each(|record| record.set(&config.filter.compound_column, SENTINEL));
    }

    let assembler = ReportAssembler::new(&config, args.genome_release)?;
    assembler.sort(&mut records);
    match &secondary {
        SecondaryOutput::Genes { path_output } => {
            let genes = assembler.gene_table(&xref, &records);
            assembler.add_hyperlinks(&ctx, &mut records);
            genes.write(path_output)?;
            tracing::info!(
                "Wrote {} genes to {}",
                genes.records.len().separate_with_commas(),
                path_output
            );
        }
        SecondaryOutput::Lookup {
            path_lookup,
            path_output,
        } => {
            let lookup = Table::read(path_lookup)?;
            let matches = assembler.lookup_matches(&records, &lookup);
            matches.write(path_output)?;
            tracing::info!(
                "Wrote {} lookup matches to {}",
                matches.records.len().separate_with_commas(),
                path_output
            );
        }
    }
    let variants = assembler.variant_table(&records);
    variants.write(&args.path_output_variants)?;
    tracing::info!(
        "Wrote {} variants to {}",
        variants.records.len().separate_with_commas(),
        &args.path_output_variants
    );

    trace_rss_now();
    tracing::info!(
        "All of `anno fit` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use super::{Args, FilteringMode};
    use crate::{
        common::{self, table::Table, GenomeRelease},
        err::AppError,
    };

    fn args(tmp_dir: &TempDir, filtering: FilteringMode) -> Args {
        Args {
            path_input: String::from("tests/data/annofit/annovar.tsv"),
            path_config: Some(String::from("tests/data/annofit/config.json")),
            path_hgmd: String::from("tests/data/annofit/hgmd.tsv"),
            path_xref: String::from("tests/data/annofit/xref.tsv"),
            path_output_variants: format!("{}", tmp_dir.join("variants.tsv").display()),
            path_output_genes: Some(format!("{}", tmp_dir.join("genes.tsv").display())),
            path_lookup: Some(String::from("tests/data/annofit/lookup.tsv")),
            path_output_lookup: Some(format!("{}", tmp_dir.join("lookup.tsv").display())),
            filtering,
            genome_release: GenomeRelease::Grch37,
            num_threads: Some(2),
        }
    }

    #[test]
    fn run_filtering() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let args = args(&tmp_dir, FilteringMode::Full);

        super::run(&common::Args::default(), &args)?;

        let variants = Table::read(tmp_dir.join("variants.tsv"))?;
        assert_eq!(variants.columns[0], "Comment");
        assert_eq!(
            variants
                .records
                .iter()
                .map(|r| (r.get("Start"), r.get("AnnoFit.Compound")))
                .collect::<Vec<_>>(),
            vec![("100", "1"), ("700", "1")]
        );
        assert!(variants.records[0].get("UCSC").contains("db=hg19"));
        assert!(variants.records[0]
            .get("AnnoFit.GeneName")
            .starts_with("=HYPERLINK("));

        let genes = Table::read(tmp_dir.join("genes.tsv"))?;
        assert_eq!(
            genes
                .records
                .iter()
                .map(|r| r.get("#Gene_name"))
                .collect::<Vec<_>>(),
            vec!["GENE1"]
        );
        assert!(genes.columns.contains(&String::from("OMIM-00")));
        assert!(!tmp_dir.join("lookup.tsv").exists());

        Ok(())
    }

    #[test]
    fn run_pass_through() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let args = args(&tmp_dir, FilteringMode::PassThrough);

        super::run(&common::Args::default(), &args)?;

        let variants = Table::read(tmp_dir.join("variants.tsv"))?;
        assert_eq!(
            variants
                .records
                .iter()
                .map(|r| (r.get("Chr"), r.get("Start"), r.get("AnnoFit.Compound")))
                .collect::<Vec<_>>(),
            vec![
                ("chr1", "100", "."),
                ("chr1", "300", "."),
                ("chr1", "500", "."),
                ("chr1", "700", "."),
                ("chr2", "900", "."),
            ]
        );
        assert_eq!(variants.records[0].get("UCSC"), ".");

        let lookup = Table::read(tmp_dir.join("lookup.tsv"))?;
        assert_eq!(
            lookup
                .records
                .iter()
                .map(|r| r.get("Trait"))
                .collect::<Vec<_>>(),
            vec!["lactose tolerance", "eye colour", "height"]
        );
        assert!(!tmp_dir.join("genes.tsv").exists());

        Ok(())
    }

    #[test]
    fn pass_through_requires_lookup() {
        let tmp_dir = TempDir::default();
        let mut args = args(&tmp_dir, FilteringMode::PassThrough);
        args.path_lookup = None;

        let err = super::run(&common::Args::default(), &args).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AppError>(),
            Some(AppError::Config(_))
        ));
    }
}
