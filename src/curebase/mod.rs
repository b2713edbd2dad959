//! Custom interval databases ("curebase"): encoding, overlap, decoding and merge.

pub mod annotator;
pub mod decode;
pub mod gff3;
pub mod payload;

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use clap::Parser;
use thousands::Separable;

use crate::{
    common::{self, contigs::ContigIndex, table::Table, trace_rss_now, GenomeRelease, RunContext},
    err::AppError,
};

use self::{
    annotator::{
        overlap_column_name, AnnotationSources, AnnotatorRequestBuilder, IntervalTreeAnnotator,
        OverlapAnnotator, TableAnnovar,
    },
    decode::DecodeSpec,
    gff3::DatabaseDescriptor,
};

/// Load database descriptors from a JSON file holding a list.
pub fn load_descriptors<P: AsRef<Path>>(path: P) -> Result<Vec<DatabaseDescriptor>, anyhow::Error> {
    let reader = common::io::open_read_maybe_gz(path.as_ref())?;
    serde_json::from_reader(reader)
        .map_err(|e| anyhow::anyhow!("problem parsing databases {:?}: {}", path.as_ref(), e))
}

/// Inputs of one database merge.
#[derive(Debug, Clone)]
pub struct MergeInputs<'a> {
    /// The databases to merge.
    pub databases: &'a [DatabaseDescriptor],
    /// Directory the database source files are relative to.
    pub db_dir: &'a Path,
    /// Reference contigs.
    pub contigs: &'a ContigIndex,
    /// Reference name for error messages.
    pub reference_name: &'a str,
    /// Variant positions handed to the annotator.
    pub variants: &'a Path,
    pub release: GenomeRelease,
}

/// Encode all databases, run `annotator` once and left-join the decoded
/// columns onto `primary`.
pub fn merge_databases(
    ctx: &RunContext,
    annotator: &dyn OverlapAnnotator,
    inputs: &MergeInputs,
    primary: Table,
) -> Result<Table, anyhow::Error> {
    if inputs.databases.is_empty() {
        return Err(AppError::Config(String::from("no custom databases given")).into());
    }
    let tmp_dir = tempfile::tempdir().map_err(|e| AppError::io(std::env::temp_dir(), e))?;

    tracing::info!("Encoding {} databases ...", inputs.databases.len());
    let before_encode = Instant::now();
    let mut gff3_files = Vec::new();
    let mut specs = Vec::new();
    for (index, descriptor) in inputs.databases.iter().enumerate() {
        let encoded = gff3::load_and_encode(
            ctx,
            descriptor,
            inputs.db_dir,
            inputs.contigs,
            inputs.reference_name,
        )?;
        let file_name = format!("database_{}.gff3", index);
        encoded.write_to_path(tmp_dir.path().join(&file_name))?;
        gff3_files.push(file_name);
        specs.push(DecodeSpec::new(
            descriptor.name.clone(),
            overlap_column_name(index),
            encoded.expected_columns,
        ));
    }
    tracing::info!("... done encoding in {:?}", before_encode.elapsed());

    let before_annotate = Instant::now();
    let request = AnnotatorRequestBuilder::default()
        .variants(inputs.variants.to_path_buf())
        .db_dir(tmp_dir.path().to_path_buf())
        .release(inputs.release)
        .sources(AnnotationSources {
            databases: vec![],
            gff3_files,
        })
        .output(tmp_dir.path().join("temp.tsv"))
        .build()?;
    annotator.annotate(ctx, &request)?;
    let overlaps = Table::read(&request.output)?;
    tracing::info!(
        "... {} annotated {} variants in {:?}",
        annotator.name(),
        overlaps.records.len().separate_with_commas(),
        before_annotate.elapsed()
    );

    let decoded = decode::decode_table(ctx, &overlaps, &specs);
    let merged = decode::left_join(primary, &decoded);
    trace_rss_now();
    Ok(merged)
}

/// Overlap backend selection.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnnotatorKind {
    /// ANNOVAR `table_annovar.pl` on the input VCF.
    #[default]
    Annovar,
    /// In-process interval trees on the annotation table.
    IntervalTree,
}

/// Command line arguments for `anno merge` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Merge custom interval databases into an annotation table", long_about = None)]
pub struct Args {
    /// Path to the JSON list of database descriptors.
    #[arg(long)]
    pub path_databases: String,
    /// Directory the database files are relative to, defaults to the descriptor's directory.
    #[arg(long)]
    pub path_db_dir: Option<String>,
    /// Path to the reference sequence index (`.fai`).
    #[arg(long)]
    pub path_reference_fai: String,
    /// Path to the annotation table to enrich.
    #[arg(long)]
    pub path_annotation: String,
    /// Path to the input VCF (required for ANNOVAR).
    #[arg(long)]
    pub path_vcf: Option<String>,
    /// Path to the output table.
    #[arg(long)]
    pub path_output: String,
    /// Overlap backend.
    #[arg(long, value_enum, default_value_t = AnnotatorKind::Annovar)]
    pub annotator: AnnotatorKind,
    /// Path to the ANNOVAR installation.
    #[arg(long)]
    pub path_annovar: Option<String>,
    /// Genome release.
    #[arg(long, value_enum, default_value_t = GenomeRelease::Grch37)]
    pub genome_release: GenomeRelease,
    /// Set the number of threads to use, defaults to number of cores.
    #[arg(long)]
    pub num_threads: Option<usize>,
}

/// Build the annotator selected by `kind`.
pub fn make_annotator(
    kind: AnnotatorKind,
    path_annovar: Option<&str>,
) -> Result<Box<dyn OverlapAnnotator>, anyhow::Error> {
    match kind {
        AnnotatorKind::Annovar => {
            let path = path_annovar.ok_or_else(|| {
                AppError::Config(String::from("ANNOVAR annotator requires --path-annovar"))
            })?;
            Ok(Box::new(TableAnnovar::new(path)))
        }
        AnnotatorKind::IntervalTree => Ok(Box::new(IntervalTreeAnnotator)),
    }
}

/// Main entry point for `anno merge` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let databases = load_descriptors(&args.path_databases)?;
    let db_dir = match &args.path_db_dir {
        Some(path) => PathBuf::from(path),
        None => Path::new(&args.path_databases)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };
    let annotator = make_annotator(args.annotator, args.path_annovar.as_deref())?;
    let variants = match args.annotator {
        AnnotatorKind::Annovar => args.path_vcf.clone().ok_or_else(|| {
            AppError::Config(String::from("ANNOVAR annotator requires --path-vcf"))
        })?,
        AnnotatorKind::IntervalTree => args.path_annotation.clone(),
    };

    let ctx = RunContext::new(args.num_threads)?;
    let contigs = ContigIndex::from_path(&args.path_reference_fai)?;
    let primary = Table::read(&args.path_annotation)?;
    tracing::info!(
        "Loaded {} annotated variants",
        primary.records.len().separate_with_commas()
    );

    let merged = merge_databases(
        &ctx,
        annotator.as_ref(),
        &MergeInputs {
            databases: &databases,
            db_dir: &db_dir,
            contigs: &contigs,
            reference_name: &args.path_reference_fai,
            variants: Path::new(&variants),
            release: args.genome_release,
        },
        primary,
    )?;
    merged.write(&args.path_output)?;

    tracing::info!(
        "All of `anno merge` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{gff3::DatabaseDescriptor, MergeInputs};
    use crate::common::{contigs::ContigIndex, table::Table, GenomeRelease, RunContext};

    #[test]
    fn load_descriptors() -> Result<(), anyhow::Error> {
        let descriptors = super::load_descriptors("tests/data/curebase/databases.json")?;

        assert_eq!(
            descriptors,
            vec![
                DatabaseDescriptor::new(
                    "dbA".into(),
                    "dbA.tsv".into(),
                    "Chr".into(),
                    "Start".into(),
                    "End".into()
                ),
                DatabaseDescriptor::new(
                    "dbB".into(),
                    "dbB.tsv".into(),
                    "chrom".into(),
                    "begin".into(),
                    "end".into()
                ),
            ]
        );

        Ok(())
    }

    #[test]
    fn merge_two_databases_end_to_end() -> Result<(), anyhow::Error> {
        let ctx = RunContext::new(Some(2))?;
        let db_dir = Path::new("tests/data/curebase");
        let databases = super::load_descriptors(db_dir.join("databases.json"))?;
        let contigs = ContigIndex::from_path(db_dir.join("ref.fa.fai"))?;
        let variants = db_dir.join("variants.tsv");
        let primary = Table::read(&variants)?;

        let merged = super::merge_databases(
            &ctx,
            &super::IntervalTreeAnnotator,
            &MergeInputs {
                databases: &databases,
                db_dir,
                contigs: &contigs,
                reference_name: "ref.fa",
                variants: &variants,
                release: GenomeRelease::Grch38,
            },
            primary,
        )?;

        assert_eq!(merged.records.len(), 1);
        let record = &merged.records[0];
        assert_eq!(record.get("dbA.tier"), "1");
        assert_eq!(record.get("dbB"), ".");
        assert!(record.contains("dbB"));
        assert_eq!(record.get("Func.refGene"), "exonic");

        Ok(())
    }

    #[test]
    fn empty_database_list_is_config_error() -> Result<(), anyhow::Error> {
        let ctx = RunContext::new(Some(1))?;
        let contigs = ContigIndex::default();

        let res = super::merge_databases(
            &ctx,
            &super::IntervalTreeAnnotator,
            &MergeInputs {
                databases: &[],
                db_dir: Path::new("."),
                contigs: &contigs,
                reference_name: "ref.fa",
                variants: Path::new("variants.tsv"),
                release: GenomeRelease::Grch37,
            },
            Table::default(),
        );

        assert!(matches!(
            res.expect_err("must fail").downcast_ref::<crate::err::AppError>(),
            Some(crate::err::AppError::Config(_))
        ));

        Ok(())
    }

    #[test]
    fn annovar_requires_path() {
        assert!(super::make_annotator(super::AnnotatorKind::Annovar, None).is_err());
        assert!(super::make_annotator(super::AnnotatorKind::IntervalTree, None).is_ok());
    }
}
