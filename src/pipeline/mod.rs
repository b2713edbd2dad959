//! Unit-of-work driver running `annovar`, `gff3` and `annofit` with resume.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::{
    annofit::{self, FilteringMode},
    common::{
        self, contigs::ContigIndex, io::open_read_maybe_gz, table::Table, GenomeRelease,
        RunContext,
    },
    curebase::{
        annotator::{
            AnnotationSources, AnnotatorRequestBuilder, AnnovarDatabase, OverlapAnnotator,
            TableAnnovar,
        },
        gff3::DatabaseDescriptor,
        merge_databases, MergeInputs,
    },
    err::AppError,
};

/// The pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Stage {
    #[strum(serialize = "annovar")]
    Annovar,
    #[strum(serialize = "gff3")]
    Gff3,
    #[strum(serialize = "annofit")]
    Annofit,
}

/// Unit-of-work descriptor, persisted as JSON after each completed stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Unit {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(alias = "OutputDir")]
    pub output_dir: String,
    /// Input VCF, possibly gzipped.
    pub vcf: String,
    #[serde(default)]
    pub genome_release: GenomeRelease,
    pub reference_fai: String,
    pub annovar_dir: String,
    /// ANNOVAR database directory, `humandb` in the installation by default.
    #[serde(default)]
    pub annovar_db_dir: Option<String>,
    #[serde(default)]
    pub annovar_databases: Vec<AnnovarDatabase>,
    /// Custom interval databases, skipped when empty.
    #[serde(default)]
    pub gff3: Vec<DatabaseDescriptor>,
    #[serde(default)]
    pub gff3_dir: Option<String>,
    pub hgmd: String,
    pub xref: String,
    #[serde(default)]
    pub lookup: Option<String>,
    #[serde(default)]
    pub annofit_config: Option<String>,
    #[serde(default)]
    pub threads: Option<usize>,
    /// Names of completed stages.
    #[serde(default, alias = "Stage")]
    pub stage: Vec<String>,
}

impl Unit {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path.as_ref())?;
        serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("problem parsing unit {:?}: {}", path.as_ref(), e))
    }

    /// Write to a temporary file next to `path`, then rename it over `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let path = path.as_ref();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| AppError::io(dir, e))?;
        let mut writer = std::io::BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, self)?;
        let tmp = writer
            .into_inner()
            .map_err(|e| AppError::io(path, e.into_error()))?;
        tmp.persist(path).map_err(|e| AppError::io(path, e.error))?;
        Ok(())
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.stage.iter().any(|s| *s == stage.to_string())
    }

    /// `path` with `~` and environment variables expanded.
    fn expand(path: &str) -> Result<PathBuf, anyhow::Error> {
        Ok(PathBuf::from(shellexpand::full(path)?.as_ref()))
    }

    fn output_path(&self, suffix: &str) -> Result<PathBuf, anyhow::Error> {
        Ok(Self::expand(&self.output_dir)?.join(format!("{}.{}", self.id, suffix)))
    }

    /// Intermediate merged annotation table.
    pub fn annovar_table(&self) -> Result<PathBuf, anyhow::Error> {
        self.output_path("annovar.tsv")
    }
}

/// Run `op` unless `stage` is recorded in `unit`; record it and persist the
/// unit to `path_unit` afterwards.  Returns whether `op` ran.
pub fn run_stage<F>(
    path_unit: &Path,
    unit: &mut Unit,
    stage: Stage,
    op: F,
) -> Result<bool, anyhow::Error>
where
    F: FnOnce(&Unit) -> Result<(), anyhow::Error>,
{
    if unit.is_done(stage) {
        tracing::info!("Stage {} already done, skipping", stage);
        return Ok(false);
    }
    let before_stage = Instant::now();
    tracing::info!("Running stage {}...", stage);
    op(unit).with_context(|| format!("stage {} failed", stage))?;
    unit.stage.push(stage.to_string());
    unit.save(path_unit)?;
    tracing::info!("... done with stage {} in {:?}", stage, before_stage.elapsed());
    Ok(true)
}

/// Command line arguments for `pipeline run` sub command.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Run the annotation pipeline for one unit", long_about = None)]
pub struct Args {
    /// Path to the unit descriptor JSON, updated in place.
    #[arg(long)]
    pub path_unit: String,
    /// Filtering mode of the final stage.
    #[arg(long, value_enum, default_value_t = FilteringMode::Full)]
    pub filtering: FilteringMode,
    /// Set the number of threads to use, overrides the unit.
    #[arg(long)]
    pub num_threads: Option<usize>,
}

fn stage_annovar(ctx: &RunContext, unit: &Unit) -> Result<(), anyhow::Error> {
    let annovar_dir = Unit::expand(&unit.annovar_dir)?;
    let db_dir = match &unit.annovar_db_dir {
        Some(path) => Unit::expand(path)?,
        None => annovar_dir.join("humandb"),
    };
    let request = AnnotatorRequestBuilder::default()
        .variants(Unit::expand(&unit.vcf)?)
        .db_dir(db_dir)
        .release(unit.genome_release)
        .sources(AnnotationSources {
            databases: unit.annovar_databases.clone(),
            gff3_files: Vec::new(),
        })
        .output(unit.annovar_table()?)
        .build()?;
    TableAnnovar::new(annovar_dir).annotate(ctx, &request)
}

fn stage_gff3(ctx: &RunContext, unit: &Unit) -> Result<(), anyhow::Error> {
    let annovar = TableAnnovar::new(Unit::expand(&unit.annovar_dir)?);
    let db_dir = match &unit.gff3_dir {
        Some(path) => Unit::expand(path)?,
        None => PathBuf::from("."),
    };
    let reference_fai = Unit::expand(&unit.reference_fai)?;
    let contigs = ContigIndex::from_path(&reference_fai)?;
    let path_table = unit.annovar_table()?;
    let primary = Table::read(&path_table)?;
    let merged = merge_databases(
        ctx,
        &annovar,
        &MergeInputs {
            databases: &unit.gff3,
            db_dir: &db_dir,
            contigs: &contigs,
            reference_name: &format!("{}", reference_fai.display()),
            variants: &Unit::expand(&unit.vcf)?,
            release: unit.genome_release,
        },
        primary,
    )?;
    merged.write(&path_table)
}

fn stage_annofit(
    args_common: &common::Args,
    unit: &Unit,
    filtering: FilteringMode,
    num_threads: Option<usize>,
) -> Result<(), anyhow::Error> {
    let path = |p: &PathBuf| format!("{}", p.display());
    let (variants, genes, lookup) = match filtering {
        FilteringMode::Full => (
            unit.output_path("variants.tsv")?,
            Some(path(&unit.output_path("genes.tsv")?)),
            None,
        ),
        FilteringMode::PassThrough => (
            unit.output_path("variants.unfiltered.tsv")?,
            None,
            Some(path(&unit.output_path("lookup.tsv")?)),
        ),
    };
    let args = annofit::Args {
        path_input: path(&unit.annovar_table()?),
        path_config: unit
            .annofit_config
            .as_deref()
            .map(Unit::expand)
            .transpose()?
            .map(|p| path(&p)),
        path_hgmd: path(&Unit::expand(&unit.hgmd)?),
        path_xref: path(&Unit::expand(&unit.xref)?),
        path_output_variants: path(&variants),
        path_output_genes: genes,
        path_lookup: unit
            .lookup
            .as_deref()
            .map(Unit::expand)
            .transpose()?
            .map(|p| path(&p)),
        path_output_lookup: lookup,
        filtering,
        genome_release: unit.genome_release,
        num_threads,
    };
    annofit::run(args_common, &args)
}

/// Main entry point for `pipeline run` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let path_unit = PathBuf::from(&args.path_unit);
    let mut unit = Unit::load(&path_unit)?;
    let num_threads = args.num_threads.or(unit.threads);
    let ctx = RunContext::new(num_threads)?;
    std::fs::create_dir_all(Unit::expand(&unit.output_dir)?)
        .map_err(|e| AppError::io(&unit.output_dir, e))?;

    run_stage(&path_unit, &mut unit, Stage::Annovar, |unit| {
        stage_annovar(&ctx, unit)
    })?;
    if unit.gff3.is_empty() {
        tracing::info!("No custom databases, skipping stage {}", Stage::Gff3);
    } else {
        run_stage(&path_unit, &mut unit, Stage::Gff3, |unit| stage_gff3(&ctx, unit))?;
    }
    run_stage(&path_unit, &mut unit, Stage::Annofit, |unit| {
        stage_annofit(args_common, unit, args.filtering, num_threads)
    })?;

    tracing::info!(
        "All of `pipeline run` for {} completed in {:?}",
        &unit.id,
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use super::{Stage, Unit};

    fn unit() -> Unit {
        Unit {
            id: String::from("S1"),
            output_dir: String::from("/tmp/out"),
            vcf: String::from("S1.vcf.gz"),
            reference_fai: String::from("ref.fa.fai"),
            annovar_dir: String::from("~/annovar"),
            hgmd: String::from("hgmd.tsv"),
            xref: String::from("xref.tsv"),
            ..Default::default()
        }
    }

    #[test]
    fn second_run_skips_done_stages() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path_unit = tmp_dir.join("unit.json");
        let mut unit = unit();
        let calls = Cell::new(0);

        let ran = super::run_stage(&path_unit, &mut unit, Stage::Annovar, |_| {
            calls.set(calls.get() + 1);
            Ok(())
        })?;
        assert!(ran);

        let mut reloaded = Unit::load(&path_unit)?;
        assert_eq!(reloaded.stage, vec!["annovar"]);
        let ran = super::run_stage(&path_unit, &mut reloaded, Stage::Annovar, |_| {
            calls.set(calls.get() + 1);
            Ok(())
        })?;

        assert!(!ran);
        assert_eq!(calls.get(), 1);

        Ok(())
    }

    #[test]
    fn failed_stage_is_not_recorded() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path_unit = tmp_dir.join("unit.json");
        let mut unit = unit();

        let res = super::run_stage(&path_unit, &mut unit, Stage::Gff3, |_| {
            anyhow::bail!("boom")
        });

        assert!(res.is_err());
        assert!(!unit.is_done(Stage::Gff3));
        assert!(!path_unit.exists());

        Ok(())
    }

    #[test]
    fn save_replaces_unit_in_place() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path_unit = tmp_dir.join("unit.json");
        std::fs::write(&path_unit, "{ truncated")?;
        let mut unit = unit();
        unit.stage = vec![String::from("annovar"), String::from("gff3")];

        unit.save(&path_unit)?;

        assert_eq!(Unit::load(&path_unit)?, unit);
        let entries = std::fs::read_dir(&*tmp_dir)?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(entries, vec![std::ffi::OsString::from("unit.json")]);

        Ok(())
    }

    #[test]
    fn load_accepts_pascal_case_keys() -> Result<(), anyhow::Error> {
        let tmp_dir = TempDir::default();
        let path_unit = tmp_dir.join("unit.json");
        std::fs::write(
            &path_unit,
            r#"{"ID": "S2", "OutputDir": "/data/S2", "vcf": "S2.vcf", "reference_fai": "r.fai",
                "annovar_dir": "/opt/annovar", "hgmd": "h.tsv", "xref": "x.tsv",
                "genome_release": "grch38", "Stage": ["annovar"]}"#,
        )?;

        let unit = Unit::load(&path_unit)?;

        assert_eq!(unit.id, "S2");
        assert_eq!(unit.genome_release, crate::common::GenomeRelease::Grch38);
        assert!(unit.is_done(Stage::Annovar));
        assert!(!unit.is_done(Stage::Annofit));
        assert_eq!(
            unit.annovar_table()?,
            std::path::PathBuf::from("/data/S2/S2.annovar.tsv")
        );

        Ok(())
    }
}
