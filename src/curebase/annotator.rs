//! Positional overlap annotators.
//!
//! An annotator takes a set of variant positions plus interval sources and
//! writes a tab-separated table with one overlap column per source.

use std::{
    collections::HashMap,
    fs::File,
    io::BufRead,
    path::{Path, PathBuf},
    process::Command,
    time::Instant,
};

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    common::{
        io::open_read_maybe_gz,
        parse_int,
        table::{write_records, Table, VariantRecord, KEY_COLUMNS},
        GenomeRelease, RunContext, SENTINEL,
    },
    curebase::payload::ID_TAG,
    err::AppError,
};

/// Exit code of `table_annovar.pl` when no variant was annotated.
pub const NO_VARIANTS_ANNOTATED: i32 = 25;

/// One ANNOVAR database with its operation code (`g`, `r`, `f`, ...).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct AnnovarDatabase {
    #[serde(alias = "Protocol")]
    pub protocol: String,
    #[serde(alias = "Operation")]
    pub operation: String,
}

/// The interval sources of one annotator call.
///
/// Exactly one of the two lists must be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnnotationSources {
    /// Native ANNOVAR databases.
    #[serde(default)]
    pub databases: Vec<AnnovarDatabase>,
    /// GFF3 files, relative to the database directory.
    #[serde(default)]
    pub gff3_files: Vec<String>,
}

impl AnnotationSources {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.databases.is_empty() == self.gff3_files.is_empty() {
            Err(AppError::Config(String::from(
                "either ANNOVAR databases or GFF3 files must be defined, not both",
            )))
        } else {
            Ok(())
        }
    }

    /// Value of `--protocol`.
    pub fn protocol(&self) -> String {
        self.databases
            .iter()
            .map(|db| db.protocol.as_str())
            .chain(self.gff3_files.iter().map(|_| "gff3"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Value of `--operation`.
    pub fn operation(&self) -> String {
        self.databases
            .iter()
            .map(|db| db.operation.as_str())
            .chain(self.gff3_files.iter().map(|_| "r"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Name of the overlap column for the GFF3 source at `index`: `gff3`, `gff32`, ...
pub fn overlap_column_name(index: usize) -> String {
    if index == 0 {
        String::from("gff3")
    } else {
        format!("gff3{}", index + 1)
    }
}

/// Parameters of one annotator call.
#[derive(Debug, Clone, derive_builder::Builder)]
#[builder(pattern = "owned")]
pub struct AnnotatorRequest {
    /// Variant positions (VCF for ANNOVAR, variant table for in-process overlap).
    pub variants: PathBuf,
    /// Directory holding the database files.
    pub db_dir: PathBuf,
    #[builder(default)]
    pub release: GenomeRelease,
    pub sources: AnnotationSources,
    /// Path of the resulting table.
    pub output: PathBuf,
}

/// Interface to a positional overlap annotator.
pub trait OverlapAnnotator {
    /// Short name for log messages.
    fn name(&self) -> &str;

    /// Run the annotator and write its table to `request.output`.
    fn annotate(&self, ctx: &RunContext, request: &AnnotatorRequest) -> Result<(), anyhow::Error>;
}

/// Wrapper around ANNOVAR's `table_annovar.pl`.
#[derive(Debug, Clone)]
pub struct TableAnnovar {
    /// ANNOVAR installation directory.
    pub annovar_dir: PathBuf,
    /// Interpreter used to run the script.
    pub perl: String,
    /// Non-zero exit codes that do not count as failure.
    pub allowed_codes: Vec<i32>,
}

impl TableAnnovar {
    pub fn new<P: AsRef<Path>>(annovar_dir: P) -> Self {
        Self {
            annovar_dir: annovar_dir.as_ref().to_path_buf(),
            perl: String::from("perl"),
            allowed_codes: vec![NO_VARIANTS_ANNOTATED],
        }
    }

    /// Arguments passed to the interpreter.
    pub fn command_args(
        &self,
        request: &AnnotatorRequest,
        vcf_path: &Path,
        num_threads: usize,
    ) -> Vec<String> {
        let mut args = vec![
            self.annovar_dir
                .join("table_annovar.pl")
                .display()
                .to_string(),
            vcf_path.display().to_string(),
            request.db_dir.display().to_string(),
            String::from("--buildver"),
            request.release.annovar_alias().to_string(),
            String::from("--protocol"),
            request.sources.protocol(),
            String::from("--operation"),
            request.sources.operation(),
        ];
        if !request.sources.gff3_files.is_empty() {
            args.push(String::from("--gff3dbfile"));
            args.push(request.sources.gff3_files.join(","));
        }
        args.extend([
            String::from("--remove"),
            String::from("--vcfinput"),
            String::from("--thread"),
            num_threads.to_string(),
        ]);
        args
    }
}

impl OverlapAnnotator for TableAnnovar {
    fn name(&self) -> &str {
        "ANNOVAR"
    }

    fn annotate(&self, ctx: &RunContext, request: &AnnotatorRequest) -> Result<(), anyhow::Error> {
        request.sources.validate()?;
        let before = Instant::now();
        tracing::info!("Input VCF: {}", request.variants.display());
        tracing::info!("Output TSV: {}", request.output.display());
        tracing::info!("Genome Assembly: {}", request.release.annovar_alias());
        tracing::info!("Databases Dir: {}", request.db_dir.display());
        tracing::info!(
            "Protocols: {} [{}]",
            request.sources.protocol(),
            request.sources.operation()
        );

        let tmp_dir = tempfile::tempdir().map_err(|e| AppError::io(std::env::temp_dir(), e))?;
        let vcf_path = tmp_dir.path().join("temp.vcf");
        {
            let mut reader = open_read_maybe_gz(&request.variants)?;
            let mut writer = File::create(&vcf_path).map_err(|e| AppError::io(&vcf_path, e))?;
            std::io::copy(&mut reader, &mut writer).map_err(|e| AppError::io(&vcf_path, e))?;
        }

        let args = self.command_args(request, &vcf_path, ctx.pool.current_num_threads());
        let command = format!("{} {}", &self.perl, args.join(" "));
        tracing::debug!("Running {}", &command);
        let output = Command::new(&self.perl)
            .args(&args)
            .output()
            .map_err(|e| AppError::ExternalTool {
                name: self.name().to_string(),
                code: -1,
                command: command.clone(),
                stderr: e.to_string(),
            })?;
        let code = output.status.code().unwrap_or(-1);
        if !output.status.success() && !self.allowed_codes.contains(&code) {
            return Err(AppError::ExternalTool {
                name: self.name().to_string(),
                code,
                command,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }

        let annotated = tmp_dir.path().join(format!(
            "temp.vcf.{}_multianno.txt",
            request.release.annovar_alias()
        ));
        if annotated.exists() {
            std::fs::copy(&annotated, &request.output)
                .map_err(|e| AppError::io(&request.output, e))?;
        } else {
            tracing::warn!(
                "{} exited with code {} and wrote no table; writing empty table",
                self.name(),
                code
            );
            let columns = KEY_COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            write_records(&request.output, &columns, &[])?;
        }

        tracing::info!("... {} done in {:?}", self.name(), before.elapsed());
        Ok(())
    }
}

/// Alias for the interval tree that we use; data is the hex payload.
type IntervalTree = ArrayBackedIntervalTree<i64, String>;

/// Intervals of one GFF3 file, stored by contig.
#[derive(Debug, Default)]
pub(crate) struct OverlapDb {
    trees: HashMap<String, IntervalTree>,
}

impl OverlapDb {
    fn from_path(path: &Path) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path)?;
        Self::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("problem reading GFF3 {:?}: {}", path, e))
    }

    pub(crate) fn from_reader<R: BufRead>(reader: R) -> Result<Self, anyhow::Error> {
        let mut trees: HashMap<String, IntervalTree> = HashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.starts_with('#') || line.trim().is_empty() {
                continue;
            }
            let fields = line.split('\t').collect::<Vec<_>>();
            if fields.len() < 9 {
                anyhow::bail!("line {} has {} columns, expected 9", lineno + 1, fields.len());
            }
            let (Some(start), Some(end)) = (parse_int(fields[3]), parse_int(fields[4])) else {
                anyhow::bail!("line {} has invalid coordinates", lineno + 1);
            };
            if end < start {
                anyhow::bail!("line {} has end {} before start {}", lineno + 1, end, start);
            }
            let Some(hex) = fields[8]
                .split(';')
                .find_map(|attr| attr.trim().strip_prefix(ID_TAG))
            else {
                anyhow::bail!("line {} has no {} attribute", lineno + 1, ID_TAG);
            };
            trees
                .entry(fields[0].to_string())
                .or_insert_with(IntervalTree::new)
                .insert(start..(end + 1), hex.to_string());
        }
        trees.values_mut().for_each(|tree| tree.index());
        Ok(Self { trees })
    }

    /// Payloads of intervals overlapping the 1-based closed range, by start.
    pub(crate) fn overlaps(&self, chrom: &str, start: i64, end: i64) -> Vec<String> {
        let Some(tree) = self.trees.get(chrom) else {
            return Vec::new();
        };
        let mut hits = tree
            .find(start..(end.max(start) + 1))
            .iter()
            .map(|e| (e.interval().start, e.data().clone()))
            .collect::<Vec<_>>();
        hits.sort();
        hits.into_iter().map(|(_, hex)| hex).collect()
    }
}

/// In-process overlap of a variant table against GFF3 files.
///
/// Produces the same `gff3`, `gff32`, ... columns as ANNOVAR, each cell holding
/// `Name=<hex>,<hex>,...` or the sentinel.
#[derive(Debug, Default, Clone)]
pub struct IntervalTreeAnnotator;

impl IntervalTreeAnnotator {
    fn annotate_record(dbs: &[OverlapDb], record: &VariantRecord) -> VariantRecord {
        let mut result = record.restrict(&KEY_COLUMNS.map(String::from));
        let coords = (parse_int(record.get("Start")), parse_int(record.get("End")));
        for (index, db) in dbs.iter().enumerate() {
            let hits = match coords {
                (Some(start), Some(end)) => db.overlaps(record.get("Chr"), start, end),
                _ => Vec::new(),
            };
            let value = if hits.is_empty() {
                SENTINEL.to_string()
            } else {
                format!("Name={}", hits.join(","))
            };
            result.set(overlap_column_name(index), value);
        }
        result
    }
}

impl OverlapAnnotator for IntervalTreeAnnotator {
    fn name(&self) -> &str {
        "interval-tree"
    }

    fn annotate(&self, ctx: &RunContext, request: &AnnotatorRequest) -> Result<(), anyhow::Error> {
        request.sources.validate()?;
        if !request.sources.databases.is_empty() {
            return Err(AppError::Config(String::from(
                "in-process annotator only supports GFF3 sources",
            ))
            .into());
        }
        let before = Instant::now();
        let dbs = request
            .sources
            .gff3_files
            .iter()
            .map(|name| OverlapDb::from_path(&request.db_dir.join(name)))
            .collect::<Result<Vec<_>, _>>()?;
        let variants = Table::read(&request.variants)?;

        let records = ctx.install(|| {
            variants
                .records
                .par_iter()
                .map(|record| Self::annotate_record(&dbs, record))
                .collect::<Vec<_>>()
        });

        let mut columns = KEY_COLUMNS.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        columns.extend((0..dbs.len()).map(overlap_column_name));
        write_records(&request.output, &columns, &records)?;
        tracing::info!(
            "... overlapped {} variants with {} GFF3 files in {:?}",
            records.len().separate_with_commas(),
            dbs.len(),
            before.elapsed()
        );
        Ok(())
    }
}
