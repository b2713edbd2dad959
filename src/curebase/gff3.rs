//! Encoding of schema-free interval databases as GFF3 region records.

use std::{collections::BTreeSet, io::Write, path::Path, time::Instant};

use clap::Parser;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    common::{
        self,
        contigs::ContigIndex,
        io::open_write_maybe_gz,
        parse_int,
        table::{Table, VariantRecord},
        RunContext,
    },
    curebase::payload::{self, Payload},
    err::AppError,
};

/// Description of one custom interval database.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, derive_new::new)]
pub struct DatabaseDescriptor {
    /// Database name, used as GFF3 source and column prefix.
    #[serde(alias = "Name")]
    pub name: String,
    /// Path to the tab-separated database file.
    #[serde(alias = "FileName")]
    pub source_file: String,
    /// Name of the contig column.
    #[serde(alias = "ChromColumn")]
    pub chrom_column: String,
    /// Name of the interval start column.
    #[serde(alias = "StartColumn")]
    pub start_column: String,
    /// Name of the interval end column.
    #[serde(alias = "EndColumn")]
    pub end_column: String,
}

impl DatabaseDescriptor {
    fn anchor_columns(&self) -> [&str; 3] {
        [&self.chrom_column, &self.start_column, &self.end_column]
    }
}

/// One GFF3 line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GffRecord {
    pub contig: String,
    /// GFF3 "source" column, holds the database name.
    pub sample_label: String,
    pub feature_type: String,
    /// 1-based start, at least 1.
    pub start: i64,
    /// 1-based closed end, never before `start`.
    pub end: i64,
    pub score: String,
    pub strand: String,
    pub phase: String,
    /// `ID=<HEX>` payload.
    pub attributes: String,
}

impl GffRecord {
    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.contig,
            self.sample_label,
            self.feature_type,
            self.start,
            self.end,
            self.score,
            self.strand,
            self.phase,
            self.attributes
        )
    }
}

/// Result of encoding one database.
#[derive(Debug, Clone)]
pub struct EncodedDatabase {
    /// Database name.
    pub name: String,
    /// `(contig, length)` pairs for the `##sequence-region` header.
    pub sequence_regions: Vec<(String, u64)>,
    /// Records sorted by contig rank and start.
    pub records: Vec<GffRecord>,
    /// Columns the database will contribute after decoding.
    pub expected_columns: Vec<String>,
}

impl EncodedDatabase {
    /// Write as GFF3 to `writer`.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        writeln!(writer, "##gff-version 3")?;
        for (name, length) in &self.sequence_regions {
            writeln!(writer, "##sequence-region {} 1 {}", name, length)?;
        }
        for record in &self.records {
            writeln!(writer, "{}", record.to_line())?;
        }
        writer.flush()
    }

    /// Write as GFF3 to the file at `path`.
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let mut writer = open_write_maybe_gz(path.as_ref())?;
        self.write(&mut writer)
            .map_err(|e| anyhow::anyhow!("problem writing GFF3 {:?}: {}", path.as_ref(), e))
    }
}

/// Columns a database contributes: `<name>.<column>`, or just `<name>`.
pub fn expected_columns(name: &str, attribute_columns: &[String]) -> Vec<String> {
    if attribute_columns.is_empty() {
        vec![name.to_string()]
    } else {
        attribute_columns
            .iter()
            .map(|c| format!("{}.{}", name, c))
            .collect()
    }
}

/// Build the payload of one row from all of its attribute columns.
fn row_payload(record: &VariantRecord, attribute_columns: &[String]) -> Payload {
    attribute_columns
        .iter()
        .map(|c| (c.clone(), record.get(c).to_string()))
        .collect()
}

/// Encode the rows of `table` described by `descriptor`.
///
/// Rows on contigs unknown to `contigs` are dropped with a warning; if no row
/// remains, this is a fatal data mismatch.
pub fn encode_database(
    ctx: &RunContext,
    descriptor: &DatabaseDescriptor,
    table: &Table,
    contigs: &ContigIndex,
    reference_name: &str,
) -> Result<EncodedDatabase, anyhow::Error> {
    for column in descriptor.anchor_columns() {
        if !table.columns.iter().any(|c| c == column) {
            return Err(AppError::Config(format!(
                "database {:?} has no column {:?}",
                &descriptor.name, column
            ))
            .into());
        }
    }
    let attribute_columns = table
        .columns
        .iter()
        .filter(|c| !descriptor.anchor_columns().contains(&c.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    let unknown = table
        .records
        .iter()
        .map(|r| r.get(&descriptor.chrom_column))
        .filter(|chrom| !contigs.contains(chrom))
        .collect::<BTreeSet<_>>();
    if !unknown.is_empty() {
        tracing::warn!(
            "Contigs will be removed from database {:?}: {}",
            &descriptor.name,
            unknown.into_iter().collect::<Vec<_>>().join(", ")
        );
    }

    let mut rows = Vec::new();
    for record in &table.records {
        let Some(rank) = contigs.rank(record.get(&descriptor.chrom_column)) else {
            continue;
        };
        let start = parse_int(record.get(&descriptor.start_column));
        let end = parse_int(record.get(&descriptor.end_column));
        match (start, end) {
            (Some(start), Some(end)) if end >= start => rows.push((rank, start, end, record)),
            _ => tracing::warn!(
                "Dropping row with invalid coordinates from database {:?}: {}:{}-{}",
                &descriptor.name,
                record.get(&descriptor.chrom_column),
                record.get(&descriptor.start_column),
                record.get(&descriptor.end_column),
            ),
        }
    }
    if rows.is_empty() {
        return Err(AppError::DataMismatch {
            database: descriptor.name.clone(),
            reference: reference_name.to_string(),
        }
        .into());
    }
    rows.sort_by_key(|(rank, start, _, _)| (*rank, *start));

    let records = ctx.install(|| {
        rows.par_iter()
            .map(|(_, start, end, record)| -> Result<GffRecord, serde_json::Error> {
                let start = (*start).max(1);
                Ok(GffRecord {
                    contig: record.get(&descriptor.chrom_column).to_string(),
                    sample_label: descriptor.name.clone(),
                    feature_type: "region".to_string(),
                    start,
                    end: (*end).max(start),
                    score: ".".to_string(),
                    strand: ".".to_string(),
                    phase: ".".to_string(),
                    attributes: payload::encode_attribute(&row_payload(
                        record,
                        &attribute_columns,
                    ))?,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()
    })?;

    Ok(EncodedDatabase {
        name: descriptor.name.clone(),
        sequence_regions: contigs.iter().map(|(n, l)| (n.to_string(), l)).collect(),
        records,
        expected_columns: expected_columns(&descriptor.name, &attribute_columns),
    })
}

/// Load the database file of `descriptor` (relative to `db_dir`) and encode it.
pub fn load_and_encode(
    ctx: &RunContext,
    descriptor: &DatabaseDescriptor,
    db_dir: &Path,
    contigs: &ContigIndex,
    reference_name: &str,
) -> Result<EncodedDatabase, anyhow::Error> {
    let before = Instant::now();
    tracing::info!("Name: {}", &descriptor.name);
    let path = db_dir.join(&descriptor.source_file);
    tracing::info!("Input TSV db: {}", path.display());
    let table = Table::read(&path)?;
    let encoded = encode_database(ctx, descriptor, &table, contigs, reference_name)?;
    tracing::info!(
        "... encoded {} of {} intervals in {:?}",
        encoded.records.len().separate_with_commas(),
        table.records.len().separate_with_commas(),
        before.elapsed()
    );
    Ok(encoded)
}

/// Command line arguments for `anno encode` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Encode an interval database TSV as GFF3", long_about = None)]
pub struct Args {
    /// Database name.
    #[arg(long)]
    pub name: String,
    /// Path to the database TSV file.
    #[arg(long)]
    pub path_input: String,
    /// Name of the contig column.
    #[arg(long, default_value = "Chr")]
    pub chrom_column: String,
    /// Name of the start column.
    #[arg(long, default_value = "Start")]
    pub start_column: String,
    /// Name of the end column.
    #[arg(long, default_value = "End")]
    pub end_column: String,
    /// Path to the reference sequence index (`.fai`).
    #[arg(long)]
    pub path_reference_fai: String,
    /// Path to the output GFF3 file.
    #[arg(long)]
    pub path_output: String,
    /// Set the number of threads to use, defaults to number of cores.
    #[arg(long)]
    pub num_threads: Option<usize>,
}

/// Main entry point for `anno encode` sub command.
pub fn run(args_common: &common::Args, args: &Args) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let ctx = RunContext::new(args.num_threads)?;
    let contigs = ContigIndex::from_path(&args.path_reference_fai)?;
    let descriptor = DatabaseDescriptor::new(
        args.name.clone(),
        args.path_input.clone(),
        args.chrom_column.clone(),
        args.start_column.clone(),
        args.end_column.clone(),
    );
    let encoded = load_and_encode(
        &ctx,
        &descriptor,
        Path::new(""),
        &contigs,
        &args.path_reference_fai,
    )?;
    encoded.write_to_path(&args.path_output)?;
    tracing::info!("Expected columns: {}", encoded.expected_columns.join(", "));

    tracing::info!(
        "All of `anno encode` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}
