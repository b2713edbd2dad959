//! Two-stage variant filter driven by `FilterConfig` expression trees.

use enum_map::EnumMap;
use itertools::Itertools;
use multimap::MultiMap;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    annofit::{
        conf::{FilterConfig, FilterExpr, Predicate},
        normalize::{HOMOZYGOUS, UNKNOWN_FREQUENCY},
    },
    common::{is_sentinel, parse_float, parse_int, table::VariantRecord, RunContext, SENTINEL},
};

/// Whether any `sep`-separated part of `value` is in `allowed`.
fn any_in(value: &str, sep: char, allowed: &[String]) -> bool {
    value.split(sep).any(|v| allowed.iter().any(|a| a == v))
}

/// Gene symbols of a `;`-joined gene column, unique, sentinel dropped.
pub fn genes_of(value: &str) -> impl Iterator<Item = &str> {
    value.split(';').filter(|g| !is_sentinel(g)).unique()
}

/// Evaluates predicates and expression trees over records.
#[derive(Debug)]
pub struct FilterEngine<'a> {
    config: &'a FilterConfig,
    dominant: regex::Regex,
    recessive: regex::Regex,
}

impl<'a> FilterEngine<'a> {
    pub fn new(config: &'a FilterConfig) -> Result<Self, anyhow::Error> {
        Ok(Self {
            config,
            dominant: regex::Regex::new(r"(^|\W)dominant(\W|$)")?,
            recessive: regex::Regex::new(r"(^|\W)recessive(\W|$)")?,
        })
    }

    fn disease(&self, record: &VariantRecord) -> String {
        record.get(&self.config.disease_column).to_lowercase()
    }

    fn pli_scores(&self, record: &VariantRecord) -> Option<Vec<f64>> {
        record
            .get(&self.config.pli_column)
            .split(';')
            .map(parse_float)
            .collect()
    }

    /// Value of predicate `pred` for `record`.
    pub fn predicate(&self, pred: Predicate, record: &VariantRecord) -> bool {
        let c = self.config;
        match pred {
            Predicate::Depth => record
                .get(&c.depth_column)
                .split(',')
                .map(parse_int)
                .collect::<Option<Vec<_>>>()
                .map(|depths| depths.iter().any(|d| *d >= c.min_alt_depth))
                .unwrap_or(false),
            Predicate::PopMax => {
                parse_float(record.get(&c.pop_max_column)).unwrap_or(UNKNOWN_FREQUENCY)
                    < c.pop_max_ceiling
            }
            Predicate::NotProblematic => c
                .problems
                .iter()
                .all(|(column, deny)| !deny.iter().any(|d| d == record.get(column))),
            Predicate::Hgmd => !is_sentinel(record.get(&c.hgmd_column)),
            Predicate::ExonPred => record
                .get(&c.exon_pred_column)
                .split('/')
                .next()
                .and_then(parse_int)
                .map(|damaging| damaging >= c.exon_pred_min_damaging)
                .unwrap_or(false),
            Predicate::SplicePred => c
                .splice_pred
                .iter()
                .any(|v| v == record.get(&c.splice_pred_column)),
            Predicate::IntronPred => c
                .intron_pred
                .iter()
                .any(|v| v == record.get(&c.intron_pred_column)),
            Predicate::Significance => c
                .intervar
                .iter()
                .any(|v| v == record.get(&c.intervar_column)),
            Predicate::Clinvar => any_in(record.get(&c.clinvar_column), ',', &c.clinvar),
            Predicate::ExonicFunc => any_in(record.get(&c.exonic_func_column), ';', &c.exonic_func),
            Predicate::NcRna => any_in(record.get(&c.func_column), ';', &c.ncrna),
            Predicate::Splicing => any_in(record.get(&c.func_column), ';', &c.splicing),
            Predicate::Omim => !is_sentinel(record.get(&c.disease_column)),
            Predicate::Compound => record
                .get(&c.compound_column)
                .split(';')
                .filter_map(parse_int)
                .any(|count| count > 1),
            Predicate::Pli => self
                .pli_scores(record)
                .map(|scores| scores.iter().any(|s| *s >= c.pli_threshold))
                .unwrap_or(false),
            Predicate::OmimDominance => self.dominant.is_match(&self.disease(record)),
            Predicate::Homozygous => record.get(&c.genotype_column) == HOMOZYGOUS,
            Predicate::NoInfo => {
                let disease = self.disease(record);
                self.pli_scores(record).is_none()
                    && !self.dominant.is_match(&disease)
                    && !self.recessive.is_match(&disease)
            }
        }
    }

    /// Evaluate the listed predicates once for `record`.
    pub fn evaluate(&self, preds: &[Predicate], record: &VariantRecord) -> EnumMap<Predicate, bool> {
        let mut flags = EnumMap::default();
        for pred in preds {
            flags[*pred] = self.predicate(*pred, record);
        }
        flags
    }

    /// Whether `record` satisfies `expr`.
    pub fn passes(&self, expr: &FilterExpr, record: &VariantRecord) -> bool {
        let flags = self.evaluate(&expr.predicates(), record);
        expr.eval(&|pred| flags[pred])
    }

    /// Keep the records satisfying `expr`, preserving order.
    pub fn apply(
        &self,
        ctx: &RunContext,
        label: &str,
        expr: &FilterExpr,
        records: Vec<VariantRecord>,
    ) -> Vec<VariantRecord> {
        let preds = expr.predicates().into_iter().unique().collect::<Vec<_>>();
        let flags = ctx.install(|| {
            records
                .par_iter()
                .map(|record| self.evaluate(&preds, record))
                .collect::<Vec<_>>()
        });

        let mut counts: EnumMap<Predicate, usize> = EnumMap::default();
        for row in &flags {
            for (pred, value) in row.iter() {
                if *value {
                    counts[pred] += 1;
                }
            }
        }
        for pred in &preds {
            tracing::debug!(
                "{}: predicate {} true for {} variants",
                label,
                pred,
                counts[*pred].separate_with_commas()
            );
        }

        let total = records.len();
        let result = records
            .into_iter()
            .zip(flags)
            .filter(|(_, row)| expr.eval(&|pred| row[pred]))
            .map(|(record, _)| record)
            .collect::<Vec<_>>();
        tracing::info!(
            "{}: {} of {} variants pass",
            label,
            result.len().separate_with_commas(),
            total.separate_with_commas()
        );
        result
    }

    /// Row-local stage.
    pub fn stage1(&self, ctx: &RunContext, records: Vec<VariantRecord>) -> Vec<VariantRecord> {
        self.apply(ctx, "stage 1", &self.config.stage1, records)
    }

    /// Whole-result stage; requires the compound column.
    pub fn stage2(&self, ctx: &RunContext, records: Vec<VariantRecord>) -> Vec<VariantRecord> {
        self.apply(ctx, "stage 2", &self.config.stage2, records)
    }
}

/// Set `compound_column`: per gene of the row, the number of rows carrying
/// that gene (the row itself included), `;`-joined.
pub fn compute_compound(
    ctx: &RunContext,
    records: &mut [VariantRecord],
    gene_column: &str,
    compound_column: &str,
) {
    let mut carriers: MultiMap<String, usize> = MultiMap::new();
    for (idx, record) in records.iter().enumerate() {
        for gene in genes_of(record.get(gene_column)) {
            carriers.insert(gene.to_string(), idx);
        }
    }
    ctx.install(|| {
        records.par_iter_mut().for_each(|record| {
            let counts = genes_of(record.get(gene_column))
                .map(|gene| {
                    carriers
                        .get_vec(gene)
                        .map(|rows| rows.len())
                        .unwrap_or_default()
                        .to_string()
                })
                .join(";");
            let counts = if counts.is_empty() {
                SENTINEL.to_string()
            } else {
                counts
            };
            record.set(compound_column, counts);
        })
    });
}
