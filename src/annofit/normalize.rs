//! Row-wise normalization of the merged annotation table.
//!
//! Every function here is total: unparsable input degrades to a documented
//! sentinel instead of raising.

use itertools::Itertools;
use rayon::prelude::*;

use crate::{
    annofit::conf::{
        AnnoFitConfig, ColumnRule, Direction, FieldFamily, ScorePredictor, SymbolPredictor,
        VCF_FORMAT, VCF_PREFIX, VCF_SAMPLE,
    },
    common::{
        flatten_values, format_float, is_sentinel, parse_float, parse_int, table::VariantRecord,
        RunContext, SENTINEL,
    },
};

/// Frequency used for unknown values.
pub const UNKNOWN_FREQUENCY: f64 = -1.0;

/// Verdict symbols.
pub const DAMAGING: &str = "D";
pub const TOLERANT: &str = "T";
pub const UNKNOWN: &str = "U";

/// Genotype label for two equal non-reference alleles.
pub const HOMOZYGOUS: &str = "HOMO";

/// Integer coordinate or the sentinel.
pub fn format_coordinate(value: &str) -> String {
    parse_int(value)
        .map(|v| v.to_string())
        .unwrap_or_else(|| SENTINEL.to_string())
}

/// Allele frequency, `-1.0` if not numeric.
pub fn format_population_freq(value: &str) -> f64 {
    parse_float(value).unwrap_or(UNKNOWN_FREQUENCY)
}

/// Maximum frequency over `values`, `-1.0` if none is known.
pub fn population_max<'a, I>(values: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(format_population_freq)
        .fold(UNKNOWN_FREQUENCY, f64::max)
}

/// Zip the VCF FORMAT keys with the sample values into `VCF.<key>` fields.
///
/// `None` if the counts differ.
pub fn split_vcf_metadata(format: &str, sample: &str) -> Option<Vec<(String, String)>> {
    let keys = format.split(':').collect::<Vec<_>>();
    let values = sample.split(':').collect::<Vec<_>>();
    if keys.len() != values.len() {
        return None;
    }
    Some(
        keys.into_iter()
            .zip(values)
            .map(|(k, v)| (format!("{}{}", VCF_PREFIX, k), v.to_string()))
            .collect(),
    )
}

/// Union of `;`-separated values, sorted and deduplicated.
pub fn format_union<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    flatten_values(
        values
            .into_iter()
            .filter(|v| !is_sentinel(v))
            .flat_map(|v| v.split(';')),
    )
}

/// `HOMO` for two equal non-reference alleles, the input for other valid
/// genotypes, the sentinel for malformed ones.
pub fn format_genotype(value: &str) -> String {
    let alleles = value.split('/').map(parse_int).collect::<Vec<_>>();
    match alleles.as_slice() {
        [Some(a), Some(b)] if a == b && *a != 0 => HOMOZYGOUS.to_string(),
        [Some(_), Some(_)] => value.to_string(),
        _ => SENTINEL.to_string(),
    }
}

/// Verdict of a symbolic predictor.
pub fn symbol_verdict<'a>(predictor: &'a SymbolPredictor, value: &str) -> &'a str {
    predictor
        .symbols
        .get(value)
        .map(|s| s.as_str())
        .unwrap_or(UNKNOWN)
}

/// Verdict of a score predictor.
pub fn score_verdict(predictor: &ScorePredictor, value: &str) -> &'static str {
    match parse_float(value) {
        None => UNKNOWN,
        Some(score) => {
            let damaging = match predictor.direction {
                Direction::AtLeast => score >= predictor.threshold,
                Direction::AtMost => score <= predictor.threshold,
            };
            if damaging {
                DAMAGING
            } else {
                TOLERANT
            }
        }
    }
}

/// `"<D>/<D+T>"` over verdicts, the sentinel if all are unknown.
pub fn format_verdict_counts<'a, I>(verdicts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let (damaging, tolerant) =
        verdicts
            .into_iter()
            .fold((0, 0), |(d, t), verdict| match verdict {
                DAMAGING => (d + 1, t),
                TOLERANT => (d, t + 1),
                _ => (d, t),
            });
    if damaging + tolerant == 0 {
        SENTINEL.to_string()
    } else {
        format!("{}/{}", damaging, damaging + tolerant)
    }
}

/// Conservation summary: a rank score at or above `threshold` is damaging.
pub fn format_conservation<'a, I>(values: I, threshold: f64) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    format_verdict_counts(values.into_iter().map(|v| match parse_float(v) {
        None => UNKNOWN,
        Some(score) if score >= threshold => DAMAGING,
        Some(_) => TOLERANT,
    }))
}

/// Splice consensus: sentinel if any score is unknown, `D` if any exceeds
/// `threshold`, else `T`.
pub fn format_splice_prediction<'a, I>(values: I, threshold: f64) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let scores = values.into_iter().map(parse_float).collect::<Option<Vec<_>>>();
    match scores {
        None => SENTINEL.to_string(),
        Some(scores) if scores.iter().any(|s| *s > threshold) => DAMAGING.to_string(),
        Some(_) => TOLERANT.to_string(),
    }
}

/// Label of a region column: the name without its database prefix and
/// without a `.start` suffix.
pub fn region_label(column: &str) -> &str {
    let label = column.split_once('.').map(|(_, rest)| rest).unwrap_or(column);
    label.strip_suffix(".start").unwrap_or(label)
}

/// Sorted labels of all flagged region columns, `;`-joined.
pub fn format_region_presence<'a, I>(flags: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    flatten_values(
        flags
            .into_iter()
            .filter(|(_, value)| !is_sentinel(value))
            .map(|(column, _)| region_label(column)),
    )
}

/// Highest-ranked label among flagged `.start` columns.
pub fn format_region_rank<'a, I>(flags: I, ranks: &indexmap::IndexMap<String, u32>) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    flags
        .into_iter()
        .filter(|(column, value)| column.ends_with(".start") && !is_sentinel(value))
        .map(|(column, _)| region_label(column))
        .sorted()
        .dedup()
        .max_by_key(|label| ranks.get(*label).copied().unwrap_or_default())
        .map(|label| label.to_string())
        .unwrap_or_else(|| SENTINEL.to_string())
}

/// Wipe target columns of intergenic variants.
pub fn wipe_intergene(config: &AnnoFitConfig, record: &mut VariantRecord) {
    for (func_column, target) in &config.intergene_wipe {
        let intergenic = record
            .get(func_column)
            .split(';')
            .any(|f| config.intergene_synonyms.iter().any(|s| s == f));
        if intergenic && record.contains(target) {
            record.set(target.clone(), SENTINEL);
        }
    }
}

/// Apply one column rule to `record`.
pub fn apply_rule(config: &AnnoFitConfig, rule: &ColumnRule, record: &mut VariantRecord) {
    let sources = || rule.sources.iter().map(|c| record.get(c));
    let value = match rule.family {
        FieldFamily::Coordinate => format_coordinate(record.get(&rule.target)),
        FieldFamily::PopulationFrequency => {
            format_float(format_population_freq(record.get(&rule.target)))
        }
        FieldFamily::Genotype => format_genotype(record.get(&rule.target)),
        FieldFamily::PopulationMax => format_float(population_max(sources())),
        FieldFamily::GeneSymbol | FieldFamily::FunctionalConsequence | FieldFamily::Details => {
            format_union(sources())
        }
        FieldFamily::ExonPrediction => format_verdict_counts(sources()),
        FieldFamily::SplicePrediction => {
            format_splice_prediction(sources(), config.thresholds.splice)
        }
        FieldFamily::Conservation => {
            format_conservation(sources(), config.thresholds.conservation)
        }
        FieldFamily::RegionPresence => format_region_presence(
            rule.sources.iter().map(|c| (c.as_str(), record.get(c))),
        ),
        FieldFamily::RegionRank => format_region_rank(
            rule.sources.iter().map(|c| (c.as_str(), record.get(c))),
            &config.ncbi_ranks,
        ),
    };
    record.set(rule.target.clone(), value);
}

/// Normalize one row in place.
pub fn normalize_record(config: &AnnoFitConfig, record: &mut VariantRecord) {
    for (from, to) in &config.rename {
        record.rename(from, to);
    }

    let format = record.remove(VCF_FORMAT).unwrap_or_default();
    let sample = record.remove(VCF_SAMPLE).unwrap_or_default();
    if !is_sentinel(&format) && !is_sentinel(&sample) {
        match split_vcf_metadata(&format, &sample) {
            Some(fields) => fields.into_iter().for_each(|(k, v)| record.set(k, v)),
            None => tracing::trace!(
                "FORMAT {:?} and sample {:?} differ in length at {:?}",
                &format,
                &sample,
                record.key()
            ),
        }
    }

    wipe_intergene(config, record);

    for predictor in &config.symbol_predictors {
        let verdict = symbol_verdict(predictor, record.get(&predictor.column)).to_string();
        record.set(predictor.column.clone(), verdict);
    }
    for predictor in &config.score_predictors {
        let verdict = score_verdict(predictor, record.get(&predictor.column));
        record.set(predictor.column.clone(), verdict);
    }

    for rule in &config.rules {
        apply_rule(config, rule, record);
    }
}

/// Normalize a chunk in the worker pool and restrict it to the short column set.
pub fn normalize_chunk(
    ctx: &RunContext,
    config: &AnnoFitConfig,
    mut records: Vec<VariantRecord>,
) -> Vec<VariantRecord> {
    ctx.install(|| {
        records.par_iter_mut().for_each(|record| {
            normalize_record(config, record);
            *record = record.restrict(&config.short_variant);
        })
    });
    records
}
