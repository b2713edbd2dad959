//! Configuration of the AnnoFit normalizer and filter engine.
//!
//! All column names, predictor tables, thresholds and the filter expressions
//! live here as data; `Default` carries the settings for ANNOVAR tables with
//! the usual refGene/ensGene/dbNSFP protocols.

use std::path::Path;

use enum_map::Enum;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::common::io::open_read_maybe_gz;

/// Name of the VCF FORMAT column after renaming.
pub const VCF_FORMAT: &str = "VCF.FORMAT";
/// Name of the VCF sample column after renaming.
pub const VCF_SAMPLE: &str = "VCF.SAMPLE";
/// Prefix of the decoded VCF sample fields.
pub const VCF_PREFIX: &str = "VCF.";

/// Derived columns.
pub const GENE_NAME: &str = "AnnoFit.GeneName";
pub const FUNC: &str = "AnnoFit.Func";
pub const EXONIC_FUNC: &str = "AnnoFit.ExonicFunc";
pub const DETAILS: &str = "AnnoFit.Details";
pub const EXON_PRED: &str = "AnnoFit.ExonPred";
pub const SPLICE_PRED: &str = "AnnoFit.SplicePred";
pub const CONSERVATION: &str = "AnnoFit.Conservation";
pub const POP_FREQ_MAX: &str = "AnnoFit.PopFreqMax";
pub const COMPOUND: &str = "AnnoFit.Compound";
pub const GIAB_PROBLEMS: &str = "AnnoFit.GIAB_Problems";
pub const NCBI_PROBLEMS: &str = "AnnoFit.NCBI_Problems";
pub const HGMD: &str = "HGMD";
pub const UCSC: &str = "UCSC";
pub const COMMENT: &str = "Comment";

/// Column family tags; each selects one normalization function.
#[derive(Serialize, Deserialize, Enum, PartialEq, Eq, Clone, Copy, Debug, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldFamily {
    /// Integer coordinate, in place.
    Coordinate,
    /// Allele frequency, in place; unknown becomes `-1.0`.
    PopulationFrequency,
    /// Maximum over frequency columns.
    PopulationMax,
    /// Union of gene symbols.
    GeneSymbol,
    /// Union of functional consequences.
    FunctionalConsequence,
    /// Union of free-text details.
    Details,
    /// Genotype, in place.
    Genotype,
    /// `D/T` count over predictor verdict columns.
    ExonPrediction,
    /// Splice score consensus.
    SplicePrediction,
    /// `D/T` count over conservation rank scores.
    Conservation,
    /// Presence flags folded to a label list.
    RegionPresence,
    /// Interval start columns folded to the highest-ranked label.
    RegionRank,
}

impl FieldFamily {
    /// Whether the target column is rewritten from its own value.
    pub fn is_in_place(&self) -> bool {
        matches!(
            self,
            FieldFamily::Coordinate | FieldFamily::PopulationFrequency | FieldFamily::Genotype
        )
    }
}

/// One entry of the column-rule mapping table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, derive_new::new)]
pub struct ColumnRule {
    /// Column to write.
    pub target: String,
    pub family: FieldFamily,
    /// Columns to read; empty for in-place families.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ColumnRule {
    fn in_place(target: &str, family: FieldFamily) -> Self {
        Self::new(target.to_string(), family, vec![])
    }

    fn derived(target: &str, family: FieldFamily, sources: &[&str]) -> Self {
        Self::new(
            target.to_string(),
            family,
            sources.iter().map(|s| s.to_string()).collect(),
        )
    }
}

/// Predictor whose values are already symbols.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SymbolPredictor {
    pub column: String,
    /// Input symbol to verdict (`D` or `T`); anything else becomes `U`.
    pub symbols: IndexMap<String, String>,
}

/// Comparison direction of a score threshold.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Damaging if `score >= threshold`.
    AtLeast,
    /// Damaging if `score <= threshold`.
    AtMost,
}

/// Predictor with numeric score.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScorePredictor {
    pub column: String,
    pub threshold: f64,
    pub direction: Direction,
}

/// Numeric thresholds of the consensus families.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// A splice score above this is damaging.
    pub splice: f64,
    /// A conservation rank score at or above this is damaging.
    pub conservation: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            splice: 0.6,
            conservation: 0.7,
        }
    }
}

/// Column layout of the curated pathogenic-variant table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CuratedTableConfig {
    pub chrom_column: String,
    pub start_column: String,
    pub end_column: String,
    /// Renamed to `HGMD` on merge.
    pub name_column: String,
}

impl Default for CuratedTableConfig {
    fn default() -> Self {
        Self {
            chrom_column: String::from("Chromosome/scaffold name"),
            start_column: String::from("Chromosome/scaffold position start (bp)"),
            end_column: String::from("Chromosome/scaffold position end (bp)"),
            name_column: String::from("Variant name"),
        }
    }
}

/// Named per-row predicates of the filter engine.
#[derive(
    Serialize, Deserialize, Enum, PartialEq, Eq, Hash, Clone, Copy, Debug, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Predicate {
    /// Some allelic depth reaches the minimum.
    Depth,
    /// Population maximum below the ceiling.
    PopMax,
    /// No problematic-region deny list hit.
    NotProblematic,
    /// Listed in the curated pathogenic table.
    Hgmd,
    /// Enough damaging exon predictors.
    ExonPred,
    SplicePred,
    IntronPred,
    /// InterVar classification.
    Significance,
    /// ClinVar significance.
    Clinvar,
    ExonicFunc,
    NcRna,
    Splicing,
    /// Disease description present.
    Omim,
    /// Another surviving variant shares a gene.
    Compound,
    /// Intolerance score consensus.
    Pli,
    /// Dominant inheritance marker in disease description.
    OmimDominance,
    /// Homozygous genotype.
    Homozygous,
    /// No intolerance score and no inheritance marker.
    NoInfo,
}

/// Boolean expression tree over predicates.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    All(Vec<FilterExpr>),
    Any(Vec<FilterExpr>),
    Pred(Predicate),
}

impl FilterExpr {
    /// Evaluate with `pred` giving the value of each predicate.
    pub fn eval<F>(&self, pred: &F) -> bool
    where
        F: Fn(Predicate) -> bool,
    {
        match self {
            FilterExpr::All(children) => children.iter().all(|c| c.eval(pred)),
            FilterExpr::Any(children) => children.iter().any(|c| c.eval(pred)),
            FilterExpr::Pred(p) => pred(*p),
        }
    }

    /// Predicates referenced by this tree.
    pub fn predicates(&self) -> Vec<Predicate> {
        match self {
            FilterExpr::All(children) | FilterExpr::Any(children) => {
                children.iter().flat_map(|c| c.predicates()).collect()
            }
            FilterExpr::Pred(p) => vec![*p],
        }
    }
}

/// Thresholds, allowed sets and expression trees of both filter stages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    /// Column with the comma-separated allelic depths.
    pub depth_column: String,
    pub min_alt_depth: i64,
    /// Column with the population maximum frequency.
    pub pop_max_column: String,
    /// Population maximum must be strictly below this.
    pub pop_max_ceiling: f64,
    /// Column to values that exclude a variant.
    pub problems: IndexMap<String, Vec<String>>,
    /// Column with the curated variant name.
    pub hgmd_column: String,
    /// Column with the `<D>/<D+T>` exon prediction summary.
    pub exon_pred_column: String,
    /// Minimum count of damaging exon predictors.
    pub exon_pred_min_damaging: i64,
    pub splice_pred_column: String,
    pub splice_pred: Vec<String>,
    pub intron_pred_column: String,
    pub intron_pred: Vec<String>,
    pub intervar_column: String,
    pub intervar: Vec<String>,
    pub clinvar_column: String,
    pub clinvar: Vec<String>,
    pub exonic_func_column: String,
    pub exonic_func: Vec<String>,
    /// Column with the functional class, read by the non-coding and
    /// splicing predicates.
    pub func_column: String,
    pub ncrna: Vec<String>,
    pub splicing: Vec<String>,
    /// Column with the `;`-joined gene symbols.
    pub gene_column: String,
    /// Column with the per-gene compound counts.
    pub compound_column: String,
    pub genotype_column: String,
    pub pli_column: String,
    pub pli_threshold: f64,
    pub disease_column: String,
    /// Row-local stage.
    pub stage1: FilterExpr,
    /// Whole-result stage.
    pub stage2: FilterExpr,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        use FilterExpr::{All, Any, Pred};
        use Predicate::*;

        Self {
            depth_column: String::from("VCF.AD"),
            min_alt_depth: 4,
            pop_max_column: String::from(POP_FREQ_MAX),
            pop_max_ceiling: 0.01,
            problems: [
                (
                    "ENCODE_Blacklist",
                    strings(&["High_Signal_Region", "Low_Mappability_Island"]),
                ),
                (NCBI_PROBLEMS, strings(&["GRC_Hotspot"])),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            hgmd_column: String::from(HGMD),
            exon_pred_column: String::from(EXON_PRED),
            exon_pred_min_damaging: 3,
            splice_pred_column: String::from(SPLICE_PRED),
            splice_pred: strings(&["D"]),
            intron_pred_column: String::from("regsnp_disease"),
            intron_pred: strings(&["D"]),
            intervar_column: String::from("InterVar_automated"),
            intervar: strings(&["Pathogenic", "Likely pathogenic"]),
            clinvar_column: String::from("CLNSIG"),
            clinvar: strings(&[
                "Pathogenic",
                "Likely_pathogenic",
                "Pathogenic/Likely_pathogenic",
                "risk_factor",
            ]),
            exonic_func_column: String::from(EXONIC_FUNC),
            exonic_func: strings(&[
                "frameshift deletion",
                "frameshift insertion",
                "frameshift substitution",
                "nonframeshift deletion",
                "nonframeshift insertion",
                "nonsynonymous SNV",
                "startloss",
                "stopgain",
                "stoploss",
            ]),
            func_column: String::from(FUNC),
            ncrna: strings(&["ncRNA_exonic", "ncRNA_splicing", "ncRNA_UTR5", "ncRNA_UTR3"]),
            splicing: strings(&["splicing"]),
            gene_column: String::from(GENE_NAME),
            compound_column: String::from(COMPOUND),
            genotype_column: String::from("VCF.GT"),
            pli_column: String::from("pLi"),
            pli_threshold: 0.9,
            disease_column: String::from("Disease_description"),
            stage1: All(vec![
                Pred(Depth),
                Pred(PopMax),
                Pred(NotProblematic),
                Any(vec![
                    Pred(Hgmd),
                    Pred(ExonPred),
                    Pred(SplicePred),
                    Pred(IntronPred),
                    Pred(Significance),
                    Pred(Clinvar),
                    Pred(ExonicFunc),
                    Pred(Splicing),
                    All(vec![Pred(NcRna), Pred(Omim)]),
                ]),
            ]),
            stage2: Any(vec![
                Pred(Compound),
                Pred(Pli),
                Pred(OmimDominance),
                Pred(Homozygous),
                Pred(NoInfo),
            ]),
        }
    }
}

/// Complete AnnoFit configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AnnoFitConfig {
    /// Rows per chunk.
    pub chunk_size: usize,
    /// Column renames applied first.
    pub rename: IndexMap<String, String>,
    /// Function column to the column wiped for intergenic variants.
    pub intergene_wipe: IndexMap<String, String>,
    pub intergene_synonyms: Vec<String>,
    pub symbol_predictors: Vec<SymbolPredictor>,
    pub score_predictors: Vec<ScorePredictor>,
    pub thresholds: Thresholds,
    /// Normalization rules, applied in order.
    pub rules: Vec<ColumnRule>,
    /// Rank of each NCBI problem label; higher wins.
    pub ncbi_ranks: IndexMap<String, u32>,
    /// Columns kept after normalization.
    pub short_variant: Vec<String>,
    /// Columns of the variant output.
    pub final_variant: Vec<String>,
    /// Columns of the gene output.
    pub gene_table: Vec<String>,
    /// Gene key column of the cross-reference table.
    pub xref_key: String,
    /// Column with the dbSNP identifier.
    pub dbsnp_column: String,
    pub curated: CuratedTableConfig,
    pub filter: FilterConfig,
}

fn symbols(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for AnnoFitConfig {
    fn default() -> Self {
        use FieldFamily::*;

        let symbol_predictors = vec![
            ("SIFT_pred", symbols(&[("D", "D"), ("T", "T")])),
            ("Polyphen2_HDIV_pred", symbols(&[("D", "D"), ("P", "D"), ("B", "T")])),
            ("Polyphen2_HVAR_pred", symbols(&[("D", "D"), ("P", "D"), ("B", "T")])),
            ("LRT_pred", symbols(&[("D", "D"), ("N", "T")])),
            (
                "MutationTaster_pred",
                symbols(&[("A", "D"), ("D", "D"), ("N", "T"), ("P", "T")]),
            ),
            (
                "MutationAssessor_pred",
                symbols(&[("H", "D"), ("M", "D"), ("L", "T"), ("N", "T")]),
            ),
            ("FATHMM_pred", symbols(&[("D", "D"), ("T", "T")])),
            ("PROVEAN_pred", symbols(&[("D", "D"), ("N", "T")])),
            ("MetaSVM_pred", symbols(&[("D", "D"), ("T", "T")])),
            ("MetaLR_pred", symbols(&[("D", "D"), ("T", "T")])),
            ("M-CAP_pred", symbols(&[("D", "D"), ("T", "T")])),
            ("fathmm-MKL_coding_pred", symbols(&[("D", "D"), ("N", "T")])),
        ]
        .into_iter()
        .map(|(column, symbols)| SymbolPredictor {
            column: column.to_string(),
            symbols,
        })
        .collect::<Vec<_>>();
        let score_predictors = vec![
            ScorePredictor {
                column: String::from("REVEL"),
                threshold: 0.5,
                direction: Direction::AtMost,
            },
            ScorePredictor {
                column: String::from("MutPred_rankscore"),
                threshold: 0.9,
                direction: Direction::AtLeast,
            },
        ];
        let verdict_columns = symbol_predictors
            .iter()
            .map(|p| p.column.as_str())
            .chain(score_predictors.iter().map(|p| p.column.as_str()))
            .collect::<Vec<_>>();

        let medical_frequencies = [
            "gnomAD_exome_ALL",
            "gnomAD_genome_ALL",
            "ExAC_ALL",
            "1000g2015aug_all",
            "esp6500siv2_all",
        ];
        let all_frequencies = [
            "gnomAD_exome_ALL",
            "gnomAD_exome_AFR",
            "gnomAD_exome_AMR",
            "gnomAD_exome_ASJ",
            "gnomAD_exome_EAS",
            "gnomAD_exome_FIN",
            "gnomAD_exome_NFE",
            "gnomAD_exome_OTH",
            "gnomAD_exome_SAS",
            "gnomAD_genome_ALL",
            "gnomAD_genome_AFR",
            "gnomAD_genome_AMR",
            "gnomAD_genome_ASJ",
            "gnomAD_genome_EAS",
            "gnomAD_genome_FIN",
            "gnomAD_genome_NFE",
            "gnomAD_genome_OTH",
            "ExAC_ALL",
            "1000g2015aug_all",
            "esp6500siv2_all",
        ];
        let ncbi_sources = ["NCBI.GRC_Fix.start", "NCBI.GRC_Issue.start", "NCBI.GRC_Hotspot.start"];

        let mut rules = vec![
            ColumnRule::derived(
                GIAB_PROBLEMS,
                RegionPresence,
                &[
                    "GIAB.AllDifficultRegions",
                    "GIAB.AllTandemRepeatsandHomopolymers",
                    "GIAB.LowMappability",
                    "GIAB.SegmentalDuplications",
                ],
            ),
            ColumnRule::derived(NCBI_PROBLEMS, RegionRank, &ncbi_sources),
            ColumnRule::in_place("Start", Coordinate),
            ColumnRule::in_place("End", Coordinate),
            ColumnRule::derived(GENE_NAME, GeneSymbol, &["Gene.refGene", "Gene.ensGene"]),
            ColumnRule::derived(FUNC, FunctionalConsequence, &["Func.refGene", "Func.ensGene"]),
            ColumnRule::derived(
                EXONIC_FUNC,
                FunctionalConsequence,
                &["ExonicFunc.refGene", "ExonicFunc.ensGene"],
            ),
            ColumnRule::derived(
                DETAILS,
                Details,
                &[
                    "GeneDetail.refGene",
                    "AAChange.refGene",
                    "GeneDetail.ensGene",
                    "AAChange.ensGene",
                ],
            ),
            ColumnRule::in_place("VCF.GT", Genotype),
            ColumnRule::derived(EXON_PRED, ExonPrediction, &verdict_columns),
            ColumnRule::derived(
                SPLICE_PRED,
                SplicePrediction,
                &["dbscSNV_ADA_SCORE", "dbscSNV_RF_SCORE"],
            ),
            ColumnRule::derived(
                CONSERVATION,
                Conservation,
                &[
                    "GERP++_RS_rankscore",
                    "phyloP100way_vertebrate_rankscore",
                    "phyloP20way_mammalian_rankscore",
                    "phastCons100way_vertebrate_rankscore",
                    "phastCons20way_mammalian_rankscore",
                    "SiPhy_29way_logOdds_rankscore",
                ],
            ),
        ];
        rules.extend(
            medical_frequencies
                .iter()
                .map(|c| ColumnRule::in_place(c, PopulationFrequency)),
        );
        rules.push(ColumnRule::derived(POP_FREQ_MAX, PopulationMax, &all_frequencies));

        let mut short_variant = strings(&[
            "Chr",
            "Start",
            "End",
            "Ref",
            "Alt",
            GENE_NAME,
            FUNC,
            EXONIC_FUNC,
            DETAILS,
            "avsnp150",
            "VCF.GT",
            "VCF.AD",
            "VCF.DP",
            EXON_PRED,
            SPLICE_PRED,
            CONSERVATION,
            "regsnp_disease",
            "InterVar_automated",
            "CLNSIG",
            "CLNDN",
            POP_FREQ_MAX,
        ]);
        short_variant.extend(strings(&medical_frequencies));
        short_variant.extend(strings(&[
            GIAB_PROBLEMS,
            NCBI_PROBLEMS,
            "ENCODE_Blacklist",
            "UCSC_UnusualRegions",
        ]));

        let mut final_variant = strings(&[
            "Chr", "Start", "End", "Ref", "Alt", UCSC, "avsnp150", GENE_NAME, FUNC, EXONIC_FUNC,
            DETAILS, "VCF.GT", "VCF.AD", "VCF.DP", COMPOUND, HGMD, "CLNSIG", "CLNDN",
            "InterVar_automated", EXON_PRED, SPLICE_PRED, CONSERVATION, "regsnp_disease",
            POP_FREQ_MAX,
        ]);
        final_variant.extend(strings(&medical_frequencies));
        final_variant.extend(strings(&[
            "pLi",
            "Disease_description",
            GIAB_PROBLEMS,
            NCBI_PROBLEMS,
            "ENCODE_Blacklist",
            "UCSC_UnusualRegions",
        ]));

        Self {
            chunk_size: 10_000,
            rename: [
                ("Otherinfo4", "VCF.CHROM"),
                ("Otherinfo5", "VCF.POS"),
                ("Otherinfo6", "VCF.ID"),
                ("Otherinfo7", "VCF.REF"),
                ("Otherinfo8", "VCF.ALT"),
                ("Otherinfo9", "VCF.QUAL"),
                ("Otherinfo10", "VCF.FILTER"),
                ("Otherinfo11", "VCF.INFO"),
                ("Otherinfo12", VCF_FORMAT),
                ("Otherinfo13", VCF_SAMPLE),
                ("ENCODE_Blacklist.name", "ENCODE_Blacklist"),
                ("UCSC_UnusualRegions.name", "UCSC_UnusualRegions"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            intergene_wipe: [
                ("Func.refGene", "Gene.refGene"),
                ("Func.ensGene", "Gene.ensGene"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            intergene_synonyms: strings(&["intergenic", "upstream", "downstream"]),
            symbol_predictors,
            score_predictors,
            thresholds: Thresholds::default(),
            rules,
            ncbi_ranks: [("GRC_Fix", 1), ("GRC_Issue", 2), ("GRC_Hotspot", 3)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            short_variant,
            final_variant,
            gene_table: strings(&[
                "#Gene_name",
                "pLi",
                "pRec",
                "pNull",
                "Gene_full_name",
                "Function_description",
                "Disease_description",
                "Tissue_specificity(Uniprot)",
            ]),
            xref_key: String::from("#Gene_name"),
            dbsnp_column: String::from("avsnp150"),
            curated: CuratedTableConfig::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl AnnoFitConfig {
    /// Load from JSON at `path`; absent keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let reader = open_read_maybe_gz(path.as_ref())?;
        serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("problem parsing config {:?}: {}", path.as_ref(), e))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{AnnoFitConfig, FilterExpr, Predicate};

    #[test]
    fn partial_json_keeps_defaults() -> Result<(), anyhow::Error> {
        let config: AnnoFitConfig =
            serde_json::from_str(r#"{"chunk_size": 5, "filter": {"min_alt_depth": 10}}"#)?;

        assert_eq!(config.chunk_size, 5);
        assert_eq!(config.filter.min_alt_depth, 10);
        assert!(float_cmp::approx_eq!(
            f64,
            config.filter.pli_threshold,
            0.9,
            ulps = 2
        ));
        assert_eq!(config.rules, AnnoFitConfig::default().rules);

        Ok(())
    }

    #[test]
    fn load_from_file() -> Result<(), anyhow::Error> {
        let config = AnnoFitConfig::load("tests/data/annofit/config.json")?;

        assert_eq!(config.chunk_size, 2);
        assert_eq!(
            config.filter.stage2,
            FilterExpr::Any(vec![
                FilterExpr::Pred(Predicate::Homozygous),
                FilterExpr::Pred(Predicate::NoInfo),
            ])
        );

        Ok(())
    }

    #[test]
    fn expression_tree_eval() {
        let expr = FilterExpr::All(vec![
            FilterExpr::Pred(Predicate::Depth),
            FilterExpr::Any(vec![
                FilterExpr::Pred(Predicate::Hgmd),
                FilterExpr::Pred(Predicate::Clinvar),
            ]),
        ]);

        assert!(expr.eval(&|p| matches!(p, Predicate::Depth | Predicate::Clinvar)));
        assert!(!expr.eval(&|p| matches!(p, Predicate::Hgmd | Predicate::Clinvar)));
        assert!(!expr.eval(&|p| matches!(p, Predicate::Depth)));
        assert_eq!(
            expr.predicates(),
            vec![Predicate::Depth, Predicate::Hgmd, Predicate::Clinvar]
        );
    }

    #[test]
    fn in_place_rules_have_no_sources() {
        for rule in AnnoFitConfig::default().rules {
            assert_eq!(rule.family.is_in_place(), rule.sources.is_empty(), "{:?}", rule);
        }
    }
}
