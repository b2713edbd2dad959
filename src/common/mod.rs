//! Common functionality.

use byte_unit::{Byte, UnitType};
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use itertools::Itertools;

pub mod contigs;
pub mod io;
pub mod table;

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let Ok(me) = procfs::process::Process::myself() else {
        return;
    };
    let Ok(stat) = me.stat() else {
        return;
    };
    let page_size = procfs::page_size();
    if let Some(rss) = Byte::from_u128((stat.rss * page_size) as u128) {
        tracing::debug!(
            "RSS now: {}",
            rss.get_appropriate_unit(UnitType::Binary)
        );
    }
}

/// The placeholder for "unknown / no data".
pub const SENTINEL: &str = ".";

/// Whether `value` carries no information (sentinel or empty).
pub fn is_sentinel(value: &str) -> bool {
    value.is_empty() || value == SENTINEL
}

/// Total integer parsing, `None` on failure.
pub fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

/// Total float parsing, `None` on failure or NaN.
pub fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Format a float so that integral values keep a trailing `.0` (`-1.0`, not `-1`).
pub fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Flatten a multi-valued field into one scalar string.
///
/// Values are sorted, deduplicated and joined with `;`.  Sentinel values are
/// dropped and an empty result becomes the sentinel.
pub fn flatten_values<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let result = values
        .into_iter()
        .filter(|v| !is_sentinel(v.as_ref()))
        .map(|v| v.as_ref().to_string())
        .sorted()
        .dedup()
        .join(";");
    if result.is_empty() {
        SENTINEL.to_string()
    } else {
        result
    }
}

/// Select the genome release to use.
#[derive(
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    Debug,
    Default,
    strum::Display,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum GenomeRelease {
    /// GRCh37 / hg19
    #[default]
    #[strum(serialize = "grch37")]
    Grch37,
    /// GRCh38 / hg38
    #[strum(serialize = "grch38")]
    Grch38,
}

impl GenomeRelease {
    pub fn name(&self) -> String {
        match self {
            GenomeRelease::Grch37 => String::from("GRCh37"),
            GenomeRelease::Grch38 => String::from("GRCh38"),
        }
    }

    /// Build identifier understood by ANNOVAR and the UCSC browser.
    pub fn annovar_alias(&self) -> &'static str {
        match self {
            GenomeRelease::Grch37 => "hg19",
            GenomeRelease::Grch38 => "hg38",
        }
    }

    /// UCSC genome browser database name.
    pub fn ucsc_db(&self) -> &'static str {
        self.annovar_alias()
    }
}

impl std::str::FromStr for GenomeRelease {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_ascii_lowercase();
        if s.starts_with("grch37") || s == "hg19" {
            Ok(GenomeRelease::Grch37)
        } else if s.starts_with("grch38") || s == "hg38" {
            Ok(GenomeRelease::Grch38)
        } else {
            Err(anyhow::anyhow!("Unknown genome release: {}", s))
        }
    }
}

/// Explicit execution context handed to every data-parallel component.
///
/// Owns the worker pool; dropping the context tears the pool down.
#[derive(Debug)]
pub struct RunContext {
    /// Local worker pool for row-wise transforms.
    pub pool: rayon::ThreadPool,
}

impl RunContext {
    /// Construct with `num_threads` workers, defaulting to the number of cores.
    pub fn new(num_threads: Option<usize>) -> Result<Self, anyhow::Error> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(num_threads) = num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| anyhow::anyhow!("building Rayon thread pool failed: {}", e))?;
        tracing::debug!("worker pool has {} threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Run `op` inside the worker pool and block until it returns.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// Return the version of the `annofit` crate and `x.y.z` in tests.
pub fn worker_version() -> &'static str {
    if cfg!(test) {
        "x.y.z"
    } else {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn trace_rss_now_smoke() {
        super::trace_rss_now();
    }

    #[rstest::rstest]
    #[case("12", Some(12))]
    #[case(" 7 ", Some(7))]
    #[case(".", None)]
    #[case("1.5", None)]
    fn parse_int(#[case] value: &str, #[case] expected: Option<i64>) {
        assert_eq!(super::parse_int(value), expected);
    }

    #[rstest::rstest]
    #[case("0.003", Some(0.003))]
    #[case("not_a_number", None)]
    #[case("nan", None)]
    #[case(".", None)]
    fn parse_float(#[case] value: &str, #[case] expected: Option<f64>) {
        assert_eq!(super::parse_float(value), expected);
    }

    #[rstest::rstest]
    #[case(-1.0, "-1.0")]
    #[case(0.003, "0.003")]
    #[case(2.0, "2.0")]
    fn format_float(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(super::format_float(value), expected);
    }

    #[rstest::rstest]
    #[case(vec!["1", "2", "2"], "1;2")]
    #[case(vec!["b", ".", "a"], "a;b")]
    #[case(vec![".", ""], ".")]
    #[case(vec![], ".")]
    fn flatten_values(#[case] values: Vec<&str>, #[case] expected: &str) {
        assert_eq!(super::flatten_values(values), expected);
    }

    #[rstest::rstest]
    #[case("grch37", crate::common::GenomeRelease::Grch37)]
    #[case("hg19", crate::common::GenomeRelease::Grch37)]
    #[case("GRCh38", crate::common::GenomeRelease::Grch38)]
    fn genome_release_from_str(
        #[case] s: &str,
        #[case] release: super::GenomeRelease,
    ) -> Result<(), anyhow::Error> {
        let res: super::GenomeRelease = s.parse()?;

        assert_eq!(res, release);

        Ok(())
    }

    #[rstest::rstest]
    #[case(crate::common::GenomeRelease::Grch37, "GRCh37", "hg19")]
    #[case(crate::common::GenomeRelease::Grch38, "GRCh38", "hg38")]
    fn genome_release_names(
        #[case] release: super::GenomeRelease,
        #[case] name: &str,
        #[case] alias: &str,
    ) {
        assert_eq!(release.name(), name);
        assert_eq!(release.annovar_alias(), alias);
    }

    #[test]
    fn run_context_installs_pool() -> Result<(), anyhow::Error> {
        let ctx = super::RunContext::new(Some(2))?;

        assert_eq!(ctx.install(rayon::current_num_threads), 2);

        Ok(())
    }
}
