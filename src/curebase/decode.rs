//! Decoding and aggregation of overlap payloads.

use indexmap::IndexMap;
use rayon::prelude::*;

use crate::{
    common::{
        flatten_values, is_sentinel,
        table::{sort_by_position, Table, VariantKey, VariantRecord, KEY_COLUMNS},
        RunContext, SENTINEL,
    },
    curebase::payload::{self, Payload},
};

/// Presence marker for overlaps whose intervals carry no sub-fields.
pub const PRESENCE_MARKER: &str = "yes";

/// Aggregate the payloads of all intervals of database `name` overlapping one
/// variant into `<name>.<field>` value lists.
///
/// No payloads yield an empty map; payloads without any field yield the
/// presence marker under `<name>`.
pub fn aggregate(name: &str, payloads: &[Payload]) -> IndexMap<String, Vec<String>> {
    let mut result: IndexMap<String, Vec<String>> = IndexMap::new();
    if payloads.is_empty() {
        return result;
    }
    if payloads.iter().all(|p| p.is_empty()) {
        result.insert(name.to_string(), vec![PRESENCE_MARKER.to_string()]);
        return result;
    }
    for payload in payloads {
        for (key, value) in payload {
            let values = result.entry(format!("{}.{}", name, key)).or_default();
            if !is_sentinel(value) {
                values.push(value.clone());
            }
        }
    }
    result
}

/// Decode one overlap cell of database `name` into flattened columns.
///
/// Undecodable cells are logged and treated as "no overlap".
pub fn decode_cell(name: &str, cell: &str) -> IndexMap<String, String> {
    if is_sentinel(cell) {
        return IndexMap::new();
    }
    match payload::decode_overlaps(cell) {
        Ok(payloads) => aggregate(name, &payloads)
            .into_iter()
            .map(|(column, values)| (column, flatten_values(values)))
            .collect(),
        Err(e) => {
            tracing::warn!("Could not decode overlap of database {:?}: {}", name, e);
            IndexMap::new()
        }
    }
}

/// Overlap column of one database in the annotator output.
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct DecodeSpec {
    /// Database name.
    pub name: String,
    /// Column holding the overlap cell.
    pub overlap_column: String,
    /// Columns the database is expected to contribute.
    pub expected_columns: Vec<String>,
}

/// Decode all overlap columns of `overlaps` into one table keyed by variant.
///
/// The result holds the key columns and the expected columns only. Expected
/// columns never observed are all-sentinel, other observed columns are
/// dropped.
pub fn decode_table(ctx: &RunContext, overlaps: &Table, specs: &[DecodeSpec]) -> Table {
    let decoded = ctx.install(|| {
        overlaps
            .records
            .par_iter()
            .map(|record| {
                let mut result = record.restrict(&KEY_COLUMNS.map(String::from));
                for spec in specs {
                    for (column, value) in decode_cell(&spec.name, record.get(&spec.overlap_column))
                    {
                        result.set(column, value);
                    }
                }
                result
            })
            .collect::<Vec<_>>()
    });

    let mut columns = KEY_COLUMNS.map(String::from).to_vec();
    for spec in specs {
        columns.extend(spec.expected_columns.iter().cloned());
    }
    for column in Table::union_columns(&decoded) {
        if !columns.contains(&column) {
            tracing::debug!("Dropping column {:?}, it was not expected", &column);
        }
    }
    let records = decoded.iter().map(|r| r.restrict(&columns)).collect();
    Table { columns, records }
}

/// Left join of `annotation`'s non-key columns onto `primary` by variant key,
/// then stable sort by `(Chr, Start)`.
///
/// Primary rows without a match get sentinels; the first annotation row per
/// key wins.
pub fn left_join(primary: Table, annotation: &Table) -> Table {
    let mut by_key: IndexMap<VariantKey, &VariantRecord> = IndexMap::new();
    for record in &annotation.records {
        by_key.entry(record.key()).or_insert(record);
    }
    let extra = annotation
        .columns
        .iter()
        .filter(|c| !KEY_COLUMNS.contains(&c.as_str()))
        .cloned()
        .collect::<Vec<_>>();

    let Table {
        mut columns,
        mut records,
    } = primary;
    for column in &extra {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    for record in records.iter_mut() {
        let matched = by_key.get(&record.key());
        for column in &extra {
            let value = matched.map(|m| m.get(column)).unwrap_or(SENTINEL);
            record.set(column.clone(), value);
        }
    }
    sort_by_position(&mut records, false);
    Table { columns, records }
}

#[cfg(test)]
mod test {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    use super::DecodeSpec;
    use crate::{
        common::{
            table::{Table, VariantRecord},
            RunContext,
        },
        curebase::payload::{self, Payload},
    };

    fn payload(pairs: &[(&str, &str)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn aggregate_sorts_and_deduplicates() -> Result<(), anyhow::Error> {
        let cell = format!(
            "Name={},{},{}",
            payload::encode(&payload(&[("X", "2")]))?,
            payload::encode(&payload(&[("X", "1")]))?,
            payload::encode(&payload(&[("X", "2")]))?,
        );

        let decoded = super::decode_cell("db", &cell);

        assert_eq!(decoded.get("db.X").map(String::as_str), Some("1;2"));

        Ok(())
    }

    #[test]
    fn aggregate_missing_in_some_intervals() {
        let res = super::aggregate(
            "db",
            &[payload(&[("X", "1"), ("Y", "a")]), payload(&[("X", "3")])],
        );

        let expected: IndexMap<String, Vec<String>> = [
            ("db.X".to_string(), vec!["1".to_string(), "3".to_string()]),
            ("db.Y".to_string(), vec!["a".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(res, expected);
    }

    #[rstest::rstest]
    #[case(vec![], vec![])]
    #[case(vec![Payload::new()], vec![("db", "yes")])]
    #[case(vec![Payload::new(), Payload::new()], vec![("db", "yes")])]
    #[case(vec![Payload::new(), payload(&[("X", "1")])], vec![("db.X", "1")])]
    #[case(vec![payload(&[("tier", ".")])], vec![("db.tier", ".")])]
    #[case(vec![payload(&[("tier", ".")]), payload(&[("tier", "2")])], vec![("db.tier", "2")])]
    fn aggregate_presence(#[case] payloads: Vec<Payload>, #[case] expected: Vec<(&str, &str)>) {
        let res = super::aggregate("db", &payloads)
            .into_iter()
            .map(|(k, v)| (k, super::flatten_values(v)))
            .collect::<Vec<_>>();

        assert_eq!(
            res,
            expected
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        );
    }

    #[rstest::rstest]
    #[case(".")]
    #[case("")]
    #[case("Name=ZZ")]
    fn decode_cell_degrades(#[case] cell: &str) {
        assert!(super::decode_cell("db", cell).is_empty());
    }

    #[test]
    fn decode_table_adds_missing_expected_columns() -> Result<(), anyhow::Error> {
        let ctx = RunContext::new(Some(1))?;
        let overlaps = Table {
            columns: ["Chr", "Start", "End", "Ref", "Alt", "gff3"]
                .map(String::from)
                .to_vec(),
            records: vec![VariantRecord::from_pairs([
                ("Chr", "chr1"),
                ("Start", "10"),
                ("End", "10"),
                ("Ref", "A"),
                ("Alt", "G"),
                ("gff3", "."),
            ])],
        };
        let specs = vec![DecodeSpec::new(
            "dbA".into(),
            "gff3".into(),
            vec!["dbA.tier".into()],
        )];

        let table = super::decode_table(&ctx, &overlaps, &specs);

        assert_eq!(table.columns.last().map(String::as_str), Some("dbA.tier"));
        assert_eq!(table.records[0].get("dbA.tier"), ".");
        assert!(table.records[0].contains("dbA.tier"));

        Ok(())
    }

    #[test]
    fn decode_table_drops_unexpected_columns() -> Result<(), anyhow::Error> {
        let ctx = RunContext::new(Some(1))?;
        let cell = format!(
            "Name={}",
            payload::encode(&payload(&[("tier", "1"), ("extra", "x")]))?
        );
        let overlaps = Table {
            columns: ["Chr", "Start", "End", "Ref", "Alt", "gff3"]
                .map(String::from)
                .to_vec(),
            records: vec![VariantRecord::from_pairs([
                ("Chr", "chr1"),
                ("Start", "10"),
                ("End", "10"),
                ("Ref", "A"),
                ("Alt", "G"),
                ("gff3", cell.as_str()),
            ])],
        };
        let specs = vec![DecodeSpec::new(
            "dbA".into(),
            "gff3".into(),
            vec!["dbA.tier".into()],
        )];

        let table = super::decode_table(&ctx, &overlaps, &specs);

        assert_eq!(
            table.columns,
            ["Chr", "Start", "End", "Ref", "Alt", "dbA.tier"]
                .map(String::from)
                .to_vec()
        );
        assert_eq!(table.records[0].get("dbA.tier"), "1");
        assert!(!table.records[0].contains("dbA.extra"));

        Ok(())
    }

    #[test]
    fn left_join_fills_sentinels_and_sorts() {
        let primary = Table {
            columns: ["Chr", "Start", "End", "Ref", "Alt"].map(String::from).to_vec(),
            records: vec![
                VariantRecord::from_pairs([
                    ("Chr", "chr2"),
                    ("Start", "5"),
                    ("End", "5"),
                    ("Ref", "A"),
                    ("Alt", "T"),
                ]),
                VariantRecord::from_pairs([
                    ("Chr", "chr1"),
                    ("Start", "20"),
                    ("End", "20"),
                    ("Ref", "A"),
                    ("Alt", "T"),
                ]),
            ],
        };
        let annotation = Table {
            columns: ["Chr", "Start", "End", "Ref", "Alt", "dbA.tier"]
                .map(String::from)
                .to_vec(),
            records: vec![VariantRecord::from_pairs([
                ("Chr", "chr2"),
                ("Start", "5"),
                ("End", "5"),
                ("Ref", "A"),
                ("Alt", "T"),
                ("dbA.tier", "1"),
            ])],
        };

        let joined = super::left_join(primary, &annotation);

        assert_eq!(
            joined
                .records
                .iter()
                .map(|r| (r.get("Chr"), r.get("dbA.tier")))
                .collect::<Vec<_>>(),
            vec![("chr1", "."), ("chr2", "1")]
        );
        assert_eq!(joined.columns.len(), 6);
    }
}
