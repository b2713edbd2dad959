//! Opaque payloads carried in the GFF3 attribute column.
//!
//! A database row's non-anchor columns are serialized as a JSON object and
//! the JSON text is hex-encoded (upper case), giving `ID=<HEX>`.

use indexmap::IndexMap;

/// Attribute tag written in front of the payload.
pub const ID_TAG: &str = "ID=";

/// Key/value map of one database row.
pub type Payload = IndexMap<String, String>;

/// Error type for payload decoding.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid hex payload: {0}")]
    Hex(base16ct::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode `payload` into the hex text without the `ID=` tag.
pub fn encode(payload: &Payload) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(base16ct::upper::encode_string(json.as_bytes()))
}

/// Encode `payload` into a full `ID=<HEX>` attribute.
pub fn encode_attribute(payload: &Payload) -> Result<String, serde_json::Error> {
    Ok(format!("{}{}", ID_TAG, encode(payload)?))
}

/// Decode one hex payload, with or without the `ID=` tag.
///
/// Non-string JSON values are kept in their JSON text form, `null` values
/// are dropped.
pub fn decode(hex: &str) -> Result<Payload, Error> {
    let hex = hex.trim();
    let hex = hex.strip_prefix(ID_TAG).unwrap_or(hex);
    let bytes = base16ct::mixed::decode_vec(hex).map_err(Error::Hex)?;
    let raw: IndexMap<String, serde_json::Value> = serde_json::from_slice(&bytes)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

/// Decode an annotator overlap cell into the list of overlapping payloads.
///
/// The cell has the form `Name=<HEX>,<HEX>,...` (one entry per overlapping
/// interval); the leading `<label>=` is optional.
pub fn decode_overlaps(cell: &str) -> Result<Vec<Payload>, Error> {
    let list = match cell.split_once('=') {
        Some((label, rest)) if !label.contains(',') && label != "ID" => rest,
        _ => cell,
    };
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(decode)
        .collect()
}
