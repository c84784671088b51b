use url::Url;

use crate::constants::{ORIGIN_PARAM, PLACEMENT_PARAM};
use crate::error::{EnvelopeError, Result};

/// Read a query parameter from an address.
///
/// Only the query component is consulted. Empty values are reported as absent.
pub fn query_param(address: &str, name: &str) -> Result<Option<String>> {
    let url = parse(address)?;
    Ok(url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty()))
}

/// Read the placement namespace from an address.
pub fn placement_from_address(address: &str) -> Result<Option<String>> {
    query_param(address, PLACEMENT_PARAM)
}

/// Append the bridge parameters to a guest address.
///
/// Existing `_origin`/`_placement` pairs are replaced; other query pairs are kept.
pub fn with_bridge_params(address: &str, parent_origin: &str, placement: &str) -> Result<String> {
    let mut url = parse(address)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != ORIGIN_PARAM && key != PLACEMENT_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(ORIGIN_PARAM, parent_origin)
        .append_pair(PLACEMENT_PARAM, placement);
    Ok(url.into())
}

fn parse(address: &str) -> Result<Url> {
    Url::parse(address).map_err(|source| EnvelopeError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}
