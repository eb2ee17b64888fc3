use serde_json::Value;

use crate::error::{DEFAULT_NOT_SUPPORTED, ResolutionError};
use crate::model::{AttributeMap, RawResponse};
use crate::normalize::normalize_into;

/// Turn a response body into canonical attributes.
///
/// Top-level fields are merged first and the nested `address` object second,
/// so a field present in both resolves to the `address` value.
pub fn parse_response(raw: &RawResponse) -> Result<AttributeMap, ResolutionError> {
    let root: Value = serde_json::from_slice(raw.as_bytes())?;

    let Value::Object(object) = root else {
        return Err(ResolutionError::ParseFailure(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    if let Some(error) = object.get("error") {
        let message = error
            .as_str()
            .filter(|msg| !msg.is_empty())
            .unwrap_or(DEFAULT_NOT_SUPPORTED);
        return Err(ResolutionError::NotSupported(message.to_string()));
    }

    let mut attributes = AttributeMap::new();
    normalize_into(&object, &mut attributes);

    if let Some(Value::Object(address)) = object.get("address") {
        normalize_into(address, &mut attributes);
    }

    Ok(attributes)
}
