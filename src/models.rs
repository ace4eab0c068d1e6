use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

const DATA_URL_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

// Personalization request body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct PersonalizeRequest {
    pub photo: String,        // data:image/...;base64,...
    pub illustration: String, // style id from the catalog
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizeResponse {
    pub result_url: String,
    pub job_id: String,
}

impl PersonalizeRequest {
    /// Reject payloads the provider would choke on before submitting a job.
    pub fn validate(&self, max_photo_bytes: usize) -> Result<(), GatewayError> {
        if self.illustration.trim().is_empty() {
            return Err(GatewayError::Validation("illustration must not be empty".into()));
        }

        let Some(rest) = self.photo.strip_prefix(DATA_URL_PREFIX) else {
            return Err(GatewayError::Validation(
                "photo must be an image data URL".into(),
            ));
        };
        let Some((_, payload)) = rest.split_once(BASE64_MARKER) else {
            return Err(GatewayError::Validation(
                "photo must be base64 encoded".into(),
            ));
        };
        if payload.is_empty() {
            return Err(GatewayError::Validation("photo is empty".into()));
        }

        let decoded = decoded_len(payload);
        if decoded > max_photo_bytes {
            return Err(GatewayError::Validation(format!(
                "photo is {decoded} bytes, limit is {max_photo_bytes}"
            )));
        }
        Ok(())
    }
}

fn decoded_len(payload: &str) -> usize {
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
    (payload.len() / 4 * 3 + (payload.len() % 4) * 3 / 4).saturating_sub(padding)
}
