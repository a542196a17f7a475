//! Response classification.

use oos_model::ErrorBody;
use tracing::debug;

use crate::error::{OosError, OosResult};
use crate::transport::HttpResponse;

/// Response header carrying the service request id.
pub const X_AMZ_REQUEST_ID: &str = "x-amz-request-id";

/// Turn a raw response into success or the matching service error.
///
/// - 2xx: returned as is, body unconsumed;
/// - 300-307: [`OosError::Redirect`];
/// - 400-505 with a body: the decoded `<Error>` document as
///   [`OosError::Service`], or [`OosError::InvalidErrorBody`];
/// - 400-505 without a body: [`OosError::EmptyErrorBody`];
/// - anything else: [`OosError::UnexpectedStatus`].
pub async fn classify(response: HttpResponse) -> OosResult<HttpResponse> {
    let status = response.status.as_u16();
    if response.status.is_success() {
        return Ok(response);
    }

    let request_id = response.header(X_AMZ_REQUEST_ID).unwrap_or_default().to_owned();
    debug!(status, request_id = %request_id, "request failed");

    match status {
        300..=307 => Err(OosError::Redirect { status }),
        400..=505 => {
            let body = response.body.collect().await?;
            if body.is_empty() {
                return Err(OosError::EmptyErrorBody { status, request_id });
            }
            match oos_xml::from_xml::<ErrorBody>(&body) {
                Ok(error) => Err(OosError::Service {
                    status,
                    code: error.code,
                    message: error.message,
                    request_id,
                    host_id: error.host_id,
                    resource: error.resource,
                }),
                Err(source) => Err(OosError::InvalidErrorBody {
                    status,
                    request_id,
                    source,
                }),
            }
        }
        _ => Err(OosError::UnexpectedStatus { status }),
    }
}

/// Reject a successful response whose status the operation does not accept.
pub fn expect_status(response: HttpResponse, allowed: &[u16]) -> OosResult<HttpResponse> {
    let got = response.status.as_u16();
    if allowed.contains(&got) {
        Ok(response)
    } else {
        Err(OosError::UnexpectedStatusCode {
            allowed: allowed.to_vec(),
            got,
        })
    }
}
