//! AWS Signature V4 request signing.
//!
//! Client-side counterpart of the verification flow: canonical request,
//! string to sign, derived signing key, hex signature.
//! Based on: <https://docs.aws.amazon.com/general/latest/gr/signature-version-4.html>

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-type;host;x-amz-date";

/// Key material and scope for signing.
#[derive(Debug, Clone)]
pub struct SigningKey<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// Request parts covered by the signature.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Already canonical (sorted, percent-encoded) query string
    pub query: &'a str,
    pub content_type: &'a str,
    pub payload: &'a [u8],
}

/// Headers to attach to the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub x_amz_date: String,
    pub authorization: String,
}

/// Sign `request` at `timestamp`.
pub fn sign(
    request: &SignableRequest<'_>,
    key: &SigningKey<'_>,
    timestamp: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = timestamp.format("%Y%m%d").to_string();

    let canonical_request = create_canonical_request(request, &amz_date);
    let string_to_sign =
        create_string_to_sign(&amz_date, &date, key.region, key.service, &canonical_request);
    let signing_key = calculate_signing_key(key.secret_access_key, &date, key.region, key.service);
    let signature = calculate_signature(&signing_key, &string_to_sign);

    tracing::debug!("Canonical request:\n{}", canonical_request);

    SignedHeaders {
        authorization: format!(
            "{} Credential={}/{}/{}/{}/aws4_request, SignedHeaders={}, Signature={}",
            ALGORITHM, key.access_key_id, date, key.region, key.service, SIGNED_HEADERS, signature
        ),
        x_amz_date: amz_date,
    }
}

/// Sorted, RFC 3986 encoded `k=v&...` string.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn create_canonical_request(request: &SignableRequest<'_>, amz_date: &str) -> String {
    let canonical_headers = format!(
        "content-type:{}\nhost:{}\nx-amz-date:{}\n",
        request.content_type.trim(),
        request.host.trim(),
        amz_date
    );
    let payload_hash = hex::encode(Sha256::digest(request.payload));

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method, request.path, request.query, canonical_headers, SIGNED_HEADERS, payload_hash
    )
}

fn create_string_to_sign(
    timestamp: &str,
    date: &str,
    region: &str,
    service: &str,
    canonical_request: &str,
) -> String {
    let credential_scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let hashed_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));

    format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM, timestamp, credential_scope, hashed_request
    )
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
fn calculate_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_secret = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn calculate_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}
