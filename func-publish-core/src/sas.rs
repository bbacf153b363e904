//! Storage connection strings and shared access signatures.
//!
//! Tokens are HMAC-SHA256 signatures over the service's string-to-sign, keyed
//! with the decoded account key. Read access to a single blob uses a service
//! SAS; the write path uses a short-lived account SAS.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use ring::hmac;
use thiserror::Error;

/// Storage service version the signatures are computed for.
pub const SAS_VERSION: &str = "2019-12-12";

const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

#[derive(Debug, Error)]
pub enum SasError {
    #[error("storage connection string is missing `{0}`")]
    MissingField(&'static str),

    #[error("storage account key is not valid base64")]
    InvalidKey,

    #[error("invalid blob endpoint `{0}`")]
    InvalidEndpoint(String),
}

/// Parsed storage connection info.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub account_name: String,
    account_key: Vec<u8>,
    pub blob_endpoint: Url,
}

impl std::fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAccount")
            .field("account_name", &self.account_name)
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl StorageAccount {
    /// Parses `Key=Value;...` connection strings; keys are case-insensitive.
    pub fn parse(connection_string: &str) -> Result<Self, SasError> {
        let mut name = None;
        let mut key = None;
        let mut protocol = None;
        let mut suffix = None;
        let mut endpoint = None;
        let mut development = false;

        for part in connection_string.split(';') {
            let Some((k, v)) = part.split_once('=') else {
                continue;
            };
            let v = v.trim();
            match k.trim().to_ascii_lowercase().as_str() {
                "accountname" => name = Some(v.to_string()),
                "accountkey" => key = Some(v.to_string()),
                "defaultendpointsprotocol" => protocol = Some(v.to_string()),
                "endpointsuffix" => suffix = Some(v.to_string()),
                "blobendpoint" => endpoint = Some(v.to_string()),
                "usedevelopmentstorage" => development = v.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            name.get_or_insert_with(|| DEV_ACCOUNT_NAME.to_string());
            key.get_or_insert_with(|| DEV_ACCOUNT_KEY.to_string());
            endpoint.get_or_insert_with(|| DEV_BLOB_ENDPOINT.to_string());
        }

        let account_name = name.ok_or(SasError::MissingField("AccountName"))?;
        let account_key = STANDARD
            .decode(key.ok_or(SasError::MissingField("AccountKey"))?)
            .map_err(|_| SasError::InvalidKey)?;
        let endpoint = endpoint.unwrap_or_else(|| {
            format!(
                "{}://{}.blob.{}",
                protocol.as_deref().unwrap_or("https"),
                account_name,
                suffix.as_deref().unwrap_or("core.windows.net"),
            )
        });
        let blob_endpoint = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|_| SasError::InvalidEndpoint(endpoint.clone()))?;

        Ok(StorageAccount {
            account_name,
            account_key,
            blob_endpoint,
        })
    }

    /// URI of `container`, or of `blob` inside it.
    pub fn resource_url(&self, container: &str, blob: Option<&str>) -> Result<Url, SasError> {
        let mut url = self.blob_endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SasError::InvalidEndpoint(self.blob_endpoint.to_string()))?;
            segments.pop_if_empty().push(container);
            if let Some(blob) = blob {
                segments.push(blob);
            }
        }
        Ok(url)
    }

    fn protocol(&self) -> &'static str {
        if self.blob_endpoint.scheme() == "http" {
            "https,http"
        } else {
            "https"
        }
    }

    fn encode_query(&self, pairs: &[(&str, &str)]) -> String {
        let mut url = self.blob_endpoint.clone();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.query().unwrap_or_default().to_string()
    }

    fn sign(&self, string_to_sign: &str) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.account_key);
        STANDARD.encode(hmac::sign(&key, string_to_sign.as_bytes()).as_ref())
    }

    /// Service SAS granting read access to one blob.
    pub fn blob_read_token(
        &self,
        container: &str,
        blob: &str,
        start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> String {
        let st = format_time(start);
        let se = format_time(expiry);
        let resource = format!("/blob/{}/{}/{}", self.account_name, container, blob);
        let string_to_sign = [
            "r",
            &st,
            &se,
            &resource,
            "", // signed identifier
            "", // signed ip
            self.protocol(),
            SAS_VERSION,
            "b",
            "", // snapshot time
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n");

        self.encode_query(&[
            ("sv", SAS_VERSION),
            ("st", &st),
            ("se", &se),
            ("sr", "b"),
            ("sp", "r"),
            ("spr", self.protocol()),
            ("sig", &self.sign(&string_to_sign)),
        ])
    }

    /// Account SAS allowing containers and blobs to be created and written.
    pub fn write_token(&self, start: DateTime<Utc>, expiry: DateTime<Utc>) -> String {
        let st = format_time(start);
        let se = format_time(expiry);
        let mut string_to_sign = [
            self.account_name.as_str(),
            "cw",
            "b",
            "co",
            &st,
            &se,
            "", // signed ip
            self.protocol(),
            SAS_VERSION,
        ]
        .join("\n");
        string_to_sign.push('\n');

        self.encode_query(&[
            ("sv", SAS_VERSION),
            ("ss", "b"),
            ("srt", "co"),
            ("sp", "cw"),
            ("st", &st),
            ("se", &se),
            ("spr", self.protocol()),
            ("sig", &self.sign(&string_to_sign)),
        ])
    }

    #[cfg(test)]
    pub(crate) fn verify(&self, string_to_sign: &str, signature: &str) -> bool {
        let Ok(tag) = STANDARD.decode(signature) else {
            return false;
        };
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.account_key);
        hmac::verify(&key, string_to_sign.as_bytes(), &tag).is_ok()
    }
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}
