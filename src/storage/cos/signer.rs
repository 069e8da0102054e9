//! COS request signing (q-sign-algorithm=sha1)
//! Reference: https://cloud.tencent.com/document/product/436/7778

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use urlencoding::{decode, encode};

type HmacSha1 = Hmac<Sha1>;

/// Signs one request
pub struct Signer<'a> {
    method: &'a str,
    url_path: &'a str,
    headers: Option<&'a HeaderMap>,
    query: Option<&'a HashMap<String, String>>,
}

impl<'a> Signer<'a> {
    pub fn new(
        method: &'a str,
        url_path: &'a str,
        headers: Option<&'a HeaderMap>,
        query: Option<&'a HashMap<String, String>>,
    ) -> Self {
        Self {
            method,
            url_path,
            headers,
            query,
        }
    }

    fn key_time(valid_seconds: u32) -> String {
        let start = Utc::now().timestamp();
        let end = start + valid_seconds as i64;
        format!("{};{}", start, end)
    }

    fn hmac_hex(key: &[u8], data: &str) -> String {
        let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        hex(&mac.finalize().into_bytes())
    }

    /// Lowercased, url-encoded keys with url-encoded values, sorted by key.
    fn encode_pairs<'i>(pairs: impl Iterator<Item = (&'i str, String)>) -> BTreeMap<String, String> {
        pairs
            .map(|(k, v)| (encode(k).to_lowercase(), encode(&v).into_owned()))
            .collect()
    }

    fn encoded_query(&self) -> BTreeMap<String, String> {
        match self.query {
            Some(query) => Self::encode_pairs(query.iter().map(|(k, v)| (k.as_str(), v.clone()))),
            None => BTreeMap::new(),
        }
    }

    fn encoded_headers(&self) -> BTreeMap<String, String> {
        match self.headers {
            Some(headers) => Self::encode_pairs(headers.iter().map(|(k, v)| {
                (k.as_str(), String::from_utf8_lossy(v.as_bytes()).into_owned())
            })),
            None => BTreeMap::new(),
        }
    }

    fn key_list(pairs: &BTreeMap<String, String>) -> String {
        pairs.keys().cloned().collect::<Vec<_>>().join(";")
    }

    fn key_values(pairs: &BTreeMap<String, String>) -> String {
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn http_string(&self) -> String {
        let path = decode(self.url_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| self.url_path.to_string());
        [
            self.method.to_lowercase(),
            path,
            Self::key_values(&self.encoded_query()),
            Self::key_values(&self.encoded_headers()),
        ]
        .join("\n")
            + "\n"
    }

    fn string_to_sign(&self, key_time: &str) -> String {
        let digest = Sha1::digest(self.http_string().as_bytes());
        format!("sha1\n{}\n{}\n", key_time, hex(&digest))
    }

    /// Value for the `Authorization` header, valid for `valid_seconds`.
    pub fn get_signature(&self, secret_key: &str, secret_id: &str, valid_seconds: u32) -> String {
        let key_time = Self::key_time(valid_seconds);
        let sign_key = Self::hmac_hex(secret_key.as_bytes(), &key_time);
        let signature = Self::hmac_hex(sign_key.as_bytes(), &self.string_to_sign(&key_time));
        format!(
            "q-sign-algorithm=sha1&q-ak={}&q-sign-time={}&q-key-time={}&q-header-list={}&q-url-param-list={}&q-signature={}",
            secret_id,
            key_time,
            key_time,
            Self::key_list(&self.encoded_headers()),
            Self::key_list(&self.encoded_query()),
            signature
        )
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
