use addr::{parse_domain_name, parse_email_address};
use iri_string::spec::{IriSpec, UriSpec};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, str::FromStr};
use time::macros::format_description;
use uuid::Uuid;

/// Format names defined by the JSON Schema validation specification.
/// Unknown format names are not represented here: they behave as pure
/// annotations and never assert.
#[derive(Debug, Deserialize, Serialize, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Date,
    #[serde(rename = "date-time")]
    DateTime,
    Time,
    Duration,
    Email,
    Hostname,
    /// IdnHostname is parsed but is not supported (assertion always fails).
    #[serde(rename = "idn-hostname")]
    IdnHostname,
    /// IdnEmail is parsed but is not supported (assertion always fails).
    #[serde(rename = "idn-email")]
    IdnEmail,
    Ipv4,
    Ipv6,
    Uuid,
    Iri,
    Uri,
    #[serde(rename = "uri-reference")]
    UriReference,
    #[serde(rename = "iri-reference")]
    IriReference,
    #[serde(rename = "uri-template")]
    UriTemplate,
    #[serde(rename = "json-pointer")]
    JsonPointer,
    #[serde(rename = "relative-json-pointer")]
    RelativeJsonPointer,
    Regex,
}

lazy_static::lazy_static! {
    static ref DATE_RE: Regex =
        Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}\z").expect("Is a valid regex");
    static ref RELATIVE_JSON_POINTER_RE: Regex =
        Regex::new(r"^(?:0|[1-9][0-9]*)(?:#|(?:/(?:[^~/]|~0|~1)*)*)\z").expect("Is a valid regex");
    static ref URI_TEMPLATE_RE: Regex = Regex::new(
        r#"^(?:(?:[^\x00-\x20""'<>%\\^`{|}]|%[0-9a-f]{2})|\{[+#.\/;?&=,!@|]?(?:[a-z0-9_]|%[0-9a-f]{2})+(?:\:[1-9][0-9]{0,3}|\*)?(?:,(?:[a-z0-9_]|%[0-9a-f]{2})+(?:\:[1-9][0-9]{0,3}|\*)?)*\})*$"#
    )
    .expect("Is a valid regex");
    static ref ISO_8601_DURATION_RE: Regex = Regex::new(r"^P(?:\d+W|(?:(?:\d+Y(?:\d+M)?(?:\d+D)?|\d+M(?:\d+D)?|\d+D)(?:T(?:\d+H(?:\d+M)?(?:\d+S)?|\d+M(?:\d+S)?|\d+S))?)|T(?:\d+H(?:\d+M)?(?:\d+S)?|\d+M(?:\d+S)?|\d+S))$").expect("Is a valid regex");
    static ref JSON_POINTER_RE: Regex = Regex::new(r"^(\/([^~]|(~[01]))*)*$").expect("Is a valid regex");
}

impl Format {
    /// Parses a format name, returning None for names the specification
    /// doesn't define.
    pub fn lookup(name: &str) -> Option<Format> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }

    /// Checks a string instance against this format.
    pub fn check(&self, val: &str) -> bool {
        match self {
            Self::Date => {
                // The underlying parser ignores zero-padding, which the
                // format requires, so pre-check the shape with a regex.
                DATE_RE.is_match(val)
                    && time::Date::parse(val, &format_description!("[year]-[month]-[day]")).is_ok()
            }
            Self::DateTime => time::OffsetDateTime::parse(
                val,
                &time::format_description::well_known::Rfc3339,
            )
            .is_ok(),
            Self::Time => {
                let full_format = format_description!(
                    version = 2,
                    "[first
                    [[hour]:[minute]:[second][optional [.[subsecond]]]Z]
                    [[hour]:[minute]:[second][optional [.[subsecond]]]z]
                    [[hour]:[minute]:[second][optional [.[subsecond]]][offset_hour]:[offset_minute]]
                    ]"
                );
                time::Time::parse(val, &time::format_description::FormatItem::First(full_format))
                    .is_ok()
            }
            Self::Duration => ISO_8601_DURATION_RE.is_match(val),
            Self::Email => parse_email_address(val).is_ok(),
            Self::Hostname => parse_domain_name(val).is_ok(),
            Self::IdnHostname | Self::IdnEmail => false,
            Self::Ipv4 => {
                // Leading zeros are rejected (inet_addr octal ambiguity).
                !val.split('.').any(|octet| octet.len() > 1 && octet.starts_with('0'))
                    && IpAddr::from_str(val).map_or(false, |ip| ip.is_ipv4())
            }
            Self::Ipv6 => IpAddr::from_str(val).map_or(false, |ip| ip.is_ipv6()),
            // The uuid crate accepts non-hyphenated inputs, the format does not.
            Self::Uuid => val.len() == 36 && Uuid::parse_str(val).is_ok(),
            Self::Iri => iri_string::validate::iri::<IriSpec>(val).is_ok(),
            Self::Uri => iri_string::validate::iri::<UriSpec>(val).is_ok(),
            Self::UriReference => iri_string::validate::iri_reference::<UriSpec>(val).is_ok(),
            Self::IriReference => iri_string::validate::iri_reference::<IriSpec>(val).is_ok(),
            Self::UriTemplate => URI_TEMPLATE_RE.is_match(val),
            Self::JsonPointer => JSON_POINTER_RE.is_match(val),
            Self::RelativeJsonPointer => RELATIVE_JSON_POINTER_RE.is_match(val),
            Self::Regex => fancy_regex::Regex::new(val).is_ok(),
        }
    }
}
