//! Contact endpoint addressing.
//!
//! A URN is a `scheme:path` pair with an optional display name. Phone
//! numbers get strict canonicalization: alphanumeric sender ids are
//! rejected, national numbers are completed with the channel country's
//! calling code, and an input that already carried a `+` prefix is
//! preserved as delivered.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrnError {
    #[error("urn path cannot be empty")]
    EmptyPath,

    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("no calling code known for country: {0}")]
    UnknownCountry(String),

    #[error("invalid urn: {0}")]
    Invalid(String),
}

/// URN schemes the platform models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Tel,
    Mailto,
    Facebook,
    Instagram,
    Telegram,
    WeChat,
    Freshchat,
    External,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tel => "tel",
            Scheme::Mailto => "mailto",
            Scheme::Facebook => "facebook",
            Scheme::Instagram => "instagram",
            Scheme::Telegram => "telegram",
            Scheme::WeChat => "wechat",
            Scheme::Freshchat => "freshchat",
            Scheme::External => "ext",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "tel" => Scheme::Tel,
            "mailto" => Scheme::Mailto,
            "facebook" => Scheme::Facebook,
            "instagram" => Scheme::Instagram,
            "telegram" => Scheme::Telegram,
            "wechat" => Scheme::WeChat,
            "freshchat" => Scheme::Freshchat,
            "ext" => Scheme::External,
            _ => return None,
        })
    }
}

/// Uniform resource name identifying a contact endpoint, e.g. `tel:+254…`,
/// `wechat:OPENID`, `telegram:12345`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Urn {
    scheme: Scheme,
    path: String,
    display: Option<String>,
}

/// Calling codes for the markets the gateway serves. National numbers on
/// inbound webhooks are completed against the channel country.
const CALLING_CODES: &[(&str, &str)] = &[
    ("AR", "54"),
    ("AU", "61"),
    ("BD", "880"),
    ("BR", "55"),
    ("CA", "1"),
    ("CN", "86"),
    ("CO", "57"),
    ("DE", "49"),
    ("EC", "593"),
    ("ES", "34"),
    ("ET", "251"),
    ("FR", "33"),
    ("GB", "44"),
    ("GH", "233"),
    ("ID", "62"),
    ("IN", "91"),
    ("IT", "39"),
    ("JO", "962"),
    ("KE", "254"),
    ("KH", "855"),
    ("LK", "94"),
    ("MM", "95"),
    ("MW", "265"),
    ("MX", "52"),
    ("NG", "234"),
    ("NP", "977"),
    ("PH", "63"),
    ("PK", "92"),
    ("RW", "250"),
    ("SO", "252"),
    ("TZ", "255"),
    ("UG", "256"),
    ("US", "1"),
    ("ZA", "27"),
    ("ZM", "260"),
    ("ZW", "263"),
];

/// Calling code for an ISO-3166 country, when the gateway knows it.
pub fn calling_code(country: &str) -> Option<&'static str> {
    CALLING_CODES
        .iter()
        .find(|(c, _)| *c == country)
        .map(|(_, code)| *code)
}

impl Urn {
    pub fn new(scheme: Scheme, path: impl Into<String>) -> Result<Self, UrnError> {
        let path = path.into();
        if path.is_empty() {
            return Err(UrnError::EmptyPath);
        }
        Ok(Self {
            scheme,
            path,
            display: None,
        })
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        let display = display.into();
        if !display.is_empty() {
            self.display = Some(display);
        }
        self
    }

    pub fn telegram(id: i64, username: Option<&str>) -> Self {
        let mut urn = Self {
            scheme: Scheme::Telegram,
            path: id.to_string(),
            display: None,
        };
        if let Some(name) = username {
            urn = urn.with_display(name);
        }
        urn
    }

    pub fn wechat(open_id: impl Into<String>) -> Result<Self, UrnError> {
        Self::new(Scheme::WeChat, open_id)
    }

    pub fn facebook(psid: impl Into<String>) -> Result<Self, UrnError> {
        Self::new(Scheme::Facebook, psid)
    }

    /// Strict phone canonicalization for the given ISO-3166 country.
    ///
    /// Permissively strips formatting, then requires the remaining national
    /// significant number to be purely numeric; alphanumeric sender ids are
    /// rejected here (the loose parsers elsewhere accept them). An input
    /// that already carried `+` is kept as delivered. Numeric short codes
    /// (six digits or fewer) pass through without a `+` prefix.
    pub fn from_tel_strict(input: &str, country: &str) -> Result<Self, UrnError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(UrnError::EmptyPath);
        }

        let had_plus = trimmed.starts_with('+');
        let cleaned: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '+'))
            .collect();

        if cleaned.is_empty() || !cleaned.bytes().all(|b| b.is_ascii_digit()) {
            return Err(UrnError::InvalidPhone(input.to_string()));
        }

        // short codes stay bare
        if !had_plus && cleaned.len() <= 6 {
            return Self::new(Scheme::Tel, cleaned);
        }

        let number = if had_plus {
            // carrier already delivered E.164, preserve it
            cleaned
        } else {
            let cc = calling_code(country)
                .ok_or_else(|| UrnError::UnknownCountry(country.to_string()))?;
            if let Some(national) = cleaned.strip_prefix('0') {
                let national = national.trim_start_matches('0');
                format!("{cc}{national}")
            } else if cleaned.starts_with(cc) && cleaned.len() >= 11 {
                // already fully qualified, just missing the plus
                cleaned
            } else {
                format!("{cc}{cleaned}")
            }
        };

        if number.len() < 8 || number.len() > 15 {
            return Err(UrnError::InvalidPhone(input.to_string()));
        }

        Self::new(Scheme::Tel, format!("+{number}"))
    }

    /// Parses `scheme:path` as produced by [`Urn::to_string`].
    pub fn parse(value: &str) -> Result<Self, UrnError> {
        let (scheme, path) = value
            .split_once(':')
            .ok_or_else(|| UrnError::Invalid(value.to_string()))?;
        let scheme = Scheme::from_str(scheme).ok_or_else(|| UrnError::Invalid(value.to_string()))?;
        Self::new(scheme, path)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme.as_str(), self.path)
    }
}
