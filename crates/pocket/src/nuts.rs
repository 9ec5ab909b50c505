//! Protocol value types
//!
//! The shapes exchanged with the mint protocol library: proofs, keysets,
//! currency units and encoded tokens. The blind-signature internals stay
//! behind [`crate::wallet::MintClient`]; these types only carry its inputs
//! and outputs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::{self, Amount};
use crate::mint_url::MintUrl;

/// Currency unit a keyset settles in
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyUnit {
    /// Sat
    #[default]
    Sat,
    /// Msat
    Msat,
    /// Usd
    Usd,
    /// Euro
    Eur,
    /// Custom currency unit
    Custom(String),
}

impl FromStr for CurrencyUnit {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_uppercase().as_str() {
            "SAT" => Ok(Self::Sat),
            "MSAT" => Ok(Self::Msat),
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            _ => Ok(Self::Custom(value.to_string())),
        }
    }
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sat => write!(f, "sat"),
            Self::Msat => write!(f, "msat"),
            Self::Usd => write!(f, "usd"),
            Self::Eur => write!(f, "eur"),
            Self::Custom(unit) => write!(f, "{}", unit.to_lowercase()),
        }
    }
}

/// Keyset id
///
/// Identifies one versioned set of mint public keys; every proof is bound to
/// exactly one keyset and therefore to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeysetId(String);

impl KeysetId {
    /// Keyset id as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for KeysetId {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::error::Error::InvalidKeysetId(value.to_string()));
        }
        Ok(Self(value.to_lowercase()))
    }
}

impl fmt::Display for KeysetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keyset information as advertised by a mint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeysetInfo {
    /// Keyset id
    pub id: KeysetId,
    /// Unit the keyset settles in
    pub unit: CurrencyUnit,
    /// Whether the mint still signs with this keyset
    pub active: bool,
}

/// Proof secret
///
/// The unique identifier of a proof inside the ledger. Deterministically
/// derived from the wallet seed and a keyset counter by the protocol
/// library; never printed in logs or error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create new [`Secret`]
    pub fn new<S>(secret: S) -> Self
    where
        S: Into<String>,
    {
        Self(secret.into())
    }

    /// Secret as str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Secret {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.to_string()))
    }
}

/// State of a proof in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofState {
    /// Held and available to spend
    Spendable,
    /// Withheld while an outbound payment outcome is unknown
    Pending,
    /// Detached from the ledger
    Removed,
}

/// A single bearer token backed by a mint's blind signature
///
/// Immutable once created. Denominations are combined and split by the
/// protocol library issuing new proofs, never by mutating existing ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Proof {
    /// Amount the proof is worth
    pub amount: Amount,
    /// Keyset id the proof was signed under
    #[serde(rename = "id")]
    pub keyset_id: KeysetId,
    /// Proof secret
    pub secret: Secret,
    /// Unblinded signature
    #[serde(rename = "C")]
    pub c: String,
    /// Url of the issuing mint
    pub mint_url: MintUrl,
    /// Unit of the keyset
    pub unit: CurrencyUnit,
}

/// [`Proofs`] is a collection of [`Proof`]
pub type Proofs = Vec<Proof>;

/// Helper methods on proof collections
pub trait ProofsMethods {
    /// Sum of the proof amounts
    fn total_amount(&self) -> Result<Amount, amount::Error>;

    /// Secrets of the proofs
    fn secrets(&self) -> Vec<Secret>;
}

impl ProofsMethods for Proofs {
    fn total_amount(&self) -> Result<Amount, amount::Error> {
        Amount::try_sum(self.iter().map(|p| p.amount))
    }

    fn secrets(&self) -> Vec<Secret> {
        self.iter().map(|p| p.secret.clone()).collect()
    }
}

impl ProofsMethods for &[Proof] {
    fn total_amount(&self) -> Result<Amount, amount::Error> {
        Amount::try_sum(self.iter().map(|p| p.amount))
    }

    fn secrets(&self) -> Vec<Secret> {
        self.iter().map(|p| p.secret.clone()).collect()
    }
}

/// Encoded token exchanged between parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Issuing mint
    pub mint_url: MintUrl,
    /// Unit of the carried proofs
    pub unit: CurrencyUnit,
    /// Carried proofs
    pub proofs: Proofs,
    /// Optional memo for the recipient
    pub memo: Option<String>,
}

impl Token {
    /// Create new [`Token`]
    pub fn new(mint_url: MintUrl, unit: CurrencyUnit, proofs: Proofs, memo: Option<String>) -> Self {
        Self {
            mint_url,
            unit,
            proofs,
            memo,
        }
    }

    /// Total value carried by the token
    pub fn total_amount(&self) -> Result<Amount, amount::Error> {
        self.proofs.total_amount()
    }

    /// Serialize for handing to another wallet
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a token received from another wallet
    pub fn from_json(encoded: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(encoded)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_keyset_id_parsing() {
        assert!(KeysetId::from_str("00916bbf7ef91a36").is_ok());
        assert!(KeysetId::from_str("00916BBF7EF91A36").is_ok());
        assert!(KeysetId::from_str("").is_err());
        assert!(KeysetId::from_str("not-hex!").is_err());
    }

    #[test]
    fn test_currency_unit_round_trip() {
        for unit in ["sat", "msat", "usd", "eur"] {
            let parsed = CurrencyUnit::from_str(unit).unwrap();
            assert_eq!(unit, parsed.to_string());
        }
        let custom = CurrencyUnit::from_str("point").unwrap();
        assert_eq!(CurrencyUnit::Custom("point".to_string()), custom);
    }

    #[test]
    fn test_total_amount() {
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();
        let keyset_id = KeysetId::from_str("00916bbf7ef91a36").unwrap();
        let proofs: Proofs = [64, 32, 4]
            .iter()
            .map(|a| Proof {
                amount: Amount::from(*a),
                keyset_id: keyset_id.clone(),
                secret: Secret::new(format!("secret-{a}")),
                c: "02deadbeef".to_string(),
                mint_url: mint_url.clone(),
                unit: CurrencyUnit::Sat,
            })
            .collect();
        assert_eq!(Amount::from(100), proofs.total_amount().unwrap());
    }

    #[test]
    fn test_token_json() {
        let mint_url = MintUrl::from_str("https://mint.example.com").unwrap();
        let proof = Proof {
            amount: Amount::from(8),
            keyset_id: KeysetId::from_str("00916bbf7ef91a36").unwrap(),
            secret: Secret::new("secret-8"),
            c: "02deadbeef".to_string(),
            mint_url: mint_url.clone(),
            unit: CurrencyUnit::Sat,
        };
        let token = Token::new(mint_url, CurrencyUnit::Sat, vec![proof], None);

        let encoded = token.to_json().unwrap();
        // wire field names, not the internal ones
        assert!(encoded.contains("\"id\""));
        assert!(encoded.contains("\"C\""));
        assert_eq!(token, Token::from_json(&encoded).unwrap());

        assert!(Token::from_json("{\"mint_url\":42}").is_err());
    }
}
