use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the marketplace the logged-in user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "seller" => Ok(Role::Seller),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Addresses are emails; the service treats them case-insensitively.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub role: Role,
}

/// The `(buyerEmail, sellerEmail)` pair the service uses to name a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPair {
    pub buyer_email: String,
    pub seller_email: String,
}

impl Identity {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            email: normalize_address(email),
            role,
        }
    }

    pub fn is_me(&self, address: &str) -> bool {
        self.email == normalize_address(address)
    }

    pub fn pair_with(&self, peer: &str) -> ParticipantPair {
        let peer = normalize_address(peer);
        match self.role {
            Role::Buyer => ParticipantPair {
                buyer_email: self.email.clone(),
                seller_email: peer,
            },
            Role::Seller => ParticipantPair {
                buyer_email: peer,
                seller_email: self.email.clone(),
            },
        }
    }
}
