use {
    serde::{Deserialize, Serialize},
    std::{
        convert::Infallible,
        fmt::{self, Debug},
        str::FromStr,
    },
};

/// Token used by the client to access the JSON-RPC API on behalf of the user.
///
/// An empty token is valid and means anonymous access.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_owned())
    }

    #[must_use]
    #[inline]
    pub fn as_unmasked_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for AccessToken {
    type Err = Infallible;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl Debug for AccessToken {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("anonymous", &self.is_anonymous())
            .finish()
    }
}
