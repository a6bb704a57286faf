use serde::{Deserialize, Serialize};

/// Profile of the authenticated user. Only ever built from a server response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserProfile {
    #[cfg_attr(feature = "ts", ts(type = "number"))]
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl UserProfile {
    pub fn display_line(&self) -> String {
        format!("{} <{}> (id {})", self.username, self.email, self.id)
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

#[derive(Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}
