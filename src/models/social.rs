// src/models/social.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

// Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SocialType {
    Wechat,
    Qq,
    Weibo,
    Alipay,
    Github,
    Gitee,
    Dingtalk,
}

impl SocialType {
    pub fn as_str(self) -> &'static str {
        match self {
            SocialType::Wechat => "wechat",
            SocialType::Qq => "qq",
            SocialType::Weibo => "weibo",
            SocialType::Alipay => "alipay",
            SocialType::Github => "github",
            SocialType::Gitee => "gitee",
            SocialType::Dingtalk => "dingtalk",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported social login type '{0}'.")]
pub struct UnknownSocialType(pub String);

impl std::str::FromStr for SocialType {
    type Err = UnknownSocialType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wechat" => Ok(SocialType::Wechat),
            "qq" => Ok(SocialType::Qq),
            "weibo" => Ok(SocialType::Weibo),
            "alipay" => Ok(SocialType::Alipay),
            "github" => Ok(SocialType::Github),
            "gitee" => Ok(SocialType::Gitee),
            "dingtalk" => Ok(SocialType::Dingtalk),
            other => Err(UnknownSocialType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SocialType {
    type Error = UnknownSocialType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// A third-party account bound to a local user.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSocial {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub social_type: SocialType,
    pub social_id: String,
    pub social_nickname: Option<String>,
    pub social_avatar: Option<String>,
    pub social_email: Option<String>,
    pub union_id: Option<String>,
    pub open_id: Option<String>,
    // Provider tokens are write-only: stored on bind, never loaded back.
    pub expires_in: Option<i64>,
    pub bind_time: DateTime<Utc>,
    pub last_login_time: Option<DateTime<Utc>>,
    pub login_count: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindSocialPayload {
    pub social_type: SocialType,

    #[validate(length(min = 1, max = 128, message = "Social id is required."))]
    pub social_id: String,

    pub social_nickname: Option<String>,
    pub social_avatar: Option<String>,
    pub social_email: Option<String>,
    pub union_id: Option<String>,
    pub open_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}
